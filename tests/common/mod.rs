//! Shared test utilities
//!
//! Fakes for the voice capability traits so the session controller can run
//! on tokio's paused clock without audio hardware or network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use ryo_assistant::responder::Responder;
use ryo_assistant::session::{
    Collaborators, SessionController, SessionEvent, SessionSettings, SessionState,
};
use ryo_assistant::tasks::TaskStore;
use ryo_assistant::voice::{
    CancelToken, RetryPolicy, Recorder, Speaker, VoiceBackend, WakeCallback, WakeSupervisor,
    WakeWordSource,
};
use ryo_assistant::{Error, Result};

/// Upper bound for any single wait in virtual time
pub const WAIT_LIMIT: Duration = Duration::from_secs(600);

/// Wake source that fails with queued errors, then runs until fired
#[derive(Default)]
pub struct MockWakeSource {
    failures: Mutex<VecDeque<Error>>,
    attempts: AtomicUsize,
    running: AtomicBool,
    on_wake: Mutex<Option<WakeCallback>>,
}

impl MockWakeSource {
    /// Report the device busy for the first `failures` starts
    pub fn busy(failures: usize) -> Self {
        Self::with_failures(
            (0..failures)
                .map(|_| Error::DeviceBusy("Device or resource busy".to_string()))
                .collect(),
        )
    }

    pub fn with_failures(failures: Vec<Error>) -> Self {
        Self {
            failures: Mutex::new(failures.into()),
            ..Self::default()
        }
    }

    /// Start calls so far, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Simulate hearing the wake phrase; no-op unless running
    pub fn fire(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        let callback = self.on_wake.lock().unwrap().take();
        if let Some(callback) = callback {
            callback();
        }
        true
    }
}

#[async_trait]
impl WakeWordSource for MockWakeSource {
    async fn start(&self, on_wake: WakeCallback) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        *self.on_wake.lock().unwrap() = Some(on_wake);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Recorder that hands out scripted transcripts in order
///
/// Returns an empty transcript once the script runs out, or when nothing
/// was being recorded.
#[derive(Default)]
pub struct ScriptedRecorder {
    script: Mutex<VecDeque<String>>,
    recording: AtomicBool,
    starts: AtomicUsize,
    fail_start: AtomicBool,
}

impl ScriptedRecorder {
    pub fn new(script: &[&str]) -> Self {
        Self {
            script: Mutex::new(script.iter().map(ToString::to_string).collect()),
            ..Self::default()
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Make every `start_listening` fail
    pub fn fail_starts(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Recorder for ScriptedRecorder {
    async fn start_listening(&self) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::Audio("no input device available".to_string()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_and_transcribe(&self) -> Result<String> {
        if !self.recording.swap(false, Ordering::SeqCst) {
            return Ok(String::new());
        }
        Ok(self.script.lock().unwrap().pop_front().unwrap_or_default())
    }

    fn stop(&self) {
        self.recording.store(false, Ordering::SeqCst);
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}

/// Voice backend that "plays" for a fixed time unless cancelled
#[derive(Clone)]
pub struct TimedVoice {
    pub duration: Duration,
    pub spoken: Arc<Mutex<Vec<String>>>,
    pub cancelled: Arc<AtomicUsize>,
}

impl TimedVoice {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            spoken: Arc::default(),
            cancelled: Arc::default(),
        }
    }
}

#[async_trait]
impl VoiceBackend for TimedVoice {
    async fn play(&self, text: &str, cancel: &CancelToken) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        tokio::select! {
            () = tokio::time::sleep(self.duration) => {}
            () = cancel.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

/// Responder with a fixed reply that counts its calls
pub struct CountingResponder {
    reply: String,
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
}

impl CountingResponder {
    pub fn new(reply: &str) -> Self {
        Self::slow(reply, Duration::ZERO)
    }

    pub fn slow(reply: &str, delay: Duration) -> Self {
        Self {
            reply: reply.to_string(),
            delay,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with a responder error
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Responder for CountingResponder {
    fn name(&self) -> &str {
        "counting"
    }

    async fn ask(&self, _question: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(Error::Responder("backend unavailable".to_string()));
        }
        Ok(self.reply.clone())
    }
}

/// A controller wired to fakes, with handles to inspect them
pub struct Harness {
    pub controller: SessionController,
    pub events: broadcast::Receiver<SessionEvent>,
    pub state: watch::Receiver<SessionState>,
    pub source: Arc<MockWakeSource>,
    pub recorder: Arc<ScriptedRecorder>,
    pub responder: Arc<CountingResponder>,
    pub voice: TimedVoice,
    pub tasks: Arc<TaskStore>,
}

/// Playback length used by [`HarnessBuilder`] unless overridden
pub const PLAYBACK: Duration = Duration::from_secs(2);

pub struct HarnessBuilder {
    script: Vec<String>,
    responder: CountingResponder,
    source: MockWakeSource,
    playback: Duration,
}

impl HarnessBuilder {
    pub fn new(script: &[&str]) -> Self {
        Self {
            script: script.iter().map(ToString::to_string).collect(),
            responder: CountingResponder::new("The capital of Peru is Lima."),
            source: MockWakeSource::default(),
            playback: PLAYBACK,
        }
    }

    pub fn responder(mut self, responder: CountingResponder) -> Self {
        self.responder = responder;
        self
    }

    pub fn source(mut self, source: MockWakeSource) -> Self {
        self.source = source;
        self
    }

    pub fn playback(mut self, playback: Duration) -> Self {
        self.playback = playback;
        self
    }

    /// Spawn the controller; call inside a tokio runtime
    pub fn spawn(self) -> Harness {
        let script: Vec<&str> = self.script.iter().map(String::as_str).collect();
        let source = Arc::new(self.source);
        let recorder = Arc::new(ScriptedRecorder::new(&script));
        let responder = Arc::new(self.responder);
        let voice = TimedVoice::new(self.playback);
        let tasks = Arc::new(TaskStore::in_memory());

        let supervisor = Arc::new(WakeSupervisor::new(
            Arc::clone(&source) as Arc<dyn WakeWordSource>,
            RetryPolicy::default(),
        ));
        let collaborators = Collaborators {
            supervisor,
            recorder: Arc::clone(&recorder) as Arc<dyn Recorder>,
            speaker: Arc::new(Speaker::new(voice.clone())),
            responder: Arc::clone(&responder) as Arc<dyn Responder>,
            tasks: Arc::clone(&tasks),
        };

        let controller = SessionController::spawn(collaborators, SessionSettings::default());
        let events = controller.subscribe();
        let state = controller.watch_state();

        Harness {
            controller,
            events,
            state,
            source,
            recorder,
            responder,
            voice,
            tasks,
        }
    }
}

impl Harness {
    /// Wait until the wake source is armed
    pub async fn wake_source_ready(&self) {
        tokio::time::timeout(WAIT_LIMIT, async {
            while !self.source.is_running() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("wake source never started");
    }

    /// Wait for the controller to enter `target`
    pub async fn wait_for(&mut self, target: SessionState) {
        tokio::time::timeout(WAIT_LIMIT, self.state.wait_for(|s| *s == target))
            .await
            .unwrap_or_else(|_| panic!("never reached {target}"))
            .expect("session loop stopped");
    }

    /// Collect events until one matches `stop`, inclusive
    pub async fn events_until(&mut self, stop: impl Fn(&SessionEvent) -> bool) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(WAIT_LIMIT, self.events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event stream closed");
            let done = stop(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    /// Collect every event emitted during the next `period` of virtual time
    pub async fn events_for(&mut self, period: Duration) -> Vec<SessionEvent> {
        let deadline = tokio::time::Instant::now() + period;
        let mut seen = Vec::new();
        while let Ok(event) = tokio::time::timeout_at(deadline, self.events.recv()).await {
            seen.push(event.expect("event stream closed"));
        }
        seen
    }

    pub fn spoken(&self) -> Vec<String> {
        self.voice.spoken.lock().unwrap().clone()
    }
}

/// Statuses in the order they were emitted
pub fn statuses(events: &[SessionEvent]) -> Vec<SessionState> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Status(s) => Some(*s),
            _ => None,
        })
        .collect()
}

/// Responses in the order they were emitted
pub fn responses(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Response(r) => Some(r.clone()),
            _ => None,
        })
        .collect()
}
