//! Command loop driving the session state machine

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use super::classify::{self, HELP_TEXT};
use super::{Collaborators, SessionEvent, SessionSettings, SessionState};
use crate::Error;
use crate::intent::{self, TaskCommand};
use crate::tasks;
use crate::voice::{PlaybackOutcome, WakeCallback};

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CAPACITY: usize = 256;

/// Shown when the responder fails or times out
const APOLOGY: &str = "Sorry, I couldn't get an answer right now.";

const TASK_ERROR: &str = "Sorry, I couldn't update your task list.";

const SESSION_ENDED: &str = "Session ended.";

/// Messages consumed by the session loop
///
/// Results of background work carry the counter they were started under so
/// late arrivals can be recognized and dropped.
#[derive(Debug)]
enum Command {
    Wake {
        manual: bool,
    },
    CaptureElapsed {
        cycle: u64,
    },
    CaptureFailed {
        cycle: u64,
        error: String,
    },
    Transcribed {
        cycle: u64,
        result: Result<String, String>,
    },
    Responded {
        exchange: u64,
        result: Result<String, String>,
    },
    PlaybackDone {
        utterance: u64,
        result: Result<PlaybackOutcome, String>,
    },
    InterruptHeard {
        exchange: u64,
        text: String,
    },
    SessionTimeout {
        generation: u64,
    },
    RestartWake {
        epoch: u64,
    },
    ForceRestartWake,
    ToggleMute,
    Shutdown,
}

/// Handle to a running session loop
///
/// Created with [`SessionController::spawn`]; every method just posts a
/// command, so they are cheap and never block.
pub struct SessionController {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SessionEvent>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SessionController {
    /// Start the session loop and arm the wake source
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(collaborators: Collaborators, settings: SessionSettings) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state_tx, state) = watch::channel(SessionState::Idle);

        let session = Session {
            c: collaborators,
            settings,
            commands: commands.clone(),
            events: events.clone(),
            state_tx,
            state: SessionState::Idle,
            listening_mode: false,
            cycle: 0,
            exchange: 0,
            utterance: 0,
            timer_generation: 0,
            idle_epoch: 0,
            timer: None,
            capture: None,
            interrupt: None,
        };

        let task = tokio::spawn(session.run(rx));
        let controller = Self {
            commands,
            events,
            state,
            task,
        };
        controller.send(Command::RestartWake { epoch: 0 });
        controller
    }

    /// Receive session events from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current phase
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch phase changes
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Report a wake phrase detection
    pub fn wake(&self) {
        self.send(Command::Wake { manual: false });
    }

    /// Start a session without the wake phrase (push-to-talk)
    pub fn activate(&self) {
        self.send(Command::Wake { manual: true });
    }

    /// Flip speech output mute; answered with [`SessionEvent::Muted`]
    pub fn toggle_mute(&self) {
        self.send(Command::ToggleMute);
    }

    /// End any session and restart the wake source from scratch
    pub fn force_restart_wake(&self) {
        self.send(Command::ForceRestartWake);
    }

    /// Callback that reports wake detections to this controller
    #[must_use]
    pub fn wake_callback(&self) -> WakeCallback {
        wake_callback(&self.commands)
    }

    /// Stop playback, capture and the wake source, then end the loop
    pub async fn shutdown(self) {
        self.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "session loop panicked");
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("session loop has stopped");
        }
    }
}

fn wake_callback(commands: &mpsc::UnboundedSender<Command>) -> WakeCallback {
    let commands = commands.clone();
    Arc::new(move || {
        let _ = commands.send(Command::Wake { manual: false });
    })
}

/// State owned by the loop task
struct Session {
    c: Collaborators,
    settings: SessionSettings,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SessionEvent>,
    state_tx: watch::Sender<SessionState>,

    state: SessionState,
    /// Keep looping through capture windows after each exchange
    listening_mode: bool,

    /// Capture window counter
    cycle: u64,
    /// Query counter; a bump discards the in-flight response
    exchange: u64,
    /// Playback counter
    utterance: u64,
    timer_generation: u64,
    /// Bumped on every idle entry so only the latest wake restart runs
    idle_epoch: u64,

    timer: Option<JoinHandle<()>>,
    capture: Option<JoinHandle<()>>,
    interrupt: Option<JoinHandle<()>>,
}

impl Session {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            tracing::trace!(?command, state = %self.state, "session command");
            if matches!(command, Command::Shutdown) {
                self.shutdown();
                break;
            }
            self.handle(command);
        }
        tracing::debug!("session loop finished");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Wake { manual } => self.on_wake(manual),
            Command::CaptureElapsed { cycle } => self.on_capture_elapsed(cycle),
            Command::CaptureFailed { cycle, error } => self.on_capture_failed(cycle, &error),
            Command::Transcribed { cycle, result } => self.on_transcribed(cycle, result),
            Command::Responded { exchange, result } => self.on_responded(exchange, result),
            Command::PlaybackDone { utterance, result } => {
                self.on_playback_done(utterance, result);
            }
            Command::InterruptHeard { exchange, text } => self.on_interrupt_heard(exchange, &text),
            Command::SessionTimeout { generation } => self.on_timeout(generation),
            Command::RestartWake { epoch } => self.on_restart_wake(epoch),
            Command::ForceRestartWake => self.on_force_restart(),
            Command::ToggleMute => {
                let muted = self.c.speaker.toggle_mute();
                self.emit(SessionEvent::Muted(muted));
            }
            Command::Shutdown => self.shutdown(),
        }
    }

    // -- triggers -------------------------------------------------------------

    fn on_wake(&mut self, manual: bool) {
        if self.state.is_active() {
            tracing::debug!(state = %self.state, "session already active, ignoring wake");
            return;
        }

        tracing::info!(manual, "session started");
        self.idle_epoch += 1;
        self.listening_mode = true;
        self.c.supervisor.stop();
        self.c.speaker.stop();
        self.restart_timer();
        self.open_capture_window();
    }

    fn on_capture_elapsed(&mut self, cycle: u64) {
        if cycle != self.cycle || self.state != SessionState::ListeningActive {
            tracing::trace!(cycle, "stale capture window");
            return;
        }

        self.capture = None;
        self.set_state(SessionState::Thinking);

        let recorder = Arc::clone(&self.c.recorder);
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let result = recorder
                .stop_and_transcribe()
                .await
                .map_err(|e| e.to_string());
            let _ = commands.send(Command::Transcribed { cycle, result });
        });
    }

    fn on_capture_failed(&mut self, cycle: u64, error: &str) {
        if cycle != self.cycle || self.state != SessionState::ListeningActive {
            return;
        }

        tracing::warn!(error, "could not start recording, ending session");
        self.capture = None;
        self.reset_to_idle();
    }

    fn on_transcribed(&mut self, cycle: u64, result: Result<String, String>) {
        if cycle != self.cycle || self.state != SessionState::Thinking {
            tracing::trace!(cycle, "stale transcription");
            return;
        }

        let text = match result {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                String::new()
            }
        };

        if text.is_empty() {
            tracing::debug!("nothing heard");
            self.continue_session(false);
            return;
        }

        tracing::info!(transcript = %text, "heard command");
        self.emit(SessionEvent::Transcript(text.clone()));
        self.restart_timer();

        if classify::is_cancel(&text) {
            tracing::info!("session cancelled by user");
            self.emit(SessionEvent::Response(SESSION_ENDED.to_string()));
            self.reset_to_idle();
            return;
        }

        if classify::is_meta_query(&text) {
            tracing::info!("help requested, ending session");
            self.emit(SessionEvent::Response(HELP_TEXT.to_string()));
            self.reset_to_idle();
            return;
        }

        let command = intent::parse(&text);
        if command.is_task_command() {
            self.run_task_command(&command);
        } else {
            self.ask(text);
        }
    }

    fn on_responded(&mut self, exchange: u64, result: Result<String, String>) {
        if exchange != self.exchange || self.state != SessionState::Thinking {
            tracing::debug!(exchange, "discarding stale response");
            return;
        }

        self.close_interrupt_window();
        match result {
            Ok(answer) => {
                tracing::info!(chars = answer.len(), "response ready");
                self.emit(SessionEvent::Response(answer.clone()));
                if classify::is_prompting_response(&answer) {
                    // Hand the turn back; the user re-arms with the wake phrase
                    self.listening_mode = false;
                    self.speak(answer, false);
                } else {
                    self.speak(answer, true);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "query failed");
                self.emit(SessionEvent::Response(APOLOGY.to_string()));
                self.continue_session(true);
            }
        }
    }

    fn on_playback_done(&mut self, utterance: u64, result: Result<PlaybackOutcome, String>) {
        if utterance != self.utterance || self.state != SessionState::Speaking {
            tracing::trace!(utterance, "stale playback result");
            return;
        }

        match result {
            Ok(outcome) => tracing::debug!(%outcome, "playback ended"),
            Err(e) => tracing::warn!(error = %e, "playback failed"),
        }
        self.close_interrupt_window();
        self.continue_session(true);
    }

    fn on_interrupt_heard(&mut self, exchange: u64, text: &str) {
        if exchange != self.exchange
            || !matches!(self.state, SessionState::Thinking | SessionState::Speaking)
        {
            return;
        }

        self.interrupt = None;
        if classify::is_interrupt(text, &self.settings.wake_phrase) {
            self.barge_in(text);
        } else if !text.trim().is_empty() {
            tracing::debug!(heard = %text, "ignoring speech during reply");
        }
    }

    fn on_timeout(&mut self, generation: u64) {
        if generation != self.timer_generation || !self.state.is_active() {
            return;
        }

        tracing::info!(state = %self.state, "session timed out");
        self.reset_to_idle();
    }

    fn on_restart_wake(&self, epoch: u64) {
        if epoch != self.idle_epoch || self.state.is_active() {
            tracing::trace!(epoch, "stale wake restart");
            return;
        }

        let supervisor = Arc::clone(&self.c.supervisor);
        let on_wake = wake_callback(&self.commands);
        tokio::spawn(async move {
            if !supervisor.start_with_retry(on_wake).await {
                tracing::debug!("wake source not running after restart");
            }
        });
    }

    fn on_force_restart(&mut self) {
        if self.state.is_active() {
            self.end_session();
        }
        // Drop any restart already scheduled by the idle entry
        self.idle_epoch += 1;

        let supervisor = Arc::clone(&self.c.supervisor);
        let on_wake = wake_callback(&self.commands);
        tokio::spawn(async move {
            supervisor.force_restart(on_wake).await;
        });
    }

    fn shutdown(&mut self) {
        tracing::info!("session controller shutting down");
        self.end_session();
        self.idle_epoch += 1;
        self.c.supervisor.stop();
    }

    // -- exchange steps -------------------------------------------------------

    fn run_task_command(&mut self, command: &TaskCommand) {
        let reply = match tasks::apply_command(&self.c.tasks, command, self.settings.match_threshold)
        {
            Ok(reply) => {
                if reply.changed {
                    self.emit(SessionEvent::TasksChanged);
                }
                reply.text
            }
            Err(e) => {
                tracing::error!(error = %e, intent = %command.intent, "task command failed");
                TASK_ERROR.to_string()
            }
        };

        self.emit(SessionEvent::Response(reply.clone()));
        self.speak(reply, false);
    }

    /// Send the text to the responder; stays in Thinking until it answers
    fn ask(&mut self, question: String) {
        self.exchange += 1;
        let exchange = self.exchange;

        // The query has its own deadline; the idle timer resumes with the reply
        self.cancel_timer();
        self.open_interrupt_window(exchange);

        let responder = Arc::clone(&self.c.responder);
        let commands = self.commands.clone();
        let limit = self.settings.query_timeout;
        tokio::spawn(async move {
            let result = match tokio::time::timeout(limit, responder.ask(&question)).await {
                Ok(Ok(answer)) => Ok(answer),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(Error::Timeout(format!(
                    "no response within {}s",
                    limit.as_secs()
                ))
                .to_string()),
            };
            let _ = commands.send(Command::Responded { exchange, result });
        });
    }

    fn speak(&mut self, text: String, interruptible: bool) {
        self.utterance += 1;
        let utterance = self.utterance;

        self.set_state(SessionState::Speaking);
        self.restart_timer();
        if interruptible {
            self.open_interrupt_window(self.exchange);
        }

        let speaker = Arc::clone(&self.c.speaker);
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let result = speaker.speak(&text).await.map_err(|e| e.to_string());
            let _ = commands.send(Command::PlaybackDone { utterance, result });
        });
    }

    fn barge_in(&mut self, heard: &str) {
        tracing::info!(heard, state = %self.state, "interrupted by user");
        self.c.speaker.stop();
        self.exchange += 1;
        self.utterance += 1;
        self.listening_mode = true;
        self.restart_timer();
        self.open_capture_window();
    }

    /// Reopen the capture window or go idle, per `listening_mode`
    ///
    /// `activity` restarts the inactivity timer; empty captures leave it
    /// running so a silent session still times out.
    fn continue_session(&mut self, activity: bool) {
        if self.listening_mode {
            if activity {
                self.restart_timer();
            }
            self.open_capture_window();
        } else {
            self.reset_to_idle();
        }
    }

    fn open_capture_window(&mut self) {
        self.cycle += 1;
        let cycle = self.cycle;
        self.set_state(SessionState::ListeningActive);

        if let Some(handle) = self.capture.take() {
            handle.abort();
        }

        let recorder = Arc::clone(&self.c.recorder);
        let commands = self.commands.clone();
        let lead_in = self.settings.handoff_delay;
        let window = self.settings.capture_window;
        self.capture = Some(tokio::spawn(async move {
            tokio::time::sleep(lead_in).await;
            let command = match recorder.start_listening().await {
                Ok(()) => {
                    tokio::time::sleep(window).await;
                    Command::CaptureElapsed { cycle }
                }
                Err(e) => Command::CaptureFailed {
                    cycle,
                    error: e.to_string(),
                },
            };
            let _ = commands.send(command);
        }));
    }

    /// Short capture alongside a query or playback to catch "stop" or the
    /// wake phrase
    ///
    /// The microphone was released just before, so the window waits out the
    /// settle delay before reopening it.
    fn open_interrupt_window(&mut self, exchange: u64) {
        self.close_interrupt_window();

        let recorder = Arc::clone(&self.c.recorder);
        let commands = self.commands.clone();
        let settle = self.settings.settle_delay;
        let window = self.settings.interrupt_window;
        self.interrupt = Some(tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            if let Err(e) = recorder.start_listening().await {
                tracing::debug!(error = %e, "interrupt window unavailable");
                return;
            }
            tokio::time::sleep(window).await;
            match recorder.stop_and_transcribe().await {
                Ok(text) => {
                    let _ = commands.send(Command::InterruptHeard { exchange, text });
                }
                Err(e) => tracing::debug!(error = %e, "interrupt window transcription failed"),
            }
        }));
    }

    fn close_interrupt_window(&mut self) {
        if let Some(handle) = self.interrupt.take() {
            handle.abort();
            self.c.recorder.stop();
        }
    }

    // -- idle entry -----------------------------------------------------------

    /// Stop everything and enter Idle without re-arming the wake source
    fn end_session(&mut self) {
        self.cancel_timer();
        if let Some(handle) = self.capture.take() {
            handle.abort();
        }
        self.close_interrupt_window();

        self.cycle += 1;
        self.exchange += 1;
        self.utterance += 1;

        self.c.speaker.stop();
        self.c.recorder.stop();
        self.listening_mode = false;
        self.set_state(SessionState::Idle);
    }

    /// End the session and re-arm the wake source after the settle delay
    fn reset_to_idle(&mut self) {
        self.end_session();

        self.idle_epoch += 1;
        let epoch = self.idle_epoch;
        let commands = self.commands.clone();
        let delay = self.settings.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(Command::RestartWake { epoch });
        });
    }

    // -- plumbing -------------------------------------------------------------

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }

        tracing::info!(from = %self.state, to = %state, "session state changed");
        self.state = state;
        self.state_tx.send_replace(state);
        self.emit(SessionEvent::Status(state));
    }

    fn restart_timer(&mut self) {
        self.cancel_timer();

        let generation = self.timer_generation;
        let commands = self.commands.clone();
        let timeout = self.settings.timeout;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = commands.send(Command::SessionTimeout { generation });
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
        self.timer_generation += 1;
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
