use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ryo_assistant::responder::{ModelRegistry, Responder};
use ryo_assistant::tasks::{Priority, TaskStore};
use ryo_assistant::{Config, intent};

/// Ryo - voice-activated desktop assistant
#[derive(Parser)]
#[command(name = "ryo", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to ~/.config/ryo/config.toml)
    #[arg(long, env = "RYO_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the assistant (the default)
    Run,
    /// Manage the task list
    Tasks {
        #[command(subcommand)]
        action: TasksCommand,
    },
    /// Ask one question through the model registry
    Ask {
        /// Backend to use instead of the configured default
        #[arg(short, long)]
        model: Option<String>,
        /// The question
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Show how an utterance is classified
    Parse {
        #[arg(required = true)]
        utterance: Vec<String>,
    },
    /// List model backends
    Models,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[derive(Subcommand)]
enum TasksCommand {
    /// Show all tasks
    List,
    /// Add a task
    Add {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Flip a task between pending and completed
    Toggle { id: u64 },
    /// Delete a task
    Remove { id: u64 },
    /// Delete all completed tasks
    Clear,
    /// Set a task's priority (low, normal, high)
    Priority { id: u64, level: Priority },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,ryo_assistant=info",
        1 => "info,ryo_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_assistant(config).await,
        Command::Tasks { action } => tasks(&config, action),
        Command::Ask { model, question } => ask(&config, model.as_deref(), &question.join(" ")).await,
        Command::Parse { utterance } => {
            parse(&utterance.join(" "));
            Ok(())
        }
        Command::Models => models(&config),
        Command::TestMic { duration } => test_mic(duration).await,
    }
}

#[cfg(feature = "audio")]
async fn run_assistant(config: Config) -> anyhow::Result<()> {
    use std::sync::Arc;

    use tokio::io::AsyncBufReadExt;
    use tokio::sync::broadcast::error::RecvError;

    use ryo_assistant::session::{Collaborators, SessionController, SessionSettings};
    use ryo_assistant::voice::{
        CloudVoice, MicRecorder, MicWakeSource, RetryPolicy, Speaker, SpeechToText, TextToSpeech,
        WakeSupervisor,
    };

    let stt = Arc::new(SpeechToText::from_config(&config.voice)?);
    let source = Arc::new(MicWakeSource::new(
        Arc::clone(&stt),
        &config.assistant.wake_phrase,
    ));
    let voice = CloudVoice::new(TextToSpeech::from_config(&config.voice)?);
    let registry = Arc::new(ModelRegistry::from_config(
        &config.responder,
        &config.assistant.name,
    )?);

    let collaborators = Collaborators {
        supervisor: Arc::new(WakeSupervisor::new(
            source,
            RetryPolicy::from(&config.device),
        )),
        recorder: Arc::new(MicRecorder::new(stt)),
        speaker: Arc::new(Speaker::new(voice)),
        responder: Arc::clone(&registry) as Arc<dyn Responder>,
        tasks: Arc::new(TaskStore::open(config.tasks.path.clone())?),
    };

    let controller = SessionController::spawn(collaborators, SessionSettings::from(&config));
    let mut events = controller.subscribe();
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    tracing::info!(
        "{} ready - say \"{}\" (enter: talk, m: mute, r: restart wake word, model <name>: switch model)",
        config.assistant.name,
        config.assistant.wake_phrase
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&config.assistant.name, &event),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
            line = stdin.next_line(), if stdin_open => match line? {
                Some(line) => match ConsoleCommand::parse(&line) {
                    ConsoleCommand::Activate => controller.activate(),
                    ConsoleCommand::ToggleMute => controller.toggle_mute(),
                    ConsoleCommand::RestartWake => controller.force_restart_wake(),
                    ConsoleCommand::Model(None) => println!(
                        "active model: {} (available: {})",
                        registry.active(),
                        registry.names().join(", ")
                    ),
                    ConsoleCommand::Model(Some(name)) => match registry.set_active(&name) {
                        Ok(()) => println!("switched to {name}"),
                        Err(e) => println!("{e} (available: {})", registry.names().join(", ")),
                    },
                    ConsoleCommand::Unknown(other) => println!("unknown input {other:?}"),
                },
                // Keep running on the wake word alone
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}

/// A line typed while the assistant is running
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(not(feature = "audio"), allow(dead_code))]
enum ConsoleCommand {
    Activate,
    ToggleMute,
    RestartWake,
    /// Show the active model, or switch to the named one
    Model(Option<String>),
    Unknown(String),
}

impl ConsoleCommand {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "" => return Self::Activate,
            "m" => return Self::ToggleMute,
            "r" => return Self::RestartWake,
            _ => {}
        }

        match line.split_once(char::is_whitespace) {
            Some(("model", name)) => Self::Model(Some(name.trim().to_string())),
            None if line == "model" => Self::Model(None),
            _ => Self::Unknown(line.to_string()),
        }
    }
}

#[cfg(not(feature = "audio"))]
#[allow(clippy::unused_async)]
async fn run_assistant(_config: Config) -> anyhow::Result<()> {
    anyhow::bail!("ryo was built without the `audio` feature")
}

#[cfg(feature = "audio")]
fn print_event(name: &str, event: &ryo_assistant::SessionEvent) {
    use ryo_assistant::SessionEvent;

    match event {
        SessionEvent::Status(state) => tracing::debug!(%state, "status"),
        SessionEvent::Transcript(text) => println!("You: {text}"),
        SessionEvent::Response(text) => println!("{name}: {text}"),
        SessionEvent::TasksChanged => tracing::info!("task list updated"),
        SessionEvent::Muted(muted) => println!("{}", if *muted { "Muted" } else { "Unmuted" }),
    }
}

fn tasks(config: &Config, action: TasksCommand) -> anyhow::Result<()> {
    let store = TaskStore::open(config.tasks.path.clone())?;

    match action {
        TasksCommand::List => {
            let tasks = store.list();
            if tasks.is_empty() {
                println!("No tasks");
                return Ok(());
            }
            for task in &tasks {
                println!("{:>4}  {task}", task.id);
            }
            let stats = store.stats();
            println!(
                "\n{} total, {} pending, {} completed ({:.0}%)",
                stats.total, stats.pending, stats.completed, stats.completion_rate
            );
        }
        TasksCommand::Add { text } => {
            let task = store.add(&text.join(" "))?;
            println!("Added #{}: {}", task.id, task.text);
        }
        TasksCommand::Toggle { id } => match store.toggle(id)? {
            Some(true) => println!("Completed #{id}"),
            Some(false) => println!("Reopened #{id}"),
            None => anyhow::bail!("no task with id {id}"),
        },
        TasksCommand::Remove { id } => match store.delete(id)? {
            Some(task) => println!("Removed #{id}: {}", task.text),
            None => anyhow::bail!("no task with id {id}"),
        },
        TasksCommand::Clear => {
            let removed = store.clear_completed()?;
            println!("Cleared {removed} completed tasks");
        }
        TasksCommand::Priority { id, level } => {
            if !store.set_priority(id, level)? {
                anyhow::bail!("no task with id {id}");
            }
            println!("Set #{id} to {level} priority");
        }
    }

    Ok(())
}

async fn ask(config: &Config, model: Option<&str>, question: &str) -> anyhow::Result<()> {
    let registry = ModelRegistry::from_config(&config.responder, &config.assistant.name)?;
    if let Some(model) = model {
        registry.set_active(model)?;
    }

    let answer = tokio::time::timeout(config.session.query_timeout, registry.ask(question))
        .await
        .map_err(|_| anyhow::anyhow!("no response within {:?}", config.session.query_timeout))??;

    println!("{answer}");
    Ok(())
}

fn parse(utterance: &str) {
    let command = intent::parse(utterance);
    println!("intent: {}", command.intent);
    if command.is_task_command() {
        println!("task:   {:?}", command.task_text);
        if command.needs_clarification() {
            println!("(no task text; would ask the user to repeat)");
        }
    }
}

fn models(config: &Config) -> anyhow::Result<()> {
    let registry = ModelRegistry::from_config(&config.responder, &config.assistant.name)?;
    let active = registry.active();
    for name in registry.names() {
        let marker = if name == active { '*' } else { ' ' };
        println!("{marker} {name}");
    }
    Ok(())
}

/// Print microphone levels once per second
#[cfg(feature = "audio")]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    use std::time::Duration;

    use ryo_assistant::voice::{MicStream, rms};

    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let stream = match tokio::task::spawn_blocking(MicStream::open).await? {
        Ok(stream) => stream,
        Err(e) if e.is_device_busy() => {
            println!("The microphone is busy: {e}");
            println!("Another application (or a stuck ryo instance) is holding it.");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    println!("Sample rate: {} Hz", stream.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = stream.take_buffer();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    tokio::task::spawn_blocking(move || drop(stream.close())).await?;

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

#[cfg(not(feature = "audio"))]
#[allow(clippy::unused_async)]
async fn test_mic(_duration: u64) -> anyhow::Result<()> {
    anyhow::bail!("ryo was built without the `audio` feature")
}
