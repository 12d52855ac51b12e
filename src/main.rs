use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use solus_client::voice::{CaptureThread, DefaultEngineFactory, Phase, tts};
use solus_client::{
    ChatRequest, DesktopActions, ModelManager, SessionController, SessionOptions, SettingsStore,
    SolusClient, VoiceManager, config, model,
};

/// Solus - hands-free voice assistant client
#[derive(Parser)]
#[command(name = "solus", version, about)]
struct Cli {
    /// Chat server host override (persisted to settings)
    #[arg(long)]
    server: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Don't start listening automatically
    #[arg(long)]
    no_listen: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Send one text message to the assistant and print the reply
    Chat {
        /// Message text
        text: String,
    },
    /// Check chat server connectivity
    Health,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Manage offline recognition models
    Model {
        #[command(subcommand)]
        command: ModelCommand,
    },
    /// Manage synthesis voices
    Voice {
        #[command(subcommand)]
        command: VoiceCommand,
    },
    /// Change the wake phrase
    SetWakeWord {
        /// New wake phrase, e.g. "hey solus"
        phrase: String,
    },
    /// Forget the current conversation and start a fresh one
    ResetConversation,
}

#[derive(Subcommand)]
enum ModelCommand {
    /// List known models and their install state
    List,
    /// Download and install a model
    Download {
        /// Model id (see `model list`)
        id: String,
    },
    /// Delete an installed model
    Remove {
        /// Model id
        id: String,
    },
}

#[derive(Subcommand)]
enum VoiceCommand {
    /// List known voices and their install state
    List,
    /// Download and install a voice
    Download {
        /// Voice id (see `voice list`)
        id: String,
    },
    /// Select the voice used for spoken replies
    Use {
        /// Voice id
        id: String,
    },
    /// Delete an installed voice
    Remove {
        /// Voice id
        id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,solus_client=info",
        1 => "info,solus_client=debug",
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
    let settings = Arc::new(SettingsStore::open()?);
    if let Some(server) = cli.server {
        // Persisted so the daemon and one-shot commands agree on the server
        settings.set_server_host(server)?;
    }

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Chat { text } => chat_once(&settings, text).await,
            Command::Health => health(&settings).await,
            Command::TestMic { duration } => test_mic(duration).await,
            Command::Model { command } => match command {
                ModelCommand::List => model_list(&settings),
                ModelCommand::Download { id } => model_download(&id).await,
                ModelCommand::Remove { id } => model_remove(&id),
            },
            Command::Voice { command } => match command {
                VoiceCommand::List => voice_list(&settings),
                VoiceCommand::Download { id } => voice_download(&id).await,
                VoiceCommand::Use { id } => voice_use(&settings, id),
                VoiceCommand::Remove { id } => voice_remove(&id),
            },
            Command::SetWakeWord { phrase } => {
                settings.set_wake_word(phrase.clone())?;
                println!("Wake phrase set to \"{phrase}\"");
                Ok(())
            }
            Command::ResetConversation => {
                settings.set_conversation_id(None)?;
                println!("Conversation reset");
                Ok(())
            }
        };
    }

    run_assistant(settings, cli.no_listen).await
}

/// Run the voice assistant until interrupted
async fn run_assistant(settings: Arc<SettingsStore>, no_listen: bool) -> anyhow::Result<()> {
    let current = settings.current();
    tracing::info!(
        server = %current.server_base_url(),
        wake_word = %current.wake_word,
        model = %current.model_id,
        "starting solus client"
    );

    let models = ModelManager::new(config::data_dir().join("models"));
    if !models.is_installed(&current.model_id) {
        tracing::warn!(
            "offline model not installed; run `solus model download {}`",
            current.model_id
        );
    }

    let voices = VoiceManager::new(config::data_dir().join("voices"));
    if current.tts_enabled && voices.pick_voice(&current.tts_voice).is_none() {
        tracing::warn!(
            "spoken replies enabled but no voice installed; run `solus voice download {}`",
            current.tts_voice
        );
    }

    let factory = Box::new(DefaultEngineFactory::new(
        Arc::clone(&settings),
        config::data_dir().join("models"),
    ));
    let chat = Arc::new(SolusClient::new(&current.server_base_url()));
    let actions = Arc::new(DesktopActions::new(config::data_dir()));

    let handle = SessionController::spawn(
        factory,
        chat,
        actions,
        Arc::clone(&settings),
        SessionOptions::default(),
    );

    if current.auto_start && !no_listen {
        match handle.start().await {
            Ok(()) => println!("Listening - say \"{}\"", current.wake_word),
            Err(e) => {
                tracing::error!(error = %e, "could not start listening");
                println!("Not listening: {e}");
            }
        }
    } else {
        println!("Started idle (pass nothing and omit --no-listen to auto-start)");
    }

    let mut status = handle.status();
    let mut last_phase = Phase::Idle;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                handle.shutdown().await;
                return Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let snapshot = status.borrow_and_update().clone();
                if snapshot.phase != last_phase {
                    last_phase = snapshot.phase;
                    println!("[{}]", snapshot.phase.label());
                }
                if let Some(message) = snapshot.message {
                    println!("  {message}");
                }
            }
        }
    }
}

/// Send one text turn, bypassing the microphone
async fn chat_once(settings: &SettingsStore, text: String) -> anyhow::Result<()> {
    let current = settings.current();
    let client = SolusClient::new(&current.server_base_url());

    let reply = client
        .send_chat(&ChatRequest {
            text,
            user_id: current.user_id,
            conversation_id: current.conversation_id,
        })
        .await?;

    settings.set_conversation_id(Some(reply.conversation_id))?;
    println!("{}", reply.response_text);
    if let Some(action) = reply.action {
        println!("(action: {})", action.kind);
    }
    Ok(())
}

/// Probe the chat server
async fn health(settings: &SettingsStore) -> anyhow::Result<()> {
    let base = settings.current().server_base_url();
    let client = SolusClient::new(&base);
    match client.health().await {
        Ok(()) => {
            println!("Server at {base} is healthy");
            Ok(())
        }
        Err(e) => anyhow::bail!("server at {base} is unhealthy: {e}"),
    }
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    use solus_client::voice::capture::rms_energy;

    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let capture = tokio::task::spawn_blocking(CaptureThread::spawn).await??;

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = rms_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    Ok(())
}

/// List known models and their install state
fn model_list(settings: &SettingsStore) -> anyhow::Result<()> {
    let manager = ModelManager::new(config::data_dir().join("models"));
    let active = settings.current().model_id;

    for spec in model::CATALOG {
        let installed = if manager.is_installed(spec.id) {
            "installed"
        } else {
            "not installed"
        };
        let marker = if spec.id == active { "*" } else { " " };
        println!(
            "{marker} {:<36} {:>6} MB  {installed:<13} {}",
            spec.id, spec.size_mb, spec.description
        );
    }
    println!("\n* = selected in settings");
    Ok(())
}

/// Download and install a model
async fn model_download(id: &str) -> anyhow::Result<()> {
    let manager = ModelManager::new(config::data_dir().join("models"));
    if manager.is_installed(id) {
        println!("{id} is already installed");
        return Ok(());
    }

    println!("Downloading {id}...");
    let path = manager
        .download(
            id,
            Arc::new(|percent| {
                print!("\r{percent:>3}%");
                let _ = std::io::Write::flush(&mut std::io::stdout());
            }),
        )
        .await?;

    println!("\nInstalled to {}", path.display());
    Ok(())
}

/// Delete an installed model
fn model_remove(id: &str) -> anyhow::Result<()> {
    let manager = ModelManager::new(config::data_dir().join("models"));
    manager.remove(id)?;
    println!("Removed {id}");
    Ok(())
}

/// List known voices and their install state
fn voice_list(settings: &SettingsStore) -> anyhow::Result<()> {
    let manager = VoiceManager::new(config::data_dir().join("voices"));
    let active = settings.current().tts_voice;

    for spec in tts::VOICES {
        let installed = if manager.is_installed(spec.id) {
            "installed"
        } else {
            "not installed"
        };
        let marker = if spec.id == active { "*" } else { " " };
        println!(
            "{marker} {:<24} {:>4} MB  {installed:<13} {}",
            spec.id, spec.size_mb, spec.description
        );
    }
    println!("\n* = selected in settings");
    Ok(())
}

/// Download and install a voice
async fn voice_download(id: &str) -> anyhow::Result<()> {
    let manager = VoiceManager::new(config::data_dir().join("voices"));
    if manager.is_installed(id) {
        println!("{id} is already installed");
        return Ok(());
    }

    println!("Downloading {id}...");
    manager
        .download(
            id,
            Arc::new(|percent| {
                print!("\r{percent:>3}%");
                let _ = std::io::Write::flush(&mut std::io::stdout());
            }),
        )
        .await?;

    println!("\nInstalled {id}");
    Ok(())
}

/// Select the voice used for spoken replies
fn voice_use(settings: &SettingsStore, id: String) -> anyhow::Result<()> {
    if tts::find_voice(&id).is_none() {
        anyhow::bail!("unknown voice: {id} (see `solus voice list`)");
    }
    settings.set_tts_voice(id.clone())?;
    println!("Voice set to {id}");
    Ok(())
}

/// Delete an installed voice
fn voice_remove(id: &str) -> anyhow::Result<()> {
    let manager = VoiceManager::new(config::data_dir().join("voices"));
    manager.remove(id)?;
    println!("Removed {id}");
    Ok(())
}
