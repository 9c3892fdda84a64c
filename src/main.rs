use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

use parley::config::{MODELS, VOICES};
use parley::playback::clip_label;
use parley::server::OllamaClient;
use parley::voice::{AudioCapture, list_input_devices};
use parley::{
    ChatSession, ClientConfig, Config, PlaybackController, PlaybackEvent, Role, SendOutcome,
    SessionEvent,
};

type InputLines = Lines<BufReader<Stdin>>;

/// Parley - Voice chat with local language models
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Chat backend URL
    #[arg(long)]
    server_url: Option<String>,

    /// Model identifier (see `parley models`)
    #[arg(short, long)]
    model: Option<String>,

    /// Voice identifier (see `parley voices`)
    #[arg(long)]
    voice: Option<String>,

    /// Input device name (see `parley devices`)
    #[arg(short, long)]
    device: Option<String>,

    /// Start with audio output disabled
    #[arg(long)]
    mute: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Chat interactively (default)
    Chat,
    /// Run the relay server
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
    /// List input devices
    Devices,
    /// List selectable models
    Models {
        /// Ask Ollama which models are installed
        #[arg(long)]
        installed: bool,
    },
    /// List selectable voices
    Voices,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

/// What the REPL does after a line
enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, env.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

/// `-v` flags win; without them `RUST_LOG` directives apply if they parse
fn log_filter(verbose: u8, env: Option<&str>) -> EnvFilter {
    if verbose == 0
        && let Some(directives) = env.filter(|d| !d.trim().is_empty())
        && let Ok(filter) = EnvFilter::try_new(directives)
    {
        return filter;
    }

    EnvFilter::new(match verbose {
        0 => "info,parley=info",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    })
}

#[allow(clippy::future_not_send)]
async fn run(mut cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;

    match cli.command.take() {
        Some(Command::Serve { port }) => {
            if let Some(port) = port {
                config.server.port = port;
            }
            parley::server::serve(&config.server).await?;
            Ok(())
        }
        Some(Command::Devices) => list_devices(config.client.settings.input_device()),
        Some(Command::Models { installed }) => {
            let installed = if installed {
                let ollama = OllamaClient::new(reqwest::Client::new(), &config.server.ollama_url);
                Some(ollama.list_models().await?)
            } else {
                None
            };

            for model in MODELS {
                let marker = marker(model.id == config.client.settings.model());
                let status = match &installed {
                    Some(names) if names.iter().any(|n| n == model.id) => "installed",
                    Some(_) => "missing",
                    None => "",
                };
                println!("{marker} {:<22} {:<28} {status}", model.id, model.name);
            }
            Ok(())
        }
        Some(Command::Voices) => {
            for voice in VOICES {
                let marker = marker(voice.id == config.client.settings.voice());
                println!("{marker} {:<22} {}", voice.id, voice.name);
            }
            Ok(())
        }
        Some(Command::TestMic { duration }) => {
            let device = cli.device.clone().or_else(|| {
                config
                    .client
                    .settings
                    .input_device()
                    .map(ToString::to_string)
            });
            test_mic(device.as_deref(), duration).await
        }
        Some(Command::Chat) | None => {
            let client = apply_overrides(config.client, &cli)?;
            chat(&client).await
        }
    }
}

fn apply_overrides(mut client: ClientConfig, cli: &Cli) -> anyhow::Result<ClientConfig> {
    if let Some(url) = &cli.server_url {
        client.server_url.clone_from(url);
    }
    if let Some(model) = &cli.model {
        client.settings.select_model(model)?;
    }
    if let Some(voice) = &cli.voice {
        client.settings.select_voice(voice)?;
    }
    if cli.device.is_some() {
        client.settings.select_input_device(cli.device.clone());
    }
    if cli.mute {
        client.audio_enabled = false;
    }
    Ok(client)
}

const fn marker(selected: bool) -> char {
    if selected { '*' } else { ' ' }
}

fn list_devices(selected: Option<&str>) -> anyhow::Result<()> {
    let devices = list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found");
    }
    for name in devices {
        println!("{} {name}", marker(selected == Some(name.as_str())));
    }
    Ok(())
}

fn print_help() {
    println!("Type a message and press Enter to chat. Commands:");
    println!("  /rec              record a voice message (Enter to stop)");
    println!("  /audio            toggle audio output");
    println!("  /model [id]       show or select the model");
    println!("  /voice [id]       show or select the voice");
    println!("  /device [name]    show or select the input device (\"default\" to reset)");
    println!("  /devices          list input devices");
    println!("  /quit             exit");
}

#[allow(clippy::future_not_send)]
async fn chat(config: &ClientConfig) -> anyhow::Result<()> {
    let mut session = ChatSession::from_config(config)?;
    let playback = session.playback().clone();

    tokio::spawn(print_events(session.subscribe(), playback.subscribe()));

    println!(
        "Connected to {} (model {}, voice {}, audio {})",
        config.server_url,
        session.settings().model(),
        session.settings().voice(),
        if playback.is_enabled() { "on" } else { "off" }
    );
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Flow::Quit = handle_line(&mut session, &mut lines, &playback, line.trim()).await? {
            break;
        }
    }

    session.playback().reset();
    Ok(())
}

#[allow(clippy::future_not_send)]
async fn handle_line(
    session: &mut ChatSession,
    lines: &mut InputLines,
    playback: &PlaybackController,
    line: &str,
) -> anyhow::Result<Flow> {
    let (command, arg) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(c, a)| (c, a.trim()));

    match command {
        "" => {}
        "/quit" | "/exit" => return Ok(Flow::Quit),
        "/help" => print_help(),
        "/audio" => toggle_audio(playback),
        "/model" if arg.is_empty() => println!("model: {}", session.settings().model()),
        "/model" => match session.settings_mut().select_model(arg) {
            Ok(()) => println!("model: {arg}"),
            Err(e) => println!("{e}"),
        },
        "/voice" if arg.is_empty() => println!("voice: {}", session.settings().voice()),
        "/voice" => match session.settings_mut().select_voice(arg) {
            Ok(()) => println!("voice: {arg}"),
            Err(e) => println!("{e}"),
        },
        "/device" if arg.is_empty() => println!(
            "input device: {}",
            session.settings().input_device().unwrap_or("system default")
        ),
        "/device" => {
            let device = (arg != "default").then(|| arg.to_string());
            session.settings_mut().select_input_device(device);
            println!(
                "input device: {}",
                session.settings().input_device().unwrap_or("system default")
            );
        }
        "/devices" => list_devices(session.settings().input_device())?,
        "/rec" => record(session, lines, playback).await?,
        _ if command.starts_with('/') => println!("unknown command: {command} (try /help)"),
        _ => {
            let outcome = run_cycle(session.send(line), lines, playback).await?;
            report(outcome);
        }
    }

    Ok(Flow::Continue)
}

#[allow(clippy::future_not_send)]
async fn record(
    session: &mut ChatSession,
    lines: &mut InputLines,
    playback: &PlaybackController,
) -> anyhow::Result<()> {
    if !session.start_recording() {
        println!("(could not start recording)");
        return Ok(());
    }

    println!("(recording, press Enter to stop)");
    lines.next_line().await?;

    let outcome = run_cycle(session.stop_recording(), lines, playback).await?;
    report(outcome);
    Ok(())
}

/// Drive a send cycle while still reading input; only `/audio` is honored
#[allow(clippy::future_not_send)]
async fn run_cycle<F>(
    cycle: F,
    lines: &mut InputLines,
    playback: &PlaybackController,
) -> anyhow::Result<SendOutcome>
where
    F: Future<Output = SendOutcome>,
{
    tokio::pin!(cycle);
    let mut input_open = true;

    loop {
        tokio::select! {
            outcome = &mut cycle => return Ok(outcome),
            line = lines.next_line(), if input_open => match line?.as_deref().map(str::trim) {
                Some("/audio") => toggle_audio(playback),
                Some("") => {}
                Some(_) => println!("(busy, wait for the response to finish)"),
                None => input_open = false,
            },
        }
    }
}

fn toggle_audio(playback: &PlaybackController) {
    let enabled = !playback.is_enabled();
    playback.set_enabled(enabled);
    println!("(audio {})", if enabled { "on" } else { "off" });
}

fn report(outcome: SendOutcome) {
    match outcome {
        SendOutcome::Aborted { records } => {
            println!("(response interrupted after {records} sentence(s), see log)");
        }
        SendOutcome::Skipped(reason) => tracing::debug!(?reason, "input skipped"),
        SendOutcome::Completed { records } => tracing::debug!(records, "response complete"),
    }
}

async fn print_events(
    mut session_events: broadcast::Receiver<SessionEvent>,
    mut playback_events: broadcast::Receiver<PlaybackEvent>,
) {
    loop {
        tokio::select! {
            event = session_events.recv() => match event {
                Ok(SessionEvent::MessageAdded(message)) => match message.role() {
                    Role::Bot => println!("bot> {}", message.text()),
                    Role::User => println!("you> {}", message.text()),
                },
                Ok(SessionEvent::BotTyping(true)) => println!("(bot is typing...)"),
                Ok(SessionEvent::ProcessingSpeech(true)) => println!("(processing speech...)"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "session events lagged"),
                Err(RecvError::Closed) => break,
            },
            event = playback_events.recv() => match event {
                Ok(PlaybackEvent::Failed { clip, error }) => {
                    tracing::warn!(clip = clip_label(&clip), error = %error, "clip skipped");
                }
                Ok(PlaybackEvent::Idle) => tracing::debug!("playback idle"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "playback events lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }
}

#[allow(clippy::future_not_send)]
async fn test_mic(device: Option<&str>, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::open(device)?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Device: {}", device.unwrap_or("system default"));
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.peek_buffer();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

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

        capture.clear_buffer();
    }

    capture.stop();

    println!("\n---");
    println!("If the meter moved, the microphone is working.");
    println!("If RMS stayed near 0, check the device with `parley devices`.");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
