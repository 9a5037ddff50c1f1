//! Voxbridge - Push-to-talk dictation for Wayland
//!
//! Run with `voxbridge` or `voxbridge daemon` to start the daemon.
//! Use `voxbridge setup` to check dependencies and download models.
//! Use `voxbridge transcribe <file>` to transcribe an audio file.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use voxbridge::asset::{AssetManager, AssetState, OllamaFetcher};
use voxbridge::cli::{Cli, Commands, RecordAction};
use voxbridge::config::{self, Config};
use voxbridge::format::{FormattingOutcome, FormattingStage, OllamaFormatter, TextFormatter};
use voxbridge::status::{StatusEvent, StatusSink};
use voxbridge::{audio, daemon, setup, transcribe};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("voxbridge={},warn", log_level))),
        )
        .with_target(false)
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;

    // CLI flags win over config file and environment
    if let Some(model) = cli.model {
        config.whisper.model = model;
    }
    if let Some(hotkey) = cli.hotkey {
        config.hotkey.key = hotkey;
    }
    if cli.no_format {
        config.formatter.enabled = false;
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let mut daemon = daemon::Daemon::new(config);
            daemon.run().await?;
        }

        Commands::Setup { download } => {
            setup::run_setup(&config, download).await?;
        }

        Commands::Pull { model } => {
            run_pull(&config, model.as_deref()).await?;
        }

        Commands::Transcribe { file } => {
            transcribe_file(&config, &file)?;
        }

        Commands::Format { text } => {
            run_format(&config, text).await?;
        }

        Commands::Config => {
            show_config(&config)?;
        }

        Commands::Status { follow, format } => {
            run_status(&config, follow, &format)?;
        }

        Commands::Record { action } => {
            run_record(&config, action)?;
        }
    }

    Ok(())
}

/// Transcribe a WAV file and print the result
fn transcribe_file(config: &Config, path: &Path) -> anyhow::Result<()> {
    println!("Reading {}", path.display());
    let samples = load_wav_mono_16k(path)?;
    println!(
        "Transcribing {:.2}s of audio ({} samples)...",
        samples.len() as f32 / 16000.0,
        samples.len()
    );

    let transcriber = transcribe::create_transcriber(&config.whisper)?;
    let text = transcriber.transcribe(&samples)?;

    println!("\n{}", text);
    Ok(())
}

/// Decode a WAV file into the mono 16kHz f32 form whisper expects
fn load_wav_mono_16k(path: &Path) -> anyhow::Result<Vec<f32>> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    println!(
        "WAV: {} Hz, {} channel(s), {:?}",
        spec.sample_rate, spec.channels, spec.sample_format
    );

    let raw: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => {
            reader.into_samples::<f32>().collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono: Vec<f32> = if spec.channels > 1 {
        raw.chunks(spec.channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        raw
    };

    if spec.sample_rate != 16000 {
        println!("Resampling from {} Hz to 16000 Hz...", spec.sample_rate);
    }
    Ok(audio::resample(&mono, spec.sample_rate, 16000))
}

/// Status sink that renders pull progress on a single terminal line
struct CliProgressSink;

impl StatusSink for CliProgressSink {
    fn publish(&self, event: StatusEvent) {
        if let StatusEvent::Asset { model, state } = event {
            match state {
                AssetState::Downloading(Some(frac)) => {
                    print!("\r  {}: downloading {:.0}%", model, frac * 100.0);
                    let _ = std::io::Write::flush(&mut std::io::stdout());
                }
                AssetState::Downloading(None) => {
                    print!("\r  {}: downloading...", model);
                    let _ = std::io::Write::flush(&mut std::io::stdout());
                }
                _ => {}
            }
        }
    }
}

/// Pull the formatter model into Ollama
async fn run_pull(config: &Config, model: Option<&str>) -> anyhow::Result<()> {
    let model = model.unwrap_or(&config.formatter.model).to_string();

    println!("Pulling {} via {}", model, config.formatter.endpoint);

    let assets = AssetManager::new(
        Arc::new(OllamaFetcher::new(&config.formatter.endpoint)),
        Arc::new(CliProgressSink),
    );

    let state = assets.ensure(&model).await;
    println!();

    match state {
        AssetState::Present => {
            setup::success_line(&format!("Model {} ready", model));
            Ok(())
        }
        AssetState::Error(reason) => anyhow::bail!("Pull failed: {}", reason),
        other => anyhow::bail!("Unexpected model state: {}", other),
    }
}

/// Reformat text through the LLM once and print the result
async fn run_format(config: &Config, text: Option<String>) -> anyhow::Result<()> {
    use std::io::Read;

    let input = match text {
        Some(t) => t,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let input = input.trim().to_string();
    if input.is_empty() {
        anyhow::bail!("No input text");
    }

    let formatter = Arc::new(OllamaFormatter::new(&config.formatter));

    let probe = formatter.clone();
    let reachable = tokio::task::spawn_blocking(move || probe.available()).await?;
    if !reachable {
        setup::warning_line(&format!(
            "Cannot reach Ollama at {}. Is `ollama serve` running?",
            config.formatter.endpoint
        ));
    }

    let stage = FormattingStage::new(formatter, Duration::from_secs(config.formatter.timeout_secs));
    match stage.run(&input).await {
        FormattingOutcome::Formatted(output) => {
            println!("{}", output);
            Ok(())
        }
        FormattingOutcome::Skipped(reason) | FormattingOutcome::Failed(reason) => {
            anyhow::bail!("Formatting failed: {}", reason)
        }
    }
}

/// Print the effective configuration after file, env and CLI merging
fn show_config(config: &Config) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);

    println!();
    println!(
        "# config file: {:?}",
        Config::default_path().unwrap_or_else(|| PathBuf::from("(not found)"))
    );
    println!("# models dir: {:?}", Config::models_dir());
    if let Some(resolved) = config.resolve_state_file() {
        println!("# state file: {:?}", resolved);
    }
    Ok(())
}

/// Show current daemon state, optionally following changes
fn run_status(config: &Config, follow: bool, format: &str) -> anyhow::Result<()> {
    let state_path = match config.resolve_state_file() {
        Some(p) => p,
        None => {
            eprintln!("State reporting is disabled (state_file = \"disabled\").");
            eprintln!("Set state_file = \"auto\" in config.toml to use `voxbridge status`.");
            std::process::exit(1);
        }
    };

    let mut last = read_state(&state_path);
    emit_state(&last, format);
    if !follow {
        return Ok(());
    }

    use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
    use std::sync::mpsc::{channel, RecvTimeoutError};

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        NotifyConfig::default().with_poll_interval(Duration::from_millis(100)),
    )?;

    // The file appears and disappears with the daemon, so watch its directory
    if let Some(parent) = state_path.parent() {
        std::fs::create_dir_all(parent)?;
        watcher.watch(parent, RecursiveMode::NonRecursive)?;
    }

    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(_event)) => {
                let current = read_state(&state_path);
                if current != last {
                    emit_state(&current, format);
                    last = current;
                }
            }
            Ok(Err(e)) => tracing::warn!("Watch error: {:?}", e),
            Err(RecvTimeoutError::Timeout) => {
                // A vanished file means the daemon went away
                if !state_path.exists() && last != "stopped" {
                    last = "stopped".to_string();
                    emit_state(&last, format);
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

fn read_state(path: &Path) -> String {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "stopped".to_string())
}

fn emit_state(state: &str, format: &str) {
    if format == "json" {
        println!("{}", waybar_json(state));
    } else {
        println!("{}", state);
    }
}

/// Render one state line in Waybar's custom-module JSON shape
fn waybar_json(state: &str) -> String {
    let (text, class, tooltip) = match state {
        "recording" => ("🎤", "recording", "Recording"),
        "transcribing" => ("⏳", "transcribing", "Transcribing"),
        "formatting" => ("📝", "formatting", "Formatting"),
        "injecting" => ("⌨", "injecting", "Inserting text"),
        "failed" => ("⚠", "failed", "Last dictation failed"),
        "idle" => ("🎙", "idle", "Voxbridge ready - hold hotkey to record"),
        "stopped" => ("", "stopped", "Voxbridge not running"),
        _ => ("?", "unknown", "Unknown state"),
    };
    serde_json::json!({ "text": text, "class": class, "tooltip": tooltip }).to_string()
}

/// Send a recording control signal to the running daemon
fn run_record(config: &Config, action: RecordAction) -> anyhow::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = read_daemon_pid()?;
    let signal = match action {
        RecordAction::Start => Signal::SIGUSR1,
        RecordAction::Stop => Signal::SIGUSR2,
        RecordAction::Toggle => {
            // The state file says whether a recording is in flight
            let recording = config
                .resolve_state_file()
                .and_then(|p| std::fs::read_to_string(p).ok())
                .map(|s| s.trim() == "recording")
                .unwrap_or(false);
            if recording {
                Signal::SIGUSR2
            } else {
                Signal::SIGUSR1
            }
        }
    };

    kill(Pid::from_raw(pid), signal)
        .map_err(|e| anyhow::anyhow!("Failed to signal daemon (pid {}): {}", pid, e))
}

fn read_daemon_pid() -> anyhow::Result<i32> {
    let pid_path = Config::runtime_dir().join("pid");
    let contents = std::fs::read_to_string(&pid_path)
        .map_err(|_| anyhow::anyhow!("Daemon not running (no PID file at {:?})", pid_path))?;
    contents
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid PID file contents: {:?}", contents.trim()))
}
