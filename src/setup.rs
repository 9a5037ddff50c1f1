//! First-run setup and environment checks
//!
//! `voxbridge setup` creates the config and model directories, writes a
//! default config, and reports on everything the daemon needs: input
//! group membership, the injection tool chain, the whisper model, and
//! the Ollama formatter. With `--download` it also fetches the whisper
//! model.

use crate::asset::{ModelFetcher, OllamaFetcher};
use crate::config::Config;
use crate::transcribe::whisper::{get_model_filename, get_model_url};
use anyhow::Context;
use std::io::{self, Read, Write};
use std::process::Stdio;
use tokio::process::Command;

fn status_line(color: u8, symbol: &str, msg: &str) {
    println!("  \x1b[{}m{}\x1b[0m {}", color, symbol, msg);
}

pub fn success_line(msg: &str) {
    status_line(32, "✓", msg);
}

pub fn failure_line(msg: &str) {
    status_line(31, "✗", msg);
}

pub fn info_line(msg: &str) {
    status_line(34, "ℹ", msg);
}

pub fn warning_line(msg: &str) {
    status_line(33, "⚠", msg);
}

/// Whether the current user belongs to `group`, per the `groups` command
fn in_group(group: &str) -> bool {
    std::process::Command::new("groups")
        .output()
        .map(|o| {
            String::from_utf8_lossy(&o.stdout)
                .split_whitespace()
                .any(|g| g == group)
        })
        .unwrap_or(false)
}

/// Locate `cmd` on PATH
fn command_path(cmd: &str) -> Option<String> {
    which::which(cmd).ok().map(|p| p.display().to_string())
}

/// Check if the ydotool daemon is running
async fn is_ydotool_daemon_running() -> bool {
    let unit_active = Command::new("systemctl")
        .args(["--user", "is-active", "ydotool"])
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false);
    if unit_active {
        return true;
    }

    // Not everyone runs it as a unit. A no-op ydotool command fails fast
    // when the daemon socket is missing.
    Command::new("ydotool")
        .args(["type", ""])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run setup: create directories and config, check the environment
pub async fn run_setup(config: &Config, download: bool) -> anyhow::Result<()> {
    println!("Voxbridge Setup\n");
    println!("===============\n");

    println!("Directories:");
    Config::ensure_directories()?;
    success_line(&format!(
        "Config directory: {}",
        Config::config_dir().unwrap_or_default().display()
    ));
    success_line(&format!("Models directory: {}", Config::models_dir().display()));

    // Write the default config on first run, leave an existing one alone
    if let Some(config_path) = Config::default_path() {
        if config_path.exists() {
            success_line(&format!("Config file: {}", config_path.display()));
        } else {
            std::fs::write(&config_path, crate::config::DEFAULT_CONFIG)?;
            success_line(&format!("Wrote default config: {}", config_path.display()));
        }
    }

    // Hotkey access
    println!("\nHotkey:");
    if in_group("input") {
        success_line("User is in 'input' group (hotkey monitoring available)");
    } else {
        warning_line("User is not in 'input' group (hotkey monitoring unavailable)");
        println!("       Fix: sudo usermod -aG input $USER, then log out and back in");
        println!("       Compositor keybindings via 'voxbridge record' work either way");
    }

    // Injection chain
    println!("\nInjection:");
    match command_path("wl-copy") {
        Some(path) => success_line(&format!("wl-copy installed ({})", path)),
        None => {
            failure_line("wl-copy not installed (required)");
            println!("       Install wl-clipboard, e.g. 'sudo pacman -S wl-clipboard'");
        }
    }
    match command_path("ydotool") {
        Some(path) => {
            if is_ydotool_daemon_running().await {
                success_line(&format!("ydotool installed ({}), daemon running", path));
            } else {
                warning_line(&format!("ydotool installed ({}), daemon not running", path));
                println!("       Start it: systemctl --user enable --now ydotool");
                println!("       Without it, text lands on the clipboard only");
            }
        }
        None => {
            warning_line("ydotool not installed (text will land on the clipboard only)");
            println!("       Install it, e.g. 'sudo pacman -S ydotool'");
        }
    }

    // Whisper model
    println!("\nWhisper model:");
    let models_dir = Config::models_dir();
    let model_name = &config.whisper.model;
    let model_filename = get_model_filename(model_name);
    let model_path = models_dir.join(&model_filename);

    if model_path.exists() {
        let size_mb = std::fs::metadata(&model_path)
            .map(|m| m.len() / 1_048_576)
            .unwrap_or(0);
        success_line(&format!("Model ready: {} ({} MB)", model_name, size_mb));
    } else if download {
        download_whisper_model(model_name)?;
    } else {
        info_line(&format!("Model '{}' is not downloaded", model_name));
        println!("       Run: voxbridge setup --download");
    }

    // Formatter model
    println!("\nFormatter:");
    if config.formatter.enabled {
        let fetcher = OllamaFetcher::new(&config.formatter.endpoint);
        let model = config.formatter.model.clone();
        let presence = tokio::task::spawn_blocking(move || fetcher.is_present(&model)).await?;
        match presence {
            Ok(true) => success_line(&format!(
                "Ollama reachable, model '{}' present",
                config.formatter.model
            )),
            Ok(false) => {
                info_line(&format!(
                    "Ollama reachable, model '{}' not pulled yet",
                    config.formatter.model
                ));
                println!("       Run: voxbridge pull");
            }
            Err(e) => {
                warning_line(&e.to_string());
                println!("       Formatting will be skipped until Ollama is reachable");
            }
        }
    } else {
        info_line("Formatting disabled in config");
    }

    println!("\n\x1b[32mSetup finished.\x1b[0m\n");
    println!("To dictate:");
    println!("  1. Start the daemon: voxbridge daemon");
    println!(
        "  2. Hold {} to record, release to insert text",
        config.hotkey.key
    );

    Ok(())
}

/// Download a whisper model into the models directory.
///
/// Streams into a temp file in the same directory and renames it into
/// place, so an interrupted download never leaves a half-written model
/// where the daemon would try to load it.
pub fn download_whisper_model(model_name: &str) -> anyhow::Result<()> {
    let models_dir = Config::models_dir();
    std::fs::create_dir_all(&models_dir)?;

    let filename = get_model_filename(model_name);
    let model_path = models_dir.join(&filename);
    let url = get_model_url(model_name);

    println!("  Downloading model '{}'", model_name);
    println!("  from {}", url);

    let agent = ureq::AgentBuilder::new()
        .timeout_connect(std::time::Duration::from_secs(10))
        .build();

    let response = agent
        .get(&url)
        .call()
        .with_context(|| format!("Failed to download {}", url))?;

    let total_bytes: Option<u64> = response
        .header("Content-Length")
        .and_then(|v| v.parse().ok());

    let mut reader = response.into_reader();
    let mut temp = tempfile::Builder::new()
        .prefix(".download-")
        .tempfile_in(&models_dir)?;

    let mut downloaded: u64 = 0;
    let mut last_reported_mb: u64 = 0;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        temp.write_all(&buf[..n])?;
        downloaded += n as u64;

        let mb = downloaded / 1_048_576;
        if mb > last_reported_mb {
            last_reported_mb = mb;
            match total_bytes {
                Some(total) if total > 0 => {
                    print!(
                        "\r  {} / {} MB ({:.0}%)",
                        mb,
                        total / 1_048_576,
                        downloaded as f64 / total as f64 * 100.0
                    );
                }
                _ => {
                    print!("\r  {} MB", mb);
                }
            }
            io::stdout().flush().ok();
        }
    }
    println!();

    temp.persist(&model_path)
        .with_context(|| format!("Failed to move download into {:?}", model_path))?;

    success_line(&format!("Saved to {}", model_path.display()));
    Ok(())
}
