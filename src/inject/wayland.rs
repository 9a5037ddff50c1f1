//! Wayland text injection via wl-copy + ydotool
//!
//! The text lands on the clipboard first, then a synthetic Ctrl+V pastes it
//! into the focused window. Targets listed in `confirm_apps` (terminals,
//! mostly) also get an Enter keystroke so the pasted line is submitted.
//!
//! Needs the wl-clipboard and ydotool packages, with the ydotoold daemon
//! running (`systemctl --user start ydotool`). Whatever was on the clipboard
//! before is overwritten.

use super::{target, InjectionOutcome, Injector};
use crate::config::InjectConfig;
use crate::error::InjectError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Wayland injector (clipboard + paste chord + optional confirm)
pub struct WaylandInjector {
    /// App ids that receive a confirm keystroke after the paste
    confirm_apps: Vec<String>,
    /// Clipboard settle time before the paste chord
    paste_delay: Duration,
    /// Pause before the confirm keystroke
    confirm_delay: Duration,
}

impl WaylandInjector {
    pub fn new(config: &InjectConfig) -> Self {
        Self {
            confirm_apps: config.confirm_apps.clone(),
            paste_delay: Duration::from_millis(config.paste_delay_ms),
            confirm_delay: Duration::from_millis(config.confirm_delay_ms),
        }
    }

    /// Put `text` on the Wayland clipboard.
    async fn copy_to_clipboard(&self, text: &str) -> Result<(), InjectError> {
        let clip = |e: std::io::Error| InjectError::Clipboard(e.to_string());

        let mut child = Command::new("wl-copy")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => InjectError::WlCopyNotFound,
                _ => InjectError::Clipboard(e.to_string()),
            })?;

        // wl-copy reads until EOF, so stdin has to be dropped before wait()
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| InjectError::Clipboard("wl-copy stdin unavailable".to_string()))?;
        stdin.write_all(text.as_bytes()).await.map_err(clip)?;
        drop(stdin);

        let status = child.wait().await.map_err(clip)?;
        if status.success() {
            Ok(())
        } else {
            Err(InjectError::Clipboard(format!("wl-copy exited with {}", status)))
        }
    }

    /// Check whether ydotool is usable (binary present, daemon answering)
    async fn ydotool_ready(&self) -> bool {
        if which::which("ydotool").is_err() {
            return false;
        }

        // A no-op type returns quickly when ydotoold is answering
        Command::new("ydotool")
            .args(["type", ""])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl Injector for WaylandInjector {
    async fn inject(&self, text: &str) -> Result<InjectionOutcome, InjectError> {
        if text.is_empty() {
            return Ok(InjectionOutcome::Injected);
        }

        // Resolve the focus target up front; failure only disables the
        // confirm keystroke
        let app_id = target::focused_app_id().await;
        match &app_id {
            Some(id) => tracing::debug!("Focused window: {}", id),
            None => tracing::debug!("Could not resolve focused window"),
        }

        // Step 1: clipboard. Failure here fails the injection.
        self.copy_to_clipboard(text).await?;

        // Step 2: without a working ydotool the text stays on the clipboard
        if !self.ydotool_ready().await {
            tracing::warn!("ydotool unavailable, text left on clipboard (is ydotoold running?)");
            return Ok(InjectionOutcome::ClipboardOnly);
        }

        // Step 3: paste chord after the clipboard settles
        tokio::time::sleep(self.paste_delay).await;
        if let Err(e) = send_paste_chord().await {
            tracing::warn!("Paste failed ({}), text left on clipboard", e);
            return Ok(InjectionOutcome::ClipboardOnly);
        }

        // Step 4: confirm keystroke for terminal-like targets
        let confirm = app_id
            .as_deref()
            .map(|id| needs_confirm(&self.confirm_apps, id))
            .unwrap_or(false);

        if confirm {
            tokio::time::sleep(self.confirm_delay).await;
            if let Err(e) = send_confirm().await {
                tracing::warn!("Confirm keystroke failed: {}", e);
            }
        }

        tracing::info!("Text pasted ({} chars)", text.chars().count());
        Ok(InjectionOutcome::Injected)
    }
}

/// Whether the focused app id should receive a confirm keystroke
fn needs_confirm(confirm_apps: &[String], app_id: &str) -> bool {
    confirm_apps.iter().any(|app| app.eq_ignore_ascii_case(app_id))
}

/// Send the paste chord (Ctrl+V).
/// 29 = KEY_LEFTCTRL, 47 = KEY_V; key_code:1 is press, key_code:0 release.
async fn send_paste_chord() -> Result<(), String> {
    run_ydotool_key(&["29:1", "47:1", "47:0", "29:0"]).await
}

/// Send the confirm keystroke (Enter). 28 = KEY_ENTER.
async fn send_confirm() -> Result<(), String> {
    run_ydotool_key(&["28:1", "28:0"]).await
}

/// Run `ydotool key` with the given key code arguments
async fn run_ydotool_key(codes: &[&str]) -> Result<(), String> {
    let output = Command::new("ydotool")
        .arg("key")
        .args(codes)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| e.to_string())?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);

        if stderr.contains("socket") || stderr.contains("connect") || stderr.contains("daemon") {
            return Err("ydotoold daemon not running".to_string());
        }

        return Err(stderr.trim().to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_confirm_case_insensitive() {
        let apps = vec!["Alacritty".to_string(), "kitty".to_string()];
        assert!(needs_confirm(&apps, "alacritty"));
        assert!(needs_confirm(&apps, "Kitty"));
        assert!(!needs_confirm(&apps, "firefox"));
    }

    #[test]
    fn test_needs_confirm_empty_list() {
        let apps: Vec<String> = Vec::new();
        assert!(!needs_confirm(&apps, "Alacritty"));
    }
}
