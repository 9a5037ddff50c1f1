//! Desktop notifications via notify-send (libnotify)
//!
//! Notifications are best-effort: failures are logged at debug level and
//! never propagate.

use std::process::Stdio;

/// Show a desktop notification.
///
/// Async and non-blocking; used from command handlers.
pub async fn send(title: &str, body: &str) {
    let result = tokio::process::Command::new("notify-send")
        .args(["--app-name=Voxbridge", "--expire-time=2000", title, body])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Err(e) = result {
        tracing::debug!("notify-send failed: {}", e);
    }
}

/// Send a notification without waiting for notify-send to exit.
///
/// Used from synchronous contexts like the status presenter, which must
/// never block the session pipeline.
pub fn send_sync(title: &str, body: &str) {
    let result = std::process::Command::new("notify-send")
        .args(["--app-name=Voxbridge", "--expire-time=5000", title, body])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    if let Err(e) = result {
        tracing::debug!("notify-send failed: {}", e);
    }
}
