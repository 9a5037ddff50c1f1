//! Push-to-talk key detection
//!
//! Provides kernel-level key event detection using evdev. This works on
//! all Wayland compositors because it operates at the Linux input
//! subsystem level, below the display server.
//!
//! Requires the user to be in the 'input' group. When that permission is
//! missing the daemon keeps running and sessions can still be driven via
//! `voxbridge record` / compositor keybindings.

#[cfg(target_os = "linux")]
pub mod evdev_monitor;

use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use tokio::sync::mpsc;

/// Events emitted by the hotkey monitor
///
/// Key auto-repeat is collapsed: exactly one Pressed per physical hold
/// and one Released per physical release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The hotkey went down
    Pressed,
    /// The hotkey came back up
    Released,
}

/// Hotkey monitor backends implement this
#[async_trait::async_trait]
pub trait HotkeyMonitor: Send + Sync {
    /// Begin watching for the configured key; events arrive on the
    /// returned channel
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError>;

    /// Stop watching and release the input devices
    async fn stop(&mut self) -> Result<(), HotkeyError>;
}

/// Monitor for the configured key
#[cfg(target_os = "linux")]
pub fn create_monitor(config: &HotkeyConfig) -> Result<Box<dyn HotkeyMonitor>, HotkeyError> {
    Ok(Box::new(evdev_monitor::EvdevMonitor::new(config)?))
}

/// Monitor for the configured key
///
/// Built-in hotkey detection requires the Linux input subsystem. On other
/// platforms, drive sessions with `voxbridge record start/stop` instead.
#[cfg(not(target_os = "linux"))]
pub fn create_monitor(_config: &HotkeyConfig) -> Result<Box<dyn HotkeyMonitor>, HotkeyError> {
    Err(HotkeyError::NotSupported(
        "Built-in hotkey detection requires Linux evdev. \
         Use 'voxbridge record start/stop' commands instead."
            .to_string(),
    ))
}
