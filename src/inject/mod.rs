//! Text injection into the focused application
//!
//! Injection goes through the clipboard: wl-copy sets the text, ydotool
//! sends the paste chord, and terminal-like targets get a confirm
//! keystroke. When ydotool is unavailable the text stays on the clipboard
//! for a manual paste, which counts as a degraded success rather than a
//! failure.

pub mod target;
pub mod wayland;

pub use wayland::WaylandInjector;

use crate::config::InjectConfig;
use crate::error::InjectError;
use std::sync::Arc;

/// How an injection completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionOutcome {
    /// Text was pasted into the focused application
    Injected,
    /// Text was only written to the clipboard; the user pastes manually
    ClipboardOnly,
}

/// Trait for text injection implementations
#[async_trait::async_trait]
pub trait Injector: Send + Sync {
    /// Deliver text to the focused application
    async fn inject(&self, text: &str) -> Result<InjectionOutcome, InjectError>;
}

/// Factory function to create the platform injector
pub fn create_injector(config: &InjectConfig) -> Arc<dyn Injector> {
    Arc::new(WaylandInjector::new(config))
}
