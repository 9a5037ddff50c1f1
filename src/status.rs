//! Status events published by the session controller and asset manager
//!
//! The controller publishes every transition synchronously before it
//! dispatches the next stage, so presenters always see states in order.
//! Presenters are pure sinks: they must be cheap, must not block, and must
//! never call back into the pipeline.

use crate::asset::AssetState;
use crate::state::SessionState;

/// A single status update
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// Session state transition, with an optional short operator-facing
    /// detail ("done", "clipboard-only", "too short", "no speech")
    Session {
        state: SessionState,
        detail: Option<String>,
    },

    /// Formatter model asset transition
    Asset { model: String, state: AssetState },
}

/// Sink for status updates (state file, notifications, progress output)
pub trait StatusSink: Send + Sync {
    fn publish(&self, event: StatusEvent);
}
