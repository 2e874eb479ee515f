//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources used by the HTTP handlers and the media-stream bridge.

use crate::config::Config;
use crate::events::EventLog;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all
/// handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Fully rendered system instructions for the speech session, with the
    /// knowledge base already substituted in.
    pub instructions: Arc<String>,
    pub event_log: Arc<EventLog>,
}
