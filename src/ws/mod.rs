//! Call Bridging over WebSockets
//!
//! This module contains the core of the service: relaying one telephony
//! media stream to one realtime speech session and back. It is structured
//! into submodules for clarity:
//!
//! - `twilio`: the JSON frame protocol spoken on the telephony leg.
//! - `openai`: connection setup and session bootstrap for the speech leg.
//! - `session`: per-call state, the mark-acknowledgment tracker, and the
//!   interruption coordinator.
//! - `bridge`: the two pumps that move audio for the lifetime of a call.

mod bridge;
pub mod openai;
pub mod session;
pub mod twilio;

pub use bridge::media_stream_handler;
