//! SAGE API Library Crate
//!
//! This library contains all the core logic for the SAGE voice gateway: a
//! web service that bridges a Twilio Media Streams WebSocket with the OpenAI
//! Realtime API, relaying G.711 µ-law audio in both directions and
//! coordinating caller barge-in. The `api` binary is a thin wrapper around
//! this library.

pub mod audio_utils;
pub mod config;
pub mod events;
pub mod handlers;
pub mod knowledge;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
