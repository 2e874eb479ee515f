//! Call-lifecycle events and the event sink backing the `/logs` listing.
//!
//! The relay emits a small set of structured events at defined points of a
//! call (call received, stream started, caller speech detected, disconnect).
//! Each event is formatted once, logged through `tracing`, and kept in an
//! in-memory store for the operator UI.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

/// The kinds of call-lifecycle events the relay emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    IncomingCall,
    CallConnected,
    StreamStarted,
    SpeechDetected,
    ClientDisconnected,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::IncomingCall => "incoming_call",
            EventKind::CallConnected => "call_connected",
            EventKind::StreamStarted => "stream_started",
            EventKind::SpeechDetected => "speech_detected",
            EventKind::ClientDisconnected => "client_disconnected",
        };
        write!(f, "{}", name)
    }
}

impl EventKind {
    /// Renders the human-readable message shown in the log listing.
    fn format_message(&self, fields: &Map<String, Value>) -> String {
        match self {
            EventKind::IncomingCall => {
                format!("New call received (CallSid: {})", field_str(fields, "call_sid"))
            }
            EventKind::CallConnected => "Telephony WebSocket connected".to_string(),
            EventKind::StreamStarted => {
                format!("Stream connected (StreamSid: {})", field_str(fields, "stream_sid"))
            }
            EventKind::SpeechDetected => "Caller speech detected".to_string(),
            EventKind::ClientDisconnected => {
                format!("Call ended (StreamSid: {})", field_str(fields, "stream_sid"))
            }
        }
    }
}

fn field_str<'a>(fields: &'a Map<String, Value>, key: &str) -> &'a str {
    fields.get(key).and_then(Value::as_str).unwrap_or("unknown")
}

/// One recorded event, in the shape returned by `/logs`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LogEntry {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: EventKind,
    pub formatted_message: String,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub fields: Map<String, Value>,
}

/// Process-wide sink for call-lifecycle events.
#[derive(Default)]
pub struct EventLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one event: formats it, emits a `tracing` line, stores the
    /// entry, and returns it.
    pub fn record(&self, event: EventKind, fields: Value) -> LogEntry {
        let fields = match fields {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("detail".to_string(), other);
                map
            }
        };
        let entry = LogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
            formatted_message: event.format_message(&fields),
            fields,
        };
        info!(event = %entry.event, "{}", entry.formatted_message);
        self.entries
            .lock()
            .expect("event log lock poisoned")
            .push(entry.clone());
        entry
    }

    /// Snapshot of all recorded entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().expect("event log lock poisoned").clone()
    }

    /// Number of distinct calls seen, keyed by `call_sid`.
    pub fn total_calls(&self) -> usize {
        let entries = self.entries.lock().expect("event log lock poisoned");
        entries
            .iter()
            .filter_map(|entry| entry.fields.get("call_sid").and_then(Value::as_str))
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Per-call handle onto the event log.
///
/// Created when a telephony connection arrives and dropped when the session
/// ends. Once the stream id is known it is stamped onto every subsequent
/// entry, so both pumps can emit without threading the id around.
pub struct CallEventSink {
    log: Arc<EventLog>,
    stream_sid: Mutex<Option<String>>,
}

impl CallEventSink {
    pub fn new(log: Arc<EventLog>) -> Self {
        Self {
            log,
            stream_sid: Mutex::new(None),
        }
    }

    /// Adopts the stream id assigned by the telephony peer.
    pub fn set_stream(&self, stream_sid: &str) {
        *self.stream_sid.lock().expect("event sink lock poisoned") = Some(stream_sid.to_string());
    }

    /// Records one event, attaching the stream id when known.
    pub fn emit(&self, event: EventKind, fields: Value) -> LogEntry {
        let mut fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Some(sid) = self
            .stream_sid
            .lock()
            .expect("event sink lock poisoned")
            .as_ref()
        {
            fields
                .entry("stream_sid".to_string())
                .or_insert_with(|| Value::String(sid.clone()));
        }
        self.log.record(event, Value::Object(fields))
    }
}
