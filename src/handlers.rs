//! Axum handlers for the HTTP surface: liveness, call setup, and the call
//! log listing. These endpoints are thin glue around the relay; the real
//! work happens on the `/media-stream` WebSocket.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    events::EventKind,
    models::{LogsResponse, StatusResponse},
    state::AppState,
};

/// Liveness check.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service is running", body = StatusResponse)
    )
)]
pub async fn index() -> Json<StatusResponse> {
    Json(StatusResponse {
        message: "SAGE media stream server is running".to_string(),
    })
}

/// Handle an inbound call notification from the telephony provider.
///
/// Returns a call-control document instructing the provider to open a
/// bidirectional media stream back to this service's WebSocket endpoint.
#[utoipa::path(
    method(get, post),
    path = "/incoming-call",
    responses(
        (status = 200, description = "TwiML connect-and-stream document", body = String, content_type = "application/xml")
    ),
    params(
        ("CallSid" = Option<String>, Query, description = "The telephony provider's call identifier")
    )
)]
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let call_sid = params.get("CallSid").map(String::as_str).unwrap_or("unknown");
    state
        .event_log
        .record(EventKind::IncomingCall, json!({ "call_sid": call_sid }));

    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");

    (
        [(header::CONTENT_TYPE, "application/xml")],
        connect_stream_twiml(host),
    )
        .into_response()
}

/// Return all recorded call events in a formatted way.
#[utoipa::path(
    get,
    path = "/logs",
    responses(
        (status = 200, description = "Formatted call logs", body = LogsResponse)
    )
)]
pub async fn get_logs(State(state): State<Arc<AppState>>) -> Json<LogsResponse> {
    Json(LogsResponse {
        total_calls: state.event_log.total_calls(),
        logs: state.event_log.entries(),
    })
}

/// Builds the TwiML document that connects the call to our media stream.
fn connect_stream_twiml(host: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "<Response>",
            "<Say>Please wait while we connect your call to the A I voice assistant.</Say>",
            r#"<Connect><Stream url="wss://{host}/media-stream"/></Connect>"#,
            "</Response>"
        ),
        host = host
    )
}
