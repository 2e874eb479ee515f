//! API response models for the HTTP surface.

use crate::events::LogEntry;
use serde::Serialize;
use utoipa::ToSchema;

/// Liveness payload for `GET /`.
#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    #[schema(example = "SAGE media stream server is running")]
    pub message: String,
}

/// Formatted call-log listing for `GET /logs`.
#[derive(Serialize, ToSchema)]
pub struct LogsResponse {
    pub total_calls: usize,
    pub logs: Vec<LogEntry>,
}
