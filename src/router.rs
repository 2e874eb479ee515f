//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST surface, the telephony media-stream WebSocket
//! endpoint, and the OpenAPI documentation.

use crate::{
    events::{EventKind, LogEntry},
    handlers,
    models::{LogsResponse, StatusResponse},
    state::AppState,
    ws::media_stream_handler,
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::index, handlers::incoming_call, handlers::get_logs),
    components(schemas(StatusResponse, LogsResponse, LogEntry, EventKind)),
    tags(
        (name = "SAGE API", description = "Telephony media-stream relay for the SAGE voice assistant")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/", get(handlers::index))
        .route(
            "/incoming-call",
            get(handlers::incoming_call).post(handlers::incoming_call),
        )
        .route("/logs", get(handlers::get_logs))
        .route("/media-stream", get(media_stream_handler))
        .with_state(app_state);

    // Merge the stateful routes with the stateless Swagger UI routes.
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
