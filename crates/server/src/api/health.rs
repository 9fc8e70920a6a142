//! Health check endpoint.

use crate::AppState;
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use utoipa::ToSchema;

/// Tag for OpenAPI documentation.
pub const MISC_TAG: &str = "Miscellaneous";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `healthy` while the process serves requests
    pub status: String,
    /// Current server time, RFC 3339
    pub timestamp: String,
    /// Seconds since the service started
    pub uptime: u64,
}

/// Health check endpoint.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    method(get, head),
    path = "/health",
    tag = MISC_TAG,
    operation_id = "Health Check",
    summary = "Service health check",
    description = "Returns a simple health status indicating the service is running and accepting requests.\n\n\
                   Stateless: Discord is not contacted and the key files are not read.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
        uptime: state.started_at.elapsed().as_secs(),
    })
}
