//! API module providing the HTTP endpoints of the broker.
//!
//! - `auth` - login URL, code exchange, public key and token verification (/auth/*)
//! - `health` - health check endpoint (/health)
//! - `openapi` - OpenAPI/Utoipa configuration, rendered at /api-docs

pub mod auth;
pub mod health;
pub mod openapi;

pub use auth::AUTH_TAG;
pub use health::MISC_TAG;

use crate::AppState;
use axum::Router;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Builds the application router with all routes and middleware attached.
pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .routes(routes!(auth::authenticate))
        .routes(routes!(auth::login))
        .routes(routes!(auth::callback))
        .routes(routes!(auth::public_key))
        .routes(routes!(auth::verify))
        .routes(routes!(health::health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server on the configured address.
#[tracing::instrument(skip(state))]
pub async fn start_webserver(state: AppState) -> color_eyre::Result<()> {
    let addr = SocketAddr::new(state.config.bind_address, state.config.port);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server running");
    axum::serve(listener, app)
        .await
        .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
