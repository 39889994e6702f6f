//! HTTP Router
//!
//! Sets up the axum router with the call endpoint.

use axum::extract::{DefaultBodyLimit, State};
use axum::{Json, Router, routing::get, routing::post};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handler::handle_rpc;
use super::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Call endpoint - every exchange goes through here
        .route("/rpc", post(handle_rpc))
        // Health check for monitoring/load balancers
        .route("/health", get(health_check))
        // Transfer envelopes carry whole addin libraries; no size cap
        .layer(DefaultBodyLimit::disable())
        // Request logging
        .layer(TraceLayer::new_for_http())
        // CORS for development
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    services: usize,
    addins: usize,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        services: state.registry().len(),
        addins: state.manager().installed_count(),
    })
}
