//! Application builder: wires router, middleware and state into an Axum app.

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware as axum_middleware;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::cors::build_cors_layer;
use crate::middleware::{deadline, logging};
use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);
    let server = &config.server;
    build_router()
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            deadline::request_deadline,
        ))
        .layer(axum_middleware::from_fn(logging::request_logging))
        .layer(DefaultBodyLimit::max(server.body_limit_bytes))
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&server.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
