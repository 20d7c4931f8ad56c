//! Per-request cancellation.
//!
//! Every request gets a child of the shutdown token. It is cancelled when
//! `server.request_timeout_seconds` elapses, so store calls still in flight
//! return `Cancelled` and the handler answers 408 instead of writing more.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::extractors::RequestCancel;
use crate::state::AppState;

/// Inserts the request's [`RequestCancel`] token and arms its deadline.
pub async fn request_deadline(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let cancel = state.shutdown.child_token();
    request
        .extensions_mut()
        .insert(RequestCancel(cancel.clone()));

    let timeout = Duration::from_secs(state.config.server.request_timeout_seconds);
    let path = request.uri().path().to_string();
    let timer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    warn!(path = %path, timeout_secs = timeout.as_secs(), "Request deadline exceeded");
                    cancel.cancel();
                }
            }
        })
    };

    let response = next.run(request).await;
    timer.abort();
    response
}
