//! Per-request cancellation token.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// The request's cancellation token.
///
/// Inserted by the deadline middleware. It fires when the request
/// deadline passes or the server shuts down.
#[derive(Debug, Clone)]
pub struct RequestCancel(pub CancellationToken);

impl std::ops::Deref for RequestCancel {
    type Target = CancellationToken;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl RequestCancel {
    /// Token from the request extensions, or a fresh child of the shutdown
    /// token when the deadline middleware did not run.
    pub fn from_parts(parts: &Parts, state: &AppState) -> Self {
        parts
            .extensions
            .get::<RequestCancel>()
            .cloned()
            .unwrap_or_else(|| Self(state.shutdown.child_token()))
    }
}

impl FromRequestParts<AppState> for RequestCancel {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts, state))
    }
}
