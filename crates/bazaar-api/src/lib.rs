//! # bazaar-api
//!
//! HTTP API layer for Bazaar built on Axum. Provides the REST routes for
//! sessions, step-up MFA and notifications, the guard extractors that run
//! the auth gate, and the `/ws` real-time endpoint.

pub mod app;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::build_app;
pub use state::{AppState, Stores};
