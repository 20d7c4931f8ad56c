//! Axum middleware stack.

pub mod cors;
pub mod deadline;
pub mod logging;
