//! # bazaar-core
//!
//! Core crate for Bazaar's authentication and delivery services. Contains
//! configuration schemas, typed identifiers, cancellation helpers, and the
//! unified error system.
//!
//! This crate has **no** internal dependencies on other Bazaar crates.

pub mod cancel;
pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
