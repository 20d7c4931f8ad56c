//! # bazaar-entity
//!
//! Row models for the tables owned by Bazaar's authentication and delivery
//! core. Every persisted struct derives `sqlx::FromRow`; identifiers are
//! the typed ids from `bazaar-core`.

pub mod mfa;
pub mod notification;
pub mod session;
pub mod user;
