//! # bazaar-database
//!
//! PostgreSQL connection management, the store traits the services depend
//! on, and two implementations of them: sqlx repositories and in-memory
//! stores for tests and single-node development.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use store::{MfaStore, NotificationStore, RedeemOutcome, SessionStore, UserStore};
