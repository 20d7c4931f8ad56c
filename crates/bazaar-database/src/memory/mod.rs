//! In-memory store implementations using a Tokio mutex.
//!
//! Suitable for tests and single-node development only. Each operation
//! runs entirely under one lock acquisition, which gives it the same
//! atomicity as the single-statement SQL in the PostgreSQL stores.

mod mfa;
mod notification;
mod session;
mod user;

pub use mfa::MemoryMfaStore;
pub use notification::MemoryNotificationStore;
pub use session::MemorySessionStore;
pub use user::MemoryUserStore;
