//! Session lifecycle: registration, login, refresh, logout and elevation.

pub mod manager;

pub use manager::{AccessGrant, LoginResult, SessionManager, SessionTokens};
