//! # bazaar-auth
//!
//! Authentication for Bazaar: password hashing, signed access tokens,
//! per-device sessions, step-up MFA and the per-request auth gate.
//!
//! ## Modules
//!
//! - `password`: Argon2id password hashing and policy enforcement
//! - `token`: access token signing/validation and opaque token hashing
//! - `session`: register, login, refresh and logout flows
//! - `mfa`: TOTP enrollment, backup codes and session elevation
//! - `gate`: bearer token checks against the live session row
//! - `context`: the typed identity handed to handlers

pub mod context;
pub mod gate;
pub mod mfa;
pub mod password;
pub mod session;
pub mod token;

pub use context::AuthContext;
pub use gate::{AuthGate, Requirement};
pub use mfa::{MfaProof, MfaService};
pub use password::{PasswordHasher, PasswordValidator};
pub use session::SessionManager;
pub use token::{AccessClaims, IssuedAccessToken, TokenService};
