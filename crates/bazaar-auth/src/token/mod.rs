//! Access token signing and validation plus opaque token hashing.

pub mod claims;
pub mod digest;
pub mod service;

pub use claims::AccessClaims;
pub use digest::{constant_time_eq, generate_opaque_token, hash_token};
pub use service::{IssuedAccessToken, TokenService};
