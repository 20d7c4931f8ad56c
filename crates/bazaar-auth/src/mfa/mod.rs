//! Step-up multi-factor authentication: TOTP factors and backup codes.

pub mod backup;
pub mod service;
pub mod totp;

pub use service::{BackupCodeBatch, MfaProof, MfaService, TotpActivation, TotpEnrollment};
pub use totp::Totp;
