//! Multi-factor authentication entities.

pub mod backup_code;
pub mod factor;

pub use backup_code::BackupCode;
pub use factor::{CreateMfaFactor, FactorStatus, FactorType, MfaFactor};
