//! Multi-factor authentication configuration.

use serde::{Deserialize, Serialize};

/// TOTP and backup-code settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaConfig {
    /// Issuer shown in authenticator apps.
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Number of backup codes generated per batch.
    #[serde(default = "default_backup_code_count")]
    pub backup_code_count: usize,
    /// Accepted TOTP steps on either side of the current one.
    #[serde(default = "default_skew")]
    pub totp_skew: u8,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            backup_code_count: default_backup_code_count(),
            totp_skew: default_skew(),
        }
    }
}

fn default_issuer() -> String {
    "Bazaar".to_string()
}

fn default_backup_code_count() -> usize {
    10
}

fn default_skew() -> u8 {
    1
}
