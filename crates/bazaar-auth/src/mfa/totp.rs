//! RFC 6238 time-based one-time passwords.
//!
//! Uses Google Authenticator compatible settings (SHA-1, 6 digits, 30 s).
//! Matching returns the time step that matched so callers can refuse a
//! second use of the same step.

use totp_rs::{Algorithm, Secret, TOTP};

use bazaar_core::config::MfaConfig;
use bazaar_core::error::AppError;

use crate::token::constant_time_eq;

const TOTP_DIGITS: usize = 6;
const TOTP_STEP: u64 = 30;

/// TOTP generator and checker for one issuer.
#[derive(Debug, Clone)]
pub struct Totp {
    issuer: String,
    skew: u8,
}

impl Totp {
    /// Creates a checker from MFA configuration.
    pub fn new(config: &MfaConfig) -> Self {
        Self {
            issuer: config.issuer.clone(),
            skew: config.totp_skew,
        }
    }

    /// Generate a new random base32 secret.
    pub fn generate_secret() -> String {
        Secret::generate_secret().to_encoded().to_string()
    }

    /// The `otpauth://` URL authenticator apps import.
    pub fn otpauth_url(&self, secret: &str, account: &str) -> Result<String, AppError> {
        Ok(self.build(secret, account)?.get_url())
    }

    /// Code for the step containing `unix_seconds`.
    pub fn code_at(&self, secret: &str, account: &str, unix_seconds: u64) -> Result<String, AppError> {
        Ok(self.build(secret, account)?.generate(unix_seconds))
    }

    /// Find the step within the allowed skew whose code equals `code`.
    ///
    /// Returns `None` for malformed or non-matching codes.
    pub fn matching_step(
        &self,
        secret: &str,
        account: &str,
        code: &str,
        unix_seconds: u64,
    ) -> Result<Option<i64>, AppError> {
        let code = code.trim();
        if code.len() != TOTP_DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(None);
        }

        let totp = self.build(secret, account)?;
        let current = (unix_seconds / TOTP_STEP) as i64;
        let skew = i64::from(self.skew);
        for step in (current - skew)..=(current + skew) {
            if step < 0 {
                continue;
            }
            let expected = totp.generate(step as u64 * TOTP_STEP);
            if constant_time_eq(expected.as_bytes(), code.as_bytes()) {
                return Ok(Some(step));
            }
        }
        Ok(None)
    }

    fn build(&self, secret: &str, account: &str) -> Result<TOTP, AppError> {
        let bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| AppError::internal(format!("Invalid TOTP secret: {e}")))?;
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            0,
            TOTP_STEP,
            bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| AppError::internal(format!("Failed to create TOTP: {e}")))
    }
}
