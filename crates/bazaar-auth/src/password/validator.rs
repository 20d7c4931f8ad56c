//! Password policy enforcement for new passwords.

use bazaar_core::config::AuthConfig;
use bazaar_core::error::AppError;

/// Upper bound that keeps Argon2 input cost predictable.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Validates password strength against configured policies.
#[derive(Debug, Clone)]
pub struct PasswordValidator {
    min_length: usize,
}

impl PasswordValidator {
    /// Creates a new validator from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            min_length: config.password_min_length,
        }
    }

    /// Validates a password, penalizing guesses derived from the account's
    /// own identifiers (`user_inputs`, e.g. email and display name).
    pub fn validate(&self, password: &str, user_inputs: &[&str]) -> Result<(), AppError> {
        let length = password.chars().count();
        if length < self.min_length {
            return Err(AppError::validation(format!(
                "Password must be at least {} characters long",
                self.min_length
            )));
        }
        if length > MAX_PASSWORD_LENGTH {
            return Err(AppError::validation(format!(
                "Password must be at most {MAX_PASSWORD_LENGTH} characters long"
            )));
        }

        let estimate = zxcvbn::zxcvbn(password, user_inputs);
        if estimate.score() < zxcvbn::Score::Three {
            return Err(AppError::validation(
                "Password is too weak. Please use a stronger password with more entropy.",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> PasswordValidator {
        PasswordValidator::new(&AuthConfig::default())
    }

    #[test]
    fn test_rejects_short() {
        assert!(validator().validate("Ab1!", &[]).is_err());
    }

    #[test]
    fn test_rejects_common() {
        assert!(validator().validate("password1234", &[]).is_err());
    }

    #[test]
    fn test_accepts_passphrase() {
        assert!(
            validator()
                .validate("umbrella-quartz-lantern-91-meadow", &[])
                .is_ok()
        );
    }

    #[test]
    fn test_rejects_email_derived() {
        let email = "marguerite.okonkwo@example.com";
        assert!(validator().validate(email, &[email]).is_err());
    }
}
