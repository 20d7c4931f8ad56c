//! Authentication configuration.

use serde::{Deserialize, Serialize};

/// Secrets that must never be accepted in production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change_me",
    "change_me_in_production",
    "changeme",
    "secret",
    "jwt_secret",
    "your-secret-key",
    "development",
];

/// Authentication and credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Current HMAC-SHA256 signing secret.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Retired secrets still accepted for validation during key rotation.
    #[serde(default)]
    pub jwt_previous_secrets: Vec<String>,
    /// Value of the `iss` claim.
    #[serde(default = "default_issuer")]
    pub jwt_issuer: String,
    /// Access token TTL in minutes.
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_minutes: u64,
    /// Session (refresh token) TTL in hours.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: u64,
    /// Clock skew tolerated when checking `exp`, in seconds.
    #[serde(default = "default_leeway")]
    pub leeway_seconds: u64,
    /// Minimum accepted length of a signing secret, in bytes.
    #[serde(default = "default_min_secret_length")]
    pub min_secret_length: usize,
    /// Minimum password length.
    #[serde(default = "default_password_min")]
    pub password_min_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            jwt_previous_secrets: Vec::new(),
            jwt_issuer: default_issuer(),
            access_token_ttl_minutes: default_access_ttl(),
            session_ttl_hours: default_session_ttl(),
            leeway_seconds: default_leeway(),
            min_secret_length: default_min_secret_length(),
            password_min_length: default_password_min(),
        }
    }
}

impl AuthConfig {
    /// Inspect the signing secrets and TTLs.
    ///
    /// Returns one human-readable finding per problem; an empty list means
    /// the configuration is safe to run in production.
    pub fn audit(&self) -> Vec<String> {
        let mut findings = Vec::new();

        let secrets = std::iter::once(("auth.jwt_secret", &self.jwt_secret)).chain(
            self.jwt_previous_secrets
                .iter()
                .map(|s| ("auth.jwt_previous_secrets", s)),
        );
        for (field, secret) in secrets {
            if is_placeholder(secret) {
                findings.push(format!("{field} is a placeholder value"));
            } else if secret.len() < self.min_secret_length {
                findings.push(format!(
                    "{field} is shorter than {} bytes",
                    self.min_secret_length
                ));
            }
        }

        if self.access_token_ttl_minutes == 0 || self.access_token_ttl_minutes > 60 {
            findings.push(format!(
                "auth.access_token_ttl_minutes must be within 1..=60 (got {})",
                self.access_token_ttl_minutes
            ));
        }
        if self.access_token_ttl_minutes >= self.session_ttl_hours.saturating_mul(60) {
            findings.push("auth.access_token_ttl_minutes must be shorter than the session TTL".into());
        }

        findings
    }

    /// Access token TTL as a chrono duration.
    pub fn access_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.access_token_ttl_minutes as i64)
    }

    /// Session TTL as a chrono duration.
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours as i64)
    }
}

fn is_placeholder(secret: &str) -> bool {
    let lowered = secret.trim().to_ascii_lowercase();
    lowered.is_empty()
        || lowered.starts_with("change_me")
        || PLACEHOLDER_SECRETS.contains(&lowered.as_str())
}

fn default_jwt_secret() -> String {
    "CHANGE_ME_IN_PRODUCTION".to_string()
}

fn default_issuer() -> String {
    "bazaar".to_string()
}

fn default_access_ttl() -> u64 {
    15
}

fn default_session_ttl() -> u64 {
    720
}

fn default_leeway() -> u64 {
    5
}

fn default_min_secret_length() -> usize {
    32
}

fn default_password_min() -> usize {
    10
}
