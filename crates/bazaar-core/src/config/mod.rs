//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! `config/default.toml`, an environment overlay, and `BAZAAR__*`
//! environment variables. Each sub-module represents a logical section.

pub mod app;
pub mod auth;
pub mod database;
pub mod logging;
pub mod mfa;
pub mod realtime;

use serde::{Deserialize, Serialize};

pub use self::app::{CorsConfig, ServerConfig};
pub use self::auth::AuthConfig;
pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::mfa::MfaConfig;
pub use self::realtime::{PushConfig, RealtimeConfig};

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment environment name (`development`, `test`, `production`).
    #[serde(default = "default_environment")]
    pub environment: String,
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Token and credential settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// TOTP and backup-code settings.
    #[serde(default)]
    pub mfa: MfaConfig,
    /// Connection hub settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Push provider settings.
    #[serde(default)]
    pub push: PushConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration for the given environment.
    ///
    /// Merges `config/default.toml`, `config/{env}.toml` and environment
    /// variables prefixed with `BAZAAR__` (e.g. `BAZAAR__AUTH__JWT_SECRET`).
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("BAZAAR")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.jwt_previous_secrets")
                    .with_list_parse_key("server.cors.allowed_origins")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let mut loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        loaded.environment = env.to_string();
        Ok(loaded)
    }

    /// Whether the process runs with production safeguards.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Validate security-relevant settings before anything starts.
    ///
    /// In production every finding is fatal. Elsewhere the findings are
    /// returned so the caller can log them as warnings.
    pub fn validate(&self) -> Result<Vec<String>, AppError> {
        let mut findings = self.auth.audit();

        if self.push.provider == "webhook" && self.push.webhook_url.is_none() {
            findings.push("push.webhook_url is required when push.provider = \"webhook\"".into());
        }
        if self.database.uses_memory() {
            findings.push("database.url = \"memory\" keeps all state in process memory".into());
        }
        if self.realtime.outbound_buffer == 0 {
            findings.push("realtime.outbound_buffer must be greater than zero".into());
        }

        if self.is_production() && !findings.is_empty() {
            return Err(AppError::configuration(format!(
                "Refusing to start in production: {}",
                findings.join("; ")
            )));
        }
        Ok(findings)
    }
}

fn default_environment() -> String {
    "development".to_string()
}
