//! Request DTOs with validation.

use serde::{Deserialize, Serialize};
use validator::Validate;

use bazaar_auth::MfaProof;
use bazaar_core::error::AppError;
use bazaar_core::types::{MfaFactorId, PageRequest};

/// Runs `validator` rules and maps failures to a validation error.
pub fn validate_request<T: Validate>(request: &T) -> Result<(), AppError> {
    request
        .validate()
        .map_err(|e| AppError::validation(format!("Invalid request: {e}")))
}

/// Account registration body.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Login email.
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    /// Password; strength is checked by the password policy.
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    /// Display name.
    #[validate(length(min = 1, max = 100, message = "Display name must be 1-100 characters"))]
    pub display_name: String,
    /// Optional device label.
    #[validate(length(max = 100))]
    pub device_name: Option<String>,
}

/// Login body.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    /// Login email.
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    /// Password.
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    /// Optional device label.
    #[validate(length(max = 100))]
    pub device_name: Option<String>,
}

/// Token refresh body.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RefreshRequest {
    /// Refresh token.
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Logout-everywhere body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogoutAllRequest {
    /// Keep the calling session signed in.
    #[serde(default)]
    pub keep_current: bool,
}

/// Confirms a pending TOTP factor.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ActivateTotpRequest {
    /// Factor returned by enrollment.
    pub factor_id: MfaFactorId,
    /// Current code from the authenticator app.
    #[validate(length(min = 6, max = 8, message = "Code must be 6-8 digits"))]
    pub code: String,
}

/// Step-up body: exactly one of `code` or `backup_code`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyMfaRequest {
    /// TOTP code.
    pub code: Option<String>,
    /// Single-use backup code.
    pub backup_code: Option<String>,
}

impl VerifyMfaRequest {
    /// The proof carried by this request.
    pub fn into_proof(self) -> Result<MfaProof, AppError> {
        let code = self.code.filter(|c| !c.trim().is_empty());
        let backup = self.backup_code.filter(|c| !c.trim().is_empty());
        match (code, backup) {
            (Some(code), None) => Ok(MfaProof::Totp(code.trim().to_string())),
            (None, Some(backup)) => Ok(MfaProof::BackupCode(backup)),
            (Some(_), Some(_)) => Err(AppError::validation(
                "Provide either code or backup_code, not both",
            )),
            (None, None) => Err(AppError::validation("code or backup_code is required")),
        }
    }
}

/// Notification listing query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationListQuery {
    /// Only unread notifications.
    #[serde(default)]
    pub unread_only: bool,
    /// Page number (1-based).
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl NotificationListQuery {
    /// Clamped page request.
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}
