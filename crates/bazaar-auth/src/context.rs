//! Typed identity produced by the auth gate.

use serde::Serialize;

use bazaar_core::error::AppError;
use bazaar_core::types::{SessionId, UserId};
use bazaar_entity::session::AssuranceLevel;
use bazaar_entity::user::UserRole;

/// Identity of an authenticated request.
///
/// Built only after every gate check has passed, then handed to handlers
/// and services explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    /// Authenticated user.
    pub user_id: UserId,
    /// Email carried in the access token.
    pub email: String,
    /// Session the access token belongs to.
    pub session_id: SessionId,
    /// Effective assurance: the lower of the token claim and the session row.
    pub assurance: AssuranceLevel,
    /// Current role of the user.
    pub role: UserRole,
}

impl AuthContext {
    /// Whether the session completed step-up MFA.
    pub fn is_elevated(&self) -> bool {
        self.assurance >= AssuranceLevel::Aal2
    }

    /// Fail with `MfaRequired` unless the session is elevated.
    pub fn require_elevated(&self) -> Result<(), AppError> {
        if self.is_elevated() {
            Ok(())
        } else {
            Err(AppError::mfa_required(
                "This action requires multi-factor verification",
            ))
        }
    }
}
