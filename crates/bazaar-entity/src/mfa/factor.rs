//! MFA factor entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use bazaar_core::types::{MfaFactorId, UserId};

/// Kind of second factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "mfa_factor_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FactorType {
    /// RFC 6238 time-based one-time password.
    Totp,
}

/// Enrollment state of a factor. Removal is tracked by `deleted_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "mfa_factor_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FactorStatus {
    /// Secret issued, first code not yet confirmed.
    Pending,
    /// Confirmed and usable for step-up.
    Verified,
}

/// A user's second factor.
///
/// Lifecycle: `pending → verified → removed`. Removal is a soft delete and
/// is terminal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MfaFactor {
    pub id: MfaFactorId,
    pub user_id: UserId,
    pub factor_type: FactorType,
    /// Base32 TOTP secret.
    #[serde(skip_serializing)]
    pub secret: String,
    pub status: FactorStatus,
    /// Highest TOTP time step already accepted; codes at or below it are
    /// replays.
    #[serde(skip_serializing)]
    pub last_used_step: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MfaFactor {
    /// Verified and not removed.
    pub fn is_active(&self) -> bool {
        self.status == FactorStatus::Verified && self.deleted_at.is_none()
    }

    /// Whether the factor has been removed.
    pub fn is_removed(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Data required to start a factor enrollment.
#[derive(Debug, Clone)]
pub struct CreateMfaFactor {
    pub user_id: UserId,
    pub factor_type: FactorType,
    pub secret: String,
}
