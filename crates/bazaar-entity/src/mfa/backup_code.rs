//! Backup code entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use bazaar_core::types::{BackupCodeId, UserId};

/// A single-use recovery code. Only its hash is stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BackupCode {
    pub id: BackupCodeId,
    pub user_id: UserId,
    #[serde(skip_serializing)]
    pub code_hash: String,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
