//! Session entity model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use bazaar_core::types::{SessionId, UserId};

/// Authentication assurance level of a session.
///
/// Every session starts at [`AssuranceLevel::Aal1`] (password) and can only
/// move upward to [`AssuranceLevel::Aal2`] after a second factor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(try_from = "u8", into = "u8")]
#[repr(i16)]
pub enum AssuranceLevel {
    /// Single-factor (password) authentication.
    Aal1 = 1,
    /// Password plus a verified second factor.
    Aal2 = 2,
}

impl AssuranceLevel {
    /// Numeric level as carried in the `aal` claim.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a numeric level; anything other than 1 or 2 is rejected.
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Aal1),
            2 => Some(Self::Aal2),
            _ => None,
        }
    }
}

impl TryFrom<u8> for AssuranceLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_level(value).ok_or_else(|| format!("invalid assurance level {value}"))
    }
}

impl From<AssuranceLevel> for u8 {
    fn from(level: AssuranceLevel) -> Self {
        level.as_u8()
    }
}

impl fmt::Display for AssuranceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aal{}", self.as_u8())
    }
}

/// Client-supplied device metadata recorded on a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Friendly device label ("Pixel 8", "Work laptop").
    pub device_name: Option<String>,
    /// Client IP address as seen by the server.
    pub ip_address: Option<String>,
    /// User-Agent header value.
    pub user_agent: Option<String>,
}

/// One device's login session.
///
/// Sessions are never hard-deleted. A session authorizes requests only
/// while it is not revoked and has not reached `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    /// Unique session identifier (the `sid` claim).
    pub id: SessionId,
    /// The user this session belongs to.
    pub user_id: UserId,
    /// SHA-256 hash of the long-lived refresh token.
    #[serde(skip_serializing)]
    pub refresh_token_hash: String,
    /// SHA-256 hash of the only access token currently honored.
    #[serde(skip_serializing)]
    pub access_token_hash: String,
    /// Assurance reached by this session.
    pub assurance_level: AssuranceLevel,
    /// Friendly device label.
    pub device_name: Option<String>,
    /// IP address from which the session was created.
    pub ip_address: Option<String>,
    /// User-Agent header value.
    pub user_agent: Option<String>,
    /// Absolute expiry of the session and its refresh token.
    pub expires_at: DateTime<Utc>,
    /// Whether the session has been revoked.
    pub revoked: bool,
    /// When the session was revoked.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Why the session was revoked (audit only).
    pub revoked_reason: Option<String>,
    /// When the access token was last rotated through refresh.
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// When the session was created (login time).
    pub created_at: DateTime<Utc>,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session may authorize a request at `now`.
    ///
    /// Revocation is checked first so a revoked session is rejected even
    /// when it has not yet expired.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }

    /// Whether the session may authorize a request right now.
    pub fn is_usable(&self) -> bool {
        self.is_usable_at(Utc::now())
    }

    /// Whether the session has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Whether step-up MFA has been completed.
    pub fn is_elevated(&self) -> bool {
        self.assurance_level >= AssuranceLevel::Aal2
    }
}

/// Data required to open a new session.
///
/// Carries no assurance level; stores always open sessions at
/// [`AssuranceLevel::Aal1`].
#[derive(Debug, Clone)]
pub struct CreateSession {
    /// Pre-generated id so the first access token can carry it.
    pub id: SessionId,
    /// The user this session belongs to.
    pub user_id: UserId,
    /// SHA-256 hash of the refresh token.
    pub refresh_token_hash: String,
    /// SHA-256 hash of the first access token.
    pub access_token_hash: String,
    /// Client device metadata.
    pub device: DeviceInfo,
    /// When the session expires.
    pub expires_at: DateTime<Utc>,
}

/// Why a session was revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeReason {
    /// The user logged out of this device.
    Logout,
    /// The user logged out of every (other) device.
    LogoutAll,
    /// The user revoked the session from the session list.
    UserRevoked,
    /// An administrator revoked the user's sessions.
    AdminRevoked,
    /// A refresh token was presented after its session had been revoked.
    RefreshReuse,
}

impl RevokeReason {
    /// Stable string stored in `revoked_reason`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::LogoutAll => "logout_all",
            Self::UserRevoked => "user_revoked",
            Self::AdminRevoked => "admin_revoked",
            Self::RefreshReuse => "refresh_reuse",
        }
    }
}
