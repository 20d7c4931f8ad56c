//! Claims carried by every access token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bazaar_core::types::{SessionId, UserId};
use bazaar_entity::session::AssuranceLevel;

/// JWT claims payload embedded in every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the user ID.
    pub sub: UserId,
    /// Email at issuance.
    pub email: String,
    /// Session ID this token belongs to.
    pub sid: SessionId,
    /// Assurance level at issuance (1 or 2).
    pub aal: u8,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
    /// Unique token ID; two tokens issued in the same second still differ.
    pub jti: Uuid,
    /// Issuer.
    pub iss: String,
}

impl AccessClaims {
    /// Returns the user ID from the subject claim.
    pub fn user_id(&self) -> UserId {
        self.sub
    }

    /// Returns the session ID.
    pub fn session_id(&self) -> SessionId {
        self.sid
    }

    /// Assurance level named by the `aal` claim.
    ///
    /// Validated tokens always carry 1 or 2; anything else reads as the
    /// baseline level.
    pub fn assurance(&self) -> AssuranceLevel {
        AssuranceLevel::from_level(self.aal).unwrap_or(AssuranceLevel::Aal1)
    }

    /// Returns the expiration as a `DateTime<Utc>`.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}
