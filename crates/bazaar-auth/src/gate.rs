//! Per-request authentication gate.
//!
//! Every guarded request runs the same checks in order:
//!
//! 1. Extract the bearer token from the `Authorization` header
//! 2. Validate signature, algorithm and expiry
//! 3. Load the session named by the `sid` claim
//! 4. Reject revoked or expired sessions
//! 5. Compare the token hash with the session's current access hash
//! 6. Load the user and apply role and assurance requirements
//!
//! There is no session cache: each request reads the live session row, so
//! a revocation is visible to the very next request.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bazaar_core::error::AppError;
use bazaar_database::store::{SessionStore, UserStore};
use bazaar_entity::session::AssuranceLevel;
use bazaar_entity::user::UserRole;

use crate::context::AuthContext;
use crate::token::{TokenService, constant_time_eq, hash_token};

/// What a guarded route demands beyond a valid session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    /// Minimum effective assurance.
    pub assurance: AssuranceLevel,
    /// Minimum role, if any.
    pub role: Option<UserRole>,
}

impl Requirement {
    /// Any valid session (assurance 1 or higher).
    pub const fn authenticated() -> Self {
        Self {
            assurance: AssuranceLevel::Aal1,
            role: None,
        }
    }

    /// A session that completed step-up MFA.
    pub const fn elevated() -> Self {
        Self {
            assurance: AssuranceLevel::Aal2,
            role: None,
        }
    }

    /// A user holding at least `role`.
    pub const fn role(role: UserRole) -> Self {
        Self {
            assurance: AssuranceLevel::Aal1,
            role: Some(role),
        }
    }

    /// Additionally demand an elevated session.
    pub const fn and_elevated(self) -> Self {
        Self {
            assurance: AssuranceLevel::Aal2,
            role: self.role,
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AppError> {
    let header = header.ok_or_else(|| AppError::unauthorized("Missing authorization header"))?;
    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Malformed authorization header"))?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AppError::unauthorized("Malformed authorization header"));
    }
    Ok(token)
}

/// Validates access tokens against the live session store.
#[derive(Clone)]
pub struct AuthGate {
    tokens: TokenService,
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("tokens", &self.tokens)
            .finish()
    }
}

impl AuthGate {
    /// Creates a gate.
    pub fn new(
        tokens: TokenService,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            tokens,
            sessions,
            users,
        }
    }

    /// Runs every check against an `Authorization` header value.
    pub async fn authenticate_header(
        &self,
        cancel: &CancellationToken,
        header: Option<&str>,
        requirement: Requirement,
    ) -> Result<AuthContext, AppError> {
        let token = bearer_token(header)?;
        self.authenticate(cancel, token, requirement).await
    }

    /// Runs checks 2 to 6 against a raw access token.
    pub async fn authenticate(
        &self,
        cancel: &CancellationToken,
        token: &str,
        requirement: Requirement,
    ) -> Result<AuthContext, AppError> {
        let claims = self.tokens.validate_access_token(token)?;

        let session = self
            .sessions
            .find_by_id(cancel, claims.session_id())
            .await?
            .filter(|s| s.user_id == claims.user_id())
            .ok_or_else(|| AppError::unauthorized("Session not found"))?;

        if session.revoked {
            debug!(session_id = %session.id, "Rejected token of revoked session");
            return Err(AppError::unauthorized("Session has been revoked"));
        }
        if !session.is_usable_at(Utc::now()) {
            return Err(AppError::unauthorized("Session has expired"));
        }

        let presented = hash_token(token);
        if !constant_time_eq(presented.as_bytes(), session.access_token_hash.as_bytes()) {
            debug!(session_id = %session.id, "Rejected superseded access token");
            return Err(AppError::unauthorized("Access token has been superseded"));
        }

        let user = self
            .users
            .find_by_id(cancel, session.user_id)
            .await?
            .ok_or_else(|| AppError::unauthorized("User not found"))?;

        let ctx = AuthContext {
            user_id: user.id,
            email: claims.email.clone(),
            session_id: session.id,
            assurance: claims.assurance().min(session.assurance_level),
            role: user.role,
        };

        if requirement
            .role
            .is_some_and(|required| !ctx.role.has_at_least(&required))
        {
            return Err(AppError::forbidden("Insufficient role for this action"));
        }
        if ctx.assurance < requirement.assurance {
            return Err(AppError::mfa_required(
                "This action requires multi-factor verification",
            ));
        }

        Ok(ctx)
    }

    /// Like [`AuthGate::authenticate_header`] but yields `None` instead of
    /// failing.
    pub async fn identify(
        &self,
        cancel: &CancellationToken,
        header: Option<&str>,
    ) -> Option<AuthContext> {
        self.authenticate_header(cancel, header, Requirement::authenticated())
            .await
            .ok()
    }
}
