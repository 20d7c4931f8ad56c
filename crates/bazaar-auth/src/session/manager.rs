//! Session lifecycle manager: register, login, refresh, logout and
//! elevation flows.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bazaar_core::cancel::ensure_active;
use bazaar_core::config::AuthConfig;
use bazaar_core::error::AppError;
use bazaar_core::types::{SessionId, UserId};
use bazaar_database::store::{SessionStore, UserStore};
use bazaar_entity::session::{AssuranceLevel, CreateSession, DeviceInfo, RevokeReason, Session};
use bazaar_entity::user::{CreateUser, User, UserRole};

use crate::context::AuthContext;
use crate::password::{PasswordHasher, PasswordValidator};
use crate::token::TokenService;

/// Credentials handed out when a new session opens.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    /// Short-lived access token.
    pub access_token: String,
    /// Access token expiration timestamp.
    pub access_expires_at: DateTime<Utc>,
    /// Long-lived opaque refresh token. Shown once.
    pub refresh_token: String,
    /// Session (and refresh token) expiration timestamp.
    pub session_expires_at: DateTime<Utc>,
    /// The session these tokens belong to.
    pub session_id: SessionId,
    /// Assurance of the new session (always level 1).
    pub assurance: AssuranceLevel,
}

/// A replacement access token for an existing session.
#[derive(Debug, Clone, Serialize)]
pub struct AccessGrant {
    /// Newly issued access token; the previous one stops validating.
    pub access_token: String,
    /// Access token expiration timestamp.
    pub access_expires_at: DateTime<Utc>,
    /// The session the token belongs to.
    pub session_id: SessionId,
    /// Assurance carried by the token.
    pub assurance: AssuranceLevel,
}

/// Result of a successful login or registration.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    /// Generated tokens.
    pub tokens: SessionTokens,
    /// The authenticated user.
    pub user: User,
}

/// Manages the complete session lifecycle.
#[derive(Clone)]
pub struct SessionManager {
    /// Session persistence.
    sessions: Arc<dyn SessionStore>,
    /// User persistence.
    users: Arc<dyn UserStore>,
    /// Access token signing.
    tokens: TokenService,
    /// Password hasher.
    hasher: PasswordHasher,
    /// Password policy for new accounts.
    validator: PasswordValidator,
    /// Auth configuration.
    config: AuthConfig,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("tokens", &self.tokens)
            .finish()
    }
}

impl SessionManager {
    /// Creates a new session manager with all required dependencies.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        tokens: TokenService,
        config: AuthConfig,
    ) -> Self {
        Self {
            sessions,
            users,
            tokens,
            hasher: PasswordHasher::new(),
            validator: PasswordValidator::new(&config),
            config,
        }
    }

    /// Creates a member account and opens its first session.
    pub async fn register(
        &self,
        cancel: &CancellationToken,
        email: &str,
        password: &str,
        display_name: &str,
        device: DeviceInfo,
    ) -> Result<LoginResult, AppError> {
        self.validator
            .validate(password, &[email, display_name])?;
        let password_hash = self.hasher.hash_password(password)?;

        ensure_active(cancel)?;
        let user = self
            .users
            .create(
                cancel,
                CreateUser {
                    email: email.to_string(),
                    display_name: display_name.trim().to_string(),
                    password_hash,
                    role: UserRole::Member,
                },
            )
            .await?;
        info!(user_id = %user.id, "User registered");

        let tokens = self.open_session(cancel, &user, device).await?;
        Ok(LoginResult { tokens, user })
    }

    /// Verifies credentials and opens a new session at assurance level 1.
    ///
    /// Every new session starts at level 1, including for accounts with
    /// MFA enrolled.
    pub async fn login(
        &self,
        cancel: &CancellationToken,
        email: &str,
        password: &str,
        device: DeviceInfo,
    ) -> Result<LoginResult, AppError> {
        let Some(user) = self.users.find_by_email(cancel, email).await? else {
            self.hasher.verify_dummy(password);
            return Err(AppError::unauthorized("Invalid email or password"));
        };

        if !self.hasher.verify_password(password, &user.password_hash)? {
            warn!(user_id = %user.id, "Failed login attempt");
            return Err(AppError::unauthorized("Invalid email or password"));
        }

        let tokens = self.open_session(cancel, &user, device).await?;
        info!(user_id = %user.id, session_id = %tokens.session_id, "Login successful");
        Ok(LoginResult { tokens, user })
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// 1. Look up the live session by refresh hash
    /// 2. On a miss, a revoked session holding the hash means the token was
    ///    reused after revocation: revoke the whole session family
    /// 3. Reject expired sessions
    /// 4. Issue a token at the session's current assurance
    /// 5. Rotate the stored access hash, superseding the previous token
    pub async fn refresh(
        &self,
        cancel: &CancellationToken,
        refresh_token: &str,
    ) -> Result<AccessGrant, AppError> {
        let refresh_hash = self.tokens.hash_token(refresh_token);

        // Step 1: Live session lookup
        let Some(session) = self.sessions.find_by_refresh_hash(cancel, &refresh_hash).await? else {
            // Step 2: Reuse detection
            if let Some(stale) = self
                .sessions
                .find_by_refresh_hash_any(cancel, &refresh_hash)
                .await?
            {
                ensure_active(cancel)?;
                let revoked = self
                    .sessions
                    .revoke_all_for_user(cancel, stale.user_id, RevokeReason::RefreshReuse)
                    .await?;
                warn!(
                    user_id = %stale.user_id,
                    session_id = %stale.id,
                    revoked,
                    "Refresh token reused after revocation, revoked all sessions"
                );
            }
            return Err(AppError::unauthorized("Invalid refresh token"));
        };

        // Step 3: Expiry
        if session.is_expired() {
            return Err(AppError::unauthorized("Session has expired"));
        }

        // Step 4: Issue
        let user = self
            .users
            .find_by_id(cancel, session.user_id)
            .await?
            .ok_or_else(|| AppError::unauthorized("User not found"))?;
        let issued = self.tokens.issue_access_token(
            user.id,
            &user.email,
            session.id,
            session.assurance_level,
        )?;

        // Step 5: Rotate
        ensure_active(cancel)?;
        if !self
            .sessions
            .rotate_access_hash(cancel, session.id, &issued.hash, true)
            .await?
        {
            return Err(AppError::unauthorized("Session has been revoked"));
        }

        info!(user_id = %user.id, session_id = %session.id, "Token refreshed");
        Ok(AccessGrant {
            access_token: issued.token,
            access_expires_at: issued.expires_at,
            session_id: session.id,
            assurance: session.assurance_level,
        })
    }

    /// Raises the session to assurance level 2 and issues a matching token.
    ///
    /// The level-1 token is superseded by the access hash rotation.
    pub async fn elevate(
        &self,
        cancel: &CancellationToken,
        ctx: &AuthContext,
    ) -> Result<AccessGrant, AppError> {
        let issued = self.tokens.issue_access_token(
            ctx.user_id,
            &ctx.email,
            ctx.session_id,
            AssuranceLevel::Aal2,
        )?;

        ensure_active(cancel)?;
        if !self
            .sessions
            .elevate(cancel, ctx.session_id, AssuranceLevel::Aal2, &issued.hash)
            .await?
        {
            return Err(AppError::unauthorized("Session has been revoked"));
        }

        info!(user_id = %ctx.user_id, session_id = %ctx.session_id, "Session elevated");
        Ok(AccessGrant {
            access_token: issued.token,
            access_expires_at: issued.expires_at,
            session_id: ctx.session_id,
            assurance: AssuranceLevel::Aal2,
        })
    }

    /// Revokes the caller's current session.
    pub async fn logout(&self, cancel: &CancellationToken, ctx: &AuthContext) -> Result<(), AppError> {
        ensure_active(cancel)?;
        self.sessions
            .revoke(cancel, ctx.session_id, RevokeReason::Logout)
            .await?;
        info!(user_id = %ctx.user_id, session_id = %ctx.session_id, "Logout completed");
        Ok(())
    }

    /// Revokes every session of the caller, optionally sparing the current one.
    ///
    /// Returns the number of sessions that changed state.
    pub async fn logout_all(
        &self,
        cancel: &CancellationToken,
        ctx: &AuthContext,
        keep_current: bool,
    ) -> Result<u64, AppError> {
        ensure_active(cancel)?;
        let revoked = if keep_current {
            self.sessions
                .revoke_all_except(cancel, ctx.user_id, ctx.session_id, RevokeReason::LogoutAll)
                .await?
        } else {
            self.sessions
                .revoke_all_for_user(cancel, ctx.user_id, RevokeReason::LogoutAll)
                .await?
        };
        info!(
            user_id = %ctx.user_id,
            session_id = %ctx.session_id,
            keep_current,
            revoked,
            "Logged out of all sessions"
        );
        Ok(revoked)
    }

    /// Lists the caller's usable sessions, newest first.
    pub async fn list_sessions(
        &self,
        cancel: &CancellationToken,
        ctx: &AuthContext,
    ) -> Result<Vec<Session>, AppError> {
        self.sessions.list_active(cancel, ctx.user_id).await
    }

    /// Revokes one of the caller's own sessions.
    ///
    /// Sessions of other users are reported as missing.
    pub async fn revoke_session(
        &self,
        cancel: &CancellationToken,
        ctx: &AuthContext,
        session_id: SessionId,
    ) -> Result<(), AppError> {
        let session = self
            .sessions
            .find_by_id(cancel, session_id)
            .await?
            .filter(|s| s.user_id == ctx.user_id)
            .ok_or_else(|| AppError::not_found("Session not found"))?;

        ensure_active(cancel)?;
        self.sessions
            .revoke(cancel, session.id, RevokeReason::UserRevoked)
            .await?;
        info!(user_id = %ctx.user_id, session_id = %session.id, "Session revoked by owner");
        Ok(())
    }

    /// Revokes every session of `user_id` on behalf of an administrator.
    pub async fn revoke_user_sessions(
        &self,
        cancel: &CancellationToken,
        admin: &AuthContext,
        user_id: UserId,
    ) -> Result<u64, AppError> {
        self.users
            .find_by_id(cancel, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        ensure_active(cancel)?;
        let revoked = self
            .sessions
            .revoke_all_for_user(cancel, user_id, RevokeReason::AdminRevoked)
            .await?;
        info!(
            admin_id = %admin.user_id,
            user_id = %user_id,
            revoked,
            "Admin revoked user sessions"
        );
        Ok(revoked)
    }

    /// Opens a session at assurance level 1 for an authenticated user.
    async fn open_session(
        &self,
        cancel: &CancellationToken,
        user: &User,
        device: DeviceInfo,
    ) -> Result<SessionTokens, AppError> {
        let session_id = SessionId::new();
        let refresh_token = self.tokens.generate_refresh_token();
        let issued = self.tokens.issue_access_token(
            user.id,
            &user.email,
            session_id,
            AssuranceLevel::Aal1,
        )?;

        ensure_active(cancel)?;
        let session = self
            .sessions
            .create(
                cancel,
                CreateSession {
                    id: session_id,
                    user_id: user.id,
                    refresh_token_hash: self.tokens.hash_token(&refresh_token),
                    access_token_hash: issued.hash,
                    device,
                    expires_at: Utc::now() + self.config.session_ttl(),
                },
            )
            .await?;

        Ok(SessionTokens {
            access_token: issued.token,
            access_expires_at: issued.expires_at,
            refresh_token,
            session_expires_at: session.expires_at,
            session_id: session.id,
            assurance: session.assurance_level,
        })
    }
}
