//! Store traits consumed by the auth and delivery services.
//!
//! Every operation takes the caller's [`CancellationToken`] and returns
//! `Cancelled` if it fires before the statement completes. Each mutating
//! operation is a single conditional statement (or one transaction), so
//! concurrent callers never observe a half-applied change.
//!
//! Two implementations exist: PostgreSQL in [`crate::repositories`] and
//! in-process in [`crate::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use bazaar_core::result::AppResult;
use bazaar_core::types::{MfaFactorId, NotificationId, Page, PageRequest, SessionId, UserId};
use bazaar_entity::mfa::{CreateMfaFactor, MfaFactor};
use bazaar_entity::notification::{CreateNotification, Notification};
use bazaar_entity::session::{AssuranceLevel, CreateSession, RevokeReason, Session};
use bazaar_entity::user::{CreateUser, User};

/// Durable session records.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Insert a new session at assurance level 1.
    async fn create(&self, cancel: &CancellationToken, data: CreateSession) -> AppResult<Session>;

    /// Fetch a session by id regardless of state.
    async fn find_by_id(
        &self,
        cancel: &CancellationToken,
        id: SessionId,
    ) -> AppResult<Option<Session>>;

    /// Fetch the non-revoked session holding this refresh hash.
    async fn find_by_refresh_hash(
        &self,
        cancel: &CancellationToken,
        refresh_hash: &str,
    ) -> AppResult<Option<Session>>;

    /// Fetch any session (revoked included) that ever held this refresh
    /// hash. Used only to detect refresh-token reuse.
    async fn find_by_refresh_hash_any(
        &self,
        cancel: &CancellationToken,
        refresh_hash: &str,
    ) -> AppResult<Option<Session>>;

    /// Replace the honored access-token hash. Returns `false` and changes
    /// nothing when the session is revoked or missing.
    async fn rotate_access_hash(
        &self,
        cancel: &CancellationToken,
        id: SessionId,
        access_hash: &str,
        refreshed: bool,
    ) -> AppResult<bool>;

    /// Raise the assurance level and rotate the access hash in one step.
    /// The level never decreases. Returns `false` when the session is
    /// revoked or missing.
    async fn elevate(
        &self,
        cancel: &CancellationToken,
        id: SessionId,
        level: AssuranceLevel,
        access_hash: &str,
    ) -> AppResult<bool>;

    /// Revoke one session. Idempotent; returns whether it was live.
    async fn revoke(
        &self,
        cancel: &CancellationToken,
        id: SessionId,
        reason: RevokeReason,
    ) -> AppResult<bool>;

    /// Revoke every live session of a user. Returns how many changed.
    async fn revoke_all_for_user(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        reason: RevokeReason,
    ) -> AppResult<u64>;

    /// Revoke every live session of a user except `keep`.
    async fn revoke_all_except(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        keep: SessionId,
        reason: RevokeReason,
    ) -> AppResult<u64>;

    /// Live (non-revoked, unexpired) sessions of a user, newest first.
    async fn list_active(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<Vec<Session>>;
}

/// Minimal account lookup needed by login and role guards.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Insert a user. `Conflict` if the email is taken.
    async fn create(&self, cancel: &CancellationToken, data: CreateUser) -> AppResult<User>;

    /// Look up by normalized email.
    async fn find_by_email(&self, cancel: &CancellationToken, email: &str)
    -> AppResult<Option<User>>;

    /// Look up by id.
    async fn find_by_id(&self, cancel: &CancellationToken, id: UserId) -> AppResult<Option<User>>;
}

/// Result of trying to spend a backup code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// The code was unused and is now spent by this call.
    Redeemed,
    /// The code exists but was already spent.
    AlreadyUsed,
    /// No such code for this user.
    Unknown,
}

/// Second factors and backup codes.
#[async_trait]
pub trait MfaStore: Send + Sync + 'static {
    /// Insert a pending factor.
    async fn create_factor(
        &self,
        cancel: &CancellationToken,
        data: CreateMfaFactor,
    ) -> AppResult<MfaFactor>;

    /// Fetch a non-removed factor owned by `user_id`.
    async fn find_factor(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        id: MfaFactorId,
    ) -> AppResult<Option<MfaFactor>>;

    /// Non-removed factors of a user, oldest first.
    async fn list_factors(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<Vec<MfaFactor>>;

    /// The user's verified, non-removed TOTP factor.
    async fn find_verified_totp(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<Option<MfaFactor>>;

    /// Move a pending factor to verified, record its first used step and
    /// replace the owner's unused backup codes with `code_hashes`, as one
    /// unit. Returns `false`, changing nothing, if it was not pending.
    async fn activate_factor(
        &self,
        cancel: &CancellationToken,
        id: MfaFactorId,
        step: i64,
        code_hashes: Vec<String>,
    ) -> AppResult<bool>;

    /// Record `step` as consumed if it is newer than the last consumed
    /// step. Returns `false` for a replay.
    async fn consume_totp_step(
        &self,
        cancel: &CancellationToken,
        id: MfaFactorId,
        step: i64,
    ) -> AppResult<bool>;

    /// Soft-delete a factor. Returns `false` if already removed.
    async fn remove_factor(&self, cancel: &CancellationToken, id: MfaFactorId) -> AppResult<bool>;

    /// Soft-delete every pending factor of a user.
    async fn remove_pending_factors(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<u64>;

    /// Atomically discard unused codes and store a fresh batch of hashes.
    async fn replace_backup_codes(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        code_hashes: Vec<String>,
    ) -> AppResult<()>;

    /// Discard every unused code of a user.
    async fn clear_backup_codes(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<u64>;

    /// Spend a code with a single conditional update; of any number of
    /// concurrent callers exactly one sees [`RedeemOutcome::Redeemed`].
    async fn redeem_backup_code(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        code_hash: &str,
    ) -> AppResult<RedeemOutcome>;

    /// Number of unused codes.
    async fn count_unused_backup_codes(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<u64>;
}

/// Persisted notifications and their read state.
#[async_trait]
pub trait NotificationStore: Send + Sync + 'static {
    /// Insert a notification.
    async fn create(
        &self,
        cancel: &CancellationToken,
        data: CreateNotification,
    ) -> AppResult<Notification>;

    /// A page of a user's notifications, newest first.
    async fn list_for_user(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        unread_only: bool,
        page: PageRequest,
    ) -> AppResult<Page<Notification>>;

    /// Mark one notification read. Returns `false` if it does not belong
    /// to the user.
    async fn mark_read(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Mark every unread notification read. Returns how many changed.
    async fn mark_all_read(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Number of unread notifications.
    async fn unread_count(&self, cancel: &CancellationToken, user_id: UserId) -> AppResult<u64>;
}
