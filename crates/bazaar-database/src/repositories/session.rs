//! PostgreSQL session store.

use async_trait::async_trait;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use bazaar_core::cancel::run_cancellable;
use bazaar_core::error::{AppError, ErrorKind};
use bazaar_core::result::AppResult;
use bazaar_core::types::{SessionId, UserId};
use bazaar_entity::session::{AssuranceLevel, CreateSession, RevokeReason, Session};

use crate::store::SessionStore;

/// Session repository backed by the `sessions` table.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    /// Create a new session repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn create(&self, cancel: &CancellationToken, data: CreateSession) -> AppResult<Session> {
        run_cancellable(cancel, async {
            sqlx::query_as::<_, Session>(
                "INSERT INTO sessions (id, user_id, refresh_token_hash, access_token_hash, \
                 assurance_level, device_name, ip_address, user_agent, expires_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
            )
            .bind(data.id)
            .bind(data.user_id)
            .bind(&data.refresh_token_hash)
            .bind(&data.access_token_hash)
            .bind(AssuranceLevel::Aal1)
            .bind(&data.device.device_name)
            .bind(&data.device.ip_address)
            .bind(&data.device.user_agent)
            .bind(data.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create session", e))
        })
        .await
    }

    async fn find_by_id(
        &self,
        cancel: &CancellationToken,
        id: SessionId,
    ) -> AppResult<Option<Session>> {
        run_cancellable(cancel, async {
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find session", e))
        })
        .await
    }

    async fn find_by_refresh_hash(
        &self,
        cancel: &CancellationToken,
        refresh_hash: &str,
    ) -> AppResult<Option<Session>> {
        run_cancellable(cancel, async {
            sqlx::query_as::<_, Session>(
                "SELECT * FROM sessions WHERE refresh_token_hash = $1 AND revoked = FALSE",
            )
            .bind(refresh_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    "Failed to find session by refresh token",
                    e,
                )
            })
        })
        .await
    }

    async fn find_by_refresh_hash_any(
        &self,
        cancel: &CancellationToken,
        refresh_hash: &str,
    ) -> AppResult<Option<Session>> {
        run_cancellable(cancel, async {
            sqlx::query_as::<_, Session>(
                "SELECT * FROM sessions WHERE refresh_token_hash = $1 \
                 ORDER BY revoked ASC, created_at DESC LIMIT 1",
            )
            .bind(refresh_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    "Failed to look up refresh token history",
                    e,
                )
            })
        })
        .await
    }

    async fn rotate_access_hash(
        &self,
        cancel: &CancellationToken,
        id: SessionId,
        access_hash: &str,
        refreshed: bool,
    ) -> AppResult<bool> {
        run_cancellable(cancel, async {
            let result = sqlx::query(
                "UPDATE sessions SET access_token_hash = $2, updated_at = NOW(), \
                 last_refreshed_at = CASE WHEN $3 THEN NOW() ELSE last_refreshed_at END \
                 WHERE id = $1 AND revoked = FALSE",
            )
            .bind(id)
            .bind(access_hash)
            .bind(refreshed)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to rotate access token", e)
            })?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn elevate(
        &self,
        cancel: &CancellationToken,
        id: SessionId,
        level: AssuranceLevel,
        access_hash: &str,
    ) -> AppResult<bool> {
        run_cancellable(cancel, async {
            let result = sqlx::query(
                "UPDATE sessions SET assurance_level = GREATEST(assurance_level, $2), \
                 access_token_hash = $3, updated_at = NOW() \
                 WHERE id = $1 AND revoked = FALSE",
            )
            .bind(id)
            .bind(level)
            .bind(access_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to elevate session", e))?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn revoke(
        &self,
        cancel: &CancellationToken,
        id: SessionId,
        reason: RevokeReason,
    ) -> AppResult<bool> {
        run_cancellable(cancel, async {
            let result = sqlx::query(
                "UPDATE sessions SET revoked = TRUE, revoked_at = NOW(), revoked_reason = $2, \
                 updated_at = NOW() WHERE id = $1 AND revoked = FALSE",
            )
            .bind(id)
            .bind(reason.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to revoke session", e))?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn revoke_all_for_user(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        reason: RevokeReason,
    ) -> AppResult<u64> {
        run_cancellable(cancel, async {
            let result = sqlx::query(
                "UPDATE sessions SET revoked = TRUE, revoked_at = NOW(), revoked_reason = $2, \
                 updated_at = NOW() WHERE user_id = $1 AND revoked = FALSE",
            )
            .bind(user_id)
            .bind(reason.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to revoke user sessions", e)
            })?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn revoke_all_except(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        keep: SessionId,
        reason: RevokeReason,
    ) -> AppResult<u64> {
        run_cancellable(cancel, async {
            let result = sqlx::query(
                "UPDATE sessions SET revoked = TRUE, revoked_at = NOW(), revoked_reason = $3, \
                 updated_at = NOW() WHERE user_id = $1 AND id <> $2 AND revoked = FALSE",
            )
            .bind(user_id)
            .bind(keep)
            .bind(reason.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to revoke other sessions", e)
            })?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn list_active(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<Vec<Session>> {
        run_cancellable(cancel, async {
            sqlx::query_as::<_, Session>(
                "SELECT * FROM sessions WHERE user_id = $1 AND revoked = FALSE \
                 AND expires_at > NOW() ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to list active sessions", e)
            })
        })
        .await
    }
}
