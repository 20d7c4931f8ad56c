//! PostgreSQL notification store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use bazaar_core::cancel::run_cancellable;
use bazaar_core::error::{AppError, ErrorKind};
use bazaar_core::result::AppResult;
use bazaar_core::types::{NotificationId, Page, PageRequest, UserId};
use bazaar_entity::notification::{CreateNotification, Notification};

use crate::store::NotificationStore;

/// Repository for notification persistence and read state.
#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    /// Create a new notification repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn create(
        &self,
        cancel: &CancellationToken,
        data: CreateNotification,
    ) -> AppResult<Notification> {
        run_cancellable(cancel, async {
            sqlx::query_as::<_, Notification>(
                "INSERT INTO notifications (id, user_id, kind, title, message, payload, actor_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
            )
            .bind(NotificationId::new())
            .bind(data.user_id)
            .bind(&data.kind)
            .bind(&data.title)
            .bind(&data.message)
            .bind(&data.payload)
            .bind(data.actor_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to create notification", e)
            })
        })
        .await
    }

    async fn list_for_user(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        unread_only: bool,
        page: PageRequest,
    ) -> AppResult<Page<Notification>> {
        let page = page.normalized();
        run_cancellable(cancel, async {
            let total: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM notifications WHERE user_id = $1 \
                 AND ($2 = FALSE OR is_read = FALSE)",
            )
            .bind(user_id)
            .bind(unread_only)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to count notifications", e)
            })?;

            let items = sqlx::query_as::<_, Notification>(
                "SELECT * FROM notifications WHERE user_id = $1 \
                 AND ($2 = FALSE OR is_read = FALSE) \
                 ORDER BY created_at DESC LIMIT $3 OFFSET $4",
            )
            .bind(user_id)
            .bind(unread_only)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to list notifications", e)
            })?;

            Ok(Page::new(items, &page, total.max(0) as u64))
        })
        .await
    }

    async fn mark_read(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        run_cancellable(cancel, async {
            let result = sqlx::query(
                "UPDATE notifications SET is_read = TRUE, read_at = COALESCE(read_at, $3) \
                 WHERE id = $1 AND user_id = $2",
            )
            .bind(id)
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to mark notification read", e)
            })?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn mark_all_read(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        run_cancellable(cancel, async {
            let result = sqlx::query(
                "UPDATE notifications SET is_read = TRUE, read_at = $2 \
                 WHERE user_id = $1 AND is_read = FALSE",
            )
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to mark notifications read", e)
            })?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn unread_count(&self, cancel: &CancellationToken, user_id: UserId) -> AppResult<u64> {
        run_cancellable(cancel, async {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to count unread", e)
            })?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}
