use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use bazaar_core::cancel::run_cancellable;
use bazaar_core::result::AppResult;
use bazaar_core::types::{NotificationId, Page, PageRequest, UserId};
use bazaar_entity::notification::{CreateNotification, Notification};

use crate::store::NotificationStore;

/// Notification store held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotificationStore {
    rows: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotificationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create(
        &self,
        cancel: &CancellationToken,
        data: CreateNotification,
    ) -> AppResult<Notification> {
        run_cancellable(cancel, async {
            let row = Notification {
                id: NotificationId::new(),
                user_id: data.user_id,
                kind: data.kind,
                title: data.title,
                message: data.message,
                payload: data.payload,
                actor_id: data.actor_id,
                is_read: false,
                read_at: None,
                created_at: Utc::now(),
            };
            self.rows.lock().await.push(row.clone());
            Ok(row)
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
            let rows = self.rows.lock().await;
            let mut matching: Vec<&Notification> = rows
                .iter()
                .filter(|n| n.user_id == user_id && (!unread_only || n.is_unread()))
                .collect();
            matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
            let total = matching.len() as u64;
            let items = matching
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.limit() as usize)
                .cloned()
                .collect();
            Ok(Page::new(items, &page, total))
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
            let mut rows = self.rows.lock().await;
            match rows.iter_mut().find(|n| n.id == id && n.user_id == user_id) {
                Some(row) => {
                    row.is_read = true;
                    row.read_at.get_or_insert(at);
                    Ok(true)
                }
                None => Ok(false),
            }
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
            let mut rows = self.rows.lock().await;
            let mut changed = 0;
            for row in rows.iter_mut().filter(|n| n.user_id == user_id && n.is_unread()) {
                row.is_read = true;
                row.read_at = Some(at);
                changed += 1;
            }
            Ok(changed)
        })
        .await
    }

    async fn unread_count(&self, cancel: &CancellationToken, user_id: UserId) -> AppResult<u64> {
        run_cancellable(cancel, async {
            Ok(self
                .rows
                .lock()
                .await
                .iter()
                .filter(|n| n.user_id == user_id && n.is_unread())
                .count() as u64)
        })
        .await
    }
}
