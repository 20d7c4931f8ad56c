//! Notification read state and unread-count updates.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bazaar_core::cancel::ensure_active;
use bazaar_core::error::AppError;
use bazaar_core::types::{NotificationId, Page, PageRequest, UserId};
use bazaar_database::store::NotificationStore;
use bazaar_entity::notification::Notification;

use crate::hub::HubHandle;
use crate::message::OutboundMessage;

/// Reads and updates a user's notifications.
///
/// After every read-state change the user's socket receives the new
/// unread count.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    hub: HubHandle,
}

impl std::fmt::Debug for NotificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationService").finish_non_exhaustive()
    }
}

impl NotificationService {
    /// Create a new service.
    pub fn new(store: Arc<dyn NotificationStore>, hub: HubHandle) -> Self {
        Self { store, hub }
    }

    /// Newest-first page of the user's notifications.
    pub async fn list(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        unread_only: bool,
        page: PageRequest,
    ) -> Result<Page<Notification>, AppError> {
        self.store
            .list_for_user(cancel, user_id, unread_only, page)
            .await
    }

    /// Marks one of the user's notifications as read.
    pub async fn mark_read(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        id: NotificationId,
    ) -> Result<u64, AppError> {
        ensure_active(cancel)?;
        if !self.store.mark_read(cancel, user_id, id, Utc::now()).await? {
            return Err(AppError::not_found("Notification not found"));
        }
        self.publish_unread_count(cancel, user_id).await
    }

    /// Marks all of the user's notifications as read.
    ///
    /// Returns how many changed.
    pub async fn mark_all_read(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> Result<u64, AppError> {
        ensure_active(cancel)?;
        let changed = self.store.mark_all_read(cancel, user_id, Utc::now()).await?;
        self.publish_unread_count(cancel, user_id).await?;
        Ok(changed)
    }

    /// Number of unread notifications.
    pub async fn unread_count(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> Result<u64, AppError> {
        self.store.unread_count(cancel, user_id).await
    }

    /// Push the current unread count to the user's socket, if any.
    ///
    /// Returns the count.
    pub async fn publish_unread_count(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> Result<u64, AppError> {
        let count = self.store.unread_count(cancel, user_id).await?;
        debug!(user_id = %user_id, count, "Publishing unread count");
        self.hub.send(user_id, OutboundMessage::UnreadCount { count });
        Ok(count)
    }
}
