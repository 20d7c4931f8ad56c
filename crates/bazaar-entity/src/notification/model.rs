//! Notification entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use bazaar_core::types::{NotificationId, UserId};

/// A notification persisted for a recipient.
///
/// The row is the source of truth; live delivery is best effort. Only the
/// read state ever changes after insert.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    /// Unique notification identifier.
    pub id: NotificationId,
    /// The recipient user.
    pub user_id: UserId,
    /// Type tag (`new_message`, `post_liked`, ...).
    pub kind: String,
    /// Short title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Structured data for the client.
    pub payload: serde_json::Value,
    /// The user whose action produced the notification.
    pub actor_id: Option<UserId>,
    /// Whether the recipient has read it.
    pub is_read: bool,
    /// When it was read.
    pub read_at: Option<DateTime<Utc>>,
    /// When it was created.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Check if the notification has not been read yet.
    pub fn is_unread(&self) -> bool {
        !self.is_read
    }
}

/// Data required to persist a notification.
#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub user_id: UserId,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
    pub actor_id: Option<UserId>,
}
