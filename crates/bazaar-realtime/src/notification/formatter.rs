//! Notification message formatting for domain events.

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use bazaar_core::types::UserId;
use bazaar_entity::notification::CreateNotification;

/// Longest excerpt of user text copied into a notification body.
const EXCERPT_CHARS: usize = 140;

/// Something that happened elsewhere in the platform and concerns a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A direct message arrived.
    NewMessage {
        sender_id: UserId,
        sender_name: String,
        conversation_id: Uuid,
        preview: String,
    },
    /// Someone liked the recipient's post.
    PostLiked {
        actor_id: UserId,
        actor_name: String,
        post_id: Uuid,
    },
    /// Someone commented on the recipient's post.
    PostCommented {
        actor_id: UserId,
        actor_name: String,
        post_id: Uuid,
        comment_id: Uuid,
        excerpt: String,
    },
    /// Someone followed the recipient.
    NewFollower {
        actor_id: UserId,
        actor_name: String,
    },
    /// The recipient was mentioned in a post.
    Mention {
        actor_id: UserId,
        actor_name: String,
        post_id: Uuid,
        excerpt: String,
    },
}

impl DomainEvent {
    /// Type tag stored on the notification.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewMessage { .. } => "new_message",
            Self::PostLiked { .. } => "post_liked",
            Self::PostCommented { .. } => "post_commented",
            Self::NewFollower { .. } => "new_follower",
            Self::Mention { .. } => "mention",
        }
    }

    /// The user whose action produced the event.
    pub fn actor_id(&self) -> UserId {
        match self {
            Self::NewMessage { sender_id, .. } => *sender_id,
            Self::PostLiked { actor_id, .. }
            | Self::PostCommented { actor_id, .. }
            | Self::NewFollower { actor_id, .. }
            | Self::Mention { actor_id, .. } => *actor_id,
        }
    }
}

/// Formats notification rows for domain events.
pub struct NotificationFormatter;

impl NotificationFormatter {
    /// Builds the row persisted for `recipient`.
    pub fn format(recipient: UserId, event: &DomainEvent) -> CreateNotification {
        let (title, message, payload) = match event {
            DomainEvent::NewMessage {
                sender_id,
                sender_name,
                conversation_id,
                preview,
            } => (
                "New Message".to_string(),
                format!("{sender_name}: {}", excerpt(preview)),
                json!({
                    "conversation_id": conversation_id,
                    "sender_id": sender_id,
                }),
            ),
            DomainEvent::PostLiked {
                actor_name,
                post_id,
                ..
            } => (
                "New Like".to_string(),
                format!("{actor_name} liked your post"),
                json!({ "post_id": post_id }),
            ),
            DomainEvent::PostCommented {
                actor_name,
                post_id,
                comment_id,
                excerpt: text,
                ..
            } => (
                "New Comment".to_string(),
                format!("{actor_name} commented: {}", excerpt(text)),
                json!({ "post_id": post_id, "comment_id": comment_id }),
            ),
            DomainEvent::NewFollower { actor_id, actor_name } => (
                "New Follower".to_string(),
                format!("{actor_name} started following you"),
                json!({ "follower_id": actor_id }),
            ),
            DomainEvent::Mention {
                actor_name,
                post_id,
                excerpt: text,
                ..
            } => (
                "You Were Mentioned".to_string(),
                format!("{actor_name} mentioned you: {}", excerpt(text)),
                json!({ "post_id": post_id }),
            ),
        };

        CreateNotification {
            user_id: recipient,
            kind: event.kind().to_string(),
            title,
            message,
            payload,
            actor_id: Some(event.actor_id()),
        }
    }
}

fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS - 1).collect();
    format!("{}…", cut.trim_end())
}
