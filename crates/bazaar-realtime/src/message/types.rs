//! Inbound and outbound message type definitions.
//!
//! Both directions use the same `{"type": ..., "payload": {...}}` shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::types::{NotificationId, SessionId, UserId};
use bazaar_entity::notification::Notification;

/// Messages sent by the client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Acknowledge receipt of a delivered notification.
    Ack {
        /// Notification being acknowledged.
        message_id: NotificationId,
    },
    /// Mark one notification as read.
    Read {
        /// Notification ID.
        notification_id: NotificationId,
    },
    /// Mark every notification as read.
    ReadAll,
    /// Client keepalive.
    Ping,
}

/// A notification as pushed to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationFrame {
    /// Notification ID, echoed back in `ack`.
    pub id: NotificationId,
    /// Type tag.
    pub kind: String,
    /// Title.
    pub title: String,
    /// Body.
    pub message: String,
    /// Structured data.
    pub payload: serde_json::Value,
    /// Who caused it.
    pub actor_id: Option<UserId>,
    /// When it was created.
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationFrame {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id,
            kind: n.kind.clone(),
            title: n.title.clone(),
            message: n.message.clone(),
            payload: n.payload.clone(),
            actor_id: n.actor_id,
            created_at: n.created_at,
        }
    }
}

/// Messages sent by the server to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Notification delivery.
    Notification(NotificationFrame),
    /// Current unread notification count.
    UnreadCount {
        /// Unread notifications.
        count: u64,
    },
    /// The session behind this socket was revoked; the socket closes next.
    SessionRevoked {
        /// Revoked session, when known.
        session_id: Option<SessionId>,
        /// Why it was revoked.
        reason: String,
    },
    /// Server keepalive.
    Ping {
        /// Server timestamp.
        timestamp: i64,
    },
    /// Error message.
    Error {
        /// Error code.
        code: String,
        /// Error description.
        message: String,
    },
}

impl OutboundMessage {
    /// Serialize to the JSON text frame sent on the socket.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize outbound message");
            r#"{"type":"error","payload":{"code":"SERIALIZATION_ERROR","message":"Internal error"}}"#
                .to_string()
        })
    }

    /// A keepalive stamped with the current time.
    pub fn ping() -> Self {
        Self::Ping {
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Notification(_) => "notification",
            Self::UnreadCount { .. } => "unread_count",
            Self::SessionRevoked { .. } => "session_revoked",
            Self::Ping { .. } => "ping",
            Self::Error { .. } => "error",
        }
    }
}
