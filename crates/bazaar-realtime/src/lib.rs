//! # bazaar-realtime
//!
//! Real-time delivery for Bazaar. Provides:
//!
//! - A connection hub actor holding at most one live socket per user
//! - `{type, payload}` envelopes for server and client frames
//! - Notification dispatch: persist, push live, forward to a push provider
//! - Notification read state with unread-count updates

pub mod hub;
pub mod message;
pub mod notification;

pub use hub::{ConnectionHub, ConnectionId, HubHandle, HubStats, Registration};
pub use message::{InboundMessage, OutboundMessage};
pub use notification::{
    DeliveryDispatcher, DomainEvent, NotificationFormatter, NotificationService, PushNotifier,
};
