//! Frames exchanged over the real-time socket.

pub mod types;

pub use types::{InboundMessage, NotificationFrame, OutboundMessage};
