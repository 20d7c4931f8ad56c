//! Notification creation, live delivery, push forwarding and read state.

pub mod dispatcher;
pub mod formatter;
pub mod push;
pub mod service;

pub use dispatcher::DeliveryDispatcher;
pub use formatter::{DomainEvent, NotificationFormatter};
pub use push::{LogPushNotifier, PushNotifier, WebhookPushNotifier, build_push_notifier};
pub use service::NotificationService;
