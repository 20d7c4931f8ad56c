//! Delivery dispatcher: persists notifications, pushes them over the hub
//! and forwards them to the push provider.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use bazaar_core::cancel::ensure_active;
use bazaar_core::config::PushConfig;
use bazaar_core::error::AppError;
use bazaar_core::types::UserId;
use bazaar_database::store::NotificationStore;
use bazaar_entity::notification::Notification;

use crate::hub::HubHandle;
use crate::message::{NotificationFrame, OutboundMessage};

use super::formatter::{DomainEvent, NotificationFormatter};
use super::push::PushNotifier;

/// Turns domain events into notifications and delivers them.
///
/// Every dispatch persists a new row; deduplicating repeated events is the
/// caller's job.
#[derive(Clone)]
pub struct DeliveryDispatcher {
    /// Notification persistence.
    store: Arc<dyn NotificationStore>,
    /// Live connection hub.
    hub: HubHandle,
    /// Push provider for offline delivery.
    push: Arc<dyn PushNotifier>,
    /// Forward to push even when delivered live.
    forward_when_online: bool,
    /// In-flight push forwards.
    forwards: TaskTracker,
}

impl std::fmt::Debug for DeliveryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryDispatcher")
            .field("push", &self.push.name())
            .field("forward_when_online", &self.forward_when_online)
            .finish()
    }
}

impl DeliveryDispatcher {
    /// Create a new dispatcher.
    pub fn new(
        store: Arc<dyn NotificationStore>,
        hub: HubHandle,
        push: Arc<dyn PushNotifier>,
        config: &PushConfig,
    ) -> Self {
        Self {
            store,
            hub,
            push,
            forward_when_online: config.forward_when_online,
            forwards: TaskTracker::new(),
        }
    }

    /// Dispatch one event to one recipient.
    ///
    /// 1. Format the event
    /// 2. Persist the notification (a failure aborts the dispatch)
    /// 3. Push it over the hub if the recipient is connected
    /// 4. Forward it to the push provider in the background when the
    ///    recipient was offline, or always if so configured
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        recipient: UserId,
        event: &DomainEvent,
    ) -> Result<Notification, AppError> {
        // Step 1: Format
        let row = NotificationFormatter::format(recipient, event);

        // Step 2: Persist
        ensure_active(cancel)?;
        let notification = self.store.create(cancel, row).await?;

        // Step 3: Live delivery
        let frame = OutboundMessage::Notification(NotificationFrame::from(&notification));
        let delivered = self.hub.send_confirmed(recipient, frame).await;
        debug!(
            user_id = %recipient,
            notification_id = %notification.id,
            kind = %notification.kind,
            delivered,
            "Notification dispatched"
        );

        // Step 4: Push forwarding
        if !delivered || self.forward_when_online {
            self.forward(notification.clone());
        }

        Ok(notification)
    }

    /// Dispatch the same event to several recipients, in order.
    pub async fn dispatch_many(
        &self,
        cancel: &CancellationToken,
        recipients: &[UserId],
        event: &DomainEvent,
    ) -> Result<Vec<Notification>, AppError> {
        let mut sent = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            sent.push(self.dispatch(cancel, *recipient, event).await?);
        }
        Ok(sent)
    }

    /// Wait for in-flight push forwards to finish.
    pub async fn drain(&self) {
        self.forwards.close();
        self.forwards.wait().await;
        self.forwards.reopen();
    }

    fn forward(&self, notification: Notification) {
        let push = Arc::clone(&self.push);
        self.forwards.spawn(async move {
            if let Err(e) = push.notify(&notification).await {
                warn!(
                    provider = push.name(),
                    user_id = %notification.user_id,
                    notification_id = %notification.id,
                    error = %e,
                    "Push forwarding failed"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use bazaar_core::config::RealtimeConfig;
    use bazaar_core::error::ErrorKind;
    use bazaar_core::types::{NotificationId, PageRequest};
    use bazaar_database::memory::MemoryNotificationStore;

    use crate::hub::ConnectionHub;

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingPush {
        sent: Mutex<Vec<NotificationId>>,
        fail: bool,
    }

    #[async_trait]
    impl PushNotifier for RecordingPush {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn notify(&self, notification: &Notification) -> Result<(), AppError> {
            self.sent.lock().await.push(notification.id);
            if self.fail {
                return Err(AppError::external_service("provider down"));
            }
            Ok(())
        }
    }

    struct Fixture {
        dispatcher: DeliveryDispatcher,
        hub: HubHandle,
        store: MemoryNotificationStore,
        push: Arc<RecordingPush>,
        cancel: CancellationToken,
    }

    fn fixture(forward_when_online: bool, fail: bool) -> Fixture {
        let (hub, _task) = ConnectionHub::spawn(&RealtimeConfig::default(), CancellationToken::new());
        let store = MemoryNotificationStore::new();
        let push = Arc::new(RecordingPush {
            fail,
            ..RecordingPush::default()
        });
        let config = PushConfig {
            forward_when_online,
            ..PushConfig::default()
        };
        Fixture {
            dispatcher: DeliveryDispatcher::new(
                Arc::new(store.clone()),
                hub.clone(),
                push.clone(),
                &config,
            ),
            hub,
            store,
            push,
            cancel: CancellationToken::new(),
        }
    }

    fn liked() -> DomainEvent {
        DomainEvent::PostLiked {
            actor_id: UserId::new(),
            actor_name: "Bo".into(),
            post_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_online_recipient_gets_frame_without_push() {
        let f = fixture(false, false);
        let user = UserId::new();
        let mut socket = f.hub.register(user).await.unwrap();

        let notification = f.dispatcher.dispatch(&f.cancel, user, &liked()).await.unwrap();
        f.dispatcher.drain().await;

        match socket.outbound.recv().await {
            Some(OutboundMessage::Notification(frame)) => assert_eq!(frame.id, notification.id),
            other => panic!("unexpected frame: {other:?}"),
        }
        assert!(f.push.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_offline_recipient_is_persisted_and_pushed() {
        let f = fixture(false, false);
        let user = UserId::new();

        let notification = f.dispatcher.dispatch(&f.cancel, user, &liked()).await.unwrap();
        f.dispatcher.drain().await;

        assert_eq!(*f.push.sent.lock().await, vec![notification.id]);
        let page = f
            .store
            .list_for_user(&f.cancel, user, true, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_forward_when_online() {
        let f = fixture(true, false);
        let user = UserId::new();
        let _socket = f.hub.register(user).await.unwrap();

        f.dispatcher.dispatch(&f.cancel, user, &liked()).await.unwrap();
        f.dispatcher.drain().await;
        assert_eq!(f.push.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_push_failure_is_not_surfaced() {
        let f = fixture(false, true);
        let result = f.dispatcher.dispatch(&f.cancel, UserId::new(), &liked()).await;
        f.dispatcher.drain().await;
        assert!(result.is_ok());
        assert_eq!(f.push.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_no_deduplication() {
        let f = fixture(false, false);
        let user = UserId::new();
        let event = liked();
        let sent = f
            .dispatcher
            .dispatch_many(&f.cancel, &[user, user], &event)
            .await
            .unwrap();
        assert_eq!(sent.len(), 2);
        assert_ne!(sent[0].id, sent[1].id);
    }

    #[tokio::test]
    async fn test_cancelled_dispatch_persists_nothing() {
        let f = fixture(false, false);
        let user = UserId::new();
        let cancelled = CancellationToken::new();
        cancelled.cancel();

        let err = f
            .dispatcher
            .dispatch(&cancelled, user, &liked())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert_eq!(f.store.unread_count(&f.cancel, user).await.unwrap(), 0);
    }
}
