//! Push-notification providers for users who are not connected.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use bazaar_core::config::PushConfig;
use bazaar_core::error::AppError;
use bazaar_core::types::{NotificationId, UserId};
use bazaar_entity::notification::Notification;

/// External push provider invoked by the dispatcher.
#[async_trait]
pub trait PushNotifier: Send + Sync + std::fmt::Debug {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Deliver one persisted notification.
    async fn notify(&self, notification: &Notification) -> Result<(), AppError>;
}

/// Provider that only records the push in the log.
#[derive(Debug, Clone, Default)]
pub struct LogPushNotifier;

#[async_trait]
impl PushNotifier for LogPushNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), AppError> {
        info!(
            user_id = %notification.user_id,
            notification_id = %notification.id,
            kind = %notification.kind,
            "Push notification"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    notification_id: NotificationId,
    user_id: UserId,
    kind: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a serde_json::Value,
}

/// Provider that POSTs the notification as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct WebhookPushNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookPushNotifier {
    /// Creates a webhook provider with a per-call timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build push client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PushNotifier for WebhookPushNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), AppError> {
        let body = WebhookBody {
            notification_id: notification.id,
            user_id: notification.user_id,
            kind: &notification.kind,
            title: &notification.title,
            body: &notification.message,
            data: &notification.payload,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::external_service(format!("Push webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::external_service(format!(
                "Push webhook returned {status}"
            )));
        }
        Ok(())
    }
}

/// Builds the provider named by `push.provider`.
pub fn build_push_notifier(config: &PushConfig) -> Result<Arc<dyn PushNotifier>, AppError> {
    match config.provider.as_str() {
        "log" => Ok(Arc::new(LogPushNotifier)),
        "webhook" => {
            let url = config.webhook_url.as_deref().ok_or_else(|| {
                AppError::configuration("push.webhook_url is required for the webhook provider")
            })?;
            Ok(Arc::new(WebhookPushNotifier::new(
                url,
                Duration::from_secs(config.webhook_timeout_seconds),
            )?))
        }
        other => Err(AppError::configuration(format!(
            "Unknown push provider '{other}'"
        ))),
    }
}
