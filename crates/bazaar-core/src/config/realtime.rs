//! Real-time delivery configuration.

use serde::{Deserialize, Serialize};

/// Connection hub and WebSocket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Capacity of each connection's outbound frame buffer. A connection
    /// whose buffer fills is closed.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// WebSocket ping interval in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: default_outbound_buffer(),
            ping_interval_seconds: default_ping_interval(),
        }
    }
}

/// Push provider settings used by the delivery dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// `"log"` or `"webhook"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Endpoint receiving push payloads when `provider = "webhook"`.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Timeout for a single webhook call in seconds.
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_seconds: u64,
    /// Forward to push even when the user has a live connection.
    #[serde(default)]
    pub forward_when_online: bool,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            webhook_url: None,
            webhook_timeout_seconds: default_webhook_timeout(),
            forward_when_online: false,
        }
    }
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_ping_interval() -> u64 {
    30
}

fn default_provider() -> String {
    "log".to_string()
}

fn default_webhook_timeout() -> u64 {
    5
}
