//! Cloneable handle used to talk to the hub task.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use bazaar_core::error::AppError;
use bazaar_core::types::{ConnectionId, UserId};

use crate::message::OutboundMessage;

use super::actor::{HubCommand, HubStats};

/// What a socket receives when it registers.
#[derive(Debug)]
pub struct Registration {
    /// Identity of this connection, passed back on unregister.
    pub conn_id: ConnectionId,
    /// Frames queued for this socket. Ends when the hub drops the entry.
    pub outbound: mpsc::Receiver<OutboundMessage>,
    /// Fires when the hub closes this connection.
    pub closed: CancellationToken,
}

/// Handle to the hub task.
///
/// Commands travel over an unbounded channel, so fire-and-forget calls
/// never wait on the hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<HubCommand>) -> Self {
        Self { tx }
    }

    fn submit(&self, command: HubCommand) -> bool {
        if self.tx.send(command).is_err() {
            warn!("Connection hub is not running");
            return false;
        }
        true
    }

    /// Registers a new connection for `user_id`, closing any previous one.
    ///
    /// Dropping the future before it resolves leaves no entry behind.
    pub async fn register(&self, user_id: UserId) -> Result<Registration, AppError> {
        let (reply, rx) = oneshot::channel();
        if !self.submit(HubCommand::Register { user_id, reply }) {
            return Err(AppError::internal("Connection hub is not running"));
        }
        rx.await
            .map_err(|_| AppError::internal("Connection hub is not running"))
    }

    /// Removes the connection if it is still the user's current one.
    pub fn unregister(&self, user_id: UserId, conn_id: ConnectionId) {
        self.submit(HubCommand::Unregister { user_id, conn_id });
    }

    /// Queues a frame for the user. Offline users are silently skipped.
    pub fn send(&self, user_id: UserId, message: OutboundMessage) {
        self.submit(HubCommand::Send {
            user_id,
            message,
            reply: None,
        });
    }

    /// Queues a frame and reports whether it reached a live buffer.
    pub async fn send_confirmed(&self, user_id: UserId, message: OutboundMessage) -> bool {
        let (reply, rx) = oneshot::channel();
        if !self.submit(HubCommand::Send {
            user_id,
            message,
            reply: Some(reply),
        }) {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Whether the user has a live connection.
    pub async fn is_online(&self, user_id: UserId) -> bool {
        let (reply, rx) = oneshot::channel();
        if !self.submit(HubCommand::IsOnline { user_id, reply }) {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Current hub counters.
    pub async fn stats(&self) -> HubStats {
        let (reply, rx) = oneshot::channel();
        if !self.submit(HubCommand::Stats { reply }) {
            return HubStats::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Closes the user's connection, optionally queueing a last frame first.
    ///
    /// Returns whether a connection was open.
    pub async fn close_user(&self, user_id: UserId, farewell: Option<OutboundMessage>) -> bool {
        let (reply, rx) = oneshot::channel();
        if !self.submit(HubCommand::CloseUser {
            user_id,
            farewell,
            reply: Some(reply),
        }) {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Stops the hub task and closes every connection.
    pub fn shutdown(&self) {
        self.submit(HubCommand::Shutdown);
    }
}
