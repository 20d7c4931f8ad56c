//! The hub task and the commands it serves.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bazaar_core::config::RealtimeConfig;
use bazaar_core::types::{ConnectionId, UserId};

use crate::message::OutboundMessage;

use super::handle::{HubHandle, Registration};

/// Counters reported by the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Users with a live connection.
    pub online_users: usize,
    /// Connections registered since start.
    pub registered_total: u64,
    /// Connections closed because a newer one replaced them.
    pub replaced_total: u64,
    /// Connections closed because their buffer was full or gone.
    pub evicted_total: u64,
    /// Frames queued for delivery.
    pub delivered_total: u64,
    /// Sends addressed to users without a connection.
    pub offline_total: u64,
}

/// Requests served by the hub task.
#[derive(Debug)]
pub(crate) enum HubCommand {
    Register {
        user_id: UserId,
        reply: oneshot::Sender<Registration>,
    },
    Unregister {
        user_id: UserId,
        conn_id: ConnectionId,
    },
    Send {
        user_id: UserId,
        message: OutboundMessage,
        reply: Option<oneshot::Sender<bool>>,
    },
    IsOnline {
        user_id: UserId,
        reply: oneshot::Sender<bool>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
    CloseUser {
        user_id: UserId,
        farewell: Option<OutboundMessage>,
        reply: Option<oneshot::Sender<bool>>,
    },
    Shutdown,
}

/// The live connection of one user.
#[derive(Debug)]
struct Entry {
    conn_id: ConnectionId,
    sender: mpsc::Sender<OutboundMessage>,
    closer: CancellationToken,
}

impl Entry {
    /// Signal the socket tasks to stop; dropping `self` drops the sender.
    fn close(self) {
        self.closer.cancel();
    }
}

/// Hub state owned by the hub task.
#[derive(Debug)]
pub struct ConnectionHub {
    entries: HashMap<UserId, Entry>,
    buffer: usize,
    stats: HubStats,
    shutdown: CancellationToken,
}

impl ConnectionHub {
    /// Spawns the hub task.
    ///
    /// The task stops on [`HubHandle::shutdown`], when `shutdown` fires, or
    /// when every handle is dropped. Stopping closes every connection.
    pub fn spawn(config: &RealtimeConfig, shutdown: CancellationToken) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            entries: HashMap::new(),
            buffer: config.outbound_buffer.max(1),
            stats: HubStats::default(),
            shutdown,
        };
        let task = tokio::spawn(hub.run(rx));
        (HubHandle::new(tx), task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
        info!(buffer = self.buffer, "Connection hub started");
        loop {
            let command = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                command = rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            if matches!(command, HubCommand::Shutdown) {
                break;
            }
            self.handle(command);
        }

        let open = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.close();
        }
        info!(closed = open, "Connection hub stopped");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { user_id, reply } => {
                // A caller that gave up must not evict the live connection.
                if reply.is_closed() {
                    debug!(user_id = %user_id, "Register abandoned before it ran");
                    return;
                }
                let registration = self.register(user_id);
                if let Err(registration) = reply.send(registration) {
                    debug!(
                        user_id = %user_id,
                        conn_id = %registration.conn_id,
                        "Register abandoned, dropping its entry"
                    );
                    self.unregister(user_id, registration.conn_id);
                }
            }
            HubCommand::Unregister { user_id, conn_id } => self.unregister(user_id, conn_id),
            HubCommand::Send {
                user_id,
                message,
                reply,
            } => {
                let delivered = self.send(user_id, message);
                if let Some(reply) = reply {
                    let _ = reply.send(delivered);
                }
            }
            HubCommand::IsOnline { user_id, reply } => {
                let _ = reply.send(self.entries.contains_key(&user_id));
            }
            HubCommand::Stats { reply } => {
                let _ = reply.send(HubStats {
                    online_users: self.entries.len(),
                    ..self.stats
                });
            }
            HubCommand::CloseUser {
                user_id,
                farewell,
                reply,
            } => {
                let closed = self.close_user(user_id, farewell);
                if let Some(reply) = reply {
                    let _ = reply.send(closed);
                }
            }
            HubCommand::Shutdown => {}
        }
    }

    /// Last connection wins: an existing entry is closed before the new one
    /// is inserted.
    fn register(&mut self, user_id: UserId) -> Registration {
        let (sender, outbound) = mpsc::channel(self.buffer);
        let closer = self.shutdown.child_token();
        let conn_id = ConnectionId::new();

        if let Some(previous) = self.entries.remove(&user_id) {
            info!(
                user_id = %user_id,
                conn_id = %previous.conn_id,
                replaced_by = %conn_id,
                "Closing previous connection"
            );
            previous.close();
            self.stats.replaced_total += 1;
        }

        self.entries.insert(
            user_id,
            Entry {
                conn_id,
                sender,
                closer: closer.clone(),
            },
        );
        self.stats.registered_total += 1;
        info!(user_id = %user_id, conn_id = %conn_id, "Connection registered");

        Registration {
            conn_id,
            outbound,
            closed: closer,
        }
    }

    /// Removes the entry only if `conn_id` is still the current connection.
    fn unregister(&mut self, user_id: UserId, conn_id: ConnectionId) {
        match self.entries.get(&user_id) {
            Some(entry) if entry.conn_id == conn_id => {
                if let Some(entry) = self.entries.remove(&user_id) {
                    entry.close();
                }
                info!(user_id = %user_id, conn_id = %conn_id, "Connection unregistered");
            }
            _ => {
                debug!(user_id = %user_id, conn_id = %conn_id, "Ignoring stale unregister");
            }
        }
    }

    /// Non-blocking delivery. A full or closed buffer evicts the connection.
    fn send(&mut self, user_id: UserId, message: OutboundMessage) -> bool {
        let Some(entry) = self.entries.get(&user_id) else {
            self.stats.offline_total += 1;
            debug!(user_id = %user_id, kind = message.kind(), "User offline, frame dropped");
            return false;
        };

        match entry.sender.try_send(message) {
            Ok(()) => {
                self.stats.delivered_total += 1;
                true
            }
            Err(e) => {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "buffer full",
                    mpsc::error::TrySendError::Closed(_) => "receiver closed",
                };
                if let Some(entry) = self.entries.remove(&user_id) {
                    warn!(
                        user_id = %user_id,
                        conn_id = %entry.conn_id,
                        reason,
                        "Evicting connection"
                    );
                    entry.close();
                }
                self.stats.evicted_total += 1;
                false
            }
        }
    }

    fn close_user(&mut self, user_id: UserId, farewell: Option<OutboundMessage>) -> bool {
        let Some(entry) = self.entries.remove(&user_id) else {
            return false;
        };
        if let Some(message) = farewell {
            let _ = entry.sender.try_send(message);
        }
        info!(user_id = %user_id, conn_id = %entry.conn_id, "Connection closed by server");
        entry.close();
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn spawn(buffer: usize) -> (HubHandle, CancellationToken) {
        let shutdown = CancellationToken::new();
        let config = RealtimeConfig {
            outbound_buffer: buffer,
            ..RealtimeConfig::default()
        };
        let (hub, _task) = ConnectionHub::spawn(&config, shutdown.clone());
        (hub, shutdown)
    }

    fn note(count: u64) -> OutboundMessage {
        OutboundMessage::UnreadCount { count }
    }

    #[tokio::test]
    async fn test_second_register_closes_first() {
        let (hub, _shutdown) = spawn(8);
        let user = UserId::new();
        let mut first = hub.register(user).await.unwrap();
        let mut second = hub.register(user).await.unwrap();

        assert!(first.closed.is_cancelled());
        assert!(first.outbound.recv().await.is_none());
        assert!(!second.closed.is_cancelled());

        assert!(hub.send_confirmed(user, note(1)).await);
        assert_eq!(second.outbound.recv().await, Some(note(1)));

        let stats = hub.stats().await;
        assert_eq!(stats.online_users, 1);
        assert_eq!(stats.replaced_total, 1);
    }

    #[tokio::test]
    async fn test_abandoned_register_keeps_live_connection() {
        let (hub, _shutdown) = spawn(8);
        let user = UserId::new();
        let mut live = hub.register(user).await.unwrap();

        let completed = tokio::select! {
            biased;
            _ = hub.register(user) => true,
            _ = std::future::ready(()) => false,
        };
        assert!(!completed);

        let stats = hub.stats().await;
        assert!(!live.closed.is_cancelled());
        assert_eq!(stats.online_users, 1);
        assert_eq!(stats.replaced_total, 0);
        assert_eq!(stats.registered_total, 1);

        assert!(hub.send_confirmed(user, note(1)).await);
        assert_eq!(live.outbound.recv().await, Some(note(1)));
    }

    #[tokio::test]
    async fn test_send_to_offline_is_noop() {
        let (hub, _shutdown) = spawn(8);
        let user = UserId::new();
        hub.send(user, note(1));
        assert!(!hub.send_confirmed(user, note(2)).await);
        assert!(!hub.is_online(user).await);
        assert_eq!(hub.stats().await.offline_total, 2);
    }

    #[tokio::test]
    async fn test_stale_unregister_is_ignored() {
        let (hub, _shutdown) = spawn(8);
        let user = UserId::new();
        let first = hub.register(user).await.unwrap();
        let second = hub.register(user).await.unwrap();

        hub.unregister(user, first.conn_id);
        assert!(hub.is_online(user).await);

        hub.unregister(user, second.conn_id);
        assert!(!hub.is_online(user).await);
        assert!(second.closed.is_cancelled());
    }

    #[tokio::test]
    async fn test_full_buffer_evicts() {
        let (hub, _shutdown) = spawn(1);
        let user = UserId::new();
        let registration = hub.register(user).await.unwrap();

        assert!(hub.send_confirmed(user, note(1)).await);
        assert!(!hub.send_confirmed(user, note(2)).await);
        assert!(registration.closed.is_cancelled());
        assert!(!hub.is_online(user).await);
        assert_eq!(hub.stats().await.evicted_total, 1);
    }

    #[tokio::test]
    async fn test_close_user_sends_farewell() {
        let (hub, _shutdown) = spawn(4);
        let user = UserId::new();
        let mut registration = hub.register(user).await.unwrap();
        let farewell = OutboundMessage::SessionRevoked {
            session_id: None,
            reason: "logout".into(),
        };

        assert!(hub.close_user(user, Some(farewell.clone())).await);
        assert!(registration.closed.is_cancelled());
        assert_eq!(registration.outbound.recv().await, Some(farewell));
        assert!(registration.outbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let (hub, shutdown) = spawn(4);
        let a = hub.register(UserId::new()).await.unwrap();
        let b = hub.register(UserId::new()).await.unwrap();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), a.closed.cancelled())
            .await
            .unwrap();
        assert!(b.closed.is_cancelled());
        assert!(hub.register(UserId::new()).await.is_err());
    }
}
