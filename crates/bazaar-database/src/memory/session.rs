use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use bazaar_core::cancel::run_cancellable;
use bazaar_core::error::AppError;
use bazaar_core::result::AppResult;
use bazaar_core::types::{SessionId, UserId};
use bazaar_entity::session::{AssuranceLevel, CreateSession, RevokeReason, Session};

use crate::store::SessionStore;

/// Session store held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn revoke_in_place(session: &mut Session, reason: RevokeReason) -> bool {
    if session.revoked {
        return false;
    }
    let now = Utc::now();
    session.revoked = true;
    session.revoked_at = Some(now);
    session.revoked_reason = Some(reason.as_str().to_string());
    session.updated_at = now;
    true
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, cancel: &CancellationToken, data: CreateSession) -> AppResult<Session> {
        run_cancellable(cancel, async {
            let mut sessions = self.sessions.lock().await;
            let clash = sessions
                .values()
                .any(|s| !s.revoked && s.refresh_token_hash == data.refresh_token_hash);
            if clash || sessions.contains_key(&data.id) {
                return Err(AppError::conflict("Session already exists"));
            }

            let now = Utc::now();
            let session = Session {
                id: data.id,
                user_id: data.user_id,
                refresh_token_hash: data.refresh_token_hash,
                access_token_hash: data.access_token_hash,
                assurance_level: AssuranceLevel::Aal1,
                device_name: data.device.device_name,
                ip_address: data.device.ip_address,
                user_agent: data.device.user_agent,
                expires_at: data.expires_at,
                revoked: false,
                revoked_at: None,
                revoked_reason: None,
                last_refreshed_at: None,
                created_at: now,
                updated_at: now,
            };
            sessions.insert(session.id, session.clone());
            Ok(session)
        })
        .await
    }

    async fn find_by_id(
        &self,
        cancel: &CancellationToken,
        id: SessionId,
    ) -> AppResult<Option<Session>> {
        run_cancellable(cancel, async { Ok(self.sessions.lock().await.get(&id).cloned()) }).await
    }

    async fn find_by_refresh_hash(
        &self,
        cancel: &CancellationToken,
        refresh_hash: &str,
    ) -> AppResult<Option<Session>> {
        run_cancellable(cancel, async {
            Ok(self
                .sessions
                .lock()
                .await
                .values()
                .find(|s| !s.revoked && s.refresh_token_hash == refresh_hash)
                .cloned())
        })
        .await
    }

    async fn find_by_refresh_hash_any(
        &self,
        cancel: &CancellationToken,
        refresh_hash: &str,
    ) -> AppResult<Option<Session>> {
        run_cancellable(cancel, async {
            let sessions = self.sessions.lock().await;
            let mut matches: Vec<&Session> = sessions
                .values()
                .filter(|s| s.refresh_token_hash == refresh_hash)
                .collect();
            matches.sort_by_key(|s| (s.revoked, std::cmp::Reverse(s.created_at)));
            Ok(matches.first().map(|s| (*s).clone()))
        })
        .await
    }

    async fn rotate_access_hash(
        &self,
        cancel: &CancellationToken,
        id: SessionId,
        access_hash: &str,
        refreshed: bool,
    ) -> AppResult<bool> {
        run_cancellable(cancel, async {
            let mut sessions = self.sessions.lock().await;
            match sessions.get_mut(&id) {
                Some(session) if !session.revoked => {
                    let now = Utc::now();
                    session.access_token_hash = access_hash.to_string();
                    session.updated_at = now;
                    if refreshed {
                        session.last_refreshed_at = Some(now);
                    }
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
        .await
    }

    async fn elevate(
        &self,
        cancel: &CancellationToken,
        id: SessionId,
        level: AssuranceLevel,
        access_hash: &str,
    ) -> AppResult<bool> {
        run_cancellable(cancel, async {
            let mut sessions = self.sessions.lock().await;
            match sessions.get_mut(&id) {
                Some(session) if !session.revoked => {
                    session.assurance_level = session.assurance_level.max(level);
                    session.access_token_hash = access_hash.to_string();
                    session.updated_at = Utc::now();
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
        .await
    }

    async fn revoke(
        &self,
        cancel: &CancellationToken,
        id: SessionId,
        reason: RevokeReason,
    ) -> AppResult<bool> {
        run_cancellable(cancel, async {
            let mut sessions = self.sessions.lock().await;
            Ok(sessions
                .get_mut(&id)
                .is_some_and(|s| revoke_in_place(s, reason)))
        })
        .await
    }

    async fn revoke_all_for_user(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        reason: RevokeReason,
    ) -> AppResult<u64> {
        run_cancellable(cancel, async {
            let mut sessions = self.sessions.lock().await;
            let changed = sessions
                .values_mut()
                .filter(|s| s.user_id == user_id)
                .map(|s| revoke_in_place(s, reason))
                .filter(|changed| *changed)
                .count();
            Ok(changed as u64)
        })
        .await
    }

    async fn revoke_all_except(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        keep: SessionId,
        reason: RevokeReason,
    ) -> AppResult<u64> {
        run_cancellable(cancel, async {
            let mut sessions = self.sessions.lock().await;
            let changed = sessions
                .values_mut()
                .filter(|s| s.user_id == user_id && s.id != keep)
                .map(|s| revoke_in_place(s, reason))
                .filter(|changed| *changed)
                .count();
            Ok(changed as u64)
        })
        .await
    }

    async fn list_active(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<Vec<Session>> {
        run_cancellable(cancel, async {
            let now = Utc::now();
            let mut active: Vec<Session> = self
                .sessions
                .lock()
                .await
                .values()
                .filter(|s| s.user_id == user_id && s.is_usable_at(now))
                .cloned()
                .collect();
            active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(active)
        })
        .await
    }
}
