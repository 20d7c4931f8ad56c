use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use bazaar_core::cancel::run_cancellable;
use bazaar_core::error::AppError;
use bazaar_core::result::AppResult;
use bazaar_core::types::UserId;
use bazaar_entity::user::model::normalize_email;
use bazaar_entity::user::{CreateUser, User};

use crate::store::UserStore;

/// User store held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<Mutex<HashMap<UserId, User>>>,
}

impl MemoryUserStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, cancel: &CancellationToken, data: CreateUser) -> AppResult<User> {
        run_cancellable(cancel, async {
            let email = normalize_email(&data.email);
            let mut users = self.users.lock().await;
            if users.values().any(|u| u.email == email) {
                return Err(AppError::conflict("An account with this email already exists"));
            }
            let now = Utc::now();
            let user = User {
                id: UserId::new(),
                email,
                display_name: data.display_name,
                password_hash: data.password_hash,
                role: data.role,
                created_at: now,
                updated_at: now,
            };
            users.insert(user.id, user.clone());
            Ok(user)
        })
        .await
    }

    async fn find_by_email(
        &self,
        cancel: &CancellationToken,
        email: &str,
    ) -> AppResult<Option<User>> {
        run_cancellable(cancel, async {
            let email = normalize_email(email);
            Ok(self
                .users
                .lock()
                .await
                .values()
                .find(|u| u.email == email)
                .cloned())
        })
        .await
    }

    async fn find_by_id(&self, cancel: &CancellationToken, id: UserId) -> AppResult<Option<User>> {
        run_cancellable(cancel, async { Ok(self.users.lock().await.get(&id).cloned()) }).await
    }
}
