//! PostgreSQL user store.

use async_trait::async_trait;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use bazaar_core::cancel::run_cancellable;
use bazaar_core::error::{AppError, ErrorKind};
use bazaar_core::result::AppResult;
use bazaar_core::types::UserId;
use bazaar_entity::user::model::normalize_email;
use bazaar_entity::user::{CreateUser, User};

use crate::store::UserStore;

/// User repository backed by the `users` table.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn create(&self, cancel: &CancellationToken, data: CreateUser) -> AppResult<User> {
        run_cancellable(cancel, async {
            sqlx::query_as::<_, User>(
                "INSERT INTO users (id, email, display_name, password_hash, role) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING *",
            )
            .bind(UserId::new())
            .bind(normalize_email(&data.email))
            .bind(&data.display_name)
            .bind(&data.password_hash)
            .bind(data.role)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                let duplicate = e
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation());
                if duplicate {
                    AppError::conflict("An account with this email already exists")
                } else {
                    AppError::with_source(ErrorKind::Database, "Failed to create user", e)
                }
            })
        })
        .await
    }

    async fn find_by_email(
        &self,
        cancel: &CancellationToken,
        email: &str,
    ) -> AppResult<Option<User>> {
        run_cancellable(cancel, async {
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
                .bind(normalize_email(email))
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to find user by email", e)
                })
        })
        .await
    }

    async fn find_by_id(&self, cancel: &CancellationToken, id: UserId) -> AppResult<Option<User>> {
        run_cancellable(cancel, async {
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to find user by id", e)
                })
        })
        .await
    }
}
