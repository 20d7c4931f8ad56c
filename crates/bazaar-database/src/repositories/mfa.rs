//! PostgreSQL MFA factor and backup-code store.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use bazaar_core::cancel::run_cancellable;
use bazaar_core::error::{AppError, ErrorKind};
use bazaar_core::result::AppResult;
use bazaar_core::types::{BackupCodeId, MfaFactorId, UserId};
use bazaar_entity::mfa::{CreateMfaFactor, FactorStatus, FactorType, MfaFactor};

use crate::store::{MfaStore, RedeemOutcome};

/// Repository for `mfa_factors` and `backup_codes`.
#[derive(Debug, Clone)]
pub struct MfaRepository {
    pool: PgPool,
}

impl MfaRepository {
    /// Create a new MFA repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(message: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, message, e)
}

/// Discard the user's unused codes and insert a fresh batch inside `tx`.
async fn store_codes(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    code_hashes: &[String],
) -> AppResult<()> {
    sqlx::query("DELETE FROM backup_codes WHERE user_id = $1 AND used = FALSE")
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(db_err("Failed to discard backup codes"))?;

    let ids: Vec<Uuid> = code_hashes
        .iter()
        .map(|_| BackupCodeId::new().into_uuid())
        .collect();
    sqlx::query(
        "INSERT INTO backup_codes (id, user_id, code_hash) \
         SELECT id, $2, code_hash FROM UNNEST($1::uuid[], $3::text[]) AS t(id, code_hash)",
    )
    .bind(&ids)
    .bind(user_id)
    .bind(code_hashes)
    .execute(&mut **tx)
    .await
    .map_err(db_err("Failed to store backup codes"))?;
    Ok(())
}

#[async_trait]
impl MfaStore for MfaRepository {
    async fn create_factor(
        &self,
        cancel: &CancellationToken,
        data: CreateMfaFactor,
    ) -> AppResult<MfaFactor> {
        run_cancellable(cancel, async {
            sqlx::query_as::<_, MfaFactor>(
                "INSERT INTO mfa_factors (id, user_id, factor_type, secret, status) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING *",
            )
            .bind(MfaFactorId::new())
            .bind(data.user_id)
            .bind(data.factor_type)
            .bind(&data.secret)
            .bind(FactorStatus::Pending)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("Failed to create MFA factor"))
        })
        .await
    }

    async fn find_factor(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        id: MfaFactorId,
    ) -> AppResult<Option<MfaFactor>> {
        run_cancellable(cancel, async {
            sqlx::query_as::<_, MfaFactor>(
                "SELECT * FROM mfa_factors WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
            )
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to find MFA factor"))
        })
        .await
    }

    async fn list_factors(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<Vec<MfaFactor>> {
        run_cancellable(cancel, async {
            sqlx::query_as::<_, MfaFactor>(
                "SELECT * FROM mfa_factors WHERE user_id = $1 AND deleted_at IS NULL \
                 ORDER BY created_at ASC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("Failed to list MFA factors"))
        })
        .await
    }

    async fn find_verified_totp(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<Option<MfaFactor>> {
        run_cancellable(cancel, async {
            sqlx::query_as::<_, MfaFactor>(
                "SELECT * FROM mfa_factors WHERE user_id = $1 AND factor_type = $2 \
                 AND status = $3 AND deleted_at IS NULL LIMIT 1",
            )
            .bind(user_id)
            .bind(FactorType::Totp)
            .bind(FactorStatus::Verified)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to find verified TOTP factor"))
        })
        .await
    }

    async fn activate_factor(
        &self,
        cancel: &CancellationToken,
        id: MfaFactorId,
        step: i64,
        code_hashes: Vec<String>,
    ) -> AppResult<bool> {
        run_cancellable(cancel, async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(db_err("Failed to begin transaction"))?;

            let user_id: Option<UserId> = sqlx::query_scalar(
                "UPDATE mfa_factors SET status = $2, last_used_step = $3, verified_at = NOW(), \
                 updated_at = NOW() WHERE id = $1 AND status = $4 AND deleted_at IS NULL \
                 RETURNING user_id",
            )
            .bind(id)
            .bind(FactorStatus::Verified)
            .bind(step)
            .bind(FactorStatus::Pending)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                let duplicate = e
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation());
                if duplicate {
                    AppError::conflict("A verified TOTP factor already exists")
                } else {
                    AppError::with_source(ErrorKind::Database, "Failed to verify MFA factor", e)
                }
            })?;
            let Some(user_id) = user_id else {
                return Ok(false);
            };

            store_codes(&mut tx, user_id, &code_hashes).await?;
            tx.commit()
                .await
                .map_err(db_err("Failed to commit factor activation"))?;
            Ok(true)
        })
        .await
    }

    async fn consume_totp_step(
        &self,
        cancel: &CancellationToken,
        id: MfaFactorId,
        step: i64,
    ) -> AppResult<bool> {
        run_cancellable(cancel, async {
            let result = sqlx::query(
                "UPDATE mfa_factors SET last_used_step = $2, updated_at = NOW() \
                 WHERE id = $1 AND deleted_at IS NULL \
                 AND (last_used_step IS NULL OR last_used_step < $2)",
            )
            .bind(id)
            .bind(step)
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to record TOTP step"))?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn remove_factor(&self, cancel: &CancellationToken, id: MfaFactorId) -> AppResult<bool> {
        run_cancellable(cancel, async {
            let result = sqlx::query(
                "UPDATE mfa_factors SET deleted_at = NOW(), updated_at = NOW() \
                 WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to remove MFA factor"))?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn remove_pending_factors(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<u64> {
        run_cancellable(cancel, async {
            let result = sqlx::query(
                "UPDATE mfa_factors SET deleted_at = NOW(), updated_at = NOW() \
                 WHERE user_id = $1 AND status = $2 AND deleted_at IS NULL",
            )
            .bind(user_id)
            .bind(FactorStatus::Pending)
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to discard pending MFA factors"))?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn replace_backup_codes(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        code_hashes: Vec<String>,
    ) -> AppResult<()> {
        run_cancellable(cancel, async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(db_err("Failed to begin transaction"))?;

            store_codes(&mut tx, user_id, &code_hashes).await?;

            tx.commit()
                .await
                .map_err(db_err("Failed to commit backup codes"))
        })
        .await
    }

    async fn clear_backup_codes(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<u64> {
        run_cancellable(cancel, async {
            let result = sqlx::query("DELETE FROM backup_codes WHERE user_id = $1 AND used = FALSE")
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(db_err("Failed to discard backup codes"))?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn redeem_backup_code(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
        code_hash: &str,
    ) -> AppResult<RedeemOutcome> {
        run_cancellable(cancel, async {
            let spent: Option<BackupCodeId> = sqlx::query_scalar(
                "UPDATE backup_codes SET used = TRUE, used_at = NOW() \
                 WHERE user_id = $1 AND code_hash = $2 AND used = FALSE RETURNING id",
            )
            .bind(user_id)
            .bind(code_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to redeem backup code"))?;

            if spent.is_some() {
                return Ok(RedeemOutcome::Redeemed);
            }

            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM backup_codes WHERE user_id = $1 AND code_hash = $2)",
            )
            .bind(user_id)
            .bind(code_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("Failed to look up backup code"))?;

            Ok(if exists {
                RedeemOutcome::AlreadyUsed
            } else {
                RedeemOutcome::Unknown
            })
        })
        .await
    }

    async fn count_unused_backup_codes(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<u64> {
        run_cancellable(cancel, async {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM backup_codes WHERE user_id = $1 AND used = FALSE",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("Failed to count backup codes"))?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}
