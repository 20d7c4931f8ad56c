use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use bazaar_core::cancel::run_cancellable;
use bazaar_core::error::AppError;
use bazaar_core::result::AppResult;
use bazaar_core::types::{BackupCodeId, MfaFactorId, UserId};
use bazaar_entity::mfa::{BackupCode, CreateMfaFactor, FactorStatus, FactorType, MfaFactor};

use crate::store::{MfaStore, RedeemOutcome};

#[derive(Debug, Default)]
struct MfaState {
    factors: Vec<MfaFactor>,
    codes: Vec<BackupCode>,
}

impl MfaState {
    fn replace_codes(&mut self, user_id: UserId, code_hashes: Vec<String>) {
        let now = Utc::now();
        self.codes.retain(|c| c.user_id != user_id || c.used);
        self.codes
            .extend(code_hashes.into_iter().map(|code_hash| BackupCode {
                id: BackupCodeId::new(),
                user_id,
                code_hash,
                used: false,
                used_at: None,
                created_at: now,
            }));
    }
}

/// MFA store held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryMfaStore {
    state: Arc<Mutex<MfaState>>,
}

impl MemoryMfaStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MfaStore for MemoryMfaStore {
    async fn create_factor(
        &self,
        cancel: &CancellationToken,
        data: CreateMfaFactor,
    ) -> AppResult<MfaFactor> {
        run_cancellable(cancel, async {
            let now = Utc::now();
            let factor = MfaFactor {
                id: MfaFactorId::new(),
                user_id: data.user_id,
                factor_type: data.factor_type,
                secret: data.secret,
                status: FactorStatus::Pending,
                last_used_step: None,
                created_at: now,
                updated_at: now,
                verified_at: None,
                deleted_at: None,
            };
            self.state.lock().await.factors.push(factor.clone());
            Ok(factor)
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
            Ok(self
                .state
                .lock()
                .await
                .factors
                .iter()
                .find(|f| f.id == id && f.user_id == user_id && !f.is_removed())
                .cloned())
        })
        .await
    }

    async fn list_factors(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<Vec<MfaFactor>> {
        run_cancellable(cancel, async {
            Ok(self
                .state
                .lock()
                .await
                .factors
                .iter()
                .filter(|f| f.user_id == user_id && !f.is_removed())
                .cloned()
                .collect())
        })
        .await
    }

    async fn find_verified_totp(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<Option<MfaFactor>> {
        run_cancellable(cancel, async {
            Ok(self
                .state
                .lock()
                .await
                .factors
                .iter()
                .find(|f| f.user_id == user_id && f.factor_type == FactorType::Totp && f.is_active())
                .cloned())
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
            let mut state = self.state.lock().await;
            let Some(user_id) = state
                .factors
                .iter()
                .find(|f| f.id == id && f.status == FactorStatus::Pending && !f.is_removed())
                .map(|f| f.user_id)
            else {
                return Ok(false);
            };
            let has_verified = state.factors.iter().any(|f| {
                f.user_id == user_id && f.factor_type == FactorType::Totp && f.is_active()
            });
            if has_verified {
                return Err(AppError::conflict("A verified TOTP factor already exists"));
            }

            let now = Utc::now();
            if let Some(factor) = state.factors.iter_mut().find(|f| f.id == id) {
                factor.status = FactorStatus::Verified;
                factor.last_used_step = Some(step);
                factor.verified_at = Some(now);
                factor.updated_at = now;
            }
            state.replace_codes(user_id, code_hashes);
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
            let mut state = self.state.lock().await;
            let Some(factor) = state
                .factors
                .iter_mut()
                .find(|f| f.id == id && !f.is_removed())
            else {
                return Ok(false);
            };
            if factor.last_used_step.is_some_and(|last| last >= step) {
                return Ok(false);
            }
            factor.last_used_step = Some(step);
            factor.updated_at = Utc::now();
            Ok(true)
        })
        .await
    }

    async fn remove_factor(&self, cancel: &CancellationToken, id: MfaFactorId) -> AppResult<bool> {
        run_cancellable(cancel, async {
            let mut state = self.state.lock().await;
            match state.factors.iter_mut().find(|f| f.id == id && !f.is_removed()) {
                Some(factor) => {
                    let now = Utc::now();
                    factor.deleted_at = Some(now);
                    factor.updated_at = now;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await
    }

    async fn remove_pending_factors(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<u64> {
        run_cancellable(cancel, async {
            let now = Utc::now();
            let mut state = self.state.lock().await;
            let mut removed = 0;
            for factor in state.factors.iter_mut().filter(|f| {
                f.user_id == user_id && f.status == FactorStatus::Pending && !f.is_removed()
            }) {
                factor.deleted_at = Some(now);
                factor.updated_at = now;
                removed += 1;
            }
            Ok(removed)
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
            self.state.lock().await.replace_codes(user_id, code_hashes);
            Ok(())
        })
        .await
    }

    async fn clear_backup_codes(
        &self,
        cancel: &CancellationToken,
        user_id: UserId,
    ) -> AppResult<u64> {
        run_cancellable(cancel, async {
            let mut state = self.state.lock().await;
            let before = state.codes.len();
            state.codes.retain(|c| c.user_id != user_id || c.used);
            Ok((before - state.codes.len()) as u64)
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
            let mut state = self.state.lock().await;
            let mut seen_used = false;
            for code in state
                .codes
                .iter_mut()
                .filter(|c| c.user_id == user_id && c.code_hash == code_hash)
            {
                if code.used {
                    seen_used = true;
                    continue;
                }
                code.used = true;
                code.used_at = Some(Utc::now());
                return Ok(RedeemOutcome::Redeemed);
            }
            Ok(if seen_used {
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
            Ok(self
                .state
                .lock()
                .await
                .codes
                .iter()
                .filter(|c| c.user_id == user_id && !c.used)
                .count() as u64)
        })
        .await
    }
}
