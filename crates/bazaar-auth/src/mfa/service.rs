//! Enrollment, verification and backup-code management.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bazaar_core::cancel::ensure_active;
use bazaar_core::config::MfaConfig;
use bazaar_core::error::AppError;
use bazaar_core::types::MfaFactorId;
use bazaar_database::store::{MfaStore, RedeemOutcome};
use bazaar_entity::mfa::{CreateMfaFactor, FactorStatus, FactorType, MfaFactor};

use crate::context::AuthContext;
use crate::session::{AccessGrant, SessionManager};

use super::backup::{generate_backup_codes, hash_backup_code};
use super::totp::Totp;

/// Proof of possession presented for step-up.
#[derive(Debug, Clone)]
pub enum MfaProof {
    /// Six-digit code from the authenticator app.
    Totp(String),
    /// One unused backup code.
    BackupCode(String),
}

/// A started TOTP enrollment. The secret is shown once.
#[derive(Debug, Clone, Serialize)]
pub struct TotpEnrollment {
    /// Pending factor awaiting activation.
    pub factor_id: MfaFactorId,
    /// Base32 secret for manual entry.
    pub secret: String,
    /// `otpauth://` URL for QR rendering.
    pub otpauth_url: String,
}

/// Result of activating a TOTP factor.
#[derive(Debug, Clone, Serialize)]
pub struct TotpActivation {
    /// The now verified factor.
    pub factor: MfaFactor,
    /// Plaintext backup codes, returned only here.
    pub backup_codes: Vec<String>,
    /// Elevated access token for the current session.
    pub grant: AccessGrant,
}

/// A freshly generated backup-code batch.
#[derive(Debug, Clone, Serialize)]
pub struct BackupCodeBatch {
    /// Plaintext codes, returned only here.
    pub codes: Vec<String>,
}

/// Manages second factors and raises session assurance.
#[derive(Clone)]
pub struct MfaService {
    store: Arc<dyn MfaStore>,
    sessions: SessionManager,
    totp: Totp,
    backup_code_count: usize,
}

impl std::fmt::Debug for MfaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MfaService")
            .field("totp", &self.totp)
            .field("backup_code_count", &self.backup_code_count)
            .finish()
    }
}

fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

impl MfaService {
    /// Creates the service.
    pub fn new(store: Arc<dyn MfaStore>, sessions: SessionManager, config: &MfaConfig) -> Self {
        Self {
            store,
            sessions,
            totp: Totp::new(config),
            backup_code_count: config.backup_code_count,
        }
    }

    /// Starts TOTP enrollment with a new pending factor.
    ///
    /// Abandoned pending factors of the user are removed first.
    pub async fn enroll_totp(
        &self,
        cancel: &CancellationToken,
        ctx: &AuthContext,
    ) -> Result<TotpEnrollment, AppError> {
        if self.store.find_verified_totp(cancel, ctx.user_id).await?.is_some() {
            return Err(AppError::conflict("A verified TOTP factor already exists"));
        }

        let secret = Totp::generate_secret();
        let otpauth_url = self.totp.otpauth_url(&secret, &ctx.email)?;

        ensure_active(cancel)?;
        self.store.remove_pending_factors(cancel, ctx.user_id).await?;
        ensure_active(cancel)?;
        let factor = self
            .store
            .create_factor(
                cancel,
                CreateMfaFactor {
                    user_id: ctx.user_id,
                    factor_type: FactorType::Totp,
                    secret: secret.clone(),
                },
            )
            .await?;

        info!(user_id = %ctx.user_id, factor_id = %factor.id, "TOTP enrollment started");
        Ok(TotpEnrollment {
            factor_id: factor.id,
            secret,
            otpauth_url,
        })
    }

    /// Confirms possession of a pending factor, issues backup codes and
    /// elevates the current session.
    pub async fn activate_totp(
        &self,
        cancel: &CancellationToken,
        ctx: &AuthContext,
        factor_id: MfaFactorId,
        code: &str,
    ) -> Result<TotpActivation, AppError> {
        let factor = self
            .store
            .find_factor(cancel, ctx.user_id, factor_id)
            .await?
            .ok_or_else(|| AppError::not_found("MFA factor not found"))?;
        if factor.status != FactorStatus::Pending {
            return Err(AppError::conflict("MFA factor is already active"));
        }

        let step = self
            .totp
            .matching_step(&factor.secret, &ctx.email, code, unix_now())?
            .ok_or_else(|| AppError::unauthorized("Invalid verification code"))?;

        let backup_codes = generate_backup_codes(self.backup_code_count);
        let hashes = backup_codes.iter().map(|c| hash_backup_code(c)).collect();
        ensure_active(cancel)?;
        if !self
            .store
            .activate_factor(cancel, factor.id, step, hashes)
            .await?
        {
            return Err(AppError::conflict("MFA factor is no longer pending"));
        }

        // The factor is live and its codes are stored; finish regardless of
        // the request's cancellation.
        let detached = CancellationToken::new();
        let grant = self.sessions.elevate(&detached, ctx).await?;
        let factor = self
            .store
            .find_factor(&detached, ctx.user_id, factor.id)
            .await?
            .ok_or_else(|| AppError::not_found("MFA factor not found"))?;

        info!(user_id = %ctx.user_id, factor_id = %factor.id, "TOTP factor activated");
        Ok(TotpActivation {
            factor,
            backup_codes,
            grant,
        })
    }

    /// Step-up: checks the proof and elevates the current session.
    pub async fn verify(
        &self,
        cancel: &CancellationToken,
        ctx: &AuthContext,
        proof: MfaProof,
    ) -> Result<AccessGrant, AppError> {
        let factor = self
            .store
            .find_verified_totp(cancel, ctx.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("No verified MFA factor"))?;

        match proof {
            MfaProof::Totp(code) => {
                let step = self
                    .totp
                    .matching_step(&factor.secret, &ctx.email, &code, unix_now())?
                    .ok_or_else(|| AppError::unauthorized("Invalid verification code"))?;
                ensure_active(cancel)?;
                if !self.store.consume_totp_step(cancel, factor.id, step).await? {
                    warn!(user_id = %ctx.user_id, factor_id = %factor.id, "TOTP code replayed");
                    return Err(AppError::unauthorized("Verification code already used"));
                }
            }
            MfaProof::BackupCode(code) => {
                ensure_active(cancel)?;
                match self
                    .store
                    .redeem_backup_code(cancel, ctx.user_id, &hash_backup_code(&code))
                    .await?
                {
                    RedeemOutcome::Redeemed => {
                        info!(user_id = %ctx.user_id, "Backup code redeemed");
                    }
                    RedeemOutcome::AlreadyUsed => {
                        warn!(user_id = %ctx.user_id, "Backup code reused");
                        return Err(AppError::conflict("Backup code already used"));
                    }
                    RedeemOutcome::Unknown => {
                        return Err(AppError::unauthorized("Invalid backup code"));
                    }
                }
            }
        }

        // The proof is spent; elevate even if the request was cancelled since.
        self.sessions.elevate(&CancellationToken::new(), ctx).await
    }

    /// Lists the caller's pending and verified factors.
    pub async fn list_factors(
        &self,
        cancel: &CancellationToken,
        ctx: &AuthContext,
    ) -> Result<Vec<MfaFactor>, AppError> {
        self.store.list_factors(cancel, ctx.user_id).await
    }

    /// Removes a factor. Requires an elevated session.
    ///
    /// Unused backup codes are invalidated once no verified factor remains.
    pub async fn remove_factor(
        &self,
        cancel: &CancellationToken,
        ctx: &AuthContext,
        factor_id: MfaFactorId,
    ) -> Result<(), AppError> {
        ctx.require_elevated()?;
        let factor = self
            .store
            .find_factor(cancel, ctx.user_id, factor_id)
            .await?
            .ok_or_else(|| AppError::not_found("MFA factor not found"))?;

        ensure_active(cancel)?;
        if !self.store.remove_factor(cancel, factor.id).await? {
            return Err(AppError::not_found("MFA factor not found"));
        }

        if self.store.find_verified_totp(cancel, ctx.user_id).await?.is_none() {
            ensure_active(cancel)?;
            let cleared = self.store.clear_backup_codes(cancel, ctx.user_id).await?;
            info!(user_id = %ctx.user_id, cleared, "Backup codes invalidated");
        }

        info!(user_id = %ctx.user_id, factor_id = %factor.id, "MFA factor removed");
        Ok(())
    }

    /// Replaces all unused backup codes. Requires an elevated session.
    pub async fn regenerate_backup_codes(
        &self,
        cancel: &CancellationToken,
        ctx: &AuthContext,
    ) -> Result<BackupCodeBatch, AppError> {
        ctx.require_elevated()?;
        self.store
            .find_verified_totp(cancel, ctx.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("No verified MFA factor"))?;

        let codes = self.replace_codes(cancel, ctx).await?;
        info!(user_id = %ctx.user_id, "Backup codes regenerated");
        Ok(BackupCodeBatch { codes })
    }

    /// Number of unused backup codes left.
    pub async fn backup_codes_remaining(
        &self,
        cancel: &CancellationToken,
        ctx: &AuthContext,
    ) -> Result<u64, AppError> {
        self.store.count_unused_backup_codes(cancel, ctx.user_id).await
    }

    async fn replace_codes(
        &self,
        cancel: &CancellationToken,
        ctx: &AuthContext,
    ) -> Result<Vec<String>, AppError> {
        let codes = generate_backup_codes(self.backup_code_count);
        let hashes = codes.iter().map(|c| hash_backup_code(c)).collect();
        ensure_active(cancel)?;
        self.store
            .replace_backup_codes(cancel, ctx.user_id, hashes)
            .await?;
        Ok(codes)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bazaar_core::config::AuthConfig;
    use bazaar_core::error::ErrorKind;
    use bazaar_core::result::AppResult;
    use bazaar_core::types::UserId;
    use bazaar_database::memory::{MemoryMfaStore, MemorySessionStore, MemoryUserStore};
    use bazaar_entity::session::{AssuranceLevel, DeviceInfo};

    use super::*;

    #[derive(PartialEq)]
    enum Spend {
        Activation,
        BackupCode,
    }

    /// Memory store that cancels `request` right after the `on` write.
    struct CancelAfterSpend {
        inner: MemoryMfaStore,
        request: CancellationToken,
        on: Spend,
    }

    #[async_trait]
    impl MfaStore for CancelAfterSpend {
        async fn create_factor(
            &self,
            cancel: &CancellationToken,
            data: CreateMfaFactor,
        ) -> AppResult<MfaFactor> {
            self.inner.create_factor(cancel, data).await
        }

        async fn find_factor(
            &self,
            cancel: &CancellationToken,
            user_id: UserId,
            id: MfaFactorId,
        ) -> AppResult<Option<MfaFactor>> {
            self.inner.find_factor(cancel, user_id, id).await
        }

        async fn list_factors(
            &self,
            cancel: &CancellationToken,
            user_id: UserId,
        ) -> AppResult<Vec<MfaFactor>> {
            self.inner.list_factors(cancel, user_id).await
        }

        async fn find_verified_totp(
            &self,
            cancel: &CancellationToken,
            user_id: UserId,
        ) -> AppResult<Option<MfaFactor>> {
            self.inner.find_verified_totp(cancel, user_id).await
        }

        async fn activate_factor(
            &self,
            cancel: &CancellationToken,
            id: MfaFactorId,
            step: i64,
            code_hashes: Vec<String>,
        ) -> AppResult<bool> {
            let activated = self
                .inner
                .activate_factor(cancel, id, step, code_hashes)
                .await;
            if self.on == Spend::Activation {
                self.request.cancel();
            }
            activated
        }

        async fn consume_totp_step(
            &self,
            cancel: &CancellationToken,
            id: MfaFactorId,
            step: i64,
        ) -> AppResult<bool> {
            self.inner.consume_totp_step(cancel, id, step).await
        }

        async fn remove_factor(
            &self,
            cancel: &CancellationToken,
            id: MfaFactorId,
        ) -> AppResult<bool> {
            self.inner.remove_factor(cancel, id).await
        }

        async fn remove_pending_factors(
            &self,
            cancel: &CancellationToken,
            user_id: UserId,
        ) -> AppResult<u64> {
            self.inner.remove_pending_factors(cancel, user_id).await
        }

        async fn replace_backup_codes(
            &self,
            cancel: &CancellationToken,
            user_id: UserId,
            code_hashes: Vec<String>,
        ) -> AppResult<()> {
            self.inner
                .replace_backup_codes(cancel, user_id, code_hashes)
                .await
        }

        async fn clear_backup_codes(
            &self,
            cancel: &CancellationToken,
            user_id: UserId,
        ) -> AppResult<u64> {
            self.inner.clear_backup_codes(cancel, user_id).await
        }

        async fn redeem_backup_code(
            &self,
            cancel: &CancellationToken,
            user_id: UserId,
            code_hash: &str,
        ) -> AppResult<RedeemOutcome> {
            let outcome = self
                .inner
                .redeem_backup_code(cancel, user_id, code_hash)
                .await;
            if self.on == Spend::BackupCode {
                self.request.cancel();
            }
            outcome
        }

        async fn count_unused_backup_codes(
            &self,
            cancel: &CancellationToken,
            user_id: UserId,
        ) -> AppResult<u64> {
            self.inner.count_unused_backup_codes(cancel, user_id).await
        }
    }

    struct Fixture {
        mfa: MfaService,
        totp: Totp,
        ctx: AuthContext,
        cancel: CancellationToken,
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryMfaStore::new())).await
    }

    async fn fixture_with(store: Arc<dyn MfaStore>) -> Fixture {
        let auth = AuthConfig {
            jwt_secret: "mfa-service-test-secret-0123456789abcdef".into(),
            ..AuthConfig::default()
        };
        let sessions = SessionManager::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryUserStore::new()),
            crate::token::TokenService::new(&auth),
            auth,
        );
        let cancel = CancellationToken::new();
        let login = sessions
            .register(
                &cancel,
                "ana@example.com",
                "umbrella-quartz-lantern-91-meadow",
                "Ana",
                DeviceInfo::default(),
            )
            .await
            .unwrap();
        let config = MfaConfig::default();
        Fixture {
            mfa: MfaService::new(store, sessions, &config),
            totp: Totp::new(&config),
            ctx: AuthContext {
                user_id: login.user.id,
                email: login.user.email.clone(),
                session_id: login.tokens.session_id,
                assurance: AssuranceLevel::Aal1,
                role: login.user.role,
            },
            cancel,
        }
    }

    async fn activated(f: &Fixture) -> (TotpEnrollment, TotpActivation, String) {
        let enrollment = f.mfa.enroll_totp(&f.cancel, &f.ctx).await.unwrap();
        let code = f
            .totp
            .code_at(&enrollment.secret, &f.ctx.email, unix_now())
            .unwrap();
        let activation = f
            .mfa
            .activate_totp(&f.cancel, &f.ctx, enrollment.factor_id, &code)
            .await
            .unwrap();
        (enrollment, activation, code)
    }

    #[tokio::test]
    async fn test_activation_elevates_and_issues_codes() {
        let f = fixture().await;
        let (_, activation, _) = activated(&f).await;
        assert_eq!(activation.factor.status, FactorStatus::Verified);
        assert_eq!(activation.backup_codes.len(), 10);
        assert_eq!(activation.grant.assurance, AssuranceLevel::Aal2);
        assert_eq!(
            f.mfa.backup_codes_remaining(&f.cancel, &f.ctx).await.unwrap(),
            10
        );
    }

    #[tokio::test]
    async fn test_second_enrollment_conflicts() {
        let f = fixture().await;
        activated(&f).await;
        let err = f.mfa.enroll_totp(&f.cancel, &f.ctx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_wrong_activation_code() {
        let f = fixture().await;
        let enrollment = f.mfa.enroll_totp(&f.cancel, &f.ctx).await.unwrap();
        let err = f
            .mfa
            .activate_totp(&f.cancel, &f.ctx, enrollment.factor_id, "000000x")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_verify_without_factor_is_not_found() {
        let f = fixture().await;
        let err = f
            .mfa
            .verify(&f.cancel, &f.ctx, MfaProof::Totp("123456".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_totp_step_cannot_be_replayed() {
        let f = fixture().await;
        let (_, _, code) = activated(&f).await;
        let err = f
            .mfa
            .verify(&f.cancel, &f.ctx, MfaProof::Totp(code))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_backup_code_single_use() {
        let f = fixture().await;
        let (_, activation, _) = activated(&f).await;
        let code = activation.backup_codes[0].to_uppercase();

        let grant = f
            .mfa
            .verify(&f.cancel, &f.ctx, MfaProof::BackupCode(code.clone()))
            .await
            .unwrap();
        assert_eq!(grant.assurance, AssuranceLevel::Aal2);

        let err = f
            .mfa
            .verify(&f.cancel, &f.ctx, MfaProof::BackupCode(code))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let err = f
            .mfa
            .verify(&f.cancel, &f.ctx, MfaProof::BackupCode("zzzzz-zzzzz".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_remove_requires_elevation_and_clears_codes() {
        let f = fixture().await;
        let (enrollment, _, _) = activated(&f).await;

        let err = f
            .mfa
            .remove_factor(&f.cancel, &f.ctx, enrollment.factor_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MfaRequired);

        let elevated = AuthContext {
            assurance: AssuranceLevel::Aal2,
            ..f.ctx.clone()
        };
        f.mfa
            .remove_factor(&f.cancel, &elevated, enrollment.factor_id)
            .await
            .unwrap();
        assert_eq!(
            f.mfa.backup_codes_remaining(&f.cancel, &elevated).await.unwrap(),
            0
        );
        assert!(f.mfa.list_factors(&f.cancel, &elevated).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_regenerate_requires_elevation() {
        let f = fixture().await;
        let (_, activation, _) = activated(&f).await;
        let err = f
            .mfa
            .regenerate_backup_codes(&f.cancel, &f.ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MfaRequired);

        let elevated = AuthContext {
            assurance: AssuranceLevel::Aal2,
            ..f.ctx.clone()
        };
        let batch = f
            .mfa
            .regenerate_backup_codes(&f.cancel, &elevated)
            .await
            .unwrap();
        assert_eq!(batch.codes.len(), 10);
        let err = f
            .mfa
            .verify(
                &f.cancel,
                &elevated,
                MfaProof::BackupCode(activation.backup_codes[0].clone()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_cancel_after_activation_still_completes() {
        let request = CancellationToken::new();
        let f = fixture_with(Arc::new(CancelAfterSpend {
            inner: MemoryMfaStore::new(),
            request: request.clone(),
            on: Spend::Activation,
        }))
        .await;

        let enrollment = f.mfa.enroll_totp(&f.cancel, &f.ctx).await.unwrap();
        let code = f
            .totp
            .code_at(&enrollment.secret, &f.ctx.email, unix_now())
            .unwrap();
        let activation = f
            .mfa
            .activate_totp(&request, &f.ctx, enrollment.factor_id, &code)
            .await
            .unwrap();
        assert!(request.is_cancelled());
        assert_eq!(activation.factor.status, FactorStatus::Verified);
        assert_eq!(activation.grant.assurance, AssuranceLevel::Aal2);
        assert_eq!(
            f.mfa.backup_codes_remaining(&f.cancel, &f.ctx).await.unwrap(),
            activation.backup_codes.len() as u64
        );
    }

    #[tokio::test]
    async fn test_cancelled_activation_changes_nothing() {
        let f = fixture().await;
        let enrollment = f.mfa.enroll_totp(&f.cancel, &f.ctx).await.unwrap();
        let code = f
            .totp
            .code_at(&enrollment.secret, &f.ctx.email, unix_now())
            .unwrap();

        let request = CancellationToken::new();
        request.cancel();
        let err = f
            .mfa
            .activate_totp(&request, &f.ctx, enrollment.factor_id, &code)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert_eq!(
            f.mfa.backup_codes_remaining(&f.cancel, &f.ctx).await.unwrap(),
            0
        );

        let activation = f
            .mfa
            .activate_totp(&f.cancel, &f.ctx, enrollment.factor_id, &code)
            .await
            .unwrap();
        assert_eq!(activation.factor.status, FactorStatus::Verified);
    }

    #[tokio::test]
    async fn test_cancel_after_redeem_still_elevates() {
        let request = CancellationToken::new();
        let f = fixture_with(Arc::new(CancelAfterSpend {
            inner: MemoryMfaStore::new(),
            request: request.clone(),
            on: Spend::BackupCode,
        }))
        .await;
        let (_, activation, _) = activated(&f).await;

        let grant = f
            .mfa
            .verify(
                &request,
                &f.ctx,
                MfaProof::BackupCode(activation.backup_codes[0].clone()),
            )
            .await
            .unwrap();
        assert!(request.is_cancelled());
        assert_eq!(grant.assurance, AssuranceLevel::Aal2);
        assert_eq!(grant.session_id, f.ctx.session_id);
    }
}
