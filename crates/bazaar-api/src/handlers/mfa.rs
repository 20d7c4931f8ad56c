//! Step-up MFA handlers: TOTP enrollment, verification and backup codes.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use bazaar_auth::mfa::{BackupCodeBatch, TotpActivation, TotpEnrollment};
use bazaar_auth::session::AccessGrant;
use bazaar_core::types::MfaFactorId;
use bazaar_entity::mfa::MfaFactor;

use crate::dto::request::{ActivateTotpRequest, VerifyMfaRequest, validate_request};
use crate::dto::response::{ApiResponse, CountResponse, MessageResponse};
use crate::error::ApiResult;
use crate::extractors::path::parse_id;
use crate::extractors::{AuthUser, ElevatedUser, RequestCancel};
use crate::state::AppState;

/// POST /api/mfa/totp/enroll
pub async fn enroll_totp(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: AuthUser,
) -> ApiResult<(StatusCode, Json<ApiResponse<TotpEnrollment>>)> {
    let enrollment = state.mfa.enroll_totp(&cancel, &auth).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(enrollment))))
}

/// POST /api/mfa/totp/activate
pub async fn activate_totp(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: AuthUser,
    Json(req): Json<ActivateTotpRequest>,
) -> ApiResult<Json<ApiResponse<TotpActivation>>> {
    validate_request(&req)?;
    let activation = state
        .mfa
        .activate_totp(&cancel, &auth, req.factor_id, req.code.trim())
        .await?;
    Ok(Json(ApiResponse::ok(activation)))
}

/// POST /api/mfa/verify
pub async fn verify(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: AuthUser,
    Json(req): Json<VerifyMfaRequest>,
) -> ApiResult<Json<ApiResponse<AccessGrant>>> {
    let proof = req.into_proof()?;
    let grant = state.mfa.verify(&cancel, &auth, proof).await?;
    Ok(Json(ApiResponse::ok(grant)))
}

/// GET /api/mfa/factors
pub async fn list_factors(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<MfaFactor>>>> {
    let factors = state.mfa.list_factors(&cancel, &auth).await?;
    Ok(Json(ApiResponse::ok(factors)))
}

/// DELETE /api/mfa/factors/{id}
pub async fn remove_factor(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: ElevatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<MessageResponse>>> {
    let factor_id: MfaFactorId = parse_id(&id)?;
    state.mfa.remove_factor(&cancel, &auth, factor_id).await?;
    Ok(Json(ApiResponse::ok(MessageResponse::new("Factor removed"))))
}

/// POST /api/mfa/backup-codes
pub async fn regenerate_backup_codes(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: ElevatedUser,
) -> ApiResult<Json<ApiResponse<BackupCodeBatch>>> {
    let batch = state.mfa.regenerate_backup_codes(&cancel, &auth).await?;
    Ok(Json(ApiResponse::ok(batch)))
}

/// GET /api/mfa/backup-codes
pub async fn backup_codes_remaining(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: AuthUser,
) -> ApiResult<Json<ApiResponse<CountResponse>>> {
    let count = state.mfa.backup_codes_remaining(&cancel, &auth).await?;
    Ok(Json(ApiResponse::ok(CountResponse { count })))
}
