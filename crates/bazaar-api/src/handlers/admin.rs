//! Admin handlers: hub statistics, forced sign-out and event injection.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;

use bazaar_core::error::AppError;
use bazaar_core::types::UserId;
use bazaar_entity::session::RevokeReason;
use bazaar_realtime::{DomainEvent, HubStats};

use crate::dto::response::{ApiResponse, CountResponse, RevokedResponse};
use crate::error::ApiResult;
use crate::extractors::path::parse_id;
use crate::extractors::{AdminUser, ElevatedAdminUser, RequestCancel};
use crate::handlers::auth::close_revoked_socket;
use crate::state::AppState;

/// Most recipients accepted by one event request.
const MAX_EVENT_RECIPIENTS: usize = 500;

/// An event to deliver to a list of users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchEventRequest {
    /// Users to notify.
    pub recipients: Vec<UserId>,
    /// The event.
    pub event: DomainEvent,
}

/// GET /api/admin/realtime
pub async fn realtime_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Json<ApiResponse<HubStats>> {
    Json(ApiResponse::ok(state.hub.stats().await))
}

/// POST /api/admin/users/{id}/revoke-sessions
pub async fn revoke_user_sessions(
    State(state): State<AppState>,
    cancel: RequestCancel,
    admin: ElevatedAdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<RevokedResponse>>> {
    let user_id: UserId = parse_id(&id)?;
    let revoked = state
        .sessions
        .revoke_user_sessions(&cancel, &admin, user_id)
        .await?;
    close_revoked_socket(&state, user_id, None, RevokeReason::AdminRevoked).await;
    Ok(Json(ApiResponse::ok(RevokedResponse { revoked })))
}

/// POST /api/admin/events
///
/// Persists and delivers one notification per recipient.
pub async fn dispatch_event(
    State(state): State<AppState>,
    cancel: RequestCancel,
    admin: AdminUser,
    Json(req): Json<DispatchEventRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<CountResponse>>)> {
    if req.recipients.is_empty() {
        return Err(AppError::validation("At least one recipient is required").into());
    }
    if req.recipients.len() > MAX_EVENT_RECIPIENTS {
        return Err(AppError::validation(format!(
            "At most {MAX_EVENT_RECIPIENTS} recipients per request"
        ))
        .into());
    }

    let sent = state
        .dispatcher
        .dispatch_many(&cancel, &req.recipients, &req.event)
        .await?;
    info!(
        admin_id = %admin.user_id,
        kind = req.event.kind(),
        recipients = sent.len(),
        "Admin dispatched event"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok(CountResponse {
            count: sent.len() as u64,
        })),
    ))
}
