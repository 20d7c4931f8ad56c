//! Auth handlers: register, login, refresh, logout and session management.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use bazaar_auth::session::AccessGrant;
use bazaar_core::types::{SessionId, UserId};
use bazaar_entity::session::RevokeReason;
use bazaar_realtime::OutboundMessage;

use crate::dto::request::{
    LoginRequest, LogoutAllRequest, RefreshRequest, RegisterRequest, validate_request,
};
use crate::dto::response::{
    ApiResponse, LoginResponse, MeResponse, MessageResponse, RevokedResponse, SessionResponse,
};
use crate::error::ApiResult;
use crate::extractors::path::parse_id;
use crate::extractors::{AuthUser, ClientInfo, ElevatedUser, MaybeAuthUser, RequestCancel};
use crate::state::AppState;

/// Closes the user's live socket after a revocation, telling it why.
pub(crate) async fn close_revoked_socket(
    state: &AppState,
    user_id: UserId,
    session_id: Option<SessionId>,
    reason: RevokeReason,
) {
    let farewell = OutboundMessage::SessionRevoked {
        session_id,
        reason: reason.as_str().to_string(),
    };
    state.hub.close_user(user_id, Some(farewell)).await;
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    cancel: RequestCancel,
    client: ClientInfo,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<LoginResponse>>)> {
    validate_request(&req)?;
    let result = state
        .sessions
        .register(
            &cancel,
            &req.email,
            &req.password,
            &req.display_name,
            client.into_device(req.device_name),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(LoginResponse::from(result))),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    cancel: RequestCancel,
    client: ClientInfo,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<ApiResponse<LoginResponse>>> {
    validate_request(&req)?;
    let result = state
        .sessions
        .login(
            &cancel,
            &req.email,
            &req.password,
            client.into_device(req.device_name),
        )
        .await?;
    Ok(Json(ApiResponse::ok(LoginResponse::from(result))))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    cancel: RequestCancel,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<ApiResponse<AccessGrant>>> {
    validate_request(&req)?;
    let grant = state.sessions.refresh(&cancel, &req.refresh_token).await?;
    Ok(Json(ApiResponse::ok(grant)))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: AuthUser,
) -> ApiResult<Json<ApiResponse<MessageResponse>>> {
    state.sessions.logout(&cancel, &auth).await?;
    close_revoked_socket(&state, auth.user_id, Some(auth.session_id), RevokeReason::Logout).await;
    Ok(Json(ApiResponse::ok(MessageResponse::new(
        "Logged out successfully",
    ))))
}

/// POST /api/auth/logout-all
pub async fn logout_all(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: AuthUser,
    body: Option<Json<LogoutAllRequest>>,
) -> ApiResult<Json<ApiResponse<RevokedResponse>>> {
    let Json(req) = body.unwrap_or_default();
    let revoked = state
        .sessions
        .logout_all(&cancel, &auth, req.keep_current)
        .await?;
    close_revoked_socket(&state, auth.user_id, None, RevokeReason::LogoutAll).await;
    Ok(Json(ApiResponse::ok(RevokedResponse { revoked })))
}

/// GET /api/auth/me
pub async fn me(MaybeAuthUser(ctx): MaybeAuthUser) -> Json<ApiResponse<MeResponse>> {
    let response = match ctx {
        Some(ctx) => MeResponse {
            authenticated: true,
            user_id: Some(ctx.user_id),
            email: Some(ctx.email),
            session_id: Some(ctx.session_id),
            assurance: Some(ctx.assurance),
            role: Some(ctx.role),
        },
        None => MeResponse {
            authenticated: false,
            user_id: None,
            email: None,
            session_id: None,
            assurance: None,
            role: None,
        },
    };
    Json(ApiResponse::ok(response))
}

/// GET /api/auth/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<SessionResponse>>>> {
    let sessions = state.sessions.list_sessions(&cancel, &auth).await?;
    let current = auth.session_id;
    Ok(Json(ApiResponse::ok(
        sessions
            .into_iter()
            .map(|s| SessionResponse::from_session(s, current))
            .collect(),
    )))
}

/// DELETE /api/auth/sessions/{id}
pub async fn revoke_session(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: ElevatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<MessageResponse>>> {
    let session_id: SessionId = parse_id(&id)?;
    state
        .sessions
        .revoke_session(&cancel, &auth, session_id)
        .await?;
    close_revoked_socket(&state, auth.user_id, Some(session_id), RevokeReason::UserRevoked).await;
    Ok(Json(ApiResponse::ok(MessageResponse::new("Session revoked"))))
}
