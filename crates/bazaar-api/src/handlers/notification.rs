//! Notification handlers.

use axum::Json;
use axum::extract::{Path, Query, State};

use bazaar_core::types::NotificationId;
use bazaar_entity::notification::Notification;

use crate::dto::request::NotificationListQuery;
use crate::dto::response::{ApiResponse, CountResponse, PaginatedResponse};
use crate::error::ApiResult;
use crate::extractors::path::parse_id;
use crate::extractors::{AuthUser, RequestCancel};
use crate::state::AppState;

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: AuthUser,
    Query(query): Query<NotificationListQuery>,
) -> ApiResult<Json<ApiResponse<PaginatedResponse<Notification>>>> {
    let page = state
        .notifications
        .list(&cancel, auth.user_id, query.unread_only, query.page_request())
        .await?;
    Ok(Json(ApiResponse::ok(PaginatedResponse::from(page))))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: AuthUser,
) -> ApiResult<Json<ApiResponse<CountResponse>>> {
    let count = state.notifications.unread_count(&cancel, auth.user_id).await?;
    Ok(Json(ApiResponse::ok(CountResponse { count })))
}

/// POST /api/notifications/{id}/read
///
/// Responds with the remaining unread count.
pub async fn mark_read(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<CountResponse>>> {
    let id: NotificationId = parse_id(&id)?;
    let count = state
        .notifications
        .mark_read(&cancel, auth.user_id, id)
        .await?;
    Ok(Json(ApiResponse::ok(CountResponse { count })))
}

/// POST /api/notifications/read-all
///
/// Responds with how many notifications changed.
pub async fn mark_all_read(
    State(state): State<AppState>,
    cancel: RequestCancel,
    auth: AuthUser,
) -> ApiResult<Json<ApiResponse<CountResponse>>> {
    let count = state
        .notifications
        .mark_all_read(&cancel, auth.user_id)
        .await?;
    Ok(Json(ApiResponse::ok(CountResponse { count })))
}
