//! Route definitions for the complete REST API.

use axum::Router;
use axum::routing::{delete, get, post};

use crate::handlers;
use crate::state::AppState;

/// Builds the route table: `/api/*` plus the `/ws` upgrade.
pub fn build_router() -> Router<AppState> {
    let api_routes = Router::new()
        .merge(auth_routes())
        .merge(mfa_routes())
        .merge(notification_routes())
        .merge(admin_routes())
        .route("/health", get(handlers::health::health));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(handlers::ws::ws_handler))
}

/// Session lifecycle endpoints
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/logout-all", post(handlers::auth::logout_all))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/sessions", get(handlers::auth::list_sessions))
        .route("/auth/sessions/{id}", delete(handlers::auth::revoke_session))
}

/// Step-up MFA endpoints
fn mfa_routes() -> Router<AppState> {
    Router::new()
        .route("/mfa/totp/enroll", post(handlers::mfa::enroll_totp))
        .route("/mfa/totp/activate", post(handlers::mfa::activate_totp))
        .route("/mfa/verify", post(handlers::mfa::verify))
        .route("/mfa/factors", get(handlers::mfa::list_factors))
        .route("/mfa/factors/{id}", delete(handlers::mfa::remove_factor))
        .route(
            "/mfa/backup-codes",
            get(handlers::mfa::backup_codes_remaining).post(handlers::mfa::regenerate_backup_codes),
        )
}

/// Notification read-state endpoints
fn notification_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/notifications",
            get(handlers::notification::list_notifications),
        )
        .route(
            "/notifications/unread-count",
            get(handlers::notification::unread_count),
        )
        .route(
            "/notifications/read-all",
            post(handlers::notification::mark_all_read),
        )
        .route(
            "/notifications/{id}/read",
            post(handlers::notification::mark_read),
        )
}

/// Admin endpoints (role-guarded in the extractors)
fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/realtime", get(handlers::admin::realtime_stats))
        .route(
            "/admin/users/{id}/revoke-sessions",
            post(handlers::admin::revoke_user_sessions),
        )
        .route("/admin/events", post(handlers::admin::dispatch_event))
}
