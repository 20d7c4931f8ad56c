//! Response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_auth::session::{LoginResult, SessionTokens};
use bazaar_core::types::{Page, SessionId, UserId};
use bazaar_entity::session::{AssuranceLevel, Session};
use bazaar_entity::user::{User, UserRole};

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Paginated response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T: Serialize> {
    /// Items in this page.
    pub items: Vec<T>,
    /// Total item count.
    pub total: u64,
    /// Current page.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
    /// Total pages.
    pub total_pages: u64,
}

impl<T: Serialize> From<Page<T>> for PaginatedResponse<T> {
    fn from(page: Page<T>) -> Self {
        let per_page = u64::from(page.per_page.max(1));
        Self {
            total_pages: page.total.div_ceil(per_page),
            items: page.items,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
        }
    }
}

/// User summary for responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    /// User ID.
    pub id: UserId,
    /// Email.
    pub email: String,
    /// Display name.
    pub display_name: String,
    /// Role.
    pub role: UserRole,
    /// Created at.
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// Register and login response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Access token.
    pub access_token: String,
    /// Access token expiration.
    pub access_expires_at: DateTime<Utc>,
    /// Refresh token. Shown once.
    pub refresh_token: String,
    /// Session expiration.
    pub session_expires_at: DateTime<Utc>,
    /// The new session.
    pub session_id: SessionId,
    /// Session assurance level.
    pub assurance: AssuranceLevel,
    /// User info.
    pub user: UserResponse,
}

impl From<LoginResult> for LoginResponse {
    fn from(result: LoginResult) -> Self {
        let SessionTokens {
            access_token,
            access_expires_at,
            refresh_token,
            session_expires_at,
            session_id,
            assurance,
        } = result.tokens;
        Self {
            access_token,
            access_expires_at,
            refresh_token,
            session_expires_at,
            session_id,
            assurance,
            user: UserResponse::from(&result.user),
        }
    }
}

/// One of the caller's sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    /// Session ID.
    pub id: SessionId,
    /// Device label.
    pub device_name: Option<String>,
    /// Client IP address.
    pub ip_address: Option<String>,
    /// User agent.
    pub user_agent: Option<String>,
    /// Assurance level.
    pub assurance: AssuranceLevel,
    /// Whether this is the session making the request.
    pub current: bool,
    /// Created at.
    pub created_at: DateTime<Utc>,
    /// Last refresh.
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// Expiration.
    pub expires_at: DateTime<Utc>,
}

impl SessionResponse {
    /// Build from a row, flagging the caller's own session.
    pub fn from_session(session: Session, current: SessionId) -> Self {
        Self {
            current: session.id == current,
            id: session.id,
            device_name: session.device_name,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            assurance: session.assurance_level,
            created_at: session.created_at,
            last_refreshed_at: session.last_refreshed_at,
            expires_at: session.expires_at,
        }
    }
}

/// Caller identity, or anonymous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    /// Whether valid credentials were presented.
    pub authenticated: bool,
    /// User ID.
    pub user_id: Option<UserId>,
    /// Email.
    pub email: Option<String>,
    /// Current session.
    pub session_id: Option<SessionId>,
    /// Effective assurance.
    pub assurance: Option<AssuranceLevel>,
    /// Role.
    pub role: Option<UserRole>,
}

/// Simple message response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Message.
    pub message: String,
}

impl MessageResponse {
    /// Wraps a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountResponse {
    /// Count.
    pub count: u64,
}

/// Number of sessions revoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokedResponse {
    /// Sessions that changed state.
    pub revoked: u64,
}

/// Liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok`.
    pub status: String,
    /// Crate version.
    pub version: String,
}
