//! Client address and user agent for new sessions.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use bazaar_entity::session::DeviceInfo;

/// What the request headers say about the client.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    /// First address in `X-Forwarded-For`, if any.
    pub ip_address: Option<String>,
    /// `User-Agent` header.
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Device record for a session, with an optional client-chosen label.
    pub fn into_device(self, device_name: Option<String>) -> DeviceInfo {
        DeviceInfo {
            device_name: device_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            ip_address: self.ip_address,
            user_agent: self.user_agent,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip_address = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let user_agent = parts
            .headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Ok(Self {
            ip_address,
            user_agent,
        })
    }
}
