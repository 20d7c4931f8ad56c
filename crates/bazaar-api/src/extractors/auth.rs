//! Guard extractors: run the auth gate and hand the typed context to handlers.
//!
//! A handler states its requirement by the extractor it takes. Nothing is
//! attached to the request when the gate rejects it.

use std::convert::Infallible;
use std::marker::PhantomData;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use bazaar_auth::{AuthContext, Requirement};
use bazaar_entity::user::UserRole;

use crate::error::ApiError;
use crate::extractors::cancel::RequestCancel;
use crate::state::AppState;

async fn guard(
    parts: &Parts,
    state: &AppState,
    requirement: Requirement,
) -> Result<AuthContext, ApiError> {
    let cancel = RequestCancel::from_parts(parts, state);
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    Ok(state
        .gate
        .authenticate_header(&cancel, header, requirement)
        .await?)
}

/// Any authenticated session (assurance level 1 or higher).
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthContext);

impl std::ops::Deref for AuthUser {
    type Target = AuthContext;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        guard(parts, state, Requirement::authenticated())
            .await
            .map(Self)
    }
}

/// A session that completed step-up MFA.
#[derive(Debug, Clone)]
pub struct ElevatedUser(pub AuthContext);

impl std::ops::Deref for ElevatedUser {
    type Target = AuthContext;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequestParts<AppState> for ElevatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        guard(parts, state, Requirement::elevated()).await.map(Self)
    }
}

/// Type-level role requirement for [`RoleUser`].
pub trait RoleMarker: Send + Sync + 'static {
    /// Minimum role.
    const ROLE: UserRole;
    /// Whether the session must also be elevated.
    const ELEVATED: bool = false;

    /// The gate requirement this marker stands for.
    fn requirement() -> Requirement {
        let requirement = Requirement::role(Self::ROLE);
        if Self::ELEVATED {
            requirement.and_elevated()
        } else {
            requirement
        }
    }
}

/// Administrators.
#[derive(Debug, Clone, Copy)]
pub struct Admin;

impl RoleMarker for Admin {
    const ROLE: UserRole = UserRole::Admin;
}

/// Administrators on an elevated session.
#[derive(Debug, Clone, Copy)]
pub struct ElevatedAdmin;

impl RoleMarker for ElevatedAdmin {
    const ROLE: UserRole = UserRole::Admin;
    const ELEVATED: bool = true;
}

/// Moderators and above.
#[derive(Debug, Clone, Copy)]
pub struct Moderator;

impl RoleMarker for Moderator {
    const ROLE: UserRole = UserRole::Moderator;
}

/// A caller holding at least the role named by `R`.
#[derive(Debug, Clone)]
pub struct RoleUser<R: RoleMarker> {
    /// The authenticated context.
    pub ctx: AuthContext,
    _role: PhantomData<R>,
}

impl<R: RoleMarker> std::ops::Deref for RoleUser<R> {
    type Target = AuthContext;
    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

impl<R: RoleMarker> FromRequestParts<AppState> for RoleUser<R> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ctx = guard(parts, state, R::requirement()).await?;
        Ok(Self {
            ctx,
            _role: PhantomData,
        })
    }
}

/// Admin guard.
pub type AdminUser = RoleUser<Admin>;
/// Admin guard that also requires step-up.
pub type ElevatedAdminUser = RoleUser<ElevatedAdmin>;
/// Moderator guard.
pub type ModeratorUser = RoleUser<Moderator>;

/// Identity when the request carries valid credentials; never rejects.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthContext>);

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cancel = RequestCancel::from_parts(parts, state);
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        Ok(Self(state.gate.identify(&cancel, header).await))
    }
}

#[cfg(test)]
mod tests {
    use bazaar_entity::session::AssuranceLevel;

    use super::*;

    #[test]
    fn test_marker_requirements() {
        let admin = Admin::requirement();
        assert_eq!(admin.role, Some(UserRole::Admin));
        assert_eq!(admin.assurance, AssuranceLevel::Aal1);

        let elevated = ElevatedAdmin::requirement();
        assert_eq!(elevated.role, Some(UserRole::Admin));
        assert_eq!(elevated.assurance, AssuranceLevel::Aal2);

        assert_eq!(Moderator::requirement().role, Some(UserRole::Moderator));
    }
}
