//! Custom Axum extractors.

pub mod auth;
pub mod cancel;
pub mod device;
pub mod pagination;
pub mod path;

pub use auth::{
    AdminUser, AuthUser, ElevatedAdminUser, ElevatedUser, MaybeAuthUser, ModeratorUser, RoleMarker,
    RoleUser,
};
pub use cancel::RequestCancel;
pub use device::ClientInfo;
pub use pagination::PaginationParams;
