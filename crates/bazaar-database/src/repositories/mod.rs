//! PostgreSQL implementations of the store traits.

pub mod mfa;
pub mod notification;
pub mod session;
pub mod user;

pub use mfa::MfaRepository;
pub use notification::NotificationRepository;
pub use session::SessionRepository;
pub use user::UserRepository;
