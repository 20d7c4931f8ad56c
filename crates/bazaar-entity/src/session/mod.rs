//! Session domain entities.

pub mod model;

pub use model::{AssuranceLevel, CreateSession, DeviceInfo, RevokeReason, Session};
