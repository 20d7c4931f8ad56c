//! Connection hub: the single owner of the user → live socket map.
//!
//! All state lives inside one Tokio task. Everyone else talks to it through
//! a cloneable [`HubHandle`], so registry mutations are strictly sequential
//! even when many sockets connect, disconnect and receive at once.

pub mod actor;
pub mod handle;

pub use actor::{ConnectionHub, HubStats};
pub use bazaar_core::types::ConnectionId;
pub use handle::{HubHandle, Registration};
