//! Integration tests: the full router over in-memory stores.

mod auth_test;
mod helpers;
mod mfa_test;
mod notification_test;
mod realtime_test;
