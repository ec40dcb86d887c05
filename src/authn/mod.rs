//! Authentication building blocks: password hashing, TOTP provisioning,
//! single-use backup codes, and the per-address login throttle.
//!
//! These modules are deliberately free of HTTP concerns; the handlers in
//! `api::handlers::auth` compose them into the login and recovery flows.

pub mod backup_codes;
pub mod password;
pub mod throttle;
pub mod totp;
