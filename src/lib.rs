//! # MoneyMagnet (household finance backend)
//!
//! `moneymagnet` is the backend for a household-scoped personal-finance
//! application. Households group users behind a shared admission key; users
//! authenticate with a password plus a time-based one-time password, and
//! recover a lost authenticator with single-use backup codes.
//!
//! ## Authentication
//!
//! - Passwords and household admission keys are stored as Argon2id hashes.
//! - The TOTP secret is handed out exactly once, inside an `otpauth://`
//!   provisioning URI, and rotates whenever a backup code is redeemed.
//! - Failed attempts are throttled per source address: four failures inside
//!   a trailing three-hour window lock the address out.
//! - Wrong passwords, wrong codes, and unknown users are indistinguishable
//!   on the wire; only lockout is reported distinctly.
//!
//! ## Sessions
//!
//! Sessions are opaque random tokens in an `HttpOnly` cookie; the database
//! stores only token digests, with explicit create/check/invalidate
//! operations.

pub mod api;
pub mod authn;
pub mod cli;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
