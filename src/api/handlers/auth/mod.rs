//! Authentication endpoints: account creation, login, two-factor recovery,
//! and session management.
//!
//! Flow overview:
//! 1) Account creation mints a household (or resolves one by name + admission
//!    key), its user, a TOTP secret, and a backup-code batch in one
//!    transaction.
//! 2) Login runs throttle check → password check → TOTP check in a single
//!    request; there is no persisted pending-MFA state between factors.
//! 3) Recovery substitutes a single-use backup code for the TOTP factor and
//!    rotates the TOTP secret, forcing re-enrollment.
//!
//! Security boundaries:
//! - Wrong passwords, wrong codes, wrong backup codes, and unknown users are
//!   indistinguishable on the wire (`Unauthorized`).
//! - Lockout (`TooManyAttempts`) is reported distinctly so clients back off.
//! - Raw session tokens, backup codes, and TOTP secrets never persist; the
//!   database holds digests (tokens, codes) or a rotating secret (TOTP).

pub mod accounts;
pub mod error;
pub mod login;
pub mod recovery;
pub mod session;
mod state;
mod storage;
pub mod types;
mod utils;

pub use error::AuthError;
pub use state::{AuthConfig, AuthState};
