//! TOTP secret provisioning and one-time code verification.
//!
//! Codes use the authenticator-app defaults: SHA-1, 6 digits, 30-second
//! steps. Verification accepts one step of skew either side of the current
//! step, so a code is usable for at most 90 seconds of clock drift between
//! the server and the authenticator.
//!
//! The provisioner is stateless: `provision` hands the secret back exactly
//! once (raw and embedded in the `otpauth://` URI) and the caller is
//! responsible for persisting it.

use std::time::{SystemTime, UNIX_EPOCH};

use totp_rs::{Algorithm, Secret, TOTP};

pub const DIGITS: usize = 6;
pub const STEP_SECONDS: u64 = 30;
pub const SKEW_STEPS: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TotpError {
    #[error("invalid TOTP secret")]
    Secret,
    #[error("invalid TOTP parameters")]
    Params,
}

/// A freshly provisioned TOTP enrollment: the base32 secret and the
/// `otpauth://` URI an authenticator app can ingest.
#[derive(Debug)]
pub struct Provisioned {
    pub secret_base32: String,
    pub otpauth_url: String,
}

#[derive(Clone, Debug)]
pub struct TotpProvisioner {
    issuer: String,
}

impl TotpProvisioner {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Generate a fresh 160-bit secret and its provisioning URI.
    ///
    /// # Errors
    /// Returns an error if secret generation or URI assembly fails.
    pub fn provision(&self, account_label: &str) -> Result<Provisioned, TotpError> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret.to_bytes().map_err(|_| TotpError::Secret)?;
        let totp = self.build(secret_bytes, account_label)?;

        Ok(Provisioned {
            secret_base32: totp.get_secret_base32(),
            otpauth_url: totp.get_url(),
        })
    }

    /// Verify a submitted code against the step containing `unix_time`,
    /// tolerating `SKEW_STEPS` steps either side.
    ///
    /// Malformed codes (wrong length, non-digits) and undecodable secrets
    /// return `false` rather than failing the surrounding request.
    #[must_use]
    pub fn verify_code(&self, secret_base32: &str, code: &str, unix_time: u64) -> bool {
        if !well_formed(code) {
            return false;
        }
        let Ok(secret_bytes) = Secret::Encoded(secret_base32.to_string()).to_bytes() else {
            return false;
        };
        let Ok(totp) = self.build(secret_bytes, "verify") else {
            return false;
        };
        totp.check(code, unix_time)
    }

    /// Verify a submitted code against the current wall clock.
    #[must_use]
    pub fn verify_current(&self, secret_base32: &str, code: &str) -> bool {
        let Ok(elapsed) = SystemTime::now().duration_since(UNIX_EPOCH) else {
            return false;
        };
        self.verify_code(secret_base32, code, elapsed.as_secs())
    }

    fn build(&self, secret: Vec<u8>, account_label: &str) -> Result<TOTP, TotpError> {
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW_STEPS,
            STEP_SECONDS,
            secret,
            Some(self.issuer.clone()),
            account_label.to_string(),
        )
        .map_err(|_| TotpError::Params)
    }
}

fn well_formed(code: &str) -> bool {
    code.len() == DIGITS && code.bytes().all(|byte| byte.is_ascii_digit())
}
