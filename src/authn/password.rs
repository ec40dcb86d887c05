//! Argon2id hashing and verification for account passwords.
//!
//! The same primitives protect household admission keys, which are lookup
//! credentials and get the same storage treatment as passwords.

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::rngs::OsRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PasswordError {
    #[error("password must not be empty")]
    Empty,
    #[error("failed to hash password")]
    Hash,
}

/// Hash a plaintext password into an Argon2id PHC string with a random salt.
///
/// # Errors
/// Returns `PasswordError::Empty` for empty input and `PasswordError::Hash`
/// if the hasher itself fails.
pub fn hash_password(plaintext: &str) -> Result<String, PasswordError> {
    if plaintext.is_empty() {
        return Err(PasswordError::Empty);
    }
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|_| PasswordError::Hash)?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored Argon2id hash.
///
/// Wrong passwords and unparsable stored hashes both come back `false`;
/// verification never errors for a bad credential.
#[must_use]
pub fn verify_password(plaintext: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::{PasswordError, hash_password, verify_password};

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("correct horse battery staple").expect("hash");
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("correct horse battery stable", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("hunter2").expect("hash");
        let second = hash_password("hunter2").expect("hash");
        assert_ne!(first, second);
        assert!(verify_password("hunter2", &first));
        assert!(verify_password("hunter2", &second));
    }

    #[test]
    fn empty_password_is_rejected() {
        assert_eq!(hash_password(""), Err(PasswordError::Empty));
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }
}
