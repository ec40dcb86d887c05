//! Single-use backup codes for two-factor recovery.
//!
//! A batch is minted at account creation. Raw codes are shown to the caller
//! exactly once; the database stores only SHA-256 digests of the normalized
//! form, so redemption is a digest lookup plus a conditional update (see
//! `api::handlers::auth::storage`).
//!
//! The alphabet omits `0`, `1`, `I`, and `O` to keep hand-typed codes
//! unambiguous.

use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

pub const BACKUP_CODE_COUNT: usize = 4;
const CODE_LEN: usize = 10;
const GROUP_SIZE: usize = 5;
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A freshly minted batch: display codes plus the digests to persist.
#[derive(Debug)]
pub struct BackupCodeBatch {
    pub codes: Vec<String>,
    pub digests: Vec<Vec<u8>>,
}

impl BackupCodeBatch {
    /// Mint `BACKUP_CODE_COUNT` random codes.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = OsRng;
        Self::generate_with_rng(&mut rng)
    }

    fn generate_with_rng<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut codes = Vec::with_capacity(BACKUP_CODE_COUNT);
        let mut digests = Vec::with_capacity(BACKUP_CODE_COUNT);
        for _ in 0..BACKUP_CODE_COUNT {
            let normalized = generate_code(rng);
            digests.push(digest_backup_code(&normalized));
            codes.push(format_backup_code(&normalized));
        }
        Self { codes, digests }
    }
}

/// Normalize user input for redemption: strip separators, uppercase, and
/// require exactly `CODE_LEN` alphabet characters. `None` means the input
/// can never match a minted code; callers treat that as a wrong credential.
#[must_use]
pub fn normalize_backup_code(input: &str) -> Option<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != CODE_LEN {
        return None;
    }
    if !normalized.bytes().all(|byte| ALPHABET.contains(&byte)) {
        return None;
    }
    Some(normalized)
}

/// Group a normalized code for display (`XXXXX-XXXXX`).
#[must_use]
pub fn format_backup_code(normalized: &str) -> String {
    let mut out = String::with_capacity(CODE_LEN + CODE_LEN / GROUP_SIZE);
    for (index, chunk) in normalized.as_bytes().chunks(GROUP_SIZE).enumerate() {
        if index > 0 {
            out.push('-');
        }
        for &byte in chunk {
            out.push(byte as char);
        }
    }
    out
}

/// SHA-256 digest of a normalized code; the only form that is persisted.
#[must_use]
pub fn digest_backup_code(normalized: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.finalize().to_vec()
}

fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> String {
    let mut raw = [0u8; CODE_LEN];
    rng.fill_bytes(&mut raw);
    raw.iter()
        .map(|byte| ALPHABET[usize::from(*byte) % ALPHABET.len()] as char)
        .collect()
}
