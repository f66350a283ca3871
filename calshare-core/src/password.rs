//! Password hashing.
//!
//! PBKDF2-HMAC-SHA256 with a random per-user salt; hashes and salts are
//! stored hex-encoded.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::constants::PBKDF2_ITERATIONS;
use crate::error::{CalShareError, CalShareResult};

const OUTPUT_LEN: usize = 32;
const SALT_LEN: usize = 16;

/// Stored password material for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash {
    pub hash: String,
    pub salt: String,
}

fn derive(password: &str, salt: &[u8]) -> [u8; OUTPUT_LEN] {
    let mut out = [0u8; OUTPUT_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut out);
    out
}

pub fn hash_password(password: &str) -> CalShareResult<PasswordHash> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::fill(&mut salt)
        .map_err(|e| CalShareError::Config(format!("Failed to generate salt: {e}")))?;

    Ok(PasswordHash {
        hash: hex::encode(derive(password, &salt)),
        salt: hex::encode(salt),
    })
}

/// Constant-time check of `password` against stored material. Malformed
/// stored values never verify.
pub fn verify_password(password: &str, stored: &PasswordHash) -> bool {
    let (Ok(salt), Ok(expected)) = (hex::decode(&stored.salt), hex::decode(&stored.hash)) else {
        return false;
    };
    if expected.len() != OUTPUT_LEN {
        return false;
    }

    derive(password, &salt)[..].ct_eq(&expected[..]).into()
}
