//! Password hashing and verification using scrypt
//!
//! Stored format: `scrypt$N$r$p$salt_b64$hash_b64` with standard padded
//! base64. Parameters are read back from the stored string, so hashes made
//! with older costs keep verifying.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::types::CovenantError;

const SCRYPT_LOG_N: u8 = 15;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Hash a password with a fresh random salt
pub fn hash_password(password: &str) -> Result<String, CovenantError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut key = [0u8; KEY_LEN];
    derive(password, &salt, SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, &mut key)
        .ok_or_else(|| CovenantError::Internal("scrypt derivation failed".into()))?;

    Ok(format!(
        "scrypt${}${}${}${}${}",
        1u64 << SCRYPT_LOG_N,
        SCRYPT_R,
        SCRYPT_P,
        STANDARD.encode(salt),
        STANDARD.encode(key)
    ))
}

/// Verify a password against a stored hash in constant time.
///
/// A malformed stored hash never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some(parsed) = ParsedHash::parse(stored) else {
        warn!("Stored password hash is malformed");
        return false;
    };

    let mut actual = vec![0u8; parsed.expected.len()];
    if derive(
        password,
        &parsed.salt,
        parsed.log_n,
        parsed.r,
        parsed.p,
        &mut actual,
    )
    .is_none()
    {
        warn!("Stored password hash has unusable scrypt parameters");
        return false;
    }

    actual.ct_eq(&parsed.expected).into()
}

fn derive(password: &str, salt: &[u8], log_n: u8, r: u32, p: u32, out: &mut [u8]) -> Option<()> {
    let params = scrypt::Params::new(log_n, r, p, out.len()).ok()?;
    scrypt::scrypt(password.as_bytes(), salt, &params, out).ok()
}

struct ParsedHash {
    log_n: u8,
    r: u32,
    p: u32,
    salt: Vec<u8>,
    expected: Vec<u8>,
}

impl ParsedHash {
    fn parse(stored: &str) -> Option<Self> {
        let parts: Vec<&str> = stored.split('$').collect();
        let [alg, n, r, p, salt, hash] = parts.as_slice() else {
            return None;
        };
        if *alg != "scrypt" {
            return None;
        }

        let n: u64 = n.parse().ok()?;
        if n < 2 || !n.is_power_of_two() {
            return None;
        }
        let expected = STANDARD.decode(hash).ok()?;
        if expected.is_empty() {
            return None;
        }

        Some(Self {
            log_n: n.trailing_zeros() as u8,
            r: r.parse().ok()?,
            p: p.parse().ok()?,
            salt: STANDARD.decode(salt).ok()?,
            expected,
        })
    }
}
