//! Client secret generation and hashing via `ring`.
//!
//! Hashes are stored as `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>`
//! so the iteration count can be raised later without invalidating old
//! credentials.

use ring::rand::{SecureRandom, SystemRandom};
use ring::{digest, pbkdf2};
use std::num::NonZeroU32;

use crate::error::{RegistryError, Result};

/// Scheme tag at the start of every stored hash.
const SCHEME: &str = "pbkdf2-sha256";

/// PBKDF2 iterations for new hashes.
const ITERATIONS: u32 = 60_000;

/// Random bytes in a generated secret.
const SECRET_BYTES: usize = 32;

/// Random bytes in a generated client ID suffix.
const CLIENT_ID_BYTES: usize = 7;

const SALT_BYTES: usize = 16;

static ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| RegistryError::Crypto("system random source unavailable".into()))?;
    Ok(buf)
}

/// Generate a new plaintext client secret (64 hex chars).
pub fn generate_secret() -> Result<String> {
    Ok(hex::encode(random_bytes::<SECRET_BYTES>()?))
}

/// Generate a new client ID (`cs` + 14 hex chars).
pub fn generate_client_id() -> Result<String> {
    Ok(format!("cs{}", hex::encode(random_bytes::<CLIENT_ID_BYTES>()?)))
}

/// Hash a plaintext secret for storage.
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = random_bytes::<SALT_BYTES>()?;
    let iterations = NonZeroU32::new(ITERATIONS)
        .ok_or_else(|| RegistryError::Crypto("iteration count must be non-zero".into()))?;

    let mut hash = [0u8; digest::SHA256_OUTPUT_LEN];
    pbkdf2::derive(ALGORITHM, iterations, &salt, secret.as_bytes(), &mut hash);

    Ok(format!(
        "{SCHEME}${ITERATIONS}${}${}",
        hex::encode(salt),
        hex::encode(hash)
    ))
}

/// Check a plaintext secret against a stored hash in constant time.
///
/// Malformed hashes never verify.
#[must_use]
pub fn verify_secret(secret: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Some(iterations) = iterations.parse::<u32>().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (hex::decode(salt), hex::decode(hash)) else {
        return false;
    };

    pbkdf2::verify(ALGORITHM, iterations, &salt, secret.as_bytes(), &hash).is_ok()
}
