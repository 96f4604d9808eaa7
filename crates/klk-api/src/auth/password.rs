//! Password hashing: PBKDF2-HMAC-SHA256 in the
//! `pbkdf2_sha256$<iterations>$<salt>$<hash>` storage format.

use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

const ALGORITHM: &str = "pbkdf2_sha256";

/// PBKDF2 with HMAC-SHA256 and a 32-byte derived key.
pub fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut out = [0u8; 32];
    // HMAC accepts keys of any length.
    pbkdf2::<Hmac<Sha256>>(password, salt, iterations, &mut out)
        .map(|()| out)
        .unwrap_or_default()
}

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str, iterations: u32) -> String {
    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);
    let salt = base64::encode_config(salt_bytes, base64::URL_SAFE_NO_PAD);
    let hash = pbkdf2_sha256(password.as_bytes(), salt.as_bytes(), iterations);
    format!("{ALGORITHM}${iterations}${salt}${}", base64::encode(hash))
}

/// Check `password` against a stored hash. Unknown formats never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(ALGORITHM), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    let Ok(expected) = base64::decode(hash) else {
        return false;
    };
    let derived = pbkdf2_sha256(password.as_bytes(), salt.as_bytes(), iterations);
    expected.len() == derived.len() && bool::from(derived[..].ct_eq(&expected[..]))
}

/// [`hash_password`] on the blocking thread pool.
pub async fn hash_password_blocking(
    password: String,
    iterations: u32,
) -> Result<String, tokio::task::JoinError> {
    let password = Zeroizing::new(password);
    tokio::task::spawn_blocking(move || hash_password(&password, iterations)).await
}

/// [`verify_password`] on the blocking thread pool.
pub async fn verify_password_blocking(
    password: String,
    stored: String,
) -> Result<bool, tokio::task::JoinError> {
    let password = Zeroizing::new(password);
    tokio::task::spawn_blocking(move || verify_password(&password, &stored)).await
}
