//! Salted password hashing.
//!
//! Stored form: `sha256$<salt-hex>$<digest-hex>`, where the digest is
//! SHA-256 over `salt || password`. Values without the scheme prefix are legacy
//! plaintext credentials and are still accepted.

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;

/// Hashes `password` with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    hash_with_salt(password, &salt)
}

/// Returns true when `stored` is in the salted-hash format.
pub fn is_hashed(stored: &str) -> bool {
    parse(stored).is_some()
}

/// Checks `password` against a stored credential.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match parse(stored) {
        Some((salt, expected)) => {
            let actual = digest(password, &salt);
            actual.ct_eq(&expected).into()
        }
        None => {
            tracing::warn!(
                "[Credential] Verifying a legacy plaintext credential; re-save the user to hash it"
            );
            password.as_bytes().ct_eq(stored.as_bytes()).into()
        }
    }
}

fn hash_with_salt(password: &str, salt: &[u8]) -> String {
    format!(
        "{}${}${}",
        SCHEME,
        hex::encode(salt),
        hex::encode(digest(password, salt))
    )
}

fn digest(password: &str, salt: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

fn parse(stored: &str) -> Option<(Vec<u8>, Vec<u8>)> {
    let mut parts = stored.split('$');
    if parts.next()? != SCHEME {
        return None;
    }
    let salt = hex::decode(parts.next()?).ok()?;
    let digest = hex::decode(parts.next()?).ok()?;
    if parts.next().is_some() || digest.len() != 32 {
        return None;
    }
    Some((salt, digest))
}
