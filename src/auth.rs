//! Password digest helpers
//!
//! Digests are stored as `sha256$<salt-hex>$<digest-hex>` so a stored hash
//! is self-describing and re-salting a user replaces the whole string.

use rand::Rng;
use sha2::{Digest, Sha256};

const SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::thread_rng().gen();
    format!(
        "{}${}${}",
        SCHEME,
        hex::encode(salt),
        hex::encode(digest(&salt, password))
    )
}

/// Check a password against a stored digest.
///
/// Malformed digests never verify; they can only come from hand-edited
/// snapshots.
pub fn verify_password(stored: &str, password: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(scheme), Some(salt_hex), Some(digest_hex)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != SCHEME {
        return false;
    }
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    hex::encode(digest(&salt, password)) == digest_hex
}

fn digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_round_trip() {
        let hash = hash_password("supersecure");
        assert!(verify_password(&hash, "supersecure"));
        assert!(!verify_password(&hash, "badpassword"));
        assert!(!verify_password(&hash, ""));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("supersecure");
        let b = hash_password("supersecure");
        assert_ne!(a, b, "two hashes of the same password must differ");
        assert!(verify_password(&a, "supersecure"));
        assert!(verify_password(&b, "supersecure"));
    }

    #[test]
    fn test_malformed_digest_never_verifies() {
        assert!(!verify_password("", "x"));
        assert!(!verify_password("sha256$zz$zz", "x"));
        assert!(!verify_password("bcrypt$00$00", "x"));
        assert!(!verify_password("sha256$deadbeef", "x"));
    }
}
