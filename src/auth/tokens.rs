//! Opaque-token and credential hashing primitives.
//!
//! Passwords get argon2 (slow, salted). Refresh tokens and OTPs are
//! high-entropy or short-lived server-generated secrets, so a plain SHA-256
//! digest is stored for them; comparison happens on the digest, never the
//! raw value.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

/// Byte length of a refresh token before hex encoding.
const OPAQUE_TOKEN_BYTES: usize = 48;

/// Generate a random opaque token (refresh token).
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; OPAQUE_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 digest, hex-encoded, of a token or OTP for at-rest storage.
pub fn digest(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a 6-digit OTP, zero-padded.
pub fn generate_otp() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{n:06}")
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_tokens_are_long_and_unique() {
        let a = generate_opaque_token();
        let b = generate_opaque_token();
        assert_eq!(a.len(), OPAQUE_TOKEN_BYTES * 2);
        assert_ne!(a, b);
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest("abc"), digest("abc"));
        assert_ne!(digest("abc"), digest("abd"));
    }

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..20 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert!(verify_password(&hash, "hunter2hunter2"));
        assert!(!verify_password(&hash, "wrong-password"));
        assert!(!verify_password("not-a-phc-string", "hunter2hunter2"));
    }
}
