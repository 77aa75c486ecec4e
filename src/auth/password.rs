//! argon2 PHC hashes. Hashing and verification run on the blocking pool.

use crate::error::AppError;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

/// One-way salted hash; a fresh salt on every call.
pub async fn hash_password(plain: &str) -> Result<String, AppError> {
    let plain = plain.to_string();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AppError::Internal(format!("password hash: {}", e)))
    })
    .await
    .map_err(|e| AppError::Internal(format!("password hash task: {}", e)))?
}

/// False for a mismatch or a stored value that is not a PHC string.
pub async fn verify_password(plain: &str, stored_hash: &str) -> bool {
    let plain = plain.to_string();
    let stored = stored_hash.to_string();
    tokio::task::spawn_blocking(move || {
        let parsed = match PasswordHash::new(&stored) {
            Ok(h) => h,
            Err(_) => return false,
        };
        Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    })
    .await
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_is_salted_and_verifiable() {
        let a = hash_password("secret").await.unwrap();
        let b = hash_password("secret").await.unwrap();
        assert_ne!(a, b);
        assert!(!a.contains("secret"));
        assert!(verify_password("secret", &a).await);
        assert!(!verify_password("wrong", &a).await);
        assert!(!verify_password("secret", "secret").await);
    }
}
