//! Argon2id password hashing.
//!
//! Hashes are PHC strings, so the work factor travels with each hash and old
//! hashes keep verifying after the configured cost changes. Both operations
//! are CPU-bound on purpose; async callers go through [`PasswordHasher::hash_blocking`]
//! and [`PasswordHasher::verify_blocking`].

use argon2::password_hash::{
    self, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, Rng};
use tracing::error;

use super::config::{HasherConfig, MIN_PASSWORD_CHARS};
use super::error::AuthError;

const GENERATED_PASSWORD_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*";

#[derive(Clone, Debug)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    /// # Errors
    /// Returns `AuthError::Configuration` if argon2 rejects the parameters.
    pub fn new(config: HasherConfig) -> Result<Self, AuthError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|err| AuthError::Configuration(format!("invalid argon2 parameters: {err}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a plaintext password with a fresh random salt.
    ///
    /// # Errors
    /// Returns `AuthError::Internal` if hashing fails.
    pub fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| {
                error!("Failed to hash password: {err}");
                AuthError::Internal("failed to hash password".to_string())
            })
    }

    /// Check a plaintext password against a stored hash.
    ///
    /// # Errors
    /// Returns `AuthError::MalformedHash` when the stored value is not a valid
    /// PHC string. A wrong password is `Ok(false)`, never an error.
    pub fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(hash).map_err(|_| AuthError::MalformedHash)?;
        match self.argon2().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => {
                error!("Failed to verify password hash: {err}");
                Err(AuthError::MalformedHash)
            }
        }
    }

    /// [`Self::hash`] on the blocking thread pool.
    ///
    /// # Errors
    /// Same as [`Self::hash`], plus `AuthError::Internal` if the task panics.
    pub async fn hash_blocking(&self, plaintext: String) -> Result<String, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|err| AuthError::Internal(format!("hash task failed: {err}")))?
    }

    /// [`Self::verify`] on the blocking thread pool.
    ///
    /// # Errors
    /// Same as [`Self::verify`], plus `AuthError::Internal` if the task panics.
    pub async fn verify_blocking(
        &self,
        plaintext: String,
        hash: String,
    ) -> Result<bool, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &hash))
            .await
            .map_err(|err| AuthError::Internal(format!("verify task failed: {err}")))?
    }
}

/// Reject new passwords shorter than the minimum length (in characters).
///
/// # Errors
/// Returns `AuthError::WeakPassword`.
pub fn ensure_strong(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AuthError::WeakPassword {
            min: MIN_PASSWORD_CHARS,
        });
    }
    Ok(())
}

/// Random password for provisioning when the operator does not supply one.
#[must_use]
pub fn generate_password(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| {
            let index = rng.gen_range(0..GENERATED_PASSWORD_CHARSET.len());
            char::from(GENERATED_PASSWORD_CHARSET[index])
        })
        .collect()
}
