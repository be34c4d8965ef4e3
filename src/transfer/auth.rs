//! Transfer auth keys.
//!
//! Keys are random alphanumeric strings drawn from the OS CSPRNG. Only an
//! Argon2 hash with a per-key random salt is stored.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;
use rand::distributions::Alphanumeric;

use super::error::TransferError;

/// Shortest key length accepted by configuration
pub const MIN_KEY_LENGTH: usize = 8;

/// Generates and checks transfer auth keys
#[derive(Clone)]
pub struct AuthKeyHasher {
    key_length: usize,
    params: Params,
}

impl AuthKeyHasher {
    /// `memory_kib` / `iterations` are the Argon2id cost parameters
    pub fn new(key_length: usize, memory_kib: u32, iterations: u32) -> Result<Self, TransferError> {
        if key_length < MIN_KEY_LENGTH {
            return Err(TransferError::SystemError(format!(
                "auth key length {} is below the minimum of {}",
                key_length, MIN_KEY_LENGTH
            )));
        }
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| TransferError::SystemError(format!("invalid argon2 params: {}", e)))?;
        Ok(Self { key_length, params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Fresh random key
    pub fn generate_key(&self) -> String {
        OsRng
            .sample_iter(&Alphanumeric)
            .take(self.key_length)
            .map(char::from)
            .collect()
    }

    /// Salted hash in PHC string format
    pub fn hash(&self, key: &str) -> Result<String, TransferError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(key.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| TransferError::SystemError(format!("auth key hashing failed: {}", e)))
    }

    /// Exact match of `key` against a stored hash
    pub fn verify(&self, key: &str, crypt_hash: &str) -> Result<bool, TransferError> {
        let parsed = PasswordHash::new(crypt_hash)
            .map_err(|e| TransferError::SystemError(format!("corrupt auth key hash: {}", e)))?;
        Ok(self
            .argon2()
            .verify_password(key.as_bytes(), &parsed)
            .is_ok())
    }
}

impl Default for AuthKeyHasher {
    fn default() -> Self {
        Self {
            key_length: 16,
            params: Params::default(),
        }
    }
}
