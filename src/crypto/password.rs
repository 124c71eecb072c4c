use pbkdf2::password_hash::{
    Error as HashError, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
};
use pbkdf2::{Params, Pbkdf2};
use rand::rngs::OsRng;

use super::CryptoError;

pub const PBKDF2_ITERATIONS: u32 = 600_000;
const HASH_LENGTH: usize = 32;

/// Hash a password for storage with the production iteration count.
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    hash_password_with_iterations(password, PBKDF2_ITERATIONS)
}

/// Hash with an explicit PBKDF2-SHA256 iteration count.
///
/// Stored form is a PHC string: `$pbkdf2-sha256$i=<iterations>,l=32$<salt>$<hash>`.
pub fn hash_password_with_iterations(password: &str, iterations: u32) -> Result<String, CryptoError> {
    let salt = SaltString::generate(&mut OsRng);
    let params = Params {
        rounds: iterations,
        output_length: HASH_LENGTH,
    };
    let hash = Pbkdf2
        .hash_password_customized(password.as_bytes(), None, None, params, &salt)
        .map_err(|_| CryptoError::HashingFailed)?;
    Ok(hash.to_string())
}

/// Hashing policy handed to account operations.
///
/// Verification always uses the count recorded in the stored hash, so
/// lowering the count only affects newly written hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHasher {
    iterations: u32,
}

impl PasswordHasher {
    pub fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }

    pub fn hash(&self, password: &str) -> Result<String, CryptoError> {
        hash_password_with_iterations(password, self.iterations)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::with_iterations(PBKDF2_ITERATIONS)
    }
}

/// Check `password` against a stored PHC hash. A mismatch is `Ok(false)`;
/// a hash that cannot be parsed is an error.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, CryptoError> {
    let parsed = PasswordHash::new(stored).map_err(|_| CryptoError::MalformedPasswordHash)?;
    match Pbkdf2.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(HashError::Password) => Ok(false),
        Err(_) => Err(CryptoError::MalformedPasswordHash),
    }
}
