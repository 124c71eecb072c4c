pub mod keys;
pub mod encryption;
pub mod cipher;
pub mod password;
mod phi_audit;

pub use keys::*;
pub use encryption::*;
pub use cipher::*;
pub use password::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("Malformed ciphertext")]
    MalformedCiphertext,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Malformed password hash")]
    MalformedPasswordHash,

    #[error("Password hashing failed")]
    HashingFailed,
}
