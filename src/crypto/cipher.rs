//! String-field cipher used for every sensitive patient column.
//!
//! Wire format: URL-safe base64 of `[nonce][ciphertext+tag]`. The empty
//! string maps to the empty string in both directions without touching
//! AES-GCM. Decryption never fails: bad input comes back as
//! [`Decrypted::Undecryptable`] so batch loops can skip the value.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Serialize, Serializer};

use super::{CryptoError, FieldKey, SealedField};

/// Text shown in place of a field that could not be decrypted.
pub const DECRYPTION_FAILED_MARKER: &str = "[Decryption Failed]";

/// Outcome of decrypting one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decrypted {
    Plain(String),
    /// Corrupt ciphertext or a key mismatch.
    Undecryptable,
}

impl Decrypted {
    pub fn as_plain(&self) -> Option<&str> {
        match self {
            Self::Plain(s) => Some(s),
            Self::Undecryptable => None,
        }
    }

    pub fn is_undecryptable(&self) -> bool {
        matches!(self, Self::Undecryptable)
    }
}

impl fmt::Display for Decrypted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(s) => f.write_str(s),
            Self::Undecryptable => f.write_str(DECRYPTION_FAILED_MARKER),
        }
    }
}

impl Serialize for Decrypted {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Process-wide field cipher. Built once from a validated key and passed by
/// reference to every component that touches ciphertext.
#[derive(Debug)]
pub struct FieldCipher {
    key: FieldKey,
}

impl FieldCipher {
    pub fn new(key: FieldKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &FieldKey {
        &self.key
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let sealed = self.key.seal(plaintext.as_bytes())?;
        Ok(URL_SAFE.encode(sealed.to_wire()))
    }

    /// Strict variant: distinguishes malformed input from key mismatch.
    pub fn try_decrypt(&self, token: &str) -> Result<String, CryptoError> {
        if token.is_empty() {
            return Ok(String::new());
        }
        let bytes = URL_SAFE
            .decode(token)
            .map_err(|_| CryptoError::MalformedCiphertext)?;
        let sealed = SealedField::from_wire(&bytes)?;
        let plain = self.key.open(&sealed)?;
        String::from_utf8(plain).map_err(|_| CryptoError::DecryptionFailed)
    }

    pub fn decrypt(&self, token: &str) -> Decrypted {
        match self.try_decrypt(token) {
            Ok(plain) => Decrypted::Plain(plain),
            Err(_) => Decrypted::Undecryptable,
        }
    }
}
