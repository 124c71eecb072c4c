use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::CryptoError;
use super::encryption::SealedField;

pub const KEY_LENGTH: usize = 32; // AES-256

/// Field encryption key, zeroed on drop.
///
/// Encoded for config files as URL-safe base64 of the 32 raw bytes.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct FieldKey {
    key_bytes: [u8; KEY_LENGTH],
}

impl FieldKey {
    /// Fresh random key from the OS RNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key_bytes = [0u8; KEY_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut key_bytes);
        Self { key_bytes }
    }

    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key_bytes: bytes }
    }

    /// Parse a base64-encoded key, rejecting anything that is not exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let mut decoded = URL_SAFE
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        if decoded.len() != KEY_LENGTH {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidKey(format!(
                "expected {KEY_LENGTH} bytes, got {len}"
            )));
        }
        let mut key_bytes = [0u8; KEY_LENGTH];
        key_bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self { key_bytes })
    }

    pub fn to_base64(&self) -> String {
        URL_SAFE.encode(self.key_bytes)
    }

    pub fn seal(&self, value: &[u8]) -> Result<SealedField, CryptoError> {
        SealedField::seal(&self.key_bytes, value)
    }

    pub fn open(&self, sealed: &SealedField) -> Result<Vec<u8>, CryptoError> {
        sealed.open(&self.key_bytes)
    }
}

impl std::fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FieldKey(..)")
    }
}
