use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use super::keys::KEY_LENGTH;
use super::CryptoError;

pub const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// One sealed field value: a fresh 96-bit nonce and the AES-256-GCM output
/// (ciphertext with the tag appended).
///
/// Wire layout is `nonce || sealed`, which is what gets base64-encoded into
/// a patient column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedField {
    nonce: [u8; NONCE_LENGTH],
    sealed: Vec<u8>,
}

fn aead(key_bytes: &[u8; KEY_LENGTH]) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes))
}

impl SealedField {
    pub(crate) fn seal(key_bytes: &[u8; KEY_LENGTH], value: &[u8]) -> Result<Self, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = aead(key_bytes)
            .encrypt(&nonce, value)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut fixed = [0u8; NONCE_LENGTH];
        fixed.copy_from_slice(&nonce);
        Ok(Self { nonce: fixed, sealed })
    }

    /// Authenticate and decrypt. Any tag mismatch (wrong key, edited bytes)
    /// is `DecryptionFailed`.
    pub(crate) fn open(&self, key_bytes: &[u8; KEY_LENGTH]) -> Result<Vec<u8>, CryptoError> {
        aead(key_bytes)
            .decrypt(Nonce::from_slice(&self.nonce), self.sealed.as_slice())
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    pub fn to_wire(&self) -> Vec<u8> {
        [self.nonce.as_slice(), self.sealed.as_slice()].concat()
    }

    /// Split a wire value. Anything too short to hold a nonce and a tag is
    /// malformed rather than a key mismatch.
    pub fn from_wire(wire: &[u8]) -> Result<Self, CryptoError> {
        if wire.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptoError::MalformedCiphertext);
        }
        let (nonce, sealed) = wire.split_at(NONCE_LENGTH);
        let mut fixed = [0u8; NONCE_LENGTH];
        fixed.copy_from_slice(nonce);
        Ok(Self {
            nonce: fixed,
            sealed: sealed.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::FieldKey;

    #[test]
    fn sealed_value_opens_with_same_key() {
        let key = FieldKey::generate();
        let sealed = key.seal(b"1980-01-01").unwrap();
        assert_eq!(key.open(&sealed).unwrap(), b"1980-01-01");
    }

    #[test]
    fn other_key_cannot_open() {
        let sealed = FieldKey::generate().seal(b"Lee").unwrap();
        let err = FieldKey::generate().open(&sealed).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed));
    }

    #[test]
    fn edited_wire_bytes_fail_authentication() {
        let key = FieldKey::generate();
        let mut wire = key.seal(b"Female").unwrap().to_wire();
        let last = wire.len() - 1;
        wire[last] ^= 0x01;
        let edited = SealedField::from_wire(&wire).unwrap();
        assert!(matches!(key.open(&edited), Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn wire_shorter_than_nonce_and_tag_is_malformed() {
        let err = SealedField::from_wire(&[0u8; NONCE_LENGTH + TAG_LENGTH - 1]).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedCiphertext));
        // An empty message still carries a full tag.
        let key = FieldKey::generate();
        assert_eq!(key.seal(b"").unwrap().to_wire().len(), NONCE_LENGTH + TAG_LENGTH);
    }

    #[test]
    fn each_seal_uses_a_fresh_nonce() {
        let key = FieldKey::generate();
        let a = key.seal(b"Ann").unwrap();
        let b = key.seal(b"Ann").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.to_wire(), b.to_wire());
    }
}
