//! Sealing of secrets stored in the database (camera passwords).
//!
//! AES-256-GCM with a key derived as SHA-256 of the daemon secret. Sealed
//! layout is `nonce (12 bytes) || ciphertext+tag`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret key setup failed")]
    Key,
    #[error("sealing failed")]
    Seal,
    #[error("sealed value is truncated")]
    Truncated,
    #[error("sealed value could not be opened (wrong key or tampered)")]
    Open,
}

#[derive(Clone)]
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBox(..)")
    }
}

impl SecretBox {
    pub fn new(secret: &str) -> Result<Self, SecretError> {
        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| SecretError::Key)?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SecretError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| SecretError::Seal)?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SecretError> {
        if sealed.len() <= NONCE_LEN {
            return Err(SecretError::Truncated);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecretError::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let sb = SecretBox::new("daemon-secret").unwrap();
        let sealed = sb.seal(b"camera-pass").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"camera-pass");
        assert_eq!(sb.open(&sealed).unwrap(), b"camera-pass");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = SecretBox::new("one").unwrap().seal(b"x").unwrap();
        assert!(matches!(
            SecretBox::new("two").unwrap().open(&sealed),
            Err(SecretError::Open)
        ));
    }

    #[test]
    fn test_truncated_input() {
        let sb = SecretBox::new("k").unwrap();
        assert!(matches!(sb.open(&[0u8; 5]), Err(SecretError::Truncated)));
    }
}
