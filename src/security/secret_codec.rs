//! Symmetric protection for PACS passwords stored in the clinic table.
//!
//! Stored format is `<hex iv>:<hex ciphertext>`. A value without the `:`
//! delimiter has never been encrypted.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use sha2::{Digest, Sha256};
use thiserror::Error;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const DELIMITER: char = ':';

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("missing ':' delimiter")]
    MissingDelimiter,
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid iv length: expected 12 bytes, got {0}")]
    IvLength(usize),
    #[error("cipher failure")]
    Cipher,
    #[error("plaintext is not valid utf-8")]
    Utf8,
}

pub struct SecretCodec {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCodec").finish_non_exhaustive()
    }
}

impl SecretCodec {
    /// A passphrase of exactly 32 bytes is used as the key as-is; anything
    /// else is hashed down with SHA-256.
    pub fn new(passphrase: &str) -> Self {
        let bytes = passphrase.as_bytes();
        let mut key = [0u8; KEY_LEN];
        if bytes.len() == KEY_LEN {
            key.copy_from_slice(bytes);
        } else {
            key.copy_from_slice(&Sha256::digest(bytes));
        }
        Self { key }
    }

    /// Whether a stored value looks like codec output rather than plaintext.
    pub fn is_encrypted(value: &str) -> bool {
        match value.split_once(DELIMITER) {
            Some((iv, ct)) => {
                iv.len() == IV_LEN * 2
                    && !ct.is_empty()
                    && iv.chars().chain(ct.chars()).all(|c| c.is_ascii_hexdigit())
            }
            None => false,
        }
    }

    /// Returns `None` on internal failure. Empty input is returned unchanged.
    pub fn encrypt(&self, plaintext: &str) -> Option<String> {
        if plaintext.is_empty() {
            return Some(String::new());
        }
        match self.try_encrypt(plaintext) {
            Ok(out) => Some(out),
            Err(e) => {
                tracing::error!("Secret encryption failed: {}", e);
                None
            }
        }
    }

    /// Returns `None` when the value cannot be decrypted with this key.
    pub fn decrypt(&self, stored: &str) -> Option<String> {
        match self.try_decrypt(stored) {
            Ok(out) => Some(out),
            Err(e) => {
                tracing::warn!("Secret decryption failed: {}", e);
                None
            }
        }
    }

    fn cipher(&self) -> Result<Aes256Gcm, SecretError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|_| SecretError::Cipher)
    }

    fn try_encrypt(&self, plaintext: &str) -> Result<String, SecretError> {
        let iv: [u8; IV_LEN] = rand::random();
        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| SecretError::Cipher)?;
        Ok(format!("{}{}{}", hex::encode(iv), DELIMITER, hex::encode(ciphertext)))
    }

    fn try_decrypt(&self, stored: &str) -> Result<String, SecretError> {
        let (iv_hex, ct_hex) = stored
            .split_once(DELIMITER)
            .ok_or(SecretError::MissingDelimiter)?;
        let iv = hex::decode(iv_hex)?;
        if iv.len() != IV_LEN {
            return Err(SecretError::IvLength(iv.len()));
        }
        let ciphertext = hex::decode(ct_hex)?;
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
            .map_err(|_| SecretError::Cipher)?;
        String::from_utf8(plaintext).map_err(|_| SecretError::Utf8)
    }
}
