//! # AES-256-GCM Encryption
//!
//! Authenticated encryption for custodial secrets. AEAD means a flipped bit
//! anywhere in the blob is caught at decrypt time instead of turning into a
//! subtly wrong signing key.
//!
//! ## Nonce management
//!
//! Random 96-bit nonces from the OS CSPRNG, one per call. Nonce reuse under
//! GCM leaks the XOR of plaintexts and lets an attacker forge tags, so we
//! never derive nonces from anything predictable.
//!
//! ## Wire format
//!
//! `encrypt()` returns `nonce || ciphertext || tag`. The first 12 bytes are
//! the nonce; `decrypt()` expects exactly that layout.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH};

/// Errors from the cipher layer.
///
/// Deliberately coarse. "Wrong key" and "tampered ciphertext" look the same
/// from here, and that's the point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("ciphertext too short: {0} bytes (expected at least {AES_NONCE_LENGTH})")]
    CiphertextTooShort(usize),
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// # Example
///
/// ```
/// use winefi_protocol::crypto::encryption::{encrypt, decrypt};
///
/// let key = [0x42u8; 32];
/// let sealed = encrypt(&key, b"SABC...").unwrap();
/// assert_eq!(decrypt(&key, &sealed).unwrap(), b"SABC...");
/// ```
pub fn encrypt(key: &[u8; AES_KEY_LENGTH], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a blob produced by [`encrypt`].
pub fn decrypt(key: &[u8; AES_KEY_LENGTH], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < AES_NONCE_LENGTH {
        return Err(EncryptionError::CiphertextTooShort(data.len()));
    }

    let (nonce_bytes, ciphertext) = data.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| EncryptionError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AES_TAG_LENGTH;

    #[test]
    fn test_roundtrip() {
        let key = [7u8; 32];
        let sealed = encrypt(&key, b"secret seed").unwrap();
        assert_eq!(
            sealed.len(),
            AES_NONCE_LENGTH + b"secret seed".len() + AES_TAG_LENGTH
        );
        assert_eq!(decrypt(&key, &sealed).unwrap(), b"secret seed");
    }

    #[test]
    fn test_nonces_differ() {
        let key = [7u8; 32];
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();
        assert_ne!(a, b);
        assert_ne!(a[..AES_NONCE_LENGTH], b[..AES_NONCE_LENGTH]);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt(&[1u8; 32], b"payload").unwrap();
        assert_eq!(
            decrypt(&[2u8; 32], &sealed),
            Err(EncryptionError::DecryptFailed)
        );
    }

    #[test]
    fn test_tampering_detected() {
        let key = [3u8; 32];
        let mut sealed = encrypt(&key, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(decrypt(&key, &sealed).is_err());
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            decrypt(&[0u8; 32], &[0u8; 5]),
            Err(EncryptionError::CiphertextTooShort(5))
        );
    }
}
