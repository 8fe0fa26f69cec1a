//! # Secret Vault — Custodial Keys at Rest
//!
//! Each lot owns a distribution account, and the platform holds its secret.
//! The vault makes sure that secret is never stored in clear form:
//!
//! ```text
//! "S..." ──encrypt──▶ base64( nonce(12B) || AES-256-GCM(ciphertext || tag) )
//! ```
//!
//! ## Master key
//!
//! Built once from the operator-provided master secret. If the secret is
//! exactly 32 bytes it is used as-is; anything else is hashed with SHA-256
//! to get a key of the right size. The vault itself is read-only after
//! construction and safe to share behind an `Arc`.
//!
//! ## Decryption is paranoid
//!
//! A blob that decrypts is not automatically a valid seed. After the AEAD
//! check we also demand the plaintext is UTF-8, starts with `S` and is
//! exactly 56 characters. No trimming, no padding, no "close enough". A
//! wrong master key or a corrupted row fails loudly here, not three calls
//! later as a mysterious `tx_bad_auth`.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use std::fmt;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, SECRET_SEED_LENGTH};
use crate::crypto::encryption::{self, EncryptionError};
use crate::crypto::hash::sha256;
use crate::crypto::keys::{KeyError, LedgerKeypair};

/// Everything that can go wrong turning a stored blob back into a seed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    #[error("master encryption key is empty")]
    MissingMasterKey,

    #[error("encrypted secret must be a non-empty string")]
    Empty,

    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(String),

    #[error("encrypted data too short: {0} bytes (expected at least {AES_NONCE_LENGTH} for the nonce)")]
    TooShort(usize),

    #[error("encrypted data is empty after extracting the nonce")]
    EmptyCiphertext,

    #[error("decryption failed; this may indicate an ENCRYPTION_KEY mismatch")]
    Authentication,

    #[error("encryption failed")]
    Encryption,

    #[error("decrypted data is not valid UTF-8")]
    InvalidUtf8,

    #[error("decrypted secret does not start with 'S'; this may indicate corruption or a wrong encryption key")]
    InvalidPrefix,

    #[error("decrypted secret has invalid length: {0} (expected {SECRET_SEED_LENGTH})")]
    InvalidLength(usize),

    #[error("decrypted secret is not a valid seed: {0}")]
    InvalidSecret(KeyError),
}

/// Symmetric vault for custodial seeds.
#[derive(Clone)]
pub struct SecretVault {
    key: [u8; AES_KEY_LENGTH],
}

impl SecretVault {
    /// Derive the vault key from the master secret.
    pub fn new(master_secret: &str) -> Result<Self, VaultError> {
        if master_secret.is_empty() {
            return Err(VaultError::MissingMasterKey);
        }
        let bytes = master_secret.as_bytes();
        let key = if bytes.len() == AES_KEY_LENGTH {
            let mut k = [0u8; AES_KEY_LENGTH];
            k.copy_from_slice(bytes);
            k
        } else {
            sha256(bytes)
        };
        Ok(Self { key })
    }

    /// Encrypt a secret. Non-deterministic: a fresh nonce every call.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let sealed = encryption::encrypt(&self.key, plaintext.as_bytes())
            .map_err(|_| VaultError::Encryption)?;
        Ok(B64.encode(sealed))
    }

    /// Decrypt and validate a stored seed.
    pub fn decrypt(&self, blob: &str) -> Result<String, VaultError> {
        if blob.is_empty() {
            return Err(VaultError::Empty);
        }
        let bytes = B64
            .decode(blob)
            .map_err(|e| VaultError::InvalidBase64(e.to_string()))?;
        if bytes.len() < AES_NONCE_LENGTH {
            return Err(VaultError::TooShort(bytes.len()));
        }
        if bytes.len() == AES_NONCE_LENGTH {
            return Err(VaultError::EmptyCiphertext);
        }

        let plaintext = encryption::decrypt(&self.key, &bytes).map_err(|e| match e {
            EncryptionError::CiphertextTooShort(n) => VaultError::TooShort(n),
            _ => VaultError::Authentication,
        })?;
        let secret = String::from_utf8(plaintext).map_err(|_| VaultError::InvalidUtf8)?;

        if !secret.starts_with('S') {
            return Err(VaultError::InvalidPrefix);
        }
        if secret.len() != SECRET_SEED_LENGTH {
            return Err(VaultError::InvalidLength(secret.len()));
        }
        Ok(secret)
    }

    /// Decrypt straight into a signing keypair.
    pub fn decrypt_keypair(&self, blob: &str) -> Result<LedgerKeypair, VaultError> {
        let secret = self.decrypt(blob)?;
        LedgerKeypair::from_secret(&secret).map_err(VaultError::InvalidSecret)
    }
}

impl fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretVault { key: <redacted> }")
    }
}
