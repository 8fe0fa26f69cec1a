//! # Ledger Keys
//!
//! Ed25519 keypairs in the ledger's own clothing: `G...` account ids on the
//! outside, raw 32-byte keys on the inside.
//!
//! Every lot gets a fresh custodial keypair for its distribution account.
//! The secret half exists in clear form for exactly two moments: right after
//! generation (long enough to be encrypted) and right before signing (long
//! enough to sign). See the `vault` module for everything in between.
//!
//! ## Security considerations
//!
//! - Keys come from `OsRng`.
//! - `LedgerKeypair` has no `Serialize` impl and a redacted `Debug`.
//!   Exporting the seed is an explicit call to [`LedgerKeypair::secret`].

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use super::strkey::{self, StrKeyError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid secret seed: {0}")]
    InvalidSecret(StrKeyError),

    #[error("invalid account id: {0}")]
    InvalidAccountId(StrKeyError),

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// A ledger signing keypair.
///
/// # Examples
///
/// ```
/// use winefi_protocol::crypto::keys::LedgerKeypair;
///
/// let kp = LedgerKeypair::random();
/// assert!(kp.public_key().starts_with('G'));
/// let restored = LedgerKeypair::from_secret(&kp.secret()).unwrap();
/// assert_eq!(restored.public_key(), kp.public_key());
/// ```
pub struct LedgerKeypair {
    signing_key: SigningKey,
}

impl LedgerKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn random() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a raw seed. Tests and fixtures only want
    /// this; production keys come from [`random`](Self::random).
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parse an `S...` secret seed.
    pub fn from_secret(secret: &str) -> Result<Self, KeyError> {
        let seed = strkey::decode_seed(secret).map_err(KeyError::InvalidSecret)?;
        Ok(Self::from_seed(&seed))
    }

    /// `G...` account id.
    pub fn public_key(&self) -> String {
        strkey::encode_account_id(&self.public_key_bytes())
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// `S...` secret seed. Handle with care; it goes straight to the vault.
    pub fn secret(&self) -> String {
        strkey::encode_seed(&self.signing_key.to_bytes())
    }

    /// Sign arbitrary bytes (in practice: a 32-byte transaction hash).
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Last four bytes of the public key. The ledger uses this to match a
    /// decorated signature to a signer without trying every key.
    pub fn signature_hint(&self) -> [u8; 4] {
        signature_hint_of(&self.public_key_bytes())
    }
}

impl fmt::Debug for LedgerKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerKeypair")
            .field("public_key", &self.public_key())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Hint for an arbitrary public key.
pub fn signature_hint_of(public_key: &[u8; 32]) -> [u8; 4] {
    let mut hint = [0u8; 4];
    hint.copy_from_slice(&public_key[28..]);
    hint
}

/// Verify `signature` over `message` against a raw public key.
///
/// Malformed keys or signatures simply fail verification.
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> bool {
    let Ok(vk) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    vk.verify(message, &sig).is_ok()
}

/// Verify against a `G...` account id.
pub fn verify_account(
    account_id: &str,
    message: &[u8],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let bytes = strkey::decode_account_id(account_id).map_err(KeyError::InvalidAccountId)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
    Ok(verify(&bytes, message, signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_keys_are_distinct() {
        let a = LedgerKeypair::random();
        let b = LedgerKeypair::random();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_secret_roundtrip() {
        let kp = LedgerKeypair::random();
        let secret = kp.secret();
        assert!(secret.starts_with('S'));
        assert_eq!(secret.len(), 56);
        let restored = LedgerKeypair::from_secret(&secret).unwrap();
        assert_eq!(restored.public_key_bytes(), kp.public_key_bytes());
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = LedgerKeypair::from_seed(&[9u8; 32]);
        let sig = kp.sign(b"tx hash");
        assert!(verify(&kp.public_key_bytes(), b"tx hash", &sig));
        assert!(!verify(&kp.public_key_bytes(), b"other", &sig));
        assert!(verify_account(&kp.public_key(), b"tx hash", &sig).unwrap());
    }

    #[test]
    fn test_hint_is_key_suffix() {
        let kp = LedgerKeypair::from_seed(&[1u8; 32]);
        let pk = kp.public_key_bytes();
        assert_eq!(kp.signature_hint(), [pk[28], pk[29], pk[30], pk[31]]);
    }

    #[test]
    fn test_from_secret_rejects_account_id() {
        let kp = LedgerKeypair::random();
        assert!(matches!(
            LedgerKeypair::from_secret(&kp.public_key()),
            Err(KeyError::InvalidSecret(_))
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let kp = LedgerKeypair::random();
        let rendered = format!("{kp:?}");
        assert!(!rendered.contains(&kp.secret()));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_verify_garbage_signature() {
        let kp = LedgerKeypair::random();
        assert!(!verify(&kp.public_key_bytes(), b"m", &[0u8; 3]));
    }
}
