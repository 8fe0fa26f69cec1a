//! # StrKey Encoding
//!
//! The ledger's human-facing key format: a version byte, the 32-byte key,
//! and a CRC16-XModem checksum, all in unpadded base32. The codec itself is
//! `stellar-strkey`; this module pins down the two kinds the workflow uses
//! and turns the crate's single "invalid" error into something a caller can
//! report.
//!
//! The version byte makes the first character predictable: account ids
//! start with `G`, secret seeds with `S`. That's the only reason the vault
//! can sanity-check a decrypted seed without parsing it.

use stellar_strkey::{ed25519, Strkey};
use thiserror::Error;

/// 35 bytes of base32, no padding.
pub const ENCODED_LENGTH: usize = 56;

pub const ACCOUNT_ID_PREFIX: char = 'G';
pub const SEED_PREFIX: char = 'S';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrKeyError {
    #[error("invalid length: {0} (expected {ENCODED_LENGTH})")]
    InvalidLength(usize),

    #[error("wrong key kind: expected {expected}..., found {found}...")]
    WrongKind { expected: char, found: char },

    /// Bad base32 or a checksum mismatch.
    #[error("malformed key encoding")]
    Malformed,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Encode a public key as a `G...` account id.
pub fn encode_account_id(key: &[u8; 32]) -> String {
    Strkey::PublicKeyEd25519(ed25519::PublicKey(*key)).to_string()
}

/// Decode a `G...` account id to raw public key bytes.
pub fn decode_account_id(s: &str) -> Result<[u8; 32], StrKeyError> {
    match decode(s, ACCOUNT_ID_PREFIX)? {
        Strkey::PublicKeyEd25519(key) => Ok(key.0),
        _ => Err(StrKeyError::Malformed),
    }
}

/// Encode an Ed25519 seed as an `S...` secret.
pub fn encode_seed(seed: &[u8; 32]) -> String {
    Strkey::PrivateKeyEd25519(ed25519::PrivateKey(*seed)).to_string()
}

/// Decode an `S...` secret to the raw seed.
pub fn decode_seed(s: &str) -> Result<[u8; 32], StrKeyError> {
    match decode(s, SEED_PREFIX)? {
        Strkey::PrivateKeyEd25519(key) => Ok(key.0),
        _ => Err(StrKeyError::Malformed),
    }
}

/// Cheap structural check for request validation.
pub fn is_valid_account_id(s: &str) -> bool {
    decode_account_id(s).is_ok()
}

fn decode(s: &str, prefix: char) -> Result<Strkey, StrKeyError> {
    if s.len() != ENCODED_LENGTH {
        return Err(StrKeyError::InvalidLength(s.len()));
    }
    let found = s.chars().next().unwrap_or_default();
    if found != prefix {
        return Err(StrKeyError::WrongKind {
            expected: prefix,
            found,
        });
    }
    Strkey::from_string(s).map_err(|_| StrKeyError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_ACCOUNT: &str = "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF";
    const ZERO_SEED: &str = "SAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAABSU2";
    const FF_ACCOUNT: &str = "GD7777777777777777777777777777777777777777777777777773DB";

    #[test]
    fn test_known_vectors() {
        assert_eq!(encode_account_id(&[0u8; 32]), ZERO_ACCOUNT);
        assert_eq!(encode_seed(&[0u8; 32]), ZERO_SEED);
        assert_eq!(encode_account_id(&[0xffu8; 32]), FF_ACCOUNT);
    }

    #[test]
    fn test_decode_known_vectors() {
        assert_eq!(decode_account_id(ZERO_ACCOUNT).unwrap(), [0u8; 32]);
        assert_eq!(decode_seed(ZERO_SEED).unwrap(), [0u8; 32]);
        assert_eq!(decode_account_id(FF_ACCOUNT).unwrap(), [0xffu8; 32]);
    }

    #[test]
    fn test_prefixes() {
        let key = [0x5au8; 32];
        assert!(encode_account_id(&key).starts_with(ACCOUNT_ID_PREFIX));
        assert!(encode_seed(&key).starts_with(SEED_PREFIX));
        assert_eq!(encode_seed(&key).len(), ENCODED_LENGTH);
    }

    #[test]
    fn test_kind_mismatch() {
        assert_eq!(
            decode_account_id(ZERO_SEED),
            Err(StrKeyError::WrongKind {
                expected: 'G',
                found: 'S'
            })
        );
        assert!(matches!(
            decode_seed(ZERO_ACCOUNT),
            Err(StrKeyError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_checksum_detects_typo() {
        let mut typo = ZERO_ACCOUNT.to_string();
        typo.replace_range(10..11, "B");
        assert_eq!(decode_account_id(&typo), Err(StrKeyError::Malformed));
    }

    #[test]
    fn test_bad_shapes() {
        assert_eq!(
            decode_account_id("GABC"),
            Err(StrKeyError::InvalidLength(4))
        );
        let mut lower = ZERO_ACCOUNT.to_lowercase();
        lower.replace_range(0..1, "G");
        assert_eq!(decode_account_id(&lower), Err(StrKeyError::Malformed));
        assert!(!is_valid_account_id("not-an-account"));
        assert!(is_valid_account_id(ZERO_ACCOUNT));
    }
}
