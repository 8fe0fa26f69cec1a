//! # Hashing
//!
//! SHA-256 is the only digest the ledger speaks: transaction hashes, network
//! ids, and our own master-key derivation all use it.

use sha2::{Digest, Sha256};

/// SHA-256 of `data` as a fixed-size array.
///
/// # Example
///
/// ```
/// use winefi_protocol::crypto::sha256;
///
/// let digest = sha256(b"Test SDF Network ; September 2015");
/// assert_eq!(digest.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over several slices without concatenating them first.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
