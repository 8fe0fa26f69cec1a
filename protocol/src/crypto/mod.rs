//! # Cryptographic Primitives
//!
//! Everything that touches key material or digests flows through here.
//! Boring, audited building blocks only:
//!
//! - **Ed25519** for ledger signatures. The ledger decided that for us.
//! - **AES-256-GCM** for secrets at rest.
//! - **SHA-256** for transaction hashes and key derivation.
//! - **StrKey** for the human-facing `G...`/`S...` encodings.
//!
//! Nothing in this module logs. Nothing in this module should ever log.

pub mod encryption;
pub mod hash;
pub mod keys;
pub mod strkey;

pub use encryption::{decrypt, encrypt};
pub use hash::sha256;
pub use keys::LedgerKeypair;
