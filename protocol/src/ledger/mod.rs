//! # Ledger Client Facade
//!
//! A typed view of the distributed ledger: accounts, assets, transactions
//! and the envelopes that carry them between this service, external
//! signers, and the network.
//!
//! ```text
//! types.rs        — Asset, Operation, Transaction, TransactionEnvelope, AccountRecord
//! xdr.rs          — Conversion to and from the ledger's XDR envelopes and signature payloads
//! builder.rs      — Sequence, fee and expiry handling for new transactions
//! client.rs       — The LedgerClient trait and LedgerError
//! horizon.rs      — reqwest adapter for the Horizon REST API
//! sandbox.rs      — In-process ledger with the same trait, for tests
//! result_codes.rs — tx_*/op_* codes to human-readable messages
//! ```

pub mod builder;
pub mod client;
pub mod horizon;
pub mod result_codes;
pub mod sandbox;
pub mod types;
pub mod xdr;

pub use crate::config::Network;
pub use builder::TransactionBuilder;
pub use client::{LedgerClient, LedgerError, LedgerResult};
pub use horizon::HorizonClient;
pub use sandbox::SandboxLedger;
pub use types::{
    AccountRecord, Asset, BalanceLine, DecoratedSignature, Operation, ResultCodes, SubmitResult,
    TimeBounds, Transaction, TransactionEnvelope,
};
pub use xdr::XdrError;
