// Copyright (c) 2026 WineFi. MIT License.
// See LICENSE for details.

//! # WineFi Protocol — Lot Tokenization Core
//!
//! This crate turns a physical lot of wine into a ledger asset and walks it
//! through a durable, resumable workflow:
//!
//! ```text
//! CREATED → TRUSTLINE_CREATED → EMISSION_PENDING → TOKENS_EMITTED → DISTRIBUTED
//! ```
//!
//! ## Architecture
//!
//! - **amount** — Fixed-point amounts and input guards. No floats cross the
//!   ledger boundary.
//! - **crypto** — AES-256-GCM, SHA-256, StrKey encoding, Ed25519 ledger keys.
//! - **vault** — Encryption of custodial secrets at rest.
//! - **ledger** — Typed ledger client facade: transactions, XDR envelopes,
//!   the Horizon adapter and an in-process sandbox ledger.
//! - **funding** — Gets a fresh custodial account onto the ledger.
//! - **storage** — sled-backed lots, issuances and distributions.
//! - **lifecycle** — The state machine that ties everything together.
//! - **config** — Protocol constants and the runtime configuration struct.
//!
//! ## Ground rules
//!
//! 1. Every monetary value is an integer number of stroops (10^-7 units).
//! 2. Status only moves forward, and only through a conditional update.
//! 3. A ledger submission failure never advances persisted state.

pub mod amount;
pub mod config;
pub mod crypto;
pub mod error;
pub mod funding;
pub mod ledger;
pub mod lifecycle;
pub mod storage;
pub mod vault;

pub use error::{TokenizationError, TokenizationResult};
