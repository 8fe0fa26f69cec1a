//! # Storage Module
//!
//! The workflow's memory. If it isn't in here, it didn't happen.
//!
//! ## Architecture
//!
//! ```text
//! records.rs — WineLot, TokenIssuance, Distribution, LotStatus
//! db.rs      — sled persistence with named trees and conditional updates
//! ```
//!
//! ## Design Decisions
//!
//! 1. **Append-only history.** Issuances and distributions are never
//!    overwritten by a newer attempt. "Latest" is the last key under the
//!    lot's prefix, so the audit trail costs nothing at read time.
//!
//! 2. **Status changes are compare-and-swap.** Reading the status and then
//!    writing it back is a race. Swapping the serialized row only if it is
//!    still byte-identical to what we read is not.
//!
//! 3. **Bincode on disk, JSON on the wire.** Same rule as always.

pub mod db;
pub mod records;

pub use db::{DbError, DbResult, TokenizationDb};
pub use records::{lot_key, Distribution, LotStatus, TokenIssuance, WineLot};
