//! # TokenizationDb — Persistent Storage Engine
//!
//! Every lot, issuance and distribution the workflow produces ends up here,
//! in sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree               | Key                                   | Value                     |
//! |--------------------|---------------------------------------|---------------------------|
//! | `lots`             | `lot_id` (16B)                        | `bincode(WineLot)`        |
//! | `lot_keys`         | `ISSUER/CODE` (UTF-8)                 | `lot_id` (16B)            |
//! | `issuances`        | `lot_id ‖ created_ms (8B BE) ‖ id`    | `bincode(TokenIssuance)`  |
//! | `distributions`    | `lot_id ‖ created_ms (8B BE) ‖ id`    | `bincode(Distribution)`   |
//! | `distribution_log` | `distribution_ms (8B BE) ‖ id`        | key into `distributions`  |
//!
//! Timestamps are big-endian so sled's byte ordering is time ordering: the
//! newest issuance for a lot is simply the last key under its prefix.
//! Nothing is ever deleted.
//!
//! ## Concurrency
//!
//! Two requests racing on the same lot are settled by sled itself:
//!
//! - `(issuer, code)` uniqueness is a compare-and-swap on `lot_keys`
//!   from "absent" to the new id. One writer wins; the other gets
//!   [`DbError::Duplicate`].
//! - Status changes are a compare-and-swap of the whole serialized lot,
//!   retried only while the status still satisfies the caller's
//!   precondition. A loser re-reads, sees the new status, and gets
//!   [`DbError::InvalidTransition`].

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};
use tracing::debug;
use uuid::Uuid;

use super::records::{lot_key, Distribution, LotStatus, TokenIssuance, WineLot};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("lot {0} already exists")]
    Duplicate(String),

    /// The lot exists but its status doesn't allow the requested change.
    /// Carries the lot as it currently stands.
    #[error("lot {} is {}", .0.id, .0.status)]
    InvalidTransition(Box<WineLot>),

    #[error("status may not move backwards from {from} to {to}")]
    BackwardTransition { from: LotStatus, to: LotStatus },
}

pub type DbResult<T> = Result<T, DbError>;

fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn time_key(at: DateTime<Utc>) -> [u8; 8] {
    (at.timestamp_millis().max(0) as u64).to_be_bytes()
}

/// `lot_id ‖ created_ms ‖ record_id`
fn child_key(lot_id: &Uuid, at: DateTime<Utc>, record_id: &Uuid) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(lot_id.as_bytes());
    key.extend_from_slice(&time_key(at));
    key.extend_from_slice(record_id.as_bytes());
    key
}

// ---------------------------------------------------------------------------
// TokenizationDb
// ---------------------------------------------------------------------------

/// Persistent store for the tokenization workflow.
///
/// Cheap to clone: every clone shares the same sled handle, and sled trees
/// are safe for concurrent use.
#[derive(Debug, Clone)]
pub struct TokenizationDb {
    db: Db,
    lots: Tree,
    lot_keys: Tree,
    issuances: Tree,
    distributions: Tree,
    distribution_log: Tree,
}

impl TokenizationDb {
    /// Open (or create) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database that vanishes on drop. For tests and dry runs.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        Ok(Self {
            lots: db.open_tree("lots")?,
            lot_keys: db.open_tree("lot_keys")?,
            issuances: db.open_tree("issuances")?,
            distributions: db.open_tree("distributions")?,
            distribution_log: db.open_tree("distribution_log")?,
            db,
        })
    }

    // -- Lots ---------------------------------------------------------------

    /// Store a brand-new lot. Fails with [`DbError::Duplicate`] if its
    /// `(issuer, code)` pair is taken, even by a concurrent writer.
    pub fn insert_lot(&self, lot: &WineLot) -> DbResult<()> {
        let key = lot.natural_key();
        let id = lot.id.as_bytes().to_vec();

        let claimed = self
            .lot_keys
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(id.clone()))?;
        if claimed.is_err() {
            return Err(DbError::Duplicate(key));
        }

        let value = encode(lot)?;
        if let Err(e) = self.lots.insert(&id, value) {
            // Release the claim so the pair isn't orphaned.
            self.lot_keys.remove(key.as_bytes())?;
            return Err(e.into());
        }
        debug!(lot_id = %lot.id, key = %key, "lot stored");
        Ok(())
    }

    pub fn get_lot(&self, id: &Uuid) -> DbResult<Option<WineLot>> {
        match self.lots.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Look a lot up by its natural key. The code is matched upper-cased.
    pub fn find_lot(&self, issuer: &str, token_code: &str) -> DbResult<Option<WineLot>> {
        let key = lot_key(issuer, token_code);
        let Some(id) = self.lot_keys.get(key.as_bytes())? else {
            return Ok(None);
        };
        let id = Uuid::from_slice(&id).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.get_lot(&id)
    }

    /// Conditionally update a lot.
    ///
    /// Applies `mutate` only if the stored status is one of `allowed`, and
    /// commits only if nobody changed the row in between. Returns the lot as
    /// written. `mutate` may run more than once under contention.
    pub fn transition_lot<F>(&self, id: &Uuid, allowed: &[LotStatus], mutate: F) -> DbResult<WineLot>
    where
        F: Fn(&mut WineLot),
    {
        let key = id.as_bytes();
        loop {
            let current = self
                .lots
                .get(key)?
                .ok_or_else(|| DbError::NotFound(id.to_string()))?;
            let mut lot: WineLot = decode(&current)?;
            if !allowed.contains(&lot.status) {
                return Err(DbError::InvalidTransition(Box::new(lot)));
            }

            let from = lot.status;
            mutate(&mut lot);
            if lot.status.rank() < from.rank() {
                return Err(DbError::BackwardTransition {
                    from,
                    to: lot.status,
                });
            }
            lot.updated_at = Utc::now();

            let next = encode(&lot)?;
            match self.lots.compare_and_swap(key, Some(&current), Some(next))? {
                Ok(()) => {
                    debug!(lot_id = %id, from = %from, to = %lot.status, "lot updated");
                    return Ok(lot);
                }
                Err(_) => {
                    debug!(lot_id = %id, "lost update race, re-reading");
                    continue;
                }
            }
        }
    }

    pub fn lot_count(&self) -> usize {
        self.lots.len()
    }

    // -- Issuances ----------------------------------------------------------

    /// Append an issuance for its lot. The previous latest one, if still
    /// unconfirmed, is marked superseded. Returns the record as stored:
    /// `created_at` is nudged forward if needed so the new row sorts last.
    ///
    /// The lot must still accept emissions when the row is written. The
    /// status check and the writes share one sled transaction, so an
    /// emission that loses a race with `submit` leaves no row behind.
    pub fn append_issuance(&self, issuance: TokenIssuance) -> DbResult<TokenIssuance> {
        let mut issuance = issuance;
        let previous = self.latest_issuance_entry(&issuance.lot_id)?;
        if let Some((_, prev)) = &previous {
            if issuance.created_at <= prev.created_at {
                issuance.created_at = prev.created_at + Duration::milliseconds(1);
            }
        }
        let superseded = match previous {
            Some((prev_key, mut prev)) if !prev.is_confirmed() && prev.superseded_at.is_none() => {
                prev.superseded_at = Some(issuance.created_at);
                Some((prev_key, encode(&prev)?))
            }
            _ => None,
        };

        let lot_id = issuance.lot_id;
        let key = child_key(&lot_id, issuance.created_at, &issuance.id);
        let value = encode(&issuance)?;
        let outcome = (&self.lots, &self.issuances).transaction(|(lots, issuances)| {
            let Some(current) = lots.get(&lot_id.as_bytes()[..])? else {
                return Err(ConflictableTransactionError::Abort(DbError::NotFound(
                    lot_id.to_string(),
                )));
            };
            let lot: WineLot = decode(&current).map_err(ConflictableTransactionError::Abort)?;
            if !lot.status.can_emit() {
                return Err(ConflictableTransactionError::Abort(
                    DbError::InvalidTransition(Box::new(lot)),
                ));
            }
            if let Some((prev_key, prev_value)) = &superseded {
                issuances.insert(prev_key.clone(), prev_value.clone())?;
            }
            issuances.insert(key.clone(), value.clone())?;
            Ok(())
        });
        match outcome {
            Ok(()) => Ok(issuance),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(DbError::Sled(e)),
        }
    }

    /// The authoritative issuance for a lot: the newest one.
    pub fn latest_issuance(&self, lot_id: &Uuid) -> DbResult<Option<TokenIssuance>> {
        Ok(self.latest_issuance_entry(lot_id)?.map(|(_, issuance)| issuance))
    }

    fn latest_issuance_entry(&self, lot_id: &Uuid) -> DbResult<Option<(sled::IVec, TokenIssuance)>> {
        match self.issuances.scan_prefix(lot_id.as_bytes()).next_back() {
            Some(entry) => {
                let (key, value) = entry?;
                Ok(Some((key, decode(&value)?)))
            }
            None => Ok(None),
        }
    }

    /// The issuance that `tx_hash` confirmed on the ledger. This is what was
    /// actually emitted, whatever rows were appended after it.
    pub fn confirmed_issuance(
        &self,
        lot_id: &Uuid,
        tx_hash: &str,
    ) -> DbResult<Option<TokenIssuance>> {
        Ok(self
            .issuance_history(lot_id)?
            .into_iter()
            .rev()
            .find(|i| i.emission_tx_hash.as_deref() == Some(tx_hash)))
    }

    /// Every issuance for a lot, oldest first.
    fn issuance_history(&self, lot_id: &Uuid) -> DbResult<Vec<TokenIssuance>> {
        self.issuances
            .scan_prefix(lot_id.as_bytes())
            .map(|entry| {
                let (_, value) = entry?;
                decode(&value)
            })
            .collect()
    }

    /// Overwrite an existing issuance in place (confirmation fields).
    pub fn update_issuance(&self, issuance: &TokenIssuance) -> DbResult<()> {
        let key = child_key(&issuance.lot_id, issuance.created_at, &issuance.id);
        if !self.issuances.contains_key(&key)? {
            return Err(DbError::NotFound(issuance.id.to_string()));
        }
        self.issuances.insert(key, encode(issuance)?)?;
        Ok(())
    }

    // -- Distributions ------------------------------------------------------

    pub fn insert_distribution(&self, distribution: &Distribution) -> DbResult<()> {
        let key = child_key(
            &distribution.lot_id,
            distribution.distribution_at,
            &distribution.id,
        );
        let mut log_key = Vec::with_capacity(24);
        log_key.extend_from_slice(&time_key(distribution.distribution_at));
        log_key.extend_from_slice(distribution.id.as_bytes());

        self.distributions.insert(key.clone(), encode(distribution)?)?;
        self.distribution_log.insert(log_key, key)?;
        Ok(())
    }

    pub fn latest_distribution(&self, lot_id: &Uuid) -> DbResult<Option<Distribution>> {
        match self.distributions.scan_prefix(lot_id.as_bytes()).next_back() {
            Some(entry) => {
                let (_, value) = entry?;
                Ok(Some(decode(&value)?))
            }
            None => Ok(None),
        }
    }

    /// Distributions across all lots, newest first.
    pub fn list_distributions(&self, limit: usize, offset: usize) -> DbResult<Vec<Distribution>> {
        let mut out = Vec::with_capacity(limit.min(256));
        for entry in self.distribution_log.iter().rev().skip(offset).take(limit) {
            let (_, key) = entry?;
            let value = self
                .distributions
                .get(&key)?
                .ok_or_else(|| DbError::NotFound(hex::encode(&key)))?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    pub fn distribution_count(&self) -> usize {
        self.distribution_log.len()
    }

    // -- Maintenance --------------------------------------------------------

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
