//! Transaction construction.
//!
//! [`TransactionBuilder`] starts from a freshly loaded account snapshot,
//! takes the next sequence number, charges the base fee per operation and
//! stamps an expiry window. It does not sign; envelopes are signed by
//! whoever holds the key, which for emission is someone outside this
//! process entirely.

use std::time::Duration;

use chrono::Utc;

use super::client::LedgerError;
use super::types::{AccountRecord, Operation, TimeBounds, Transaction};
use crate::config::{BASE_FEE_STROOPS, MAX_OPERATIONS_PER_TX};

#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    source_account: String,
    sequence: i64,
    base_fee: u32,
    timeout: Option<Duration>,
    operations: Vec<Operation>,
}

impl TransactionBuilder {
    /// Builder for a transaction sourced from `account`.
    pub fn new(account: &AccountRecord) -> Self {
        Self {
            source_account: account.account_id.clone(),
            sequence: account.sequence.saturating_add(1),
            base_fee: BASE_FEE_STROOPS,
            timeout: None,
            operations: Vec::new(),
        }
    }

    pub fn base_fee(mut self, fee: u32) -> Self {
        self.base_fee = fee;
        self
    }

    pub fn add_operation(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    /// Expire the transaction `timeout` from now. Required before `build`.
    pub fn set_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Transaction, LedgerError> {
        if self.operations.is_empty() {
            return Err(LedgerError::InvalidTransaction(
                "transaction has no operations".into(),
            ));
        }
        if self.operations.len() > MAX_OPERATIONS_PER_TX {
            return Err(LedgerError::InvalidTransaction(format!(
                "transaction has {} operations (max {MAX_OPERATIONS_PER_TX})",
                self.operations.len()
            )));
        }
        let timeout = self.timeout.ok_or_else(|| {
            LedgerError::InvalidTransaction("transaction timeout not set".into())
        })?;

        let fee = u32::try_from(self.operations.len())
            .ok()
            .and_then(|n| n.checked_mul(self.base_fee))
            .ok_or_else(|| LedgerError::InvalidTransaction("fee overflow".into()))?;
        let now = Utc::now().timestamp().max(0) as u64;

        Ok(Transaction {
            source_account: self.source_account,
            fee,
            sequence: self.sequence,
            time_bounds: Some(TimeBounds {
                min_time: 0,
                max_time: now + timeout.as_secs(),
            }),
            operations: self.operations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::ledger::types::Asset;

    fn account() -> AccountRecord {
        AccountRecord {
            account_id: "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF".into(),
            sequence: 41,
            subentry_count: 0,
            balances: vec![],
        }
    }

    fn op() -> Operation {
        Operation::Payment {
            destination: "GD7777777777777777777777777777777777777777777777777773DB".into(),
            asset: Asset::Native,
            amount: Amount::from_stroops(1),
        }
    }

    #[test]
    fn test_build_uses_next_sequence_and_fee_per_op() {
        let tx = TransactionBuilder::new(&account())
            .add_operation(op())
            .add_operation(op())
            .set_timeout(Duration::from_secs(180))
            .build()
            .unwrap();
        assert_eq!(tx.sequence, 42);
        assert_eq!(tx.fee, 2 * BASE_FEE_STROOPS);
        let tb = tx.time_bounds.unwrap();
        let now = Utc::now().timestamp() as u64;
        assert!(tb.max_time >= now + 179 && tb.max_time <= now + 181);
    }

    #[test]
    fn test_build_requires_operations() {
        let err = TransactionBuilder::new(&account())
            .set_timeout(Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransaction(_)));
    }

    #[test]
    fn test_build_caps_operations() {
        let mut b = TransactionBuilder::new(&account()).set_timeout(Duration::from_secs(1));
        for _ in 0..=MAX_OPERATIONS_PER_TX {
            b = b.add_operation(op());
        }
        assert!(b.build().is_err());
    }

    #[test]
    fn test_build_requires_timeout() {
        assert!(TransactionBuilder::new(&account())
            .add_operation(op())
            .build()
            .is_err());
    }
}
