//! The ledger client seam.
//!
//! Everything the workflow needs from the outside world fits in one small
//! trait. Production binds [`HorizonClient`](super::horizon::HorizonClient)
//! at startup; tests bind [`SandboxLedger`](super::sandbox::SandboxLedger).
//! Nothing downstream knows or cares which one it got.

use async_trait::async_trait;
use thiserror::Error;

use super::result_codes;
use super::types::{AccountRecord, ResultCodes, SubmitResult, TransactionEnvelope};
use super::xdr::XdrError;
use crate::config::Network;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// The ledger looked at the transaction and said no.
    #[error("{detail}")]
    Rejected {
        codes: Option<ResultCodes>,
        detail: String,
    },

    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("unexpected ledger response: {0}")]
    UnexpectedResponse(String),

    #[error("malformed transaction envelope: {0}")]
    Xdr(#[from] XdrError),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("no faucet available on {0}")]
    FaucetUnavailable(Network),

    #[error("faucet funding failed: {status} {body}")]
    FaucetFailed { status: u16, body: String },
}

impl LedgerError {
    /// Rejection carrying result codes; the message is the composite
    /// description.
    pub fn rejected(codes: ResultCodes) -> Self {
        LedgerError::Rejected {
            detail: result_codes::describe(&codes),
            codes: Some(codes),
        }
    }

    pub fn result_codes(&self) -> Option<&ResultCodes> {
        match self {
            LedgerError::Rejected { codes, .. } => codes.as_ref(),
            _ => None,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Typed access to the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Network the client is bound to. Decides the signing passphrase.
    fn network(&self) -> Network;

    /// Current snapshot of an account. `AccountNotFound` if it doesn't
    /// exist (yet).
    async fn load_account(&self, account_id: &str) -> LedgerResult<AccountRecord>;

    async fn account_exists(&self, account_id: &str) -> LedgerResult<bool> {
        match self.load_account(account_id).await {
            Ok(_) => Ok(true),
            Err(LedgerError::AccountNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Relay a signed envelope. Never retried here; the caller rebuilds and
    /// resubmits explicitly.
    async fn submit(&self, envelope: &TransactionEnvelope) -> LedgerResult<SubmitResult>;

    /// Ask the network's faucet to create and fund `account_id`.
    async fn request_faucet_funding(&self, account_id: &str) -> LedgerResult<()>;
}
