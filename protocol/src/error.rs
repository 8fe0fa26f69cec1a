//! # Tokenization Errors
//!
//! One taxonomy for everything the workflow can refuse to do. The per-concern
//! errors (`AmountError`, `VaultError`, `LedgerError`, `DbError`) fold into
//! [`TokenizationError`] at the lifecycle boundary.
//!
//! Each variant has a stable machine code ([`TokenizationError::kind`]) and
//! an HTTP status ([`TokenizationError::http_status`]). `Display` is the
//! human-readable message and is safe to show to a caller: no secrets, no
//! stack traces.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::amount::{Amount, AmountError};
use crate::ledger::{LedgerError, ResultCodes};
use crate::storage::{DbError, LotStatus};
use crate::vault::VaultError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TokenizationError {
    /// Missing or malformed input.
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("{0}")]
    InvalidAmount(String),

    #[error("Wine lot with this code already exists for this issuer")]
    DuplicateLot,

    #[error("Issuer account does not exist on Stellar network")]
    IssuerNotFound,

    #[error("Wine lot not found")]
    LotNotFound,

    /// The lot's current status doesn't allow the operation.
    #[error("{message}")]
    InvalidTransition {
        message: String,
        current: LotStatus,
        required: Option<LotStatus>,
        distribution_tx_hash: Option<String>,
        distributed_at: Option<DateTime<Utc>>,
    },

    /// Issuer can't cover fee plus safety margin.
    #[error("Insufficient balance")]
    InsufficientBalance { current: Amount, required: Amount },

    #[error("{message}")]
    InsufficientTokenBalance {
        message: String,
        available: Option<Amount>,
        required: Amount,
    },

    #[error("Account funding is unavailable: no funding key configured and no faucet for this network")]
    FundingUnavailable,

    #[error("PLATFORM_FUNDING_SECRET_KEY is required to create accounts on the public network")]
    FundingRequired,

    #[error("Failed to fund distribution account: {0}")]
    FundingFailed(String),

    #[error("{label} account is missing trustline for {code}.")]
    MissingTrustline { label: String, code: String },

    #[error("{label} payout address is required: {amount} {code} would otherwise go undistributed")]
    MissingPayoutAddress {
        label: String,
        code: String,
        amount: Amount,
    },

    #[error("No distribution operations to execute")]
    NoPayableAmount,

    #[error("No pending issuance found for wine lot")]
    NoPendingIssuance,

    /// The ledger refused the transaction. `message` is the composite
    /// description of `codes` when there are any.
    #[error("{message}")]
    TransactionRejected {
        message: String,
        codes: Option<ResultCodes>,
    },

    #[error("Failed to decrypt distribution key: {0}")]
    Decryption(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("{0}")]
    Configuration(String),
}

pub type TokenizationResult<T> = Result<T, TokenizationError>;

impl TokenizationError {
    pub fn validation(message: impl Into<String>) -> Self {
        TokenizationError::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        TokenizationError::TransactionRejected {
            message: message.into(),
            codes: None,
        }
    }

    /// Stable snake-case machine code.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenizationError::Validation { .. } => "validation_error",
            TokenizationError::InvalidAmount(_) => "invalid_amount",
            TokenizationError::DuplicateLot => "duplicate_lot",
            TokenizationError::IssuerNotFound => "issuer_not_found",
            TokenizationError::LotNotFound => "lot_not_found",
            TokenizationError::InvalidTransition { .. } => "invalid_transition",
            TokenizationError::InsufficientBalance { .. } => "insufficient_balance",
            TokenizationError::InsufficientTokenBalance { .. } => "insufficient_token_balance",
            TokenizationError::FundingUnavailable => "funding_unavailable",
            TokenizationError::FundingRequired => "funding_required",
            TokenizationError::FundingFailed(_) => "funding_failed",
            TokenizationError::MissingTrustline { .. } => "missing_trustline",
            TokenizationError::MissingPayoutAddress { .. } => "missing_payout_address",
            TokenizationError::NoPayableAmount => "no_payable_amount",
            TokenizationError::NoPendingIssuance => "no_pending_issuance",
            TokenizationError::TransactionRejected { .. } => "transaction_rejected",
            TokenizationError::Decryption(_) => "decryption_error",
            TokenizationError::Persistence(_) => "persistence_error",
            TokenizationError::Ledger(_) => "ledger_error",
            TokenizationError::Configuration(_) => "configuration_error",
        }
    }

    /// Caller mistakes are 4xx, our own trouble is 500.
    pub fn http_status(&self) -> u16 {
        match self {
            TokenizationError::LotNotFound => 404,
            TokenizationError::FundingUnavailable
            | TokenizationError::FundingRequired
            | TokenizationError::FundingFailed(_)
            | TokenizationError::Decryption(_)
            | TokenizationError::Persistence(_)
            | TokenizationError::Ledger(_)
            | TokenizationError::Configuration(_) => 500,
            _ => 400,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.http_status() >= 500
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<AmountError> for TokenizationError {
    fn from(e: AmountError) -> Self {
        match e {
            AmountError::InvalidAmount { .. } => TokenizationError::InvalidAmount(e.to_string()),
            AmountError::Validation { ref field, .. } => TokenizationError::Validation {
                field: Some(field.clone()),
                message: e.to_string(),
            },
        }
    }
}

impl From<VaultError> for TokenizationError {
    fn from(e: VaultError) -> Self {
        TokenizationError::Decryption(e.to_string())
    }
}

impl From<DbError> for TokenizationError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Duplicate(_) => TokenizationError::DuplicateLot,
            DbError::InvalidTransition(lot) => TokenizationError::InvalidTransition {
                message: format!("Wine lot is {}", lot.status),
                current: lot.status,
                required: None,
                distribution_tx_hash: lot.distribution_tx_hash.clone(),
                distributed_at: lot.distributed_at,
            },
            other => TokenizationError::Persistence(other.to_string()),
        }
    }
}

impl From<LedgerError> for TokenizationError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Rejected { codes, detail } => TokenizationError::TransactionRejected {
                message: detail,
                codes,
            },
            LedgerError::Xdr(e) => {
                TokenizationError::rejected(format!("Invalid transaction envelope: {e}"))
            }
            LedgerError::InvalidTransaction(msg) => TokenizationError::rejected(msg),
            LedgerError::FaucetUnavailable(_) => TokenizationError::FundingUnavailable,
            LedgerError::FaucetFailed { .. } => TokenizationError::FundingFailed(e.to_string()),
            other => TokenizationError::Ledger(other.to_string()),
        }
    }
}
