//! Ledger data types: assets, operations, transactions, envelopes, and the
//! account snapshots the client hands back.
//!
//! Account ids are kept as `G...` strings throughout. They are validated
//! when a transaction is encoded, which is the only point where the raw key
//! actually matters.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::{Deserialize, Serialize};

use super::xdr::{self, XdrError, XdrResult};
use crate::amount::Amount;
use crate::config::{Network, MAX_TOKEN_CODE_LENGTH};
use crate::crypto::hash::sha256;
use crate::crypto::keys::LedgerKeypair;
use crate::crypto::strkey;

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// An asset on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Asset {
    /// The network's native currency (fees and reserves are paid in it).
    Native,
    /// An issued asset, identified by `(code, issuer)`.
    Credit { code: String, issuer: String },
}

impl Asset {
    /// Build an issued asset, checking the code and issuer shape.
    pub fn credit(code: &str, issuer: &str) -> Result<Self, XdrError> {
        if !is_valid_asset_code(code) {
            return Err(XdrError::InvalidAssetCode(code.to_string()));
        }
        if !strkey::is_valid_account_id(issuer) {
            return Err(XdrError::InvalidAccountId(issuer.to_string()));
        }
        Ok(Asset::Credit {
            code: code.to_string(),
            issuer: issuer.to_string(),
        })
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }

    pub fn code(&self) -> &str {
        match self {
            Asset::Native => "native",
            Asset::Credit { code, .. } => code,
        }
    }

    pub fn issuer(&self) -> Option<&str> {
        match self {
            Asset::Native => None,
            Asset::Credit { issuer, .. } => Some(issuer),
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Asset::Native => f.write_str("native"),
            Asset::Credit { code, issuer } => write!(f, "{code}:{issuer}"),
        }
    }
}

/// 1 to 12 ASCII letters or digits.
pub fn is_valid_asset_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= MAX_TOKEN_CODE_LENGTH
        && code.bytes().all(|b| b.is_ascii_alphanumeric())
}

// ---------------------------------------------------------------------------
// Operations & Transactions
// ---------------------------------------------------------------------------

/// The three operations the tokenization workflow ever submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateAccount {
        destination: String,
        starting_balance: Amount,
    },
    Payment {
        destination: String,
        asset: Asset,
        amount: Amount,
    },
    ChangeTrust {
        asset: Asset,
        limit: Amount,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateAccount { .. } => "create_account",
            Operation::Payment { .. } => "payment",
            Operation::ChangeTrust { .. } => "change_trust",
        }
    }
}

/// Unix-seconds validity window. `max_time == 0` means "no expiry".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBounds {
    pub min_time: u64,
    pub max_time: u64,
}

/// An unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub source_account: String,
    /// Total fee in stroops (base fee × operation count).
    pub fee: u32,
    pub sequence: i64,
    pub time_bounds: Option<TimeBounds>,
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// Transaction hash under `network`: what gets signed and what the
    /// ledger reports back after inclusion.
    pub fn hash(&self, network: Network) -> XdrResult<[u8; 32]> {
        let network_id = sha256(network.passphrase().as_bytes());
        let payload = xdr::signature_payload(&network_id, self)?;
        Ok(sha256(&payload))
    }
}

/// A signature plus the hint identifying its signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoratedSignature {
    pub hint: [u8; 4],
    pub signature: Vec<u8>,
}

/// A transaction with zero or more signatures, ready to travel as base64 XDR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEnvelope {
    pub tx: Transaction,
    pub signatures: Vec<DecoratedSignature>,
}

impl TransactionEnvelope {
    pub fn unsigned(tx: Transaction) -> Self {
        Self {
            tx,
            signatures: Vec::new(),
        }
    }

    pub fn hash(&self, network: Network) -> XdrResult<[u8; 32]> {
        self.tx.hash(network)
    }

    pub fn hash_hex(&self, network: Network) -> XdrResult<String> {
        Ok(hex::encode(self.hash(network)?))
    }

    /// Append a signature from `signer`.
    pub fn sign(&mut self, signer: &LedgerKeypair, network: Network) -> XdrResult<()> {
        let hash = self.hash(network)?;
        self.signatures.push(DecoratedSignature {
            hint: signer.signature_hint(),
            signature: signer.sign(&hash).to_vec(),
        });
        Ok(())
    }

    pub fn to_xdr(&self) -> XdrResult<Vec<u8>> {
        xdr::encode_envelope(self)
    }

    pub fn to_xdr_base64(&self) -> XdrResult<String> {
        xdr::encode_envelope_base64(self)
    }

    pub fn from_xdr_base64(s: &str) -> XdrResult<Self> {
        let bytes = B64
            .decode(s.trim())
            .map_err(|e| XdrError::InvalidBase64(e.to_string()))?;
        xdr::decode_envelope(&bytes)
    }
}

// ---------------------------------------------------------------------------
// Account snapshots
// ---------------------------------------------------------------------------

/// One balance held by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceLine {
    pub asset: Asset,
    pub balance: Amount,
    /// Trustline limit. `None` for the native balance.
    pub limit: Option<Amount>,
}

/// An account as the ledger currently sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_id: String,
    pub sequence: i64,
    pub subentry_count: u32,
    pub balances: Vec<BalanceLine>,
}

impl AccountRecord {
    pub fn native_balance(&self) -> Amount {
        self.balance_of(&Asset::Native).unwrap_or(Amount::ZERO)
    }

    /// Balance of `asset`, or `None` when the account can't hold it.
    pub fn balance_of(&self, asset: &Asset) -> Option<Amount> {
        self.balances
            .iter()
            .find(|line| &line.asset == asset)
            .map(|line| line.balance)
    }

    pub fn has_trustline(&self, asset: &Asset) -> bool {
        asset.is_native() || self.balance_of(asset).is_some()
    }
}

// ---------------------------------------------------------------------------
// Submission results
// ---------------------------------------------------------------------------

/// What the ledger says after accepting a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub hash: String,
    pub ledger: Option<u32>,
}

/// Result codes from a rejected transaction, Horizon style.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCodes {
    pub transaction: String,
    #[serde(default)]
    pub operations: Vec<String>,
}

impl ResultCodes {
    pub fn tx(code: impl Into<String>) -> Self {
        Self {
            transaction: code.into(),
            operations: Vec::new(),
        }
    }

    pub fn with_operations(code: impl Into<String>, operations: Vec<String>) -> Self {
        Self {
            transaction: code.into(),
            operations,
        }
    }
}
