//! # XDR Boundary
//!
//! Converts the typed facade in [`super::types`] to and from the ledger's
//! canonical wire types (`stellar-xdr`, `curr` schema). The crate owns the
//! byte layout; this module owns which slice of it we accept:
//!
//! ```text
//! TransactionEnvelope::Tx (v1)
//! ├─ Transaction
//! │  ├─ sourceAccount   MuxedAccount (ed25519 only)
//! │  ├─ cond            Preconditions (NONE | TIME)
//! │  ├─ memo            MEMO_NONE
//! │  ├─ operations<100> CREATE_ACCOUNT | PAYMENT | CHANGE_TRUST
//! │  └─ ext             0
//! └─ signatures<20>
//! ```
//!
//! Anything else (v0 or fee-bump envelopes, muxed ids, memos, other
//! operation types) decodes to [`XdrError::Unsupported`]. An envelope we
//! can't fully understand is an envelope we refuse to relay.

use stellar_xdr::curr::{self as wire, Limits, ReadXdr, WriteXdr};
use thiserror::Error;

use super::types::{
    Asset, DecoratedSignature, Operation, TimeBounds, Transaction, TransactionEnvelope,
};
use crate::amount::Amount;
use crate::config::{MAX_OPERATIONS_PER_TX, MAX_TOKEN_CODE_LENGTH};
use crate::crypto::strkey;

const MAX_SIGNATURES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XdrError {
    /// The bytes are not a well-formed envelope.
    #[error("malformed XDR: {0}")]
    Codec(String),

    #[error("unsupported {0}")]
    Unsupported(String),

    #[error("invalid account id: {0}")]
    InvalidAccountId(String),

    #[error("invalid asset code: {0}")]
    InvalidAssetCode(String),

    #[error("{what} has {count} items (max {max})")]
    TooManyItems {
        what: &'static str,
        count: usize,
        max: usize,
    },

    #[error("negative amount")]
    NegativeAmount,

    #[error("invalid base64: {0}")]
    InvalidBase64(String),
}

pub type XdrResult<T> = Result<T, XdrError>;

fn codec(err: wire::Error) -> XdrError {
    XdrError::Codec(err.to_string())
}

// ---------------------------------------------------------------------------
// Facade -> wire
// ---------------------------------------------------------------------------

fn account_key(account: &str) -> XdrResult<wire::Uint256> {
    strkey::decode_account_id(account)
        .map(wire::Uint256)
        .map_err(|e| XdrError::InvalidAccountId(format!("{account}: {e}")))
}

fn to_account_id(account: &str) -> XdrResult<wire::AccountId> {
    Ok(wire::AccountId(wire::PublicKey::PublicKeyTypeEd25519(
        account_key(account)?,
    )))
}

fn to_muxed(account: &str) -> XdrResult<wire::MuxedAccount> {
    Ok(wire::MuxedAccount::Ed25519(account_key(account)?))
}

fn to_stroops(amount: Amount) -> XdrResult<i64> {
    if amount.stroops() < 0 {
        return Err(XdrError::NegativeAmount);
    }
    Ok(amount.stroops())
}

fn to_wire_asset(asset: &Asset) -> XdrResult<wire::Asset> {
    let (code, issuer) = match asset {
        Asset::Native => return Ok(wire::Asset::Native),
        Asset::Credit { code, issuer } => (code, to_account_id(issuer)?),
    };
    let bytes = code.as_bytes();
    match bytes.len() {
        1..=4 => {
            let mut padded = [0u8; 4];
            padded[..bytes.len()].copy_from_slice(bytes);
            Ok(wire::Asset::CreditAlphanum4(wire::AlphaNum4 {
                asset_code: wire::AssetCode4(padded),
                issuer,
            }))
        }
        5..=MAX_TOKEN_CODE_LENGTH => {
            let mut padded = [0u8; MAX_TOKEN_CODE_LENGTH];
            padded[..bytes.len()].copy_from_slice(bytes);
            Ok(wire::Asset::CreditAlphanum12(wire::AlphaNum12 {
                asset_code: wire::AssetCode12(padded),
                issuer,
            }))
        }
        _ => Err(XdrError::InvalidAssetCode(code.clone())),
    }
}

fn to_trust_asset(asset: &Asset) -> XdrResult<wire::ChangeTrustAsset> {
    Ok(match to_wire_asset(asset)? {
        wire::Asset::Native => wire::ChangeTrustAsset::Native,
        wire::Asset::CreditAlphanum4(a) => wire::ChangeTrustAsset::CreditAlphanum4(a),
        wire::Asset::CreditAlphanum12(a) => wire::ChangeTrustAsset::CreditAlphanum12(a),
    })
}

fn to_wire_operation(op: &Operation) -> XdrResult<wire::Operation> {
    let body = match op {
        Operation::CreateAccount {
            destination,
            starting_balance,
        } => wire::OperationBody::CreateAccount(wire::CreateAccountOp {
            destination: to_account_id(destination)?,
            starting_balance: to_stroops(*starting_balance)?,
        }),
        Operation::Payment {
            destination,
            asset,
            amount,
        } => wire::OperationBody::Payment(wire::PaymentOp {
            destination: to_muxed(destination)?,
            asset: to_wire_asset(asset)?,
            amount: to_stroops(*amount)?,
        }),
        Operation::ChangeTrust { asset, limit } => {
            wire::OperationBody::ChangeTrust(wire::ChangeTrustOp {
                line: to_trust_asset(asset)?,
                limit: to_stroops(*limit)?,
            })
        }
    };
    Ok(wire::Operation {
        source_account: None,
        body,
    })
}

pub fn to_wire_transaction(tx: &Transaction) -> XdrResult<wire::Transaction> {
    let count = tx.operations.len();
    let operations = tx
        .operations
        .iter()
        .map(to_wire_operation)
        .collect::<XdrResult<Vec<_>>>()?;
    let cond = match tx.time_bounds {
        None => wire::Preconditions::None,
        Some(tb) => wire::Preconditions::Time(wire::TimeBounds {
            min_time: wire::TimePoint(tb.min_time),
            max_time: wire::TimePoint(tb.max_time),
        }),
    };
    Ok(wire::Transaction {
        source_account: to_muxed(&tx.source_account)?,
        fee: tx.fee,
        seq_num: wire::SequenceNumber(tx.sequence),
        cond,
        memo: wire::Memo::None,
        operations: operations.try_into().map_err(|_| XdrError::TooManyItems {
            what: "operations",
            count,
            max: MAX_OPERATIONS_PER_TX,
        })?,
        ext: wire::TransactionExt::V0,
    })
}

fn to_wire_signature(sig: &DecoratedSignature) -> XdrResult<wire::DecoratedSignature> {
    let signature = sig
        .signature
        .clone()
        .try_into()
        .map_err(|_| XdrError::Unsupported(format!("{}-byte signature", sig.signature.len())))?;
    Ok(wire::DecoratedSignature {
        hint: wire::SignatureHint(sig.hint),
        signature: wire::Signature(signature),
    })
}

pub fn to_wire_envelope(env: &TransactionEnvelope) -> XdrResult<wire::TransactionEnvelope> {
    let count = env.signatures.len();
    let signatures = env
        .signatures
        .iter()
        .map(to_wire_signature)
        .collect::<XdrResult<Vec<_>>>()?;
    Ok(wire::TransactionEnvelope::Tx(wire::TransactionV1Envelope {
        tx: to_wire_transaction(&env.tx)?,
        signatures: signatures.try_into().map_err(|_| XdrError::TooManyItems {
            what: "signatures",
            count,
            max: MAX_SIGNATURES,
        })?,
    }))
}

/// Signature payload: `network_id || ENVELOPE_TYPE_TX || tx`.
pub fn signature_payload(network_id: &[u8; 32], tx: &Transaction) -> XdrResult<Vec<u8>> {
    let payload = wire::TransactionSignaturePayload {
        network_id: wire::Hash(*network_id),
        tagged_transaction: wire::TransactionSignaturePayloadTaggedTransaction::Tx(
            to_wire_transaction(tx)?,
        ),
    };
    payload.to_xdr(Limits::none()).map_err(codec)
}

pub fn encode_envelope(env: &TransactionEnvelope) -> XdrResult<Vec<u8>> {
    to_wire_envelope(env)?
        .to_xdr(Limits::none())
        .map_err(codec)
}

pub fn encode_envelope_base64(env: &TransactionEnvelope) -> XdrResult<String> {
    to_wire_envelope(env)?
        .to_xdr_base64(Limits::none())
        .map_err(codec)
}

// ---------------------------------------------------------------------------
// Wire -> facade
// ---------------------------------------------------------------------------

fn from_account_id(id: &wire::AccountId) -> String {
    match &id.0 {
        wire::PublicKey::PublicKeyTypeEd25519(key) => strkey::encode_account_id(&key.0),
    }
}

fn from_muxed(account: &wire::MuxedAccount) -> XdrResult<String> {
    match account {
        wire::MuxedAccount::Ed25519(key) => Ok(strkey::encode_account_id(&key.0)),
        wire::MuxedAccount::MuxedEd25519(_) => Err(XdrError::Unsupported("muxed account".into())),
    }
}

fn from_stroops(value: i64) -> XdrResult<Amount> {
    if value < 0 {
        return Err(XdrError::NegativeAmount);
    }
    Ok(Amount::from_stroops(value))
}

fn from_asset_code(raw: &[u8]) -> XdrResult<String> {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    let (code, padding) = raw.split_at(end);
    if code.is_empty()
        || padding.iter().any(|b| *b != 0)
        || !code.iter().all(u8::is_ascii_alphanumeric)
    {
        return Err(XdrError::InvalidAssetCode(hex::encode(raw)));
    }
    // Validated as ASCII above.
    Ok(code.iter().map(|b| *b as char).collect())
}

fn credit(code: &[u8], issuer: &wire::AccountId) -> XdrResult<Asset> {
    Ok(Asset::Credit {
        code: from_asset_code(code)?,
        issuer: from_account_id(issuer),
    })
}

fn from_wire_asset(asset: &wire::Asset) -> XdrResult<Asset> {
    match asset {
        wire::Asset::Native => Ok(Asset::Native),
        wire::Asset::CreditAlphanum4(a) => credit(&a.asset_code.0, &a.issuer),
        wire::Asset::CreditAlphanum12(a) => credit(&a.asset_code.0, &a.issuer),
    }
}

fn from_trust_asset(asset: &wire::ChangeTrustAsset) -> XdrResult<Asset> {
    match asset {
        wire::ChangeTrustAsset::Native => Ok(Asset::Native),
        wire::ChangeTrustAsset::CreditAlphanum4(a) => credit(&a.asset_code.0, &a.issuer),
        wire::ChangeTrustAsset::CreditAlphanum12(a) => credit(&a.asset_code.0, &a.issuer),
        wire::ChangeTrustAsset::PoolShare(_) => {
            Err(XdrError::Unsupported("liquidity pool trustline".into()))
        }
    }
}

fn from_wire_operation(op: &wire::Operation) -> XdrResult<Operation> {
    if op.source_account.is_some() {
        return Err(XdrError::Unsupported("operation source account".into()));
    }
    match &op.body {
        wire::OperationBody::CreateAccount(o) => Ok(Operation::CreateAccount {
            destination: from_account_id(&o.destination),
            starting_balance: from_stroops(o.starting_balance)?,
        }),
        wire::OperationBody::Payment(o) => Ok(Operation::Payment {
            destination: from_muxed(&o.destination)?,
            asset: from_wire_asset(&o.asset)?,
            amount: from_stroops(o.amount)?,
        }),
        wire::OperationBody::ChangeTrust(o) => Ok(Operation::ChangeTrust {
            asset: from_trust_asset(&o.line)?,
            limit: from_stroops(o.limit)?,
        }),
        _ => Err(XdrError::Unsupported("operation type".into())),
    }
}

fn from_wire_transaction(tx: &wire::Transaction) -> XdrResult<Transaction> {
    let time_bounds = match &tx.cond {
        wire::Preconditions::None => None,
        wire::Preconditions::Time(tb) => Some(TimeBounds {
            min_time: tb.min_time.0,
            max_time: tb.max_time.0,
        }),
        wire::Preconditions::V2(_) => {
            return Err(XdrError::Unsupported("v2 preconditions".into()))
        }
    };
    if !matches!(tx.memo, wire::Memo::None) {
        return Err(XdrError::Unsupported("memo".into()));
    }
    if !matches!(tx.ext, wire::TransactionExt::V0) {
        return Err(XdrError::Unsupported("transaction ext".into()));
    }
    Ok(Transaction {
        source_account: from_muxed(&tx.source_account)?,
        fee: tx.fee,
        sequence: tx.seq_num.0,
        time_bounds,
        operations: tx
            .operations
            .iter()
            .map(from_wire_operation)
            .collect::<XdrResult<Vec<_>>>()?,
    })
}

pub fn from_wire_envelope(env: &wire::TransactionEnvelope) -> XdrResult<TransactionEnvelope> {
    let v1 = match env {
        wire::TransactionEnvelope::Tx(v1) => v1,
        wire::TransactionEnvelope::TxV0(_) => {
            return Err(XdrError::Unsupported("v0 envelope".into()))
        }
        wire::TransactionEnvelope::TxFeeBump(_) => {
            return Err(XdrError::Unsupported("fee-bump envelope".into()))
        }
    };
    let signatures = v1
        .signatures
        .iter()
        .map(|sig| DecoratedSignature {
            hint: sig.hint.0,
            signature: sig.signature.0.to_vec(),
        })
        .collect();
    Ok(TransactionEnvelope {
        tx: from_wire_transaction(&v1.tx)?,
        signatures,
    })
}

/// Decode raw envelope bytes. Trailing bytes are a codec error.
pub fn decode_envelope(bytes: &[u8]) -> XdrResult<TransactionEnvelope> {
    let env = wire::TransactionEnvelope::from_xdr(bytes, Limits::none()).map_err(codec)?;
    from_wire_envelope(&env)
}
