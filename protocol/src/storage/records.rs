//! Persisted records: lots, issuances and distributions.
//!
//! These are the rows the workflow writes. They are `bincode`-encoded on
//! disk, so no `skip_serializing_if` games here; the JSON shapes the API
//! hands out live in `lifecycle::query`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Lot Status
// ---------------------------------------------------------------------------

/// Where a lot is in its life. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotStatus {
    Created,
    TrustlineCreated,
    EmissionPending,
    TokensEmitted,
    Distributed,
}

impl LotStatus {
    /// Position along the lifecycle, starting at 0.
    pub fn rank(self) -> u8 {
        match self {
            LotStatus::Created => 0,
            LotStatus::TrustlineCreated => 1,
            LotStatus::EmissionPending => 2,
            LotStatus::TokensEmitted => 3,
            LotStatus::Distributed => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LotStatus::Created => "CREATED",
            LotStatus::TrustlineCreated => "TRUSTLINE_CREATED",
            LotStatus::EmissionPending => "EMISSION_PENDING",
            LotStatus::TokensEmitted => "TOKENS_EMITTED",
            LotStatus::Distributed => "DISTRIBUTED",
        }
    }

    /// Emission may be (re)built until an envelope is confirmed.
    pub fn can_emit(self) -> bool {
        matches!(
            self,
            LotStatus::Created | LotStatus::TrustlineCreated | LotStatus::EmissionPending
        )
    }

    pub fn can_submit(self) -> bool {
        self == LotStatus::EmissionPending
    }

    pub fn can_distribute(self) -> bool {
        self == LotStatus::TokensEmitted
    }

    pub fn is_terminal(self) -> bool {
        self == LotStatus::Distributed
    }
}

impl fmt::Display for LotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// WineLot
// ---------------------------------------------------------------------------

/// One tokenizable lot of wine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WineLot {
    pub id: Uuid,
    pub issuer_public_key: String,
    /// Always upper case.
    pub token_code: String,

    pub winery_name: String,
    pub region: String,
    pub country: String,
    pub appellation: Option<String>,
    pub vineyard: Option<String>,
    pub vintage: u32,
    pub bottle_format_ml: u64,
    pub bottle_count: u64,
    pub price_per_bottle_usd: f64,
    pub sku: Option<String>,
    pub custodial_partner: Option<String>,
    pub storage_location: Option<String>,
    pub insurance_policy: Option<String>,
    pub description: Option<String>,
    pub platform_fee_bps: u32,
    pub documentation_urls: Vec<String>,
    /// Free-form metadata, stored as a JSON document string.
    pub token_metadata_json: String,
    /// Fixed-point, 7 decimals.
    pub total_token_supply: String,

    pub distribution_public_key: String,
    /// base64(nonce || AES-256-GCM ciphertext) of the `S...` seed.
    pub distribution_secret_encrypted: String,

    pub status: LotStatus,
    pub trustline_tx_hash: Option<String>,
    pub emission_tx_hash: Option<String>,
    pub distribution_tx_hash: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub emitted_at: Option<DateTime<Utc>>,
    pub distributed_at: Option<DateTime<Utc>>,
}

impl WineLot {
    /// `ISSUER/CODE`, the natural key of a lot.
    pub fn natural_key(&self) -> String {
        lot_key(&self.issuer_public_key, &self.token_code)
    }

    pub fn token_metadata(&self) -> serde_json::Value {
        serde_json::from_str(&self.token_metadata_json).unwrap_or(serde_json::Value::Null)
    }
}

/// Natural key for `(issuer, code)`. The code is upper-cased here so every
/// lookup agrees on one spelling.
pub fn lot_key(issuer: &str, token_code: &str) -> String {
    format!("{}/{}", issuer, token_code.to_ascii_uppercase())
}

// ---------------------------------------------------------------------------
// TokenIssuance
// ---------------------------------------------------------------------------

/// One emission attempt. Append-only; the newest one for a lot wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenIssuance {
    pub id: Uuid,
    pub lot_id: Uuid,
    pub total_supply: String,
    pub price_per_unit_usd: f64,
    pub reserve_ratio_bps: u32,
    /// Unsigned envelope, base64 XDR.
    pub emission_xdr: String,
    /// Hash of the unsigned transaction. A signed envelope must match it.
    pub unsigned_tx_hash: String,
    pub emission_tx_hash: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Set when a newer issuance replaced this one before confirmation.
    pub superseded_at: Option<DateTime<Utc>>,
}

impl TokenIssuance {
    pub fn is_confirmed(&self) -> bool {
        self.emission_tx_hash.is_some()
    }
}

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

/// One executed payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub id: Uuid,
    pub lot_id: Uuid,
    pub platform_amount: String,
    pub winery_amount: String,
    pub reserve_amount: String,
    pub distribution_tx_hash: String,
    pub distribution_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ranks_are_strictly_increasing() {
        let order = [
            LotStatus::Created,
            LotStatus::TrustlineCreated,
            LotStatus::EmissionPending,
            LotStatus::TokensEmitted,
            LotStatus::Distributed,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
        assert!(LotStatus::Distributed.is_terminal());
    }

    #[test]
    fn test_status_gates() {
        assert!(LotStatus::Created.can_emit());
        assert!(LotStatus::EmissionPending.can_emit());
        assert!(!LotStatus::TokensEmitted.can_emit());
        assert!(LotStatus::EmissionPending.can_submit());
        assert!(!LotStatus::TrustlineCreated.can_submit());
        assert!(LotStatus::TokensEmitted.can_distribute());
        assert!(!LotStatus::Distributed.can_distribute());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&LotStatus::TrustlineCreated).unwrap(),
            "\"TRUSTLINE_CREATED\""
        );
        assert_eq!(LotStatus::TokensEmitted.to_string(), "TOKENS_EMITTED");
    }

    #[test]
    fn test_lot_key_uppercases_code() {
        assert_eq!(lot_key("GABC", "malbec19"), "GABC/MALBEC19");
    }
}
