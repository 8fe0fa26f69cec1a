//! Read-side views. Nothing in here writes.
//!
//! The lot row is the primary source for every field; the latest issuance
//! and distribution fill the gaps for rows written before a hash or
//! timestamp was copied onto the lot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::storage::{Distribution, LotStatus, TokenIssuance, WineLot};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceView {
    pub total_supply: String,
    pub price_per_unit_usd: f64,
    pub reserve_ratio_bps: u32,
    pub emission_tx_hash: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
}

impl From<&TokenIssuance> for IssuanceView {
    fn from(i: &TokenIssuance) -> Self {
        Self {
            total_supply: i.total_supply.clone(),
            price_per_unit_usd: i.price_per_unit_usd,
            reserve_ratio_bps: i.reserve_ratio_bps,
            emission_tx_hash: i.emission_tx_hash.clone(),
            issued_at: i.issued_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionView {
    pub platform_amount: String,
    pub winery_amount: String,
    pub reserve_amount: String,
    pub tx_hash: String,
    pub distribution_at: DateTime<Utc>,
}

impl From<&Distribution> for DistributionView {
    fn from(d: &Distribution) -> Self {
        Self {
            platform_amount: d.platform_amount.clone(),
            winery_amount: d.winery_amount.clone(),
            reserve_amount: d.reserve_amount.clone(),
            tx_hash: d.distribution_tx_hash.clone(),
            distribution_at: d.distribution_at,
        }
    }
}

/// Everything known about a lot, in one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotStatusView {
    pub status: LotStatus,
    pub token_code: String,
    pub winery_name: String,
    pub region: String,
    pub country: String,
    pub vintage: u32,
    pub bottle_count: u64,
    pub bottle_format_ml: u64,
    pub price_per_bottle_usd: f64,
    pub platform_fee_bps: u32,
    pub documentation_urls: Vec<String>,
    pub metadata: serde_json::Value,
    pub distribution_account: String,
    pub trustline_tx_hash: Option<String>,
    pub emission_tx_hash: Option<String>,
    pub distribution_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub emitted_at: Option<DateTime<Utc>>,
    pub distributed_at: Option<DateTime<Utc>>,
    pub latest_issuance: Option<IssuanceView>,
    pub latest_distribution: Option<DistributionView>,
}

impl LotStatusView {
    pub fn build(
        lot: &WineLot,
        issuance: Option<&TokenIssuance>,
        distribution: Option<&Distribution>,
    ) -> Self {
        let metadata = match lot.token_metadata() {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };
        Self {
            status: lot.status,
            token_code: lot.token_code.clone(),
            winery_name: lot.winery_name.clone(),
            region: lot.region.clone(),
            country: lot.country.clone(),
            vintage: lot.vintage,
            bottle_count: lot.bottle_count,
            bottle_format_ml: lot.bottle_format_ml,
            price_per_bottle_usd: lot.price_per_bottle_usd,
            platform_fee_bps: lot.platform_fee_bps,
            documentation_urls: lot.documentation_urls.clone(),
            metadata,
            distribution_account: lot.distribution_public_key.clone(),
            trustline_tx_hash: lot.trustline_tx_hash.clone(),
            emission_tx_hash: lot
                .emission_tx_hash
                .clone()
                .or_else(|| issuance.and_then(|i| i.emission_tx_hash.clone())),
            distribution_tx_hash: lot
                .distribution_tx_hash
                .clone()
                .or_else(|| distribution.map(|d| d.distribution_tx_hash.clone())),
            created_at: lot.created_at,
            updated_at: lot.updated_at,
            emitted_at: lot.emitted_at.or_else(|| issuance.and_then(|i| i.issued_at)),
            distributed_at: lot
                .distributed_at
                .or_else(|| distribution.map(|d| d.distribution_at)),
            latest_issuance: issuance.map(IssuanceView::from),
            latest_distribution: distribution.map(DistributionView::from),
        }
    }
}

/// A distributed lot as the marketplace lists it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceLotView {
    pub wine_lot_id: Uuid,
    pub token_code: String,
    pub issuer_public_key: String,
    pub winery_name: String,
    pub region: String,
    pub country: String,
    pub appellation: Option<String>,
    pub vintage: u32,
    pub bottle_count: u64,
    pub bottle_format_ml: u64,
    pub price_per_bottle_usd: f64,
    pub documentation_urls: Vec<String>,
    pub distribution_account: String,
    pub total_supply: String,
    pub price_per_unit_usd: Option<f64>,
    pub platform_amount: String,
    pub winery_amount: String,
    pub reserve_amount: String,
    pub distribution_tx_hash: String,
    pub distribution_at: DateTime<Utc>,
}

impl MarketplaceLotView {
    pub fn build(lot: &WineLot, issuance: Option<&TokenIssuance>, distribution: &Distribution) -> Self {
        Self {
            wine_lot_id: lot.id,
            token_code: lot.token_code.clone(),
            issuer_public_key: lot.issuer_public_key.clone(),
            winery_name: lot.winery_name.clone(),
            region: lot.region.clone(),
            country: lot.country.clone(),
            appellation: lot.appellation.clone(),
            vintage: lot.vintage,
            bottle_count: lot.bottle_count,
            bottle_format_ml: lot.bottle_format_ml,
            price_per_bottle_usd: lot.price_per_bottle_usd,
            documentation_urls: lot.documentation_urls.clone(),
            distribution_account: lot.distribution_public_key.clone(),
            total_supply: issuance
                .map(|i| i.total_supply.clone())
                .unwrap_or_else(|| lot.total_token_supply.clone()),
            price_per_unit_usd: issuance.map(|i| i.price_per_unit_usd),
            platform_amount: distribution.platform_amount.clone(),
            winery_amount: distribution.winery_amount.clone(),
            reserve_amount: distribution.reserve_amount.clone(),
            distribution_tx_hash: distribution.distribution_tx_hash.clone(),
            distribution_at: distribution.distribution_at,
        }
    }
}

/// One page of the marketplace listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketplacePage {
    pub lots: Vec<MarketplaceLotView>,
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot() -> WineLot {
        let now = Utc::now();
        WineLot {
            id: Uuid::new_v4(),
            issuer_public_key: "GISSUER".into(),
            token_code: "WINE".into(),
            winery_name: "Bodega Norte".into(),
            region: "Mendoza".into(),
            country: "AR".into(),
            appellation: Some("Lujan de Cuyo".into()),
            vineyard: None,
            vintage: 2019,
            bottle_format_ml: 750,
            bottle_count: 10,
            price_per_bottle_usd: 30.0,
            sku: None,
            custodial_partner: None,
            storage_location: None,
            insurance_policy: None,
            description: None,
            platform_fee_bps: 1000,
            documentation_urls: vec!["https://example.org/cert.pdf".into()],
            token_metadata_json: r#"{"grape":"malbec"}"#.into(),
            total_token_supply: "10.0000000".into(),
            distribution_public_key: "GDIST".into(),
            distribution_secret_encrypted: "blob".into(),
            status: LotStatus::TokensEmitted,
            trustline_tx_hash: Some("t".into()),
            emission_tx_hash: None,
            distribution_tx_hash: None,
            created_at: now,
            updated_at: now,
            emitted_at: None,
            distributed_at: None,
        }
    }

    #[test]
    fn test_fallbacks_from_issuance_and_distribution() {
        let lot = lot();
        let issued = Utc::now();
        let issuance = TokenIssuance {
            id: Uuid::new_v4(),
            lot_id: lot.id,
            total_supply: "10.0000000".into(),
            price_per_unit_usd: 30.0,
            reserve_ratio_bps: 0,
            emission_xdr: "AAAA".into(),
            unsigned_tx_hash: "h".into(),
            emission_tx_hash: Some("e".into()),
            issued_at: Some(issued),
            created_at: issued,
            superseded_at: None,
        };
        let distribution = Distribution {
            id: Uuid::new_v4(),
            lot_id: lot.id,
            platform_amount: "1.0000000".into(),
            winery_amount: "9.0000000".into(),
            reserve_amount: "0".into(),
            distribution_tx_hash: "d".into(),
            distribution_at: issued,
        };

        let view = LotStatusView::build(&lot, Some(&issuance), Some(&distribution));
        assert_eq!(view.emission_tx_hash.as_deref(), Some("e"));
        assert_eq!(view.emitted_at, Some(issued));
        assert_eq!(view.distribution_tx_hash.as_deref(), Some("d"));
        assert_eq!(view.metadata["grape"], "malbec");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "TOKENS_EMITTED");
        assert_eq!(json["latestDistribution"]["txHash"], "d");
        assert_eq!(json["latestIssuance"]["reserveRatioBps"], 0);
    }

    #[test]
    fn test_lot_fields_win_over_fallbacks() {
        let mut lot = lot();
        lot.emission_tx_hash = Some("lot-hash".into());
        let view = LotStatusView::build(&lot, None, None);
        assert_eq!(view.emission_tx_hash.as_deref(), Some("lot-hash"));
        assert!(view.latest_issuance.is_none());
        let json = serde_json::to_value(&view).unwrap();
        assert!(json["latestDistribution"].is_null());
    }

    #[test]
    fn test_missing_metadata_renders_as_object() {
        let mut lot = lot();
        lot.token_metadata_json = String::new();
        let view = LotStatusView::build(&lot, None, None);
        assert!(view.metadata.is_object());
    }
}
