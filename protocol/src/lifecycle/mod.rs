//! # Lot Lifecycle
//!
//! The [`Tokenizer`] walks a wine lot from paperwork to tokens in people's
//! wallets:
//!
//! ```text
//!   prepare ──▶ CREATED ──(trustline)──▶ TRUSTLINE_CREATED
//!                  │                            │
//!                  └────────── emission ────────┘
//!                                 │
//!                                 ▼
//!                         EMISSION_PENDING ◀──┐ re-emission
//!                                 │ ──────────┘
//!                              submit
//!                                 ▼
//!                          TOKENS_EMITTED
//!                                 │
//!                            distribute
//!                                 ▼
//!                           DISTRIBUTED
//! ```
//!
//! ## Rules
//!
//! - Every operation looks the lot up fresh and checks its status before
//!   touching the ledger.
//! - Every status change is a conditional update in storage (see
//!   [`TokenizationDb::transition_lot`]), so of two racing requests exactly
//!   one moves the lot.
//! - A ledger rejection never moves the lot. The caller can fix the cause
//!   and try again.
//! - `prepare` is the one operation that can stop half way: the lot is
//!   stored at `CREATED` before the ledger work starts. A warning in the
//!   outcome means "call [`Tokenizer::retry_trustline`]", not "start over".
//!
//! ## Modules
//!
//! ```text
//! mod.rs        — Tokenizer, requests and outcomes
//! allocation.rs — platform / reserve / winery split and payout planning
//! query.rs      — status and marketplace views
//! ```

pub mod allocation;
pub mod query;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::amount::{
    derive_token_supply, ensure_number, ensure_positive_integer, to_fixed_amount, Amount,
    AmountInput,
};
use crate::config::{
    TokenizationConfig, AMOUNT_DECIMALS, BASE_FEE_STROOPS, DEFAULT_BOTTLE_FORMAT_ML,
    DEFAULT_PLATFORM_FEE_BPS, DEFAULT_TX_TIMEOUT, EMISSION_TX_TIMEOUT, ISSUER_SAFETY_MARGIN_STROOPS,
    MAX_BPS, TOKEN_BALANCE_EPSILON_STROOPS,
};
use crate::crypto::keys::LedgerKeypair;
use crate::crypto::strkey;
use crate::error::{TokenizationError, TokenizationResult};
use crate::funding::AccountFunder;
use crate::ledger::types::is_valid_asset_code;
use crate::ledger::{
    AccountRecord, Asset, LedgerClient, LedgerError, Operation, TransactionBuilder,
    TransactionEnvelope,
};
use crate::storage::{
    DbError, Distribution, LotStatus, TokenIssuance, TokenizationDb, WineLot,
};
use crate::vault::SecretVault;

pub use allocation::{compute_allocation, plan_payouts, Allocation, AllocationView, PayoutLine, PayoutRole};
pub use query::{DistributionView, IssuanceView, LotStatusView, MarketplaceLotView, MarketplacePage};

/// Shown when `prepare` stored and funded the lot but the trustline didn't go through.
pub const TRUSTLINE_RETRY_WARNING: &str =
    "Wine lot created but trustline creation failed. It can be retried later.";

/// Default page size for the marketplace listing.
pub const DEFAULT_LIST_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A single URL or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentationUrls {
    One(String),
    Many(Vec<String>),
}

impl DocumentationUrls {
    fn into_vec(self) -> Vec<String> {
        match self {
            DocumentationUrls::One(url) if url.trim().is_empty() => Vec::new(),
            DocumentationUrls::One(url) => vec![url],
            DocumentationUrls::Many(urls) => urls,
        }
    }
}

/// Everything `prepare` accepts. Loose on purpose: numbers may arrive as
/// JSON numbers or numeric strings, and are checked here rather than by the
/// deserializer so the caller gets a message naming the field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareLotRequest {
    pub issuer_public_key: Option<String>,
    pub token_code: Option<String>,
    pub winery_name: Option<String>,
    /// Older clients send `wineName`.
    pub wine_name: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub appellation: Option<String>,
    pub vineyard: Option<String>,
    pub vintage: Option<AmountInput>,
    pub bottle_format_ml: Option<AmountInput>,
    pub bottle_count: Option<AmountInput>,
    pub price_per_bottle_usd: Option<AmountInput>,
    pub sku: Option<String>,
    pub custodial_partner: Option<String>,
    pub storage_location: Option<String>,
    pub insurance_policy: Option<String>,
    pub documentation_urls: Option<DocumentationUrls>,
    pub platform_fee_bps: Option<AmountInput>,
    pub units_per_bottle: Option<AmountInput>,
    pub total_token_units: Option<AmountInput>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionRequest {
    pub issuer_public_key: Option<String>,
    pub token_code: Option<String>,
    pub total_supply: Option<AmountInput>,
    pub price_per_unit_usd: Option<AmountInput>,
    pub reserve_ratio_bps: Option<AmountInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSignedRequest {
    #[serde(rename = "signedXDR")]
    pub signed_xdr: Option<String>,
    pub token_code: Option<String>,
    pub issuer_public_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeRequest {
    pub issuer_public_key: Option<String>,
    pub token_code: Option<String>,
    pub winery_payout_public_key: Option<String>,
    pub reserve_public_key: Option<String>,
}

/// Identifies a lot by its natural key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotRef {
    pub issuer_public_key: Option<String>,
    pub token_code: Option<String>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareOutcome {
    pub distribution_account: String,
    pub wine_lot_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trustline_tx_hash: Option<String>,
    pub total_token_supply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustlineOutcome {
    pub wine_lot_id: Uuid,
    pub distribution_account: String,
    pub trustline_tx_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionOutcome {
    /// Unsigned envelope for the issuer to sign, base64 XDR.
    pub xdr: String,
    pub wine_lot_id: Uuid,
    pub distribution_account: String,
    pub total_supply: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub tx_hash: String,
    pub wine_lot_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeOutcome {
    pub distribution_tx_hash: String,
    pub transaction_url: String,
    pub wine_lot_id: Uuid,
    pub distribution_account: String,
    pub allocations: AllocationView,
}

// ---------------------------------------------------------------------------
// Input helpers
// ---------------------------------------------------------------------------

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn present_input(value: &Option<AmountInput>) -> Option<&AmountInput> {
    value.as_ref().filter(|v| match v {
        AmountInput::Text(s) => !s.trim().is_empty(),
        AmountInput::Number(_) => true,
    })
}

fn missing_fields(missing: &[&str]) -> TokenizationResult<()> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TokenizationError::validation(format!(
            "Missing required fields: {}.",
            missing.join(", ")
        )))
    }
}

fn normalize_token_code(code: &str) -> TokenizationResult<String> {
    let upper = code.trim().to_ascii_uppercase();
    if !is_valid_asset_code(&upper) {
        return Err(TokenizationError::Validation {
            message: "Token code must be 1-12 alphanumeric characters".into(),
            field: Some("tokenCode".into()),
        });
    }
    Ok(upper)
}

fn check_account_id(value: &str, field: &str) -> TokenizationResult<()> {
    if strkey::is_valid_account_id(value) {
        Ok(())
    } else {
        Err(TokenizationError::Validation {
            message: format!("{field} is not a valid account address"),
            field: Some(field.into()),
        })
    }
}

/// Basis points: a whole number in `0..=10_000`.
fn parse_bps(value: &AmountInput, field: &str) -> TokenizationResult<u32> {
    let bps = ensure_number(value, field, Some(0.0))?;
    if bps.fract() != 0.0 || bps > f64::from(MAX_BPS) {
        return Err(TokenizationError::Validation {
            message: format!("{field} must be a whole number between 0 and {MAX_BPS}"),
            field: Some(field.into()),
        });
    }
    Ok(bps as u32)
}

fn lot_asset(lot: &WineLot) -> TokenizationResult<Asset> {
    Asset::credit(&lot.token_code, &lot.issuer_public_key)
        .map_err(|e| TokenizationError::validation(e.to_string()))
}

fn sign(
    envelope: &mut TransactionEnvelope,
    signer: &LedgerKeypair,
    config: &TokenizationConfig,
) -> TokenizationResult<()> {
    envelope
        .sign(signer, config.network)
        .map_err(|e| TokenizationError::Ledger(format!("failed to sign transaction: {e}")))
}

/// A lot's status doesn't allow `message`'s operation.
fn not_ready(lot: &WineLot, message: &str, required: Option<LotStatus>) -> TokenizationError {
    TokenizationError::InvalidTransition {
        message: message.to_string(),
        current: lot.status,
        required,
        distribution_tx_hash: lot.distribution_tx_hash.clone(),
        distributed_at: lot.distributed_at,
    }
}

/// Map a lost conditional update to the operation's own wording.
fn transition_error(e: DbError, message: &str, required: Option<LotStatus>) -> TokenizationError {
    match e {
        DbError::InvalidTransition(lot) => not_ready(&lot, message, required),
        DbError::NotFound(_) => TokenizationError::LotNotFound,
        other => other.into(),
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Orchestrates the lot lifecycle. Cheap to clone; share freely.
#[derive(Clone)]
pub struct Tokenizer {
    config: Arc<TokenizationConfig>,
    ledger: Arc<dyn LedgerClient>,
    db: TokenizationDb,
    vault: Arc<SecretVault>,
    funder: AccountFunder,
}

impl Tokenizer {
    pub fn new(
        config: Arc<TokenizationConfig>,
        ledger: Arc<dyn LedgerClient>,
        db: TokenizationDb,
        vault: Arc<SecretVault>,
    ) -> Self {
        let funder = AccountFunder::new(Arc::clone(&config), Arc::clone(&ledger));
        Self {
            config,
            ledger,
            db,
            vault,
            funder,
        }
    }

    pub fn config(&self) -> &TokenizationConfig {
        &self.config
    }

    pub fn db(&self) -> &TokenizationDb {
        &self.db
    }

    fn find_lot(&self, issuer: &str, token_code: &str) -> TokenizationResult<WineLot> {
        self.db
            .find_lot(issuer.trim(), token_code.trim())?
            .ok_or(TokenizationError::LotNotFound)
    }

    async fn load_account(&self, account_id: &str) -> TokenizationResult<AccountRecord> {
        Ok(self.ledger.load_account(account_id).await?)
    }

    // -- prepare ------------------------------------------------------------

    /// Register a lot, give it a funded custodial account, and open that
    /// account's trustline to the lot's asset.
    pub async fn prepare(&self, req: PrepareLotRequest) -> TokenizationResult<PrepareOutcome> {
        let winery_name = present(&req.winery_name).or(present(&req.wine_name));
        let mut missing = Vec::new();
        if present(&req.issuer_public_key).is_none() {
            missing.push("issuerPublicKey");
        }
        if present(&req.token_code).is_none() {
            missing.push("tokenCode");
        }
        if winery_name.is_none() {
            missing.push("wineryName");
        }
        if present(&req.region).is_none() {
            missing.push("region");
        }
        if present(&req.country).is_none() {
            missing.push("country");
        }
        if present_input(&req.vintage).is_none() {
            missing.push("vintage");
        }
        if present_input(&req.bottle_count).is_none() {
            missing.push("bottleCount");
        }
        if present_input(&req.price_per_bottle_usd).is_none() {
            missing.push("pricePerBottleUsd");
        }
        missing_fields(&missing)?;

        // Checked above; the fallbacks are unreachable.
        let issuer = present(&req.issuer_public_key).unwrap_or_default().to_string();
        let token_code = normalize_token_code(present(&req.token_code).unwrap_or_default())?;
        check_account_id(&issuer, "issuerPublicKey")?;

        let bottle_count = ensure_positive_integer(
            present_input(&req.bottle_count).unwrap_or(&AmountInput::Number(0.0)),
            "bottleCount",
        )?;
        let price_per_bottle = ensure_number(
            present_input(&req.price_per_bottle_usd).unwrap_or(&AmountInput::Number(0.0)),
            "pricePerBottleUsd",
            Some(0.01),
        )?;
        let units_per_bottle = match present_input(&req.units_per_bottle) {
            Some(v) => ensure_number(v, "unitsPerBottle", Some(0.000_000_1))?,
            None => 1.0,
        };
        let total_supply = match present_input(&req.total_token_units) {
            Some(v) => {
                let units = ensure_number(v, "totalTokenUnits", Some(0.000_000_1))?;
                to_fixed_amount(&AmountInput::Number(units), AMOUNT_DECIMALS, "totalTokenSupply")?
            }
            None => derive_token_supply(bottle_count, units_per_bottle)?,
        };
        let supply_amount = Amount::parse_field(&total_supply, "totalTokenSupply")?;
        if !supply_amount.is_positive() {
            return Err(TokenizationError::validation(
                "totalTokenSupply must be at least one stroop",
            ));
        }

        let vintage = ensure_positive_integer(
            present_input(&req.vintage).unwrap_or(&AmountInput::Number(0.0)),
            "vintage",
        )?;
        let vintage = u32::try_from(vintage)
            .map_err(|_| TokenizationError::validation("vintage is too large"))?;
        let bottle_format_ml = match present_input(&req.bottle_format_ml) {
            Some(v) => ensure_positive_integer(v, "bottleFormatMl")?,
            None => DEFAULT_BOTTLE_FORMAT_ML,
        };
        let platform_fee_bps = match present_input(&req.platform_fee_bps) {
            Some(v) => parse_bps(v, "platformFeeBps")?,
            None => DEFAULT_PLATFORM_FEE_BPS,
        };

        match self.ledger.load_account(&issuer).await {
            Ok(_) => debug!(issuer = %issuer, "issuer account verified"),
            Err(LedgerError::AccountNotFound(_)) => return Err(TokenizationError::IssuerNotFound),
            Err(e) => return Err(e.into()),
        }
        if self.db.find_lot(&issuer, &token_code)?.is_some() {
            return Err(TokenizationError::DuplicateLot);
        }

        let distribution = LedgerKeypair::random();
        let encrypted = self.vault.encrypt(&distribution.secret())?;

        let mut metadata = req.metadata.clone().unwrap_or_default();
        metadata.insert("unitsPerBottle".into(), serde_json::json!(units_per_bottle));
        metadata.insert("totalTokenSupply".into(), serde_json::json!(total_supply));
        let token_metadata_json = serde_json::Value::Object(metadata).to_string();

        let now = Utc::now();
        let lot = WineLot {
            id: Uuid::new_v4(),
            issuer_public_key: issuer.clone(),
            token_code: token_code.clone(),
            winery_name: winery_name.unwrap_or_default().to_string(),
            region: present(&req.region).unwrap_or_default().to_string(),
            country: present(&req.country).unwrap_or_default().to_string(),
            appellation: present(&req.appellation).map(str::to_string),
            vineyard: present(&req.vineyard).map(str::to_string),
            vintage,
            bottle_format_ml,
            bottle_count,
            price_per_bottle_usd: price_per_bottle,
            sku: present(&req.sku).map(str::to_string),
            custodial_partner: present(&req.custodial_partner).map(str::to_string),
            storage_location: present(&req.storage_location).map(str::to_string),
            insurance_policy: present(&req.insurance_policy).map(str::to_string),
            description: present(&req.description).map(str::to_string),
            platform_fee_bps,
            documentation_urls: req
                .documentation_urls
                .clone()
                .map(DocumentationUrls::into_vec)
                .unwrap_or_default(),
            token_metadata_json,
            total_token_supply: total_supply.clone(),
            distribution_public_key: distribution.public_key(),
            distribution_secret_encrypted: encrypted,
            status: LotStatus::Created,
            trustline_tx_hash: None,
            emission_tx_hash: None,
            distribution_tx_hash: None,
            created_at: now,
            updated_at: now,
            emitted_at: None,
            distributed_at: None,
        };
        self.db.insert_lot(&lot)?;
        info!(
            lot_id = %lot.id,
            token_code = %token_code,
            issuer = %issuer,
            distribution = %lot.distribution_public_key,
            supply = %total_supply,
            "wine lot created"
        );

        if let Err(e) = self.funder.fund_account(&lot.distribution_public_key).await {
            warn!(lot_id = %lot.id, error = %e, "distribution account funding failed");
            return Err(e);
        }

        let mut outcome = PrepareOutcome {
            distribution_account: lot.distribution_public_key.clone(),
            wine_lot_id: lot.id,
            trustline_tx_hash: None,
            total_token_supply: total_supply,
            warning: None,
        };
        match self.open_trustline(&lot, &distribution, supply_amount).await {
            Ok(hash) => outcome.trustline_tx_hash = Some(hash),
            Err(e) => {
                warn!(lot_id = %lot.id, error = %e, "trustline creation failed");
                outcome.warning = Some(TRUSTLINE_RETRY_WARNING.to_string());
            }
        }
        Ok(outcome)
    }

    /// Submit the distribution account's `ChangeTrust` and advance the lot.
    async fn open_trustline(
        &self,
        lot: &WineLot,
        distribution: &LedgerKeypair,
        limit: Amount,
    ) -> TokenizationResult<String> {
        let account = self.load_account(&lot.distribution_public_key).await?;
        let tx = TransactionBuilder::new(&account)
            .base_fee(BASE_FEE_STROOPS)
            .add_operation(Operation::ChangeTrust {
                asset: lot_asset(lot)?,
                limit,
            })
            .set_timeout(DEFAULT_TX_TIMEOUT)
            .build()?;
        let mut envelope = TransactionEnvelope::unsigned(tx);
        sign(&mut envelope, distribution, &self.config)?;
        let result = self.ledger.submit(&envelope).await?;

        let hash = result.hash.clone();
        self.db
            .transition_lot(&lot.id, &[LotStatus::Created], |l| {
                l.status = LotStatus::TrustlineCreated;
                l.trustline_tx_hash = Some(hash.clone());
            })
            .map_err(|e| transition_error(e, "Trustline already created for this wine lot", None))?;
        info!(lot_id = %lot.id, tx_hash = %result.hash, "trustline created");
        Ok(result.hash)
    }

    // -- retry_trustline ----------------------------------------------------

    /// Finish a `prepare` that came back with a warning. Funds the
    /// distribution account first if that never happened.
    pub async fn retry_trustline(&self, req: LotRef) -> TokenizationResult<TrustlineOutcome> {
        let mut missing = Vec::new();
        if present(&req.issuer_public_key).is_none() {
            missing.push("issuerPublicKey");
        }
        if present(&req.token_code).is_none() {
            missing.push("tokenCode");
        }
        missing_fields(&missing)?;
        let lot = self.find_lot(
            present(&req.issuer_public_key).unwrap_or_default(),
            present(&req.token_code).unwrap_or_default(),
        )?;
        if lot.status != LotStatus::Created {
            return Err(not_ready(&lot, "Trustline already created for this wine lot", None));
        }

        let asset = lot_asset(&lot)?;
        let account = match self.ledger.load_account(&lot.distribution_public_key).await {
            Ok(account) => account,
            Err(LedgerError::AccountNotFound(_)) => {
                info!(lot_id = %lot.id, "distribution account missing, funding again");
                self.funder.fund_account(&lot.distribution_public_key).await?;
                self.load_account(&lot.distribution_public_key).await?
            }
            Err(e) => return Err(e.into()),
        };

        // An earlier attempt may have landed on the ledger without the lot
        // hearing about it.
        if account.has_trustline(&asset) {
            let updated = self
                .db
                .transition_lot(&lot.id, &[LotStatus::Created], |l| {
                    l.status = LotStatus::TrustlineCreated;
                })
                .map_err(|e| {
                    transition_error(e, "Trustline already created for this wine lot", None)
                })?;
            info!(lot_id = %lot.id, "trustline already on ledger");
            return Ok(TrustlineOutcome {
                wine_lot_id: updated.id,
                distribution_account: updated.distribution_public_key,
                trustline_tx_hash: updated.trustline_tx_hash,
            });
        }

        let supply = Amount::parse_field(&lot.total_token_supply, "totalTokenSupply")?;
        let keypair = self.vault.decrypt_keypair(&lot.distribution_secret_encrypted)?;
        let hash = self.open_trustline(&lot, &keypair, supply).await?;
        Ok(TrustlineOutcome {
            wine_lot_id: lot.id,
            distribution_account: lot.distribution_public_key,
            trustline_tx_hash: Some(hash),
        })
    }

    // -- emission -----------------------------------------------------------

    /// Build the unsigned payment that moves the supply from issuer to
    /// distribution account. The issuer signs it elsewhere.
    pub async fn emission(&self, req: EmissionRequest) -> TokenizationResult<EmissionOutcome> {
        let (Some(issuer), Some(code), Some(total_supply), Some(price)) = (
            present(&req.issuer_public_key),
            present(&req.token_code),
            present_input(&req.total_supply),
            present_input(&req.price_per_unit_usd),
        ) else {
            return Err(TokenizationError::validation(
                "Missing required fields: issuerPublicKey, tokenCode, totalSupply, pricePerUnitUsd",
            ));
        };

        let lot = self.find_lot(issuer, code)?;
        if !lot.status.can_emit() {
            return Err(not_ready(&lot, "Wine lot is not ready for emission.", None));
        }

        let total_supply = to_fixed_amount(total_supply, AMOUNT_DECIMALS, "totalSupply")?;
        let supply = Amount::parse_field(&total_supply, "totalSupply")?;
        if !supply.is_positive() {
            return Err(TokenizationError::Validation {
                message: "totalSupply must be positive".into(),
                field: Some("totalSupply".into()),
            });
        }
        let lot_supply = Amount::parse_field(&lot.total_token_supply, "totalTokenSupply")?;
        if supply > lot_supply {
            return Err(TokenizationError::Validation {
                message: format!(
                    "totalSupply {total_supply} exceeds the lot's token supply {}",
                    lot.total_token_supply
                ),
                field: Some("totalSupply".into()),
            });
        }
        let price_per_unit = ensure_number(price, "pricePerUnitUsd", Some(0.000_001))?;
        let reserve_ratio_bps = match present_input(&req.reserve_ratio_bps) {
            Some(v) => parse_bps(v, "reserveRatioBps")?,
            None => 0,
        };
        if lot.platform_fee_bps + reserve_ratio_bps > MAX_BPS {
            return Err(TokenizationError::Validation {
                message: format!(
                    "platformFeeBps ({}) plus reserveRatioBps ({reserve_ratio_bps}) exceeds {MAX_BPS}",
                    lot.platform_fee_bps
                ),
                field: Some("reserveRatioBps".into()),
            });
        }

        let issuer_account = match self.ledger.load_account(&lot.issuer_public_key).await {
            Ok(account) => account,
            Err(LedgerError::AccountNotFound(_)) => return Err(TokenizationError::IssuerNotFound),
            Err(e) => return Err(e.into()),
        };
        let fee = Amount::from_stroops(i64::from(BASE_FEE_STROOPS));
        let required = fee
            .checked_add(Amount::from_stroops(ISSUER_SAFETY_MARGIN_STROOPS))
            .unwrap_or(fee);
        let current = issuer_account.native_balance();
        if current < required {
            return Err(TokenizationError::InsufficientBalance { current, required });
        }

        let tx = TransactionBuilder::new(&issuer_account)
            .base_fee(BASE_FEE_STROOPS)
            .add_operation(Operation::Payment {
                destination: lot.distribution_public_key.clone(),
                asset: lot_asset(&lot)?,
                amount: supply,
            })
            .set_timeout(EMISSION_TX_TIMEOUT)
            .build()?;
        let envelope = TransactionEnvelope::unsigned(tx);
        let xdr = envelope.to_xdr_base64().map_err(LedgerError::from)?;
        let unsigned_tx_hash = envelope
            .hash_hex(self.config.network)
            .map_err(LedgerError::from)?;

        let updated = self
            .db
            .transition_lot(
                &lot.id,
                &[
                    LotStatus::Created,
                    LotStatus::TrustlineCreated,
                    LotStatus::EmissionPending,
                ],
                |l| {
                    l.status = LotStatus::EmissionPending;
                    l.emission_tx_hash = None;
                },
            )
            .map_err(|e| transition_error(e, "Wine lot is not ready for emission.", None))?;

        let issuance = self
            .db
            .append_issuance(TokenIssuance {
                id: Uuid::new_v4(),
                lot_id: lot.id,
                total_supply: total_supply.clone(),
                price_per_unit_usd: price_per_unit,
                reserve_ratio_bps,
                emission_xdr: xdr.clone(),
                unsigned_tx_hash,
                emission_tx_hash: None,
                issued_at: None,
                created_at: Utc::now(),
                superseded_at: None,
            })
            .map_err(|e| transition_error(e, "Wine lot is not ready for emission.", None))?;
        info!(
            lot_id = %lot.id,
            issuance_id = %issuance.id,
            supply = %total_supply,
            "emission envelope prepared"
        );

        Ok(EmissionOutcome {
            xdr,
            wine_lot_id: updated.id,
            distribution_account: updated.distribution_public_key,
            total_supply,
        })
    }

    // -- submit -------------------------------------------------------------

    /// Relay the issuer-signed emission envelope and record the result.
    pub async fn submit(&self, req: SubmitSignedRequest) -> TokenizationResult<SubmitOutcome> {
        let (Some(signed_xdr), Some(code), Some(issuer)) = (
            present(&req.signed_xdr),
            present(&req.token_code),
            present(&req.issuer_public_key),
        ) else {
            return Err(TokenizationError::validation(
                "Missing required fields: signedXDR, tokenCode, issuerPublicKey",
            ));
        };

        let lot = self.find_lot(issuer, code)?;
        if !lot.status.can_submit() {
            return Err(not_ready(
                &lot,
                "Wine lot has no emission awaiting signature",
                Some(LotStatus::EmissionPending),
            ));
        }
        let mut issuance = match self.db.latest_issuance(&lot.id)? {
            Some(i) if !i.is_confirmed() => i,
            _ => return Err(TokenizationError::NoPendingIssuance),
        };

        let envelope = TransactionEnvelope::from_xdr_base64(signed_xdr)
            .map_err(|e| TokenizationError::rejected(format!("Invalid transaction envelope: {e}")))?;
        let signed_hash = envelope
            .hash_hex(self.config.network)
            .map_err(|e| TokenizationError::rejected(format!("Invalid transaction envelope: {e}")))?;
        if signed_hash != issuance.unsigned_tx_hash {
            return Err(TokenizationError::rejected(
                "Signed envelope does not match the pending emission",
            ));
        }

        let result = match self.ledger.submit(&envelope).await {
            Ok(result) => result,
            Err(e) => {
                warn!(lot_id = %lot.id, error = %e, "emission submission rejected");
                return Err(e.into());
            }
        };

        let now = Utc::now();
        let hash = result.hash.clone();
        self.db
            .transition_lot(&lot.id, &[LotStatus::EmissionPending], |l| {
                l.status = LotStatus::TokensEmitted;
                l.emission_tx_hash = Some(hash.clone());
                l.emitted_at = Some(now);
            })
            .map_err(|e| {
                transition_error(
                    e,
                    "Wine lot has no emission awaiting signature",
                    Some(LotStatus::EmissionPending),
                )
            })?;
        issuance.emission_tx_hash = Some(result.hash.clone());
        issuance.issued_at = Some(now);
        issuance.superseded_at = None;
        self.db.update_issuance(&issuance)?;
        info!(lot_id = %lot.id, tx_hash = %result.hash, "tokens emitted");

        Ok(SubmitOutcome {
            tx_hash: result.hash,
            wine_lot_id: lot.id,
        })
    }

    // -- distribute ---------------------------------------------------------

    /// Pay out the emitted supply to platform, winery and reserve in one
    /// transaction signed by the lot's custodial key.
    pub async fn distribute(&self, req: DistributeRequest) -> TokenizationResult<DistributeOutcome> {
        let mut missing = Vec::new();
        if present(&req.issuer_public_key).is_none() {
            missing.push("issuerPublicKey");
        }
        if present(&req.token_code).is_none() {
            missing.push("tokenCode");
        }
        missing_fields(&missing)?;

        let treasury = self
            .config
            .treasury_public_key
            .clone()
            .ok_or_else(|| TokenizationError::Configuration("Platform treasury not configured".into()))?;

        let lot = self.find_lot(
            present(&req.issuer_public_key).unwrap_or_default(),
            present(&req.token_code).unwrap_or_default(),
        )?;
        if lot.status.is_terminal() {
            return Err(not_ready(&lot, "Distribution already completed", None));
        }
        if !lot.status.can_distribute() {
            return Err(not_ready(
                &lot,
                "Wine lot is not ready for distribution",
                Some(LotStatus::TokensEmitted),
            ));
        }

        let winery = present(&req.winery_payout_public_key);
        let reserve = present(&req.reserve_public_key);
        if let Some(address) = winery {
            check_account_id(address, "wineryPayoutPublicKey")?;
        }
        if let Some(address) = reserve {
            check_account_id(address, "reservePublicKey")?;
        }

        // Split what was actually emitted, not whatever row came last.
        let issuance = match lot.emission_tx_hash.as_deref() {
            Some(hash) => self.db.confirmed_issuance(&lot.id, hash)?,
            None => None,
        }
        .ok_or(TokenizationError::NoPendingIssuance)?;
        let total = Amount::parse_field(&issuance.total_supply, "totalSupply")?;
        let allocation = compute_allocation(total, lot.platform_fee_bps, issuance.reserve_ratio_bps);
        let payouts = plan_payouts(&allocation, &lot.token_code, &treasury, winery, reserve)?;

        let asset = lot_asset(&lot)?;
        let account = self.load_account(&lot.distribution_public_key).await?;
        let available = account.balance_of(&asset).ok_or_else(|| {
            TokenizationError::InsufficientTokenBalance {
                message: "Distribution account missing token balance".into(),
                available: None,
                required: total,
            }
        })?;
        let with_epsilon = available
            .checked_add(Amount::from_stroops(TOKEN_BALANCE_EPSILON_STROOPS))
            .unwrap_or(available);
        if with_epsilon < total {
            return Err(TokenizationError::InsufficientTokenBalance {
                message: "Insufficient token balance".into(),
                available: Some(available),
                required: total,
            });
        }

        // Foreign accounts first: a missing winery trustline should fail
        // before we open one for the treasury.
        let (treasury_lines, foreign_lines): (Vec<&PayoutLine>, Vec<&PayoutLine>) =
            payouts.iter().partition(|l| l.role == PayoutRole::Platform);
        for line in foreign_lines.into_iter().chain(treasury_lines) {
            self.ensure_payout_trustline(&lot, &asset, line, total).await?;
        }

        let mut builder = TransactionBuilder::new(&account).base_fee(BASE_FEE_STROOPS);
        for line in &payouts {
            builder = builder.add_operation(Operation::Payment {
                destination: line.destination.clone(),
                asset: asset.clone(),
                amount: line.amount,
            });
        }
        let tx = builder.set_timeout(DEFAULT_TX_TIMEOUT).build()?;
        let mut envelope = TransactionEnvelope::unsigned(tx);
        {
            let keypair = self.vault.decrypt_keypair(&lot.distribution_secret_encrypted)?;
            sign(&mut envelope, &keypair, &self.config)?;
        }

        let result = match self.ledger.submit(&envelope).await {
            Ok(result) => result,
            Err(e) => {
                warn!(lot_id = %lot.id, error = %e, "distribution submission rejected");
                return Err(e.into());
            }
        };

        let view = allocation.view();
        let now = Utc::now();
        self.db.insert_distribution(&Distribution {
            id: Uuid::new_v4(),
            lot_id: lot.id,
            platform_amount: view.platform_amount.clone(),
            winery_amount: view.winery_amount.clone(),
            reserve_amount: view.reserve_amount.clone(),
            distribution_tx_hash: result.hash.clone(),
            distribution_at: now,
        })?;
        let hash = result.hash.clone();
        self.db
            .transition_lot(&lot.id, &[LotStatus::TokensEmitted], |l| {
                l.status = LotStatus::Distributed;
                l.distribution_tx_hash = Some(hash.clone());
                l.distributed_at = Some(now);
            })
            .map_err(|e| transition_error(e, "Distribution already completed", None))?;
        info!(
            lot_id = %lot.id,
            tx_hash = %result.hash,
            payouts = payouts.len(),
            "lot distributed"
        );

        Ok(DistributeOutcome {
            transaction_url: self.config.explorer_tx_url(&result.hash),
            distribution_tx_hash: result.hash,
            wine_lot_id: lot.id,
            distribution_account: lot.distribution_public_key,
            allocations: view,
        })
    }

    /// Make sure `line.destination` can receive the asset. The treasury's
    /// trustline is opened on the spot when its key is configured; winery
    /// and reserve keys are not ours, so they must already have one.
    async fn ensure_payout_trustline(
        &self,
        lot: &WineLot,
        asset: &Asset,
        line: &PayoutLine,
        limit: Amount,
    ) -> TokenizationResult<()> {
        if line.destination == lot.issuer_public_key {
            return Ok(());
        }
        let account = match self.ledger.load_account(&line.destination).await {
            Ok(account) => account,
            Err(LedgerError::AccountNotFound(_)) => {
                return Err(TokenizationError::validation(format!(
                    "{} account does not exist on Stellar network",
                    line.role.label()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        if account.has_trustline(asset) {
            return Ok(());
        }

        let missing = || TokenizationError::MissingTrustline {
            label: line.role.label().to_string(),
            code: lot.token_code.clone(),
        };
        if line.role != PayoutRole::Platform {
            return Err(missing());
        }
        let Some(secret) = self.config.treasury_secret.as_deref() else {
            return Err(missing());
        };
        let treasury = LedgerKeypair::from_secret(secret).map_err(|e| {
            TokenizationError::Configuration(format!("PLATFORM_TREASURY_SECRET_KEY is invalid: {e}"))
        })?;
        if treasury.public_key() != line.destination {
            return Err(TokenizationError::Configuration(
                "PLATFORM_TREASURY_SECRET_KEY does not match PLATFORM_TREASURY_PUBLIC_KEY".into(),
            ));
        }

        let tx = TransactionBuilder::new(&account)
            .base_fee(BASE_FEE_STROOPS)
            .add_operation(Operation::ChangeTrust {
                asset: asset.clone(),
                limit,
            })
            .set_timeout(DEFAULT_TX_TIMEOUT)
            .build()?;
        let mut envelope = TransactionEnvelope::unsigned(tx);
        sign(&mut envelope, &treasury, &self.config)?;
        let result = self.ledger.submit(&envelope).await?;
        info!(lot_id = %lot.id, tx_hash = %result.hash, "treasury trustline created");
        Ok(())
    }

    // -- queries ------------------------------------------------------------

    /// Lot, latest issuance and latest distribution in one view.
    pub fn status(&self, issuer: &str, token_code: &str) -> TokenizationResult<LotStatusView> {
        if issuer.trim().is_empty() || token_code.trim().is_empty() {
            return Err(TokenizationError::validation(
                "Missing required parameters: code and issuer",
            ));
        }
        let lot = self.find_lot(issuer, token_code)?;
        let issuance = self.current_issuance(&lot)?;
        let distribution = self.db.latest_distribution(&lot.id)?;
        Ok(LotStatusView::build(&lot, issuance.as_ref(), distribution.as_ref()))
    }

    /// The confirmed issuance once tokens are out, the newest draft before.
    fn current_issuance(&self, lot: &WineLot) -> TokenizationResult<Option<TokenIssuance>> {
        if let Some(hash) = lot.emission_tx_hash.as_deref() {
            if let Some(issuance) = self.db.confirmed_issuance(&lot.id, hash)? {
                return Ok(Some(issuance));
            }
        }
        Ok(self.db.latest_issuance(&lot.id)?)
    }

    /// Distributed lots, newest distribution first.
    pub fn list_distributed(&self, limit: usize, offset: usize) -> TokenizationResult<MarketplacePage> {
        let mut lots = Vec::new();
        for distribution in self.db.list_distributions(limit, offset)? {
            let Some(lot) = self.db.get_lot(&distribution.lot_id)? else {
                warn!(lot_id = %distribution.lot_id, "distribution without a lot");
                continue;
            };
            let issuance = self.current_issuance(&lot)?;
            lots.push(MarketplaceLotView::build(&lot, issuance.as_ref(), &distribution));
        }
        Ok(MarketplacePage {
            count: lots.len(),
            lots,
            limit,
            offset,
        })
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("network", &self.config.network)
            .field("lots", &self.db.lot_count())
            .finish()
    }
}
