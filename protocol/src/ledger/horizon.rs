//! # Horizon Adapter
//!
//! [`LedgerClient`] over the Horizon REST API, using `reqwest`.
//!
//! | Call                     | Horizon                          |
//! |--------------------------|----------------------------------|
//! | `load_account`           | `GET /accounts/{id}`             |
//! | `submit`                 | `POST /transactions` (`tx=...`)  |
//! | `request_faucet_funding` | `GET {friendbot}?addr={id}`      |
//!
//! A 400 from `/transactions` carries `extras.result_codes`; those become
//! [`LedgerError::Rejected`] so callers can show the composite message and
//! the raw codes side by side.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::client::{LedgerClient, LedgerError, LedgerResult};
use super::types::{AccountRecord, Asset, BalanceLine, ResultCodes, SubmitResult, TransactionEnvelope};
use crate::amount::Amount;
use crate::config::{Network, TokenizationConfig};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AccountResponse {
    account_id: String,
    sequence: String,
    #[serde(default)]
    subentry_count: u32,
    #[serde(default)]
    balances: Vec<BalanceResponse>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: String,
    #[serde(default)]
    limit: Option<String>,
    asset_type: String,
    #[serde(default)]
    asset_code: Option<String>,
    #[serde(default)]
    asset_issuer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    hash: String,
    #[serde(default)]
    ledger: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ProblemResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    extras: Option<ProblemExtras>,
}

#[derive(Debug, Default, Deserialize)]
struct ProblemExtras {
    #[serde(default)]
    result_codes: Option<ResultCodes>,
}

impl AccountResponse {
    fn into_record(self) -> LedgerResult<AccountRecord> {
        let sequence = self
            .sequence
            .parse::<i64>()
            .map_err(|_| LedgerError::UnexpectedResponse(format!("bad sequence '{}'", self.sequence)))?;
        let mut balances = Vec::with_capacity(self.balances.len());
        for line in self.balances {
            // Liquidity-pool shares and friends don't concern us.
            let asset = match (line.asset_type.as_str(), line.asset_code, line.asset_issuer) {
                ("native", _, _) => Asset::Native,
                ("credit_alphanum4" | "credit_alphanum12", Some(code), Some(issuer)) => {
                    Asset::Credit { code, issuer }
                }
                _ => continue,
            };
            let balance = Amount::parse_field(&line.balance, "balance")
                .map_err(|e| LedgerError::UnexpectedResponse(e.to_string()))?;
            let limit = line
                .limit
                .map(|l| Amount::parse_field(&l, "limit"))
                .transpose()
                .map_err(|e| LedgerError::UnexpectedResponse(e.to_string()))?;
            balances.push(BalanceLine {
                asset,
                balance,
                limit,
            });
        }
        Ok(AccountRecord {
            account_id: self.account_id,
            sequence,
            subentry_count: self.subentry_count,
            balances,
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Horizon-backed ledger client.
#[derive(Debug, Clone)]
pub struct HorizonClient {
    http: reqwest::Client,
    network: Network,
    base_url: String,
    faucet_url: Option<String>,
}

impl HorizonClient {
    pub fn new(
        network: Network,
        base_url: impl Into<String>,
        faucet_url: Option<String>,
    ) -> LedgerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            network,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            faucet_url,
        })
    }

    pub fn from_config(config: &TokenizationConfig) -> LedgerResult<Self> {
        Self::new(config.network, config.horizon_url.clone(), config.faucet_url())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn transport(e: reqwest::Error) -> LedgerError {
    LedgerError::Transport(e.to_string())
}

#[async_trait]
impl LedgerClient for HorizonClient {
    fn network(&self) -> Network {
        self.network
    }

    async fn load_account(&self, account_id: &str) -> LedgerResult<AccountRecord> {
        let url = format!("{}/accounts/{}", self.base_url, account_id);
        let response = self.http.get(&url).send().await.map_err(transport)?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LedgerError::AccountNotFound(account_id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::UnexpectedResponse(format!(
                "GET /accounts returned {status}: {body}"
            )));
        }

        let account: AccountResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::UnexpectedResponse(e.to_string()))?;
        account.into_record()
    }

    async fn submit(&self, envelope: &TransactionEnvelope) -> LedgerResult<SubmitResult> {
        let tx = envelope.to_xdr_base64()?;
        let url = format!("{}/transactions", self.base_url);
        debug!(ops = envelope.tx.operations.len(), "submitting transaction to horizon");

        let response = self
            .http
            .post(&url)
            .form(&[("tx", tx.as_str())])
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        if status.is_success() {
            let parsed: SubmitResponse = serde_json::from_str(&body)
                .map_err(|e| LedgerError::UnexpectedResponse(e.to_string()))?;
            info!(tx_hash = %parsed.hash, ledger = ?parsed.ledger, "transaction accepted");
            return Ok(SubmitResult {
                hash: parsed.hash,
                ledger: parsed.ledger,
            });
        }

        let problem: ProblemResponse = serde_json::from_str(&body).unwrap_or_default();
        if let Some(codes) = problem.extras.and_then(|x| x.result_codes) {
            warn!(
                transaction = %codes.transaction,
                operations = ?codes.operations,
                "transaction rejected by horizon"
            );
            return Err(LedgerError::rejected(codes));
        }
        if status == reqwest::StatusCode::BAD_REQUEST {
            let detail = problem
                .detail
                .or(problem.title)
                .unwrap_or_else(|| "Transaction submission failed".to_string());
            return Err(LedgerError::Rejected {
                codes: None,
                detail,
            });
        }
        // 504 and friends: outcome unknown. Surface it, don't guess.
        Err(LedgerError::UnexpectedResponse(format!(
            "POST /transactions returned {status}: {}",
            problem.title.unwrap_or(body)
        )))
    }

    async fn request_faucet_funding(&self, account_id: &str) -> LedgerResult<()> {
        let faucet = self
            .faucet_url
            .as_deref()
            .ok_or(LedgerError::FaucetUnavailable(self.network))?;
        info!(account = %account_id, faucet = %faucet, "requesting faucet funding");

        let response = self
            .http
            .get(faucet)
            .query(&[("addr", account_id)])
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::FaucetFailed {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_response_parsing() {
        let json = r#"{
            "account_id": "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF",
            "sequence": "123456789",
            "subentry_count": 1,
            "balances": [
                {"balance": "1000.0000000", "limit": "5000.0000000",
                 "asset_type": "credit_alphanum4", "asset_code": "WINE",
                 "asset_issuer": "GD7777777777777777777777777777777777777777777777777773DB"},
                {"balance": "1.0000000", "asset_type": "liquidity_pool_shares"},
                {"balance": "9999.9999900", "asset_type": "native"}
            ]
        }"#;
        let parsed: AccountResponse = serde_json::from_str(json).unwrap();
        let record = parsed.into_record().unwrap();
        assert_eq!(record.sequence, 123_456_789);
        assert_eq!(record.balances.len(), 2);
        assert_eq!(record.native_balance().to_string(), "9999.9999900");
        let wine = Asset::Credit {
            code: "WINE".into(),
            issuer: "GD7777777777777777777777777777777777777777777777777773DB".into(),
        };
        assert_eq!(record.balance_of(&wine).unwrap().to_string(), "1000.0000000");
    }

    #[test]
    fn test_problem_parsing() {
        let json = r#"{
            "type": "https://stellar.org/horizon-errors/transaction_failed",
            "title": "Transaction Failed",
            "status": 400,
            "extras": {
                "envelope_xdr": "AAAA",
                "result_codes": {"transaction": "tx_failed", "operations": ["op_underfunded"]}
            }
        }"#;
        let problem: ProblemResponse = serde_json::from_str(json).unwrap();
        let codes = problem.extras.unwrap().result_codes.unwrap();
        let err = LedgerError::rejected(codes);
        assert_eq!(
            err.to_string(),
            "Transaction: Transaction failed. Operation 1: Account has insufficient balance"
        );
    }

    #[test]
    fn test_base_url_normalised() {
        let client =
            HorizonClient::new(Network::Testnet, "https://horizon-testnet.stellar.org/", None)
                .unwrap();
        assert_eq!(client.base_url(), "https://horizon-testnet.stellar.org");
    }

    #[tokio::test]
    async fn test_faucet_unavailable_without_url() {
        let client = HorizonClient::new(Network::Public, "http://127.0.0.1:9", None).unwrap();
        let err = client
            .request_faucet_funding("GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF")
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::FaucetUnavailable(Network::Public));
    }
}
