//! # Account Funding
//!
//! A freshly generated keypair is just 32 random bytes until somebody puts
//! native currency into it. [`AccountFunder`] does that, in order of
//! preference:
//!
//! 1. **Funding key.** If the platform has a funding account, it sends a
//!    `CreateAccount` with the minimum starting balance.
//! 2. **Faucet.** Test networks hand out free money.
//! 3. **Give up.** On the public network that is [`FundingRequired`], a hard
//!    error. Anywhere else it is [`FundingUnavailable`].
//!
//! Either way, the account is not considered funded until the ledger
//! actually returns it: ledger close and API caching mean a successful
//! submit can take a few seconds to become readable.
//!
//! [`FundingRequired`]: TokenizationError::FundingRequired
//! [`FundingUnavailable`]: TokenizationError::FundingUnavailable

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::amount::Amount;
use crate::config::{TokenizationConfig, BASE_FEE_STROOPS, DEFAULT_TX_TIMEOUT, STARTING_BALANCE};
use crate::crypto::keys::LedgerKeypair;
use crate::error::{TokenizationError, TokenizationResult};
use crate::ledger::{LedgerClient, LedgerError, Operation, TransactionBuilder, TransactionEnvelope};

/// Gets new accounts onto the ledger.
#[derive(Clone)]
pub struct AccountFunder {
    config: Arc<TokenizationConfig>,
    ledger: Arc<dyn LedgerClient>,
}

impl AccountFunder {
    pub fn new(config: Arc<TokenizationConfig>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self { config, ledger }
    }

    /// Fund `public_key` and wait until the ledger shows it.
    pub async fn fund_account(&self, public_key: &str) -> TokenizationResult<()> {
        match self.config.funding_secret.as_deref() {
            Some(secret) => self.fund_from_platform(secret, public_key).await?,
            None if self.config.network.is_production() => {
                return Err(TokenizationError::FundingRequired)
            }
            None => self.fund_from_faucet(public_key).await?,
        }
        self.wait_until_visible(public_key).await
    }

    async fn fund_from_platform(&self, secret: &str, public_key: &str) -> TokenizationResult<()> {
        let funder = LedgerKeypair::from_secret(secret).map_err(|e| {
            TokenizationError::Configuration(format!("PLATFORM_FUNDING_SECRET_KEY is invalid: {e}"))
        })?;
        let source = self.ledger.load_account(&funder.public_key()).await.map_err(|e| {
            TokenizationError::FundingFailed(format!("funding account unavailable: {e}"))
        })?;

        let starting_balance = Amount::parse(STARTING_BALANCE)?;
        let tx = TransactionBuilder::new(&source)
            .base_fee(BASE_FEE_STROOPS)
            .add_operation(Operation::CreateAccount {
                destination: public_key.to_string(),
                starting_balance,
            })
            .set_timeout(DEFAULT_TX_TIMEOUT)
            .build()?;
        let mut envelope = TransactionEnvelope::unsigned(tx);
        envelope
            .sign(&funder, self.config.network)
            .map_err(LedgerError::from)?;

        info!(account = %public_key, funder = %funder.public_key(), "funding account from platform key");
        let result = self
            .ledger
            .submit(&envelope)
            .await
            .map_err(|e| TokenizationError::FundingFailed(e.to_string()))?;
        debug!(tx_hash = %result.hash, "create_account accepted");
        Ok(())
    }

    async fn fund_from_faucet(&self, public_key: &str) -> TokenizationResult<()> {
        match self.ledger.request_faucet_funding(public_key).await {
            Ok(()) => Ok(()),
            Err(LedgerError::FaucetUnavailable(network)) => {
                warn!(%network, "no funding key and no faucet");
                Err(TokenizationError::FundingUnavailable)
            }
            Err(e) => Err(TokenizationError::FundingFailed(e.to_string())),
        }
    }

    async fn wait_until_visible(&self, public_key: &str) -> TokenizationResult<()> {
        let attempts = self.config.verify_attempts.max(1);
        for attempt in 1..=attempts {
            match self.ledger.account_exists(public_key).await {
                Ok(true) => {
                    debug!(account = %public_key, attempt, "funded account visible");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => warn!(account = %public_key, attempt, error = %e, "account check failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.verify_backoff).await;
            }
        }
        Err(TokenizationError::FundingFailed(format!(
            "account {public_key} not visible after {attempts} attempts"
        )))
    }
}

impl std::fmt::Debug for AccountFunder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountFunder")
            .field("network", &self.config.network)
            .field("funding_key", &self.config.funding_secret.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::ledger::{Asset, SandboxLedger};
    use std::time::Duration;

    fn setup(
        config: TokenizationConfig,
        ledger: SandboxLedger,
    ) -> (AccountFunder, Arc<SandboxLedger>) {
        let ledger = Arc::new(ledger);
        let config = config.with_verify_policy(3, Duration::from_millis(1));
        (
            AccountFunder::new(Arc::new(config), ledger.clone() as Arc<dyn LedgerClient>),
            ledger,
        )
    }

    #[tokio::test]
    async fn test_faucet_path() {
        let (funder, ledger) = setup(
            TokenizationConfig::new(Network::Testnet),
            SandboxLedger::new(Network::Testnet),
        );
        let account = LedgerKeypair::random().public_key();
        funder.fund_account(&account).await.unwrap();
        assert!(ledger.balance(&account, &Asset::Native).unwrap().is_positive());
    }

    #[tokio::test]
    async fn test_funding_key_path() {
        let platform = LedgerKeypair::random();
        let sandbox = SandboxLedger::new(Network::Public);
        sandbox.create_account(&platform.public_key(), Amount::from_units(100).unwrap());
        let (funder, ledger) = setup(
            TokenizationConfig::new(Network::Public).with_funding_secret(platform.secret()),
            sandbox,
        );

        let account = LedgerKeypair::random().public_key();
        funder.fund_account(&account).await.unwrap();
        assert_eq!(
            ledger.balance(&account, &Asset::Native),
            Some(Amount::parse("2").unwrap())
        );
        assert_eq!(ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_public_without_key_is_a_hard_error() {
        let (funder, ledger) = setup(
            TokenizationConfig::new(Network::Public),
            SandboxLedger::new(Network::Public),
        );
        let err = funder
            .fund_account(&LedgerKeypair::random().public_key())
            .await
            .unwrap_err();
        assert_eq!(err, TokenizationError::FundingRequired);
        assert_eq!(ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_no_faucet_no_key() {
        let (funder, _) = setup(
            TokenizationConfig::new(Network::Local),
            SandboxLedger::new(Network::Local).without_faucet(),
        );
        let err = funder
            .fund_account(&LedgerKeypair::random().public_key())
            .await
            .unwrap_err();
        assert_eq!(err, TokenizationError::FundingUnavailable);
    }

    #[tokio::test]
    async fn test_waits_for_visibility() {
        let sandbox = SandboxLedger::new(Network::Testnet);
        sandbox.hide_new_accounts_for(2);
        let (funder, _) = setup(TokenizationConfig::new(Network::Testnet), sandbox);
        funder
            .fund_account(&LedgerKeypair::random().public_key())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_gives_up_when_never_visible() {
        let sandbox = SandboxLedger::new(Network::Testnet);
        sandbox.hide_new_accounts_for(10);
        let (funder, _) = setup(TokenizationConfig::new(Network::Testnet), sandbox);
        let err = funder
            .fund_account(&LedgerKeypair::random().public_key())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "funding_failed");
    }

    #[tokio::test]
    async fn test_broke_funding_account() {
        let platform = LedgerKeypair::random();
        let sandbox = SandboxLedger::new(Network::Testnet);
        sandbox.create_account(&platform.public_key(), Amount::parse("2.5").unwrap());
        let (funder, _) = setup(
            TokenizationConfig::new(Network::Testnet).with_funding_secret(platform.secret()),
            sandbox,
        );
        let err = funder
            .fund_account(&LedgerKeypair::random().public_key())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "funding_failed");
        assert!(err.to_string().contains("insufficient balance"));
    }
}
