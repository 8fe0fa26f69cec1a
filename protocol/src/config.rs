//! # Protocol Configuration & Constants
//!
//! Every tunable of the tokenization workflow lives here. Constants mirror
//! the ledger's own rules (fees, precision, reserves); [`TokenizationConfig`]
//! carries the deployment-specific settings and is built exactly once at
//! process start, then shared by reference.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ledger Constants
// ---------------------------------------------------------------------------

/// Base fee per operation, in stroops (0.00001 of the native asset).
pub const BASE_FEE_STROOPS: u32 = 100;

/// Decimal places the ledger tracks for every asset.
pub const AMOUNT_DECIMALS: u32 = 7;

/// Stroops per whole unit. 10^AMOUNT_DECIMALS.
pub const STROOPS_PER_UNIT: i64 = 10_000_000;

/// Base reserve per ledger entry, in stroops (0.5 native units).
pub const BASE_RESERVE_STROOPS: i64 = 5_000_000;

/// Maximum number of operations a single transaction may carry.
pub const MAX_OPERATIONS_PER_TX: usize = 100;

/// Starting balance for a freshly created distribution account.
/// Covers the two-entry minimum plus one trustline.
pub const STARTING_BALANCE: &str = "2.0";

/// Token codes are 1..=12 ASCII alphanumerics.
pub const MAX_TOKEN_CODE_LENGTH: usize = 12;

/// Length of an encoded secret seed (`S...`).
pub const SECRET_SEED_LENGTH: usize = 56;

/// Length of an encoded account id (`G...`).
pub const ACCOUNT_ID_LENGTH: usize = 56;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. Twelve. Always twelve.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

// ---------------------------------------------------------------------------
// Workflow Timing
// ---------------------------------------------------------------------------

/// Expiry window for funding, trustline and distribution transactions.
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(180);

/// Expiry window for the emission envelope. Longer, because a human has to
/// sign it in an external wallet.
pub const EMISSION_TX_TIMEOUT: Duration = Duration::from_secs(300);

/// How many times to poll for a freshly funded account.
pub const ACCOUNT_VERIFY_ATTEMPTS: u32 = 5;

/// Fixed delay between account visibility polls.
pub const ACCOUNT_VERIFY_BACKOFF: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Business Defaults
// ---------------------------------------------------------------------------

/// Basis points in 100%.
pub const MAX_BPS: u32 = 10_000;

/// Platform fee applied when a lot does not specify one (10%).
pub const DEFAULT_PLATFORM_FEE_BPS: u32 = 1_000;

/// Standard bottle.
pub const DEFAULT_BOTTLE_FORMAT_ML: u64 = 750;

/// Native balance the issuer must hold on top of the emission fee (1 unit).
pub const ISSUER_SAFETY_MARGIN_STROOPS: i64 = STROOPS_PER_UNIT;

/// Tolerance when comparing the distribution account's token balance with
/// the expected supply (0.000001 units).
pub const TOKEN_BALANCE_EPSILON_STROOPS: i64 = 10;

// ---------------------------------------------------------------------------
// Service Defaults
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_HTTP_PORT: u16 = 8787;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 8788;

// ---------------------------------------------------------------------------
// Networks
// ---------------------------------------------------------------------------

/// The ledger network the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Network {
    Testnet,
    Futurenet,
    Public,
    Local,
}

impl Network {
    /// The passphrase mixed into every transaction hash. Signatures made
    /// for one network are worthless on another.
    pub fn passphrase(&self) -> &'static str {
        match self {
            Network::Testnet => "Test SDF Network ; September 2015",
            Network::Futurenet => "Test SDF Future Network ; October 2022",
            Network::Public => "Public Global Stellar Network ; September 2015",
            Network::Local => "Standalone Network ; February 2017",
        }
    }

    pub fn default_horizon_url(&self) -> &'static str {
        match self {
            Network::Testnet => "https://horizon-testnet.stellar.org",
            Network::Futurenet => "https://horizon-futurenet.stellar.org",
            Network::Public => "https://horizon.stellar.org",
            Network::Local => "http://localhost:8000",
        }
    }

    /// Public faucet for the network, if there is one. Local networks get
    /// theirs from configuration.
    pub fn public_faucet_url(&self) -> Option<&'static str> {
        match self {
            Network::Testnet => Some("https://friendbot.stellar.org/"),
            Network::Futurenet => Some("https://friendbot-futurenet.stellar.org/"),
            Network::Public | Network::Local => None,
        }
    }

    pub fn explorer_base_url(&self) -> &'static str {
        match self {
            Network::Public => "https://stellar.expert/explorer/public",
            Network::Futurenet => "https://stellar.expert/explorer/futurenet",
            Network::Testnet | Network::Local => "https://stellar.expert/explorer/testnet",
        }
    }

    /// Real money lives here. No faucets, no shortcuts.
    pub fn is_production(&self) -> bool {
        matches!(self, Network::Public)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Testnet => "TESTNET",
            Network::Futurenet => "FUTURENET",
            Network::Public => "PUBLIC",
            Network::Local => "LOCAL",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TESTNET" => Ok(Network::Testnet),
            "FUTURENET" => Ok(Network::Futurenet),
            "PUBLIC" | "MAINNET" => Ok(Network::Public),
            "LOCAL" | "STANDALONE" => Ok(Network::Local),
            other => Err(format!(
                "unknown network '{other}' (expected TESTNET, FUTURENET, PUBLIC or LOCAL)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Deployment settings for the tokenization workflow.
///
/// Constructed once in `main` and handed to every component behind an
/// `Arc`. Nothing downstream reads the environment.
#[derive(Clone)]
pub struct TokenizationConfig {
    /// Which ledger network to talk to.
    pub network: Network,
    /// Horizon endpoint. Defaults to the network's public instance.
    pub horizon_url: String,
    /// Faucet for `LOCAL` networks (e.g. a quickstart container).
    pub local_friendbot_url: Option<String>,
    /// Secret seed of the platform account that pays for new accounts.
    pub funding_secret: Option<String>,
    /// Platform treasury that receives the fee share.
    pub treasury_public_key: Option<String>,
    /// Treasury seed, used only to auto-create its trustlines.
    pub treasury_secret: Option<String>,
    /// Polls before a funded account is declared missing.
    pub verify_attempts: u32,
    /// Delay between polls.
    pub verify_backoff: Duration,
}

impl TokenizationConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            horizon_url: network.default_horizon_url().to_string(),
            local_friendbot_url: None,
            funding_secret: None,
            treasury_public_key: None,
            treasury_secret: None,
            verify_attempts: ACCOUNT_VERIFY_ATTEMPTS,
            verify_backoff: ACCOUNT_VERIFY_BACKOFF,
        }
    }

    pub fn with_horizon_url(mut self, url: impl Into<String>) -> Self {
        self.horizon_url = url.into();
        self
    }

    pub fn with_local_friendbot_url(mut self, url: impl Into<String>) -> Self {
        self.local_friendbot_url = Some(url.into());
        self
    }

    pub fn with_funding_secret(mut self, secret: impl Into<String>) -> Self {
        self.funding_secret = Some(secret.into());
        self
    }

    pub fn with_treasury(mut self, public_key: impl Into<String>, secret: Option<String>) -> Self {
        self.treasury_public_key = Some(public_key.into());
        self.treasury_secret = secret;
        self
    }

    pub fn with_verify_policy(mut self, attempts: u32, backoff: Duration) -> Self {
        self.verify_attempts = attempts.max(1);
        self.verify_backoff = backoff;
        self
    }

    /// Faucet base URL for the configured network, if any.
    pub fn faucet_url(&self) -> Option<String> {
        match self.network {
            Network::Local => self.local_friendbot_url.clone(),
            other => other.public_faucet_url().map(str::to_string),
        }
    }

    /// Block-explorer link for a transaction hash.
    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.network.explorer_base_url(), tx_hash)
    }
}

/// Secrets stay out of logs, even at `debug`.
impl fmt::Debug for TokenizationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(v: &Option<String>) -> &'static str {
            if v.is_some() {
                "<redacted>"
            } else {
                "<unset>"
            }
        }
        f.debug_struct("TokenizationConfig")
            .field("network", &self.network)
            .field("horizon_url", &self.horizon_url)
            .field("local_friendbot_url", &self.local_friendbot_url)
            .field("funding_secret", &redact(&self.funding_secret))
            .field("treasury_public_key", &self.treasury_public_key)
            .field("treasury_secret", &redact(&self.treasury_secret))
            .field("verify_attempts", &self.verify_attempts)
            .field("verify_backoff", &self.verify_backoff)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parsing_is_case_insensitive() {
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("FUTURENET".parse::<Network>().unwrap(), Network::Futurenet);
        assert_eq!(" Public ".parse::<Network>().unwrap(), Network::Public);
        assert_eq!("local".parse::<Network>().unwrap(), Network::Local);
        assert!("moonnet".parse::<Network>().is_err());
    }

    #[test]
    fn test_passphrases_are_distinct() {
        let all = [
            Network::Testnet,
            Network::Futurenet,
            Network::Public,
            Network::Local,
        ];
        for a in all {
            for b in all {
                if a != b {
                    assert_ne!(a.passphrase(), b.passphrase());
                }
            }
        }
    }

    #[test]
    fn test_only_public_is_production() {
        assert!(Network::Public.is_production());
        assert!(!Network::Testnet.is_production());
        assert!(!Network::Futurenet.is_production());
        assert!(!Network::Local.is_production());
    }

    #[test]
    fn test_faucet_selection() {
        assert!(TokenizationConfig::new(Network::Public).faucet_url().is_none());
        assert_eq!(
            TokenizationConfig::new(Network::Testnet).faucet_url().as_deref(),
            Some("https://friendbot.stellar.org/")
        );
        assert!(TokenizationConfig::new(Network::Local).faucet_url().is_none());
        let local = TokenizationConfig::new(Network::Local)
            .with_local_friendbot_url("http://localhost:8000/friendbot");
        assert_eq!(
            local.faucet_url().as_deref(),
            Some("http://localhost:8000/friendbot")
        );
    }

    #[test]
    fn test_explorer_url() {
        let cfg = TokenizationConfig::new(Network::Public);
        assert_eq!(
            cfg.explorer_tx_url("abc"),
            "https://stellar.expert/explorer/public/tx/abc"
        );
        let cfg = TokenizationConfig::new(Network::Testnet);
        assert!(cfg.explorer_tx_url("abc").contains("/testnet/tx/abc"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cfg = TokenizationConfig::new(Network::Testnet)
            .with_funding_secret("SSECRETSECRET")
            .with_treasury("GTREASURY", Some("STREASURYSECRET".into()));
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("SSECRETSECRET"));
        assert!(!rendered.contains("STREASURYSECRET"));
        assert!(rendered.contains("GTREASURY"));
    }

    #[test]
    fn test_stroop_constants_agree() {
        assert_eq!(STROOPS_PER_UNIT, 10i64.pow(AMOUNT_DECIMALS));
        assert!(TOKEN_BALANCE_EPSILON_STROOPS > 0);
        assert!(DEFAULT_PLATFORM_FEE_BPS <= MAX_BPS);
    }
}
