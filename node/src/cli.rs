//! # CLI Interface
//!
//! `clap` derive definitions for `winefi-node`. Every setting has an
//! environment fallback so the service can be configured entirely from a
//! container's env. Parsed once in `main` and turned into an immutable
//! [`TokenizationConfig`]; nothing downstream reads the environment.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use winefi_protocol::config::{
    Network, TokenizationConfig, DEFAULT_HTTP_PORT, DEFAULT_METRICS_PORT,
};
use winefi_protocol::crypto::keys::LedgerKeypair;
use winefi_protocol::crypto::strkey;

use crate::logging::LogFormat;

/// WineFi lot tokenization service.
///
/// Turns wine lots into ledger assets: registers lots, opens custodial
/// accounts, prepares emission envelopes for issuers to sign, and
/// distributes the minted supply.
#[derive(Parser, Debug)]
#[command(
    name = "winefi-node",
    about = "WineFi lot tokenization service",
    version,
    propagate_version = true
)]
pub struct WinefiCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP API.
    Run(RunArgs),
    /// Generate a fresh ledger keypair.
    Keygen(KeygenArgs),
    /// Encrypt a secret seed with the master key, for seeding storage by hand.
    EncryptSecret(EncryptSecretArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Ledger network: TESTNET, FUTURENET, PUBLIC or LOCAL.
    #[arg(long, env = "STELLAR_NETWORK", default_value = "PUBLIC")]
    pub network: Network,

    /// Horizon endpoint. Defaults to the network's public instance.
    #[arg(long, env = "HORIZON_URL")]
    pub horizon_url: Option<String>,

    /// Faucet for LOCAL networks.
    #[arg(long, env = "LOCAL_FRIENDBOT_URL")]
    pub local_friendbot_url: Option<String>,

    /// Master key for custodial secrets at rest.
    #[arg(long, env = "ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: String,

    /// Seed of the platform account that funds new distribution accounts.
    #[arg(long, env = "PLATFORM_FUNDING_SECRET_KEY", hide_env_values = true)]
    pub funding_secret: Option<String>,

    /// Platform treasury address that receives the fee share.
    #[arg(long, env = "PLATFORM_TREASURY_PUBLIC_KEY")]
    pub treasury_public_key: Option<String>,

    /// Treasury seed. Only used to open treasury trustlines on demand.
    #[arg(long, env = "PLATFORM_TREASURY_SECRET_KEY", hide_env_values = true)]
    pub treasury_secret: Option<String>,

    /// Data directory for the embedded database. Created on first run.
    #[arg(long, short = 'd', env = "WINEFI_DATA_DIR", default_value = "./winefi-data")]
    pub data_dir: PathBuf,

    /// Port for the HTTP API.
    #[arg(long, env = "WINEFI_HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "WINEFI_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl RunArgs {
    /// Validate the settings and freeze them into a [`TokenizationConfig`].
    pub fn to_config(&self) -> Result<TokenizationConfig> {
        let mut config = TokenizationConfig::new(self.network);
        if let Some(url) = non_empty(&self.horizon_url) {
            config = config.with_horizon_url(url.trim_end_matches('/'));
        }
        if let Some(url) = non_empty(&self.local_friendbot_url) {
            config = config.with_local_friendbot_url(url);
        }
        if let Some(secret) = non_empty(&self.funding_secret) {
            LedgerKeypair::from_secret(secret)
                .context("PLATFORM_FUNDING_SECRET_KEY is not a valid secret seed")?;
            config = config.with_funding_secret(secret);
        }

        let treasury_secret = non_empty(&self.treasury_secret).map(str::to_string);
        match non_empty(&self.treasury_public_key) {
            Some(pk) => {
                if !strkey::is_valid_account_id(pk) {
                    bail!("PLATFORM_TREASURY_PUBLIC_KEY is not a valid account address");
                }
                if let Some(secret) = &treasury_secret {
                    let kp = LedgerKeypair::from_secret(secret)
                        .context("PLATFORM_TREASURY_SECRET_KEY is not a valid secret seed")?;
                    if kp.public_key() != pk {
                        bail!("PLATFORM_TREASURY_SECRET_KEY does not match PLATFORM_TREASURY_PUBLIC_KEY");
                    }
                }
                config = config.with_treasury(pk, treasury_secret);
            }
            None if treasury_secret.is_some() => {
                bail!("PLATFORM_TREASURY_SECRET_KEY is set without PLATFORM_TREASURY_PUBLIC_KEY")
            }
            None => {}
        }
        Ok(config)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Arguments for the `keygen` subcommand.
#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Also print the secret seed. Anyone who sees it controls the account.
    #[arg(long)]
    pub show_secret: bool,
}

/// Arguments for the `encrypt-secret` subcommand.
#[derive(Parser, Debug)]
pub struct EncryptSecretArgs {
    #[arg(long, env = "ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: String,

    /// Seed to encrypt. Read from stdin when omitted, which keeps it out of
    /// shell history.
    pub secret: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["winefi-node", "run", "--encryption-key", "k"];
        argv.extend_from_slice(extra);
        match WinefiCli::try_parse_from(argv).unwrap().command {
            Commands::Run(args) => args,
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn verify_cli_structure() {
        WinefiCli::command().debug_assert();
    }

    #[test]
    fn network_parses_case_insensitively() {
        let args = run_args(&["--network", "testnet"]);
        assert_eq!(args.network, Network::Testnet);
        let config = args.to_config().unwrap();
        assert_eq!(config.horizon_url, "https://horizon-testnet.stellar.org");
    }

    #[test]
    fn treasury_secret_must_match() {
        let a = LedgerKeypair::random();
        let b = LedgerKeypair::random();
        let pk = a.public_key();
        let secret = b.secret();
        let args = run_args(&[
            "--network",
            "TESTNET",
            "--treasury-public-key",
            &pk,
            "--treasury-secret",
            &secret,
        ]);
        assert!(args.to_config().is_err());
    }

    #[test]
    fn local_friendbot_is_used_as_faucet() {
        let args = run_args(&[
            "--network",
            "LOCAL",
            "--local-friendbot-url",
            "http://localhost:8000/friendbot",
        ]);
        let config = args.to_config().unwrap();
        assert_eq!(
            config.faucet_url().as_deref(),
            Some("http://localhost:8000/friendbot")
        );
    }
}
