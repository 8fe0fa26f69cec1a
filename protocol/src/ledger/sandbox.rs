//! # Sandbox Ledger
//!
//! An in-process ledger that speaks the same [`LedgerClient`] trait as the
//! Horizon adapter. It is strict where it matters for the workflow:
//!
//! - signatures are verified against the source account over the real
//!   network-bound transaction hash;
//! - sequence numbers, fees and time bounds are enforced;
//! - reserves grow with every trustline (`(2 + subentries) × 0.5`);
//! - issued assets need trustlines, respect limits, and can only be created
//!   by paying out of the issuer.
//!
//! Failures come back as the same `tx_*` / `op_*` result codes Horizon
//! returns, and, just like the real ledger, a transaction that fails at the
//! operation level still burns its fee and sequence number.
//!
//! Not a consensus engine. No offers, no path payments, no multisig
//! thresholds. It models the ledger the tokenization workflow talks to,
//! not the whole network.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use super::client::{LedgerClient, LedgerError, LedgerResult};
use super::types::{
    AccountRecord, Asset, BalanceLine, Operation, ResultCodes, SubmitResult, TransactionEnvelope,
};
use crate::amount::Amount;
use crate::config::{Network, BASE_FEE_STROOPS, BASE_RESERVE_STROOPS, STROOPS_PER_UNIT};
use crate::crypto::keys::{self, signature_hint_of};
use crate::crypto::strkey;

/// What the faucet hands out, in whole units.
const FAUCET_AMOUNT_UNITS: i64 = 10_000;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Trustline {
    balance: i64,
    limit: i64,
}

#[derive(Debug, Clone)]
struct SandboxAccount {
    sequence: i64,
    native: i64,
    trustlines: BTreeMap<Asset, Trustline>,
}

impl SandboxAccount {
    fn new(native: i64, ledger_seq: u32) -> Self {
        Self {
            sequence: i64::from(ledger_seq) << 32,
            native,
            trustlines: BTreeMap::new(),
        }
    }

    fn min_balance(&self, extra_subentries: i64) -> i64 {
        (2 + self.trustlines.len() as i64 + extra_subentries) * BASE_RESERVE_STROOPS
    }

    fn available_native(&self) -> i64 {
        self.native - self.min_balance(0)
    }
}

#[derive(Debug, Default)]
struct SandboxState {
    accounts: HashMap<String, SandboxAccount>,
    ledger_seq: u32,
    clock_offset: i64,
    fail_next: Option<ResultCodes>,
    /// Accounts that stay invisible to `load_account` for this many more
    /// polls after creation.
    hidden: HashMap<String, u32>,
    hide_new_accounts_for: u32,
    submitted: Vec<String>,
}

impl SandboxState {
    fn now(&self) -> u64 {
        (Utc::now().timestamp() + self.clock_offset).max(0) as u64
    }

    fn insert_account(&mut self, id: &str, native: i64) {
        let account = SandboxAccount::new(native, self.ledger_seq);
        self.accounts.insert(id.to_string(), account);
        if self.hide_new_accounts_for > 0 {
            self.hidden.insert(id.to_string(), self.hide_new_accounts_for);
        }
    }
}

// ---------------------------------------------------------------------------
// SandboxLedger
// ---------------------------------------------------------------------------

/// In-memory ledger for tests and local development.
#[derive(Debug)]
pub struct SandboxLedger {
    network: Network,
    faucet_enabled: bool,
    state: Mutex<SandboxState>,
}

impl SandboxLedger {
    /// Fresh ledger. The faucet works everywhere except on the public
    /// network, same as reality.
    pub fn new(network: Network) -> Self {
        Self {
            network,
            faucet_enabled: !network.is_production(),
            state: Mutex::new(SandboxState {
                ledger_seq: 1,
                ..SandboxState::default()
            }),
        }
    }

    pub fn without_faucet(mut self) -> Self {
        self.faucet_enabled = false;
        self
    }

    /// Genesis-style account creation, bypassing transactions.
    pub fn create_account(&self, account_id: &str, native: Amount) {
        let mut state = self.state.lock();
        let ledger_seq = state.ledger_seq;
        state
            .accounts
            .insert(account_id.to_string(), SandboxAccount::new(native.stroops(), ledger_seq));
    }

    /// Give `account_id` a trustline to `asset` directly. Handy for payout
    /// accounts whose keys a test doesn't want to juggle.
    pub fn set_trustline(&self, account_id: &str, asset: &Asset, limit: Amount) -> bool {
        let mut state = self.state.lock();
        match state.accounts.get_mut(account_id) {
            Some(account) => {
                let line = account.trustlines.entry(asset.clone()).or_insert(Trustline {
                    balance: 0,
                    limit: 0,
                });
                line.limit = limit.stroops();
                true
            }
            None => false,
        }
    }

    /// Reject the next submission with `codes`, before it touches state.
    pub fn fail_next_submission(&self, codes: ResultCodes) {
        self.state.lock().fail_next = Some(codes);
    }

    /// Newly created accounts stay invisible for `polls` `load_account`
    /// calls, like a ledger that hasn't closed yet.
    pub fn hide_new_accounts_for(&self, polls: u32) {
        self.state.lock().hide_new_accounts_for = polls;
    }

    /// Shift the sandbox clock (seconds, may be negative).
    pub fn advance_clock(&self, secs: i64) {
        self.state.lock().clock_offset += secs;
    }

    /// Hashes of every accepted transaction, oldest first.
    pub fn submitted_hashes(&self) -> Vec<String> {
        self.state.lock().submitted.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().submitted.len()
    }

    /// Balance of `asset` on `account_id`, skipping visibility games.
    pub fn balance(&self, account_id: &str, asset: &Asset) -> Option<Amount> {
        let state = self.state.lock();
        let account = state.accounts.get(account_id)?;
        match asset {
            Asset::Native => Some(Amount::from_stroops(account.native)),
            credit => account
                .trustlines
                .get(credit)
                .map(|line| Amount::from_stroops(line.balance)),
        }
    }

    fn snapshot(id: &str, account: &SandboxAccount) -> AccountRecord {
        let mut balances = Vec::with_capacity(1 + account.trustlines.len());
        balances.push(BalanceLine {
            asset: Asset::Native,
            balance: Amount::from_stroops(account.native),
            limit: None,
        });
        for (asset, line) in &account.trustlines {
            balances.push(BalanceLine {
                asset: asset.clone(),
                balance: Amount::from_stroops(line.balance),
                limit: Some(Amount::from_stroops(line.limit)),
            });
        }
        AccountRecord {
            account_id: id.to_string(),
            sequence: account.sequence,
            subentry_count: account.trustlines.len() as u32,
            balances,
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction application
// ---------------------------------------------------------------------------

fn reject(code: &str) -> LedgerError {
    LedgerError::rejected(ResultCodes::tx(code))
}

/// Signatures must all belong to the source account, and at least one must.
fn check_signatures(
    envelope: &TransactionEnvelope,
    source: &str,
    hash: &[u8; 32],
) -> Result<(), &'static str> {
    let key = strkey::decode_account_id(source).map_err(|_| "tx_bad_auth")?;
    let hint = signature_hint_of(&key);
    let mut valid = 0usize;
    for sig in &envelope.signatures {
        if sig.hint == hint && keys::verify(&key, hash, &sig.signature) {
            valid += 1;
        } else {
            return Err("tx_bad_auth_extra");
        }
    }
    match valid {
        0 => Err("tx_bad_auth"),
        1 => Ok(()),
        _ => Err("tx_bad_auth_extra"),
    }
}

fn apply_operation(
    accounts: &mut HashMap<String, SandboxAccount>,
    source_id: &str,
    op: &Operation,
    ledger_seq: u32,
) -> Result<(), &'static str> {
    match op {
        Operation::CreateAccount {
            destination,
            starting_balance,
        } => {
            let amount = starting_balance.stroops();
            if amount <= 0 || !strkey::is_valid_account_id(destination) {
                return Err("op_malformed");
            }
            if accounts.contains_key(destination) {
                return Err("op_already_exists");
            }
            if amount < 2 * BASE_RESERVE_STROOPS {
                return Err("op_low_reserve");
            }
            let source = accounts.get_mut(source_id).ok_or("op_no_account")?;
            if source.available_native() < amount {
                return Err("op_underfunded");
            }
            source.native -= amount;
            accounts.insert(destination.clone(), SandboxAccount::new(amount, ledger_seq));
            Ok(())
        }

        Operation::Payment {
            destination,
            asset,
            amount,
        } => {
            let amount = amount.stroops();
            if amount <= 0 {
                return Err("op_malformed");
            }
            if !accounts.contains_key(destination) {
                return Err("op_no_destination");
            }
            match asset {
                Asset::Native => {
                    let source = accounts.get_mut(source_id).ok_or("op_no_account")?;
                    if source.available_native() < amount {
                        return Err("op_underfunded");
                    }
                    source.native -= amount;
                    if let Some(dest) = accounts.get_mut(destination) {
                        dest.native += amount;
                    }
                    Ok(())
                }
                Asset::Credit { issuer, .. } => {
                    if !accounts.contains_key(issuer) {
                        return Err("op_no_issuer");
                    }
                    let source_is_issuer = source_id == issuer;
                    let dest_is_issuer = destination == issuer;

                    if !source_is_issuer {
                        let source = accounts.get(source_id).ok_or("op_no_account")?;
                        let line = source.trustlines.get(asset).ok_or("op_src_no_trust")?;
                        if line.balance < amount {
                            return Err("op_underfunded");
                        }
                    }
                    if !dest_is_issuer {
                        let dest = accounts.get(destination).ok_or("op_no_destination")?;
                        let line = dest.trustlines.get(asset).ok_or("op_no_trust")?;
                        if line.limit - line.balance < amount {
                            return Err("op_line_full");
                        }
                    }

                    if !source_is_issuer {
                        if let Some(line) = accounts
                            .get_mut(source_id)
                            .and_then(|a| a.trustlines.get_mut(asset))
                        {
                            line.balance -= amount;
                        }
                    }
                    if !dest_is_issuer {
                        if let Some(line) = accounts
                            .get_mut(destination)
                            .and_then(|a| a.trustlines.get_mut(asset))
                        {
                            line.balance += amount;
                        }
                    }
                    Ok(())
                }
            }
        }

        Operation::ChangeTrust { asset, limit } => {
            let Asset::Credit { issuer, .. } = asset else {
                return Err("op_malformed");
            };
            if issuer == source_id {
                return Err("op_malformed");
            }
            if !accounts.contains_key(issuer) {
                return Err("op_no_issuer");
            }
            let limit = limit.stroops();
            let source = accounts.get_mut(source_id).ok_or("op_no_account")?;
            match source.trustlines.get(asset).map(|line| line.balance) {
                Some(balance) if limit == 0 => {
                    if balance > 0 {
                        return Err("op_invalid_limit");
                    }
                    source.trustlines.remove(asset);
                }
                Some(balance) => {
                    if limit < balance {
                        return Err("op_invalid_limit");
                    }
                    if let Some(line) = source.trustlines.get_mut(asset) {
                        line.limit = limit;
                    }
                }
                None if limit == 0 => return Err("op_invalid_limit"),
                None => {
                    if source.native < source.min_balance(1) {
                        return Err("op_low_reserve");
                    }
                    source
                        .trustlines
                        .insert(asset.clone(), Trustline { balance: 0, limit });
                }
            }
            Ok(())
        }
    }
}

#[async_trait]
impl LedgerClient for SandboxLedger {
    fn network(&self) -> Network {
        self.network
    }

    async fn load_account(&self, account_id: &str) -> LedgerResult<AccountRecord> {
        let mut state = self.state.lock();
        if let Some(remaining) = state.hidden.get_mut(account_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(LedgerError::AccountNotFound(account_id.to_string()));
            }
        }
        state.hidden.remove(account_id);
        state
            .accounts
            .get(account_id)
            .map(|account| Self::snapshot(account_id, account))
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    async fn submit(&self, envelope: &TransactionEnvelope) -> LedgerResult<SubmitResult> {
        let hash = envelope.hash(self.network).map_err(|e| LedgerError::Rejected {
            codes: None,
            detail: format!("Transaction Malformed: {e}"),
        })?;
        let tx = &envelope.tx;

        let mut state = self.state.lock();
        if let Some(codes) = state.fail_next.take() {
            return Err(LedgerError::rejected(codes));
        }

        // -- Transaction-level validity. Nothing is charged on failure. ----
        if tx.operations.is_empty() {
            return Err(reject("tx_missing_operation"));
        }
        let min_fee = u64::from(BASE_FEE_STROOPS) * tx.operations.len() as u64;
        if u64::from(tx.fee) < min_fee {
            return Err(reject("tx_insufficient_fee"));
        }
        if let Some(tb) = &tx.time_bounds {
            let now = state.now();
            if tb.max_time != 0 && now > tb.max_time {
                return Err(reject("tx_too_late"));
            }
            if now < tb.min_time {
                return Err(reject("tx_too_early"));
            }
        }
        let source = state
            .accounts
            .get(&tx.source_account)
            .ok_or_else(|| reject("tx_no_source_account"))?;
        if tx.sequence != source.sequence + 1 {
            return Err(reject("tx_bad_seq"));
        }
        check_signatures(envelope, &tx.source_account, &hash).map_err(reject)?;
        if source.available_native() < i64::from(tx.fee) {
            return Err(reject("tx_insufficient_balance"));
        }

        // -- Fee and sequence are consumed from here on. -------------------
        if let Some(source) = state.accounts.get_mut(&tx.source_account) {
            source.native -= i64::from(tx.fee);
            source.sequence = tx.sequence;
        }

        let ledger_seq = state.ledger_seq + 1;
        let mut staged = state.accounts.clone();
        let mut op_codes = Vec::with_capacity(tx.operations.len());
        let mut failed = false;
        for op in &tx.operations {
            match apply_operation(&mut staged, &tx.source_account, op, ledger_seq) {
                Ok(()) => op_codes.push("op_success".to_string()),
                Err(code) => {
                    op_codes.push(code.to_string());
                    failed = true;
                    break;
                }
            }
        }
        state.ledger_seq = ledger_seq;

        if failed {
            debug!(codes = ?op_codes, "sandbox transaction failed");
            return Err(LedgerError::rejected(ResultCodes::with_operations(
                "tx_failed",
                op_codes,
            )));
        }

        let created: Vec<String> = staged
            .keys()
            .filter(|id| !state.accounts.contains_key(*id))
            .cloned()
            .collect();
        state.accounts = staged;
        if state.hide_new_accounts_for > 0 {
            let polls = state.hide_new_accounts_for;
            for id in created {
                state.hidden.insert(id, polls);
            }
        }

        let hash_hex = hex::encode(hash);
        state.submitted.push(hash_hex.clone());
        Ok(SubmitResult {
            hash: hash_hex,
            ledger: Some(ledger_seq),
        })
    }

    async fn request_faucet_funding(&self, account_id: &str) -> LedgerResult<()> {
        if !self.faucet_enabled {
            return Err(LedgerError::FaucetUnavailable(self.network));
        }
        if !strkey::is_valid_account_id(account_id) {
            return Err(LedgerError::FaucetFailed {
                status: 400,
                body: "invalid address".into(),
            });
        }
        let mut state = self.state.lock();
        if state.accounts.contains_key(account_id) {
            return Err(LedgerError::FaucetFailed {
                status: 400,
                body: "createAccountAlreadyExist".into(),
            });
        }
        state.insert_account(account_id, FAUCET_AMOUNT_UNITS * STROOPS_PER_UNIT);
        state.ledger_seq += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::LedgerKeypair;
    use crate::ledger::builder::TransactionBuilder;
    use std::time::Duration;

    const NET: Network = Network::Testnet;

    fn units(n: i64) -> Amount {
        Amount::from_units(n).unwrap()
    }

    async fn signed(
        ledger: &SandboxLedger,
        signer: &LedgerKeypair,
        ops: Vec<Operation>,
    ) -> TransactionEnvelope {
        let account = ledger.load_account(&signer.public_key()).await.unwrap();
        let mut b = TransactionBuilder::new(&account).set_timeout(Duration::from_secs(60));
        for op in ops {
            b = b.add_operation(op);
        }
        let mut env = TransactionEnvelope::unsigned(b.build().unwrap());
        env.sign(signer, NET).unwrap();
        env
    }

    fn codes(err: &LedgerError) -> ResultCodes {
        err.result_codes().cloned().expect("rejection with codes")
    }

    #[tokio::test]
    async fn test_create_account_and_sequence() {
        let ledger = SandboxLedger::new(NET);
        let funder = LedgerKeypair::random();
        ledger.create_account(&funder.public_key(), units(100));
        let fresh = LedgerKeypair::random();

        let env = signed(
            &ledger,
            &funder,
            vec![Operation::CreateAccount {
                destination: fresh.public_key(),
                starting_balance: Amount::parse("2.0").unwrap(),
            }],
        )
        .await;
        let result = ledger.submit(&env).await.unwrap();
        assert_eq!(result.hash, env.hash_hex(NET).unwrap());
        assert!(ledger.account_exists(&fresh.public_key()).await.unwrap());

        // Replaying the same envelope hits the sequence check.
        let err = ledger.submit(&env).await.unwrap_err();
        assert_eq!(codes(&err).transaction, "tx_bad_seq");
    }

    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let ledger = SandboxLedger::new(NET);
        let funder = LedgerKeypair::random();
        let imposter = LedgerKeypair::random();
        ledger.create_account(&funder.public_key(), units(100));

        let account = ledger.load_account(&funder.public_key()).await.unwrap();
        let tx = TransactionBuilder::new(&account)
            .add_operation(Operation::CreateAccount {
                destination: LedgerKeypair::random().public_key(),
                starting_balance: units(2),
            })
            .set_timeout(Duration::from_secs(60))
            .build()
            .unwrap();

        let unsigned = TransactionEnvelope::unsigned(tx.clone());
        let err = ledger.submit(&unsigned).await.unwrap_err();
        assert_eq!(codes(&err).transaction, "tx_bad_auth");

        let mut wrong = TransactionEnvelope::unsigned(tx.clone());
        wrong.sign(&imposter, NET).unwrap();
        assert_eq!(
            codes(&ledger.submit(&wrong).await.unwrap_err()).transaction,
            "tx_bad_auth_extra"
        );

        // Signed for another network: the hash differs, so the signature fails.
        let mut other_net = TransactionEnvelope::unsigned(tx);
        other_net.sign(&funder, Network::Public).unwrap();
        assert!(ledger.submit(&other_net).await.is_err());
        assert_eq!(ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_trustline_payment_flow() {
        let ledger = SandboxLedger::new(NET);
        let issuer = LedgerKeypair::random();
        let holder = LedgerKeypair::random();
        ledger.create_account(&issuer.public_key(), units(100));
        ledger.create_account(&holder.public_key(), units(2));
        let wine = Asset::credit("WINE", &issuer.public_key()).unwrap();

        // Payment before the trustline exists.
        let pay = Operation::Payment {
            destination: holder.public_key(),
            asset: wine.clone(),
            amount: units(10),
        };
        let env = signed(&ledger, &issuer, vec![pay.clone()]).await;
        let err = ledger.submit(&env).await.unwrap_err();
        assert_eq!(
            codes(&err),
            ResultCodes::with_operations("tx_failed", vec!["op_no_trust".into()])
        );

        let env = signed(
            &ledger,
            &holder,
            vec![Operation::ChangeTrust {
                asset: wine.clone(),
                limit: units(50),
            }],
        )
        .await;
        ledger.submit(&env).await.unwrap();

        let env = signed(&ledger, &issuer, vec![pay]).await;
        ledger.submit(&env).await.unwrap();
        assert_eq!(ledger.balance(&holder.public_key(), &wine), Some(units(10)));

        // Over the limit.
        let env = signed(
            &ledger,
            &issuer,
            vec![Operation::Payment {
                destination: holder.public_key(),
                asset: wine.clone(),
                amount: units(41),
            }],
        )
        .await;
        let err = ledger.submit(&env).await.unwrap_err();
        assert_eq!(codes(&err).operations, vec!["op_line_full".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_tx_burns_fee_but_not_operations() {
        let ledger = SandboxLedger::new(NET);
        let source = LedgerKeypair::random();
        ledger.create_account(&source.public_key(), units(3));
        let before = ledger.load_account(&source.public_key()).await.unwrap();

        let env = signed(
            &ledger,
            &source,
            vec![
                Operation::Payment {
                    destination: source.public_key(),
                    asset: Asset::Native,
                    amount: Amount::from_stroops(1),
                },
                Operation::CreateAccount {
                    destination: LedgerKeypair::random().public_key(),
                    starting_balance: units(100),
                },
            ],
        )
        .await;
        let err = ledger.submit(&env).await.unwrap_err();
        assert_eq!(
            codes(&err).operations,
            vec!["op_success".to_string(), "op_underfunded".to_string()]
        );

        let after = ledger.load_account(&source.public_key()).await.unwrap();
        assert_eq!(after.sequence, before.sequence + 1);
        assert_eq!(
            after.native_balance().stroops(),
            before.native_balance().stroops() - 200
        );
    }

    #[tokio::test]
    async fn test_trustline_needs_reserve() {
        let ledger = SandboxLedger::new(NET);
        let issuer = LedgerKeypair::random();
        let poor = LedgerKeypair::random();
        ledger.create_account(&issuer.public_key(), units(10));
        ledger.create_account(&poor.public_key(), units(1));
        let env = signed(
            &ledger,
            &poor,
            vec![Operation::ChangeTrust {
                asset: Asset::credit("WINE", &issuer.public_key()).unwrap(),
                limit: units(1),
            }],
        )
        .await;
        // 1.0 covers the base reserve but not the fee on top.
        let err = ledger.submit(&env).await.unwrap_err();
        assert_eq!(codes(&err).transaction, "tx_insufficient_balance");
    }

    #[tokio::test]
    async fn test_expired_transaction() {
        let ledger = SandboxLedger::new(NET);
        let source = LedgerKeypair::random();
        ledger.create_account(&source.public_key(), units(10));
        let env = signed(
            &ledger,
            &source,
            vec![Operation::Payment {
                destination: source.public_key(),
                asset: Asset::Native,
                amount: Amount::from_stroops(1),
            }],
        )
        .await;
        ledger.advance_clock(3600);
        let err = ledger.submit(&env).await.unwrap_err();
        assert_eq!(codes(&err).transaction, "tx_too_late");
        assert_eq!(err.to_string(), "Transaction: Transaction expired");
    }

    #[tokio::test]
    async fn test_faucet_and_visibility_delay() {
        let ledger = SandboxLedger::new(NET);
        ledger.hide_new_accounts_for(2);
        let kp = LedgerKeypair::random();
        ledger.request_faucet_funding(&kp.public_key()).await.unwrap();
        assert!(!ledger.account_exists(&kp.public_key()).await.unwrap());
        assert!(!ledger.account_exists(&kp.public_key()).await.unwrap());
        assert!(ledger.account_exists(&kp.public_key()).await.unwrap());

        let err = ledger.request_faucet_funding(&kp.public_key()).await.unwrap_err();
        assert!(matches!(err, LedgerError::FaucetFailed { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_no_faucet_on_public() {
        let ledger = SandboxLedger::new(Network::Public);
        let err = ledger
            .request_faucet_funding(&LedgerKeypair::random().public_key())
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::FaucetUnavailable(Network::Public));
    }

    #[tokio::test]
    async fn test_fail_next_submission() {
        let ledger = SandboxLedger::new(NET);
        let source = LedgerKeypair::random();
        ledger.create_account(&source.public_key(), units(10));
        ledger.fail_next_submission(ResultCodes::tx("tx_insufficient_fee"));
        let env = signed(
            &ledger,
            &source,
            vec![Operation::Payment {
                destination: source.public_key(),
                asset: Asset::Native,
                amount: Amount::from_stroops(1),
            }],
        )
        .await;
        assert!(ledger.submit(&env).await.is_err());
        // The injected failure is one-shot and charged nothing.
        ledger.submit(&env).await.unwrap();
    }
}
