// Custody-path benchmarks for the WineFi protocol.
//
// Covers what a single distribute call pays for on our side of the wire:
// key generation, vault encryption round trips, envelope signing and XDR
// encoding, and the allocation split at a few payout counts.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use winefi_protocol::amount::Amount;
use winefi_protocol::config::{Network, DEFAULT_TX_TIMEOUT};
use winefi_protocol::crypto::keys::LedgerKeypair;
use winefi_protocol::ledger::{
    AccountRecord, Asset, Operation, TransactionBuilder, TransactionEnvelope,
};
use winefi_protocol::lifecycle::compute_allocation;
use winefi_protocol::vault::SecretVault;

fn account(kp: &LedgerKeypair) -> AccountRecord {
    AccountRecord {
        account_id: kp.public_key(),
        sequence: 42 << 32,
        subentry_count: 1,
        balances: Vec::new(),
    }
}

fn bench_keypair_generation(c: &mut Criterion) {
    c.bench_function("custody/keypair_random", |b| {
        b.iter(LedgerKeypair::random);
    });
}

fn bench_vault(c: &mut Criterion) {
    let vault = SecretVault::new("bench-master-key-material").expect("vault");
    let secret = LedgerKeypair::random().secret();
    let blob = vault.encrypt(&secret).expect("encrypt");

    c.bench_function("custody/vault_encrypt", |b| {
        b.iter(|| vault.encrypt(&secret).expect("encrypt"));
    });
    c.bench_function("custody/vault_decrypt_keypair", |b| {
        b.iter(|| vault.decrypt_keypair(&blob).expect("decrypt"));
    });
}

fn bench_sign_distribution(c: &mut Criterion) {
    let issuer = LedgerKeypair::random();
    let distribution = LedgerKeypair::random();
    let asset = Asset::credit("PAUIL18", &issuer.public_key()).expect("asset");
    let source = account(&distribution);

    let mut group = c.benchmark_group("custody/sign_distribution");
    for payouts in [1usize, 3, 10] {
        let destinations: Vec<String> = (0..payouts)
            .map(|_| LedgerKeypair::random().public_key())
            .collect();
        group.throughput(Throughput::Elements(payouts as u64));
        group.bench_with_input(BenchmarkId::from_parameter(payouts), &payouts, |b, _| {
            b.iter(|| {
                let mut builder = TransactionBuilder::new(&source).base_fee(100);
                for dest in &destinations {
                    builder = builder.add_operation(Operation::Payment {
                        destination: dest.clone(),
                        asset: asset.clone(),
                        amount: Amount::from_stroops(1_000_000_000),
                    });
                }
                let tx = builder.set_timeout(DEFAULT_TX_TIMEOUT).build().expect("build");
                let mut envelope = TransactionEnvelope::unsigned(tx);
                envelope.sign(&distribution, Network::Testnet).expect("sign");
                envelope.to_xdr_base64().expect("encode")
            });
        });
    }
    group.finish();
}

fn bench_allocation(c: &mut Criterion) {
    let total = Amount::parse("123456.7890123").expect("amount");
    c.bench_function("custody/compute_allocation", |b| {
        b.iter(|| compute_allocation(total, 1000, 250));
    });
}

criterion_group!(
    benches,
    bench_keypair_generation,
    bench_vault,
    bench_sign_distribution,
    bench_allocation,
);
criterion_main!(benches);
