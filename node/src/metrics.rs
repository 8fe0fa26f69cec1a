//! # Prometheus Metrics
//!
//! Operational metrics for the tokenization service, scraped at `/metrics`
//! on the metrics port.
//!
//! Everything lives in a dedicated [`prometheus::Registry`] under the
//! `winefi` namespace so nothing collides with the default global registry.
//!
//! Ledger submissions are counted by [`MeteredLedger`], a thin wrapper
//! around whichever [`LedgerClient`] the node runs with. The workflow itself
//! never knows it is being watched.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use winefi_protocol::config::Network;
use winefi_protocol::ledger::{
    AccountRecord, LedgerClient, LedgerResult, SubmitResult, TransactionEnvelope,
};
use winefi_protocol::TokenizationResult;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly: prometheus handles are reference counted internally.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Workflow calls by operation and outcome (`ok` or the error kind).
    pub workflow_requests_total: IntCounterVec,
    /// Ledger submissions by outcome (`accepted`, `rejected`, `error`).
    pub ledger_submissions_total: IntCounterVec,
    /// Workflow latency in seconds, by operation.
    pub workflow_latency_seconds: HistogramVec,
    /// Currently connected WebSocket subscribers.
    pub ws_subscribers: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("winefi".into()), None)?;

        let workflow_requests_total = IntCounterVec::new(
            Opts::new(
                "workflow_requests_total",
                "Tokenization workflow calls by operation and outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(workflow_requests_total.clone()))?;

        let ledger_submissions_total = IntCounterVec::new(
            Opts::new(
                "ledger_submissions_total",
                "Transactions relayed to the ledger by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(ledger_submissions_total.clone()))?;

        let workflow_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "workflow_latency_seconds",
                "Tokenization workflow latency in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["operation"],
        )?;
        registry.register(Box::new(workflow_latency_seconds.clone()))?;

        let ws_subscribers =
            IntGauge::new("ws_subscribers", "Connected WebSocket event subscribers")?;
        registry.register(Box::new(ws_subscribers.clone()))?;

        Ok(Self {
            registry,
            workflow_requests_total,
            ledger_submissions_total,
            workflow_latency_seconds,
            ws_subscribers,
        })
    }

    /// Record one workflow call.
    pub fn observe<T>(&self, operation: &str, started: Instant, result: &TokenizationResult<T>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        self.workflow_requests_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.workflow_latency_seconds
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Metered ledger
// ---------------------------------------------------------------------------

/// Counts submissions on their way through to the wrapped client.
pub struct MeteredLedger {
    inner: Arc<dyn LedgerClient>,
    metrics: SharedMetrics,
}

impl MeteredLedger {
    pub fn new(inner: Arc<dyn LedgerClient>, metrics: SharedMetrics) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl LedgerClient for MeteredLedger {
    fn network(&self) -> Network {
        self.inner.network()
    }

    async fn load_account(&self, account_id: &str) -> LedgerResult<AccountRecord> {
        self.inner.load_account(account_id).await
    }

    async fn submit(&self, envelope: &TransactionEnvelope) -> LedgerResult<SubmitResult> {
        let result = self.inner.submit(envelope).await;
        let outcome = match &result {
            Ok(_) => "accepted",
            Err(e) if e.result_codes().is_some() => "rejected",
            Err(_) => "error",
        };
        self.metrics
            .ledger_submissions_total
            .with_label_values(&[outcome])
            .inc();
        result
    }

    async fn request_faucet_funding(&self, account_id: &str) -> LedgerResult<()> {
        self.inner.request_faucet_funding(account_id).await
    }
}
