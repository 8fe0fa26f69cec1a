//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the tokenization workflow over HTTP.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                              | Description                          |
//! |--------|-----------------------------------|--------------------------------------|
//! | GET    | `/health`                         | Liveness check                       |
//! | POST   | `/prepare-token`                  | Register a lot, open its custody     |
//! | POST   | `/prepare-token/retry-trustline`  | Finish a half-prepared lot           |
//! | POST   | `/emission-xdr`                   | Unsigned emission envelope           |
//! | POST   | `/submit-signed`                  | Relay the issuer-signed envelope     |
//! | POST   | `/distribute`                     | Pay out platform / winery / reserve  |
//! | GET    | `/status?code=&issuer=`           | Everything known about one lot       |
//! | GET    | `/distributed-tokens`             | Marketplace listing                  |
//! | GET    | `/ws`                             | Live lifecycle events                |
//!
//! Successful responses are `{ "success": true, ...payload }`. Failures are
//! `{ "error": <message>, "kind": <code>, ...details }` with the status code
//! the error itself picks.

use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use winefi_protocol::amount::Amount;
use winefi_protocol::config::Network;
use winefi_protocol::lifecycle::{
    DistributeOutcome, DistributeRequest, EmissionOutcome, EmissionRequest, LotRef,
    LotStatusView, MarketplacePage, PrepareLotRequest, PrepareOutcome, SubmitOutcome,
    SubmitSignedRequest, Tokenizer, TrustlineOutcome, DEFAULT_LIST_LIMIT,
};
use winefi_protocol::TokenizationError;

use crate::metrics::SharedMetrics;

/// Upper bound on `/distributed-tokens?limit=`.
pub const MAX_LIST_LIMIT: usize = 500;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: the tokenizer and everything else sit behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub network: Network,
    pub tokenizer: Tokenizer,
    /// Lifecycle events for WebSocket subscribers.
    pub event_tx: broadcast::Sender<LotEvent>,
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Nobody listening is fine; the workflow never waits on subscribers.
    fn publish(&self, event: LotEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("no event subscribers");
        }
    }
}

/// Events pushed to WebSocket subscribers after a lifecycle step commits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LotEvent {
    LotPrepared {
        wine_lot_id: Uuid,
        token_code: String,
        issuer_public_key: String,
        distribution_account: String,
        trustline_created: bool,
    },
    TrustlineCreated {
        wine_lot_id: Uuid,
        token_code: String,
        tx_hash: Option<String>,
    },
    EmissionPrepared {
        wine_lot_id: Uuid,
        token_code: String,
        total_supply: String,
    },
    TokensEmitted {
        wine_lot_id: Uuid,
        token_code: String,
        tx_hash: String,
    },
    LotDistributed {
        wine_lot_id: Uuid,
        token_code: String,
        tx_hash: String,
    },
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/prepare-token", post(prepare_handler))
        .route("/prepare-token/retry-trustline", post(retry_trustline_handler))
        .route("/emission-xdr", post(emission_handler))
        .route("/submit-signed", post(submit_handler))
        .route("/distribute", post(distribute_handler))
        .route("/status", get(status_handler))
        .route("/distributed-tokens", get(distributed_tokens_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// `{ "success": true, ...payload }`.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: T,
}

impl<T: Serialize> Success<T> {
    fn json(payload: T) -> Json<Self> {
        Json(Success {
            success: true,
            payload,
        })
    }
}

/// A failed request, rendered as JSON with the error's own status code.
#[derive(Debug)]
pub enum ApiError {
    Workflow(TokenizationError),
    InvalidJson,
    InvalidQuery(String),
}

impl From<TokenizationError> for ApiError {
    fn from(e: TokenizationError) -> Self {
        ApiError::Workflow(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "rejected request body");
        ApiError::InvalidJson
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidQuery(rejection.body_text())
    }
}

/// Error body: message, machine code, and whatever details the variant carries.
fn error_body(e: &TokenizationError) -> serde_json::Value {
    let mut body = json!({ "error": e.to_string(), "kind": e.kind() });
    let extra = match e {
        TokenizationError::Validation {
            field: Some(field), ..
        } => json!({ "field": field }),
        TokenizationError::InvalidTransition {
            current,
            required,
            distribution_tx_hash,
            distributed_at,
            ..
        } => {
            let mut details = json!({ "currentStatus": current });
            if let Some(required) = required {
                details["requiredStatus"] = json!(required);
            }
            if let Some(hash) = distribution_tx_hash {
                details["distributionTxHash"] = json!(hash);
            }
            if let Some(at) = distributed_at {
                details["distributedAt"] = json!(at);
            }
            details
        }
        TokenizationError::InsufficientBalance { current, required } => json!({
            "currentBalance": current.to_string(),
            "requiredBalance": required.to_string(),
        }),
        TokenizationError::InsufficientTokenBalance {
            available, required, ..
        } => json!({
            "availableBalance": available.as_ref().map(Amount::to_string),
            "requiredBalance": required.to_string(),
        }),
        TokenizationError::MissingPayoutAddress { amount, .. } => json!({
            "amount": amount.to_string(),
        }),
        TokenizationError::TransactionRejected {
            codes: Some(codes), ..
        } => json!({
            "details": {
                "transactionCode": codes.transaction,
                "operationCodes": codes.operations,
            }
        }),
        _ => serde_json::Value::Null,
    };
    if let (Some(body), serde_json::Value::Object(extra)) = (body.as_object_mut(), extra) {
        body.extend(extra);
    }
    body
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Workflow(e) => {
                let status = StatusCode::from_u16(e.http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if e.is_server_error() {
                    tracing::error!(kind = e.kind(), error = %e, "request failed");
                } else {
                    tracing::debug!(kind = e.kind(), error = %e, "request refused");
                }
                (status, Json(error_body(&e))).into_response()
            }
            ApiError::InvalidJson => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Invalid JSON in request body",
                    "kind": "validation_error",
                })),
            )
                .into_response(),
            ApiError::InvalidQuery(reason) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": reason, "kind": "validation_error" })),
            )
                .into_response(),
        }
    }
}

type ApiResult<T> = Result<Json<Success<T>>, ApiError>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: liveness check. Does not touch the ledger.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": state.version,
            "network": state.network,
        })),
    )
}

/// `POST /prepare-token`.
async fn prepare_handler(
    State(state): State<AppState>,
    payload: Result<Json<PrepareLotRequest>, JsonRejection>,
) -> ApiResult<PrepareOutcome> {
    let Json(req) = payload?;
    let started = Instant::now();
    let result = state.tokenizer.prepare(req).await;
    state.metrics.observe("prepare", started, &result);
    let outcome = result?;

    let view = state
        .tokenizer
        .db()
        .get_lot(&outcome.wine_lot_id)
        .ok()
        .flatten();
    if let Some(lot) = view {
        state.publish(LotEvent::LotPrepared {
            wine_lot_id: lot.id,
            token_code: lot.token_code,
            issuer_public_key: lot.issuer_public_key,
            distribution_account: outcome.distribution_account.clone(),
            trustline_created: outcome.trustline_tx_hash.is_some(),
        });
    }
    Ok(Success::json(outcome))
}

/// `POST /prepare-token/retry-trustline`.
async fn retry_trustline_handler(
    State(state): State<AppState>,
    payload: Result<Json<LotRef>, JsonRejection>,
) -> ApiResult<TrustlineOutcome> {
    let Json(req) = payload?;
    let token_code = req.token_code.clone().unwrap_or_default().to_uppercase();
    let started = Instant::now();
    let result = state.tokenizer.retry_trustline(req).await;
    state.metrics.observe("retry_trustline", started, &result);
    let outcome = result?;

    state.publish(LotEvent::TrustlineCreated {
        wine_lot_id: outcome.wine_lot_id,
        token_code,
        tx_hash: outcome.trustline_tx_hash.clone(),
    });
    Ok(Success::json(outcome))
}

/// `POST /emission-xdr`.
async fn emission_handler(
    State(state): State<AppState>,
    payload: Result<Json<EmissionRequest>, JsonRejection>,
) -> ApiResult<EmissionOutcome> {
    let Json(req) = payload?;
    let token_code = req.token_code.clone().unwrap_or_default().to_uppercase();
    let started = Instant::now();
    let result = state.tokenizer.emission(req).await;
    state.metrics.observe("emission", started, &result);
    let outcome = result?;

    state.publish(LotEvent::EmissionPrepared {
        wine_lot_id: outcome.wine_lot_id,
        token_code,
        total_supply: outcome.total_supply.clone(),
    });
    Ok(Success::json(outcome))
}

/// `POST /submit-signed`.
async fn submit_handler(
    State(state): State<AppState>,
    payload: Result<Json<SubmitSignedRequest>, JsonRejection>,
) -> ApiResult<SubmitOutcome> {
    let Json(req) = payload?;
    let token_code = req.token_code.clone().unwrap_or_default().to_uppercase();
    let started = Instant::now();
    let result = state.tokenizer.submit(req).await;
    state.metrics.observe("submit", started, &result);
    let outcome = result?;

    state.publish(LotEvent::TokensEmitted {
        wine_lot_id: outcome.wine_lot_id,
        token_code,
        tx_hash: outcome.tx_hash.clone(),
    });
    Ok(Success::json(outcome))
}

/// `POST /distribute`.
async fn distribute_handler(
    State(state): State<AppState>,
    payload: Result<Json<DistributeRequest>, JsonRejection>,
) -> ApiResult<DistributeOutcome> {
    let Json(req) = payload?;
    let token_code = req.token_code.clone().unwrap_or_default().to_uppercase();
    let started = Instant::now();
    let result = state.tokenizer.distribute(req).await;
    state.metrics.observe("distribute", started, &result);
    let outcome = result?;

    state.publish(LotEvent::LotDistributed {
        wine_lot_id: outcome.wine_lot_id,
        token_code,
        tx_hash: outcome.distribution_tx_hash.clone(),
    });
    Ok(Success::json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub code: Option<String>,
    pub issuer: Option<String>,
}

/// `GET /status?code=&issuer=`.
async fn status_handler(
    State(state): State<AppState>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> ApiResult<LotStatusView> {
    let Query(q) = query?;
    let started = Instant::now();
    let result = state.tokenizer.status(
        q.issuer.as_deref().unwrap_or_default(),
        q.code.as_deref().unwrap_or_default(),
    );
    state.metrics.observe("status", started, &result);
    Ok(Success::json(result?))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// `GET /distributed-tokens?limit=&offset=`: newest distribution first.
async fn distributed_tokens_handler(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<MarketplacePage> {
    let Query(q) = query?;
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let offset = q.offset.unwrap_or(0);
    let started = Instant::now();
    let result = state.tokenizer.list_distributed(limit, offset);
    state.metrics.observe("list_distributed", started, &result);
    Ok(Success::json(result?))
}

/// `GET /ws`: WebSocket upgrade for live lifecycle events.
///
/// Clients receive JSON-encoded [`LotEvent`] messages. The connection is
/// push-only; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();
    state.metrics.ws_subscribers.inc();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }

    state.metrics.ws_subscribers.dec();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use winefi_protocol::config::TokenizationConfig;
    use winefi_protocol::crypto::keys::LedgerKeypair;
    use winefi_protocol::ledger::{Asset, LedgerClient, SandboxLedger, TransactionEnvelope};
    use winefi_protocol::storage::TokenizationDb;
    use winefi_protocol::vault::SecretVault;

    const NET: Network = Network::Testnet;

    struct TestApp {
        router: Router,
        state: AppState,
        ledger: Arc<SandboxLedger>,
        issuer: LedgerKeypair,
        winery: LedgerKeypair,
    }

    /// Router over a sandbox ledger with a funded issuer and winery. The
    /// treasury is configured unless `with_treasury` is false.
    fn test_app(with_treasury: bool) -> TestApp {
        let ledger = Arc::new(SandboxLedger::new(NET));
        let issuer = LedgerKeypair::random();
        let treasury = LedgerKeypair::random();
        let winery = LedgerKeypair::random();
        for kp in [&issuer, &treasury, &winery] {
            ledger.create_account(&kp.public_key(), Amount::from_units(50).unwrap());
        }

        let mut config =
            TokenizationConfig::new(NET).with_verify_policy(2, Duration::from_millis(1));
        if with_treasury {
            config = config.with_treasury(treasury.public_key(), Some(treasury.secret()));
        }
        let tokenizer = Tokenizer::new(
            Arc::new(config),
            ledger.clone() as Arc<dyn LedgerClient>,
            TokenizationDb::open_temporary().expect("temp db"),
            Arc::new(SecretVault::new("api-test-master-key").expect("vault")),
        );
        let (event_tx, _) = broadcast::channel(16);
        let state = AppState {
            version: "0.1.0-test".into(),
            network: NET,
            tokenizer,
            event_tx,
            metrics: Arc::new(crate::metrics::NodeMetrics::new().expect("metrics")),
        };
        TestApp {
            router: create_router(state.clone()),
            state,
            ledger,
            issuer,
            winery,
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        send(router, req).await
    }

    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        send(router, req).await
    }

    fn prepare_body(app: &TestApp, code: &str) -> serde_json::Value {
        json!({
            "issuerPublicKey": app.issuer.public_key(),
            "tokenCode": code,
            "wineryName": "Quinta do Vale",
            "region": "Douro",
            "country": "PT",
            "vintage": 2017,
            "bottleCount": "1000",
            "pricePerBottleUsd": 45.5,
            "documentationUrls": ["https://docs.example.org/a.pdf"],
            "metadata": { "grape": "touriga nacional" }
        })
    }

    fn sign_as_issuer(app: &TestApp, xdr: &str) -> String {
        let mut envelope = TransactionEnvelope::from_xdr_base64(xdr).unwrap();
        envelope.sign(&app.issuer, NET).unwrap();
        envelope.to_xdr_base64().unwrap()
    }

    // -- Health ----------------------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = test_app(true);
        let (status, json) = get(&app.router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["network"], "TESTNET");
    }

    // -- Request validation ------------------------------------------------------

    #[tokio::test]
    async fn malformed_json_is_400() {
        let app = test_app(true);
        let req = Request::builder()
            .method("POST")
            .uri("/prepare-token")
            .header("content-type", "application/json")
            .body(Body::from("{ not json"))
            .unwrap();
        let (status, json) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid JSON in request body");
    }

    #[tokio::test]
    async fn missing_fields_are_listed() {
        let app = test_app(true);
        let (status, json) = post_json(
            &app.router,
            "/emission-xdr",
            json!({ "tokenCode": "WINE" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["kind"], "validation_error");
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Missing required fields"));
    }

    #[tokio::test]
    async fn status_of_unknown_lot_is_404() {
        let app = test_app(true);
        let path = format!("/status?code=NOPE&issuer={}", app.issuer.public_key());
        let (status, json) = get(&app.router, &path).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Wine lot not found");
        assert_eq!(json["kind"], "lot_not_found");
    }

    #[tokio::test]
    async fn status_without_params_is_400() {
        let app = test_app(true);
        let (status, _) = get(&app.router, "/status").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // -- Workflow ------------------------------------------------------------------

    #[tokio::test]
    async fn prepare_publishes_event() {
        let app = test_app(true);
        let mut events = app.state.event_tx.subscribe();

        let (status, json) =
            post_json(&app.router, "/prepare-token", prepare_body(&app, "douro17")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["totalTokenSupply"], "1000.0000000");
        assert!(json["trustlineTxHash"].is_string());
        assert!(json.get("warning").is_none());

        match events.try_recv().unwrap() {
            LotEvent::LotPrepared {
                token_code,
                trustline_created,
                distribution_account,
                ..
            } => {
                assert_eq!(token_code, "DOURO17");
                assert!(trustline_created);
                assert_eq!(json["distributionAccount"], distribution_account);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let (status, json) =
            post_json(&app.router, "/prepare-token", prepare_body(&app, "DOURO17")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["kind"], "duplicate_lot");
    }

    #[tokio::test]
    async fn full_workflow_over_http() {
        let app = test_app(true);
        let issuer = app.issuer.public_key();

        let (status, prepared) =
            post_json(&app.router, "/prepare-token", prepare_body(&app, "DOURO17")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, emission) = post_json(
            &app.router,
            "/emission-xdr",
            json!({
                "issuerPublicKey": issuer,
                "tokenCode": "DOURO17",
                "totalSupply": 1000,
                "pricePerUnitUsd": "45.5",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{emission}");
        assert_eq!(emission["distributionAccount"], prepared["distributionAccount"]);
        let signed = sign_as_issuer(&app, emission["xdr"].as_str().unwrap());

        let (status, submitted) = post_json(
            &app.router,
            "/submit-signed",
            json!({ "signedXDR": signed, "tokenCode": "DOURO17", "issuerPublicKey": issuer }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{submitted}");
        assert!(submitted["txHash"].is_string());

        let asset = Asset::credit("DOURO17", &issuer).unwrap();
        app.ledger
            .set_trustline(&app.winery.public_key(), &asset, Amount::from_units(10_000).unwrap());
        let (status, distributed) = post_json(
            &app.router,
            "/distribute",
            json!({
                "issuerPublicKey": issuer,
                "tokenCode": "DOURO17",
                "wineryPayoutPublicKey": app.winery.public_key(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{distributed}");
        assert_eq!(distributed["allocations"]["platformAmount"], "100.0000000");
        assert_eq!(distributed["allocations"]["wineryAmount"], "900.0000000");
        assert_eq!(distributed["allocations"]["reserveAmount"], "0");

        let (status, view) =
            get(&app.router, &format!("/status?code=douro17&issuer={issuer}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["status"], "DISTRIBUTED");
        assert_eq!(view["metadata"]["grape"], "touriga nacional");
        assert_eq!(view["latestDistribution"]["txHash"], distributed["distributionTxHash"]);

        let (status, page) = get(&app.router, "/distributed-tokens?limit=10").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["count"], 1);
        assert_eq!(page["limit"], 10);
        assert_eq!(page["lots"][0]["tokenCode"], "DOURO17");

        // A distributed lot can't be emitted again, and says why.
        let (status, err) = post_json(
            &app.router,
            "/emission-xdr",
            json!({
                "issuerPublicKey": issuer,
                "tokenCode": "DOURO17",
                "totalSupply": 1000,
                "pricePerUnitUsd": 45.5,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["kind"], "invalid_transition");
        assert_eq!(err["currentStatus"], "DISTRIBUTED");
        assert_eq!(err["distributionTxHash"], distributed["distributionTxHash"]);
        assert!(err["distributedAt"].is_string());

        let metrics = app.state.metrics.encode().unwrap();
        assert!(metrics.contains(r#"operation="distribute",outcome="ok""#));
        assert!(metrics.contains(r#"operation="emission",outcome="invalid_transition""#));
    }

    #[tokio::test]
    async fn rejected_submission_reports_codes() {
        let app = test_app(true);
        let issuer = app.issuer.public_key();
        post_json(&app.router, "/prepare-token", prepare_body(&app, "REJ")).await;
        let (_, emission) = post_json(
            &app.router,
            "/emission-xdr",
            json!({
                "issuerPublicKey": issuer,
                "tokenCode": "REJ",
                "totalSupply": "1000",
                "pricePerUnitUsd": 1,
            }),
        )
        .await;

        // Unsigned: the ledger answers tx_bad_auth.
        let (status, err) = post_json(
            &app.router,
            "/submit-signed",
            json!({ "signedXDR": emission["xdr"], "tokenCode": "REJ", "issuerPublicKey": issuer }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["kind"], "transaction_rejected");
        assert_eq!(err["details"]["transactionCode"], "tx_bad_auth");

        let (_, view) = get(&app.router, &format!("/status?code=REJ&issuer={issuer}")).await;
        assert_eq!(view["status"], "EMISSION_PENDING");
    }

    #[tokio::test]
    async fn distribute_without_treasury_is_500() {
        let app = test_app(false);
        let (status, err) = post_json(
            &app.router,
            "/distribute",
            json!({ "issuerPublicKey": app.issuer.public_key(), "tokenCode": "ANY" }),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err["kind"], "configuration_error");
        assert_eq!(err["error"], "Platform treasury not configured");
    }

    #[tokio::test]
    async fn empty_marketplace() {
        let app = test_app(true);
        let (status, page) = get(&app.router, "/distributed-tokens").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["success"], true);
        assert_eq!(page["count"], 0);
        assert_eq!(page["limit"], DEFAULT_LIST_LIMIT);
    }

    #[test]
    fn event_wire_format() {
        let event = LotEvent::TokensEmitted {
            wine_lot_id: Uuid::nil(),
            token_code: "WINE".into(),
            tx_hash: "abc".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tokens_emitted");
        assert_eq!(json["tx_hash"], "abc");
    }
}
