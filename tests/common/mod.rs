//! Test utilities and fixtures for storefront integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Form, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

pub use storefront::config::{Config, RateLimitConfig, RetryPolicy, StripeSettings};
pub use storefront::db::{AppState, DbPool, create_pool, init_db, queries};
pub use storefront::handlers;
pub use storefront::models::*;

pub const WEBHOOK_SECRET: &str = "whsec_test123secret456";

/// Argon2 is slow in debug builds; fixtures that never log in use this.
pub const DUMMY_PASSWORD_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNoaGFzaA";

// ============ Mock Stripe ============

#[derive(Default)]
struct MockStripeInner {
    sessions: HashMap<String, Value>,
    idempotency_keys: Vec<String>,
    reject_creates: bool,
}

/// In-process stand-in for the Stripe checkout sessions API.
#[derive(Clone, Default)]
pub struct MockStripe {
    inner: Arc<Mutex<MockStripeInner>>,
}

impl MockStripe {
    pub fn session(&self, id: &str) -> Option<Value> {
        self.inner.lock().unwrap().sessions.get(id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    pub fn idempotency_keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().idempotency_keys.clone()
    }

    /// Register (or replace) a session returned by the retrieve endpoint.
    pub fn put_session(&self, session: Value) {
        let id = session["id"].as_str().unwrap().to_string();
        self.inner.lock().unwrap().sessions.insert(id, session);
    }

    /// Make session creation fail the way Stripe does for a rejected request.
    pub fn reject_session_creation(&self) {
        self.inner.lock().unwrap().reject_creates = true;
    }

    /// Flip a session to complete/paid, as Stripe does once the buyer pays.
    pub fn mark_paid(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        let session = inner.sessions.get_mut(id).expect("unknown mock session");
        session["status"] = json!("complete");
        session["payment_status"] = json!("paid");
    }
}

async fn mock_create_session(
    State(mock): State<MockStripe>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if mock.inner.lock().unwrap().reject_creates {
        return (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({"error": {"type": "invalid_request_error", "message": "Invalid currency"}})),
        )
            .into_response();
    }

    let id = format!("cs_test_{}", uuid::Uuid::new_v4().simple());

    let mut amount_total = 0i64;
    let mut i = 0;
    while let Some(amount) = form.get(&format!("line_items[{}][price_data][unit_amount]", i)) {
        let quantity: i64 = form
            .get(&format!("line_items[{}][quantity]", i))
            .and_then(|q| q.parse().ok())
            .unwrap_or(1);
        amount_total += amount.parse::<i64>().unwrap() * quantity;
        i += 1;
    }

    let session = json!({
        "id": id,
        "object": "checkout.session",
        "status": "open",
        "payment_status": "unpaid",
        "amount_total": amount_total,
        "currency": form.get("line_items[0][price_data][currency]"),
        "client_reference_id": form.get("client_reference_id"),
        "url": format!("https://checkout.stripe.test/pay/{}", id),
        "metadata": {
            "intent_id": form.get("metadata[intent_id]"),
            "account_id": form.get("metadata[account_id]"),
        }
    });

    let mut inner = mock.inner.lock().unwrap();
    if let Some(key) = headers.get("idempotency-key").and_then(|v| v.to_str().ok()) {
        inner.idempotency_keys.push(key.to_string());
    }
    inner.sessions.insert(id, session.clone());
    axum::Json(session).into_response()
}

async fn mock_retrieve_session(State(mock): State<MockStripe>, Path(id): Path<String>) -> Response {
    match mock.session(&id) {
        Some(session) => axum::Json(session).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({"error": {"type": "invalid_request_error", "code": "resource_missing"}})),
        )
            .into_response(),
    }
}

/// Serve the mock on an ephemeral port and return its base URL.
async fn spawn_mock_stripe(mock: MockStripe) -> String {
    let app = Router::new()
        .route("/v1/checkout/sessions", post(mock_create_session))
        .route("/v1/checkout/sessions/{id}", get(mock_retrieve_session))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ============ App state ============

pub fn test_config(database_path: &str, stripe_api_base: &str) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: database_path.to_string(),
        base_url: "http://shop.test".to_string(),
        stripe: StripeSettings {
            secret_key: "sk_test_storefront".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            api_base: stripe_api_base.to_string(),
        },
        currency: "usd".to_string(),
        session_ttl_secs: 3600,
        webhook_deadline: Duration::from_secs(5),
        store_retry: RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(5),
        },
        intent_retention_days: 30,
        bootstrap_admin_email: None,
        bootstrap_admin_password: None,
        rate_limit: RateLimitConfig::disabled(),
        dev_mode: true,
    }
}

/// File-backed pool with the schema applied. Every pooled connection must
/// see the same database, which rules out `:memory:`.
pub fn setup_test_pool() -> (TempDir, DbPool) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("storefront.db");
    let pool = create_pool(path.to_str().unwrap()).expect("Failed to create pool");
    init_db(&pool.get().unwrap()).expect("Failed to initialize schema");
    (dir, pool)
}

/// Running application plus the handles tests poke at.
pub struct TestApp {
    pub state: AppState,
    pub stripe: MockStripe,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let (dir, pool) = setup_test_pool();
        let stripe = MockStripe::default();
        let api_base = spawn_mock_stripe(stripe.clone()).await;
        let db_path = dir.path().join("storefront.db");
        let config = test_config(db_path.to_str().unwrap(), &api_base);
        Self {
            state: AppState::new(pool, &config),
            stripe,
            _dir: dir,
        }
    }

    pub fn router(&self) -> Router {
        handlers::app(self.state.clone(), RateLimitConfig::disabled())
    }

    pub fn conn(&self) -> r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager> {
        self.state.db.get().unwrap()
    }

    /// Send one request through a fresh router and decode the JSON body
    /// (Null for empty bodies, a string for plain-text bodies).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    /// Account plus a live session token.
    pub fn create_user(&self, email: &str, is_admin: bool) -> (Account, String) {
        let conn = self.conn();
        let account = create_test_account(&conn, email, is_admin);
        let token = queries::create_auth_session(&conn, &account.id, 3600).unwrap();
        (account, token)
    }

    pub fn ledger_count(&self, transaction_id: &str) -> i64 {
        count_ledger_entries(&self.conn(), transaction_id)
    }

    pub fn owned(&self, account_id: &str) -> Vec<String> {
        queries::list_owned_product_ids(&self.conn(), account_id).unwrap()
    }
}

// ============ Fixtures ============

pub fn create_test_account(conn: &rusqlite::Connection, email: &str, is_admin: bool) -> Account {
    queries::create_account(conn, email, DUMMY_PASSWORD_HASH, is_admin)
        .expect("Failed to create test account")
}

pub fn create_test_game(
    conn: &rusqlite::Connection,
    id: &str,
    title: &str,
    price_cents: i64,
) -> Product {
    let input = CreateProduct {
        id: Some(id.to_string()),
        title: title.to_string(),
        description: format!("{} description", title),
        price: price_cents as f64 / 100.0,
        category: "Action".to_string(),
        is_trending: false,
        release_date: Some("2021-12-08".to_string()),
        stock: 999,
    };
    queries::create_product(conn, &input, price_cents).expect("Failed to create test game")
}

/// Persist an intent for `games` (quantity 1 each) and attach `session_id`.
pub fn create_test_intent(
    conn: &rusqlite::Connection,
    account_id: &str,
    games: &[&Product],
    session_id: &str,
) -> CheckoutIntent {
    let items: Vec<LineItem> = games
        .iter()
        .map(|g| LineItem {
            product_id: g.id.clone(),
            title: g.title.clone(),
            quantity: 1,
            unit_price_cents: g.price_cents,
        })
        .collect();
    let mut intent = queries::create_checkout_intent(conn, account_id, &items, "usd")
        .expect("Failed to create checkout intent");
    assert!(queries::attach_processor_session(conn, &intent.id, session_id).unwrap());
    intent.processor_session_id = Some(session_id.to_string());
    intent
}

pub fn count_ledger_entries(conn: &rusqlite::Connection, transaction_id: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM orders WHERE transaction_id = ?1",
        [transaction_id],
        |row| row.get(0),
    )
    .unwrap()
}

pub fn count_all_ledger_entries(conn: &rusqlite::Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
        .unwrap()
}

pub fn count_entitlements(conn: &rusqlite::Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM entitlements", [], |row| row.get(0))
        .unwrap()
}

/// Stripe session object as the API (and webhook payloads) present it.
pub fn checkout_session_json(
    session_id: &str,
    intent: &CheckoutIntent,
    payment_status: &str,
) -> Value {
    json!({
        "id": session_id,
        "object": "checkout.session",
        "status": if payment_status == "paid" { "complete" } else { "open" },
        "payment_status": payment_status,
        "amount_total": intent.total_cents,
        "currency": intent.currency,
        "client_reference_id": intent.account_id,
        "metadata": {
            "intent_id": intent.id,
            "account_id": intent.account_id,
        }
    })
}

pub fn checkout_event(event_type: &str, session: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": format!("evt_{}", uuid::Uuid::new_v4().simple()),
        "object": "event",
        "type": event_type,
        "data": { "object": session }
    }))
    .unwrap()
}

// ============ Requests ============

pub fn current_timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// 10 minutes ago, beyond the 5-minute tolerance
pub fn old_timestamp() -> String {
    (chrono::Utc::now().timestamp() - 600).to_string()
}

pub fn compute_stripe_signature(payload: &[u8], secret: &str, timestamp: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

pub fn signature_header(payload: &[u8]) -> String {
    let timestamp = current_timestamp();
    let signature = compute_stripe_signature(payload, WEBHOOK_SECRET, &timestamp);
    format!("t={},v1={}", timestamp, signature)
}

pub fn webhook_request(payload: Vec<u8>, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    builder.body(Body::from(payload)).unwrap()
}

pub fn signed_webhook(payload: Vec<u8>) -> Request<Body> {
    let signature = signature_header(&payload);
    webhook_request(payload, Some(&signature))
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(serde_json::to_vec(&body).unwrap())).unwrap()
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}
