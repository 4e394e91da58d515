mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::{Config, RetryPolicy};
use crate::payments::StripeClient;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Public base URL, used for checkout success/cancel redirects
    pub base_url: String,
    pub stripe: StripeClient,
    /// ISO currency for new checkouts (lowercase)
    pub currency: String,
    pub session_ttl_secs: i64,
    /// Upper bound on a single webhook delivery's processing time
    pub webhook_deadline: Duration,
    pub store_retry: RetryPolicy,
}

impl AppState {
    pub fn new(db: DbPool, config: &Config) -> Self {
        Self {
            db,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            stripe: StripeClient::new(&config.stripe),
            currency: config.currency.clone(),
            session_ttl_secs: config.session_ttl_secs,
            webhook_deadline: config.webhook_deadline,
            store_retry: config.store_retry,
        }
    }
}

/// Every pooled connection enforces foreign keys, waits on writer locks
/// instead of failing immediately, and uses WAL so readers don't block the
/// ledger writer.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;",
        )
    });
    Pool::builder().max_size(10).build(manager)
}
