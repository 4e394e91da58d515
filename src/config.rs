use std::env;
use std::time::Duration;

/// Per-IP request budgets for the public surface.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Login, registration, checkout and confirmation
    pub strict_rpm: u32,
    /// Catalog browsing, session probes, support tickets
    pub standard_rpm: u32,
}

impl RateLimitConfig {
    /// Disabled limits are represented as zero and skip the layer entirely.
    pub fn disabled() -> Self {
        Self {
            strict_rpm: 0,
            standard_rpm: 0,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strict_rpm: 10,
            standard_rpm: 60,
        }
    }
}

/// Bounded exponential backoff for store writes on the fulfillment path.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Overridable so tests and staging can point at a stand-in server
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub stripe: StripeSettings,
    pub currency: String,
    pub session_ttl_secs: i64,
    pub webhook_deadline: Duration,
    pub store_retry: RetryPolicy,
    pub intent_retention_days: i64,
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_password: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub dev_mode: bool,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("STOREFRONT_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env_parse("PORT", 3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let defaults = RetryPolicy::default();
        let rate_defaults = RateLimitConfig::default();

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "storefront.db".to_string()),
            base_url,
            stripe: StripeSettings {
                secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
                api_base: env::var("STRIPE_API_BASE")
                    .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            },
            currency: env::var("STORE_CURRENCY")
                .map(|c| c.to_lowercase())
                .unwrap_or_else(|_| "usd".to_string()),
            session_ttl_secs: env_parse("SESSION_TTL_SECS", 7 * 24 * 3600),
            webhook_deadline: Duration::from_secs(env_parse("WEBHOOK_DEADLINE_SECS", 8)),
            store_retry: RetryPolicy {
                attempts: env_parse("STORE_RETRY_ATTEMPTS", defaults.attempts).max(1),
                base_delay: Duration::from_millis(env_parse(
                    "STORE_RETRY_BASE_MS",
                    defaults.base_delay.as_millis() as u64,
                )),
            },
            intent_retention_days: env_parse("CHECKOUT_INTENT_RETENTION_DAYS", 30),
            bootstrap_admin_email: env::var("BOOTSTRAP_ADMIN_EMAIL").ok(),
            bootstrap_admin_password: env::var("BOOTSTRAP_ADMIN_PASSWORD").ok(),
            rate_limit: RateLimitConfig {
                strict_rpm: env_parse("RATE_LIMIT_STRICT_RPM", rate_defaults.strict_rpm),
                standard_rpm: env_parse("RATE_LIMIT_STANDARD_RPM", rate_defaults.standard_rpm),
            },
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
