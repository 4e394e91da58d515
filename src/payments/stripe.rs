use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::StripeSettings;
use crate::error::{AppError, Result, msg};
use crate::models::LineItem;

type HmacSha256 = Hmac<Sha256>;

/// Placeholder Stripe substitutes with the real session id on redirect.
pub const CHECKOUT_SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Everything needed to open a hosted checkout page for a priced cart.
#[derive(Debug)]
pub struct CheckoutSessionRequest<'a> {
    pub intent_id: &'a str,
    pub account_id: &'a str,
    pub items: &'a [LineItem],
    pub currency: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct CreatedCheckoutSession {
    pub id: String,
    pub url: String,
}

/// Whether `id` has the shape of a Stripe checkout session id
/// (`cs_` followed by ASCII letters, digits and underscores).
pub fn is_checkout_session_id(id: &str) -> bool {
    id.len() <= 255
        && id
            .strip_prefix("cs_")
            .is_some_and(|rest| {
                !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
            })
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(settings: &StripeSettings) -> Self {
        Self {
            client: Client::new(),
            secret_key: settings.secret_key.clone(),
            webhook_secret: settings.webhook_secret.clone(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
        }
    }

    fn form_params(req: &CheckoutSessionRequest<'_>) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), req.success_url.to_string()),
            ("cancel_url".to_string(), req.cancel_url.to_string()),
            ("client_reference_id".to_string(), req.account_id.to_string()),
            ("metadata[intent_id]".to_string(), req.intent_id.to_string()),
            ("metadata[account_id]".to_string(), req.account_id.to_string()),
        ];
        for (i, item) in req.items.iter().enumerate() {
            let prefix = format!("line_items[{}]", i);
            form.push((
                format!("{}[price_data][currency]", prefix),
                req.currency.to_string(),
            ));
            form.push((
                format!("{}[price_data][product_data][name]", prefix),
                item.title.clone(),
            ));
            form.push((
                format!("{}[price_data][product_data][metadata][product_id]", prefix),
                item.product_id.clone(),
            ));
            form.push((
                format!("{}[price_data][unit_amount]", prefix),
                item.unit_price_cents.to_string(),
            ));
            form.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
        }
        form
    }

    /// Create a hosted checkout session with ad-hoc `price_data` lines.
    ///
    /// The checkout intent id doubles as Stripe's idempotency key, so a
    /// retried request for the same intent cannot open a second session.
    pub async fn create_checkout_session(
        &self,
        req: &CheckoutSessionRequest<'_>,
    ) -> Result<CreatedCheckoutSession> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .header("Idempotency-Key", req.intent_id)
            .form(&Self::form_params(req))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Stripe API error ({}): {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Stripe response: {}", e)))
    }

    /// Fetch a checkout session by id (used by the post-redirect confirmation path).
    pub async fn retrieve_checkout_session(&self, session_id: &str) -> Result<StripeCheckoutSession> {
        // The id becomes a path segment on an authenticated request
        if !is_checkout_session_id(session_id) {
            return Err(AppError::BadRequest(msg::INVALID_SESSION_ID.into()));
        }

        let response = self
            .client
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, session_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Stripe API error: {}", e)))?;

        match response.status() {
            s if s.is_success() => response.json().await.map_err(|e| {
                AppError::Upstream(format!("Failed to parse Stripe response: {}", e))
            }),
            StatusCode::NOT_FOUND => Err(AppError::NotFound(msg::SESSION_NOT_FOUND.into())),
            status => {
                let error_text = response.text().await.unwrap_or_default();
                Err(AppError::Upstream(format!(
                    "Stripe API error ({}): {}",
                    status, error_text
                )))
            }
        }
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    /// Allowed clock skew for timestamps from the future.
    const WEBHOOK_FUTURE_SKEW_SECS: i64 = 60;

    /// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>`) against the raw body.
    ///
    /// Malformed headers are an `Authenticity` error; a well-formed header
    /// that is stale or doesn't match returns `Ok(false)`.
    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        if self.webhook_secret.is_empty() {
            tracing::error!("Stripe webhook received but STRIPE_WEBHOOK_SECRET is not configured");
            return Err(AppError::Authenticity(msg::INVALID_WEBHOOK_SECRET.into()));
        }

        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in signature.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                signatures.push(s);
            }
        }

        let timestamp_str = timestamp
            .ok_or_else(|| AppError::Authenticity(msg::INVALID_SIGNATURE_FORMAT.into()))?;
        if signatures.is_empty() {
            return Err(AppError::Authenticity(msg::INVALID_SIGNATURE_FORMAT.into()));
        }

        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::Authenticity(msg::INVALID_TIMESTAMP_IN_SIGNATURE.into()))?;

        let age = chrono::Utc::now().timestamp() - timestamp;

        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }

        if age < -Self::WEBHOOK_FUTURE_SKEW_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp in the future (age={}s)",
                age
            );
            return Ok(false);
        }

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(timestamp_str.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());
        let expected_bytes = expected.as_bytes();

        // Stripe may send several v1 signatures during secret rotation.
        // Signature length is public (64 hex chars), so the length check may short-circuit.
        Ok(signatures.iter().any(|provided| {
            let provided = provided.as_bytes();
            provided.len() == expected_bytes.len() && bool::from(expected_bytes.ct_eq(provided))
        }))
    }
}

/// Generic Stripe webhook event. `object` is parsed based on `event_type`.
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ============ checkout.session.* ============

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    /// "open", "complete", or "expired"
    #[serde(default)]
    pub status: Option<String>,
    /// "paid", "unpaid", or "no_payment_required"
    pub payment_status: String,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: StripeMetadata,
}

impl StripeCheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeMetadata {
    pub intent_id: Option<String>,
    pub account_id: Option<String>,
}
