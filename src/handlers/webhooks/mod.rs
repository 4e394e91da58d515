mod stripe;

pub use stripe::*;

use axum::{Router, http::StatusCode, routing::post};

use crate::db::AppState;

/// Status and short acknowledgement text returned to the processor.
pub type WebhookResult = (StatusCode, &'static str);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(handle_stripe_webhook))
        .route("/webhook/stripe", post(handle_stripe_webhook))
}
