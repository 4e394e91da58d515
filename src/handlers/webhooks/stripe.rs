use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::fulfillment::{
    FulfillmentRequest, FulfillmentStatus, fulfill, resolve_intent, with_store_retry,
};
use crate::models::OrderSource;
use crate::payments::{StripeCheckoutSession, StripeWebhookEvent};

use super::WebhookResult;

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
const ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";

/// `POST /webhook`: apply a signed Stripe event.
///
/// Responds 2xx only once the payment has been durably applied (or when
/// the event is one that must not be redelivered), 401 for anything not
/// signed with our secret, and 503 when the store could not be reached in
/// time so that Stripe retries.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome = tokio::time::timeout(
        state.webhook_deadline,
        process_stripe_webhook(&state, &headers, &body),
    )
    .await;

    match outcome {
        Ok(Ok(result)) => result.into_response(),
        Ok(Err(AppError::MalformedEvent(reason))) => {
            // Redelivering a signed but unusable event will never succeed
            tracing::error!("Unprocessable Stripe event acknowledged: {}", reason);
            (StatusCode::OK, "Malformed event").into_response()
        }
        Ok(Err(e)) => e.into_response(),
        Err(_) => {
            tracing::error!(
                "Stripe webhook exceeded {:?} deadline",
                state.webhook_deadline
            );
            AppError::Unavailable(msg::DEADLINE_EXCEEDED.into()).into_response()
        }
    }
}

fn extract_signature(headers: &HeaderMap) -> Result<&str> {
    headers
        .get("stripe-signature")
        .ok_or_else(|| AppError::Authenticity(msg::MISSING_SIGNATURE.into()))?
        .to_str()
        .map_err(|_| AppError::Authenticity(msg::INVALID_SIGNATURE_FORMAT.into()))
}

async fn process_stripe_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<WebhookResult> {
    // 1. Authenticity: nothing below runs for unsigned payloads
    let signature = extract_signature(headers)?;
    if !state.stripe.verify_webhook_signature(body, signature)? {
        return Err(AppError::Authenticity(msg::SIGNATURE_MISMATCH.into()));
    }

    let event: StripeWebhookEvent = serde_json::from_slice(body)
        .map_err(|e| AppError::MalformedEvent(format!("Invalid event JSON: {}", e)))?;
    let event_id = event.id.as_deref().unwrap_or("<none>");

    // 2. Event filter
    if event.event_type != CHECKOUT_COMPLETED && event.event_type != ASYNC_PAYMENT_SUCCEEDED {
        tracing::debug!("Ignoring Stripe event {} ({})", event_id, event.event_type);
        return Ok((StatusCode::OK, "Event ignored"));
    }

    let session: StripeCheckoutSession = serde_json::from_value(event.data.object)
        .map_err(|e| AppError::MalformedEvent(format!("Invalid checkout session: {}", e)))?;

    if !session.is_paid() {
        // Delayed payment methods complete later via async_payment_succeeded
        tracing::info!(
            "Checkout session {} completed with payment_status={}, awaiting payment",
            session.id,
            session.payment_status
        );
        return Ok((StatusCode::OK, "Payment not yet settled"));
    }

    tracing::info!(
        "Stripe event {} ({}) for session {}",
        event_id,
        event.event_type,
        session.id
    );

    // 3. Idempotency check before touching the intent
    let existing = with_store_retry(&state.store_retry, "ledger lookup", || {
        let conn = state.db.get()?;
        queries::find_ledger_entry(&conn, &session.id)
    })
    .await?;
    if let Some(order) = existing {
        crate::fulfillment::finish_existing(state, order).await?;
        return Ok((StatusCode::OK, "Already processed"));
    }

    // 4. Load the persisted intent
    let intent = with_store_retry(&state.store_retry, "intent lookup", || {
        let conn = state.db.get()?;
        resolve_intent(&conn, &session)
    })
    .await?;

    // 5. Durable transition
    let charged = session.amount_total.zip(session.currency.clone());
    let outcome = fulfill(
        state,
        &FulfillmentRequest {
            transaction_id: &session.id,
            intent: &intent,
            charged,
            source: OrderSource::Webhook,
        },
    )
    .await?;

    Ok(match outcome.status {
        FulfillmentStatus::Fulfilled => (StatusCode::OK, "Order fulfilled"),
        FulfillmentStatus::AlreadyFulfilled => (StatusCode::OK, "Already processed"),
    })
}
