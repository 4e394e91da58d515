//! Exactly-once order fulfillment.
//!
//! Both the signed webhook and the post-redirect confirmation path end up in
//! [`fulfill`]. The ledger write is the idempotency gate: the first caller to
//! append the completed entry for a transaction id wins, every other caller
//! observes `AlreadyFulfilled`. Entitlements are granted after the ledger
//! write and the entry is then marked as propagated, so a crash in between
//! is repaired by redelivery or by [`recover_unpropagated`].

use serde::Serialize;

use crate::config::RetryPolicy;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::{CheckoutIntent, CreateOrder, Order, OrderItem, OrderSource};
use crate::payments::StripeCheckoutSession;

/// Most unpropagated entries handled per recovery pass.
const RECOVERY_BATCH: i64 = 500;

/// Run a store operation, retrying transient failures with exponential backoff.
///
/// The closure must acquire and release its own connection so nothing is
/// held across the sleep. Exhausted retries surface as `Unavailable`.
pub async fn with_store_retry<T, F>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    operation,
                    attempt,
                    policy.attempts,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                tracing::error!(
                    "{} failed after {} attempts: {}",
                    operation,
                    policy.attempts,
                    e
                );
                return Err(AppError::Unavailable(crate::error::msg::STORE_UNAVAILABLE.into()));
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Fulfilled,
    AlreadyFulfilled,
}

#[derive(Debug, Clone)]
pub struct FulfillmentOutcome {
    pub status: FulfillmentStatus,
    pub order: Order,
}

/// One completed payment to apply.
#[derive(Debug)]
pub struct FulfillmentRequest<'a> {
    /// Processor checkout session id
    pub transaction_id: &'a str,
    pub intent: &'a CheckoutIntent,
    /// Amount the processor reports as charged, when known
    pub charged: Option<(i64, String)>,
    pub source: OrderSource,
}

impl FulfillmentRequest<'_> {
    fn to_create_order(&self) -> CreateOrder {
        let intent = self.intent;
        let (total_cents, currency) = match &self.charged {
            Some((total, currency)) => {
                if *total != intent.total_cents || !currency.eq_ignore_ascii_case(&intent.currency) {
                    tracing::warn!(
                        "Charged amount {} {} differs from checkout intent {} ({} {}) for transaction {}",
                        total,
                        currency,
                        intent.id,
                        intent.total_cents,
                        intent.currency,
                        self.transaction_id
                    );
                }
                (*total, currency.to_lowercase())
            }
            None => (intent.total_cents, intent.currency.clone()),
        };

        CreateOrder {
            transaction_id: self.transaction_id.to_string(),
            account_id: intent.account_id.clone(),
            intent_id: Some(intent.id.clone()),
            items: intent
                .items
                .iter()
                .map(|line| OrderItem {
                    product_id: line.product_id.clone(),
                    title: line.title.clone(),
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price_cents,
                })
                .collect(),
            total_cents,
            currency,
            source: self.source,
        }
    }
}

/// Apply a completed payment exactly once.
pub async fn fulfill(state: &AppState, request: &FulfillmentRequest<'_>) -> Result<FulfillmentOutcome> {
    let policy = &state.store_retry;
    let transaction_id = request.transaction_id;

    let existing = with_store_retry(policy, "ledger lookup", || {
        let conn = state.db.get()?;
        queries::find_ledger_entry(&conn, transaction_id)
    })
    .await?;
    if let Some(order) = existing {
        tracing::info!("Transaction {} already recorded as order {}", transaction_id, order.id);
        return finish_existing(state, order).await;
    }

    let input = request.to_create_order();
    let recorded = with_store_retry(policy, "ledger write", || {
        let mut conn = state.db.get()?;
        queries::record_ledger_entry(&mut conn, &input)
    })
    .await;

    let order = match recorded {
        Ok(order) => order,
        Err(AppError::DuplicateTransaction(_)) => {
            // Another trigger won the race between our lookup and our write
            tracing::info!("Transaction {} recorded concurrently", transaction_id);
            let order = with_store_retry(policy, "ledger lookup", || {
                let conn = state.db.get()?;
                queries::find_ledger_entry(&conn, transaction_id)
            })
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Ledger reported duplicate for {} but no entry was found",
                    transaction_id
                ))
            })?;
            return finish_existing(state, order).await;
        }
        Err(e) => return Err(e),
    };

    tracing::info!(
        "Recorded order {} for transaction {} (account {}, {} items, {} {}, via {})",
        order.id,
        transaction_id,
        order.account_id,
        order.items.len(),
        order.total_cents,
        order.currency,
        order.source.as_ref()
    );

    let order = propagate(state, order).await?;
    Ok(FulfillmentOutcome {
        status: FulfillmentStatus::Fulfilled,
        order,
    })
}

/// Complete propagation for an entry recorded earlier (possibly by a
/// process that crashed before granting) and report it as already fulfilled.
pub async fn finish_existing(state: &AppState, order: Order) -> Result<FulfillmentOutcome> {
    let order = propagate(state, order).await?;
    Ok(FulfillmentOutcome {
        status: FulfillmentStatus::AlreadyFulfilled,
        order,
    })
}

/// Grant the entry's games and set its propagation marker, atomically.
/// No-op for entries already marked.
async fn propagate(state: &AppState, mut order: Order) -> Result<Order> {
    if order.propagated_at.is_some() {
        return Ok(order);
    }

    let product_ids = order.product_ids();
    let granted = with_store_retry(&state.store_retry, "entitlement grant", || {
        let mut conn = state.db.get()?;
        let tx = conn.transaction()?;
        let granted = queries::grant_entitlements(
            &tx,
            &order.account_id,
            &product_ids,
            Some(order.id.as_str()),
        )?;
        queries::mark_order_propagated(&tx, &order.id)?;
        tx.commit()?;
        Ok(granted)
    })
    .await?;

    tracing::debug!(
        "Order {}: granted {} new of {} games to account {}",
        order.id,
        granted,
        product_ids.len(),
        order.account_id
    );
    order.propagated_at = Some(chrono::Utc::now().timestamp());
    Ok(order)
}

/// Find the persisted checkout intent for a processor session.
///
/// The intent is looked up by the session id recorded at checkout, falling
/// back to the `intent_id` metadata for sessions whose id was never
/// attached (crash between session creation and the attach write). The
/// `account_id` metadata must name the intent's buyer.
pub fn resolve_intent(
    conn: &rusqlite::Connection,
    session: &StripeCheckoutSession,
) -> Result<CheckoutIntent> {
    let intent = match queries::get_checkout_intent_by_session(conn, &session.id)? {
        Some(intent) => intent,
        None => {
            let intent_id = session.metadata.intent_id.as_deref().ok_or_else(|| {
                AppError::MalformedEvent(format!(
                    "No checkout intent for session {} and no intent_id metadata",
                    session.id
                ))
            })?;
            let intent = queries::get_checkout_intent_by_id(conn, intent_id)?.ok_or_else(|| {
                AppError::MalformedEvent(format!(
                    "Unknown checkout intent {} for session {}",
                    intent_id, session.id
                ))
            })?;
            if let Some(attached) = &intent.processor_session_id
                && attached != &session.id
            {
                return Err(AppError::MalformedEvent(format!(
                    "Checkout intent {} belongs to session {}, not {}",
                    intent.id, attached, session.id
                )));
            }
            intent
        }
    };

    match session.metadata.account_id.as_deref() {
        Some(account_id) if account_id == intent.account_id => {}
        Some(account_id) => {
            return Err(AppError::MalformedEvent(format!(
                "Session {} names account {} but intent {} belongs to {}",
                session.id, account_id, intent.id, intent.account_id
            )));
        }
        None => {
            return Err(AppError::MalformedEvent(format!(
                "Session {} has no account_id metadata",
                session.id
            )));
        }
    }

    if intent.items.is_empty() {
        return Err(AppError::MalformedEvent(format!(
            "Checkout intent {} has no items",
            intent.id
        )));
    }

    Ok(intent)
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RecoveryReport {
    pub scanned: usize,
    pub repaired: usize,
    pub failed: usize,
}

/// Re-run the entitlement grant for completed entries never marked as propagated.
pub async fn recover_unpropagated(state: &AppState) -> Result<RecoveryReport> {
    let pending = with_store_retry(&state.store_retry, "unpropagated scan", || {
        let conn = state.db.get()?;
        queries::list_unpropagated_orders(&conn, RECOVERY_BATCH)
    })
    .await?;

    let mut report = RecoveryReport {
        scanned: pending.len(),
        ..Default::default()
    };

    for order in pending {
        let order_id = order.id.clone();
        match propagate(state, order).await {
            Ok(_) => report.repaired += 1,
            Err(e) => {
                tracing::error!("Failed to propagate entitlements for order {}: {}", order_id, e);
                report.failed += 1;
            }
        }
    }

    if report.scanned > 0 {
        tracing::info!(
            "Entitlement recovery: {} scanned, {} repaired, {} failed",
            report.scanned,
            report.repaired,
            report.failed
        );
    }
    Ok(report)
}
