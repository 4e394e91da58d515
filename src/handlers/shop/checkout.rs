use std::collections::HashMap;

use axum::{Extension, extract::State};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Query};
use crate::fulfillment::resolve_intent;
use crate::middleware::AccountContext;
use crate::models::{CheckoutIntent, LineItem};
use crate::payments::{CHECKOUT_SESSION_ID_PLACEHOLDER, CheckoutSessionRequest};

/// A cart line as sent by the client. `title` and `price` are display
/// hints only; the charged price always comes from the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct CartItem {
    #[serde(alias = "id", alias = "game_id")]
    pub product_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(alias = "cartItems")]
    pub cart_items: Vec<CartItem>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
}

/// Most copies of one game a single checkout may buy.
pub const MAX_LINE_QUANTITY: i64 = 100;

/// Validate cart shape and merge repeated games, keeping first-seen order.
/// Returns `(product_id, quantity)` pairs.
pub fn normalize_cart(items: &[CartItem]) -> Result<Vec<(String, i64)>> {
    if items.is_empty() {
        return Err(AppError::BadRequest(msg::EMPTY_CART.into()));
    }

    let mut merged: Vec<(String, i64)> = Vec::with_capacity(items.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for item in items {
        let product_id = item.product_id.trim();
        if product_id.is_empty() {
            return Err(AppError::BadRequest(msg::UNKNOWN_PRODUCT.into()));
        }
        if !(1..=MAX_LINE_QUANTITY).contains(&item.quantity) {
            return Err(AppError::BadRequest(msg::INVALID_QUANTITY.into()));
        }
        if let Some(price) = item.price
            && !(price.is_finite() && price > 0.0)
        {
            return Err(AppError::BadRequest(msg::INVALID_PRICE.into()));
        }

        match positions.get(product_id) {
            Some(&idx) => {
                let quantity = merged[idx].1 + item.quantity;
                if quantity > MAX_LINE_QUANTITY {
                    return Err(AppError::BadRequest(msg::INVALID_QUANTITY.into()));
                }
                merged[idx].1 = quantity;
            }
            None => {
                positions.insert(product_id, merged.len());
                merged.push((product_id.to_string(), item.quantity));
            }
        }
    }

    Ok(merged)
}

/// Re-price a validated cart from the catalog.
pub fn price_cart(conn: &Connection, items: &[CartItem]) -> Result<Vec<LineItem>> {
    normalize_cart(items)?
        .into_iter()
        .map(|(product_id, quantity)| {
            let product = queries::get_product_by_id(conn, &product_id)?.ok_or_else(|| {
                AppError::BadRequest(format!("{}: {}", msg::UNKNOWN_PRODUCT, product_id))
            })?;
            Ok(LineItem {
                product_id: product.id,
                title: product.title,
                quantity,
                unit_price_cents: product.price_cents,
            })
        })
        .collect()
}

/// Price the cart, persist a checkout intent, and open a hosted payment page.
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccountContext>,
    Json(input): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    ctx.ensure_same_account(input.user_id.as_deref())?;

    let intent = {
        let conn = state.db.get()?;
        let items = price_cart(&conn, &input.cart_items)?;
        queries::create_checkout_intent(&conn, ctx.account_id(), &items, &state.currency)?
    };

    let success_url = format!(
        "{}/success?session_id={}",
        state.base_url, CHECKOUT_SESSION_ID_PLACEHOLDER
    );
    let cancel_url = format!("{}/cart", state.base_url);

    let session = state
        .stripe
        .create_checkout_session(&CheckoutSessionRequest {
            intent_id: &intent.id,
            account_id: &intent.account_id,
            items: &intent.items,
            currency: &intent.currency,
            success_url: &success_url,
            cancel_url: &cancel_url,
        })
        .await
        .inspect_err(|e| {
            tracing::warn!("Checkout session creation failed for intent {}: {}", intent.id, e)
        })?;

    {
        let conn = state.db.get()?;
        if !queries::attach_processor_session(&conn, &intent.id, &session.id)? {
            return Err(AppError::Internal(format!(
                "Checkout intent {} already has a processor session",
                intent.id
            )));
        }
    }

    tracing::info!(
        "Checkout session {} opened for intent {} ({} {})",
        session.id,
        intent.id,
        intent.total_cents,
        intent.currency
    );

    Ok(Json(CheckoutResponse {
        url: session.url,
        session_id: session.id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionQuery {
    #[serde(alias = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutSessionResponse {
    pub session_id: String,
    pub status: Option<String>,
    pub payment_status: String,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub items: Vec<LineItem>,
    pub fulfilled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

/// Load the intent behind a processor session, hiding sessions that belong
/// to other accounts (or that we never issued) behind a 404.
pub(super) fn intent_for_caller(
    conn: &Connection,
    session: &crate::payments::StripeCheckoutSession,
    ctx: &AccountContext,
) -> Result<CheckoutIntent> {
    let intent = match resolve_intent(conn, session) {
        Ok(intent) => intent,
        Err(AppError::MalformedEvent(reason)) => {
            tracing::debug!("Session {} not resolvable: {}", session.id, reason);
            return Err(AppError::NotFound(msg::SESSION_NOT_FOUND.into()));
        }
        Err(e) => return Err(e),
    };
    if intent.account_id != ctx.account.id {
        return Err(AppError::NotFound(msg::SESSION_NOT_FOUND.into()));
    }
    Ok(intent)
}

/// Status lookup for the success page.
pub async fn get_checkout_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccountContext>,
    Query(query): Query<CheckoutSessionQuery>,
) -> Result<Json<CheckoutSessionResponse>> {
    let session = state.stripe.retrieve_checkout_session(&query.session_id).await?;

    let conn = state.db.get()?;
    let intent = intent_for_caller(&conn, &session, &ctx)?;
    let order = queries::find_ledger_entry(&conn, &session.id)?;

    Ok(Json(CheckoutSessionResponse {
        session_id: session.id,
        status: session.status,
        payment_status: session.payment_status,
        amount_total: session.amount_total,
        currency: session.currency,
        items: intent.items,
        fulfilled: order.is_some(),
        order_id: order.map(|o| o.id),
    }))
}
