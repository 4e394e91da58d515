use axum::{Extension, extract::State};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::fulfillment::{FulfillmentRequest, FulfillmentStatus, fulfill, with_store_retry};
use crate::middleware::AccountContext;
use crate::models::OrderSource;

use super::checkout::intent_for_caller;

#[derive(Debug, Deserialize)]
pub struct ConfirmFulfillmentRequest {
    #[serde(alias = "sessionId")]
    pub session_id: String,
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmFulfillmentResponse {
    pub status: FulfillmentStatus,
    pub order_id: String,
    pub owned_product_ids: Vec<String>,
}

/// Post-redirect confirmation: re-fetch the session from the processor and
/// run the same fulfillment as the webhook. Safe to call any number of times.
pub async fn confirm_fulfillment(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccountContext>,
    Json(input): Json<ConfirmFulfillmentRequest>,
) -> Result<Json<ConfirmFulfillmentResponse>> {
    ctx.ensure_same_account(input.user_id.as_deref())?;

    let session = state.stripe.retrieve_checkout_session(&input.session_id).await?;

    let intent = {
        let conn = state.db.get()?;
        intent_for_caller(&conn, &session, &ctx)?
    };

    if !session.is_paid() {
        return Err(AppError::Conflict(msg::PAYMENT_NOT_COMPLETED.into()));
    }

    let charged = session.amount_total.zip(session.currency.clone());
    let outcome = fulfill(
        &state,
        &FulfillmentRequest {
            transaction_id: &session.id,
            intent: &intent,
            charged,
            source: OrderSource::Confirmation,
        },
    )
    .await?;

    let owned_product_ids = with_store_retry(&state.store_retry, "library lookup", || {
        let conn = state.db.get()?;
        queries::list_owned_product_ids(&conn, ctx.account_id())
    })
    .await?;

    Ok(Json(ConfirmFulfillmentResponse {
        status: outcome.status,
        order_id: outcome.order.id,
        owned_product_ids,
    }))
}
