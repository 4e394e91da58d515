use axum::extract::State;
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::fulfillment::{RecoveryReport, recover_unpropagated};
use crate::models::{Order, OrderFilters, OrderStatus};
use crate::pagination::{Paginated, PaginationQuery};

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub account_id: Option<String>,
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub unpropagated: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Paginated<Order>>> {
    let page = PaginationQuery {
        limit: query.limit,
        offset: query.offset,
    };
    let filters = OrderFilters {
        account_id: query.account_id,
        status: query.status,
        unpropagated: query.unpropagated,
    };

    let conn = state.db.get()?;
    let (items, total) = queries::list_orders(&conn, &filters, page.limit(), page.offset())?;
    Ok(Json(Paginated::from_query(items, total, &page)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>> {
    let conn = state.db.get()?;
    let order = queries::get_order_by_id(&conn, &id)?.or_not_found(msg::ORDER_NOT_FOUND)?;
    Ok(Json(order))
}

/// Run entitlement recovery now instead of waiting for the background sweep.
pub async fn reconcile(State(state): State<AppState>) -> Result<Json<RecoveryReport>> {
    Ok(Json(recover_unpropagated(&state).await?))
}
