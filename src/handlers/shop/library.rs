use axum::{Extension, extract::State};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::middleware::AccountContext;
use crate::models::{Order, OrderFilters, Product};
use crate::pagination::{Paginated, PaginationQuery};

#[derive(Debug, Serialize)]
pub struct LibraryEntry {
    pub game: Product,
    /// Ledger entry that granted the game
    pub order_id: Option<String>,
    pub granted_at: i64,
}

/// Owned games, including ones since removed from sale.
pub async fn list_library(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccountContext>,
) -> Result<Json<Vec<LibraryEntry>>> {
    let conn = state.db.get()?;
    let entries = queries::list_library(&conn, ctx.account_id())?
        .into_iter()
        .map(|(entitlement, game)| LibraryEntry {
            game,
            order_id: entitlement.order_id,
            granted_at: entitlement.granted_at,
        })
        .collect();
    Ok(Json(entries))
}

/// Owned game detail. 403 when the caller doesn't own it.
pub async fn get_library_game(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccountContext>,
    Path(game_id): Path<String>,
) -> Result<Json<LibraryEntry>> {
    let conn = state.db.get()?;
    let game =
        queries::get_product_including_deleted(&conn, &game_id)?.or_not_found(msg::PRODUCT_NOT_FOUND)?;
    let entitlement = queries::get_entitlement(&conn, ctx.account_id(), &game_id)?
        .ok_or_else(|| AppError::Forbidden(msg::NOT_OWNED.into()))?;
    Ok(Json(LibraryEntry {
        game,
        order_id: entitlement.order_id,
        granted_at: entitlement.granted_at,
    }))
}

pub async fn list_my_orders(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccountContext>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Paginated<Order>>> {
    let conn = state.db.get()?;
    let filters = OrderFilters {
        account_id: Some(ctx.account.id.clone()),
        ..Default::default()
    };
    let (items, total) = queries::list_orders(&conn, &filters, page.limit(), page.offset())?;
    Ok(Json(Paginated::from_query(items, total, &page)))
}

pub async fn get_my_order(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccountContext>,
    Path(id): Path<String>,
) -> Result<Json<Order>> {
    let conn = state.db.get()?;
    let order = queries::get_order_by_id(&conn, &id)?
        .filter(|o| o.account_id == ctx.account.id)
        .or_not_found(msg::ORDER_NOT_FOUND)?;
    Ok(Json(order))
}
