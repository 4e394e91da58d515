use axum::extract::State;
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::models::{Product, ProductFilters};
use crate::pagination::{Paginated, PaginationQuery};

#[derive(Debug, Deserialize)]
pub struct ListGamesQuery {
    pub category: Option<String>,
    pub trending: Option<bool>,
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_games(
    State(state): State<AppState>,
    Query(query): Query<ListGamesQuery>,
) -> Result<Json<Paginated<Product>>> {
    let page = PaginationQuery {
        limit: query.limit,
        offset: query.offset,
    };
    let filters = ProductFilters {
        category: query.category,
        trending: query.trending,
        q: query.q,
    };

    let conn = state.db.get()?;
    let (items, total) = queries::list_products(&conn, &filters, page.limit(), page.offset())?;
    Ok(Json(Paginated::from_query(items, total, &page)))
}

pub async fn get_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>> {
    let conn = state.db.get()?;
    let product = queries::get_product_by_id(&conn, &id)?.or_not_found(msg::PRODUCT_NOT_FOUND)?;
    Ok(Json(product))
}
