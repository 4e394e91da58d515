use axum::{Extension, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::middleware::AccountContext;
use crate::models::Product;

#[derive(Debug, Deserialize)]
pub struct WishlistRequest {
    #[serde(alias = "gameId", alias = "product_id")]
    pub game_id: String,
}

pub async fn list_wishlist(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccountContext>,
) -> Result<Json<Vec<Product>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_wishlist(&conn, ctx.account_id())?))
}

fn add(state: &AppState, ctx: &AccountContext, game_id: &str) -> Result<StatusCode> {
    let conn = state.db.get()?;
    queries::get_product_by_id(&conn, game_id)?.or_not_found(msg::PRODUCT_NOT_FOUND)?;
    if queries::add_wishlist_item(&conn, ctx.account_id(), game_id)? {
        Ok(StatusCode::CREATED)
    } else {
        Ok(StatusCode::OK)
    }
}

/// `PUT /wishlist` with `{game_id}`.
pub async fn add_to_wishlist(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccountContext>,
    Json(input): Json<WishlistRequest>,
) -> Result<StatusCode> {
    add(&state, &ctx, &input.game_id)
}

/// `PUT /wishlist/{game_id}`.
pub async fn add_game_to_wishlist(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccountContext>,
    Path(game_id): Path<String>,
) -> Result<StatusCode> {
    add(&state, &ctx, &game_id)
}

pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccountContext>,
    Path(game_id): Path<String>,
) -> Result<StatusCode> {
    let conn = state.db.get()?;
    queries::remove_wishlist_item(&conn, ctx.account_id(), &game_id)?;
    Ok(StatusCode::NO_CONTENT)
}
