use axum::{Extension, extract::State, http::StatusCode};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::middleware::AccountContext;
use crate::models::{Account, AccountSummary, UpdateAccount};
use crate::pagination::{Paginated, PaginationQuery};

pub async fn list_users(
    State(state): State<AppState>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Paginated<AccountSummary>>> {
    let conn = state.db.get()?;
    let (items, total) = queries::list_accounts(&conn, page.limit(), page.offset())?;
    Ok(Json(Paginated::from_query(items, total, &page)))
}

#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub summary: AccountSummary,
    pub owned_product_ids: Vec<String>,
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserDetail>> {
    let conn = state.db.get()?;
    let summary = queries::get_account_summary(&conn, &id)?.or_not_found(msg::ACCOUNT_NOT_FOUND)?;
    let owned_product_ids = queries::list_owned_product_ids(&conn, &id)?;
    Ok(Json(UserDetail {
        summary,
        owned_product_ids,
    }))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccountContext>,
    Path(id): Path<String>,
    Json(input): Json<UpdateAccount>,
) -> Result<Json<Account>> {
    let conn = state.db.get()?;
    let Some(is_admin) = input.is_admin else {
        let account = queries::get_account_by_id(&conn, &id)?.or_not_found(msg::ACCOUNT_NOT_FOUND)?;
        return Ok(Json(account));
    };

    if id == ctx.account.id && !is_admin {
        return Err(AppError::BadRequest("Admins cannot remove their own admin role".into()));
    }

    let account = queries::set_account_admin(&conn, &id, is_admin)?
        .or_not_found(msg::ACCOUNT_NOT_FOUND)?;
    tracing::info!(
        "Admin {} set is_admin={} on account {}",
        ctx.account.id,
        is_admin,
        account.id
    );
    Ok(Json(account))
}

/// Administrative correction of the owned set (refunds, mistaken grants).
/// The ledger is untouched.
pub async fn revoke_user_entitlement(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccountContext>,
    Path((id, game_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    let conn = state.db.get()?;
    if !queries::revoke_entitlement(&conn, &id, &game_id)? {
        return Err(AppError::NotFound(msg::NOT_OWNED.into()));
    }
    tracing::warn!(
        "Admin {} revoked game {} from account {}",
        ctx.account.id,
        game_id,
        id
    );
    Ok(StatusCode::NO_CONTENT)
}
