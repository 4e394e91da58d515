use axum::{extract::State, http::StatusCode};
use chrono::NaiveDate;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::models::{CreateProduct, Product, UpdateProduct, price_to_cents};

fn validate_price(price: f64) -> Result<i64> {
    price_to_cents(price).ok_or_else(|| AppError::BadRequest(msg::INVALID_PRICE.into()))
}

fn validate_release_date(date: Option<&str>) -> Result<()> {
    if let Some(date) = date {
        NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
            AppError::BadRequest("release_date must be formatted as YYYY-MM-DD".into())
        })?;
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(AppError::BadRequest("title must not be empty".into()));
    }
    Ok(())
}

fn validate_stock(stock: i64) -> Result<()> {
    if stock < 0 {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }
    Ok(())
}

pub async fn create_game(
    State(state): State<AppState>,
    Json(input): Json<CreateProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    validate_title(&input.title)?;
    validate_release_date(input.release_date.as_deref())?;
    validate_stock(input.stock)?;
    let price_cents = validate_price(input.price)?;

    let conn = state.db.get()?;
    let product = queries::create_product(&conn, &input, price_cents)?;
    tracing::info!("Catalog: added {} ({} cents)", product.id, product.price_cents);
    Ok((StatusCode::CREATED, Json(product)))
}

/// Price changes only affect future checkouts; ledger lines keep their captured price.
pub async fn update_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateProduct>,
) -> Result<Json<Product>> {
    if let Some(title) = &input.title {
        validate_title(title)?;
    }
    if let Some(stock) = input.stock {
        validate_stock(stock)?;
    }
    validate_release_date(input.release_date.as_deref())?;
    let price_cents = input.price.map(validate_price).transpose()?;

    let conn = state.db.get()?;
    let product = queries::update_product(&conn, &id, &input, price_cents)?
        .or_not_found(msg::PRODUCT_NOT_FOUND)?;
    Ok(Json(product))
}

pub async fn delete_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let conn = state.db.get()?;
    if !queries::soft_delete_product(&conn, &id)? {
        return Err(AppError::NotFound(msg::PRODUCT_NOT_FOUND.into()));
    }
    tracing::info!("Catalog: removed {} from sale", id);
    Ok(StatusCode::NO_CONTENT)
}
