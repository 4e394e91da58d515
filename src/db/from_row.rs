//! Row mapping for the storefront tables.
//!
//! Models implement `FromRow` so queries can use `query_one`/`query_all`
//! instead of repeating mapping closures.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse a JSON text column.
fn parse_json<T: serde::de::DeserializeOwned>(row: &Row, col: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(col)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const ACCOUNT_COLS: &str = "id, email, password_hash, is_admin, created_at, updated_at";

pub const ACCOUNT_SUMMARY_COLS: &str = "a.id, a.email, a.is_admin, \
    (SELECT COUNT(*) FROM entitlements e WHERE e.account_id = a.id), \
    (SELECT COUNT(*) FROM wishlist_items w WHERE w.account_id = a.id), \
    a.created_at";

pub const PRODUCT_COLS: &str = "id, title, description, price_cents, category, is_trending, release_date, stock, created_at, updated_at, deleted_at";

pub const ENTITLEMENT_COLS: &str = "account_id, product_id, order_id, granted_at";

pub const CHECKOUT_INTENT_COLS: &str =
    "id, account_id, processor_session_id, items, total_cents, currency, created_at, consumed_at";

pub const ORDER_COLS: &str = "id, transaction_id, account_id, intent_id, total_cents, currency, status, source, created_at, propagated_at";

pub const ORDER_ITEM_COLS: &str = "product_id, title, quantity, unit_price_cents";

pub const SUPPORT_TICKET_COLS: &str =
    "id, account_id, email, category, subject, message, status, meta, created_at, updated_at";

// ============ FromRow Implementations ============

impl FromRow for Account {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Account {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            is_admin: row.get::<_, i32>(3)? != 0,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl FromRow for AccountSummary {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AccountSummary {
            id: row.get(0)?,
            email: row.get(1)?,
            is_admin: row.get::<_, i32>(2)? != 0,
            owned_count: row.get(3)?,
            wishlist_count: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for Product {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Product {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            price_cents: row.get(3)?,
            category: row.get(4)?,
            is_trending: row.get::<_, i32>(5)? != 0,
            release_date: row.get(6)?,
            stock: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            deleted_at: row.get(10)?,
        })
    }
}

impl FromRow for Entitlement {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Entitlement {
            account_id: row.get(0)?,
            product_id: row.get(1)?,
            order_id: row.get(2)?,
            granted_at: row.get(3)?,
        })
    }
}

impl FromRow for CheckoutIntent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CheckoutIntent {
            id: row.get(0)?,
            account_id: row.get(1)?,
            processor_session_id: row.get(2)?,
            items: parse_json(row, 3)?,
            total_cents: row.get(4)?,
            currency: row.get(5)?,
            created_at: row.get(6)?,
            consumed_at: row.get(7)?,
        })
    }
}

/// Line items are stored in `order_items` and attached by the caller.
impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            transaction_id: row.get(1)?,
            account_id: row.get(2)?,
            intent_id: row.get(3)?,
            items: Vec::new(),
            total_cents: row.get(4)?,
            currency: row.get(5)?,
            status: parse_enum(row, 6, "status")?,
            source: parse_enum(row, 7, "source")?,
            created_at: row.get(8)?,
            propagated_at: row.get(9)?,
        })
    }
}

impl FromRow for OrderItem {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(OrderItem {
            product_id: row.get(0)?,
            title: row.get(1)?,
            quantity: row.get(2)?,
            unit_price_cents: row.get(3)?,
        })
    }
}

impl FromRow for SupportTicket {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let meta: Option<String> = row.get(7)?;
        Ok(SupportTicket {
            id: row.get(0)?,
            account_id: row.get(1)?,
            email: row.get(2)?,
            category: parse_enum(row, 3, "category")?,
            subject: row.get(4)?,
            message: row.get(5)?,
            status: parse_enum(row, 6, "status")?,
            // Unparseable meta is dropped rather than failing the whole listing
            meta: meta.and_then(|m| serde_json::from_str(&m).ok()),
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}
