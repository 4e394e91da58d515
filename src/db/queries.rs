use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, types::Value};
use uuid::Uuid;

use crate::crypto::{generate_session_token, hash_secret};
use crate::error::{AppError, Result, msg};
use crate::models::*;

use super::from_row::{
    ACCOUNT_COLS, ACCOUNT_SUMMARY_COLS, CHECKOUT_INTENT_COLS, ENTITLEMENT_COLS, FromRow,
    ORDER_COLS, ORDER_ITEM_COLS, PRODUCT_COLS, SUPPORT_TICKET_COLS, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// True when a rusqlite error is a UNIQUE/PRIMARY KEY violation.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

/// Builder for dynamic UPDATE statements with optional fields.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
    track_updated_at: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
            track_updated_at: false,
        }
    }

    fn with_updated_at(mut self) -> Self {
        self.track_updated_at = true;
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Run the update against rows matching `extra_where` and return the row.
    /// Returns None if no row matched. With nothing to set the row is read
    /// back untouched.
    fn execute_returning<T: FromRow>(
        mut self,
        conn: &Connection,
        extra_where: &str,
        returning_cols: &str,
    ) -> Result<Option<T>> {
        if self.fields.is_empty() {
            let sql = format!(
                "SELECT {} FROM {} WHERE id = ? {}",
                returning_cols, self.table, extra_where
            );
            return query_one(conn, &sql, &[&self.id]);
        }
        if self.track_updated_at {
            self.fields.push(("updated_at", now().into()));
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ? {} RETURNING {}",
            self.table,
            sets.join(", "),
            extra_where,
            returning_cols
        );
        conn.query_row(&sql, rusqlite::params_from_iter(values), T::from_row)
            .optional()
            .map_err(Into::into)
    }
}

/// Accumulates WHERE conditions and their positional values.
#[derive(Default)]
struct Filter {
    clauses: Vec<&'static str>,
    values: Vec<Value>,
}

impl Filter {
    fn push(&mut self, clause: &'static str, value: impl Into<Value>) {
        self.clauses.push(clause);
        self.values.push(value.into());
    }

    fn push_bare(&mut self, clause: &'static str) {
        self.clauses.push(clause);
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn count(&self, conn: &Connection, from: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} {}", from, self.where_clause());
        Ok(conn.query_row(
            &sql,
            rusqlite::params_from_iter(self.values.iter()),
            |row| row.get(0),
        )?)
    }

    fn page<T: FromRow>(
        &self,
        conn: &Connection,
        select: &str,
        order_by: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<T>> {
        let sql = format!(
            "{} {} ORDER BY {} LIMIT ? OFFSET ?",
            select,
            self.where_clause(),
            order_by
        );
        let mut values = self.values.clone();
        values.push(limit.into());
        values.push(offset.into());
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values), T::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ============ Accounts ============

/// Create an account. The email is stored trimmed; uniqueness is case-insensitive.
pub fn create_account(
    conn: &Connection,
    email: &str,
    password_hash: &str,
    is_admin: bool,
) -> Result<Account> {
    let id = gen_id();
    let now = now();
    let email = email.trim();

    conn.execute(
        "INSERT INTO accounts (id, email, password_hash, is_admin, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![&id, email, password_hash, is_admin as i32, now],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(crate::error::msg::EMAIL_TAKEN.into())
        } else {
            e.into()
        }
    })?;

    Ok(Account {
        id,
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        is_admin,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_account_by_id(conn: &Connection, id: &str) -> Result<Option<Account>> {
    query_one(
        conn,
        &format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLS),
        &[&id],
    )
}

pub fn get_account_by_email(conn: &Connection, email: &str) -> Result<Option<Account>> {
    query_one(
        conn,
        &format!("SELECT {} FROM accounts WHERE email = ?1", ACCOUNT_COLS),
        &[&email.trim()],
    )
}

pub fn count_accounts(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?)
}

pub fn list_accounts(
    conn: &Connection,
    limit: i64,
    offset: i64,
) -> Result<(Vec<AccountSummary>, i64)> {
    let filter = Filter::default();
    let total = filter.count(conn, "accounts a")?;
    let items = filter.page(
        conn,
        &format!("SELECT {} FROM accounts a", ACCOUNT_SUMMARY_COLS),
        "a.created_at DESC, a.id",
        limit,
        offset,
    )?;
    Ok((items, total))
}

pub fn get_account_summary(conn: &Connection, id: &str) -> Result<Option<AccountSummary>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM accounts a WHERE a.id = ?1",
            ACCOUNT_SUMMARY_COLS
        ),
        &[&id],
    )
}

pub fn set_account_admin(conn: &Connection, id: &str, is_admin: bool) -> Result<Option<Account>> {
    UpdateBuilder::new("accounts", id)
        .with_updated_at()
        .set("is_admin", is_admin as i32)
        .execute_returning(conn, "", ACCOUNT_COLS)
}

// ============ Auth sessions ============

/// Issue a login session. Returns the raw token, which is shown exactly once.
pub fn create_auth_session(conn: &Connection, account_id: &str, ttl_secs: i64) -> Result<String> {
    let token = generate_session_token();
    let now = now();
    conn.execute(
        "INSERT INTO auth_sessions (token_hash, account_id, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![hash_secret(&token), account_id, now, now + ttl_secs],
    )?;
    Ok(token)
}

/// Resolve a raw session token to its account, ignoring expired sessions.
pub fn get_account_by_session_token(conn: &Connection, token: &str) -> Result<Option<Account>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM accounts WHERE id = (
                SELECT account_id FROM auth_sessions WHERE token_hash = ?1 AND expires_at > ?2
             )",
            ACCOUNT_COLS
        ),
        &[&hash_secret(token), &now()],
    )
}

pub fn delete_auth_session(conn: &Connection, token: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM auth_sessions WHERE token_hash = ?1",
        params![hash_secret(token)],
    )?;
    Ok(affected > 0)
}

pub fn purge_expired_auth_sessions(conn: &Connection) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM auth_sessions WHERE expires_at <= ?1",
        params![now()],
    )?)
}

// ============ Catalog ============

pub fn create_product(conn: &Connection, input: &CreateProduct, price_cents: i64) -> Result<Product> {
    let id = input
        .id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(gen_id);
    let now = now();

    conn.execute(
        "INSERT INTO products (id, title, description, price_cents, category, is_trending, release_date, stock, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            &id,
            &input.title,
            &input.description,
            price_cents,
            &input.category,
            input.is_trending as i32,
            &input.release_date,
            input.stock,
            now
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Game id '{}' already exists", id))
        } else {
            e.into()
        }
    })?;

    Ok(Product {
        id,
        title: input.title.clone(),
        description: input.description.clone(),
        price_cents,
        category: input.category.clone(),
        is_trending: input.is_trending,
        release_date: input.release_date.clone(),
        stock: input.stock,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

/// Active (for sale) product lookup.
pub fn get_product_by_id(conn: &Connection, id: &str) -> Result<Option<Product>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM products WHERE id = ?1 AND deleted_at IS NULL",
            PRODUCT_COLS
        ),
        &[&id],
    )
}

/// Lookup that also returns products removed from sale (for owned games).
pub fn get_product_including_deleted(conn: &Connection, id: &str) -> Result<Option<Product>> {
    query_one(
        conn,
        &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLS),
        &[&id],
    )
}

pub fn list_products(
    conn: &Connection,
    filters: &ProductFilters,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Product>, i64)> {
    let mut filter = Filter::default();
    filter.push_bare("deleted_at IS NULL");
    if let Some(category) = filters.category.as_deref().filter(|c| !c.is_empty()) {
        filter.push("category = ? COLLATE NOCASE", category.to_string());
    }
    if let Some(trending) = filters.trending {
        filter.push("is_trending = ?", trending as i64);
    }
    if let Some(q) = filters.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        // LIKE is case-insensitive for ASCII in SQLite
        filter.push("title LIKE ? ESCAPE '\\'", format!("%{}%", escape_like(q)));
    }

    let total = filter.count(conn, "products")?;
    let items = filter.page(
        conn,
        &format!("SELECT {} FROM products", PRODUCT_COLS),
        "created_at DESC, id",
        limit,
        offset,
    )?;
    Ok((items, total))
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub fn update_product(
    conn: &Connection,
    id: &str,
    input: &UpdateProduct,
    price_cents: Option<i64>,
) -> Result<Option<Product>> {
    UpdateBuilder::new("products", id)
        .with_updated_at()
        .set_opt("title", input.title.clone())
        .set_opt("description", input.description.clone())
        .set_opt("price_cents", price_cents)
        .set_opt("category", input.category.clone())
        .set_opt("is_trending", input.is_trending.map(|b| b as i32))
        .set_opt("release_date", input.release_date.clone())
        .set_opt("stock", input.stock)
        .execute_returning(conn, "AND deleted_at IS NULL", PRODUCT_COLS)
}

/// Remove a product from sale. Ledger lines and entitlements keep pointing at it.
pub fn soft_delete_product(conn: &Connection, id: &str) -> Result<bool> {
    let now = now();
    let affected = conn.execute(
        "UPDATE products SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![now, id],
    )?;
    Ok(affected > 0)
}

// ============ Entitlements ============

/// Extend an account's owned set. Set-union semantics: games already owned
/// are left untouched. Returns how many games were newly granted.
pub fn grant_entitlements(
    conn: &Connection,
    account_id: &str,
    product_ids: &[String],
    order_id: Option<&str>,
) -> Result<usize> {
    let now = now();
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO entitlements (account_id, product_id, order_id, granted_at)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut granted = 0;
    for product_id in product_ids {
        granted += stmt.execute(params![account_id, product_id, order_id, now])?;
    }
    Ok(granted)
}

pub fn list_owned_product_ids(conn: &Connection, account_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT product_id FROM entitlements WHERE account_id = ?1 ORDER BY granted_at, product_id",
    )?;
    let ids = stmt
        .query_map(params![account_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(ids)
}

pub fn get_entitlement(
    conn: &Connection,
    account_id: &str,
    product_id: &str,
) -> Result<Option<Entitlement>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM entitlements WHERE account_id = ?1 AND product_id = ?2",
            ENTITLEMENT_COLS
        ),
        &[&account_id, &product_id],
    )
}

/// Owned games joined with their catalog rows, including games since removed from sale.
pub fn list_library(conn: &Connection, account_id: &str) -> Result<Vec<(Entitlement, Product)>> {
    let sql = format!(
        "SELECT e.account_id, e.product_id, e.order_id, e.granted_at, {}
         FROM entitlements e JOIN products p ON p.id = e.product_id
         WHERE e.account_id = ?1
         ORDER BY e.granted_at DESC, e.product_id",
        prefixed(PRODUCT_COLS, "p")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![account_id], |row| {
            let entitlement = Entitlement::from_row(row)?;
            let product = Product {
                id: row.get(4)?,
                title: row.get(5)?,
                description: row.get(6)?,
                price_cents: row.get(7)?,
                category: row.get(8)?,
                is_trending: row.get::<_, i32>(9)? != 0,
                release_date: row.get(10)?,
                stock: row.get(11)?,
                created_at: row.get(12)?,
                updated_at: row.get(13)?,
                deleted_at: row.get(14)?,
            };
            Ok((entitlement, product))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn prefixed(cols: &str, alias: &str) -> String {
    cols.split(", ")
        .map(|c| format!("{}.{}", alias, c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Administrative correction. Never called by the fulfillment flow.
pub fn revoke_entitlement(conn: &Connection, account_id: &str, product_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM entitlements WHERE account_id = ?1 AND product_id = ?2",
        params![account_id, product_id],
    )?;
    Ok(affected > 0)
}

// ============ Wishlist ============

/// Returns false if the game was already wishlisted.
pub fn add_wishlist_item(conn: &Connection, account_id: &str, product_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO wishlist_items (account_id, product_id, added_at) VALUES (?1, ?2, ?3)",
        params![account_id, product_id, now()],
    )?;
    Ok(affected > 0)
}

pub fn remove_wishlist_item(conn: &Connection, account_id: &str, product_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM wishlist_items WHERE account_id = ?1 AND product_id = ?2",
        params![account_id, product_id],
    )?;
    Ok(affected > 0)
}

/// Wishlisted games still for sale, most recently added first.
pub fn list_wishlist(conn: &Connection, account_id: &str) -> Result<Vec<Product>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM wishlist_items w JOIN products p ON p.id = w.product_id
             WHERE w.account_id = ?1 AND p.deleted_at IS NULL
             ORDER BY w.added_at DESC, p.id",
            prefixed(PRODUCT_COLS, "p")
        ),
        &[&account_id],
    )
}

// ============ Checkout intents ============

pub fn create_checkout_intent(
    conn: &Connection,
    account_id: &str,
    items: &[LineItem],
    currency: &str,
) -> Result<CheckoutIntent> {
    let total_cents = items
        .iter()
        .try_fold(0i64, |total, line| total.checked_add(line.subtotal_cents()?))
        .ok_or_else(|| AppError::BadRequest(msg::CART_TOTAL_TOO_LARGE.into()))?;
    let id = gen_id();
    let now = now();
    let items_json = serde_json::to_string(items)?;

    conn.execute(
        "INSERT INTO checkout_intents (id, account_id, items, total_cents, currency, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, account_id, &items_json, total_cents, currency, now],
    )?;

    Ok(CheckoutIntent {
        id,
        account_id: account_id.to_string(),
        processor_session_id: None,
        items: items.to_vec(),
        total_cents,
        currency: currency.to_string(),
        created_at: now,
        consumed_at: None,
    })
}

/// Record the processor's session id on a freshly created intent.
pub fn attach_processor_session(conn: &Connection, intent_id: &str, session_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE checkout_intents SET processor_session_id = ?1
         WHERE id = ?2 AND processor_session_id IS NULL",
        params![session_id, intent_id],
    )?;
    Ok(affected > 0)
}

pub fn get_checkout_intent_by_id(conn: &Connection, id: &str) -> Result<Option<CheckoutIntent>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM checkout_intents WHERE id = ?1",
            CHECKOUT_INTENT_COLS
        ),
        &[&id],
    )
}

pub fn get_checkout_intent_by_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<CheckoutIntent>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM checkout_intents WHERE processor_session_id = ?1",
            CHECKOUT_INTENT_COLS
        ),
        &[&session_id],
    )
}

/// Delete intents that were never fulfilled and are older than `older_than`.
/// Consumed intents are kept because ledger entries reference them.
pub fn purge_abandoned_checkout_intents(conn: &Connection, older_than: i64) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM checkout_intents
         WHERE consumed_at IS NULL AND created_at < ?1
           AND NOT EXISTS (SELECT 1 FROM orders o WHERE o.intent_id = checkout_intents.id)",
        params![older_than],
    )?)
}

// ============ Ledger ============

fn load_order_items(conn: &Connection, order: &mut Order) -> Result<()> {
    order.items = query_all(
        conn,
        &format!(
            "SELECT {} FROM order_items WHERE order_id = ?1 ORDER BY position",
            ORDER_ITEM_COLS
        ),
        &[&order.id],
    )?;
    Ok(())
}

fn with_items(conn: &Connection, order: Option<Order>) -> Result<Option<Order>> {
    match order {
        Some(mut order) => {
            load_order_items(conn, &mut order)?;
            Ok(Some(order))
        }
        None => Ok(None),
    }
}

/// The completed ledger entry for a processor transaction, if any.
pub fn find_ledger_entry(conn: &Connection, transaction_id: &str) -> Result<Option<Order>> {
    let order = query_one(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE transaction_id = ?1 AND status = 'completed'",
            ORDER_COLS
        ),
        &[&transaction_id],
    )?;
    with_items(conn, order)
}

pub fn get_order_by_id(conn: &Connection, id: &str) -> Result<Option<Order>> {
    let order = query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&id],
    )?;
    with_items(conn, order)
}

/// Append a completed ledger entry for `input.transaction_id`.
///
/// Runs in an IMMEDIATE transaction so the existence check, the insert, and
/// consuming the checkout intent happen under the database write lock. The
/// partial unique index on completed transaction ids backs this up; either
/// path reports `DuplicateTransaction`.
pub fn record_ledger_entry(conn: &mut Connection, input: &CreateOrder) -> Result<Order> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM orders WHERE transaction_id = ?1 AND status = 'completed')",
        params![&input.transaction_id],
        |row| row.get(0),
    )?;
    if exists {
        return Err(AppError::DuplicateTransaction(input.transaction_id.clone()));
    }

    let id = gen_id();
    let now = now();

    tx.execute(
        "INSERT INTO orders (id, transaction_id, account_id, intent_id, total_cents, currency, status, source, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &id,
            &input.transaction_id,
            &input.account_id,
            &input.intent_id,
            input.total_cents,
            &input.currency,
            OrderStatus::Completed.as_ref(),
            input.source.as_ref(),
            now
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::DuplicateTransaction(input.transaction_id.clone())
        } else {
            e.into()
        }
    })?;

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO order_items (order_id, position, product_id, title, quantity, unit_price_cents)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (position, item) in input.items.iter().enumerate() {
            stmt.execute(params![
                &id,
                position as i64,
                &item.product_id,
                &item.title,
                item.quantity,
                item.unit_price_cents
            ])?;
        }
    }

    if let Some(intent_id) = &input.intent_id {
        tx.execute(
            "UPDATE checkout_intents SET consumed_at = ?1 WHERE id = ?2 AND consumed_at IS NULL",
            params![now, intent_id],
        )?;
    }

    tx.commit()?;

    Ok(Order {
        id,
        transaction_id: input.transaction_id.clone(),
        account_id: input.account_id.clone(),
        intent_id: input.intent_id.clone(),
        items: input.items.clone(),
        total_cents: input.total_cents,
        currency: input.currency.clone(),
        status: OrderStatus::Completed,
        source: input.source,
        created_at: now,
        propagated_at: None,
    })
}

/// Set the propagation marker. Only succeeds the first time.
pub fn mark_order_propagated(conn: &Connection, order_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET propagated_at = ?1 WHERE id = ?2 AND propagated_at IS NULL",
        params![now(), order_id],
    )?;
    Ok(affected > 0)
}

/// Completed entries whose entitlements were never confirmed as granted.
pub fn list_unpropagated_orders(conn: &Connection, limit: i64) -> Result<Vec<Order>> {
    let mut orders: Vec<Order> = query_all(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE status = 'completed' AND propagated_at IS NULL
             ORDER BY created_at LIMIT ?1",
            ORDER_COLS
        ),
        &[&limit],
    )?;
    for order in &mut orders {
        load_order_items(conn, order)?;
    }
    Ok(orders)
}

pub fn list_orders(
    conn: &Connection,
    filters: &OrderFilters,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Order>, i64)> {
    let mut filter = Filter::default();
    if let Some(account_id) = &filters.account_id {
        filter.push("account_id = ?", account_id.clone());
    }
    if let Some(status) = filters.status {
        filter.push("status = ?", status.as_ref().to_string());
    }
    if filters.unpropagated {
        filter.push_bare("propagated_at IS NULL");
    }

    let total = filter.count(conn, "orders")?;
    let mut items: Vec<Order> = filter.page(
        conn,
        &format!("SELECT {} FROM orders", ORDER_COLS),
        "created_at DESC, id",
        limit,
        offset,
    )?;
    for order in &mut items {
        load_order_items(conn, order)?;
    }
    Ok((items, total))
}

// ============ Support tickets ============

pub fn create_support_ticket(
    conn: &Connection,
    account_id: Option<&str>,
    email: Option<&str>,
    input: &CreateSupportTicket,
) -> Result<SupportTicket> {
    let id = gen_id();
    let now = now();
    let meta = input.meta.as_ref().map(serde_json::to_string).transpose()?;

    conn.execute(
        "INSERT INTO support_tickets (id, account_id, email, category, subject, message, status, meta, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            &id,
            account_id,
            email,
            input.category.as_ref(),
            input.subject.trim(),
            input.message.trim(),
            TicketStatus::Open.as_ref(),
            &meta,
            now
        ],
    )?;

    Ok(SupportTicket {
        id,
        account_id: account_id.map(String::from),
        email: email.map(String::from),
        category: input.category,
        subject: input.subject.trim().to_string(),
        message: input.message.trim().to_string(),
        status: TicketStatus::Open,
        meta: input.meta.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn list_support_tickets(
    conn: &Connection,
    filters: &TicketFilters,
    limit: i64,
    offset: i64,
) -> Result<(Vec<SupportTicket>, i64)> {
    let mut filter = Filter::default();
    if let Some(status) = filters.status {
        filter.push("status = ?", status.as_ref().to_string());
    }
    if let Some(category) = filters.category {
        filter.push("category = ?", category.as_ref().to_string());
    }

    let total = filter.count(conn, "support_tickets")?;
    let items = filter.page(
        conn,
        &format!("SELECT {} FROM support_tickets", SUPPORT_TICKET_COLS),
        "created_at DESC, id",
        limit,
        offset,
    )?;
    Ok((items, total))
}

pub fn update_support_ticket_status(
    conn: &Connection,
    id: &str,
    status: TicketStatus,
) -> Result<Option<SupportTicket>> {
    UpdateBuilder::new("support_tickets", id)
        .with_updated_at()
        .set("status", status.as_ref().to_string())
        .execute_returning(conn, "", SUPPORT_TICKET_COLS)
}
