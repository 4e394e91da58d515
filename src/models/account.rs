use serde::{Deserialize, Serialize};

/// A storefront customer (or administrator).
///
/// Owned games live in the `entitlements` table and wishlisted games in
/// `wishlist_items`; neither is embedded here so that grants stay set-union
/// inserts instead of read-modify-write of a list column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccount {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAccount {
    #[serde(default)]
    pub is_admin: Option<bool>,
}

/// Admin listing row with counters.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub id: String,
    pub email: String,
    pub is_admin: bool,
    pub owned_count: i64,
    pub wishlist_count: i64,
    pub created_at: i64,
}

/// An owned game as stored in the entitlement set.
#[derive(Debug, Clone, Serialize)]
pub struct Entitlement {
    pub account_id: String,
    pub product_id: String,
    /// Ledger entry that first granted this game (None for manual grants)
    pub order_id: Option<String>,
    pub granted_at: i64,
}
