use serde::{Deserialize, Serialize};

/// A game in the catalog. Prices are integer cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub category: String,
    pub is_trending: bool,
    /// ISO date (YYYY-MM-DD)
    pub release_date: Option<String>,
    /// Advisory only; purchases of digital games never decrement it.
    pub stock: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl Product {
    pub fn is_for_sale(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    /// Optional slug; a uuid is generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Decimal price in the store currency (e.g. 59.99)
    pub price: f64,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub is_trending: bool,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default = "default_stock")]
    pub stock: i64,
}

fn default_category() -> String {
    "General".to_string()
}

fn default_stock() -> i64 {
    999
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProduct {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub is_trending: Option<bool>,
    pub release_date: Option<String>,
    pub stock: Option<i64>,
}

/// Catalog filters for `GET /games`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProductFilters {
    pub category: Option<String>,
    pub trending: Option<bool>,
    /// Case-insensitive title search
    pub q: Option<String>,
}

/// Convert a decimal price into cents. Rejects non-finite and non-positive values.
pub fn price_to_cents(price: f64) -> Option<i64> {
    if !price.is_finite() || price <= 0.0 {
        return None;
    }
    let cents = (price * 100.0).round() as i64;
    (cents > 0).then_some(cents)
}
