use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

/// Which trigger wrote a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderSource {
    Webhook,
    Confirmation,
}

/// Ledger line with the price captured at purchase time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub title: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// Append-only ledger entry. At most one `completed` entry exists per
/// `transaction_id` (the processor's checkout session id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub transaction_id: String,
    pub account_id: String,
    pub intent_id: Option<String>,
    pub items: Vec<OrderItem>,
    pub total_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub source: OrderSource,
    pub created_at: i64,
    /// Set once the buyer's entitlements were extended for this entry
    pub propagated_at: Option<i64>,
}

impl Order {
    pub fn product_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.product_id.clone()).collect()
    }
}

/// Input for a ledger write.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub transaction_id: String,
    pub account_id: String,
    pub intent_id: Option<String>,
    pub items: Vec<OrderItem>,
    pub total_cents: i64,
    pub currency: String,
    pub source: OrderSource,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct OrderFilters {
    pub account_id: Option<String>,
    pub status: Option<OrderStatus>,
    /// Only entries whose entitlements were never propagated
    #[serde(default)]
    pub unpropagated: bool,
}
