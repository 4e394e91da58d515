use serde::{Deserialize, Serialize};

/// A cart line after server-side pricing. This is what gets charged,
/// recorded in the ledger, and granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub title: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl LineItem {
    /// `None` when the line would overflow.
    pub fn subtotal_cents(&self) -> Option<i64> {
        self.unit_price_cents.checked_mul(self.quantity)
    }
}

/// Priced cart persisted at checkout time and keyed by the processor's
/// session id. Reconciliation reads this record; it never trusts cart
/// contents carried through the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutIntent {
    pub id: String,
    pub account_id: String,
    /// Set once the processor session has been created
    pub processor_session_id: Option<String>,
    pub items: Vec<LineItem>,
    pub total_cents: i64,
    pub currency: String,
    pub created_at: i64,
    /// Set exactly once, when the ledger entry is written
    pub consumed_at: Option<i64>,
}

impl CheckoutIntent {
    pub fn product_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.product_id.clone()).collect()
    }
}
