use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

pub const SUBJECT_MAX_CHARS: usize = 120;
pub const MESSAGE_MAX_CHARS: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TicketCategory {
    Account,
    Billing,
    Orders,
    Downloads,
    Security,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: String,
    pub account_id: Option<String>,
    pub email: Option<String>,
    pub category: TicketCategory,
    pub subject: String,
    pub message: String,
    pub status: TicketStatus,
    pub meta: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateSupportTicket {
    pub category: TicketCategory,
    pub subject: String,
    pub message: String,
    /// Contact address for anonymous tickets
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSupportTicket {
    pub status: TicketStatus,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct TicketFilters {
    pub status: Option<TicketStatus>,
    pub category: Option<TicketCategory>,
}
