use serde::Serialize;

/// Login session. The bearer token itself is never stored, only its hash.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token_hash: String,
    pub account_id: String,
    pub created_at: i64,
    pub expires_at: i64,
}
