use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// User-facing error messages shared across handlers.
pub mod msg {
    pub const EMAIL_TAKEN: &str = "An account with this email already exists";
    pub const ADMIN_REQUIRED: &str = "Admin access required";
    pub const ACCOUNT_MISMATCH: &str = "user_id does not match the authenticated account";

    pub const PRODUCT_NOT_FOUND: &str = "Game not found";
    pub const ACCOUNT_NOT_FOUND: &str = "User not found";
    pub const ORDER_NOT_FOUND: &str = "Order not found";
    pub const TICKET_NOT_FOUND: &str = "Support ticket not found";
    pub const SESSION_NOT_FOUND: &str = "Checkout session not found";
    pub const NOT_OWNED: &str = "Game is not in your library";

    pub const EMPTY_CART: &str = "Cart is empty";
    pub const INVALID_QUANTITY: &str = "Quantity must be between 1 and 100";
    pub const CART_TOTAL_TOO_LARGE: &str = "Cart total is too large";
    pub const INVALID_SESSION_ID: &str = "Invalid checkout session id";
    pub const INVALID_PRICE: &str = "Price must be a positive number";
    pub const UNKNOWN_PRODUCT: &str = "Cart references a game that is not for sale";
    pub const PAYMENT_NOT_COMPLETED: &str = "Payment has not been completed";

    pub const MISSING_SIGNATURE: &str = "Missing Stripe-Signature header";
    pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid signature format";
    pub const INVALID_TIMESTAMP_IN_SIGNATURE: &str = "Invalid timestamp in signature";
    pub const SIGNATURE_MISMATCH: &str = "Signature verification failed";
    pub const INVALID_WEBHOOK_SECRET: &str = "Invalid webhook secret";

    pub const STORE_UNAVAILABLE: &str = "Store temporarily unavailable";
    pub const DEADLINE_EXCEEDED: &str = "Processing deadline exceeded";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    /// Webhook signature missing, malformed, stale, or wrong.
    #[error("Authenticity check failed: {0}")]
    Authenticity(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A completed ledger entry already exists for this transaction id.
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// Signed event whose payload cannot be applied (bad metadata, unknown intent).
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Payment processor error: {0}")]
    Upstream(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Store failures worth retrying: pool exhaustion and SQLite lock contention.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Pool(_) => true,
            AppError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<StatusCode> for AppError {
    fn from(code: StatusCode) -> Self {
        match code {
            StatusCode::UNAUTHORIZED => AppError::Unauthorized,
            StatusCode::FORBIDDEN => AppError::Forbidden("Access denied".into()),
            StatusCode::NOT_FOUND => AppError::NotFound("Resource not found".into()),
            _ => AppError::Internal(format!("Status: {}", code)),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone()))
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Authenticity(msg) => {
                tracing::warn!("Rejected unauthenticated webhook: {}", msg);
                (StatusCode::UNAUTHORIZED, "Invalid signature", None)
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "Forbidden", Some(msg.clone())),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone())),
            AppError::DuplicateTransaction(id) => (
                StatusCode::CONFLICT,
                "Duplicate transaction",
                Some(id.clone()),
            ),
            AppError::MalformedEvent(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Malformed event",
                Some(msg.clone()),
            ),
            AppError::Upstream(msg) => {
                tracing::error!("Payment processor error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Payment processor error", None)
            }
            AppError::Unavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service unavailable",
                    Some(msg.clone()),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                if self.is_transient() {
                    (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable", None)
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
                }
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Convert `Option<T>` into a `NotFound` error.
pub trait OptionExt<T> {
    fn or_not_found(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, message: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(message.to_string()))
    }
}
