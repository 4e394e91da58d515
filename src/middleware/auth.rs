use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::models::Account;
use crate::util::extract_bearer_token;

/// Cookie carrying the session token for browser clients.
pub const SESSION_COOKIE: &str = "user-login";

/// Authenticated caller, inserted as a request extension by the auth middleware.
#[derive(Clone, Debug)]
pub struct AccountContext {
    pub account: Account,
    /// Raw session token used for this request (needed for logout)
    pub token: String,
}

impl AccountContext {
    pub fn account_id(&self) -> &str {
        &self.account.id
    }

    /// Reject a client-supplied account id that names someone else.
    pub fn ensure_same_account(&self, claimed: Option<&str>) -> Result<()> {
        match claimed {
            Some(id) if id != self.account.id => Err(AppError::Forbidden(msg::ACCOUNT_MISMATCH.into())),
            _ => Ok(()),
        }
    }
}

/// Session token from `Authorization: Bearer` or, failing that, the session cookie.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token.to_string());
    }
    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().trim().to_string())
        .filter(|v| !v.is_empty())
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Option<AccountContext>> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    let conn = state.db.get()?;
    let account = queries::get_account_by_session_token(&conn, &token)?;
    Ok(account.map(|account| AccountContext { account, token }))
}

pub async fn require_account(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let ctx = authenticate(&state, request.headers())?.ok_or(AppError::Unauthorized)?;
    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let ctx = authenticate(&state, request.headers())?.ok_or(AppError::Unauthorized)?;
    if !ctx.account.is_admin {
        tracing::debug!("Account {} denied admin access", ctx.account.id);
        return Err(AppError::Forbidden(msg::ADMIN_REQUIRED.into()));
    }
    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// Extractor for routes that work with or without a session
/// (session probe, support tickets).
pub struct MaybeAccount(pub Option<AccountContext>);

impl FromRequestParts<AppState> for MaybeAccount {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        if let Some(ctx) = parts.extensions.get::<AccountContext>() {
            return Ok(MaybeAccount(Some(ctx.clone())));
        }
        Ok(MaybeAccount(authenticate(state, &parts.headers)?))
    }
}
