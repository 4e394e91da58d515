use axum::{Extension, extract::State, http::StatusCode};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};

use crate::crypto::{hash_password, verify_password};
use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::middleware::{AccountContext, MaybeAccount, SESSION_COOKIE};
use crate::models::{Account, CreateAccount};
use crate::util::is_plausible_email;

const MIN_PASSWORD_CHARS: usize = 8;

pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<CreateAccount>,
) -> Result<(StatusCode, Json<Account>)> {
    if !is_plausible_email(&input.email) {
        return Err(AppError::BadRequest("A valid email address is required".into()));
    }
    if input.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_CHARS
        )));
    }

    let password_hash = hash_password(&input.password)?;
    let conn = state.db.get()?;
    let account = queries::create_account(&conn, &input.email, &password_hash, false)?;

    tracing::info!("Registered account {}", account.id);
    Ok((StatusCode::CREATED, Json(account)))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: Account,
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Exchange credentials for a session token, returned in the body and as a cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(input): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>)> {
    let conn = state.db.get()?;

    let account = queries::get_account_by_email(&conn, &input.email)?;
    let account = match account {
        Some(account) if verify_password(&input.password, &account.password_hash) => account,
        _ => {
            tracing::debug!("Failed login attempt");
            return Err(AppError::Unauthorized);
        }
    };

    let token = queries::create_auth_session(&conn, &account.id, state.session_ttl_secs)?;
    tracing::info!("Account {} logged in", account.id);

    let jar = jar.add(session_cookie(token.clone()));
    Ok((jar, Json(LoginResponse { token, user: account })))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    MaybeAccount(ctx): MaybeAccount,
) -> Result<(CookieJar, StatusCode)> {
    if let Some(ctx) = ctx {
        let conn = state.db.get()?;
        queries::delete_auth_session(&conn, &ctx.token)?;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, StatusCode::NO_CONTENT))
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Account>,
}

/// Cheap "am I logged in" probe for browser clients.
pub async fn session_probe(MaybeAccount(ctx): MaybeAccount) -> Json<SessionResponse> {
    Json(SessionResponse {
        authenticated: ctx.is_some(),
        user: ctx.map(|c| c.account),
    })
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: Account,
    pub owned_count: i64,
    pub wishlist_count: i64,
}

pub async fn session_me(
    State(state): State<AppState>,
    Extension(ctx): Extension<AccountContext>,
) -> Result<Json<ProfileResponse>> {
    let conn = state.db.get()?;
    let summary = queries::get_account_summary(&conn, ctx.account_id())?
        .ok_or_else(|| AppError::NotFound(msg::ACCOUNT_NOT_FOUND.into()))?;
    Ok(Json(ProfileResponse {
        user: ctx.account,
        owned_count: summary.owned_count,
        wishlist_count: summary.wishlist_count,
    }))
}
