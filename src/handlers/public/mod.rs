mod auth;
mod games;
mod support;

pub use auth::*;
pub use games::*;
pub use support::*;

use axum::{
    Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::extractors::Json;
use crate::rate_limit;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(rate_limit: RateLimitConfig) -> Router<AppState> {
    let strict = Router::new()
        .route("/users", post(register))
        .route("/login", post(login));

    let standard = Router::new()
        .route("/logout", post(logout))
        .route("/session", get(session_probe))
        .route("/games", get(list_games))
        .route("/games/{id}", get(get_game))
        .route("/support-tickets", post(create_support_ticket));

    Router::new()
        .route("/health", get(health))
        .merge(rate_limit::limit(strict, rate_limit.strict_rpm))
        .merge(rate_limit::limit(standard, rate_limit.standard_rpm))
}
