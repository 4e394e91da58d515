pub mod admin;
pub mod public;
pub mod shop;
pub mod webhooks;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::RateLimitConfig;
use crate::db::AppState;

/// Assemble the full HTTP surface.
pub fn app(state: AppState, rate_limit: RateLimitConfig) -> Router {
    Router::new()
        // Catalog, accounts, support (no auth or optional auth)
        .merge(public::router(rate_limit))
        // Checkout, confirmation, wishlist, library (session auth)
        .merge(shop::router(state.clone(), rate_limit))
        // Processor callbacks (signature auth)
        .merge(webhooks::router())
        // Catalog management and ledger inspection (admin session)
        .merge(admin::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
