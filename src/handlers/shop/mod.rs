mod checkout;
mod confirmation;
mod library;
mod wishlist;

pub use checkout::*;
pub use confirmation::*;
pub use library::*;
pub use wishlist::*;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::handlers::public::session_me;
use crate::middleware::require_account;
use crate::rate_limit;

/// Routes that act on the signed-in buyer's behalf.
pub fn router(state: AppState, rate_limit: RateLimitConfig) -> Router<AppState> {
    // Both of these call the payment processor
    let payments = Router::new()
        .route("/checkout", post(create_checkout))
        .route("/fulfillment/add-games", post(confirm_fulfillment))
        .layer(middleware::from_fn_with_state(state.clone(), require_account));

    let account = Router::new()
        .route("/checkout/session", get(get_checkout_session))
        .route("/session/me", get(session_me))
        .route("/wishlist", get(list_wishlist).put(add_to_wishlist))
        .route("/wishlist/{game_id}", put(add_game_to_wishlist).delete(remove_from_wishlist))
        .route("/library", get(list_library))
        .route("/library/{game_id}", get(get_library_game))
        .route("/orders", get(list_my_orders))
        .route("/orders/{id}", get(get_my_order))
        .layer(middleware::from_fn_with_state(state, require_account));

    Router::new()
        .merge(rate_limit::limit(payments, rate_limit.strict_rpm))
        .merge(rate_limit::limit(account, rate_limit.standard_rpm))
}
