mod games;
mod orders;
mod support;
mod users;

pub use games::*;
pub use orders::*;
pub use support::*;
pub use users::*;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};

use crate::db::AppState;
use crate::middleware::require_admin;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/games", post(create_game))
        .route("/admin/games/{id}", put(update_game).delete(delete_game))
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}", get(get_user).put(update_user))
        .route(
            "/admin/users/{id}/entitlements/{game_id}",
            delete(revoke_user_entitlement),
        )
        .route("/admin/orders", get(list_orders))
        .route("/admin/orders/{id}", get(get_order))
        .route("/admin/reconcile", post(reconcile))
        .route("/admin/support-tickets", get(list_support_tickets))
        .route("/admin/support-tickets/{id}", put(update_support_ticket))
        .layer(middleware::from_fn_with_state(state, require_admin))
}
