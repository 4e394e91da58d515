//! Per-IP rate limiting for the public surface.
//!
//! Tiers:
//! - Strict: /login, /users, /checkout, /fulfillment/add-games (password
//!   hashing or payment processor calls)
//! - Standard: catalog, session probes, support tickets
//!
//! Configure via RATE_LIMIT_STRICT_RPM (default 10) and
//! RATE_LIMIT_STANDARD_RPM (default 60). A value of 0 disables the tier.
//! Keys come from the peer address, so the server must be started with
//! `into_make_service_with_connect_info::<SocketAddr>()`.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;

use crate::db::AppState;

pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Build a limiter allowing `requests_per_minute` with an equal burst.
/// Returns None when the tier is disabled.
fn create_layer(requests_per_minute: u32) -> Option<RateLimitLayer> {
    if requests_per_minute == 0 {
        return None;
    }

    let period = Duration::from_millis((60_000 / requests_per_minute as u64).max(1));
    let config = GovernorConfigBuilder::default()
        .period(period)
        .burst_size(requests_per_minute)
        .finish()?;

    Some(GovernorLayer::new(Arc::new(config)))
}

/// Wrap a router in a rate limiter, or return it unchanged if disabled.
pub fn limit(router: Router<AppState>, requests_per_minute: u32) -> Router<AppState> {
    match create_layer(requests_per_minute) {
        Some(layer) => router.layer(layer),
        None => {
            tracing::debug!("Rate limiting disabled for a route group");
            router
        }
    }
}
