//! Storefront - game catalog, checkout, and exactly-once order fulfillment.
//!
//! Payments go through Stripe hosted checkout. A completed payment is
//! applied by the signed webhook or by the buyer's post-redirect
//! confirmation, whichever arrives first; both converge on
//! [`fulfillment::fulfill`].

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod extractors;
pub mod fulfillment;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod payments;
pub mod rate_limit;
pub mod util;
