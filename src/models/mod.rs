mod account;
mod auth_session;
mod checkout_intent;
mod order;
mod product;
mod support_ticket;

pub use account::*;
pub use auth_session::*;
pub use checkout_intent::*;
pub use order::*;
pub use product::*;
pub use support_ticket::*;
