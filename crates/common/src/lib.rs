//! Shared types for the order fulfillment saga.
//!
//! Every participant crate depends on these identifier newtypes and on
//! [`Money`] so that order, product, and payment ids cannot be mixed up
//! at compile time.

mod money;
mod types;

pub use money::Money;
pub use types::{OrderId, PaymentId, ProductId, UserId};
