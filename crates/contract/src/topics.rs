//! Topic names used by the saga.
//!
//! One topic per publishing participant; the order id keys every message.

/// Events published by the order participant.
pub const ORDER_EVENTS: &str = "order-events";

/// Events published by the product (stock ledger) participant.
pub const PRODUCT_EVENTS: &str = "product-events";

/// Events published by the payment participant.
pub const PAYMENT_EVENTS: &str = "payment-events";
