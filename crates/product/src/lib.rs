//! Stock ledger participant of the order fulfillment saga.
//!
//! Owns product stock exclusively: the only writers are the atomic
//! [`StockLedger::reserve`] (decrement-if-sufficient) and
//! [`StockLedger::release`] (increment) operations. The participant
//! consumes `order-events`, reserves every line item of a new order with
//! item-by-item rollback on partial failure, and releases stock when
//! payment fails downstream.

mod ledger;
mod memory;
mod participant;
mod postgres;

pub use ledger::{ProductStock, Result, StockError, StockLedger};
pub use memory::InMemoryStockLedger;
pub use participant::{CONSUMER_GROUP, StockParticipant};
pub use postgres::PostgresStockLedger;
