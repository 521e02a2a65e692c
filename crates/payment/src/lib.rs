//! Payment participant of the order fulfillment saga.
//!
//! Consumes `order-products-reserved`, attempts a capture through the
//! payment gateway, records exactly one payment row per attempt, and
//! publishes `payment-processed` or `payment-failed`. Every failure mode,
//! including errors thrown before the record is finalized, still produces
//! a `payment-failed` event so the saga can never leave an order hanging
//! in PENDING because a capture blew up.

mod gateway;
mod memory;
mod model;
mod participant;
mod postgres;
mod processor;
mod repository;

pub use gateway::{CaptureRequest, GatewayError, PaymentGateway, ScriptedGateway};
pub use memory::InMemoryPaymentRepository;
pub use model::{Payment, PaymentMethod};
pub use participant::{CONSUMER_GROUP, PaymentParticipant};
pub use postgres::PostgresPaymentRepository;
pub use processor::{CaptureOutcome, PaymentProcessor};
pub use repository::{PaymentRepository, RepositoryError};
