use common::{Money, OrderId, PaymentId, UserId};
use event_bus::{EventBus, EventEnvelope};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ContractError;
use crate::items::{FailedItem, OrderLine};
use crate::topics;

/// Terminal status of a payment capture attempt, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events published by the order participant on `order-events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "data", rename_all_fields = "camelCase")]
pub enum OrderEvent {
    /// Saga start: the order row exists before this is published.
    #[serde(rename = "order-created")]
    OrderCreated {
        order_id: OrderId,
        user_id: UserId,
        items: Vec<OrderLine>,
        total_amount: Money,
    },

    /// All line items reserved; triggers payment capture.
    #[serde(rename = "order-products-reserved")]
    OrderProductsReserved {
        order_id: OrderId,
        user_id: UserId,
        total_amount: Money,
    },

    /// Payment failed after reservation; triggers stock release.
    #[serde(rename = "order-payment-failed")]
    OrderPaymentFailed {
        order_id: OrderId,
        items: Vec<OrderLine>,
    },

    /// Terminal: the order is confirmed.
    #[serde(rename = "order-confirmed")]
    OrderConfirmed { order_id: OrderId },

    /// Terminal: the order failed.
    #[serde(rename = "order-failed")]
    OrderFailed { order_id: OrderId, reason: String },
}

/// Events published by the product participant on `product-events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "data", rename_all_fields = "camelCase")]
pub enum ProductEvent {
    /// Every line item was reserved.
    #[serde(rename = "product-reserved")]
    ProductReserved {
        order_id: OrderId,
        items: Vec<OrderLine>,
    },

    /// At least one line item could not be reserved; any partial
    /// reservations were already rolled back item by item.
    #[serde(rename = "product-reservation-failed")]
    ProductReservationFailed {
        order_id: OrderId,
        failed_items: Vec<FailedItem>,
        reason: String,
    },

    /// Compensation done: reserved stock returned to availability.
    #[serde(rename = "product-stock-released")]
    ProductStockReleased {
        order_id: OrderId,
        items: Vec<OrderLine>,
    },
}

/// Events published by the payment participant on `payment-events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "data", rename_all_fields = "camelCase")]
pub enum PaymentEvent {
    /// Capture succeeded; exactly one payment record was written.
    #[serde(rename = "payment-processed")]
    PaymentProcessed {
        order_id: OrderId,
        payment_id: PaymentId,
        amount: Money,
        status: PaymentStatus,
    },

    /// Capture failed. `payment_id` is absent when the attempt failed
    /// before a payment record could be written.
    #[serde(rename = "payment-failed")]
    PaymentFailed {
        order_id: OrderId,
        payment_id: Option<PaymentId>,
        amount: Money,
        status: PaymentStatus,
        reason: String,
    },
}

/// A typed event belonging to one saga topic.
///
/// Every lifecycle event is keyed by its order id, which is what gives a
/// single order's events in-order delivery within a consumer group.
pub trait LifecycleEvent: Serialize + DeserializeOwned + Send + Sync {
    /// The topic this event set is published on.
    const TOPIC: &'static str;

    /// The wire tag (e.g. `"order-created"`).
    fn event_type(&self) -> &'static str;

    /// The order this event belongs to; used as the partition key.
    fn order_id(&self) -> OrderId;
}

impl LifecycleEvent for OrderEvent {
    const TOPIC: &'static str = topics::ORDER_EVENTS;

    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated { .. } => "order-created",
            OrderEvent::OrderProductsReserved { .. } => "order-products-reserved",
            OrderEvent::OrderPaymentFailed { .. } => "order-payment-failed",
            OrderEvent::OrderConfirmed { .. } => "order-confirmed",
            OrderEvent::OrderFailed { .. } => "order-failed",
        }
    }

    fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::OrderCreated { order_id, .. }
            | OrderEvent::OrderProductsReserved { order_id, .. }
            | OrderEvent::OrderPaymentFailed { order_id, .. }
            | OrderEvent::OrderConfirmed { order_id }
            | OrderEvent::OrderFailed { order_id, .. } => *order_id,
        }
    }
}

impl LifecycleEvent for ProductEvent {
    const TOPIC: &'static str = topics::PRODUCT_EVENTS;

    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductReserved { .. } => "product-reserved",
            ProductEvent::ProductReservationFailed { .. } => "product-reservation-failed",
            ProductEvent::ProductStockReleased { .. } => "product-stock-released",
        }
    }

    fn order_id(&self) -> OrderId {
        match self {
            ProductEvent::ProductReserved { order_id, .. }
            | ProductEvent::ProductReservationFailed { order_id, .. }
            | ProductEvent::ProductStockReleased { order_id, .. } => *order_id,
        }
    }
}

impl LifecycleEvent for PaymentEvent {
    const TOPIC: &'static str = topics::PAYMENT_EVENTS;

    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentProcessed { .. } => "payment-processed",
            PaymentEvent::PaymentFailed { .. } => "payment-failed",
        }
    }

    fn order_id(&self) -> OrderId {
        match self {
            PaymentEvent::PaymentProcessed { order_id, .. }
            | PaymentEvent::PaymentFailed { order_id, .. } => *order_id,
        }
    }
}

/// Publishes a lifecycle event to its topic, keyed by order id.
pub async fn publish<E: LifecycleEvent>(bus: &dyn EventBus, event: &E) -> Result<(), ContractError> {
    let encoded = serde_json::to_value(event)?;
    // Adjacent tagging produces {"eventType": ..., "data": ...}; the
    // envelope carries the tag and data separately.
    let data = encoded
        .get("data")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    bus.publish(
        E::TOPIC,
        &event.order_id().to_string(),
        event.event_type(),
        data,
    )
    .await?;
    Ok(())
}

/// Decodes an envelope into a typed lifecycle event, rejecting anything
/// outside the closed event set.
pub fn decode<E: LifecycleEvent>(envelope: &EventEnvelope) -> Result<E, ContractError> {
    let tagged = serde_json::json!({
        "eventType": envelope.event_type,
        "data": envelope.payload,
    });
    serde_json::from_value(tagged).map_err(|e| {
        ContractError::Decode(format!(
            "event '{}' on topic '{}': {}",
            envelope.event_type,
            E::TOPIC,
            e
        ))
    })
}
