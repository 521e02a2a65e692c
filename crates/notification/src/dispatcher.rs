use std::sync::Arc;

use async_trait::async_trait;
use contract::{OrderEvent, PaymentEvent, ProductEvent, decode, topics};
use event_bus::{Delivery, EventBus, EventHandler, HandlerError};

use crate::notifier::Notifier;

/// Consumer group identifying the notification service's role.
pub const CONSUMER_GROUP: &str = "notification-service";

/// Tails every saga topic and turns events into user-facing messages.
///
/// This participant is purely an observer: it never publishes and never
/// owns state, so a message it cannot make sense of is logged and dropped
/// rather than retried or dead-lettered.
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Subscribes the dispatcher to all three saga topics.
    pub async fn subscribe(self: Arc<Self>, bus: &dyn EventBus) -> Result<(), event_bus::BusError> {
        bus.subscribe(topics::ORDER_EVENTS, CONSUMER_GROUP, Arc::clone(&self) as _)
            .await?;
        bus.subscribe(topics::PRODUCT_EVENTS, CONSUMER_GROUP, Arc::clone(&self) as _)
            .await?;
        bus.subscribe(topics::PAYMENT_EVENTS, CONSUMER_GROUP, self).await
    }

    fn on_order_event(&self, event: OrderEvent) {
        let (order_id, message) = match event {
            OrderEvent::OrderCreated {
                order_id,
                total_amount,
                ..
            } => (
                order_id,
                format!("Your order has been placed ({total_amount})"),
            ),
            OrderEvent::OrderProductsReserved { order_id, .. } => {
                (order_id, "Your items are reserved, processing payment".into())
            }
            OrderEvent::OrderPaymentFailed { order_id, .. } => {
                (order_id, "Payment did not go through, returning items".into())
            }
            OrderEvent::OrderConfirmed { order_id } => {
                (order_id, "Your order is confirmed".into())
            }
            OrderEvent::OrderFailed { order_id, reason } => {
                (order_id, format!("Your order could not be completed: {reason}"))
            }
        };
        self.notifier.notify(order_id, &message);
    }

    fn on_product_event(&self, event: ProductEvent) {
        // Reservation progress is internal; only the compensation result
        // is worth telling the user about.
        if let ProductEvent::ProductStockReleased { order_id, .. } = event {
            self.notifier
                .notify(order_id, "Your items have been returned to stock");
        }
    }

    fn on_payment_event(&self, event: PaymentEvent) {
        match event {
            PaymentEvent::PaymentProcessed {
                order_id, amount, ..
            } => {
                self.notifier
                    .notify(order_id, &format!("Your payment of {amount} was received"));
            }
            PaymentEvent::PaymentFailed {
                order_id, reason, ..
            } => {
                self.notifier
                    .notify(order_id, &format!("Payment failed: {reason}"));
            }
        }
    }
}

#[async_trait]
impl EventHandler for NotificationDispatcher {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let outcome = match delivery.topic.as_str() {
            topics::ORDER_EVENTS => decode::<OrderEvent>(&delivery.envelope)
                .map(|event| self.on_order_event(event)),
            topics::PRODUCT_EVENTS => decode::<ProductEvent>(&delivery.envelope)
                .map(|event| self.on_product_event(event)),
            topics::PAYMENT_EVENTS => decode::<PaymentEvent>(&delivery.envelope)
                .map(|event| self.on_payment_event(event)),
            other => {
                tracing::warn!(topic = other, "notification dispatcher on unexpected topic");
                return Ok(());
            }
        };

        if let Err(err) = outcome {
            metrics::counter!("notifications_dropped").increment(1);
            tracing::warn!(
                topic = %delivery.topic,
                event_type = %delivery.envelope.event_type,
                error = %err,
                "dropping undecodable event"
            );
        }
        Ok(())
    }
}
