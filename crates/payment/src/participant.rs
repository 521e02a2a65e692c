use std::sync::Arc;

use async_trait::async_trait;
use contract::{OrderEvent, StepLog, decode, topics};
use event_bus::{Delivery, EventBus, EventHandler, HandlerError};

use crate::model::PaymentMethod;
use crate::processor::PaymentProcessor;

/// Consumer group identifying the payment service's role.
pub const CONSUMER_GROUP: &str = "payment-service";

const STEP_CAPTURE: &str = "payment-capture";

/// Bus-facing side of the payment service: reacts to
/// `order-products-reserved` by running one capture attempt.
pub struct PaymentParticipant {
    processor: PaymentProcessor,
    bus: Arc<dyn EventBus>,
    steps: Arc<dyn StepLog>,
}

impl PaymentParticipant {
    pub fn new(processor: PaymentProcessor, bus: Arc<dyn EventBus>, steps: Arc<dyn StepLog>) -> Self {
        Self {
            processor,
            bus,
            steps,
        }
    }

    /// Subscribes the participant to `order-events`.
    pub async fn subscribe(self: Arc<Self>) -> Result<(), event_bus::BusError> {
        let bus = Arc::clone(&self.bus);
        bus.subscribe(topics::ORDER_EVENTS, CONSUMER_GROUP, self).await
    }
}

#[async_trait]
impl EventHandler for PaymentParticipant {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let event: OrderEvent = decode(&delivery.envelope)?;

        let OrderEvent::OrderProductsReserved {
            order_id,
            user_id,
            total_amount,
        } = event
        else {
            return Ok(());
        };

        if !self.steps.begin(order_id, STEP_CAPTURE) {
            tracing::warn!(%order_id, "duplicate order-products-reserved delivery, skipping capture");
            metrics::counter!("payment_duplicate_deliveries").increment(1);
            return Ok(());
        }

        self.processor
            .process(order_id, user_id, total_amount, PaymentMethod::default())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{PaymentGateway, ScriptedGateway};
    use crate::memory::InMemoryPaymentRepository;
    use crate::repository::PaymentRepository;
    use common::{Money, OrderId, UserId};
    use contract::{InMemoryStepLog, publish};
    use event_bus::InMemoryEventBus;

    async fn setup() -> (InMemoryEventBus, InMemoryPaymentRepository, Arc<ScriptedGateway>) {
        let bus = InMemoryEventBus::new();
        let repository = InMemoryPaymentRepository::new();
        let gateway = Arc::new(ScriptedGateway::approving());
        let processor = PaymentProcessor::new(
            Arc::new(repository.clone()),
            Arc::clone(&gateway) as Arc<dyn PaymentGateway>,
            Arc::new(bus.clone()),
        );
        let participant = Arc::new(PaymentParticipant::new(
            processor,
            Arc::new(bus.clone()),
            Arc::new(InMemoryStepLog::new()),
        ));
        participant.subscribe().await.unwrap();
        (bus, repository, gateway)
    }

    #[tokio::test]
    async fn products_reserved_triggers_capture() {
        let (bus, repository, _gateway) = setup().await;
        let order_id = OrderId::new();

        let event = OrderEvent::OrderProductsReserved {
            order_id,
            user_id: UserId::new(),
            total_amount: Money::from_cents(2500),
        };
        publish(&bus, &event).await.unwrap();
        bus.wait_until_idle().await;

        let payments = repository.find_by_order(order_id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, Money::from_cents(2500));
        assert_eq!(
            bus.published_count(topics::PAYMENT_EVENTS, "payment-processed"),
            1
        );
    }

    #[tokio::test]
    async fn duplicate_delivery_captures_once() {
        let (bus, repository, gateway) = setup().await;
        let order_id = OrderId::new();

        for _ in 0..2 {
            let event = OrderEvent::OrderProductsReserved {
                order_id,
                user_id: UserId::new(),
                total_amount: Money::from_cents(2500),
            };
            publish(&bus, &event).await.unwrap();
            bus.wait_until_idle().await;
        }

        assert_eq!(repository.find_by_order(order_id).await.unwrap().len(), 1);
        assert_eq!(gateway.capture_count(), 1);
    }

    #[tokio::test]
    async fn other_order_events_are_ignored() {
        let (bus, repository, _gateway) = setup().await;
        let order_id = OrderId::new();

        let event = OrderEvent::OrderConfirmed { order_id };
        publish(&bus, &event).await.unwrap();
        bus.wait_until_idle().await;

        assert_eq!(repository.find_by_order(order_id).await.unwrap().len(), 0);
    }
}
