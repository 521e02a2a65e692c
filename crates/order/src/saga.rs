use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, OrderId, UserId};
use contract::{
    LifecycleEvent, OrderEvent, OrderLine, PaymentEvent, ProductEvent, StepLog, decode, publish,
    topics,
};
use event_bus::{Delivery, EventBus, EventHandler, HandlerError};

use crate::error::OrderError;
use crate::model::Order;
use crate::repository::{OrderRepository, Transition};
use crate::status::OrderStatus;

/// Consumer group identifying the order service's role.
pub const CONSUMER_GROUP: &str = "order-service";

pub(crate) const STEP_PRODUCTS_RESERVED: &str = "products-reserved";
const STEP_RESERVATION_FAILED: &str = "reservation-failed";
const STEP_PAYMENT_PROCESSED: &str = "payment-processed";
const STEP_PAYMENT_FAILED: &str = "payment-failed";
const STEP_STOCK_RELEASED: &str = "stock-released";

/// The choreographed saga coordinator.
///
/// Starts the saga by persisting the order and publishing
/// `order-created`, then advances or compensates it purely in reaction
/// to product and payment events. Every reaction is guarded by the
/// status machine and by a per-(order, step) idempotency mark, so a
/// redelivered or contradictory event is logged as a duplicate or an
/// anomaly instead of moving the order twice.
pub struct OrderSaga {
    repository: Arc<dyn OrderRepository>,
    bus: Arc<dyn EventBus>,
    steps: Arc<dyn StepLog>,
}

impl OrderSaga {
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        bus: Arc<dyn EventBus>,
        steps: Arc<dyn StepLog>,
    ) -> Self {
        Self {
            repository,
            bus,
            steps,
        }
    }

    /// Subscribes the saga to the product and payment topics.
    pub async fn subscribe(self: Arc<Self>) -> Result<(), event_bus::BusError> {
        let bus = Arc::clone(&self.bus);
        bus.subscribe(topics::PRODUCT_EVENTS, CONSUMER_GROUP, Arc::clone(&self) as _)
            .await?;
        bus.subscribe(topics::PAYMENT_EVENTS, CONSUMER_GROUP, self).await
    }

    /// Starts the saga: persists the order PENDING, then publishes
    /// `order-created`. The row exists before the event, so any observer
    /// fetching the order after receiving the event finds it.
    #[tracing::instrument(skip(self, items))]
    pub async fn create_order_saga(
        &self,
        user_id: UserId,
        items: Vec<OrderLine>,
        total_amount: Money,
    ) -> Result<Order, OrderError> {
        if items.is_empty() {
            return Err(OrderError::Validation("order has no items".into()));
        }
        for item in &items {
            if item.quantity == 0 {
                return Err(OrderError::Validation(format!(
                    "item {} has zero quantity",
                    item.product_id
                )));
            }
            if !item.price.is_positive() {
                return Err(OrderError::Validation(format!(
                    "item {} has non-positive price",
                    item.product_id
                )));
            }
        }

        let order = Order::new(user_id, items.clone(), total_amount);
        self.repository.insert(&order).await?;

        let event = OrderEvent::OrderCreated {
            order_id: order.id,
            user_id,
            items,
            total_amount,
        };
        publish(self.bus.as_ref(), &event).await?;

        metrics::counter!("saga_orders_created").increment(1);
        tracing::info!(order_id = %order.id, %total_amount, "order saga started");
        Ok(order)
    }

    /// All line items reserved: trigger payment. The order stays PENDING.
    ///
    /// If the order already left PENDING (the reaper timed it out while
    /// this event was in flight), payment must not be triggered; the
    /// reservation is real though, so stock release is requested instead.
    #[tracing::instrument(skip(self), fields(%order_id))]
    pub async fn on_product_reserved(&self, order_id: OrderId) -> Result<(), OrderError> {
        if !self.steps.begin(order_id, STEP_PRODUCTS_RESERVED) {
            self.log_duplicate(order_id, STEP_PRODUCTS_RESERVED);
            return Ok(());
        }

        let order = self
            .repository
            .get(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;

        if order.status != OrderStatus::Pending {
            self.log_anomaly(order_id, "product-reserved", order.status);
            let event = OrderEvent::OrderPaymentFailed {
                order_id,
                items: order.items,
            };
            publish(self.bus.as_ref(), &event).await?;
            return Ok(());
        }

        let event = OrderEvent::OrderProductsReserved {
            order_id,
            user_id: order.user_id,
            total_amount: order.total_amount,
        };
        publish(self.bus.as_ref(), &event).await?;
        Ok(())
    }

    /// Reservation failed: no stock was held, so no compensation is
    /// needed. The order goes straight to FAILED.
    #[tracing::instrument(skip(self), fields(%order_id))]
    pub async fn on_product_reservation_failed(
        &self,
        order_id: OrderId,
        reason: String,
    ) -> Result<(), OrderError> {
        if !self.steps.begin(order_id, STEP_RESERVATION_FAILED) {
            self.log_duplicate(order_id, STEP_RESERVATION_FAILED);
            return Ok(());
        }

        match self
            .repository
            .transition(order_id, OrderStatus::Failed)
            .await?
        {
            Transition::Applied(_) => {
                metrics::counter!("saga_orders_failed").increment(1);
                tracing::info!(%order_id, reason, "order failed at reservation");
                let event = OrderEvent::OrderFailed { order_id, reason };
                publish(self.bus.as_ref(), &event).await?;
            }
            Transition::Rejected { current } => {
                self.log_anomaly(order_id, "product-reservation-failed", current);
            }
        }
        Ok(())
    }

    /// Payment captured: the order is confirmed.
    #[tracing::instrument(skip(self), fields(%order_id))]
    pub async fn on_payment_processed(&self, order_id: OrderId) -> Result<(), OrderError> {
        if !self.steps.begin(order_id, STEP_PAYMENT_PROCESSED) {
            self.log_duplicate(order_id, STEP_PAYMENT_PROCESSED);
            return Ok(());
        }

        match self
            .repository
            .transition(order_id, OrderStatus::Confirmed)
            .await?
        {
            Transition::Applied(_) => {
                metrics::counter!("saga_orders_confirmed").increment(1);
                tracing::info!(%order_id, "order confirmed");
                let event = OrderEvent::OrderConfirmed { order_id };
                publish(self.bus.as_ref(), &event).await?;
            }
            Transition::Rejected { current } => {
                self.log_anomaly(order_id, "payment-processed", current);
            }
        }
        Ok(())
    }

    /// Payment failed after reservation: trigger stock release, then
    /// mark the order FAILED. CANCELLED follows once the release is
    /// acknowledged.
    #[tracing::instrument(skip(self), fields(%order_id))]
    pub async fn on_payment_failed(
        &self,
        order_id: OrderId,
        reason: String,
    ) -> Result<(), OrderError> {
        if !self.steps.begin(order_id, STEP_PAYMENT_FAILED) {
            self.log_duplicate(order_id, STEP_PAYMENT_FAILED);
            return Ok(());
        }

        let order = self
            .repository
            .get(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;

        let event = OrderEvent::OrderPaymentFailed {
            order_id,
            items: order.items,
        };
        publish(self.bus.as_ref(), &event).await?;

        match self
            .repository
            .transition(order_id, OrderStatus::Failed)
            .await?
        {
            Transition::Applied(_) => {
                metrics::counter!("saga_orders_failed").increment(1);
                tracing::info!(%order_id, reason, "order failed at payment, compensation requested");
            }
            Transition::Rejected { current } => {
                self.log_anomaly(order_id, "payment-failed", current);
            }
        }
        Ok(())
    }

    /// Compensation acknowledged: reserved stock is back, the order is
    /// cancelled.
    #[tracing::instrument(skip(self), fields(%order_id))]
    pub async fn on_product_stock_released(&self, order_id: OrderId) -> Result<(), OrderError> {
        if !self.steps.begin(order_id, STEP_STOCK_RELEASED) {
            self.log_duplicate(order_id, STEP_STOCK_RELEASED);
            return Ok(());
        }

        match self
            .repository
            .transition(order_id, OrderStatus::Cancelled)
            .await?
        {
            Transition::Applied(_) => {
                metrics::counter!("saga_orders_cancelled").increment(1);
                tracing::info!(%order_id, "order cancelled after compensation");
            }
            Transition::Rejected { current } => {
                self.log_anomaly(order_id, "product-stock-released", current);
            }
        }
        Ok(())
    }

    fn log_duplicate(&self, order_id: OrderId, step: &str) {
        metrics::counter!("saga_duplicate_deliveries").increment(1);
        tracing::warn!(%order_id, step, "duplicate delivery, skipping");
    }

    fn log_anomaly(&self, order_id: OrderId, event: &str, current: OrderStatus) {
        metrics::counter!("saga_anomalous_events").increment(1);
        tracing::warn!(
            %order_id,
            event,
            %current,
            "event would double-transition order, first-observed outcome kept"
        );
    }
}

fn to_handler_error(err: OrderError) -> Option<HandlerError> {
    match err {
        // A missing order row is an anomaly, not something redelivery
        // can repair; log and drop.
        OrderError::NotFound(order_id) => {
            metrics::counter!("saga_anomalous_events").increment(1);
            tracing::warn!(%order_id, "event references unknown order, skipping");
            None
        }
        OrderError::Validation(msg) => Some(HandlerError::Malformed(msg)),
        OrderError::Contract(e) => Some(e.into()),
        OrderError::Store(e) => Some(HandlerError::Retryable(e.to_string())),
    }
}

#[async_trait]
impl EventHandler for OrderSaga {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let result = match delivery.topic.as_str() {
            topics::PRODUCT_EVENTS => {
                let event: ProductEvent = decode(&delivery.envelope)?;
                tracing::debug!(event_type = event.event_type(), order_id = %event.order_id(),
                    "order saga received product event");
                match event {
                    ProductEvent::ProductReserved { order_id, .. } => {
                        self.on_product_reserved(order_id).await
                    }
                    ProductEvent::ProductReservationFailed {
                        order_id, reason, ..
                    } => self.on_product_reservation_failed(order_id, reason).await,
                    ProductEvent::ProductStockReleased { order_id, .. } => {
                        self.on_product_stock_released(order_id).await
                    }
                }
            }
            topics::PAYMENT_EVENTS => {
                let event: PaymentEvent = decode(&delivery.envelope)?;
                tracing::debug!(event_type = event.event_type(), order_id = %event.order_id(),
                    "order saga received payment event");
                match event {
                    PaymentEvent::PaymentProcessed { order_id, .. } => {
                        self.on_payment_processed(order_id).await
                    }
                    PaymentEvent::PaymentFailed {
                        order_id, reason, ..
                    } => self.on_payment_failed(order_id, reason).await,
                }
            }
            other => {
                return Err(HandlerError::Malformed(format!(
                    "order saga subscribed to unexpected topic '{other}'"
                )));
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) => match to_handler_error(err) {
                Some(handler_err) => Err(handler_err),
                None => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryOrderRepository;
    use common::ProductId;
    use contract::InMemoryStepLog;
    use event_bus::InMemoryEventBus;

    struct Fixture {
        saga: OrderSaga,
        repository: InMemoryOrderRepository,
        bus: InMemoryEventBus,
    }

    fn setup() -> Fixture {
        let bus = InMemoryEventBus::new();
        let repository = InMemoryOrderRepository::new();
        let saga = OrderSaga::new(
            Arc::new(repository.clone()),
            Arc::new(bus.clone()),
            Arc::new(InMemoryStepLog::new()),
        );
        Fixture {
            saga,
            repository,
            bus,
        }
    }

    fn sample_items() -> Vec<OrderLine> {
        vec![
            OrderLine::new(ProductId::new(), 2, Money::from_cents(1000)),
            OrderLine::new(ProductId::new(), 1, Money::from_cents(500)),
        ]
    }

    #[tokio::test]
    async fn create_persists_before_publishing() {
        let fixture = setup();
        let order = fixture
            .saga
            .create_order_saga(UserId::new(), sample_items(), Money::from_cents(2500))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert!(fixture.repository.get(order.id).await.unwrap().is_some());

        let published = fixture.bus.published_on(topics::ORDER_EVENTS);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event_type, "order-created");
        assert_eq!(published[0].key, order.id.to_string());
    }

    #[tokio::test]
    async fn create_rejects_empty_items() {
        let fixture = setup();
        let err = fixture
            .saga
            .create_order_saga(UserId::new(), vec![], Money::zero())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));
        // Nothing persisted, nothing published.
        assert_eq!(fixture.repository.count().await, 0);
        assert!(fixture.bus.published_on(topics::ORDER_EVENTS).is_empty());
    }

    #[tokio::test]
    async fn create_rejects_zero_quantity() {
        let fixture = setup();
        let items = vec![OrderLine::new(ProductId::new(), 0, Money::from_cents(100))];
        let err = fixture
            .saga
            .create_order_saga(UserId::new(), items, Money::zero())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));
    }

    #[tokio::test]
    async fn product_reserved_triggers_payment_event() {
        let fixture = setup();
        let order = fixture
            .saga
            .create_order_saga(UserId::new(), sample_items(), Money::from_cents(2500))
            .await
            .unwrap();

        fixture.saga.on_product_reserved(order.id).await.unwrap();

        // Status unchanged, payment trigger published with order fields.
        let stored = fixture.repository.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);

        let published = fixture.bus.published_on(topics::ORDER_EVENTS);
        let trigger = published
            .iter()
            .find(|e| e.event_type == "order-products-reserved")
            .unwrap();
        assert_eq!(trigger.payload["totalAmount"], 2500);
        assert_eq!(
            trigger.payload["userId"].as_str().unwrap(),
            order.user_id.to_string()
        );
    }

    #[tokio::test]
    async fn late_product_reserved_on_failed_order_releases_instead_of_charging() {
        let fixture = setup();
        let order = fixture
            .saga
            .create_order_saga(UserId::new(), sample_items(), Money::from_cents(2500))
            .await
            .unwrap();

        // The reaper times the order out while product-reserved is still
        // in flight.
        fixture
            .repository
            .transition(order.id, OrderStatus::Failed)
            .await
            .unwrap();

        fixture.saga.on_product_reserved(order.id).await.unwrap();

        // No payment trigger for a terminal order; the held stock is
        // sent back instead.
        assert_eq!(
            fixture
                .bus
                .published_count(topics::ORDER_EVENTS, "order-products-reserved"),
            0
        );
        assert_eq!(
            fixture
                .bus
                .published_count(topics::ORDER_EVENTS, "order-payment-failed"),
            1
        );
        let stored = fixture.repository.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn reservation_failure_fails_order_and_publishes_once() {
        let fixture = setup();
        let order = fixture
            .saga
            .create_order_saga(UserId::new(), sample_items(), Money::from_cents(2500))
            .await
            .unwrap();

        fixture
            .saga
            .on_product_reservation_failed(order.id, "Insufficient stock".into())
            .await
            .unwrap();

        let stored = fixture.repository.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);
        assert_eq!(
            fixture.bus.published_count(topics::ORDER_EVENTS, "order-failed"),
            1
        );

        // Redelivery is a no-op.
        fixture
            .saga
            .on_product_reservation_failed(order.id, "Insufficient stock".into())
            .await
            .unwrap();
        assert_eq!(
            fixture.bus.published_count(topics::ORDER_EVENTS, "order-failed"),
            1
        );
    }

    #[tokio::test]
    async fn payment_processed_confirms_order() {
        let fixture = setup();
        let order = fixture
            .saga
            .create_order_saga(UserId::new(), sample_items(), Money::from_cents(2500))
            .await
            .unwrap();

        fixture.saga.on_payment_processed(order.id).await.unwrap();

        let stored = fixture.repository.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
        assert_eq!(
            fixture
                .bus
                .published_count(topics::ORDER_EVENTS, "order-confirmed"),
            1
        );
    }

    #[tokio::test]
    async fn payment_failure_requests_compensation_then_fails_order() {
        let fixture = setup();
        let order = fixture
            .saga
            .create_order_saga(UserId::new(), sample_items(), Money::from_cents(2500))
            .await
            .unwrap();

        fixture
            .saga
            .on_payment_failed(order.id, "card declined".into())
            .await
            .unwrap();

        let stored = fixture.repository.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);

        let published = fixture.bus.published_on(topics::ORDER_EVENTS);
        let compensation = published
            .iter()
            .find(|e| e.event_type == "order-payment-failed")
            .unwrap();
        assert_eq!(
            compensation.payload["items"].as_array().unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn stock_released_cancels_failed_order() {
        let fixture = setup();
        let order = fixture
            .saga
            .create_order_saga(UserId::new(), sample_items(), Money::from_cents(2500))
            .await
            .unwrap();

        fixture
            .saga
            .on_payment_failed(order.id, "card declined".into())
            .await
            .unwrap();
        fixture
            .saga
            .on_product_stock_released(order.id)
            .await
            .unwrap();

        let stored = fixture.repository.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn first_terminal_event_wins() {
        let fixture = setup();
        let order = fixture
            .saga
            .create_order_saga(UserId::new(), sample_items(), Money::from_cents(2500))
            .await
            .unwrap();

        fixture.saga.on_payment_processed(order.id).await.unwrap();
        // A contradictory failure arrives afterwards; it must not
        // double-transition the order.
        fixture
            .saga
            .on_product_reservation_failed(order.id, "late failure".into())
            .await
            .unwrap();

        let stored = fixture.repository.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
        assert_eq!(
            fixture.bus.published_count(topics::ORDER_EVENTS, "order-failed"),
            0
        );
    }

    #[tokio::test]
    async fn duplicate_payment_processed_confirms_once() {
        let fixture = setup();
        let order = fixture
            .saga
            .create_order_saga(UserId::new(), sample_items(), Money::from_cents(2500))
            .await
            .unwrap();

        fixture.saga.on_payment_processed(order.id).await.unwrap();
        fixture.saga.on_payment_processed(order.id).await.unwrap();

        assert_eq!(
            fixture
                .bus
                .published_count(topics::ORDER_EVENTS, "order-confirmed"),
            1
        );
    }
}
