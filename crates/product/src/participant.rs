use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use contract::{
    ContractError, FailedItem, LifecycleEvent, OrderEvent, OrderLine, ProductEvent, StepLog,
    decode, publish, topics,
};
use event_bus::{Delivery, EventBus, EventHandler, HandlerError, RetryPolicy};

use crate::ledger::{StockError, StockLedger};

/// Consumer group identifying the product service's role. Multiple
/// instances of the service share this group and therefore share work.
pub const CONSUMER_GROUP: &str = "product-service";

const STEP_RESERVE: &str = "stock-reserve";
const STEP_RELEASE: &str = "stock-release";

/// The product participant: reserves stock when an order is created and
/// releases it when payment fails downstream.
///
/// Reservation is item by item with no cross-item transaction; when one
/// item fails, the items already reserved in the same attempt are rolled
/// back individually. Release is retried with backoff because losing a
/// compensation would permanently leak stock.
pub struct StockParticipant {
    ledger: Arc<dyn StockLedger>,
    bus: Arc<dyn EventBus>,
    steps: Arc<dyn StepLog>,
    release_retry: RetryPolicy,
}

impl StockParticipant {
    pub fn new(
        ledger: Arc<dyn StockLedger>,
        bus: Arc<dyn EventBus>,
        steps: Arc<dyn StepLog>,
    ) -> Self {
        Self {
            ledger,
            bus,
            steps,
            release_retry: RetryPolicy::default(),
        }
    }

    /// Overrides the release retry schedule.
    pub fn with_release_retry(mut self, policy: RetryPolicy) -> Self {
        self.release_retry = policy;
        self
    }

    /// Subscribes the participant to `order-events`.
    pub async fn subscribe(self: Arc<Self>) -> Result<(), event_bus::BusError> {
        let bus = Arc::clone(&self.bus);
        bus.subscribe(topics::ORDER_EVENTS, CONSUMER_GROUP, self).await
    }

    #[tracing::instrument(skip(self, items), fields(%order_id))]
    async fn on_order_created(
        &self,
        order_id: OrderId,
        items: Vec<OrderLine>,
    ) -> Result<(), ContractError> {
        if !self.steps.begin(order_id, STEP_RESERVE) {
            tracing::warn!(%order_id, "duplicate order-created delivery, skipping reservation");
            metrics::counter!("stock_duplicate_deliveries").increment(1);
            return Ok(());
        }

        let mut reserved: Vec<OrderLine> = Vec::new();
        let mut failed: Vec<FailedItem> = Vec::new();

        for item in &items {
            match self.ledger.reserve(item.product_id, item.quantity).await {
                Ok(stock) => {
                    tracing::debug!(
                        product_id = %item.product_id,
                        quantity = item.quantity,
                        remaining = stock.available,
                        "reserved stock"
                    );
                    reserved.push(item.clone());
                }
                Err(e) => {
                    tracing::warn!(
                        product_id = %item.product_id,
                        quantity = item.quantity,
                        error = %e,
                        "failed to reserve stock"
                    );
                    failed.push(FailedItem {
                        product_id: item.product_id,
                        quantity: item.quantity,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if failed.is_empty() {
            metrics::counter!("stock_reservations_succeeded").increment(1);
            let event = ProductEvent::ProductReserved {
                order_id,
                items: reserved,
            };
            return publish(self.bus.as_ref(), &event).await;
        }

        // Roll back the items reserved in this attempt, one by one.
        for item in &reserved {
            self.release_with_retry(order_id, item).await;
        }

        metrics::counter!("stock_reservations_failed").increment(1);
        let event = ProductEvent::ProductReservationFailed {
            order_id,
            failed_items: failed,
            reason: "Insufficient stock or product not found".to_string(),
        };
        publish(self.bus.as_ref(), &event).await
    }

    #[tracing::instrument(skip(self, items), fields(%order_id))]
    async fn on_payment_failed(
        &self,
        order_id: OrderId,
        items: Vec<OrderLine>,
    ) -> Result<(), ContractError> {
        if !self.steps.begin(order_id, STEP_RELEASE) {
            tracing::warn!(%order_id, "duplicate order-payment-failed delivery, skipping release");
            metrics::counter!("stock_duplicate_deliveries").increment(1);
            return Ok(());
        }

        for item in &items {
            self.release_with_retry(order_id, item).await;
        }

        metrics::counter!("stock_released_orders").increment(1);
        let event = ProductEvent::ProductStockReleased { order_id, items };
        publish(self.bus.as_ref(), &event).await
    }

    /// Releases one line item, retrying transient store failures.
    ///
    /// A final failure is surfaced loudly but does not abort the release
    /// of the remaining items.
    async fn release_with_retry(&self, order_id: OrderId, item: &OrderLine) {
        let mut attempt: u32 = 1;
        loop {
            match self.ledger.release(item.product_id, item.quantity).await {
                Ok(stock) => {
                    tracing::debug!(
                        %order_id,
                        product_id = %item.product_id,
                        available = stock.available,
                        "released stock"
                    );
                    return;
                }
                Err(e) if e.is_transient() => match self.release_retry.delay_before(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            %order_id,
                            product_id = %item.product_id,
                            attempt,
                            error = %e,
                            "stock release failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        self.report_release_failure(order_id, item, &e);
                        return;
                    }
                },
                Err(e) => {
                    self.report_release_failure(order_id, item, &e);
                    return;
                }
            }
        }
    }

    fn report_release_failure(&self, order_id: OrderId, item: &OrderLine, error: &StockError) {
        metrics::counter!("stock_release_failures").increment(1);
        tracing::error!(
            %order_id,
            product_id = %item.product_id,
            quantity = item.quantity,
            %error,
            "stock release exhausted retries, quantity leaked"
        );
    }
}

#[async_trait]
impl EventHandler for StockParticipant {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let event: OrderEvent = decode(&delivery.envelope)?;
        tracing::debug!(
            event_type = event.event_type(),
            order_id = %event.order_id(),
            "product participant received event"
        );

        match event {
            OrderEvent::OrderCreated { order_id, items, .. } => {
                self.on_order_created(order_id, items).await?;
            }
            OrderEvent::OrderPaymentFailed { order_id, items } => {
                self.on_payment_failed(order_id, items).await?;
            }
            // The remaining order events are for other consumers.
            _ => {}
        }
        Ok(())
    }
}
