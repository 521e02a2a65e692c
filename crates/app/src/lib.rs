//! Single-process wiring of the order fulfillment saga.
//!
//! Each participant keeps its own store and step log and talks to the
//! others only through the shared event bus, the same shape a multi-process
//! deployment would have with one broker and one database per service.

mod config;

use std::sync::Arc;
use std::time::Duration;

use contract::InMemoryStepLog;
use event_bus::{BusError, InMemoryEventBus};
use notification::{NotificationDispatcher, Notifier};
use order::{InMemoryOrderRepository, OrderSaga, PendingOrderReaper};
use payment::{InMemoryPaymentRepository, PaymentParticipant, PaymentProcessor, ScriptedGateway};
use product::{InMemoryStockLedger, StockParticipant};

pub use config::Config;

/// All saga participants subscribed on one in-memory bus, with handles to
/// their backing stores for seeding and inspection.
pub struct Services {
    pub bus: InMemoryEventBus,
    pub saga: Arc<OrderSaga>,
    pub orders: InMemoryOrderRepository,
    pub stock: Arc<InMemoryStockLedger>,
    pub payments: InMemoryPaymentRepository,
    pub gateway: Arc<ScriptedGateway>,
    order_steps: Arc<InMemoryStepLog>,
}

impl Services {
    /// Wires every participant onto `bus` and subscribes them.
    ///
    /// The payment gateway starts in approving mode; tests script it
    /// through the returned handle.
    pub async fn start(
        bus: InMemoryEventBus,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, BusError> {
        let shared_bus: Arc<dyn event_bus::EventBus> = Arc::new(bus.clone());

        let orders = InMemoryOrderRepository::new();
        let order_steps = Arc::new(InMemoryStepLog::new());
        let saga = Arc::new(OrderSaga::new(
            Arc::new(orders.clone()),
            Arc::clone(&shared_bus),
            order_steps.clone() as _,
        ));
        Arc::clone(&saga).subscribe().await?;

        let stock = Arc::new(InMemoryStockLedger::new());
        let stock_participant = Arc::new(StockParticipant::new(
            stock.clone() as _,
            Arc::clone(&shared_bus),
            Arc::new(InMemoryStepLog::new()),
        ));
        stock_participant.subscribe().await?;

        let payments = InMemoryPaymentRepository::new();
        let gateway = Arc::new(ScriptedGateway::approving());
        let processor = PaymentProcessor::new(
            Arc::new(payments.clone()),
            gateway.clone() as _,
            Arc::clone(&shared_bus),
        );
        let payment_participant = Arc::new(PaymentParticipant::new(
            processor,
            Arc::clone(&shared_bus),
            Arc::new(InMemoryStepLog::new()),
        ));
        payment_participant.subscribe().await?;

        let dispatcher = Arc::new(NotificationDispatcher::new(notifier));
        dispatcher.subscribe(&bus).await?;

        Ok(Self {
            bus,
            saga,
            orders,
            stock,
            payments,
            gateway,
            order_steps,
        })
    }

    /// Builds the timeout reaper over the order participant's store and
    /// step log. The caller decides whether to `spawn` it or drive
    /// `sweep` directly.
    pub fn reaper(&self, deadline: Duration, interval: Duration) -> PendingOrderReaper {
        PendingOrderReaper::new(
            Arc::new(self.orders.clone()),
            Arc::new(self.bus.clone()),
            self.order_steps.clone() as _,
            deadline,
            interval,
        )
    }
}
