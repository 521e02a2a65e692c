use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use contract::{OrderEvent, StepLog, publish};
use event_bus::EventBus;

use crate::error::OrderError;
use crate::repository::{OrderRepository, Transition};
use crate::saga::STEP_PRODUCTS_RESERVED;
use crate::status::OrderStatus;

/// Background sweeper that fails orders stuck in PENDING.
///
/// A participant crash or a lost event can strand a saga with no further
/// event ever arriving. The reaper periodically fails PENDING orders
/// older than the deadline and, when stock had already been reserved for
/// them, publishes `order-payment-failed` so the product participant
/// releases it.
pub struct PendingOrderReaper {
    repository: Arc<dyn OrderRepository>,
    bus: Arc<dyn EventBus>,
    steps: Arc<dyn StepLog>,
    deadline: Duration,
    interval: Duration,
}

impl PendingOrderReaper {
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        bus: Arc<dyn EventBus>,
        steps: Arc<dyn StepLog>,
        deadline: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            repository,
            bus,
            steps,
            deadline,
            interval,
        }
    }

    /// Spawns the sweep loop. The task runs until the runtime shuts down
    /// or the returned handle is aborted.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = self.sweep().await {
                    tracing::error!(error = %err, "pending order sweep failed");
                }
            }
        })
    }

    /// One sweep pass: fails every PENDING order past the deadline.
    /// Returns how many orders were timed out.
    pub async fn sweep(&self) -> Result<usize, OrderError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.deadline)
                .map_err(|e| OrderError::Validation(format!("reaper deadline overflow: {e}")))?;

        let stale = self.repository.find_pending_older_than(cutoff).await?;
        let mut reaped = 0;

        for order in stale {
            // Another event may land between the query and this write;
            // the transition guard makes the race harmless.
            match self
                .repository
                .transition(order.id, OrderStatus::Failed)
                .await?
            {
                Transition::Applied(_) => {}
                Transition::Rejected { current } => {
                    tracing::debug!(order_id = %order.id, %current, "order advanced before sweep");
                    continue;
                }
            }

            reaped += 1;
            metrics::counter!("saga_orders_timed_out").increment(1);
            tracing::warn!(order_id = %order.id, deadline = ?self.deadline, "order timed out in PENDING");

            let failed = OrderEvent::OrderFailed {
                order_id: order.id,
                reason: "saga timed out".into(),
            };
            publish(self.bus.as_ref(), &failed).await?;

            // If stock was reserved before the saga stalled, request its
            // release; otherwise there is nothing to compensate.
            if self.steps.seen(order.id, STEP_PRODUCTS_RESERVED) {
                let compensate = OrderEvent::OrderPaymentFailed {
                    order_id: order.id,
                    items: order.items,
                };
                publish(self.bus.as_ref(), &compensate).await?;
            }
        }

        Ok(reaped)
    }
}
