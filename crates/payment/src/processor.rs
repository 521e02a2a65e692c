use std::sync::Arc;

use common::{Money, OrderId, PaymentId, UserId};
use contract::{ContractError, PaymentEvent, PaymentStatus, publish};
use event_bus::EventBus;

use crate::gateway::{CaptureRequest, PaymentGateway};
use crate::model::{Payment, PaymentMethod};
use crate::repository::PaymentRepository;

/// What a capture attempt produced, as reported to callers and tests.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    /// Absent when the attempt failed before a record was written.
    pub payment_id: Option<PaymentId>,
    pub success: bool,
    pub reason: Option<String>,
}

/// Runs capture attempts: one payment record per attempt, one payment
/// event per attempt, no exceptions left unconverted.
///
/// Whatever goes wrong between creating the PENDING record and finalizing
/// it, a `payment-failed` event is still published with the error as the
/// reason, so the order participant always observes an outcome.
pub struct PaymentProcessor {
    repository: Arc<dyn PaymentRepository>,
    gateway: Arc<dyn PaymentGateway>,
    bus: Arc<dyn EventBus>,
}

impl PaymentProcessor {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        gateway: Arc<dyn PaymentGateway>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            repository,
            gateway,
            bus,
        }
    }

    #[tracing::instrument(skip(self), fields(%order_id, %amount))]
    pub async fn process(
        &self,
        order_id: OrderId,
        user_id: UserId,
        amount: Money,
        method: PaymentMethod,
    ) -> Result<CaptureOutcome, ContractError> {
        metrics::counter!("payment_capture_attempts").increment(1);

        let payment = Payment::pending(order_id, user_id, amount, method);
        if let Err(e) = self.repository.insert(&payment).await {
            tracing::error!(%order_id, error = %e, "failed to create payment record");
            return self.fail(order_id, None, amount, e.to_string()).await;
        }

        let request = CaptureRequest {
            order_id,
            user_id,
            amount,
            method,
        };

        match self.gateway.capture(&request).await {
            Ok(()) => match self
                .repository
                .finalize(payment.id, PaymentStatus::Completed)
                .await
            {
                Ok(finalized) => {
                    metrics::counter!("payments_completed").increment(1);
                    tracing::info!(%order_id, payment_id = %finalized.id, "payment captured");
                    let event = PaymentEvent::PaymentProcessed {
                        order_id,
                        payment_id: finalized.id,
                        amount,
                        status: PaymentStatus::Completed,
                    };
                    publish(self.bus.as_ref(), &event).await?;
                    Ok(CaptureOutcome {
                        payment_id: Some(finalized.id),
                        success: true,
                        reason: None,
                    })
                }
                Err(e) => {
                    tracing::error!(%order_id, payment_id = %payment.id, error = %e,
                        "capture succeeded but record finalization failed");
                    self.fail(order_id, Some(payment.id), amount, e.to_string())
                        .await
                }
            },
            Err(e) => {
                if let Err(fe) = self
                    .repository
                    .finalize(payment.id, PaymentStatus::Failed)
                    .await
                {
                    tracing::warn!(payment_id = %payment.id, error = %fe,
                        "could not finalize failed payment record");
                }
                self.fail(order_id, Some(payment.id), amount, e.to_string())
                    .await
            }
        }
    }

    async fn fail(
        &self,
        order_id: OrderId,
        payment_id: Option<PaymentId>,
        amount: Money,
        reason: String,
    ) -> Result<CaptureOutcome, ContractError> {
        metrics::counter!("payments_failed").increment(1);
        tracing::warn!(%order_id, reason = %reason, "payment attempt failed");

        let event = PaymentEvent::PaymentFailed {
            order_id,
            payment_id,
            amount,
            status: PaymentStatus::Failed,
            reason: reason.clone(),
        };
        publish(self.bus.as_ref(), &event).await?;

        Ok(CaptureOutcome {
            payment_id,
            success: false,
            reason: Some(reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ScriptedGateway;
    use crate::memory::InMemoryPaymentRepository;
    use contract::topics;
    use event_bus::InMemoryEventBus;

    struct Fixture {
        processor: PaymentProcessor,
        repository: InMemoryPaymentRepository,
        gateway: Arc<ScriptedGateway>,
        bus: InMemoryEventBus,
    }

    fn setup() -> Fixture {
        let bus = InMemoryEventBus::new();
        let repository = InMemoryPaymentRepository::new();
        let gateway = Arc::new(ScriptedGateway::approving());
        let processor = PaymentProcessor::new(
            Arc::new(repository.clone()),
            Arc::clone(&gateway) as Arc<dyn PaymentGateway>,
            Arc::new(bus.clone()),
        );
        Fixture {
            processor,
            repository,
            gateway,
            bus,
        }
    }

    #[tokio::test]
    async fn successful_capture_completes_record_and_publishes() {
        let fixture = setup();
        let order_id = OrderId::new();

        let outcome = fixture
            .processor
            .process(
                order_id,
                UserId::new(),
                Money::from_cents(2500),
                PaymentMethod::CreditCard,
            )
            .await
            .unwrap();

        assert!(outcome.success);
        let payment_id = outcome.payment_id.unwrap();
        let stored = fixture.repository.get(payment_id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
        assert_eq!(
            fixture
                .bus
                .published_count(topics::PAYMENT_EVENTS, "payment-processed"),
            1
        );
    }

    #[tokio::test]
    async fn declined_capture_fails_record_and_publishes_reason() {
        let fixture = setup();
        fixture.gateway.decline("card expired");
        let order_id = OrderId::new();

        let outcome = fixture
            .processor
            .process(
                order_id,
                UserId::new(),
                Money::from_cents(2500),
                PaymentMethod::CreditCard,
            )
            .await
            .unwrap();

        assert!(!outcome.success);
        let payment_id = outcome.payment_id.unwrap();
        let stored = fixture.repository.get(payment_id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);

        let published = fixture.bus.published_on(topics::PAYMENT_EVENTS);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event_type, "payment-failed");
        assert!(
            published[0].payload["reason"]
                .as_str()
                .unwrap()
                .contains("card expired")
        );
    }

    #[tokio::test]
    async fn gateway_outage_still_publishes_failure() {
        let fixture = setup();
        fixture.gateway.go_down("connection reset");
        let order_id = OrderId::new();

        let outcome = fixture
            .processor
            .process(
                order_id,
                UserId::new(),
                Money::from_cents(1000),
                PaymentMethod::CreditCard,
            )
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(
            fixture
                .bus
                .published_count(topics::PAYMENT_EVENTS, "payment-failed"),
            1
        );
    }

    #[tokio::test]
    async fn each_attempt_creates_one_record() {
        let fixture = setup();
        let order_id = OrderId::new();
        for _ in 0..3 {
            fixture
                .processor
                .process(
                    order_id,
                    UserId::new(),
                    Money::from_cents(100),
                    PaymentMethod::CreditCard,
                )
                .await
                .unwrap();
        }
        assert_eq!(fixture.repository.count().await, 3);
        assert_eq!(fixture.gateway.capture_count(), 3);
    }
}
