use std::sync::Mutex;

use async_trait::async_trait;
use common::{Money, OrderId, UserId};
use thiserror::Error;

use crate::model::PaymentMethod;

/// A capture request as presented to the external gateway.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub method: PaymentMethod,
}

/// Failure outcomes of a capture attempt.
///
/// Both variants drive the same saga compensation path; the split only
/// affects the reason string carried on `payment-failed`.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The provider rejected the charge.
    #[error("payment declined: {0}")]
    Declined(String),

    /// The provider could not be reached or errored out.
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// External payment gateway contract: request in, success or
/// provider-sourced failure reason out.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn capture(&self, request: &CaptureRequest) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone)]
enum Script {
    Decline(String),
    Unavailable(String),
}

/// Gateway test double whose next outcome is scripted.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<Option<Script>>,
    captures: Mutex<Vec<CaptureRequest>>,
}

impl ScriptedGateway {
    /// Creates a gateway that approves every capture.
    pub fn approving() -> Self {
        Self::default()
    }

    /// Makes subsequent captures fail as declined.
    pub fn decline(&self, reason: impl Into<String>) {
        *self.script.lock().unwrap() = Some(Script::Decline(reason.into()));
    }

    /// Makes subsequent captures fail as a provider outage.
    pub fn go_down(&self, reason: impl Into<String>) {
        *self.script.lock().unwrap() = Some(Script::Unavailable(reason.into()));
    }

    /// Restores approval of captures.
    pub fn approve(&self) {
        *self.script.lock().unwrap() = None;
    }

    /// Number of capture attempts observed.
    pub fn capture_count(&self) -> usize {
        self.captures.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn capture(&self, request: &CaptureRequest) -> Result<(), GatewayError> {
        self.captures.lock().unwrap().push(request.clone());
        let script = self.script.lock().unwrap().clone();
        match script {
            None => Ok(()),
            Some(Script::Decline(reason)) => Err(GatewayError::Declined(reason)),
            Some(Script::Unavailable(reason)) => Err(GatewayError::Unavailable(reason)),
        }
    }
}
