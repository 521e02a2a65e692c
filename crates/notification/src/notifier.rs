use std::sync::Mutex;

use common::OrderId;

/// Delivery channel for user-facing notifications.
///
/// The saga does not depend on notifications; implementations are
/// fire-and-forget and must not fail the consumer loop.
pub trait Notifier: Send + Sync {
    fn notify(&self, order_id: OrderId, message: &str);
}

/// Notifier that writes to the log, standing in for email or push
/// delivery.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, order_id: OrderId, message: &str) {
        tracing::info!(%order_id, message, "notification");
    }
}

/// Test notifier that records every message it is handed.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(OrderId, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(OrderId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn messages_for(&self, order_id: OrderId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == order_id)
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, order_id: OrderId, message: &str) {
        self.sent.lock().unwrap().push((order_id, message.to_string()));
    }
}
