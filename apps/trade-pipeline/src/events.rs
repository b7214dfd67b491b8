//! Event sink port.
//!
//! Upward-facing callbacks for order, position, and execution lifecycle
//! events. All notifications are fire-and-forget: the pipeline never
//! blocks on or fails because of a sink.

use async_trait::async_trait;

use crate::gate::ExecutionRequest;
use crate::models::{Order, Position};
use crate::scheduler::CompletionRecord;

/// Port for pipeline lifecycle notifications.
///
/// Every method has a no-op default so implementations subscribe only to
/// the events they care about.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// An order changed state in the execution engine.
    async fn order_updated(&self, order: &Order) {
        let _ = order;
    }

    /// A position was opened, changed, or closed.
    async fn position_updated(&self, position: &Position) {
        let _ = position;
    }

    /// The order manager finished processing a queued request.
    async fn order_completed(&self, record: &CompletionRecord) {
        let _ = record;
    }

    /// The execution gate resolved a request (executed, failed, rejected).
    async fn execution_completed(&self, request: &ExecutionRequest) {
        let _ = request;
    }

    /// A request is waiting for human approval.
    async fn approval_required(&self, request: &ExecutionRequest) {
        let _ = request;
    }

    /// A risk engine or kill-switch alert for an account.
    async fn risk_alert(&self, account_id: &str, message: &str) {
        let _ = (account_id, message);
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_op_sink_accepts_alerts() {
        let sink = NoOpEventSink;
        tokio_test::block_on(sink.risk_alert("acct-1", "drawdown warning"));
    }
}
