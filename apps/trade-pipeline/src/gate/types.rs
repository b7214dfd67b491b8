//! Gate request types and configuration.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broker::BrokerKind;
use crate::models::Signal;
use crate::risk::RiskCheckResult;

/// How much autonomy the gate has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingMode {
    /// Every execution requires human approval.
    Manual,
    /// Approval required, with the gate's recommendation attached.
    AiAssisted,
    /// Risk-passing signals execute without approval.
    AiFullAuto,
    /// Fills are simulated in-process; no broker, no order manager.
    PaperTrading,
}

/// Lifecycle of an execution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Waiting for human approval.
    Pending,
    /// Approved, about to execute.
    Approved,
    /// Rejected by the gate, risk engine, or a human.
    Rejected,
    /// Handed to the order manager (or paper-filled).
    Executed,
    /// Submission failed.
    Failed,
    /// Cancelled before resolution (kill switch).
    Cancelled,
}

/// One signal's trip through the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Gate request ID ("EXE-" prefixed).
    pub id: String,
    /// The signal being executed.
    pub signal: Signal,
    /// Mode the gate was in when the request was created.
    pub trading_mode: TradingMode,
    /// Account the trade is for.
    pub account_id: String,
    /// Broker the trade routes to.
    pub broker: BrokerKind,
    /// Position size; sized by the risk engine when the caller omits it.
    pub position_size: Decimal,
    /// Leverage multiplier.
    pub leverage: u32,
    /// Current status.
    pub status: ExecutionStatus,
    /// Risk verdict, once the risk engine has been consulted.
    pub risk_result: Option<RiskCheckResult>,
    /// Order-manager request ID (or synthesized paper order ID).
    pub order_id: Option<String>,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// Rejection reasons, errors, and caller context.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ExecutionRequest {
    pub(super) fn new(
        signal: Signal,
        trading_mode: TradingMode,
        account_id: impl Into<String>,
        broker: BrokerKind,
        position_size: Decimal,
        leverage: u32,
    ) -> Self {
        Self {
            id: format!("EXE-{}", Uuid::new_v4()),
            signal,
            trading_mode,
            account_id: account_id.into(),
            broker,
            position_size,
            leverage,
            status: ExecutionStatus::Pending,
            risk_result: None,
            order_id: None,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub(super) fn reject(&mut self, reason: impl Into<String>) {
        self.status = ExecutionStatus::Rejected;
        self.metadata.insert(
            "rejection_reason".to_string(),
            serde_json::Value::String(reason.into()),
        );
    }

    /// The rejection reason, when the request was rejected.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<&str> {
        self.metadata.get("rejection_reason").and_then(|v| v.as_str())
    }
}

/// Gate configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateConfig {
    /// Trading mode at startup.
    #[serde(default = "default_mode")]
    pub mode: TradingMode,
}

const fn default_mode() -> TradingMode {
    TradingMode::PaperTrading
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
        }
    }
}

/// Gate status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateStatus {
    /// Current trading mode.
    pub trading_mode: TradingMode,
    /// Whether the global kill switch is engaged.
    pub kill_switch_active: bool,
    /// Requests waiting for approval.
    pub pending_requests: usize,
    /// Requests recorded in history.
    pub total_executions: usize,
}

/// Gate control error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GateError {
    /// Kill-switch deactivation attempted without the confirmation token.
    #[error("kill switch deactivation requires the confirmation token")]
    ConfirmationRequired,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalDirection;
    use rust_decimal_macros::dec;

    #[test]
    fn test_request_ids_and_rejection() {
        let signal = Signal::new(
            "BTCUSDT",
            SignalDirection::Buy,
            dec!(80),
            dec!(100),
            dec!(95),
            dec!(110),
        );
        let mut request = ExecutionRequest::new(
            signal,
            TradingMode::Manual,
            "acct-1",
            BrokerKind::Paper,
            dec!(1),
            1,
        );
        assert!(request.id.starts_with("EXE-"));
        assert_eq!(request.status, ExecutionStatus::Pending);

        request.reject("HOLD signal - no action");
        assert_eq!(request.status, ExecutionStatus::Rejected);
        assert_eq!(request.rejection_reason(), Some("HOLD signal - no action"));
    }
}
