//! Signal intake, mode dispatch, and approval flow.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{error, info, warn};

use super::types::{
    ExecutionRequest, ExecutionStatus, GateConfig, GateError, GateStatus, TradingMode,
};
use crate::broker::BrokerKind;
use crate::events::EventSink;
use crate::models::{OrderSide, Signal};
use crate::risk::RiskEngine;
use crate::scheduler::{OrderManager, OrderRequest};

/// Token required to release the gate's global kill switch.
pub const GATE_RESUME_TOKEN: &str = "CONFIRM_RESUME";

const HISTORY_KEEP: usize = 500;
const HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Default)]
struct KillSwitch {
    active: bool,
    reason: Option<String>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Single entry point between signal generation and order flow.
///
/// Every signal passes the same checks in the same order regardless of
/// trading mode; the mode only decides what happens to a request that
/// survives them. The global kill switch here is independent of the risk
/// engine's per-account switch and is checked first.
pub struct ExecutionGate {
    mode: RwLock<TradingMode>,
    kill_switch: RwLock<KillSwitch>,
    risk: Arc<RiskEngine>,
    scheduler: Arc<OrderManager>,
    pending: RwLock<HashMap<String, ExecutionRequest>>,
    history: RwLock<Vec<ExecutionRequest>>,
    events: Arc<dyn EventSink>,
}

impl ExecutionGate {
    /// Create a gate in the configured trading mode.
    #[must_use]
    pub fn new(
        config: GateConfig,
        risk: Arc<RiskEngine>,
        scheduler: Arc<OrderManager>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        info!(mode = ?config.mode, "execution gate initialized");
        Self {
            mode: RwLock::new(config.mode),
            kill_switch: RwLock::new(KillSwitch::default()),
            risk,
            scheduler,
            pending: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Current trading mode.
    #[must_use]
    pub fn mode(&self) -> TradingMode {
        *read(&self.mode)
    }

    /// Switch trading modes at runtime.
    pub fn set_mode(&self, mode: TradingMode) {
        *write(&self.mode) = mode;
        info!(mode = ?mode, "trading mode changed");
    }

    /// Run one signal through the gate.
    ///
    /// Always returns a request; the status tells the caller what
    /// happened. `position_size` of `None` (or non-positive) is sized by
    /// the risk engine from the signal's entry and stop.
    pub async fn process_signal(
        &self,
        signal: Signal,
        account_id: &str,
        broker: BrokerKind,
        position_size: Option<Decimal>,
        leverage: u32,
    ) -> ExecutionRequest {
        let mode = self.mode();
        let mut request = ExecutionRequest::new(
            signal,
            mode,
            account_id,
            broker,
            position_size.unwrap_or(Decimal::ZERO),
            leverage,
        );

        // Kill switch wins over everything, including the risk engine.
        if read(&self.kill_switch).active {
            request.reject("Global kill switch active");
            warn!(request_id = %request.id, "execution rejected: kill switch active");
            self.finish(request.clone()).await;
            return request;
        }

        if !request.signal.direction.is_actionable() {
            request.reject("HOLD signal - no action");
            self.finish(request.clone()).await;
            return request;
        }

        if request.position_size <= Decimal::ZERO {
            let status = self.risk.risk_status();
            let balance = if status.current_equity > Decimal::ZERO {
                status.current_equity
            } else {
                dec!(10000)
            };
            match self.risk.calculate_position_size(
                balance,
                request.signal.entry_price,
                request.signal.stop_loss,
                None,
            ) {
                Ok(sizing) => request.position_size = sizing.size,
                Err(err) => {
                    request.reject(err.to_string());
                    self.finish(request.clone()).await;
                    return request;
                }
            }
        }

        let side = if request.signal.direction.is_long() {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        let mut profile = crate::risk::TradeProfile::market(
            request.signal.symbol.clone(),
            side,
            request.position_size,
            request.signal.entry_price,
        )
        .with_leverage(leverage);
        if request.signal.stop_loss > Decimal::ZERO {
            profile = profile.with_stop_loss(request.signal.stop_loss);
        }

        let risk_result = self.risk.check_trade_risk(&profile);
        let passed = risk_result.passed;
        let adjusted = risk_result.adjusted_position_size;
        let violations: Vec<String> = risk_result
            .violations
            .iter()
            .map(|v| v.message.clone())
            .collect();
        request.risk_result = Some(risk_result);

        if !passed {
            request.reject("Risk check failed");
            if let Ok(value) = serde_json::to_value(&violations) {
                request.metadata.insert("violations".to_string(), value);
            }
            warn!(
                request_id = %request.id,
                violations = violations.len(),
                "execution rejected: risk check failed"
            );
            self.finish(request.clone()).await;
            return request;
        }

        if let Some(adjusted) = adjusted.filter(|a| *a > Decimal::ZERO) {
            info!(request_id = %request.id, size = %adjusted, "position size adjusted");
            request.position_size = adjusted;
        }

        match mode {
            TradingMode::Manual | TradingMode::AiAssisted => {
                request.status = ExecutionStatus::Pending;
                if mode == TradingMode::AiAssisted {
                    request.metadata.insert(
                        "ai_recommendation".to_string(),
                        serde_json::Value::String("EXECUTE".to_string()),
                    );
                }
                write(&self.pending).insert(request.id.clone(), request.clone());
                info!(request_id = %request.id, "execution pending approval");
                self.events.approval_required(&request).await;
            }
            TradingMode::AiFullAuto => {
                request.status = ExecutionStatus::Approved;
                self.execute(&mut request, side);
            }
            TradingMode::PaperTrading => {
                request.status = ExecutionStatus::Approved;
                Self::simulate(&mut request);
            }
        }

        self.finish(request.clone()).await;
        request
    }

    /// Hand the request to the order manager.
    ///
    /// Admission is the gate's success criterion; fills and retries are
    /// the order manager's business from here.
    fn execute(&self, request: &mut ExecutionRequest, side: OrderSide) {
        let mut order = OrderRequest::market(
            request.signal.symbol.clone(),
            side,
            request.position_size,
            request.broker,
        );
        order.price = Some(request.signal.entry_price);
        if request.signal.stop_loss > Decimal::ZERO {
            order = order.with_stop_loss(request.signal.stop_loss);
        }
        if request.signal.take_profit > Decimal::ZERO {
            order = order.with_take_profit(request.signal.take_profit);
        }

        match self.scheduler.submit(order) {
            Ok(id) => {
                request.order_id = Some(id);
                request.status = ExecutionStatus::Executed;
            }
            Err(err) => {
                error!(request_id = %request.id, error = %err, "execution submission failed");
                request.status = ExecutionStatus::Failed;
                request.metadata.insert(
                    "error".to_string(),
                    serde_json::Value::String(err.to_string()),
                );
            }
        }
    }

    /// Synthesize a fill without touching a broker or the order manager.
    fn simulate(request: &mut ExecutionRequest) {
        request.order_id = Some(format!("PAPER-{}", request.id));
        request.status = ExecutionStatus::Executed;
        request
            .metadata
            .insert("paper_trade".to_string(), serde_json::Value::Bool(true));
        info!(request_id = %request.id, "paper trade executed");
    }

    /// Approve a pending request and execute it under the current mode.
    ///
    /// Returns `None` for unknown or already-resolved ids.
    pub async fn approve_execution(&self, id: &str) -> Option<ExecutionRequest> {
        let mut request = write(&self.pending).remove(id)?;
        request.status = ExecutionStatus::Approved;
        info!(request_id = %id, "execution approved");

        let side = if request.signal.direction.is_long() {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        if self.mode() == TradingMode::PaperTrading {
            Self::simulate(&mut request);
        } else {
            self.execute(&mut request, side);
        }

        self.finish(request.clone()).await;
        Some(request)
    }

    /// Reject a pending request. Returns `None` for unknown ids.
    pub async fn reject_execution(&self, id: &str, reason: Option<&str>) -> Option<ExecutionRequest> {
        let mut request = write(&self.pending).remove(id)?;
        request.reject(reason.unwrap_or("Manual rejection"));
        info!(request_id = %id, "execution rejected");

        self.finish(request.clone()).await;
        Some(request)
    }

    /// Engage the global kill switch and cancel every pending approval.
    pub async fn activate_kill_switch(&self, reason: Option<&str>) {
        let reason = reason.unwrap_or("Manual activation");
        {
            let mut kill = write(&self.kill_switch);
            kill.active = true;
            kill.reason = Some(reason.to_string());
        }
        error!(reason, "gate kill switch activated");

        let cancelled: Vec<ExecutionRequest> = {
            let mut pending = write(&self.pending);
            pending
                .drain()
                .map(|(_, mut request)| {
                    request.status = ExecutionStatus::Cancelled;
                    request.metadata.insert(
                        "cancellation_reason".to_string(),
                        serde_json::Value::String("kill switch activated".to_string()),
                    );
                    request
                })
                .collect()
        };

        for request in cancelled {
            self.finish(request).await;
        }
        self.events.risk_alert("global", reason).await;
    }

    /// Release the global kill switch. Requires [`GATE_RESUME_TOKEN`].
    pub fn deactivate_kill_switch(&self, confirmation: &str) -> Result<(), GateError> {
        if confirmation != GATE_RESUME_TOKEN {
            warn!("gate kill switch deactivation attempted without confirmation token");
            return Err(GateError::ConfirmationRequired);
        }
        let mut kill = write(&self.kill_switch);
        kill.active = false;
        kill.reason = None;
        warn!("gate kill switch deactivated; trading resumed");
        Ok(())
    }

    /// Whether the global kill switch is engaged.
    #[must_use]
    pub fn kill_switch_active(&self) -> bool {
        read(&self.kill_switch).active
    }

    /// Gate status snapshot.
    #[must_use]
    pub fn status(&self) -> GateStatus {
        GateStatus {
            trading_mode: self.mode(),
            kill_switch_active: self.kill_switch_active(),
            pending_requests: read(&self.pending).len(),
            total_executions: read(&self.history).len(),
        }
    }

    /// Requests waiting for approval.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<ExecutionRequest> {
        read(&self.pending).values().cloned().collect()
    }

    /// The newest `limit` resolved requests, oldest first.
    #[must_use]
    pub fn execution_history(&self, limit: usize) -> Vec<ExecutionRequest> {
        let history = read(&self.history);
        let start = history.len().saturating_sub(limit);
        history[start..].to_vec()
    }

    /// Record a request in history and notify the sink when resolved.
    async fn finish(&self, request: ExecutionRequest) {
        {
            let mut history = write(&self.history);
            history.push(request.clone());
            if history.len() > HISTORY_LIMIT {
                let drop = history.len() - HISTORY_KEEP;
                history.drain(..drop);
            }
        }

        if matches!(
            request.status,
            ExecutionStatus::Executed
                | ExecutionStatus::Failed
                | ExecutionStatus::Rejected
                | ExecutionStatus::Cancelled
        ) {
            self.events.execution_completed(&request).await;
        }
    }
}
