//! Risk verdicts, sizing results, and trade profiles.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{OrderSide, OrderType};

/// Severity attached to a risk verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// No findings.
    Low,
    /// Warnings only.
    Medium,
    /// At least one limit violated.
    High,
    /// Kill switch engaged or equivalent hard stop.
    Critical,
}

/// Which limit a violation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskViolationKind {
    /// Kill switch is active.
    KillSwitch,
    /// Position notional exceeds the per-position cap.
    MaxPositionSize,
    /// Stop distance risks more capital than allowed.
    RiskPerTradeExceeded,
    /// Requested leverage above the configured maximum.
    LeverageExceeded,
    /// Too many concurrently open positions.
    ConcurrentPositions,
    /// Daily realized-loss limit reached.
    MaxDailyLoss,
    /// Outside the allowed trading hours.
    TimeRestriction,
}

/// One violated limit with a human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskViolation {
    /// Which limit was violated.
    pub kind: RiskViolationKind,
    /// Operator-facing description.
    pub message: String,
}

/// Outcome of a pre-trade risk check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCheckResult {
    /// Whether the trade may proceed.
    pub passed: bool,
    /// Highest severity reached across all checks.
    pub risk_level: RiskLevel,
    /// Violations, in check order.
    pub violations: Vec<RiskViolation>,
    /// Non-blocking findings.
    pub warnings: Vec<String>,
    /// Size the trade was capped to, when the requested size was too large.
    pub adjusted_position_size: Option<Decimal>,
}

impl RiskCheckResult {
    /// A clean pass with no findings.
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            risk_level: RiskLevel::Low,
            violations: Vec::new(),
            warnings: Vec::new(),
            adjusted_position_size: None,
        }
    }

    /// Record a violation and fail the check.
    pub fn add_violation(&mut self, kind: RiskViolationKind, message: impl Into<String>) {
        self.passed = false;
        self.violations.push(RiskViolation {
            kind,
            message: message.into(),
        });
    }

    /// Raise the severity; never lowers it.
    pub fn escalate(&mut self, level: RiskLevel) {
        if level > self.risk_level {
            self.risk_level = level;
        }
    }
}

/// Recommended position size for a balance / entry / stop triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizing {
    /// Recommended quantity.
    pub size: Decimal,
    /// Notional value at the entry price.
    pub position_value: Decimal,
    /// Capital lost if the stop is hit.
    pub risk_amount: Decimal,
    /// Risk as a percent of balance.
    pub risk_pct: Decimal,
    /// Whether the per-position notional cap reduced the size.
    pub capped: bool,
}

/// The trade a risk check is evaluated against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeProfile {
    /// Trading symbol.
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Requested quantity.
    pub quantity: Decimal,
    /// Entry price used for notional and stop-distance math.
    pub price: Decimal,
    /// Stop-loss price, if the trade carries one.
    pub stop_loss: Option<Decimal>,
    /// Requested leverage multiplier.
    pub leverage: u32,
    /// Balance to evaluate against; falls back to tracked equity.
    pub balance: Option<Decimal>,
}

impl TradeProfile {
    /// Profile for a plain market trade at 1x leverage.
    #[must_use]
    pub fn market(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price,
            stop_loss: None,
            leverage: 1,
            balance: None,
        }
    }

    /// Attach a stop-loss price.
    #[must_use]
    pub const fn with_stop_loss(mut self, stop_loss: Decimal) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    /// Override the leverage multiplier.
    #[must_use]
    pub const fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = leverage;
        self
    }

    /// Evaluate against an explicit balance instead of tracked equity.
    #[must_use]
    pub const fn with_balance(mut self, balance: Decimal) -> Self {
        self.balance = Some(balance);
        self
    }
}

/// Realized outcomes for one UTC day.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DailyMetrics {
    /// Trades recorded today.
    pub trades: u32,
    /// Winning trades.
    pub wins: u32,
    /// Losing trades.
    pub losses: u32,
    /// Net realized profit and loss.
    pub realized_pnl: Decimal,
}

/// Point-in-time snapshot of the engine's account state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskStatus {
    /// Account the engine tracks.
    pub account_id: String,
    /// Whether the kill switch is engaged.
    pub kill_switch_active: bool,
    /// Reason the kill switch engaged, if it is active.
    pub kill_switch_reason: Option<String>,
    /// Latest reported equity.
    pub current_equity: Decimal,
    /// Highest equity seen.
    pub peak_equity: Decimal,
    /// Equity at initialization.
    pub initial_equity: Decimal,
    /// Current peak-to-equity drawdown in percent.
    pub drawdown_pct: Decimal,
    /// Open positions as last reported.
    pub open_positions: usize,
    /// Today's realized metrics (UTC day).
    pub today: DailyMetrics,
    /// Overall severity derived from the kill switch and drawdown.
    pub risk_level: RiskLevel,
}

/// Position sizing failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SizingError {
    /// A required input was zero or negative.
    #[error("{0} must be positive")]
    NonPositive(&'static str),
    /// Entry and stop are the same price, so risk per unit is zero.
    #[error("stop-loss equals entry price; cannot derive a size")]
    StopEqualsEntry,
}

/// Risk engine control error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RiskError {
    /// Kill-switch deactivation attempted without the confirmation token.
    #[error("kill switch deactivation requires the confirmation token")]
    ConfirmationRequired,
    /// Deactivation attempted while the switch is not engaged.
    #[error("kill switch is not active")]
    NotActive,
}
