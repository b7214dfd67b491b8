//! Pre-trade checks, position sizing, and kill-switch state.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tracing::{error, info, warn};

use super::config::{RiskConfig, TradingWindow};
use super::types::{
    DailyMetrics, PositionSizing, RiskCheckResult, RiskError, RiskLevel, RiskStatus,
    RiskViolationKind, SizingError, TradeProfile,
};
use crate::events::EventSink;

/// Token required to release the risk engine's kill switch.
pub const RESUME_TOKEN: &str = "CONFIRM_RESUME_TRADING";

#[derive(Debug, Default)]
struct EngineState {
    kill_switch_active: bool,
    kill_switch_reason: Option<String>,
    current_equity: Decimal,
    peak_equity: Decimal,
    initial_equity: Decimal,
    daily: HashMap<chrono::NaiveDate, DailyMetrics>,
    open_positions: usize,
}

enum DrawdownAlert {
    Tripped(String),
    Warning(String),
}

/// Per-account risk engine.
///
/// All pre-trade checks read a single state snapshot, so one verdict is
/// internally consistent even while equity updates race it. Drawdown is
/// measured peak-to-current and may trip the kill switch on any equity
/// update; releasing the switch always requires [`RESUME_TOKEN`].
pub struct RiskEngine {
    account_id: String,
    config: RiskConfig,
    state: RwLock<EngineState>,
    events: Arc<dyn EventSink>,
}

impl RiskEngine {
    /// Create an engine for one account.
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        config: RiskConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let account_id = account_id.into();
        info!(account_id = %account_id, "risk engine initialized");
        Self {
            account_id,
            config,
            state: RwLock::new(EngineState::default()),
            events,
        }
    }

    /// The risk limits this engine enforces.
    #[must_use]
    pub const fn config(&self) -> &RiskConfig {
        &self.config
    }

    fn read_state(&self) -> RwLockReadGuard<'_, EngineState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, EngineState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn drawdown(state: &EngineState) -> Decimal {
        if state.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (state.peak_equity - state.current_equity) / state.peak_equity * dec!(100)
    }

    /// Seed equity tracking; also resets the peak.
    pub fn initialize_equity(&self, equity: Decimal) {
        let mut state = self.write_state();
        state.initial_equity = equity;
        state.current_equity = equity;
        state.peak_equity = equity;
        info!(account_id = %self.account_id, equity = %equity, "equity initialized");
    }

    /// Report the latest account equity.
    ///
    /// Advances the peak, and when drawdown protection is enabled either
    /// warns (at 80% of the limit) or trips the kill switch (at the limit).
    pub async fn update_equity(&self, equity: Decimal) {
        let alert = {
            let mut state = self.write_state();
            state.current_equity = equity;
            if equity > state.peak_equity {
                state.peak_equity = equity;
            }

            if self.config.drawdown_protection_enabled {
                let drawdown = Self::drawdown(&state);
                if drawdown >= self.config.max_drawdown_pct {
                    if state.kill_switch_active {
                        None
                    } else {
                        let reason = format!(
                            "max drawdown exceeded: {drawdown:.2}% >= {}%",
                            self.config.max_drawdown_pct
                        );
                        state.kill_switch_active = true;
                        state.kill_switch_reason = Some(reason.clone());
                        Some(DrawdownAlert::Tripped(reason))
                    }
                } else if drawdown >= self.config.max_drawdown_pct * dec!(0.8) {
                    Some(DrawdownAlert::Warning(format!(
                        "drawdown approaching limit: {drawdown:.2}%"
                    )))
                } else {
                    None
                }
            } else {
                None
            }
        };

        match alert {
            Some(DrawdownAlert::Tripped(reason)) => {
                error!(account_id = %self.account_id, reason = %reason, "kill switch activated");
                self.events.risk_alert(&self.account_id, &reason).await;
            }
            Some(DrawdownAlert::Warning(message)) => {
                warn!(account_id = %self.account_id, message = %message, "drawdown warning");
                self.events.risk_alert(&self.account_id, &message).await;
            }
            None => {}
        }
    }

    /// Run every pre-trade check against `profile`.
    ///
    /// An active kill switch short-circuits with a single `CRITICAL`
    /// verdict. Otherwise all checks run and every violation is reported,
    /// so the caller sees the full picture in one pass.
    #[must_use]
    pub fn check_trade_risk(&self, profile: &TradeProfile) -> RiskCheckResult {
        let mut result = RiskCheckResult::pass();
        let hundred = dec!(100);

        let (kill_switch_active, current_equity, open_positions, daily_pnl, drawdown) = {
            let state = self.read_state();
            let today = Utc::now().date_naive();
            (
                state.kill_switch_active,
                state.current_equity,
                state.open_positions,
                state.daily.get(&today).map(|m| m.realized_pnl),
                Self::drawdown(&state),
            )
        };

        if kill_switch_active {
            result.add_violation(
                RiskViolationKind::KillSwitch,
                "kill switch is active; all trading suspended",
            );
            result.escalate(RiskLevel::Critical);
            return result;
        }

        let balance = profile
            .balance
            .filter(|b| *b > Decimal::ZERO)
            .or_else(|| (current_equity > Decimal::ZERO).then_some(current_equity))
            .unwrap_or(dec!(10000));
        let position_value = profile.quantity * profile.price;

        let position_pct = position_value / balance * hundred;
        if position_pct > self.config.max_position_size_pct {
            result.add_violation(
                RiskViolationKind::MaxPositionSize,
                format!(
                    "position size {position_pct:.1}% exceeds max {}%",
                    self.config.max_position_size_pct
                ),
            );
            result.adjusted_position_size =
                Some(self.config.max_position_size_pct / hundred * balance / profile.price);
        }

        if profile.leverage > self.config.max_leverage {
            result.add_violation(
                RiskViolationKind::LeverageExceeded,
                format!(
                    "leverage {}x exceeds max {}x",
                    profile.leverage, self.config.max_leverage
                ),
            );
        }

        if let Some(stop_loss) = profile.stop_loss {
            let risk_pct =
                (profile.price - stop_loss).abs() * profile.quantity / balance * hundred;
            if risk_pct > self.config.max_risk_per_trade_pct {
                result.add_violation(
                    RiskViolationKind::RiskPerTradeExceeded,
                    format!(
                        "risk per trade {risk_pct:.2}% exceeds max {}%",
                        self.config.max_risk_per_trade_pct
                    ),
                );
                result.escalate(RiskLevel::High);
            }
        }

        if open_positions >= self.config.max_open_positions {
            result.add_violation(
                RiskViolationKind::ConcurrentPositions,
                format!(
                    "max open positions ({}) reached",
                    self.config.max_open_positions
                ),
            );
        }

        if let Some(pnl) = daily_pnl {
            let loss = if pnl < Decimal::ZERO { -pnl } else { Decimal::ZERO };
            let daily_loss_pct = loss / balance * hundred;
            if daily_loss_pct >= self.config.max_daily_loss_pct {
                result.add_violation(
                    RiskViolationKind::MaxDailyLoss,
                    format!(
                        "daily loss {daily_loss_pct:.2}% exceeds max {}%",
                        self.config.max_daily_loss_pct
                    ),
                );
                result.escalate(RiskLevel::High);
            }
        }

        if self.config.trading_hours_enabled && !self.within_trading_hours(Utc::now().time()) {
            result.add_violation(
                RiskViolationKind::TimeRestriction,
                "trading outside allowed hours",
            );
        }

        if drawdown >= self.config.max_drawdown_pct * dec!(0.8) {
            result.escalate(RiskLevel::High);
            result
                .warnings
                .push(format!("near max drawdown: {drawdown:.1}%"));
        }

        if !result.violations.is_empty() {
            result.passed = false;
            result.escalate(RiskLevel::Medium);
        }

        result
    }

    fn within_trading_hours(&self, now: NaiveTime) -> bool {
        self.config
            .allowed_trading_hours
            .iter()
            .any(|raw| TradingWindow::parse(raw).is_ok_and(|window| window.contains(now)))
    }

    /// Derive a position size from balance, entry, and stop.
    ///
    /// Risks `risk_pct` of balance (the per-trade limit when `None`)
    /// against the stop distance, then caps notional at the per-position
    /// limit.
    pub fn calculate_position_size(
        &self,
        balance: Decimal,
        entry_price: Decimal,
        stop_loss: Decimal,
        risk_pct: Option<Decimal>,
    ) -> Result<PositionSizing, SizingError> {
        if balance <= Decimal::ZERO {
            return Err(SizingError::NonPositive("account balance"));
        }
        if entry_price <= Decimal::ZERO {
            return Err(SizingError::NonPositive("entry price"));
        }

        let risk_pct = risk_pct.unwrap_or(self.config.max_risk_per_trade_pct);
        let risk_per_unit = (entry_price - stop_loss).abs();
        if risk_per_unit.is_zero() {
            return Err(SizingError::StopEqualsEntry);
        }

        let max_risk_amount = balance * risk_pct / dec!(100);
        let mut size = max_risk_amount / risk_per_unit;
        let mut position_value = size * entry_price;

        let max_position_value = balance * self.config.max_position_size_pct / dec!(100);
        let capped = position_value > max_position_value;
        if capped {
            size = max_position_value / entry_price;
            position_value = max_position_value;
        }

        Ok(PositionSizing {
            size,
            position_value,
            risk_amount: size * risk_per_unit,
            risk_pct,
            capped,
        })
    }

    /// Record a realized trade outcome into the UTC day of `at`.
    pub async fn record_trade(&self, symbol: &str, pnl: Decimal, at: DateTime<Utc>) {
        let new_equity = {
            let mut state = self.write_state();
            let metrics = state.daily.entry(at.date_naive()).or_default();
            metrics.trades += 1;
            metrics.realized_pnl += pnl;
            if pnl > Decimal::ZERO {
                metrics.wins += 1;
            } else {
                metrics.losses += 1;
            }
            state.current_equity + pnl
        };

        info!(account_id = %self.account_id, symbol, pnl = %pnl, "trade recorded");
        self.update_equity(new_equity).await;
    }

    /// Report how many positions are currently open.
    pub fn set_open_positions(&self, count: usize) {
        self.write_state().open_positions = count;
    }

    /// Engage the kill switch. Idempotent: re-activation keeps the first
    /// reason and emits no second alert.
    pub async fn activate_kill_switch(&self, reason: &str) {
        let fired = {
            let mut state = self.write_state();
            if state.kill_switch_active {
                false
            } else {
                state.kill_switch_active = true;
                state.kill_switch_reason = Some(reason.to_string());
                true
            }
        };

        if fired {
            error!(account_id = %self.account_id, reason, "kill switch activated");
            self.events.risk_alert(&self.account_id, reason).await;
        }
    }

    /// Release the kill switch. Requires [`RESUME_TOKEN`].
    pub fn deactivate_kill_switch(&self, confirmation: &str) -> Result<(), RiskError> {
        if confirmation != RESUME_TOKEN {
            warn!(
                account_id = %self.account_id,
                "kill switch deactivation attempted without confirmation token"
            );
            return Err(RiskError::ConfirmationRequired);
        }

        let mut state = self.write_state();
        if !state.kill_switch_active {
            return Err(RiskError::NotActive);
        }
        state.kill_switch_active = false;
        state.kill_switch_reason = None;
        warn!(account_id = %self.account_id, "kill switch deactivated; trading resumed");
        Ok(())
    }

    /// Whether the kill switch is engaged.
    #[must_use]
    pub fn kill_switch_active(&self) -> bool {
        self.read_state().kill_switch_active
    }

    /// Snapshot of account risk state.
    #[must_use]
    pub fn risk_status(&self) -> RiskStatus {
        let state = self.read_state();
        let drawdown_pct = Self::drawdown(&state);
        let today = state
            .daily
            .get(&Utc::now().date_naive())
            .copied()
            .unwrap_or_default();

        let risk_level = if state.kill_switch_active {
            RiskLevel::Critical
        } else if drawdown_pct >= self.config.max_drawdown_pct * dec!(0.8) {
            RiskLevel::High
        } else if drawdown_pct >= self.config.max_drawdown_pct * dec!(0.5) {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        RiskStatus {
            account_id: self.account_id.clone(),
            kill_switch_active: state.kill_switch_active,
            kill_switch_reason: state.kill_switch_reason.clone(),
            current_equity: state.current_equity,
            peak_equity: state.peak_equity,
            initial_equity: state.initial_equity,
            drawdown_pct,
            open_positions: state.open_positions,
            today,
            risk_level,
        }
    }
}
