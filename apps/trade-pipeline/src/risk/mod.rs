//! Stateful per-account risk engine.
//!
//! Gatekeeper that turns a proposed trade into a pass/fail verdict plus a
//! recommended position size, and independently enforces capital
//! preservation through equity/drawdown tracking and a kill switch with a
//! two-step, human-confirmed recovery.

mod config;
mod engine;
mod types;

pub use config::{RiskConfig, TradingWindow, WindowError};
pub use engine::RiskEngine;
pub use types::{
    DailyMetrics, PositionSizing, RiskCheckResult, RiskError, RiskLevel, RiskStatus,
    RiskViolation, RiskViolationKind, SizingError, TradeProfile,
};
