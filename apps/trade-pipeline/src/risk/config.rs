//! Risk engine configuration.

use std::sync::LazyLock;

use chrono::NaiveTime;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Per-account risk limits.
///
/// Percentage fields are expressed as whole percents (`2` means 2%).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Maximum capital risked on a single trade, as a percent of balance.
    #[serde(default = "default_max_risk_per_trade_pct")]
    pub max_risk_per_trade_pct: Decimal,
    /// Maximum notional value of one position, as a percent of balance.
    #[serde(default = "default_max_position_size_pct")]
    pub max_position_size_pct: Decimal,
    /// Maximum leverage multiplier.
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
    /// Daily realized-loss limit, as a percent of balance.
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: Decimal,
    /// Peak-to-current drawdown that trips the kill switch, in percent.
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
    /// Whether drawdown tracking may trip the kill switch at all.
    #[serde(default = "default_true")]
    pub drawdown_protection_enabled: bool,
    /// Maximum number of concurrently open positions.
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
    /// Whether trades are restricted to [`Self::allowed_trading_hours`].
    #[serde(default)]
    pub trading_hours_enabled: bool,
    /// Allowed trading windows as `"HH:MM-HH:MM"` in UTC.
    #[serde(default = "default_trading_hours")]
    pub allowed_trading_hours: Vec<String>,
}

fn default_max_risk_per_trade_pct() -> Decimal {
    dec!(2)
}

fn default_max_position_size_pct() -> Decimal {
    dec!(10)
}

const fn default_max_leverage() -> u32 {
    10
}

fn default_max_daily_loss_pct() -> Decimal {
    dec!(5)
}

fn default_max_drawdown_pct() -> Decimal {
    dec!(20)
}

const fn default_true() -> bool {
    true
}

const fn default_max_open_positions() -> usize {
    5
}

fn default_trading_hours() -> Vec<String> {
    vec!["00:00-23:59".to_string()]
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade_pct: default_max_risk_per_trade_pct(),
            max_position_size_pct: default_max_position_size_pct(),
            max_leverage: default_max_leverage(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            max_drawdown_pct: default_max_drawdown_pct(),
            drawdown_protection_enabled: true,
            max_open_positions: default_max_open_positions(),
            trading_hours_enabled: false,
            allowed_trading_hours: default_trading_hours(),
        }
    }
}

static WINDOW_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // pattern is a literal, verified by tests
    Regex::new(r"^(\d{2}):(\d{2})-(\d{2}):(\d{2})$").unwrap()
});

/// Malformed trading-window string.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WindowError {
    /// The string does not match `HH:MM-HH:MM`.
    #[error("trading window `{0}` is not in HH:MM-HH:MM format")]
    Format(String),
    /// A component is not a valid time of day.
    #[error("trading window `{0}` contains an invalid time")]
    InvalidTime(String),
}

/// One inclusive UTC trading window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl TradingWindow {
    /// Parse a `"HH:MM-HH:MM"` window.
    pub fn parse(raw: &str) -> Result<Self, WindowError> {
        let caps = WINDOW_RE
            .captures(raw)
            .ok_or_else(|| WindowError::Format(raw.to_string()))?;
        let part = |i: usize| -> u32 { caps[i].parse().unwrap_or(u32::MAX) };
        let start = NaiveTime::from_hms_opt(part(1), part(2), 0)
            .ok_or_else(|| WindowError::InvalidTime(raw.to_string()))?;
        let end = NaiveTime::from_hms_opt(part(3), part(4), 0)
            .ok_or_else(|| WindowError::InvalidTime(raw.to_string()))?;
        Ok(Self { start, end })
    }

    /// Whether `time` falls inside the window, boundaries included.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }
}
