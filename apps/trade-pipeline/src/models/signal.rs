//! Trading signal consumed by the execution gate.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Directional recommendation carried by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalDirection {
    /// Open or add to a long position.
    Buy,
    /// Open or add to a short position.
    Sell,
    /// No action.
    Hold,
    /// High-conviction buy.
    StrongBuy,
    /// High-conviction sell.
    StrongSell,
}

impl SignalDirection {
    /// Returns true if the signal recommends a long entry.
    #[must_use]
    pub const fn is_long(&self) -> bool {
        matches!(self, Self::Buy | Self::StrongBuy)
    }

    /// Returns true if the signal recommends a short entry.
    #[must_use]
    pub const fn is_short(&self) -> bool {
        matches!(self, Self::Sell | Self::StrongSell)
    }

    /// Returns true if the signal asks for any trade at all.
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        !matches!(self, Self::Hold)
    }
}

/// Immutable trading signal produced by an external signal engine.
///
/// The pipeline treats this as opaque input; no indicator computation
/// happens here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Trading symbol (e.g. "BTCUSDT").
    pub symbol: String,
    /// Recommended direction.
    pub direction: SignalDirection,
    /// Confidence in percent, 0-100.
    pub confidence: Decimal,
    /// Suggested entry price.
    pub entry_price: Decimal,
    /// Suggested stop-loss price.
    pub stop_loss: Decimal,
    /// Suggested take-profit price.
    pub take_profit: Decimal,
    /// Risk/reward ratio computed by the signal engine.
    pub risk_reward: Decimal,
    /// Timeframe the signal was derived on (e.g. "H1").
    #[serde(default)]
    pub timeframe: Option<String>,
    /// Free-form context from the signal engine, carried through untouched.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Signal {
    /// Create a signal with the required price levels and no metadata.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        direction: SignalDirection,
        confidence: Decimal,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) -> Self {
        let risk = (entry_price - stop_loss).abs();
        let reward = (take_profit - entry_price).abs();
        let risk_reward = if risk.is_zero() {
            Decimal::ZERO
        } else {
            reward / risk
        };

        Self {
            symbol: symbol.into(),
            direction,
            confidence,
            entry_price,
            stop_loss,
            take_profit,
            risk_reward,
            timeframe: None,
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_direction_classification() {
        assert!(SignalDirection::Buy.is_long());
        assert!(SignalDirection::StrongBuy.is_long());
        assert!(SignalDirection::Sell.is_short());
        assert!(SignalDirection::StrongSell.is_short());
        assert!(!SignalDirection::Hold.is_actionable());
        assert!(SignalDirection::Buy.is_actionable());
    }

    #[test]
    fn test_risk_reward_derived() {
        let signal = Signal::new(
            "BTCUSDT",
            SignalDirection::Buy,
            dec!(75),
            dec!(45000),
            dec!(44000),
            dec!(47000),
        );
        assert_eq!(signal.risk_reward, dec!(2));
    }

    #[test]
    fn test_risk_reward_zero_when_stop_equals_entry() {
        let signal = Signal::new(
            "BTCUSDT",
            SignalDirection::Sell,
            dec!(50),
            dec!(100),
            dec!(100),
            dec!(90),
        );
        assert_eq!(signal.risk_reward, Decimal::ZERO);
    }
}
