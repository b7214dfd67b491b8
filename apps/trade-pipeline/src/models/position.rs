//! Position tracking keyed by (broker, symbol).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::broker::BrokerKind;
use crate::models::OrderSide;

/// Key identifying a position in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    /// Broker the position lives at.
    pub broker: BrokerKind,
    /// Trading symbol.
    pub symbol: String,
}

impl PositionKey {
    /// Create a key for a broker/symbol pair.
    #[must_use]
    pub fn new(broker: BrokerKind, symbol: impl Into<String>) -> Self {
        Self {
            broker,
            symbol: symbol.into(),
        }
    }
}

/// Open position tracked by the execution engine.
///
/// Quantity is always positive while the position exists; a fill that
/// reduces it to zero removes the entry from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Trading symbol.
    pub symbol: String,
    /// Direction the position was opened in.
    pub side: OrderSide,
    /// Open quantity, always > 0.
    pub quantity: Decimal,
    /// Volume-weighted average entry price.
    pub entry_price: Decimal,
    /// Most recently observed market price.
    pub current_price: Decimal,
    /// Unrealized PnL at `current_price`.
    pub unrealized_pnl: Decimal,
    /// PnL realized by partial closes of this position.
    pub realized_pnl: Decimal,
    /// Stop-loss level, if set.
    pub stop_loss: Option<Decimal>,
    /// Take-profit level, if set.
    pub take_profit: Option<Decimal>,
    /// Broker the position lives at.
    pub broker: BrokerKind,
    /// When the position was first opened.
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Recompute unrealized PnL against a new market price.
    pub fn mark_price(&mut self, price: Decimal) {
        self.current_price = price;
        let per_unit = match self.side {
            OrderSide::Buy => price - self.entry_price,
            OrderSide::Sell => self.entry_price - price,
        };
        self.unrealized_pnl = per_unit * self.quantity;
    }
}
