//! Broker adapter contract.
//!
//! The execution engine depends only on this narrow interface, never on
//! adapter internals. One implementation exists per broker plus an
//! in-process paper adapter that never leaves the process.

mod mock;
mod paper;

pub use mock::{MockBroker, ScriptedResponse};
pub use paper::PaperBroker;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{OrderSide, OrderStatus};

/// Supported brokers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrokerKind {
    /// Binance futures.
    Binance,
    /// MetaTrader 5 bridge.
    MetaTrader5,
    /// In-process paper trading.
    Paper,
}

impl std::fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Binance => "binance",
            Self::MetaTrader5 => "metatrader5",
            Self::Paper => "paper",
        };
        f.write_str(name)
    }
}

/// Order details handed to a broker adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTicket {
    /// Trading symbol.
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Requested quantity.
    pub quantity: Decimal,
    /// Limit price, when the call requires one.
    pub price: Option<Decimal>,
    /// Trigger price for stop-loss / take-profit calls.
    pub trigger_price: Option<Decimal>,
}

impl OrderTicket {
    /// Ticket for a market order.
    #[must_use]
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            price: None,
            trigger_price: None,
        }
    }

    /// Ticket for a limit order.
    #[must_use]
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            price: Some(price),
            trigger_price: None,
        }
    }

    /// Ticket for a triggered (stop-loss / take-profit) order.
    #[must_use]
    pub fn triggered(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        trigger_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            price: None,
            trigger_price: Some(trigger_price),
        }
    }
}

/// Broker response to a placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerFill {
    /// Broker-assigned order ID.
    pub broker_order_id: String,
    /// Status the broker reports for the order.
    pub status: OrderStatus,
    /// Quantity filled so far.
    pub filled_quantity: Decimal,
    /// Average fill price, if anything filled.
    pub average_price: Option<Decimal>,
}

impl BrokerFill {
    /// A complete fill at a single price.
    #[must_use]
    pub fn filled(broker_order_id: impl Into<String>, quantity: Decimal, price: Decimal) -> Self {
        Self {
            broker_order_id: broker_order_id.into(),
            status: OrderStatus::Filled,
            filled_quantity: quantity,
            average_price: Some(price),
        }
    }

    /// A working order acknowledged but not yet filled.
    #[must_use]
    pub fn submitted(broker_order_id: impl Into<String>) -> Self {
        Self {
            broker_order_id: broker_order_id.into(),
            status: OrderStatus::Submitted,
            filled_quantity: Decimal::ZERO,
            average_price: None,
        }
    }
}

/// Broker adapter error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// Order rejected by the broker.
    #[error("order rejected by broker: {reason}")]
    Rejected {
        /// Rejection reason.
        reason: String,
    },

    /// Broker did not respond in time.
    #[error("broker request timed out: {message}")]
    Timeout {
        /// Timeout details.
        message: String,
    },

    /// Transport-level failure.
    #[error("broker transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// Order not found at the broker.
    #[error("order not found at broker: {broker_order_id}")]
    OrderNotFound {
        /// The missing broker order ID.
        broker_order_id: String,
    },

    /// The adapter does not support this operation.
    #[error("operation not supported by broker: {operation}")]
    Unsupported {
        /// The unsupported operation.
        operation: String,
    },
}

impl BrokerError {
    /// Whether the order manager may retry after this error.
    ///
    /// Validation-style failures (`Unsupported`, `OrderNotFound`) are
    /// permanent; rejections, timeouts, and transport failures are
    /// transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Rejected { .. } | Self::Timeout { .. } | Self::Transport { .. }
        )
    }
}

/// Port for broker interactions.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Which broker this adapter talks to.
    fn kind(&self) -> BrokerKind;

    /// Place a market order.
    async fn place_market_order(&self, ticket: &OrderTicket) -> Result<BrokerFill, BrokerError>;

    /// Place a limit order.
    async fn place_limit_order(&self, ticket: &OrderTicket) -> Result<BrokerFill, BrokerError>;

    /// Place a stop-loss order.
    async fn place_stop_loss(&self, ticket: &OrderTicket) -> Result<BrokerFill, BrokerError>;

    /// Place a take-profit order.
    async fn place_take_profit(&self, ticket: &OrderTicket) -> Result<BrokerFill, BrokerError>;

    /// Cancel a working order.
    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_retryable_classification() {
        assert!(
            BrokerError::Timeout {
                message: "t".to_string()
            }
            .is_retryable()
        );
        assert!(
            BrokerError::Rejected {
                reason: "r".to_string()
            }
            .is_retryable()
        );
        assert!(
            !BrokerError::Unsupported {
                operation: "o".to_string()
            }
            .is_retryable()
        );
        assert!(
            !BrokerError::OrderNotFound {
                broker_order_id: "b-1".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_ticket_constructors() {
        let market = OrderTicket::market("BTCUSDT", OrderSide::Buy, dec!(1));
        assert!(market.price.is_none());

        let limit = OrderTicket::limit("BTCUSDT", OrderSide::Buy, dec!(1), dec!(45000));
        assert_eq!(limit.price, Some(dec!(45000)));

        let stop = OrderTicket::triggered("BTCUSDT", OrderSide::Sell, dec!(1), dec!(44000));
        assert_eq!(stop.trigger_price, Some(dec!(44000)));
    }

    #[test]
    fn test_fill_constructors() {
        let fill = BrokerFill::filled("b-1", dec!(2), dec!(100));
        assert_eq!(fill.status, OrderStatus::Filled);
        assert_eq!(fill.filled_quantity, dec!(2));

        let working = BrokerFill::submitted("b-2");
        assert_eq!(working.status, OrderStatus::Submitted);
        assert_eq!(working.filled_quantity, Decimal::ZERO);
    }
}
