//! Order types and lifecycle tracking.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broker::BrokerKind;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl OrderSide {
    /// The side that closes a position opened on this side.
    #[must_use]
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

/// Order type (market, limit, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Market order - execute at best available price.
    Market,
    /// Limit order - execute at specified price or better.
    Limit,
    /// Stop order - becomes market order when stop price is reached.
    Stop,
    /// Stop-limit order - becomes limit order when stop price is reached.
    StopLimit,
    /// Take-profit order closing a position on favorable movement.
    TakeProfit,
    /// Stop-loss order closing a position on adverse movement.
    StopLoss,
}

/// Order status in the lifecycle.
///
/// `Pending -> Submitted -> {PartiallyFilled -> Filled, Filled, Rejected,
/// Cancelled, Expired}`. Paper market orders go `Pending -> Filled` in one
/// step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order created but not yet submitted.
    Pending,
    /// Order accepted by the broker, working.
    Submitted,
    /// Order partially filled.
    PartiallyFilled,
    /// Order completely filled.
    Filled,
    /// Order cancelled.
    Cancelled,
    /// Order rejected by validation or the broker.
    Rejected,
    /// Order expired.
    Expired,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }

    /// Returns true if the order is still active (can be filled or cancelled).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Submitted | Self::PartiallyFilled)
    }
}

/// Broker-facing order owned and mutated only by the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Engine order ID ("ORD-" prefixed).
    pub id: String,
    /// Trading symbol.
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Requested quantity.
    pub quantity: Decimal,
    /// Limit price (for limit orders).
    pub price: Option<Decimal>,
    /// Stop trigger price (for stop orders).
    pub stop_price: Option<Decimal>,
    /// Stop-loss level for the bracket child placed after fill.
    pub stop_loss: Option<Decimal>,
    /// Take-profit level for the bracket child placed after fill.
    pub take_profit: Option<Decimal>,
    /// Current status.
    pub status: OrderStatus,
    /// Filled quantity; never exceeds `quantity`.
    pub filled_quantity: Decimal,
    /// Average fill price across all fills.
    pub average_fill_price: Option<Decimal>,
    /// Broker-assigned order ID.
    pub broker_order_id: Option<String>,
    /// Broker this order is routed to.
    pub broker: BrokerKind,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Error message for rejected/failed orders.
    pub error_message: Option<String>,
}

impl Order {
    /// Generate a new engine order ID.
    #[must_use]
    pub fn generate_id() -> String {
        format!("ORD-{}", Uuid::new_v4())
    }
}
