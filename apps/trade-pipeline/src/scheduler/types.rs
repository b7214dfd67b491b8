//! Queued order requests and completion records.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broker::BrokerKind;
use crate::execution::OrderSpec;
use crate::models::{OrderSide, OrderStatus, OrderType};

/// Scheduling priority; dequeue order is total and strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPriority {
    /// Emergency closes; always drained first.
    Urgent,
    /// Entries that should jump the line (brackets, market entries).
    High,
    /// Default priority.
    Normal,
    /// Background housekeeping orders.
    Low,
}

impl OrderPriority {
    /// All priorities, highest first; the worker drains in this order.
    pub const ALL: [Self; 4] = [Self::Urgent, Self::High, Self::Normal, Self::Low];

    /// Queue index for this priority.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

/// A queued order awaiting dispatch to the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Scheduler request ID ("OMG-" prefixed).
    pub id: String,
    /// Trading symbol.
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Requested quantity.
    pub quantity: Decimal,
    /// Limit price.
    pub price: Option<Decimal>,
    /// Bracket stop-loss level.
    pub stop_loss: Option<Decimal>,
    /// Bracket take-profit level.
    pub take_profit: Option<Decimal>,
    /// Target broker.
    pub broker: BrokerKind,
    /// Scheduling priority.
    pub priority: OrderPriority,
    /// Attempts already retried.
    pub retry_count: u32,
    /// Retry budget for transient failures.
    pub max_retries: u32,
    /// When the request was queued.
    pub created_at: DateTime<Utc>,
    /// Hard deadline; expired requests complete as failed, never executed.
    pub expires_at: Option<DateTime<Utc>>,
    /// Free-form caller context carried through to completion.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Default time-to-live for queued requests.
const DEFAULT_TTL_SECS: i64 = 300;
/// Default retry budget.
const DEFAULT_MAX_RETRIES: u32 = 3;

impl OrderRequest {
    fn generate_id() -> String {
        format!("OMG-{}", Uuid::new_v4())
    }

    /// Normal-priority market request with the default TTL.
    #[must_use]
    pub fn market(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        broker: BrokerKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Self::generate_id(),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_loss: None,
            take_profit: None,
            broker,
            priority: OrderPriority::Normal,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: now,
            expires_at: Some(now + Duration::seconds(DEFAULT_TTL_SECS)),
            metadata: HashMap::new(),
        }
    }

    /// Normal-priority limit request with the default TTL.
    #[must_use]
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        broker: BrokerKind,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(symbol, side, quantity, broker)
        }
    }

    /// Override the scheduling priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: OrderPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Override the time-to-live; `None` disables expiry.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.expires_at = ttl.map(|d| self.created_at + d);
        self
    }

    /// Override the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Attach a bracket stop-loss.
    #[must_use]
    pub const fn with_stop_loss(mut self, stop_loss: Decimal) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    /// Attach a bracket take-profit.
    #[must_use]
    pub const fn with_take_profit(mut self, take_profit: Decimal) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    /// Whether the request's deadline has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now > deadline)
    }

    /// The engine-side order this request maps to.
    #[must_use]
    pub fn to_order_spec(&self) -> OrderSpec {
        OrderSpec {
            symbol: self.symbol.clone(),
            side: self.side,
            order_type: self.order_type,
            quantity: self.quantity,
            price: self.price,
            stop_price: None,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            broker: self.broker,
        }
    }
}

/// How a queued request finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionOutcome {
    /// The engine accepted the order.
    Succeeded {
        /// Engine order ID.
        order_id: String,
        /// Broker-assigned order ID.
        broker_order_id: Option<String>,
        /// Final status the engine reported.
        status: OrderStatus,
        /// Average fill price, if anything filled.
        fill_price: Option<Decimal>,
        /// Quantity filled.
        fill_quantity: Decimal,
    },
    /// The request failed after exhausting retries, or expired.
    Failed {
        /// Last error message.
        error: String,
    },
    /// The request was cancelled before dispatch.
    Cancelled,
}

/// One finished request, kept in the bounded history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRecord {
    /// Scheduler request ID.
    pub id: String,
    /// Trading symbol.
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Requested quantity.
    pub quantity: Decimal,
    /// How the request finished.
    pub outcome: CompletionOutcome,
    /// Retries consumed before finishing.
    pub retry_count: u32,
    /// When the request finished.
    pub completed_at: DateTime<Utc>,
}

impl CompletionRecord {
    /// Whether the request finished successfully.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, CompletionOutcome::Succeeded { .. })
    }
}

/// Queue depths and per-symbol activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Requests queued or in flight.
    pub total_pending: usize,
    /// Urgent queue depth.
    pub urgent: usize,
    /// High queue depth.
    pub high: usize,
    /// Normal queue depth.
    pub normal: usize,
    /// Low queue depth.
    pub low: usize,
    /// Active request count per symbol.
    pub active_symbols: HashMap<String, usize>,
}

/// Order manager failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulerError {
    /// Total queued requests at capacity.
    #[error("order queue is full ({capacity})")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// Too many active requests for one symbol.
    #[error("max queued orders for {symbol} reached ({limit})")]
    SymbolLimit {
        /// The saturated symbol.
        symbol: String,
        /// Configured per-symbol limit.
        limit: usize,
    },

    /// Emergency close requested for a symbol with no open position.
    #[error("no open position for {symbol} at {broker}")]
    PositionNotFound {
        /// Broker side of the key.
        broker: BrokerKind,
        /// Symbol side of the key.
        symbol: String,
    },

    /// Scale-in requested with zero tranches.
    #[error("tranche count must be at least 1")]
    InvalidTranches,
}
