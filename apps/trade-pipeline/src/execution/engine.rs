//! Order submission, broker routing, and fill accounting.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::state::{OrderStore, PositionLedger};
use crate::broker::{BrokerAdapter, BrokerError, BrokerFill, BrokerKind, OrderTicket, PaperBroker};
use crate::events::EventSink;
use crate::models::{Order, OrderSide, OrderStatus, OrderType, Position, PositionKey};

/// Execution engine limits and paper balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Paper balance validation limits are computed against.
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
    /// Daily realized-loss limit as a percent of balance.
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: Decimal,
    /// Maximum open positions before new orders are rejected.
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
    /// Maximum order notional as a percent of balance.
    #[serde(default = "default_max_position_value_pct")]
    pub max_position_value_pct: Decimal,
}

fn default_initial_balance() -> Decimal {
    dec!(10000)
}

fn default_max_daily_loss_pct() -> Decimal {
    dec!(5)
}

const fn default_max_open_positions() -> usize {
    5
}

fn default_max_position_value_pct() -> Decimal {
    dec!(10)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            max_open_positions: default_max_open_positions(),
            max_position_value_pct: default_max_position_value_pct(),
        }
    }
}

/// Execution engine failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Order rejected by engine-local validation or the broker.
    #[error("order rejected: {reason}")]
    Rejected {
        /// Rejection reason.
        reason: String,
    },

    /// Broker adapter call failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// No adapter registered for the requested broker.
    #[error("no adapter registered for broker {broker}")]
    UnknownBroker {
        /// The unrouteable broker.
        broker: BrokerKind,
    },

    /// Unknown engine order ID.
    #[error("order not found: {id}")]
    OrderNotFound {
        /// The missing ID.
        id: String,
    },

    /// No open position for the given key.
    #[error("no open position for {symbol} at {broker}")]
    PositionNotFound {
        /// Broker side of the key.
        broker: BrokerKind,
        /// Symbol side of the key.
        symbol: String,
    },
}

impl EngineError {
    /// Whether the order manager may retry the submission.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected { .. } => true,
            Self::Broker(e) => e.is_retryable(),
            Self::UnknownBroker { .. } | Self::OrderNotFound { .. } => false,
            Self::PositionNotFound { .. } => false,
        }
    }
}

/// Everything needed to create and submit one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
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
    /// Stop trigger price.
    pub stop_price: Option<Decimal>,
    /// Bracket stop-loss level.
    pub stop_loss: Option<Decimal>,
    /// Bracket take-profit level.
    pub take_profit: Option<Decimal>,
    /// Target broker.
    pub broker: BrokerKind,
}

impl OrderSpec {
    /// Spec for a market order.
    #[must_use]
    pub fn market(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        broker: BrokerKind,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            stop_loss: None,
            take_profit: None,
            broker,
        }
    }

    /// Spec for a limit order.
    #[must_use]
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        broker: BrokerKind,
    ) -> Self {
        Self {
            price: Some(price),
            order_type: OrderType::Limit,
            ..Self::market(symbol, side, quantity, broker)
        }
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

    /// Reference price for market fills without a live quote.
    #[must_use]
    pub const fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }
}

/// Balance and activity snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    /// Paper balance including today's realized PnL.
    pub balance: Decimal,
    /// Realized PnL for the current UTC day.
    pub daily_pnl: Decimal,
    /// Open positions.
    pub open_positions: usize,
    /// Orders still working.
    pub active_orders: usize,
}

#[derive(Debug)]
struct DailyPnl {
    date: NaiveDate,
    realized: Decimal,
}

/// Routes orders to broker adapters and keeps the order/position books.
///
/// Broker I/O never happens under a lock: the engine snapshots state,
/// awaits the adapter, then re-acquires to commit the outcome. Each
/// adapter failure is committed to the order as `Rejected` with the error
/// message; nothing in the submission path panics.
pub struct ExecutionEngine {
    config: EngineConfig,
    adapters: HashMap<BrokerKind, Arc<dyn BrokerAdapter>>,
    orders: OrderStore,
    positions: PositionLedger,
    daily: RwLock<DailyPnl>,
    events: Arc<dyn EventSink>,
}

impl ExecutionEngine {
    /// Create an engine with only the in-process paper adapter registered.
    #[must_use]
    pub fn new(config: EngineConfig, events: Arc<dyn EventSink>) -> Self {
        let mut adapters: HashMap<BrokerKind, Arc<dyn BrokerAdapter>> = HashMap::new();
        adapters.insert(BrokerKind::Paper, Arc::new(PaperBroker::new()));
        Self {
            config,
            adapters,
            orders: OrderStore::new(),
            positions: PositionLedger::new(),
            daily: RwLock::new(DailyPnl {
                date: Utc::now().date_naive(),
                realized: Decimal::ZERO,
            }),
            events,
        }
    }

    /// Register (or replace) the adapter for its broker.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn BrokerAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    /// The engine's configured limits.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create, validate, route, and commit one order.
    ///
    /// Validation failures store the order as `Rejected` and never contact
    /// the broker. Adapter errors are committed the same way and surfaced
    /// as [`EngineError::Broker`].
    pub async fn submit_order(&self, spec: OrderSpec) -> Result<Order, EngineError> {
        let now = Utc::now();
        let order = Order {
            id: Order::generate_id(),
            symbol: spec.symbol,
            side: spec.side,
            order_type: spec.order_type,
            quantity: spec.quantity,
            price: spec.price,
            stop_price: spec.stop_price,
            stop_loss: spec.stop_loss,
            take_profit: spec.take_profit,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            average_fill_price: None,
            broker_order_id: None,
            broker: spec.broker,
            created_at: now,
            updated_at: now,
            error_message: None,
        };
        let id = order.id.clone();
        self.orders.insert(order.clone());

        if let Err(reason) = self.validate(&order) {
            warn!(order_id = %id, symbol = %order.symbol, reason = %reason, "order rejected");
            self.reject(&id, &reason).await;
            return Err(EngineError::Rejected { reason });
        }

        let Some(adapter) = self.adapters.get(&order.broker).cloned() else {
            let reason = format!("no adapter registered for broker {}", order.broker);
            self.reject(&id, &reason).await;
            return Err(EngineError::UnknownBroker {
                broker: order.broker,
            });
        };

        let result = self.route(&order, adapter.as_ref()).await;
        match result {
            Ok(fill) => self.commit_fill(&id, fill, adapter.as_ref()).await,
            Err(broker_error) => {
                self.reject(&id, &broker_error.to_string()).await;
                Err(EngineError::Broker(broker_error))
            }
        }
    }

    async fn route(
        &self,
        order: &Order,
        adapter: &dyn BrokerAdapter,
    ) -> Result<BrokerFill, BrokerError> {
        match order.order_type {
            OrderType::Market => {
                let mut ticket = OrderTicket::market(order.symbol.clone(), order.side, order.quantity);
                ticket.price = order.price;
                adapter.place_market_order(&ticket).await
            }
            OrderType::Limit => {
                let price = order.price.ok_or_else(|| BrokerError::Rejected {
                    reason: "limit order requires a price".to_string(),
                })?;
                let ticket = OrderTicket::limit(order.symbol.clone(), order.side, order.quantity, price);
                adapter.place_limit_order(&ticket).await
            }
            OrderType::Stop | OrderType::StopLimit | OrderType::StopLoss => {
                let trigger = order
                    .stop_price
                    .or(order.stop_loss)
                    .ok_or_else(|| BrokerError::Rejected {
                        reason: "stop order requires a trigger price".to_string(),
                    })?;
                let ticket =
                    OrderTicket::triggered(order.symbol.clone(), order.side, order.quantity, trigger);
                adapter.place_stop_loss(&ticket).await
            }
            OrderType::TakeProfit => {
                let trigger = order
                    .stop_price
                    .or(order.take_profit)
                    .ok_or_else(|| BrokerError::Rejected {
                        reason: "take-profit order requires a trigger price".to_string(),
                    })?;
                let ticket =
                    OrderTicket::triggered(order.symbol.clone(), order.side, order.quantity, trigger);
                adapter.place_take_profit(&ticket).await
            }
        }
    }

    async fn commit_fill(
        &self,
        id: &str,
        fill: BrokerFill,
        adapter: &dyn BrokerAdapter,
    ) -> Result<Order, EngineError> {
        let order = self
            .orders
            .update(id, |o| {
                o.status = fill.status;
                o.broker_order_id = Some(fill.broker_order_id.clone());
                o.filled_quantity = fill.filled_quantity;
                o.average_fill_price = fill.average_price;
            })
            .ok_or_else(|| EngineError::OrderNotFound { id: id.to_string() })?;

        info!(
            order_id = %order.id,
            symbol = %order.symbol,
            status = ?order.status,
            filled = %order.filled_quantity,
            "order update committed"
        );
        self.events.order_updated(&order).await;

        if matches!(
            order.status,
            OrderStatus::Filled | OrderStatus::PartiallyFilled
        ) && order.filled_quantity > Decimal::ZERO
        {
            let effect = self.positions.apply_fill(&order);
            if !effect.realized_pnl.is_zero() {
                self.add_daily_pnl(effect.realized_pnl);
            }
            if let Some(position) = &effect.position {
                self.events.position_updated(position).await;
            }
            self.place_brackets(&order, adapter).await;
        }

        Ok(order)
    }

    /// Bracket failures are logged and never roll back the parent fill.
    async fn place_brackets(&self, order: &Order, adapter: &dyn BrokerAdapter) {
        let close_side = order.side.opposite();

        if let Some(stop_loss) = order.stop_loss {
            let ticket = OrderTicket::triggered(
                order.symbol.clone(),
                close_side,
                order.filled_quantity,
                stop_loss,
            );
            if let Err(error) = adapter.place_stop_loss(&ticket).await {
                error!(order_id = %order.id, error = %error, "stop-loss bracket failed");
            }
        }

        if let Some(take_profit) = order.take_profit {
            let ticket = OrderTicket::triggered(
                order.symbol.clone(),
                close_side,
                order.filled_quantity,
                take_profit,
            );
            if let Err(error) = adapter.place_take_profit(&ticket).await {
                error!(order_id = %order.id, error = %error, "take-profit bracket failed");
            }
        }
    }

    async fn reject(&self, id: &str, reason: &str) {
        let updated = self.orders.update(id, |o| {
            o.status = OrderStatus::Rejected;
            o.error_message = Some(reason.to_string());
        });
        if let Some(order) = updated {
            self.events.order_updated(&order).await;
        }
    }

    /// Fast engine-local limits, a simpler last line of defense than the
    /// risk engine's full check set.
    fn validate(&self, order: &Order) -> Result<(), String> {
        let balance = self.config.initial_balance;

        let daily = self.daily_pnl();
        if daily < -(self.config.max_daily_loss_pct / dec!(100) * balance) {
            return Err("daily loss limit exceeded".to_string());
        }

        if self.positions.open_count() >= self.config.max_open_positions {
            return Err(format!(
                "max open positions ({}) reached",
                self.config.max_open_positions
            ));
        }

        // A market order with no reference price has no notional to check
        // here; sizing for those is the risk engine's job upstream.
        if let Some(reference_price) = order.price {
            let total_value = order.quantity * reference_price;
            let max_value = balance * self.config.max_position_value_pct / dec!(100);
            if total_value > max_value {
                return Err(format!(
                    "order value exceeds {}% of balance",
                    self.config.max_position_value_pct
                ));
            }
        }

        Ok(())
    }

    /// Cancel a working order.
    ///
    /// Paper orders cancel locally and instantly; broker orders flip to
    /// `Cancelled` only after the adapter confirms.
    pub async fn cancel_order(&self, id: &str) -> Result<Order, EngineError> {
        let order = self
            .orders
            .get(id)
            .ok_or_else(|| EngineError::OrderNotFound { id: id.to_string() })?;
        if !order.status.is_active() {
            return Err(EngineError::Rejected {
                reason: format!("order {id} is not active"),
            });
        }

        if order.broker != BrokerKind::Paper {
            if let Some(broker_order_id) = &order.broker_order_id {
                let adapter = self.adapters.get(&order.broker).cloned().ok_or(
                    EngineError::UnknownBroker {
                        broker: order.broker,
                    },
                )?;
                adapter.cancel_order(broker_order_id).await?;
            }
        }

        let updated = self
            .orders
            .update(id, |o| o.status = OrderStatus::Cancelled)
            .ok_or_else(|| EngineError::OrderNotFound { id: id.to_string() })?;
        info!(order_id = %id, "order cancelled");
        self.events.order_updated(&updated).await;
        Ok(updated)
    }

    /// Close one open position with an opposite-side market order.
    pub async fn close_position(
        &self,
        broker: BrokerKind,
        symbol: &str,
    ) -> Result<Order, EngineError> {
        let key = PositionKey::new(broker, symbol);
        let position = self
            .positions
            .get(&key)
            .ok_or_else(|| EngineError::PositionNotFound {
                broker,
                symbol: symbol.to_string(),
            })?;

        let spec = OrderSpec::market(symbol, position.side.opposite(), position.quantity, broker)
            .with_price(position.current_price);
        self.submit_order(spec).await
    }

    /// Close every open position; returns how many closed with a fill.
    pub async fn close_all_positions(&self) -> usize {
        let mut closed = 0;
        for position in self.positions.all() {
            match self.close_position(position.broker, &position.symbol).await {
                Ok(order) if order.status == OrderStatus::Filled => closed += 1,
                Ok(_) => {}
                Err(error) => {
                    warn!(symbol = %position.symbol, error = %error, "close failed");
                }
            }
        }
        closed
    }

    /// Buy at market.
    pub async fn buy_market(
        &self,
        symbol: &str,
        quantity: Decimal,
        broker: BrokerKind,
    ) -> Result<Order, EngineError> {
        self.submit_order(OrderSpec::market(symbol, OrderSide::Buy, quantity, broker))
            .await
    }

    /// Sell at market.
    pub async fn sell_market(
        &self,
        symbol: &str,
        quantity: Decimal,
        broker: BrokerKind,
    ) -> Result<Order, EngineError> {
        self.submit_order(OrderSpec::market(symbol, OrderSide::Sell, quantity, broker))
            .await
    }

    /// Buy with a limit order.
    pub async fn buy_limit(
        &self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        broker: BrokerKind,
    ) -> Result<Order, EngineError> {
        self.submit_order(OrderSpec::limit(
            symbol,
            OrderSide::Buy,
            quantity,
            price,
            broker,
        ))
        .await
    }

    /// Sell with a limit order.
    pub async fn sell_limit(
        &self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        broker: BrokerKind,
    ) -> Result<Order, EngineError> {
        self.submit_order(OrderSpec::limit(
            symbol,
            OrderSide::Sell,
            quantity,
            price,
            broker,
        ))
        .await
    }

    /// Fetch one order by engine ID.
    #[must_use]
    pub fn order(&self, id: &str) -> Option<Order> {
        self.orders.get(id)
    }

    /// All orders the engine has seen.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.orders.all()
    }

    /// Orders still working.
    #[must_use]
    pub fn active_orders(&self) -> Vec<Order> {
        self.orders.active()
    }

    /// One open position.
    #[must_use]
    pub fn position(&self, broker: BrokerKind, symbol: &str) -> Option<Position> {
        self.positions.get(&PositionKey::new(broker, symbol))
    }

    /// All open positions.
    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.positions.all()
    }

    /// Realized PnL for the current UTC day.
    #[must_use]
    pub fn daily_pnl(&self) -> Decimal {
        let mut daily = match self.daily.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Self::roll_daily(&mut daily);
        daily.realized
    }

    fn add_daily_pnl(&self, pnl: Decimal) {
        let mut daily = match self.daily.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Self::roll_daily(&mut daily);
        daily.realized += pnl;
    }

    fn roll_daily(daily: &mut DailyPnl) {
        let today = Utc::now().date_naive();
        if today > daily.date {
            daily.date = today;
            daily.realized = Decimal::ZERO;
        }
    }

    /// Balance and activity snapshot.
    #[must_use]
    pub fn account_summary(&self) -> AccountSummary {
        let daily_pnl = self.daily_pnl();
        AccountSummary {
            balance: self.config.initial_balance + daily_pnl,
            daily_pnl,
            open_positions: self.positions.open_count(),
            active_orders: self.orders.active().len(),
        }
    }

    /// Refresh one position's market price and unrealized PnL.
    pub async fn update_price(&self, broker: BrokerKind, symbol: &str, price: Decimal) {
        let key = PositionKey::new(broker, symbol);
        if let Some(position) = self.positions.update_price(&key, price) {
            self.events.position_updated(&position).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MockBroker, ScriptedResponse};
    use crate::events::NoOpEventSink;
    use rust_decimal_macros::dec;

    fn make_engine() -> (Arc<PaperBroker>, ExecutionEngine) {
        let paper = Arc::new(PaperBroker::new());
        let engine = ExecutionEngine::new(EngineConfig::default(), Arc::new(NoOpEventSink))
            .with_adapter(paper.clone());
        (paper, engine)
    }

    #[tokio::test]
    async fn test_market_order_fills_and_opens_position() {
        let (paper, engine) = make_engine();
        paper.set_price("BTCUSDT", dec!(100));

        let order = match engine.buy_market("BTCUSDT", dec!(1), BrokerKind::Paper).await {
            Ok(o) => o,
            Err(e) => panic!("paper market order should fill: {e}"),
        };

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.average_fill_price, Some(dec!(100)));
        let position = match engine.position(BrokerKind::Paper, "BTCUSDT") {
            Some(p) => p,
            None => panic!("fill should open a position"),
        };
        assert_eq!(position.quantity, dec!(1));
        assert_eq!(engine.daily_pnl(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_close_position_realizes_daily_pnl() {
        let (paper, engine) = make_engine();
        paper.set_price("BTCUSDT", dec!(100));
        match engine.buy_market("BTCUSDT", dec!(1), BrokerKind::Paper).await {
            Ok(_) => {}
            Err(e) => panic!("open should fill: {e}"),
        }

        paper.set_price("BTCUSDT", dec!(110));
        let close = match engine.close_position(BrokerKind::Paper, "BTCUSDT").await {
            Ok(o) => o,
            Err(e) => panic!("close should fill: {e}"),
        };

        assert_eq!(close.side, OrderSide::Sell);
        assert!(engine.position(BrokerKind::Paper, "BTCUSDT").is_none());
        assert_eq!(engine.daily_pnl(), dec!(10));
        assert_eq!(engine.account_summary().balance, dec!(10010));
    }

    #[tokio::test]
    async fn test_oversized_order_rejected_before_broker() {
        let (_, engine) = make_engine();
        // 10k balance, 10% cap: 2000 notional must be rejected.
        let spec = OrderSpec::limit("BTCUSDT", OrderSide::Buy, dec!(2), dec!(1000), BrokerKind::Paper);

        let result = engine.submit_order(spec).await;
        let error = match result {
            Err(e) => e,
            Ok(o) => panic!("oversized order should be rejected, got {:?}", o.status),
        };
        assert!(matches!(error, EngineError::Rejected { .. }));

        let stored = &engine.orders()[0];
        assert_eq!(stored.status, OrderStatus::Rejected);
        assert!(stored.error_message.is_some());
    }

    #[tokio::test]
    async fn test_priceless_market_order_skips_value_check() {
        let (paper, engine) = make_engine();
        paper.set_price("BTCUSDT", dec!(100));

        // Quantity alone is not a notional; without a reference price the
        // value check must not fire and the order routes to the broker.
        let order = match engine
            .buy_market("BTCUSDT", dec!(5000), BrokerKind::Paper)
            .await
        {
            Ok(o) => o,
            Err(e) => panic!("priceless market order should route: {e}"),
        };
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.average_fill_price, Some(dec!(100)));
    }

    #[tokio::test]
    async fn test_position_cap_rejects_after_limit() {
        let paper = Arc::new(PaperBroker::new());
        let config = EngineConfig {
            max_open_positions: 1,
            ..EngineConfig::default()
        };
        let engine = ExecutionEngine::new(config, Arc::new(NoOpEventSink))
            .with_adapter(paper.clone());
        paper.set_price("BTCUSDT", dec!(100));
        paper.set_price("ETHUSDT", dec!(10));

        match engine.buy_market("BTCUSDT", dec!(1), BrokerKind::Paper).await {
            Ok(_) => {}
            Err(e) => panic!("first order should fill: {e}"),
        }
        let result = engine.buy_market("ETHUSDT", dec!(1), BrokerKind::Paper).await;
        assert!(matches!(result, Err(EngineError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_broker_error_committed_as_rejected() {
        let mock = Arc::new(MockBroker::new(dec!(100)));
        mock.fail_times(
            1,
            &BrokerError::Transport {
                message: "connection reset".to_string(),
            },
        );
        let engine =
            ExecutionEngine::new(EngineConfig::default(), Arc::new(NoOpEventSink)).with_adapter(mock);

        let result = engine
            .buy_market("BTCUSDT", dec!(1), BrokerKind::Binance)
            .await;
        assert!(matches!(result, Err(EngineError::Broker(_))));

        let stored = &engine.orders()[0];
        assert_eq!(stored.status, OrderStatus::Rejected);
        match &stored.error_message {
            Some(msg) => assert!(msg.contains("connection reset")),
            None => panic!("rejection must carry the broker message"),
        }
    }

    #[tokio::test]
    async fn test_cancel_active_broker_order() {
        let mock = Arc::new(MockBroker::new(dec!(100)));
        mock.push_response(ScriptedResponse::Partial {
            quantity: dec!(0.5),
            price: dec!(100),
        });
        let engine =
            ExecutionEngine::new(EngineConfig::default(), Arc::new(NoOpEventSink)).with_adapter(mock);

        let order = match engine.buy_market("BTCUSDT", dec!(1), BrokerKind::Binance).await {
            Ok(o) => o,
            Err(e) => panic!("partial fill should commit: {e}"),
        };
        assert_eq!(order.status, OrderStatus::PartiallyFilled);

        let cancelled = match engine.cancel_order(&order.id).await {
            Ok(o) => o,
            Err(e) => panic!("cancel should succeed: {e}"),
        };
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let result = engine.cancel_order(&order.id).await;
        assert!(matches!(result, Err(EngineError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_brackets_placed_after_fill() {
        let mock = Arc::new(MockBroker::new(dec!(100)));
        let engine = ExecutionEngine::new(EngineConfig::default(), Arc::new(NoOpEventSink))
            .with_adapter(mock.clone());

        let spec = OrderSpec::market("BTCUSDT", OrderSide::Buy, dec!(1), BrokerKind::Binance)
            .with_stop_loss(dec!(95))
            .with_take_profit(dec!(120));
        match engine.submit_order(spec).await {
            Ok(o) => assert_eq!(o.status, OrderStatus::Filled),
            Err(e) => panic!("entry should fill: {e}"),
        }

        // Parent fill plus two bracket children.
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_unknown_broker_rejected() {
        let engine = ExecutionEngine::new(EngineConfig::default(), Arc::new(NoOpEventSink));
        let result = engine
            .buy_market("BTCUSDT", dec!(1), BrokerKind::Binance)
            .await;
        assert!(matches!(result, Err(EngineError::UnknownBroker { .. })));
    }

    #[tokio::test]
    async fn test_update_price_marks_unrealized() {
        let (paper, engine) = make_engine();
        paper.set_price("BTCUSDT", dec!(100));
        match engine.buy_market("BTCUSDT", dec!(2), BrokerKind::Paper).await {
            Ok(_) => {}
            Err(e) => panic!("open should fill: {e}"),
        }

        engine.update_price(BrokerKind::Paper, "BTCUSDT", dec!(105)).await;
        let position = match engine.position(BrokerKind::Paper, "BTCUSDT") {
            Some(p) => p,
            None => panic!("position should exist"),
        };
        assert_eq!(position.unrealized_pnl, dec!(10));
    }
}
