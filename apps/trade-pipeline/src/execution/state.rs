//! Lock-protected order and position state.
//!
//! Both stores keep critical sections short: callers snapshot, release, do
//! broker I/O, then re-acquire to commit. Lock poisoning degrades to the
//! inner value rather than propagating a panic.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{Order, OrderSide, Position, PositionKey};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// All orders the engine has seen, keyed by engine order ID.
#[derive(Debug, Default)]
pub struct OrderStore {
    orders: RwLock<HashMap<String, Order>>,
}

impl OrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an order.
    pub fn insert(&self, order: Order) {
        write(&self.orders).insert(order.id.clone(), order);
    }

    /// Fetch a clone of an order.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Order> {
        read(&self.orders).get(id).cloned()
    }

    /// Mutate an order in place; returns the updated clone.
    pub fn update(&self, id: &str, mutate: impl FnOnce(&mut Order)) -> Option<Order> {
        let mut orders = write(&self.orders);
        let order = orders.get_mut(id)?;
        mutate(order);
        order.updated_at = chrono::Utc::now();
        Some(order.clone())
    }

    /// All orders, in no particular order.
    #[must_use]
    pub fn all(&self) -> Vec<Order> {
        read(&self.orders).values().cloned().collect()
    }

    /// Orders still in an active (non-terminal) status.
    #[must_use]
    pub fn active(&self) -> Vec<Order> {
        read(&self.orders)
            .values()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect()
    }
}

/// What a fill did to the ledger.
#[derive(Debug, Clone)]
pub struct FillEffect {
    /// The position after the fill; `None` when the fill closed it.
    pub position: Option<Position>,
    /// PnL realized by this fill (full closes only).
    pub realized_pnl: Decimal,
    /// Whether the fill removed the position from the ledger.
    pub closed: bool,
}

/// Open positions keyed by (broker, symbol).
#[derive(Debug, Default)]
pub struct PositionLedger {
    positions: RwLock<HashMap<PositionKey, Position>>,
}

impl PositionLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a filled order into the ledger.
    ///
    /// Same-side fills grow the position and re-weight its entry price.
    /// Opposite fills at or above the open quantity close it and realize
    /// `(fill - entry) * quantity` (sign-flipped for shorts); smaller
    /// opposite fills reduce quantity and leave the entry price untouched.
    pub fn apply_fill(&self, order: &Order) -> FillEffect {
        let fill_price = order
            .average_fill_price
            .unwrap_or(order.price.unwrap_or_default());
        let fill_qty = if order.filled_quantity.is_zero() {
            order.quantity
        } else {
            order.filled_quantity
        };
        let key = PositionKey::new(order.broker, order.symbol.clone());

        let mut positions = write(&self.positions);
        match positions.get_mut(&key) {
            Some(position) if position.side == order.side => {
                let total = position.quantity + fill_qty;
                position.entry_price = (position.entry_price * position.quantity
                    + fill_price * fill_qty)
                    / total;
                position.quantity = total;
                position.mark_price(fill_price);
                FillEffect {
                    position: Some(position.clone()),
                    realized_pnl: Decimal::ZERO,
                    closed: false,
                }
            }
            Some(position) if fill_qty >= position.quantity => {
                let mut realized = (fill_price - position.entry_price) * position.quantity;
                if position.side == OrderSide::Sell {
                    realized = -realized;
                }
                debug!(
                    symbol = %order.symbol,
                    realized_pnl = %realized,
                    "position closed"
                );
                positions.remove(&key);
                FillEffect {
                    position: None,
                    realized_pnl: realized,
                    closed: true,
                }
            }
            Some(position) => {
                // Partial close: entry price and realized PnL are untouched.
                position.quantity -= fill_qty;
                position.mark_price(fill_price);
                FillEffect {
                    position: Some(position.clone()),
                    realized_pnl: Decimal::ZERO,
                    closed: false,
                }
            }
            None => {
                let position = Position {
                    symbol: order.symbol.clone(),
                    side: order.side,
                    quantity: fill_qty,
                    entry_price: fill_price,
                    current_price: fill_price,
                    unrealized_pnl: Decimal::ZERO,
                    realized_pnl: Decimal::ZERO,
                    stop_loss: order.stop_loss,
                    take_profit: order.take_profit,
                    broker: order.broker,
                    opened_at: chrono::Utc::now(),
                };
                positions.insert(key, position.clone());
                FillEffect {
                    position: Some(position),
                    realized_pnl: Decimal::ZERO,
                    closed: false,
                }
            }
        }
    }

    /// Fetch a clone of one position.
    #[must_use]
    pub fn get(&self, key: &PositionKey) -> Option<Position> {
        read(&self.positions).get(key).cloned()
    }

    /// All open positions.
    #[must_use]
    pub fn all(&self) -> Vec<Position> {
        read(&self.positions).values().cloned().collect()
    }

    /// Number of open positions.
    #[must_use]
    pub fn open_count(&self) -> usize {
        read(&self.positions).len()
    }

    /// Refresh one position's market price; returns the updated clone.
    pub fn update_price(&self, key: &PositionKey, price: Decimal) -> Option<Position> {
        let mut positions = write(&self.positions);
        let position = positions.get_mut(key)?;
        position.mark_price(price);
        Some(position.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerKind;
    use crate::models::{OrderStatus, OrderType};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn make_fill(side: OrderSide, quantity: Decimal, price: Decimal) -> Order {
        Order {
            id: Order::generate_id(),
            symbol: "BTCUSDT".to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            stop_loss: None,
            take_profit: None,
            status: OrderStatus::Filled,
            filled_quantity: quantity,
            average_fill_price: Some(price),
            broker_order_id: None,
            broker: BrokerKind::Paper,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            error_message: None,
        }
    }

    #[test]
    fn test_new_position_opens_at_fill_price() {
        let ledger = PositionLedger::new();
        let effect = ledger.apply_fill(&make_fill(OrderSide::Buy, dec!(1), dec!(100)));

        let position = match effect.position {
            Some(p) => p,
            None => panic!("fill should open a position"),
        };
        assert_eq!(position.quantity, dec!(1));
        assert_eq!(position.entry_price, dec!(100));
        assert_eq!(ledger.open_count(), 1);
    }

    #[test]
    fn test_same_side_fill_reweights_entry() {
        let ledger = PositionLedger::new();
        ledger.apply_fill(&make_fill(OrderSide::Buy, dec!(1), dec!(100)));
        let effect = ledger.apply_fill(&make_fill(OrderSide::Buy, dec!(1), dec!(110)));

        let position = match effect.position {
            Some(p) => p,
            None => panic!("add should keep the position open"),
        };
        assert_eq!(position.quantity, dec!(2));
        assert_eq!(position.entry_price, dec!(105));
    }

    #[test]
    fn test_partial_close_keeps_entry_and_realizes_nothing() {
        let ledger = PositionLedger::new();
        ledger.apply_fill(&make_fill(OrderSide::Buy, dec!(1), dec!(100)));
        let effect = ledger.apply_fill(&make_fill(OrderSide::Sell, dec!(0.4), dec!(110)));

        assert!(!effect.closed);
        assert_eq!(effect.realized_pnl, Decimal::ZERO);
        let position = match effect.position {
            Some(p) => p,
            None => panic!("partial close should keep the position"),
        };
        assert_eq!(position.quantity, dec!(0.6));
        assert_eq!(position.entry_price, dec!(100));
    }

    #[test]
    fn test_full_close_realizes_long_pnl() {
        let ledger = PositionLedger::new();
        ledger.apply_fill(&make_fill(OrderSide::Buy, dec!(2), dec!(100)));
        let effect = ledger.apply_fill(&make_fill(OrderSide::Sell, dec!(2), dec!(110)));

        assert!(effect.closed);
        assert_eq!(effect.realized_pnl, dec!(20));
        assert_eq!(ledger.open_count(), 0);
    }

    #[test]
    fn test_full_close_flips_sign_for_short() {
        let ledger = PositionLedger::new();
        ledger.apply_fill(&make_fill(OrderSide::Sell, dec!(2), dec!(100)));
        let effect = ledger.apply_fill(&make_fill(OrderSide::Buy, dec!(2), dec!(110)));

        assert!(effect.closed);
        assert_eq!(effect.realized_pnl, dec!(-20));
    }

    #[test]
    fn test_overfill_closes_at_open_quantity() {
        let ledger = PositionLedger::new();
        ledger.apply_fill(&make_fill(OrderSide::Buy, dec!(1), dec!(100)));
        let effect = ledger.apply_fill(&make_fill(OrderSide::Sell, dec!(3), dec!(110)));

        assert!(effect.closed);
        // Realized against the open quantity, not the fill quantity.
        assert_eq!(effect.realized_pnl, dec!(10));
    }

    #[test]
    fn test_order_store_update_touches_timestamp() {
        let store = OrderStore::new();
        let order = make_fill(OrderSide::Buy, dec!(1), dec!(100));
        let id = order.id.clone();
        store.insert(order);

        let updated = store.update(&id, |o| o.status = OrderStatus::Cancelled);
        match updated {
            Some(o) => assert_eq!(o.status, OrderStatus::Cancelled),
            None => panic!("order should exist"),
        }
        assert!(store.active().is_empty());
    }
}
