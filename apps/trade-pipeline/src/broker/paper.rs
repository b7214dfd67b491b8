//! In-process paper broker with instant deterministic fills.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{BrokerAdapter, BrokerError, BrokerFill, BrokerKind, OrderTicket};

/// Paper broker: never leaves the process, fills everything instantly.
///
/// Market orders fill at the price-book price for the symbol, falling back
/// to the ticket's price if the symbol has never been quoted. Limit and
/// triggered orders fill at their own price level, which keeps the paper
/// pipeline fully deterministic for tests and dry runs.
#[derive(Debug, Default)]
pub struct PaperBroker {
    prices: RwLock<HashMap<String, Decimal>>,
    next_id: AtomicU64,
}

impl PaperBroker {
    /// Create a paper broker with an empty price book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the market price used for market fills of `symbol`.
    pub fn set_price(&self, symbol: impl Into<String>, price: Decimal) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(symbol.into(), price);
        }
    }

    fn price_for(&self, symbol: &str) -> Option<Decimal> {
        self.prices
            .read()
            .ok()
            .and_then(|prices| prices.get(symbol).copied())
    }

    fn next_broker_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("PAPER-{n}")
    }

    fn fill_at(&self, ticket: &OrderTicket, price: Option<Decimal>) -> Result<BrokerFill, BrokerError> {
        let fill_price = price.ok_or_else(|| BrokerError::Rejected {
            reason: format!("no price available for {}", ticket.symbol),
        })?;
        Ok(BrokerFill::filled(
            self.next_broker_id(),
            ticket.quantity,
            fill_price,
        ))
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    fn kind(&self) -> BrokerKind {
        BrokerKind::Paper
    }

    async fn place_market_order(&self, ticket: &OrderTicket) -> Result<BrokerFill, BrokerError> {
        let price = self.price_for(&ticket.symbol).or(ticket.price);
        self.fill_at(ticket, price)
    }

    async fn place_limit_order(&self, ticket: &OrderTicket) -> Result<BrokerFill, BrokerError> {
        self.fill_at(ticket, ticket.price)
    }

    async fn place_stop_loss(&self, ticket: &OrderTicket) -> Result<BrokerFill, BrokerError> {
        // Paper brackets are acknowledged as working, not filled.
        let _ = ticket.trigger_price.ok_or_else(|| BrokerError::Rejected {
            reason: "stop-loss requires a trigger price".to_string(),
        })?;
        Ok(BrokerFill::submitted(self.next_broker_id()))
    }

    async fn place_take_profit(&self, ticket: &OrderTicket) -> Result<BrokerFill, BrokerError> {
        let _ = ticket.trigger_price.ok_or_else(|| BrokerError::Rejected {
            reason: "take-profit requires a trigger price".to_string(),
        })?;
        Ok(BrokerFill::submitted(self.next_broker_id()))
    }

    async fn cancel_order(&self, _broker_order_id: &str) -> Result<(), BrokerError> {
        // Paper orders are filled or cancelled instantly; nothing to do.
        Ok(())
    }
}
