//! Scriptable broker for tests.
//!
//! Exposed from the library (not behind `cfg(test)`) so integration tests
//! can drive failure and partial-fill scenarios against the real pipeline.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{BrokerAdapter, BrokerError, BrokerFill, BrokerKind, OrderTicket};

/// One scripted adapter response.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Fill the full quantity at the given price.
    Fill(Decimal),
    /// Fill only part of the quantity at the given price.
    Partial {
        /// Quantity to report filled.
        quantity: Decimal,
        /// Fill price.
        price: Decimal,
    },
    /// Fail with the given error.
    Fail(BrokerError),
}

/// Broker whose responses are scripted ahead of time.
///
/// When the script runs out, every order fills at the default price.
#[derive(Debug)]
pub struct MockBroker {
    kind: BrokerKind,
    script: Mutex<VecDeque<ScriptedResponse>>,
    default_price: Decimal,
    calls: AtomicU64,
    next_id: AtomicU64,
}

impl MockBroker {
    /// Create a mock broker that fills everything at `default_price`.
    #[must_use]
    pub fn new(default_price: Decimal) -> Self {
        Self {
            kind: BrokerKind::Binance,
            script: Mutex::new(VecDeque::new()),
            default_price,
            calls: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// Override which broker this mock pretends to be.
    #[must_use]
    pub const fn with_kind(mut self, kind: BrokerKind) -> Self {
        self.kind = kind;
        self
    }

    /// Append a scripted response consumed by the next placement call.
    pub fn push_response(&self, response: ScriptedResponse) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(response);
        }
    }

    /// Script `n` consecutive failures with the given error.
    pub fn fail_times(&self, n: usize, error: &BrokerError) {
        for _ in 0..n {
            self.push_response(ScriptedResponse::Fail(error.clone()));
        }
    }

    /// Number of placement calls made so far.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn respond(&self, ticket: &OrderTicket) -> Result<BrokerFill, BrokerError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let scripted = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let broker_order_id = format!("MOCK-{id}");

        match scripted {
            Some(ScriptedResponse::Fill(price)) => {
                Ok(BrokerFill::filled(broker_order_id, ticket.quantity, price))
            }
            Some(ScriptedResponse::Partial { quantity, price }) => Ok(BrokerFill {
                broker_order_id,
                status: crate::models::OrderStatus::PartiallyFilled,
                filled_quantity: quantity,
                average_price: Some(price),
            }),
            Some(ScriptedResponse::Fail(error)) => Err(error),
            None => Ok(BrokerFill::filled(
                broker_order_id,
                ticket.quantity,
                self.default_price,
            )),
        }
    }
}

#[async_trait]
impl BrokerAdapter for MockBroker {
    fn kind(&self) -> BrokerKind {
        self.kind
    }

    async fn place_market_order(&self, ticket: &OrderTicket) -> Result<BrokerFill, BrokerError> {
        self.respond(ticket)
    }

    async fn place_limit_order(&self, ticket: &OrderTicket) -> Result<BrokerFill, BrokerError> {
        self.respond(ticket)
    }

    async fn place_stop_loss(&self, ticket: &OrderTicket) -> Result<BrokerFill, BrokerError> {
        self.respond(ticket)
    }

    async fn place_take_profit(&self, ticket: &OrderTicket) -> Result<BrokerFill, BrokerError> {
        self.respond(ticket)
    }

    async fn cancel_order(&self, _broker_order_id: &str) -> Result<(), BrokerError> {
        Ok(())
    }
}
