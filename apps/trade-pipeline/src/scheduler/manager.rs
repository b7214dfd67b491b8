//! Order manager: worker loop, rate limiting, retries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::queue::DispatchQueues;
use super::types::{
    CompletionOutcome, CompletionRecord, OrderPriority, OrderRequest, QueueStatus, SchedulerError,
};
use crate::broker::BrokerKind;
use crate::events::EventSink;
use crate::execution::ExecutionEngine;
use crate::models::{OrderSide, OrderType};

/// Order manager tuning knobs. Intervals are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Total queued requests allowed across all priorities.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Active (queued or in-flight) requests allowed per symbol.
    #[serde(default = "default_max_orders_per_symbol")]
    pub max_orders_per_symbol: usize,
    /// Worker tick interval.
    #[serde(default = "default_processing_interval_ms")]
    pub processing_interval_ms: u64,
    /// Minimum spacing between submissions for one symbol.
    #[serde(default = "default_min_order_interval_ms")]
    pub min_order_interval_ms: u64,
    /// Fixed delay before a retry is re-queued.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

const fn default_max_queue_size() -> usize {
    100
}

const fn default_max_orders_per_symbol() -> usize {
    3
}

const fn default_processing_interval_ms() -> u64 {
    100
}

const fn default_min_order_interval_ms() -> u64 {
    1000
}

const fn default_retry_backoff_ms() -> u64 {
    1000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            max_orders_per_symbol: default_max_orders_per_symbol(),
            processing_interval_ms: default_processing_interval_ms(),
            min_order_interval_ms: default_min_order_interval_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Admits, prioritizes, rate-limits, and retries order requests.
///
/// One tokio worker task drains the queues strictly by priority.
/// Cancellation and expiry are observed when a request is dequeued, so
/// every admitted request eventually lands in the completion history
/// exactly once.
pub struct OrderManager {
    config: SchedulerConfig,
    engine: Arc<ExecutionEngine>,
    state: Mutex<DispatchQueues>,
    last_submission: Mutex<HashMap<String, Instant>>,
    events: Arc<dyn EventSink>,
    shutdown: CancellationToken,
}

impl OrderManager {
    /// Create a manager dispatching into `engine`.
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        engine: Arc<ExecutionEngine>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            engine,
            state: Mutex::new(DispatchQueues::default()),
            last_submission: Mutex::new(HashMap::new()),
            events,
            shutdown: CancellationToken::new(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, DispatchQueues> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Spawn the worker task; returns its handle.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        info!(
            interval_ms = manager.config.processing_interval_ms,
            "order manager started"
        );
        tokio::spawn(async move {
            let mut tick =
                tokio::time::interval(Duration::from_millis(manager.config.processing_interval_ms));
            loop {
                tokio::select! {
                    () = manager.shutdown.cancelled() => {
                        info!("order manager stopped");
                        break;
                    }
                    _ = tick.tick() => {
                        manager.drain().await;
                    }
                }
            }
        })
    }

    /// Signal the worker task to stop after its current request.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Queue a request; admission control only, no execution here.
    pub fn submit(&self, request: OrderRequest) -> Result<String, SchedulerError> {
        let id = request.id.clone();
        let symbol = request.symbol.clone();
        self.lock_state().enqueue(
            request,
            self.config.max_queue_size,
            self.config.max_orders_per_symbol,
        )?;
        info!(request_id = %id, symbol = %symbol, "order request queued");
        Ok(id)
    }

    /// Mark one pending request for cancellation.
    ///
    /// Observed when the worker dequeues it; returns false for unknown or
    /// already-completed ids.
    pub fn cancel(&self, id: &str) -> bool {
        let marked = self.lock_state().mark_cancelled(id);
        if marked {
            info!(request_id = %id, "order request marked for cancellation");
        }
        marked
    }

    /// Mark all pending requests (optionally one symbol's) for cancellation.
    pub fn cancel_all(&self, symbol: Option<&str>) -> usize {
        let marked = self.lock_state().mark_all_cancelled(symbol);
        info!(count = marked, "order requests marked for cancellation");
        marked
    }

    /// Close an open position at `Urgent` priority with a 30-second TTL.
    pub fn emergency_close(
        &self,
        broker: BrokerKind,
        symbol: &str,
    ) -> Result<String, SchedulerError> {
        let position =
            self.engine
                .position(broker, symbol)
                .ok_or_else(|| SchedulerError::PositionNotFound {
                    broker,
                    symbol: symbol.to_string(),
                })?;

        let request = OrderRequest::market(symbol, position.side.opposite(), position.quantity, broker)
            .with_priority(OrderPriority::Urgent)
            .with_ttl(Some(chrono::Duration::seconds(30)));
        warn!(symbol = %symbol, broker = %broker, "emergency close queued");
        self.submit(request)
    }

    /// Queue an entry whose fill places bracket stop/target children.
    ///
    /// A limit entry when `entry_price` is given, market otherwise; always
    /// `High` priority.
    pub fn submit_bracket(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        entry_price: Option<Decimal>,
        stop_loss: Decimal,
        take_profit: Decimal,
        broker: BrokerKind,
    ) -> Result<String, SchedulerError> {
        let request = match entry_price {
            Some(price) => OrderRequest::limit(symbol, side, quantity, price, broker),
            None => OrderRequest::market(symbol, side, quantity, broker),
        }
        .with_priority(OrderPriority::High)
        .with_stop_loss(stop_loss)
        .with_take_profit(take_profit);
        self.submit(request)
    }

    /// Split a target quantity into equal Normal-priority tranches.
    ///
    /// The last tranche carries the division remainder so the quantities
    /// always sum to `total_quantity`.
    pub fn scale_in(
        &self,
        symbol: &str,
        side: OrderSide,
        total_quantity: Decimal,
        tranches: u32,
        price: Option<Decimal>,
        broker: BrokerKind,
    ) -> Result<Vec<String>, SchedulerError> {
        if tranches == 0 {
            return Err(SchedulerError::InvalidTranches);
        }

        let per_tranche = total_quantity / Decimal::from(tranches);
        let mut ids = Vec::with_capacity(tranches as usize);
        for i in 0..tranches {
            let quantity = if i == tranches - 1 {
                total_quantity - per_tranche * Decimal::from(tranches - 1)
            } else {
                per_tranche
            };
            let request = match price {
                Some(p) => OrderRequest::limit(symbol, side, quantity, p, broker),
                None => OrderRequest::market(symbol, side, quantity, broker),
            };
            ids.push(self.submit(request)?);
        }
        Ok(ids)
    }

    /// Queue depths and per-symbol activity.
    #[must_use]
    pub fn queue_status(&self) -> QueueStatus {
        self.lock_state().status()
    }

    /// The newest `limit` completion records, oldest first.
    #[must_use]
    pub fn completion_history(&self, limit: usize) -> Vec<CompletionRecord> {
        self.lock_state().recent_history(limit)
    }

    /// Requests admitted but not yet completed.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<OrderRequest> {
        self.lock_state().pending_requests()
    }

    async fn drain(&self) {
        loop {
            let (request, cancelled) = {
                let mut state = self.lock_state();
                match state.pop_next() {
                    Some(request) => {
                        let cancelled = state.take_cancelled(&request.id);
                        (request, cancelled)
                    }
                    None => break,
                }
            };

            if cancelled {
                self.complete(request, CompletionOutcome::Cancelled).await;
            } else {
                self.process(request).await;
            }
        }
    }

    async fn process(&self, mut request: OrderRequest) {
        if request.is_expired(Utc::now()) {
            self.complete(
                request,
                CompletionOutcome::Failed {
                    error: "order expired".to_string(),
                },
            )
            .await;
            return;
        }

        self.respect_rate_limit(&request.symbol).await;

        let result = self.engine.submit_order(request.to_order_spec()).await;
        self.note_submission(&request.symbol);

        match result {
            Ok(order) => {
                self.complete(
                    request,
                    CompletionOutcome::Succeeded {
                        order_id: order.id,
                        broker_order_id: order.broker_order_id,
                        status: order.status,
                        fill_price: order.average_fill_price,
                        fill_quantity: order.filled_quantity,
                    },
                )
                .await;
            }
            Err(err) if err.is_retryable() && request.retry_count < request.max_retries => {
                request.retry_count += 1;
                warn!(
                    request_id = %request.id,
                    retry = request.retry_count,
                    max_retries = request.max_retries,
                    error = %err,
                    "order failed; retrying"
                );
                tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
                self.lock_state().requeue(request);
            }
            Err(err) => {
                self.complete(
                    request,
                    CompletionOutcome::Failed {
                        error: err.to_string(),
                    },
                )
                .await;
            }
        }
    }

    async fn respect_rate_limit(&self, symbol: &str) {
        let remaining = {
            let last = match self.last_submission.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            last.get(symbol).and_then(|instant| {
                Duration::from_millis(self.config.min_order_interval_ms)
                    .checked_sub(instant.elapsed())
            })
        };

        if let Some(remaining) = remaining {
            tokio::time::sleep(remaining).await;
        }
    }

    fn note_submission(&self, symbol: &str) {
        let mut last = match self.last_submission.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        last.insert(symbol.to_string(), Instant::now());
    }

    async fn complete(&self, request: OrderRequest, outcome: CompletionOutcome) {
        let record = CompletionRecord {
            id: request.id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            outcome,
            retry_count: request.retry_count,
            completed_at: Utc::now(),
        };

        {
            let mut state = self.lock_state();
            state.finish(&request);
            state.record(record.clone());
        }

        match &record.outcome {
            CompletionOutcome::Succeeded { order_id, .. } => {
                info!(request_id = %record.id, order_id = %order_id, "order request completed");
            }
            CompletionOutcome::Failed { error } => {
                error!(request_id = %record.id, error = %error, "order request failed");
            }
            CompletionOutcome::Cancelled => {
                info!(request_id = %record.id, "order request cancelled");
            }
        }

        self.events.order_completed(&record).await;
    }
}
