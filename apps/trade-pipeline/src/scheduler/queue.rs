//! Priority queues, admission control, and completion history.

use std::collections::{HashMap, HashSet, VecDeque};

use super::types::{CompletionRecord, OrderPriority, OrderRequest, QueueStatus, SchedulerError};

/// History trims to this many newest records when it exceeds twice as many.
const HISTORY_KEEP: usize = 500;
const HISTORY_LIMIT: usize = 1000;

/// All queue state, guarded by a single mutex in the order manager.
///
/// A request is "pending" from admission until completion, which spans its
/// time in a queue and in flight at the engine. The per-symbol counters
/// track pending requests, so retries never double-count.
#[derive(Debug, Default)]
pub(super) struct DispatchQueues {
    queues: [VecDeque<OrderRequest>; 4],
    pending: HashMap<String, OrderRequest>,
    cancelled: HashSet<String>,
    active_symbols: HashMap<String, usize>,
    history: Vec<CompletionRecord>,
}

impl DispatchQueues {
    /// Admit a new request, enforcing the total and per-symbol caps.
    ///
    /// A failed admission leaves every structure untouched.
    pub(super) fn enqueue(
        &mut self,
        request: OrderRequest,
        max_queue_size: usize,
        max_orders_per_symbol: usize,
    ) -> Result<(), SchedulerError> {
        let total: usize = self.queues.iter().map(VecDeque::len).sum();
        if total >= max_queue_size {
            return Err(SchedulerError::QueueFull {
                capacity: max_queue_size,
            });
        }

        let symbol_count = self.active_symbols.get(&request.symbol).copied().unwrap_or(0);
        if symbol_count >= max_orders_per_symbol {
            return Err(SchedulerError::SymbolLimit {
                symbol: request.symbol.clone(),
                limit: max_orders_per_symbol,
            });
        }

        *self.active_symbols.entry(request.symbol.clone()).or_insert(0) += 1;
        self.pending.insert(request.id.clone(), request.clone());
        self.queues[request.priority.index()].push_back(request);
        Ok(())
    }

    /// Put a retried request back at the tail of its priority queue.
    ///
    /// No admission checks: the request is still pending and already
    /// counted against its symbol.
    pub(super) fn requeue(&mut self, request: OrderRequest) {
        self.pending.insert(request.id.clone(), request.clone());
        self.queues[request.priority.index()].push_back(request);
    }

    /// Pop the next request, strictly by priority, FIFO within one level.
    pub(super) fn pop_next(&mut self) -> Option<OrderRequest> {
        self.queues.iter_mut().find_map(VecDeque::pop_front)
    }

    /// Consume a cancellation mark for `id`, if one exists.
    pub(super) fn take_cancelled(&mut self, id: &str) -> bool {
        self.cancelled.remove(id)
    }

    /// Mark one pending request for cancellation at dequeue.
    pub(super) fn mark_cancelled(&mut self, id: &str) -> bool {
        if self.pending.contains_key(id) {
            self.cancelled.insert(id.to_string());
            true
        } else {
            false
        }
    }

    /// Mark every pending request (optionally for one symbol); returns how
    /// many were marked.
    pub(super) fn mark_all_cancelled(&mut self, symbol: Option<&str>) -> usize {
        let mut marked = 0;
        for request in self.pending.values() {
            if symbol.is_none_or(|s| s == request.symbol) && self.cancelled.insert(request.id.clone())
            {
                marked += 1;
            }
        }
        marked
    }

    /// Drop a finished request from pending state and its symbol counter.
    pub(super) fn finish(&mut self, request: &OrderRequest) {
        self.pending.remove(&request.id);
        self.cancelled.remove(&request.id);
        if let Some(count) = self.active_symbols.get_mut(&request.symbol) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.active_symbols.remove(&request.symbol);
            }
        }
    }

    /// Append a completion record, trimming old history past the limit.
    pub(super) fn record(&mut self, record: CompletionRecord) {
        self.history.push(record);
        if self.history.len() > HISTORY_LIMIT {
            self.history.drain(..self.history.len() - HISTORY_KEEP);
        }
    }

    /// The newest `limit` completion records, oldest first.
    pub(super) fn recent_history(&self, limit: usize) -> Vec<CompletionRecord> {
        let start = self.history.len().saturating_sub(limit);
        self.history[start..].to_vec()
    }

    /// All pending requests, in no particular order.
    pub(super) fn pending_requests(&self) -> Vec<OrderRequest> {
        self.pending.values().cloned().collect()
    }

    pub(super) fn status(&self) -> QueueStatus {
        QueueStatus {
            total_pending: self.pending.len(),
            urgent: self.queues[OrderPriority::Urgent.index()].len(),
            high: self.queues[OrderPriority::High.index()].len(),
            normal: self.queues[OrderPriority::Normal.index()].len(),
            low: self.queues[OrderPriority::Low.index()].len(),
            active_symbols: self.active_symbols.clone(),
        }
    }
}
