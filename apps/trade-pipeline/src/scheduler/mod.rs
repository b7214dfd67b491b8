//! Priority order scheduling between the gate and the execution engine.

mod manager;
mod queue;
mod types;

pub use manager::{OrderManager, SchedulerConfig};
pub use types::{
    CompletionOutcome, CompletionRecord, OrderPriority, OrderRequest, QueueStatus, SchedulerError,
};
