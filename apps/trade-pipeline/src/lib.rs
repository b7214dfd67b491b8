// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Trade Pipeline - Rust Core Library
//!
//! Signal-to-fill execution pipeline: signals pass through an execution
//! gate (trading modes, approvals, global kill switch), a per-account risk
//! engine (pre-trade checks, sizing, drawdown kill switch), a priority
//! order manager (admission, rate limiting, retries), and an execution
//! engine (broker routing, order lifecycle, position ledger).
//!
//! # Components
//!
//! - [`gate`]: `ExecutionGate` - single entry point for signals
//! - [`risk`]: `RiskEngine` - pre-trade checks and capital preservation
//! - [`scheduler`]: `OrderManager` - priority queues and the worker task
//! - [`execution`]: `ExecutionEngine` - broker routing and position ledger
//! - [`broker`]: the `BrokerAdapter` contract plus paper/mock adapters
//!
//! All money and quantity values are `rust_decimal::Decimal`; all
//! timestamps are UTC.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod broker;
pub mod config;
pub mod events;
pub mod execution;
pub mod gate;
pub mod models;
pub mod risk;
pub mod scheduler;
pub mod telemetry;

pub use broker::{BrokerAdapter, BrokerError, BrokerFill, BrokerKind, OrderTicket, PaperBroker};
pub use config::{ConfigError, PipelineConfig};
pub use events::{EventSink, NoOpEventSink};
pub use execution::{EngineConfig, EngineError, ExecutionEngine, OrderSpec};
pub use gate::{ExecutionGate, ExecutionRequest, ExecutionStatus, GateConfig, TradingMode};
pub use models::{Order, OrderSide, OrderStatus, OrderType, Position, Signal, SignalDirection};
pub use risk::{RiskCheckResult, RiskConfig, RiskEngine, TradeProfile};
pub use scheduler::{OrderManager, OrderPriority, OrderRequest, SchedulerConfig, SchedulerError};
