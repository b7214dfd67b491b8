//! Execution engine: order lifecycle, broker routing, position ledger.

mod engine;
mod state;

pub use engine::{AccountSummary, EngineConfig, EngineError, ExecutionEngine, OrderSpec};
pub use state::{FillEffect, OrderStore, PositionLedger};
