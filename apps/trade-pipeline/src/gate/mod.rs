//! Execution gate: trading modes, approvals, and the global kill switch.

mod core;
mod types;

pub use core::ExecutionGate;
pub use types::{
    ExecutionRequest, ExecutionStatus, GateConfig, GateError, GateStatus, TradingMode,
};
