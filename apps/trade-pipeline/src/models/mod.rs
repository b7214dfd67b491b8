//! Core data types shared across the pipeline.

mod order;
mod position;
mod signal;

pub use order::{Order, OrderSide, OrderStatus, OrderType};
pub use position::{Position, PositionKey};
pub use signal::{Signal, SignalDirection};
