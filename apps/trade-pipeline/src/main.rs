//! Trade Pipeline Binary
//!
//! Wires a paper-trading pipeline end to end and runs one signal through
//! it: gate -> risk engine -> order manager -> execution engine.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trade-pipeline [config.yaml]
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log level (default: info)

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use trade_pipeline::broker::{BrokerKind, PaperBroker};
use trade_pipeline::events::{EventSink, NoOpEventSink};
use trade_pipeline::execution::ExecutionEngine;
use trade_pipeline::gate::{ExecutionGate, GateConfig, TradingMode};
use trade_pipeline::models::{Signal, SignalDirection};
use trade_pipeline::risk::RiskEngine;
use trade_pipeline::scheduler::OrderManager;
use trade_pipeline::telemetry::init_tracing;
use trade_pipeline::PipelineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = PipelineConfig::load(config_path.as_deref().map(Path::new))?;

    let events: Arc<dyn EventSink> = Arc::new(NoOpEventSink);

    let paper = Arc::new(PaperBroker::new());
    paper.set_price("BTCUSDT", dec!(45000));

    let engine = Arc::new(
        ExecutionEngine::new(config.engine.clone(), Arc::clone(&events))
            .with_adapter(paper.clone()),
    );
    let scheduler = Arc::new(OrderManager::new(
        config.scheduler.clone(),
        Arc::clone(&engine),
        Arc::clone(&events),
    ));
    let risk = Arc::new(RiskEngine::new(
        config.account_id.clone(),
        config.risk.clone(),
        Arc::clone(&events),
    ));
    risk.initialize_equity(config.engine.initial_balance);

    // Demo runs full-auto regardless of the configured default mode.
    let gate = ExecutionGate::new(
        GateConfig {
            mode: TradingMode::AiFullAuto,
        },
        Arc::clone(&risk),
        Arc::clone(&scheduler),
        Arc::clone(&events),
    );

    let worker = scheduler.start();

    let signal = Signal::new(
        "BTCUSDT",
        SignalDirection::Buy,
        dec!(82),
        dec!(45000),
        dec!(44000),
        dec!(47000),
    );
    let request = gate
        .process_signal(signal, &config.account_id, BrokerKind::Paper, None, 1)
        .await;
    tracing::info!(
        request_id = %request.id,
        status = ?request.status,
        size = %request.position_size,
        "signal processed"
    );

    // Let the worker drain the queue, then report and stop.
    tokio::time::sleep(Duration::from_millis(500)).await;
    for record in scheduler.completion_history(10) {
        tracing::info!(
            request_id = %record.id,
            success = record.is_success(),
            retries = record.retry_count,
            "completion"
        );
    }
    let summary = engine.account_summary();
    tracing::info!(
        balance = %summary.balance,
        open_positions = summary.open_positions,
        "account summary"
    );

    scheduler.shutdown();
    worker.await?;
    Ok(())
}
