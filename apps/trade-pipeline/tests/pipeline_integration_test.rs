//! End-to-end pipeline tests: gate -> risk -> order manager -> engine.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use trade_pipeline::broker::{BrokerError, BrokerKind, MockBroker, PaperBroker};
use trade_pipeline::events::{EventSink, NoOpEventSink};
use trade_pipeline::execution::{EngineConfig, ExecutionEngine};
use trade_pipeline::gate::{ExecutionGate, ExecutionStatus, GateConfig, TradingMode};
use trade_pipeline::models::{OrderSide, Signal, SignalDirection};
use trade_pipeline::risk::{RiskConfig, RiskEngine};
use trade_pipeline::scheduler::{
    CompletionOutcome, CompletionRecord, OrderManager, OrderRequest, SchedulerConfig,
};

struct Pipeline {
    paper: Arc<PaperBroker>,
    engine: Arc<ExecutionEngine>,
    scheduler: Arc<OrderManager>,
    gate: ExecutionGate,
}

fn fast_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        processing_interval_ms: 10,
        min_order_interval_ms: 0,
        retry_backoff_ms: 10,
        ..SchedulerConfig::default()
    }
}

fn make_pipeline(mode: TradingMode) -> Pipeline {
    let events: Arc<dyn EventSink> = Arc::new(NoOpEventSink);
    let paper = Arc::new(PaperBroker::new());
    let engine = Arc::new(
        ExecutionEngine::new(EngineConfig::default(), Arc::clone(&events))
            .with_adapter(paper.clone()),
    );
    let scheduler = Arc::new(OrderManager::new(
        fast_scheduler_config(),
        Arc::clone(&engine),
        Arc::clone(&events),
    ));
    let risk = Arc::new(RiskEngine::new(
        "acct-1",
        RiskConfig::default(),
        Arc::clone(&events),
    ));
    risk.initialize_equity(dec!(10000));
    let gate = ExecutionGate::new(
        GateConfig { mode },
        risk,
        Arc::clone(&scheduler),
        events,
    );
    Pipeline {
        paper,
        engine,
        scheduler,
        gate,
    }
}

fn make_signal(direction: SignalDirection) -> Signal {
    Signal::new("BTCUSDT", direction, dec!(80), dec!(100), dec!(95), dec!(110))
}

async fn wait_for_completions(scheduler: &OrderManager, count: usize) -> Vec<CompletionRecord> {
    for _ in 0..300 {
        let history = scheduler.completion_history(50);
        if history.len() >= count {
            return history;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "timed out waiting for {count} completions, have {}",
        scheduler.completion_history(50).len()
    );
}

// Balance 10000 risked at 1% over a 5-point stop sizes to 20 units
// (risk amount 100) when the notional cap leaves room.
#[test]
fn position_sizing_from_balance_and_stop() {
    let config = RiskConfig {
        max_position_size_pct: dec!(25),
        ..RiskConfig::default()
    };
    let risk = RiskEngine::new("acct-1", config, Arc::new(NoOpEventSink));

    let sizing = match risk.calculate_position_size(dec!(10000), dec!(100), dec!(95), Some(dec!(1)))
    {
        Ok(s) => s,
        Err(e) => panic!("sizing should succeed: {e}"),
    };
    assert_eq!(sizing.size, dec!(20));
    assert_eq!(sizing.risk_amount, dec!(100));
    assert!(!sizing.capped);
}

#[tokio::test]
async fn hold_signals_are_rejected_in_every_mode() {
    for mode in [
        TradingMode::Manual,
        TradingMode::AiAssisted,
        TradingMode::AiFullAuto,
        TradingMode::PaperTrading,
    ] {
        let pipeline = make_pipeline(mode);
        let request = pipeline
            .gate
            .process_signal(
                make_signal(SignalDirection::Hold),
                "acct-1",
                BrokerKind::Paper,
                Some(dec!(1)),
                1,
            )
            .await;

        assert_eq!(request.status, ExecutionStatus::Rejected, "mode {mode:?}");
        assert_eq!(request.rejection_reason(), Some("HOLD signal - no action"));
    }
}

// Two transient broker failures, then success: the request completes as
// succeeded with both retries recorded.
#[tokio::test]
async fn transient_failures_retry_until_success() {
    let events: Arc<dyn EventSink> = Arc::new(NoOpEventSink);
    let mock = Arc::new(MockBroker::new(dec!(100)));
    mock.fail_times(
        2,
        &BrokerError::Timeout {
            message: "broker busy".to_string(),
        },
    );
    let engine = Arc::new(
        ExecutionEngine::new(EngineConfig::default(), Arc::clone(&events))
            .with_adapter(mock.clone()),
    );
    let scheduler = Arc::new(OrderManager::new(
        fast_scheduler_config(),
        engine,
        events,
    ));
    let worker = scheduler.start();

    let request = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(1), BrokerKind::Binance)
        .with_max_retries(2);
    match scheduler.submit(request) {
        Ok(_) => {}
        Err(e) => panic!("submit should be admitted: {e}"),
    }

    let history = wait_for_completions(&scheduler, 1).await;
    let record = &history[0];
    assert!(record.is_success(), "outcome: {:?}", record.outcome);
    assert_eq!(record.retry_count, 2);
    assert_eq!(mock.call_count(), 3);

    scheduler.shutdown();
    let _ = worker.await;
}

// Exhausting the retry budget fails the request with the last error.
#[tokio::test]
async fn retry_budget_exhaustion_fails_the_request() {
    let events: Arc<dyn EventSink> = Arc::new(NoOpEventSink);
    let mock = Arc::new(MockBroker::new(dec!(100)));
    mock.fail_times(
        3,
        &BrokerError::Timeout {
            message: "broker busy".to_string(),
        },
    );
    let engine = Arc::new(
        ExecutionEngine::new(EngineConfig::default(), Arc::clone(&events)).with_adapter(mock),
    );
    let scheduler = Arc::new(OrderManager::new(
        fast_scheduler_config(),
        engine,
        events,
    ));
    let worker = scheduler.start();

    let request = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(1), BrokerKind::Binance)
        .with_max_retries(2);
    match scheduler.submit(request) {
        Ok(_) => {}
        Err(e) => panic!("submit should be admitted: {e}"),
    }

    let history = wait_for_completions(&scheduler, 1).await;
    match &history[0].outcome {
        CompletionOutcome::Failed { error } => assert!(error.contains("broker busy")),
        other => panic!("request should fail after retries, got {other:?}"),
    }
    assert_eq!(history[0].retry_count, 2);

    scheduler.shutdown();
    let _ = worker.await;
}

// Opposite fill smaller than the position reduces quantity only: entry
// stays, nothing is realized.
#[tokio::test]
async fn partial_close_keeps_entry_price() {
    let pipeline = make_pipeline(TradingMode::AiFullAuto);
    pipeline.paper.set_price("BTCUSDT", dec!(100));
    match pipeline
        .engine
        .buy_market("BTCUSDT", dec!(1), BrokerKind::Paper)
        .await
    {
        Ok(_) => {}
        Err(e) => panic!("open should fill: {e}"),
    }

    pipeline.paper.set_price("BTCUSDT", dec!(110));
    match pipeline
        .engine
        .sell_market("BTCUSDT", dec!(0.4), BrokerKind::Paper)
        .await
    {
        Ok(_) => {}
        Err(e) => panic!("partial close should fill: {e}"),
    }

    let position = match pipeline.engine.position(BrokerKind::Paper, "BTCUSDT") {
        Some(p) => p,
        None => panic!("partial close must keep the position open"),
    };
    assert_eq!(position.quantity, dec!(0.6));
    assert_eq!(position.entry_price, dec!(100));
    assert_eq!(pipeline.engine.daily_pnl(), Decimal::ZERO);
}

#[tokio::test]
async fn adds_reweight_entry_and_full_close_realizes() {
    let pipeline = make_pipeline(TradingMode::AiFullAuto);
    pipeline.paper.set_price("BTCUSDT", dec!(100));
    match pipeline
        .engine
        .buy_market("BTCUSDT", dec!(1), BrokerKind::Paper)
        .await
    {
        Ok(_) => {}
        Err(e) => panic!("open should fill: {e}"),
    }

    pipeline.paper.set_price("BTCUSDT", dec!(110));
    match pipeline
        .engine
        .buy_market("BTCUSDT", dec!(1), BrokerKind::Paper)
        .await
    {
        Ok(_) => {}
        Err(e) => panic!("add should fill: {e}"),
    }

    let position = match pipeline.engine.position(BrokerKind::Paper, "BTCUSDT") {
        Some(p) => p,
        None => panic!("position should exist"),
    };
    assert_eq!(position.quantity, dec!(2));
    assert_eq!(position.entry_price, dec!(105));

    pipeline.paper.set_price("BTCUSDT", dec!(120));
    match pipeline.engine.close_position(BrokerKind::Paper, "BTCUSDT").await {
        Ok(_) => {}
        Err(e) => panic!("close should fill: {e}"),
    }
    assert!(pipeline.engine.position(BrokerKind::Paper, "BTCUSDT").is_none());
    assert_eq!(pipeline.engine.daily_pnl(), dec!(30));
}

// Kill switch with pending approvals: all cancelled, map emptied, and
// later signals never reach the risk engine.
#[tokio::test]
async fn kill_switch_purges_approvals_and_blocks_new_signals() {
    let pipeline = make_pipeline(TradingMode::Manual);
    for _ in 0..3 {
        pipeline
            .gate
            .process_signal(
                make_signal(SignalDirection::Buy),
                "acct-1",
                BrokerKind::Paper,
                Some(dec!(1)),
                1,
            )
            .await;
    }
    assert_eq!(pipeline.gate.pending_requests().len(), 3);

    pipeline.gate.activate_kill_switch(Some("emergency")).await;
    assert!(pipeline.gate.pending_requests().is_empty());

    let cancelled = pipeline
        .gate
        .execution_history(50)
        .into_iter()
        .filter(|r| r.status == ExecutionStatus::Cancelled)
        .count();
    assert_eq!(cancelled, 3);

    let request = pipeline
        .gate
        .process_signal(
            make_signal(SignalDirection::Buy),
            "acct-1",
            BrokerKind::Paper,
            Some(dec!(1)),
            1,
        )
        .await;
    assert_eq!(request.status, ExecutionStatus::Rejected);
    assert!(request.risk_result.is_none());
}

// A full-auto signal travels the entire pipeline and ends as an open
// position in the engine.
#[tokio::test]
async fn full_auto_signal_reaches_the_position_ledger() {
    let pipeline = make_pipeline(TradingMode::AiFullAuto);
    pipeline.paper.set_price("BTCUSDT", dec!(100));
    let worker = pipeline.scheduler.start();

    let request = pipeline
        .gate
        .process_signal(
            make_signal(SignalDirection::Buy),
            "acct-1",
            BrokerKind::Paper,
            None,
            1,
        )
        .await;
    assert_eq!(request.status, ExecutionStatus::Executed);

    let history = wait_for_completions(&pipeline.scheduler, 1).await;
    assert!(history[0].is_success());

    let position = match pipeline.engine.position(BrokerKind::Paper, "BTCUSDT") {
        Some(p) => p,
        None => panic!("fill should open a position"),
    };
    // 2% of 10000 over a 5-point stop, clamped by the 10% notional cap.
    assert_eq!(position.quantity, dec!(10));
    assert_eq!(position.side, OrderSide::Buy);

    pipeline.scheduler.shutdown();
    let _ = worker.await;
}

// Cancelling a queued request before the worker reaches it completes it
// as cancelled without ever contacting the engine.
#[tokio::test]
async fn queued_cancellation_is_observed_at_dequeue() {
    let pipeline = make_pipeline(TradingMode::AiFullAuto);
    pipeline.paper.set_price("BTCUSDT", dec!(100));

    let request = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(1), BrokerKind::Paper);
    let id = match pipeline.scheduler.submit(request) {
        Ok(id) => id,
        Err(e) => panic!("submit should be admitted: {e}"),
    };
    assert!(pipeline.scheduler.cancel(&id));

    let worker = pipeline.scheduler.start();
    let history = wait_for_completions(&pipeline.scheduler, 1).await;
    assert!(matches!(history[0].outcome, CompletionOutcome::Cancelled));
    assert!(pipeline.engine.orders().is_empty());

    pipeline.scheduler.shutdown();
    let _ = worker.await;
}
