//! End-to-end pipeline scenarios over the public API.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;

use conflux::broker::PaperBroker;
use conflux::bus::{BusRead, SignalBus};
use conflux::confluence::ConfidenceAggregator;
use conflux::core::{Config, Instrument, InstrumentClass, Side, TradeIntent};
use conflux::engine::{Pipeline, PipelineOutcome};
use conflux::execution::{ExecutionCoordinator, OrderState};
use conflux::killswitch::{HaltAction, KillSwitch};
use conflux::risk::{
    CooldownLedger, GateId, HeatGuard, PortfolioHeat, Regime, RegimeState, RiskGate,
};
use conflux::sizing::PositionSizer;

struct Harness {
    bus: Arc<SignalBus>,
    kill: Arc<KillSwitch>,
    heat: Arc<PortfolioHeat>,
    pipeline: Pipeline,
}

fn harness(regime: Regime) -> Harness {
    let cfg = Config::default();
    let bus = Arc::new(SignalBus::in_memory());
    let kill = Arc::new(KillSwitch::new(cfg.kill_switch.clone()));
    let heat = Arc::new(PortfolioHeat::new());
    heat.set(0.2);
    let cooldowns = Arc::new(CooldownLedger::new(&cfg.cooldown));

    let gate = RiskGate::new(
        kill.clone(),
        Arc::new(RegimeState::pinned(regime)),
        HeatGuard::new(heat.clone(), cfg.heat.clone()),
        cooldowns.clone(),
    );
    let coordinator = ExecutionCoordinator::new(
        Arc::new(PaperBroker::new()),
        kill.clone(),
        cooldowns,
        bus.clone(),
        cfg.execution.clone(),
    );
    let pipeline = Pipeline::new(
        ConfidenceAggregator::default(),
        gate,
        PositionSizer::new(cfg.sizing.clone()),
        coordinator,
        bus.clone(),
    );
    Harness {
        bus,
        kill,
        heat,
        pipeline,
    }
}

fn buy(symbol: &str, score: f64) -> TradeIntent {
    TradeIntent::new(
        Instrument::new(symbol),
        Side::Buy,
        InstrumentClass::Equity,
        score,
        "scenario",
    )
    .unwrap()
    .with_reference_price(Decimal::new(100, 0))
}

async fn published_fraction(bus: &SignalBus, symbol: &str) -> Decimal {
    match bus.read(&format!("intel:last_outcome:{symbol}")).await {
        BusRead::Hit(env) => serde_json::from_value(env.value["fraction"].clone()).unwrap(),
        other => panic!("expected an outcome on the bus, got {other:?}"),
    }
}

#[tokio::test]
async fn bonus_lifts_score_into_full_tier() {
    // 92 raw + 5 sentiment bonus = 97 -> full 5% tier.
    let h = harness(Regime::Green);
    h.bus
        .publish("intel:btc_sentiment", json!(0.72), "satoshi", 0.9)
        .await;

    let outcome = h.pipeline.process(buy("NVDA", 92.0)).await.unwrap();
    match outcome {
        PipelineOutcome::Executed { state, final_score } => {
            assert_eq!(state, OrderState::Filled);
            assert_eq!(final_score, 97.0);
        }
        other => panic!("expected execution, got {other:?}"),
    }
    assert_eq!(
        published_fraction(&h.bus, "NVDA").await,
        Decimal::new(5, 2)
    );
}

#[tokio::test]
async fn absent_signal_leaves_half_tier() {
    // 80 raw, empty bus -> stays 80 -> half 2.5% tier.
    let h = harness(Regime::Green);
    let outcome = h.pipeline.process(buy("AMD", 80.0)).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Executed { .. }));
    assert_eq!(
        published_fraction(&h.bus, "AMD").await,
        Decimal::new(25, 3)
    );
}

#[tokio::test]
async fn red_regime_blocks_top_scores() {
    let h = harness(Regime::Red);
    let outcome = h.pipeline.process(buy("NVDA", 100.0)).await.unwrap();
    match outcome {
        PipelineOutcome::Vetoed(decision) => {
            assert_eq!(decision.vetoed_by, Some(GateId::Regime));
        }
        other => panic!("expected veto, got {other:?}"),
    }
}

#[tokio::test]
async fn cooldown_blocks_reentry_after_fill() {
    let h = harness(Regime::Green);
    let first = h.pipeline.process(buy("NVDA", 92.0)).await.unwrap();
    assert!(matches!(first, PipelineOutcome::Executed { .. }));

    let second = h.pipeline.process(buy("NVDA", 99.0)).await.unwrap();
    match second {
        PipelineOutcome::Vetoed(decision) => {
            assert_eq!(decision.vetoed_by, Some(GateId::Cooldown));
        }
        other => panic!("expected cooldown veto, got {other:?}"),
    }

    // A different instrument is unaffected.
    let other = h.pipeline.process(buy("AMD", 92.0)).await.unwrap();
    assert!(matches!(other, PipelineOutcome::Executed { .. }));
}

#[tokio::test]
async fn heat_breach_holds_until_window_passes() {
    let h = harness(Regime::Green);
    h.heat.set(0.9);
    let breached = h.pipeline.process(buy("NVDA", 95.0)).await.unwrap();
    match breached {
        PipelineOutcome::Vetoed(decision) => {
            assert_eq!(decision.vetoed_by, Some(GateId::Heat));
        }
        other => panic!("expected heat veto, got {other:?}"),
    }

    // Heat drops right back but the default 30s window still holds.
    h.heat.set(0.3);
    let held = h.pipeline.process(buy("NVDA", 95.0)).await.unwrap();
    assert!(matches!(held, PipelineOutcome::Vetoed(_)));
}

#[tokio::test]
async fn tripped_switch_broadcasts_and_vetoes() {
    let h = harness(Regime::Green);
    let mut halts = h.kill.subscribe();

    h.kill.record_latency(900.0);
    let reason = h.kill.run_checks().expect("latency breach should trip");
    assert!(reason.contains("latency"));

    let event = tokio::time::timeout(Duration::from_millis(100), halts.recv())
        .await
        .expect("broadcast expected")
        .unwrap();
    assert_eq!(event.action, HaltAction::CancelAll);

    let outcome = h.pipeline.process(buy("NVDA", 99.0)).await.unwrap();
    match outcome {
        PipelineOutcome::Vetoed(decision) => {
            assert_eq!(decision.vetoed_by, Some(GateId::KillSwitch));
        }
        other => panic!("expected kill-switch veto, got {other:?}"),
    }

    // Manual reset re-arms the pipeline on a fresh instrument.
    h.kill.reset();
    let after = h.pipeline.process(buy("AMD", 92.0)).await.unwrap();
    assert!(matches!(after, PipelineOutcome::Executed { .. }));
}
