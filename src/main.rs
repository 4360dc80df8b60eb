use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt};

use rust_decimal::Decimal;
use serde_json::json;

use conflux::broker::PaperBroker;
use conflux::bus::{MemoryStore, SignalBus};
use conflux::confluence::ConfidenceAggregator;
use conflux::core::{Config, Instrument, InstrumentClass, Side, TradeIntent};
use conflux::engine::Pipeline;
use conflux::execution::ExecutionCoordinator;
use conflux::killswitch::{KillSwitch, KillSwitchMonitor};
use conflux::risk::{
    CooldownLedger, HeatGuard, PinnedRegime, PortfolioHeat, Regime, RegimeMonitor, RegimeState,
    RiskGate,
};
use conflux::sizing::PositionSizer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // 1. Initialize logger
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,conflux=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    tracing::info!("🦀 Conflux starting (trade coordination pipeline)...");

    let cfg = Config::load_default();

    // 2. Shared state
    let bus = Arc::new(SignalBus::new(Arc::new(MemoryStore::new()), &cfg.bus));
    let kill = Arc::new(KillSwitch::new(cfg.kill_switch.clone()));
    let heat = Arc::new(PortfolioHeat::new());
    heat.set(0.2);
    let cooldowns = Arc::new(CooldownLedger::new(&cfg.cooldown));
    let regime_state = Arc::new(RegimeState::new());

    // 3. Background monitors
    let regime_monitor = RegimeMonitor::new(
        regime_state.clone(),
        Arc::new(PinnedRegime(Regime::Green)),
        bus.clone(),
        &cfg.regime,
    );
    regime_monitor.refresh().await;
    tokio::spawn(regime_monitor.run());
    tokio::spawn(KillSwitchMonitor::new(kill.clone(), bus.clone()).run());

    // 4. Pipeline
    let gate = RiskGate::new(
        kill.clone(),
        regime_state,
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

    let (intent_tx, intent_rx) = mpsc::channel(256);
    let engine = tokio::spawn(pipeline.run(intent_rx));

    // 5. Paper demo traffic until real scorers are wired in
    bus.publish("intel:btc_sentiment", json!(0.72), "satoshi", 0.9)
        .await;
    bus.publish("intel:spy_trend", json!("bullish"), "daytrader", 0.8)
        .await;

    let demo = [
        ("NVDA", InstrumentClass::Equity, 92.0, Decimal::new(120, 0)),
        ("BTC", InstrumentClass::Crypto, 80.0, Decimal::new(60_000, 0)),
        ("AMD", InstrumentClass::Equity, 68.0, Decimal::new(150, 0)),
    ];
    for (symbol, class, score, price) in demo {
        let intent = TradeIntent::new(Instrument::new(symbol), Side::Buy, class, score, "demo")?
            .with_reference_price(price);
        intent_tx.send(intent).await?;
    }

    tracing::info!("pipeline running, Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    drop(intent_tx);
    let _ = engine.await;
    Ok(())
}
