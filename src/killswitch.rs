//! Kill Switch - sticky global halt with trip-wire monitoring
//!
//! Four independent trip-wires: PnL velocity, order-message rate, broker
//! round-trip latency, and fill-price deviation. Any single breach trips
//! the switch: the halt flag goes up, one `CANCEL_ALL` halt event is
//! broadcast, and everything downstream rejects until an operator calls
//! `reset()`. There is no timeout-based recovery.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::bus::SignalBus;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KillSwitchConfig {
    /// Rate-of-loss per minute that trips the switch (fraction of NAV)
    pub pnl_velocity_threshold: f64,
    /// Window over which PnL velocity is computed, seconds
    pub pnl_window_secs: u64,
    /// Max order messages per rate window
    pub order_rate_max: usize,
    /// Order-rate window, seconds
    pub order_rate_window_secs: u64,
    /// Max acceptable broker round-trip, milliseconds
    pub latency_threshold_ms: f64,
    /// Max fill-price deviation from intended price (fraction)
    pub price_deviation_max: f64,
    /// Monitor sampling interval, seconds
    pub tick_secs: u64,
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self {
            pnl_velocity_threshold: -0.01,
            pnl_window_secs: 60,
            order_rate_max: 100,
            order_rate_window_secs: 10,
            latency_threshold_ms: 500.0,
            price_deviation_max: 0.02,
            tick_secs: 5,
        }
    }
}

/// What a halt broadcast instructs every coordinator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltAction {
    CancelAll,
}

/// One halt broadcast.
#[derive(Debug, Clone)]
pub struct HaltEvent {
    pub action: HaltAction,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// The switch. Trip is idempotent and sticky; only `reset()` clears it.
pub struct KillSwitch {
    halted: AtomicBool,
    trip_reason: Mutex<Option<(String, DateTime<Utc>)>>,
    pnl_log: Mutex<VecDeque<(Instant, f64)>>,
    order_log: Mutex<VecDeque<Instant>>,
    last_latency_ms: Mutex<Option<f64>>,
    last_deviation: Mutex<Option<f64>>,
    halt_tx: broadcast::Sender<HaltEvent>,
    cfg: KillSwitchConfig,
}

impl KillSwitch {
    pub fn new(cfg: KillSwitchConfig) -> Self {
        let (halt_tx, _) = broadcast::channel(16);
        Self {
            halted: AtomicBool::new(false),
            trip_reason: Mutex::new(None),
            pnl_log: Mutex::new(VecDeque::with_capacity(1024)),
            order_log: Mutex::new(VecDeque::with_capacity(1024)),
            last_latency_ms: Mutex::new(None),
            last_deviation: Mutex::new(None),
            halt_tx,
            cfg,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn trip_reason(&self) -> Option<String> {
        self.trip_reason.lock().as_ref().map(|(r, _)| r.clone())
    }

    /// Subscribe to halt broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<HaltEvent> {
        self.halt_tx.subscribe()
    }

    /// Trip the switch. Idempotent: the first call broadcasts, later calls
    /// are no-ops.
    pub fn trip(&self, reason: impl Into<String>) {
        if self.halted.swap(true, Ordering::SeqCst) {
            return;
        }
        let reason = reason.into();
        let at = Utc::now();
        error!("🚨 KILL SWITCH TRIPPED: {reason}");
        *self.trip_reason.lock() = Some((reason.clone(), at));
        let _ = self.halt_tx.send(HaltEvent {
            action: HaltAction::CancelAll,
            reason,
            at,
        });
    }

    /// Manually clear the switch after review. Never called automatically.
    pub fn reset(&self) {
        self.halted.store(false, Ordering::SeqCst);
        *self.trip_reason.lock() = None;
        info!("kill switch manually reset and re-armed");
    }

    // ----- trip-wire recorders --------------------------------------------

    /// Record a P&L snapshot (NAV fraction).
    pub fn record_pnl(&self, pnl: f64) {
        let mut log = self.pnl_log.lock();
        log.push_back((Instant::now(), pnl));
        if log.len() > 4096 {
            log.pop_front();
        }
    }

    /// Record one order message sent or received.
    pub fn record_order_message(&self) {
        let mut log = self.order_log.lock();
        log.push_back(Instant::now());
        if log.len() > 8192 {
            log.pop_front();
        }
    }

    /// Record a broker round-trip sample.
    pub fn record_latency(&self, latency_ms: f64) {
        *self.last_latency_ms.lock() = Some(latency_ms);
    }

    /// Record fill price vs the price the intent was scored at.
    pub fn record_fill(&self, fill_price: Decimal, intended_price: Decimal) {
        if intended_price <= Decimal::ZERO {
            return;
        }
        let deviation = ((fill_price - intended_price) / intended_price).abs();
        let deviation: f64 = deviation.try_into().unwrap_or(0.0);
        *self.last_deviation.lock() = Some(deviation);
    }

    // ----- trip-wire checks -----------------------------------------------

    fn check_pnl_velocity(&self) -> Option<String> {
        let window = Duration::from_secs(self.cfg.pnl_window_secs);
        let cutoff = Instant::now().checked_sub(window)?;
        let log = self.pnl_log.lock();
        let mut in_window = log.iter().filter(|(ts, _)| *ts >= cutoff);

        let (first_ts, first_pnl) = *in_window.next()?;
        let (last_ts, last_pnl) = in_window.next_back().copied().unwrap_or((first_ts, first_pnl));
        if last_ts == first_ts {
            return None;
        }

        let elapsed_min = last_ts.duration_since(first_ts).as_secs_f64().max(1.0) / 60.0;
        let velocity = (last_pnl - first_pnl) / elapsed_min;
        if velocity < self.cfg.pnl_velocity_threshold {
            return Some(format!(
                "PnL velocity {velocity:.4} NAV/min < threshold {:.4}",
                self.cfg.pnl_velocity_threshold
            ));
        }
        None
    }

    fn check_order_rate(&self) -> Option<String> {
        let window = Duration::from_secs(self.cfg.order_rate_window_secs);
        let cutoff = Instant::now().checked_sub(window)?;
        let count = self
            .order_log
            .lock()
            .iter()
            .filter(|ts| **ts >= cutoff)
            .count();
        if count > self.cfg.order_rate_max {
            return Some(format!(
                "order rate anomaly: {count} messages in {}s (limit {})",
                self.cfg.order_rate_window_secs, self.cfg.order_rate_max
            ));
        }
        None
    }

    fn check_latency(&self) -> Option<String> {
        let latency = (*self.last_latency_ms.lock())?;
        if latency > self.cfg.latency_threshold_ms {
            return Some(format!(
                "broker latency {latency:.1}ms > threshold {:.0}ms",
                self.cfg.latency_threshold_ms
            ));
        }
        None
    }

    fn check_price_deviation(&self) -> Option<String> {
        let deviation = (*self.last_deviation.lock())?;
        if deviation > self.cfg.price_deviation_max {
            return Some(format!(
                "fill deviation {:.2}% > max {:.2}%",
                deviation * 100.0,
                self.cfg.price_deviation_max * 100.0
            ));
        }
        None
    }

    /// Run every trip-wire check; trip on the first breach. Returns the
    /// halt reason when a breach (new or prior) is active.
    pub fn run_checks(&self) -> Option<String> {
        if self.is_halted() {
            return self.trip_reason();
        }
        for check in [
            Self::check_pnl_velocity,
            Self::check_order_rate,
            Self::check_latency,
            Self::check_price_deviation,
        ] {
            if let Some(reason) = check(self) {
                warn!("trip-wire breach: {reason}");
                self.trip(reason.clone());
                return Some(reason);
            }
        }
        None
    }
}

/// Independent sampling loop. Also republishes switch state to the bus on
/// a trip so halts are observable without inspecting rejected intents.
pub struct KillSwitchMonitor {
    switch: Arc<KillSwitch>,
    bus: Arc<SignalBus>,
    tick: Duration,
}

impl KillSwitchMonitor {
    pub fn new(switch: Arc<KillSwitch>, bus: Arc<SignalBus>) -> Self {
        let tick = Duration::from_secs(switch.cfg.tick_secs.max(1));
        Self { switch, bus, tick }
    }

    pub async fn run(self) {
        let mut tick = tokio::time::interval(self.tick);
        let mut published_trip = false;
        loop {
            tick.tick().await;
            self.switch.run_checks();
            if self.switch.is_halted() && !published_trip {
                let reason = self.switch.trip_reason().unwrap_or_default();
                self.bus
                    .publish(
                        "intel:kill_switch",
                        serde_json::json!({ "halted": true, "reason": reason }),
                        "kill_switch",
                        1.0,
                    )
                    .await;
                published_trip = true;
            } else if !self.switch.is_halted() {
                published_trip = false;
            }
        }
    }
}
