//! Execution Coordinator - authorized intent to broker calls
//!
//! Owns the order lifecycle PENDING → SUBMITTED → terminal. Transient
//! transport failures and timeouts retry with bounded attempts and
//! exponential backoff; permanent rejections never retry. The kill-switch
//! halt flag is checked before the first submission and at every retry
//! boundary. At most one order per instrument is in flight at any time;
//! different instruments proceed independently.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::broker::{BrokerAdapter, OrderTicket, SubmitStatus};
use crate::bus::SignalBus;
use crate::core::{Error, Instrument, Result, SizedIntent};
use crate::killswitch::KillSwitch;
use crate::risk::CooldownLedger;

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Submission attempts before giving up on transient failures
    pub max_attempts: u32,
    /// First backoff delay, doubled each retry, milliseconds
    pub backoff_base_ms: u64,
    /// Per-submission broker timeout, milliseconds
    pub order_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 500,
            order_timeout_ms: 5_000,
        }
    }
}

/// Order lifecycle owned by the coordinator for one in-flight order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Pending,
    Submitted,
    Filled,
    Partial,
    Rejected,
    TimedOut,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Partial | OrderState::Rejected | OrderState::TimedOut
        )
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderState::Pending => "PENDING",
            OrderState::Submitted => "SUBMITTED",
            OrderState::Filled => "FILLED",
            OrderState::Partial => "PARTIAL",
            OrderState::Rejected => "REJECTED",
            OrderState::TimedOut => "TIMEOUT",
        };
        write!(f, "{s}")
    }
}

pub struct ExecutionCoordinator {
    broker: Arc<dyn BrokerAdapter>,
    kill: Arc<KillSwitch>,
    cooldowns: Arc<CooldownLedger>,
    bus: Arc<SignalBus>,
    /// One async mutex per instrument; holding it is being "in flight".
    inflight: Mutex<HashMap<Instrument, Arc<tokio::sync::Mutex<()>>>>,
    cfg: ExecutionConfig,
}

impl ExecutionCoordinator {
    pub fn new(
        broker: Arc<dyn BrokerAdapter>,
        kill: Arc<KillSwitch>,
        cooldowns: Arc<CooldownLedger>,
        bus: Arc<SignalBus>,
        cfg: ExecutionConfig,
    ) -> Self {
        Self {
            broker,
            kill,
            cooldowns,
            bus,
            inflight: Mutex::new(HashMap::new()),
            cfg,
        }
    }

    fn instrument_lock(&self, instrument: &Instrument) -> Arc<tokio::sync::Mutex<()>> {
        self.inflight
            .lock()
            .entry(instrument.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Execute one authorized, sized intent.
    ///
    /// Returns the terminal `OrderState`, or `Err(Error::Halted)` when the
    /// kill switch preempted the order at a checkpoint.
    pub async fn execute(&self, sized: &SizedIntent) -> Result<OrderState> {
        let ticket = OrderTicket::from(sized);
        let lock = self.instrument_lock(&ticket.instrument);
        let _guard = lock.lock().await; // per-instrument serialization

        for attempt in 0..self.cfg.max_attempts {
            // Checkpoint: no broker call once the halt flag is up.
            if self.kill.is_halted() {
                let reason = self.kill.trip_reason().unwrap_or_default();
                warn!(
                    "aborting {} {} mid-execution: kill switch ({reason})",
                    ticket.side, ticket.instrument
                );
                return Err(Error::Halted(reason));
            }

            if attempt > 0 {
                let delay = self.cfg.backoff_base_ms << (attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            self.kill.record_order_message();
            let started = Instant::now();
            let submit = tokio::time::timeout(
                Duration::from_millis(self.cfg.order_timeout_ms),
                self.broker.submit_order(&ticket),
            )
            .await;

            match submit {
                Err(_elapsed) => {
                    warn!(
                        "submit timeout for {} (attempt {}/{})",
                        ticket.instrument,
                        attempt + 1,
                        self.cfg.max_attempts
                    );
                }
                Ok(Err(e)) if e.is_transient() => {
                    warn!(
                        "transient broker failure for {} (attempt {}/{}): {e}",
                        ticket.instrument,
                        attempt + 1,
                        self.cfg.max_attempts
                    );
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(result)) => {
                    self.kill
                        .record_latency(started.elapsed().as_secs_f64() * 1_000.0);
                    if let (Some(fill), Some(intended)) =
                        (result.fill_price, ticket.reference_price)
                    {
                        self.kill.record_fill(fill, intended);
                    }

                    let state = match result.status {
                        SubmitStatus::Filled => OrderState::Filled,
                        SubmitStatus::Partial => OrderState::Partial,
                        SubmitStatus::Rejected => OrderState::Rejected,
                    };
                    info!(
                        "order {} {} -> {} (qty {}, price {:?})",
                        ticket.side, ticket.instrument, state, result.filled_qty, result.fill_price
                    );
                    self.settle(&ticket, state, result.note.as_deref()).await;
                    return Ok(state);
                }
            }
        }

        // Retries exhausted on timeouts/transport errors.
        warn!(
            "giving up on {} after {} attempts",
            ticket.instrument, self.cfg.max_attempts
        );
        self.publish_outcome(&ticket, OrderState::TimedOut, Some("retries exhausted"))
            .await;
        Ok(OrderState::TimedOut)
    }

    /// Terminal bookkeeping: start the instrument's cooldown and republish
    /// the outcome for the other engine to see.
    async fn settle(&self, ticket: &OrderTicket, state: OrderState, note: Option<&str>) {
        self.cooldowns.note(&ticket.instrument);
        self.publish_outcome(ticket, state, note).await;
    }

    async fn publish_outcome(&self, ticket: &OrderTicket, state: OrderState, note: Option<&str>) {
        let key = format!("intel:last_outcome:{}", ticket.instrument);
        self.bus
            .publish(
                &key,
                json!({
                    "state": state,
                    "side": ticket.side,
                    "fraction": ticket.fraction,
                    "note": note,
                }),
                "execution_coordinator",
                1.0,
            )
            .await;
    }
}
