//! Decision Engine - the intent pipeline from score to order
//!
//! Runs every intent through the fixed stage order: confluence scoring,
//! risk authorization, position sizing, execution. Stages never reorder
//! and a veto at any stage stops the intent there. The engine owns no
//! state of its own; it composes the shared-state components it is built
//! from.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::bus::SignalBus;
use crate::confluence::ConfidenceAggregator;
use crate::core::{Error, Result, TradeIntent};
use crate::execution::{ExecutionCoordinator, OrderState};
use crate::risk::{GateId, ReasonCode, RiskDecision, RiskGate};
use crate::sizing::PositionSizer;

/// Where one intent ended up.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// Reached the broker; carries the terminal order state.
    Executed {
        state: OrderState,
        final_score: f64,
    },
    /// Rejected by a risk gate.
    Vetoed(RiskDecision),
    /// Authorized but sized to zero - conviction too low to commit capital.
    NotSized { final_score: f64 },
}

pub struct Pipeline {
    aggregator: ConfidenceAggregator,
    gate: RiskGate,
    sizer: PositionSizer,
    coordinator: ExecutionCoordinator,
    bus: Arc<SignalBus>,
}

impl Pipeline {
    pub fn new(
        aggregator: ConfidenceAggregator,
        gate: RiskGate,
        sizer: PositionSizer,
        coordinator: ExecutionCoordinator,
        bus: Arc<SignalBus>,
    ) -> Self {
        Self {
            aggregator,
            gate,
            sizer,
            coordinator,
            bus,
        }
    }

    /// Drive one intent through every stage.
    pub async fn process(&self, intent: TradeIntent) -> Result<PipelineOutcome> {
        let scored = self.aggregator.aggregate(intent, &self.bus).await;

        let decision = self.gate.authorize(&scored.intent);
        if !decision.allow {
            return Ok(PipelineOutcome::Vetoed(decision));
        }

        let fraction = self.sizer.size(scored.final_score, decision.scale)?;
        if fraction.is_zero() {
            info!(
                "{} {} scored {:.1}: below sizing threshold, passing",
                scored.intent.side, scored.intent.instrument, scored.final_score
            );
            return Ok(PipelineOutcome::NotSized {
                final_score: scored.final_score,
            });
        }

        let sized = crate::core::SizedIntent {
            final_score: scored.final_score,
            fraction,
            intent: scored.intent,
        };

        match self.coordinator.execute(&sized).await {
            Ok(state) => Ok(PipelineOutcome::Executed {
                state,
                final_score: sized.final_score,
            }),
            // A halt during execution reads the same as a pre-execution veto
            // to callers: the intent did not trade.
            Err(Error::Halted(_)) => Ok(PipelineOutcome::Vetoed(RiskDecision::veto(
                GateId::KillSwitch,
                ReasonCode::Halted,
            ))),
            Err(e) => Err(e),
        }
    }

    /// Consume intents from a channel until it closes. Per-intent errors
    /// are logged and the loop keeps going; one bad intent never takes the
    /// engine down.
    pub async fn run(self, mut intents: mpsc::Receiver<TradeIntent>) {
        info!("📋 decision engine online");
        while let Some(intent) = intents.recv().await {
            let id = intent.id;
            let instrument = intent.instrument.clone();
            match self.process(intent).await {
                Ok(PipelineOutcome::Executed { state, final_score }) => {
                    info!("intent {id} ({instrument}) executed: {state} at score {final_score:.1}");
                }
                Ok(PipelineOutcome::Vetoed(decision)) => {
                    info!(
                        "intent {id} ({instrument}) vetoed by {:?} ({:?})",
                        decision.vetoed_by, decision.reason
                    );
                }
                Ok(PipelineOutcome::NotSized { final_score }) => {
                    info!("intent {id} ({instrument}) not sized at {final_score:.1}");
                }
                Err(e) => {
                    warn!("intent {id} ({instrument}) failed: {e}");
                }
            }
        }
        info!("intent channel closed, decision engine stopping");
    }
}
