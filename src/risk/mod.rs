//! Risk Gate - layered veto pipeline in front of execution
//!
//! Four sub-gates in fixed priority order, each able to short-circuit to
//! a rejection: kill switch, macro regime, portfolio-heat guard, cooldown
//! ledger. One veto rejects the intent regardless of the others - this is
//! short-circuit, not majority vote. A gate that cannot determine its own
//! state denies; safety-critical checks never fail open.

pub mod cooldown;
pub mod heat;
pub mod regime;

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::core::TradeIntent;
use crate::killswitch::KillSwitch;

pub use cooldown::{CooldownConfig, CooldownLedger};
pub use heat::{HeatConfig, HeatGuard, HeatVerdict, PortfolioHeat};
pub use regime::{
    PinnedRegime, Regime, RegimeConfig, RegimeMonitor, RegimeSnapshot, RegimeSource, RegimeState,
};

/// Which sub-gate produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateId {
    KillSwitch,
    Regime,
    Heat,
    Cooldown,
}

impl std::fmt::Display for GateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateId::KillSwitch => write!(f, "kill_switch"),
            GateId::Regime => write!(f, "regime"),
            GateId::Heat => write!(f, "heat"),
            GateId::Cooldown => write!(f, "cooldown"),
        }
    }
}

/// Machine-readable rejection reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Clear,
    Halted,
    RegimeUnavailable,
    RegimeBlocksLongs,
    RegimeBlocksEntries,
    HeatUnavailable,
    HeatBreached,
    HeatWindowActive,
    CoolingDown,
}

/// Immutable per-intent verdict. Carries enough to explain any rejection
/// without re-deriving gate state.
#[derive(Debug, Clone)]
pub struct RiskDecision {
    pub allow: bool,
    /// Down-scale factor for the position sizer, 0.0 - 1.0
    pub scale: f64,
    pub reason: ReasonCode,
    pub vetoed_by: Option<GateId>,
}

impl RiskDecision {
    pub fn clear(scale: f64) -> Self {
        Self {
            allow: true,
            scale,
            reason: ReasonCode::Clear,
            vetoed_by: None,
        }
    }

    pub fn veto(gate: GateId, reason: ReasonCode) -> Self {
        Self {
            allow: false,
            scale: 0.0,
            reason,
            vetoed_by: Some(gate),
        }
    }
}

/// The composed gate. All inputs are shared-state objects injected at
/// construction - no ambient singletons.
pub struct RiskGate {
    kill: Arc<KillSwitch>,
    regime: Arc<RegimeState>,
    heat: HeatGuard,
    cooldowns: Arc<CooldownLedger>,
}

impl RiskGate {
    pub fn new(
        kill: Arc<KillSwitch>,
        regime: Arc<RegimeState>,
        heat: HeatGuard,
        cooldowns: Arc<CooldownLedger>,
    ) -> Self {
        Self {
            kill,
            regime,
            heat,
            cooldowns,
        }
    }

    /// Authorize or veto one intent. Evaluation order is fixed; the first
    /// veto wins and later gates are not consulted.
    pub fn authorize(&self, intent: &TradeIntent) -> RiskDecision {
        // 1. Kill switch - overrides everything, regardless of score or regime.
        if self.kill.is_halted() {
            return self.vetoed(intent, GateId::KillSwitch, ReasonCode::Halted);
        }

        // 2. Regime - last refreshed snapshot; an empty one fails closed.
        if intent.side.is_entry() {
            let Some(snapshot) = self.regime.snapshot() else {
                return self.vetoed(intent, GateId::Regime, ReasonCode::RegimeUnavailable);
            };
            match snapshot.regime {
                Regime::Green => {}
                Regime::Yellow => {
                    return self.vetoed(intent, GateId::Regime, ReasonCode::RegimeBlocksLongs);
                }
                Regime::Red => {
                    return self.vetoed(intent, GateId::Regime, ReasonCode::RegimeBlocksEntries);
                }
            }
        }

        // 3. Heat guard - new entries only; exits always reduce exposure.
        let scale = if intent.side.is_entry() {
            match self.heat.evaluate() {
                HeatVerdict::Scale(scale) => scale,
                HeatVerdict::Veto(reason) => {
                    return self.vetoed(intent, GateId::Heat, reason);
                }
            }
        } else {
            1.0
        };

        // 4. Cooldown ledger.
        if self.cooldowns.is_cooling(&intent.instrument) {
            return self.vetoed(intent, GateId::Cooldown, ReasonCode::CoolingDown);
        }

        RiskDecision::clear(scale)
    }

    fn vetoed(&self, intent: &TradeIntent, gate: GateId, reason: ReasonCode) -> RiskDecision {
        info!(
            "risk veto: {} {} by {} ({:?})",
            intent.side, intent.instrument, gate, reason
        );
        RiskDecision::veto(gate, reason)
    }
}
