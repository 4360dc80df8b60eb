//! Portfolio heat - aggregate-exposure guard with hysteresis
//!
//! Heat is the fraction of capacity committed to open positions across
//! both engines, computed by an external aggregator and written here.
//! The guard rejects new entries at or above the breach threshold and
//! holds the rejection for a fixed window afterwards so a noisy metric
//! cannot flap the gate open and shut.

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use super::ReasonCode;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeatConfig {
    /// Heat at or above this rejects new entries
    pub threshold: f64,
    /// Rejection window started by a breach, seconds
    pub breach_window_secs: u64,
    /// Heat below this applies no down-scale
    pub soft_threshold: f64,
    /// Scale applied just under the breach threshold
    pub min_scale: f64,
}

impl Default for HeatConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            breach_window_secs: 30,
            soft_threshold: 0.6,
            min_scale: 0.5,
        }
    }
}

/// Shared heat value. Mutated only by the external exposure aggregator;
/// read-only from the gate's perspective. `None` until the first sample
/// arrives - and a gate that cannot see heat fails closed.
#[derive(Default)]
pub struct PortfolioHeat {
    fraction: RwLock<Option<f64>>,
}

impl PortfolioHeat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, fraction: f64) {
        if !fraction.is_finite() {
            warn!("ignoring non-finite heat sample {fraction}");
            return;
        }
        *self.fraction.write() = Some(fraction.clamp(0.0, 1.0));
    }

    pub fn get(&self) -> Option<f64> {
        *self.fraction.read()
    }
}

/// Outcome of one heat evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum HeatVerdict {
    /// Pass, with the scale factor to hand the position sizer
    Scale(f64),
    Veto(ReasonCode),
}

/// The guard itself. Breach state is process-local: check-and-extend of
/// the window is atomic under one mutex so two concurrent intents cannot
/// both slip through a fresh breach.
pub struct HeatGuard {
    heat: Arc<PortfolioHeat>,
    breach_until: Mutex<Option<Instant>>,
    window: Duration,
    cfg: HeatConfig,
}

impl HeatGuard {
    pub fn new(heat: Arc<PortfolioHeat>, cfg: HeatConfig) -> Self {
        Self {
            heat,
            breach_until: Mutex::new(None),
            window: Duration::from_secs(cfg.breach_window_secs),
            cfg,
        }
    }

    /// Evaluate the guard for a new-entry intent.
    pub fn evaluate(&self) -> HeatVerdict {
        let mut breach_until = self.breach_until.lock();

        let Some(heat) = self.heat.get() else {
            // Cannot determine exposure: fail closed.
            return HeatVerdict::Veto(ReasonCode::HeatUnavailable);
        };

        if heat >= self.cfg.threshold {
            *breach_until = Some(Instant::now() + self.window);
            warn!(
                "heat {heat:.2} >= {:.2} - rejecting entries for {:?}",
                self.cfg.threshold, self.window
            );
            return HeatVerdict::Veto(ReasonCode::HeatBreached);
        }

        // Inside a previous breach window the rejection holds even though
        // heat has dropped - that is the hysteresis.
        if let Some(until) = *breach_until {
            if Instant::now() < until {
                return HeatVerdict::Veto(ReasonCode::HeatWindowActive);
            }
            *breach_until = None;
        }

        HeatVerdict::Scale(self.scale_for(heat))
    }

    /// Heat-proportional down-scale: 1.0 below the soft threshold, linear
    /// down to `min_scale` as heat approaches the breach threshold.
    fn scale_for(&self, heat: f64) -> f64 {
        if heat < self.cfg.soft_threshold {
            return 1.0;
        }
        let span = self.cfg.threshold - self.cfg.soft_threshold;
        if span <= 0.0 {
            return self.cfg.min_scale;
        }
        let t = ((heat - self.cfg.soft_threshold) / span).clamp(0.0, 1.0);
        1.0 - t * (1.0 - self.cfg.min_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(heat: Arc<PortfolioHeat>, window_ms: u64) -> HeatGuard {
        HeatGuard {
            heat,
            breach_until: Mutex::new(None),
            window: Duration::from_millis(window_ms),
            cfg: HeatConfig::default(),
        }
    }

    fn shared_heat(value: f64) -> Arc<PortfolioHeat> {
        let heat = Arc::new(PortfolioHeat::new());
        heat.set(value);
        heat
    }

    #[test]
    fn low_heat_passes_at_full_scale() {
        let g = guard(shared_heat(0.2), 100);
        assert_eq!(g.evaluate(), HeatVerdict::Scale(1.0));
    }

    #[test]
    fn missing_heat_fails_closed() {
        let g = guard(Arc::new(PortfolioHeat::new()), 100);
        assert_eq!(g.evaluate(), HeatVerdict::Veto(ReasonCode::HeatUnavailable));
    }

    #[test]
    fn breach_rejects_and_window_holds() {
        let heat = shared_heat(0.85);
        let g = guard(heat.clone(), 60);

        assert_eq!(g.evaluate(), HeatVerdict::Veto(ReasonCode::HeatBreached));
        // Queued second intent also rejected.
        assert_eq!(g.evaluate(), HeatVerdict::Veto(ReasonCode::HeatBreached));

        // Heat drops but the window is still live.
        heat.set(0.5);
        assert_eq!(g.evaluate(), HeatVerdict::Veto(ReasonCode::HeatWindowActive));

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(g.evaluate(), HeatVerdict::Scale(1.0));
    }

    #[test]
    fn scale_curve_is_linear_between_thresholds() {
        let g = guard(shared_heat(0.7), 100);
        match g.evaluate() {
            HeatVerdict::Scale(s) => assert!((s - 0.75).abs() < 1e-9),
            other => panic!("expected scale, got {other:?}"),
        }
    }

    #[test]
    fn heat_clamps_samples() {
        let heat = PortfolioHeat::new();
        heat.set(1.4);
        assert_eq!(heat.get(), Some(1.0));
        heat.set(f64::NAN);
        assert_eq!(heat.get(), Some(1.0)); // NaN sample ignored
    }
}
