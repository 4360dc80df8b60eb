//! Position Sizer - confidence tier to capital fraction
//!
//! Deterministic tiered mapping from the final confluence score to a
//! capital fraction, multiplied by any gate-applied down-scale and clamped
//! to a hard per-position cap. A zero result means "do not trade" and the
//! intent never reaches the coordinator.

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::core::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Score at or above this earns the full tier
    pub full_tier_score: f64,
    /// Capital fraction for the full tier
    pub full_tier_fraction: Decimal,
    /// Score at or above this earns the half tier
    pub half_tier_score: f64,
    /// Capital fraction for the half tier
    pub half_tier_fraction: Decimal,
    /// Hard per-position cap, applied after tier and scale
    pub max_position_cap: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            full_tier_score: 90.0,
            full_tier_fraction: Decimal::new(5, 2), // 5%
            half_tier_score: 75.0,
            half_tier_fraction: Decimal::new(25, 3), // 2.5%
            max_position_cap: Decimal::new(20, 2),   // 20%
        }
    }
}

pub struct PositionSizer {
    cfg: SizingConfig,
}

impl PositionSizer {
    pub fn new(cfg: SizingConfig) -> Self {
        Self { cfg }
    }

    /// Map an authorized score and gate scale to a capital fraction.
    ///
    /// Errors on inputs that violate pipeline invariants (non-finite or
    /// negative scale, out-of-range score) - those intents abort rather
    /// than trade on garbage.
    pub fn size(&self, final_score: f64, scale: f64) -> Result<Decimal> {
        if !final_score.is_finite() || !(0.0..=100.0).contains(&final_score) {
            return Err(Error::InvalidIntent(format!(
                "final_score {final_score} outside [0, 100]"
            )));
        }
        if !scale.is_finite() || !(0.0..=1.0).contains(&scale) {
            return Err(Error::InvalidIntent(format!(
                "scale {scale} outside [0, 1]"
            )));
        }

        let tier = if final_score >= self.cfg.full_tier_score {
            self.cfg.full_tier_fraction
        } else if final_score >= self.cfg.half_tier_score {
            self.cfg.half_tier_fraction
        } else {
            Decimal::ZERO
        };

        let scale_dec = Decimal::try_from(scale)
            .map_err(|e| Error::InvalidIntent(format!("scale not representable: {e}")))?;
        let fraction = (tier * scale_dec).min(self.cfg.max_position_cap);

        if fraction < Decimal::ZERO {
            return Err(Error::InvalidIntent(format!(
                "computed fraction {fraction} is negative"
            )));
        }

        debug!("sizer: score {final_score:.1} x scale {scale:.2} -> {fraction}");
        Ok(fraction)
    }
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self::new(SizingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizer() -> PositionSizer {
        PositionSizer::default()
    }

    #[test]
    fn full_tier_at_ninety() {
        assert_eq!(sizer().size(90.0, 1.0).unwrap(), Decimal::new(5, 2));
        assert_eq!(sizer().size(97.0, 1.0).unwrap(), Decimal::new(5, 2));
    }

    #[test]
    fn half_tier_at_seventy_five() {
        assert_eq!(sizer().size(75.0, 1.0).unwrap(), Decimal::new(25, 3));
        assert_eq!(sizer().size(80.0, 1.0).unwrap(), Decimal::new(25, 3));
        assert_eq!(sizer().size(89.9, 1.0).unwrap(), Decimal::new(25, 3));
    }

    #[test]
    fn below_threshold_sizes_zero() {
        assert_eq!(sizer().size(74.9, 1.0).unwrap(), Decimal::ZERO);
        assert_eq!(sizer().size(0.0, 1.0).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn gate_scale_multiplies_tier() {
        // 5% x 0.5 = 2.5%
        assert_eq!(sizer().size(95.0, 0.5).unwrap(), Decimal::new(25, 3));
    }

    #[test]
    fn hard_cap_binds() {
        let s = PositionSizer::new(SizingConfig {
            full_tier_fraction: Decimal::new(30, 2), // 30% tier
            ..SizingConfig::default()
        });
        assert_eq!(s.size(95.0, 1.0).unwrap(), Decimal::new(20, 2));
    }

    #[test]
    fn invalid_inputs_abort() {
        assert!(sizer().size(f64::NAN, 1.0).is_err());
        assert!(sizer().size(105.0, 1.0).is_err());
        assert!(sizer().size(90.0, -0.1).is_err());
        assert!(sizer().size(90.0, 1.5).is_err());
    }
}
