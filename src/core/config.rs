//! Central configuration - Type-safe, loaded from `conflux.toml`
//!
//! Every tunable in the pipeline lives here so paper and live deployments
//! differ only by a config file. Each section deserializes independently
//! and falls back to production defaults when omitted.

use serde::Deserialize;
use std::path::Path;

use crate::bus::BusConfig;
use crate::execution::ExecutionConfig;
use crate::killswitch::KillSwitchConfig;
use crate::risk::cooldown::CooldownConfig;
use crate::risk::heat::HeatConfig;
use crate::risk::regime::RegimeConfig;
use crate::sizing::SizingConfig;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bus: BusConfig,
    pub regime: RegimeConfig,
    pub heat: HeatConfig,
    pub cooldown: CooldownConfig,
    pub sizing: SizingConfig,
    pub execution: ExecutionConfig,
    pub kill_switch: KillSwitchConfig,
}

impl Config {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> crate::core::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::core::Error::Config(format!("failed to read config: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| crate::core::Error::Config(format!("failed to parse config: {e}")))
    }

    /// Load from the default location, falling back to defaults.
    pub fn load_default() -> Self {
        let candidates = [
            "conflux.toml",
            concat!(env!("CARGO_MANIFEST_DIR"), "/conflux.toml"),
        ];

        for path in &candidates {
            if let Ok(cfg) = Self::load(Path::new(path)) {
                tracing::info!("📋 Loaded config from {}", path);
                return cfg;
            }
        }

        tracing::warn!("⚠️ No conflux.toml found, using defaults");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.bus.default_ttl_secs, 300);
        assert_eq!(cfg.heat.threshold, 0.8);
        assert_eq!(cfg.execution.max_attempts, 3);
    }

    #[test]
    fn partial_section_overrides() {
        let cfg: Config = toml::from_str(
            r#"
            [heat]
            threshold = 0.7

            [execution]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.heat.threshold, 0.7);
        assert_eq!(cfg.heat.breach_window_secs, 30);
        assert_eq!(cfg.execution.max_attempts, 5);
    }
}
