//! Macro regime - traffic-light risk classification
//!
//! The classification itself is computed externally (SPY vs EMAs, credit
//! cross-validation, whatever the deployment wires in). This module owns
//! the shared snapshot many intents read between refreshes, and the loop
//! that refreshes it on its own cadence. Staleness is bounded by the
//! cadence, not recomputed per intent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::bus::SignalBus;
use crate::core::Result;

/// Coarse macro-risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Regime {
    /// Full strategy activation
    Green,
    /// Defensive - no new long entries
    Yellow,
    /// Survival mode - no new entries at all
    Red,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Regime::Green => write!(f, "GREEN"),
            Regime::Yellow => write!(f, "YELLOW"),
            Regime::Red => write!(f, "RED"),
        }
    }
}

/// One refreshed classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    pub regime: Regime,
    /// Classifier confidence, 0.0 - 1.0
    pub confidence: f64,
    /// Human-readable explanation of the classification
    pub note: String,
    pub refreshed_at: DateTime<Utc>,
}

impl RegimeSnapshot {
    pub fn new(regime: Regime, confidence: f64, note: impl Into<String>) -> Self {
        Self {
            regime,
            confidence,
            note: note.into(),
            refreshed_at: Utc::now(),
        }
    }
}

/// Externally computed regime classification, polled on a cadence.
#[async_trait]
pub trait RegimeSource: Send + Sync {
    async fn classify(&self) -> Result<RegimeSnapshot>;
}

/// A source pinned to one regime - paper runs and tests.
pub struct PinnedRegime(pub Regime);

#[async_trait]
impl RegimeSource for PinnedRegime {
    async fn classify(&self) -> Result<RegimeSnapshot> {
        Ok(RegimeSnapshot::new(self.0, 1.0, "pinned"))
    }
}

/// Shared regime state read by every intent between refreshes.
///
/// Starts empty: until the first successful refresh, the gate fails closed.
#[derive(Default)]
pub struct RegimeState {
    inner: RwLock<Option<RegimeSnapshot>>,
}

impl RegimeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pinned(regime: Regime) -> Self {
        let state = Self::new();
        state.set(RegimeSnapshot::new(regime, 1.0, "pinned"));
        state
    }

    pub fn set(&self, snapshot: RegimeSnapshot) {
        *self.inner.write() = Some(snapshot);
    }

    pub fn snapshot(&self) -> Option<RegimeSnapshot> {
        self.inner.read().clone()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Refresh cadence, seconds
    pub refresh_secs: u64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self { refresh_secs: 300 }
    }
}

/// Refresh loop: poll the source, store the snapshot, republish it on the
/// bus so regime downgrades are observable without inspecting rejections.
/// A failed refresh keeps the prior snapshot - staleness over blindness.
pub struct RegimeMonitor {
    state: Arc<RegimeState>,
    source: Arc<dyn RegimeSource>,
    bus: Arc<SignalBus>,
    cadence: Duration,
}

impl RegimeMonitor {
    pub fn new(
        state: Arc<RegimeState>,
        source: Arc<dyn RegimeSource>,
        bus: Arc<SignalBus>,
        cfg: &RegimeConfig,
    ) -> Self {
        Self {
            state,
            source,
            bus,
            cadence: Duration::from_secs(cfg.refresh_secs),
        }
    }

    /// Refresh once. Public so startup can prime the state before loops run.
    pub async fn refresh(&self) {
        match self.source.classify().await {
            Ok(snapshot) => {
                info!(
                    "regime: {} (confidence {:.2}) - {}",
                    snapshot.regime, snapshot.confidence, snapshot.note
                );
                let confidence = snapshot.confidence;
                let payload = json!({
                    "regime": snapshot.regime,
                    "note": snapshot.note,
                });
                self.state.set(snapshot);
                self.bus
                    .publish("intel:macro_regime", payload, "regime_monitor", confidence)
                    .await;
            }
            Err(e) => {
                warn!("regime refresh failed, keeping prior snapshot: {e}");
            }
        }
    }

    pub async fn run(self) {
        let mut tick = tokio::time::interval(self.cadence);
        loop {
            tick.tick().await;
            self.refresh().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusRead;
    use crate::core::Error;

    struct FailingSource;

    #[async_trait]
    impl RegimeSource for FailingSource {
        async fn classify(&self) -> Result<RegimeSnapshot> {
            Err(Error::Gate("feed down".into()))
        }
    }

    #[tokio::test]
    async fn refresh_stores_and_republishes() {
        let state = Arc::new(RegimeState::new());
        let bus = Arc::new(SignalBus::in_memory());
        let monitor = RegimeMonitor::new(
            state.clone(),
            Arc::new(PinnedRegime(Regime::Yellow)),
            bus.clone(),
            &RegimeConfig::default(),
        );

        assert!(state.snapshot().is_none());
        monitor.refresh().await;

        assert_eq!(state.snapshot().unwrap().regime, Regime::Yellow);
        let read = bus.read("intel:macro_regime").await;
        match read {
            BusRead::Hit(env) => assert_eq!(env.value["regime"], "YELLOW"),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_refresh_keeps_prior_snapshot() {
        let state = Arc::new(RegimeState::pinned(Regime::Green));
        let bus = Arc::new(SignalBus::in_memory());
        let monitor = RegimeMonitor::new(
            state.clone(),
            Arc::new(FailingSource),
            bus,
            &RegimeConfig::default(),
        );

        monitor.refresh().await;
        assert_eq!(state.snapshot().unwrap().regime, Regime::Green);
    }
}
