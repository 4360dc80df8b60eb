//! Signal Bus - expiring, fail-silent intelligence sharing
//!
//! Structured key→value exchange between independently-running engines.
//! Keys are namespaced (`intel:<signal>`), values wrapped in an envelope
//! carrying source, confidence, and TTL. Every operation is bounded and
//! fail-silent: a down store costs one log line and zero pipeline stalls,
//! because everything on the bus is advisory.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use store::{MemoryStore, SignalStore, StoreError};

/// Structured payload wrapping one published signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub value: Value,
    pub source_system: String,
    /// Publisher's confidence in the signal, 0.0 - 1.0
    pub confidence: f64,
    #[serde(rename = "timestamp")]
    pub published_at: DateTime<Utc>,
    /// Seconds until the signal logically expires
    #[serde(rename = "ttl")]
    pub ttl_secs: u64,
}

impl SignalEnvelope {
    /// True once `published_at + ttl` has passed. An expired envelope must
    /// read identically to an absent key.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.published_at);
        age.num_milliseconds() > self.ttl_secs as i64 * 1000
    }

    /// The wrapped value as a finite f64, if it is one.
    pub fn number(&self) -> Option<f64> {
        self.value.as_f64().filter(|v| v.is_finite())
    }

    /// The wrapped value as a string, if it is one.
    pub fn text(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// Three-valued read result.
///
/// `Absent` (missing/expired/malformed key) and `Unavailable` (store down)
/// both mean "no information" to callers - never a zero, never an error.
/// They are kept distinct so store health stays observable.
#[derive(Debug, Clone)]
pub enum BusRead {
    Hit(SignalEnvelope),
    Absent,
    Unavailable,
}

impl BusRead {
    pub fn envelope(&self) -> Option<&SignalEnvelope> {
        match self {
            BusRead::Hit(env) => Some(env),
            _ => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, BusRead::Hit(_))
    }
}

/// Bus tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Default signal TTL in seconds
    pub default_ttl_secs: u64,
    /// Upper bound on any single store operation, milliseconds
    pub op_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            op_timeout_ms: 2_000,
        }
    }
}

/// The shared intelligence bus.
///
/// Publish is an idempotent overwrite - no history is kept. Reads of
/// expired keys behave exactly like reads of missing keys.
pub struct SignalBus {
    store: Arc<dyn SignalStore>,
    default_ttl: Duration,
    op_timeout: Duration,
}

impl SignalBus {
    pub fn new(store: Arc<dyn SignalStore>, cfg: &BusConfig) -> Self {
        Self {
            store,
            default_ttl: Duration::from_secs(cfg.default_ttl_secs),
            op_timeout: Duration::from_millis(cfg.op_timeout_ms),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), &BusConfig::default())
    }

    /// Publish a signal with the default TTL. Never errors - a failed or
    /// timed-out write is logged and dropped.
    pub async fn publish(&self, key: &str, value: Value, source: &str, confidence: f64) {
        self.publish_with_ttl(key, value, source, confidence, self.default_ttl)
            .await;
    }

    pub async fn publish_with_ttl(
        &self,
        key: &str,
        value: Value,
        source: &str,
        confidence: f64,
        ttl: Duration,
    ) {
        let Some(payload) = self.encode(key, value, source, confidence, ttl) else {
            return;
        };
        match tokio::time::timeout(self.op_timeout, self.store.set(key, payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("bus publish failed ({key}): {e}"),
            Err(_) => debug!("bus publish timed out ({key})"),
        }
    }

    /// Read a signal. Missing, expired, and malformed keys all read as
    /// `Absent`; a failed or timed-out store op reads as `Unavailable`.
    pub async fn read(&self, key: &str) -> BusRead {
        match tokio::time::timeout(self.op_timeout, self.store.get(key)).await {
            Ok(Ok(raw)) => self.decode(key, raw),
            Ok(Err(e)) => {
                debug!("bus read failed ({key}): {e}");
                BusRead::Unavailable
            }
            Err(_) => {
                debug!("bus read timed out ({key})");
                BusRead::Unavailable
            }
        }
    }

    /// Blocking publish for sync contexts (threads without a runtime).
    /// Observably identical to `publish` for the same operation sequence;
    /// the store's own socket timeouts bound the call.
    pub fn publish_blocking(&self, key: &str, value: Value, source: &str, confidence: f64) {
        let Some(payload) = self.encode(key, value, source, confidence, self.default_ttl) else {
            return;
        };
        if let Err(e) = self.store.set_blocking(key, payload) {
            debug!("bus publish failed ({key}): {e}");
        }
    }

    /// Blocking read - same observable semantics as `read`.
    pub fn read_blocking(&self, key: &str) -> BusRead {
        match self.store.get_blocking(key) {
            Ok(raw) => self.decode(key, raw),
            Err(e) => {
                debug!("bus read failed ({key}): {e}");
                BusRead::Unavailable
            }
        }
    }

    fn encode(
        &self,
        key: &str,
        value: Value,
        source: &str,
        confidence: f64,
        ttl: Duration,
    ) -> Option<String> {
        let envelope = SignalEnvelope {
            value,
            source_system: source.to_string(),
            confidence,
            published_at: Utc::now(),
            ttl_secs: ttl.as_secs(),
        };
        match serde_json::to_string(&envelope) {
            Ok(p) => Some(p),
            Err(e) => {
                debug!("bus envelope encode failed ({key}): {e}");
                None
            }
        }
    }

    fn decode(&self, key: &str, raw: Option<String>) -> BusRead {
        let Some(raw) = raw else {
            return BusRead::Absent;
        };
        let envelope: SignalEnvelope = match serde_json::from_str(&raw) {
            Ok(env) => env,
            Err(e) => {
                debug!("bus payload malformed ({key}): {e}");
                return BusRead::Absent;
            }
        };
        if envelope.is_expired(Utc::now()) {
            return BusRead::Absent;
        }
        BusRead::Hit(envelope)
    }
}
