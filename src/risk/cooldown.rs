//! Cooldown Ledger - per-instrument re-entry blackouts
//!
//! Every terminal order outcome starts a blackout for that instrument so a
//! spiking score cannot thrash in and out of the same name. Entries expire
//! on their own; expired entries read identically to absent ones.

use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::core::Instrument;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Blackout window applied after a terminal outcome, seconds
    pub window_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self { window_secs: 300 }
    }
}

/// Shared blackout tracker. Lock discipline: one mutex around the whole
/// map so check-then-insert is atomic across concurrently-evaluated intents.
pub struct CooldownLedger {
    entries: Mutex<HashMap<Instrument, Instant>>,
    window: Duration,
}

impl CooldownLedger {
    pub fn new(cfg: &CooldownConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window: Duration::from_secs(cfg.window_secs),
        }
    }

    /// Start (or extend) the blackout for an instrument.
    pub fn note(&self, instrument: &Instrument) {
        let expires_at = Instant::now() + self.window;
        self.entries.lock().insert(instrument.clone(), expires_at);
        debug!("cooldown: {} until +{:?}", instrument, self.window);
    }

    /// True while the instrument has a live blackout entry.
    pub fn is_cooling(&self, instrument: &Instrument) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(instrument) {
            Some(expires_at) if *expires_at > Instant::now() => true,
            Some(_) => {
                entries.remove(instrument);
                false
            }
            None => false,
        }
    }

    /// Remaining blackout time, if any.
    pub fn remaining(&self, instrument: &Instrument) -> Option<Duration> {
        self.entries
            .lock()
            .get(instrument)
            .and_then(|expires_at| expires_at.checked_duration_since(Instant::now()))
    }

    /// Drop every expired entry. Called opportunistically; correctness does
    /// not depend on it.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.lock().retain(|_, expires_at| *expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with_window(ms: u64) -> CooldownLedger {
        CooldownLedger {
            entries: Mutex::new(HashMap::new()),
            window: Duration::from_millis(ms),
        }
    }

    #[test]
    fn fresh_instrument_is_not_cooling() {
        let ledger = CooldownLedger::new(&CooldownConfig::default());
        assert!(!ledger.is_cooling(&Instrument::new("NVDA")));
    }

    #[test]
    fn noted_instrument_cools_then_clears() {
        let ledger = ledger_with_window(30);
        let nvda = Instrument::new("NVDA");

        ledger.note(&nvda);
        assert!(ledger.is_cooling(&nvda));
        assert!(ledger.remaining(&nvda).is_some());

        std::thread::sleep(Duration::from_millis(50));
        assert!(!ledger.is_cooling(&nvda));
        assert!(ledger.remaining(&nvda).is_none());
    }

    #[test]
    fn note_extends_existing_blackout() {
        let ledger = ledger_with_window(60);
        let btc = Instrument::new("BTC");

        ledger.note(&btc);
        std::thread::sleep(Duration::from_millis(40));
        ledger.note(&btc); // re-noted: window restarts
        std::thread::sleep(Duration::from_millis(40));
        assert!(ledger.is_cooling(&btc));
    }

    #[test]
    fn purge_drops_only_expired() {
        let ledger = ledger_with_window(30);
        ledger.note(&Instrument::new("A"));
        std::thread::sleep(Duration::from_millis(50));
        ledger.note(&Instrument::new("B"));
        ledger.purge_expired();
        assert!(!ledger.is_cooling(&Instrument::new("A")));
        assert!(ledger.is_cooling(&Instrument::new("B")));
    }
}
