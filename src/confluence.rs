//! Confidence Aggregator - confluence scoring across engines
//!
//! Merges the primary strategy score with bounded, predicate-gated bonuses
//! sourced from the signal bus. A missing/expired/out-of-range signal
//! contributes exactly zero - "no information" is never coerced into a
//! numeric default. The running total is clamped to [0, 100] after all
//! bonuses, so rule order cannot change the final value.

use serde_json::Value;
use tracing::debug;

use crate::bus::{BusRead, SignalBus, SignalEnvelope};
use crate::core::{ScoredIntent, TradeIntent};

/// Predicate over one bus signal's value.
#[derive(Debug, Clone)]
pub enum BonusPredicate {
    /// Numeric value >= threshold
    NumberAtLeast(f64),
    /// Numeric value <= threshold
    NumberAtMost(f64),
    /// String value equals (case-insensitive)
    TextEquals(&'static str),
    /// Object field is boolean true
    FieldTrue(&'static str),
    /// Object string field equals (case-insensitive)
    FieldEquals(&'static str, &'static str),
}

impl BonusPredicate {
    fn holds(&self, value: &Value) -> bool {
        match self {
            BonusPredicate::NumberAtLeast(t) => {
                value.as_f64().filter(|v| v.is_finite()).is_some_and(|v| v >= *t)
            }
            BonusPredicate::NumberAtMost(t) => {
                value.as_f64().filter(|v| v.is_finite()).is_some_and(|v| v <= *t)
            }
            BonusPredicate::TextEquals(s) => {
                value.as_str().is_some_and(|v| v.eq_ignore_ascii_case(s))
            }
            BonusPredicate::FieldTrue(field) => {
                value.get(field).and_then(Value::as_bool).unwrap_or(false)
            }
            BonusPredicate::FieldEquals(field, s) => value
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|v| v.eq_ignore_ascii_case(s)),
        }
    }
}

/// One bonus rule: if the predicate holds for `key`, add `delta`.
#[derive(Debug, Clone)]
pub struct BonusRule {
    pub key: &'static str,
    pub predicate: BonusPredicate,
    pub delta: f64,
    pub label: &'static str,
}

impl BonusRule {
    /// Whether this rule fires for the given envelope. An envelope whose
    /// confidence is outside [0, 1] is treated as no-data, not as a value.
    fn applies(&self, envelope: &SignalEnvelope) -> bool {
        if !envelope.confidence.is_finite() || !(0.0..=1.0).contains(&envelope.confidence) {
            debug!(
                "bonus {}: confidence {} out of range - treating as no data",
                self.label, envelope.confidence
            );
            return false;
        }
        self.predicate.holds(&envelope.value)
    }
}

/// Deterministic, ordered bonus application over bus reads.
pub struct ConfidenceAggregator {
    rules: Vec<BonusRule>,
}

impl ConfidenceAggregator {
    pub fn new(rules: Vec<BonusRule>) -> Self {
        Self { rules }
    }

    /// The production rule set, mirroring the signals both engines publish.
    pub fn default_rules() -> Vec<BonusRule> {
        vec![
            BonusRule {
                key: "intel:btc_sentiment",
                predicate: BonusPredicate::NumberAtLeast(0.5),
                delta: 5.0,
                label: "btc_sentiment_bullish",
            },
            BonusRule {
                key: "intel:spy_trend",
                predicate: BonusPredicate::TextEquals("bullish"),
                delta: 5.0,
                label: "spy_trend_bullish",
            },
            BonusRule {
                key: "intel:btc_volume_spike",
                predicate: BonusPredicate::FieldTrue("detected"),
                delta: 3.0,
                label: "volume_spike",
            },
            BonusRule {
                key: "intel:fed_bias",
                predicate: BonusPredicate::FieldEquals("bias", "dovish"),
                delta: 2.0,
                label: "fed_dovish",
            },
        ]
    }

    /// Aggregate an intent's raw score with bus-sourced bonuses.
    pub async fn aggregate(&self, intent: TradeIntent, bus: &SignalBus) -> ScoredIntent {
        let mut reads = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            reads.push(bus.read(rule.key).await);
        }
        let (final_score, applied_bonuses) = self.apply(intent.raw_score, &reads);
        if !applied_bonuses.is_empty() {
            debug!(
                "confluence: {} {:.1} -> {:.1} ({:?})",
                intent.instrument, intent.raw_score, final_score, applied_bonuses
            );
        }
        ScoredIntent {
            intent,
            final_score,
            applied_bonuses,
        }
    }

    /// Pure scoring core: rules applied in order against pre-fetched reads
    /// (one per rule, same order), total clamped to [0, 100].
    pub fn apply(&self, raw_score: f64, reads: &[BusRead]) -> (f64, Vec<&'static str>) {
        let mut total = raw_score;
        let mut applied = Vec::new();
        for (rule, read) in self.rules.iter().zip(reads) {
            let Some(envelope) = read.envelope() else {
                continue; // Absent or Unavailable: no information, no bonus
            };
            if rule.applies(envelope) {
                total += rule.delta;
                applied.push(rule.label);
            }
        }
        (total.clamp(0.0, 100.0), applied)
    }
}

impl Default for ConfidenceAggregator {
    fn default() -> Self {
        Self::new(Self::default_rules())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn hit(value: Value) -> BusRead {
        hit_with_confidence(value, 0.9)
    }

    fn hit_with_confidence(value: Value, confidence: f64) -> BusRead {
        BusRead::Hit(SignalEnvelope {
            value,
            source_system: "test".into(),
            confidence,
            published_at: Utc::now(),
            ttl_secs: 300,
        })
    }

    fn aggregator() -> ConfidenceAggregator {
        ConfidenceAggregator::default()
    }

    #[test]
    fn bonus_applies_when_predicate_holds() {
        let agg = aggregator();
        let reads = vec![
            hit(json!(0.72)),   // btc_sentiment >= 0.5 -> +5
            BusRead::Absent,
            BusRead::Absent,
            BusRead::Absent,
        ];
        let (score, applied) = agg.apply(92.0, &reads);
        assert_eq!(score, 97.0);
        assert_eq!(applied, vec!["btc_sentiment_bullish"]);
    }

    #[test]
    fn absent_key_contributes_zero() {
        let agg = aggregator();
        let reads = vec![
            BusRead::Absent,
            BusRead::Absent,
            BusRead::Absent,
            BusRead::Absent,
        ];
        let (score, applied) = agg.apply(80.0, &reads);
        assert_eq!(score, 80.0);
        assert!(applied.is_empty());
    }

    #[test]
    fn unavailable_store_contributes_zero() {
        let agg = aggregator();
        let reads = vec![
            BusRead::Unavailable,
            BusRead::Unavailable,
            BusRead::Unavailable,
            BusRead::Unavailable,
        ];
        let (score, _) = agg.apply(80.0, &reads);
        assert_eq!(score, 80.0);
    }

    #[test]
    fn total_is_clamped_to_hundred() {
        let agg = aggregator();
        let reads = vec![
            hit(json!(0.9)),
            hit(json!("bullish")),
            hit(json!({"detected": true, "mult": 3.2})),
            hit(json!({"bias": "dovish", "conf": 0.8})),
        ];
        // 98 + 5 + 5 + 3 + 2 would be 113
        let (score, applied) = agg.apply(98.0, &reads);
        assert_eq!(score, 100.0);
        assert_eq!(applied.len(), 4);
    }

    #[test]
    fn clamp_floor_at_zero() {
        let penalty = ConfidenceAggregator::new(vec![BonusRule {
            key: "intel:spy_trend",
            predicate: BonusPredicate::TextEquals("bearish"),
            delta: -10.0,
            label: "spy_bearish_penalty",
        }]);
        let (score, _) = penalty.apply(4.0, &[hit(json!("bearish"))]);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn out_of_range_confidence_is_no_data() {
        let agg = aggregator();
        let reads = vec![
            hit_with_confidence(json!(0.9), 1.7), // confidence out of range
            BusRead::Absent,
            BusRead::Absent,
            BusRead::Absent,
        ];
        let (score, applied) = agg.apply(80.0, &reads);
        assert_eq!(score, 80.0);
        assert!(applied.is_empty());
    }

    #[test]
    fn non_finite_value_is_no_data() {
        // JSON can't encode NaN, but a string where a number is expected
        // must also contribute nothing.
        let agg = aggregator();
        let reads = vec![
            hit(json!("very bullish")),
            BusRead::Absent,
            BusRead::Absent,
            BusRead::Absent,
        ];
        let (score, _) = agg.apply(80.0, &reads);
        assert_eq!(score, 80.0);
    }

    #[tokio::test]
    async fn aggregate_reads_live_bus() {
        let bus = SignalBus::in_memory();
        bus.publish("intel:btc_sentiment", json!(0.72), "satoshi", 0.9)
            .await;

        let intent = TradeIntent::new(
            crate::core::Instrument::new("BTC"),
            crate::core::Side::Buy,
            crate::core::InstrumentClass::Crypto,
            92.0,
            "test",
        )
        .unwrap();

        let scored = aggregator().aggregate(intent, &bus).await;
        assert_eq!(scored.final_score, 97.0);
    }
}
