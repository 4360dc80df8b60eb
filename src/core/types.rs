//! Core types - Strong typing for the decision pipeline

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{Error, Result};

/// Tradeable instrument identifier (e.g. "NVDA", "BTC", "KXHIGHNY")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument(String);

impl Instrument {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Buys open or add exposure; sells reduce it. The regime gate keys
    /// its entry restrictions off this distinction.
    pub fn is_entry(&self) -> bool {
        matches!(self, Side::Buy)
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Asset class of the instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    Equity,
    Crypto,
    EventContract,
}

impl std::fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrumentClass::Equity => write!(f, "equity"),
            InstrumentClass::Crypto => write!(f, "crypto"),
            InstrumentClass::EventContract => write!(f, "event_contract"),
        }
    }
}

/// One evaluation-cycle trade intent from an external scorer.
///
/// Immutable after construction - every pipeline stage derives a new
/// value instead of mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    pub id: Uuid,
    pub instrument: Instrument,
    pub side: Side,
    pub class: InstrumentClass,
    /// Primary strategy score in [0, 100]
    pub raw_score: f64,
    /// Price the scorer based its evaluation on, if it had one
    pub reference_price: Option<Decimal>,
    /// Free-form origin note (strategy name, pattern, etc.)
    pub context: String,
    pub created_at: DateTime<Utc>,
}

impl TradeIntent {
    pub fn new(
        instrument: Instrument,
        side: Side,
        class: InstrumentClass,
        raw_score: f64,
        context: impl Into<String>,
    ) -> Result<Self> {
        if !raw_score.is_finite() || !(0.0..=100.0).contains(&raw_score) {
            return Err(Error::InvalidIntent(format!(
                "raw_score {raw_score} outside [0, 100]"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            instrument,
            side,
            class,
            raw_score,
            reference_price: None,
            context: context.into(),
            created_at: Utc::now(),
        })
    }

    pub fn with_reference_price(mut self, price: Decimal) -> Self {
        self.reference_price = Some(price);
        self
    }
}

/// Intent plus its aggregated confluence score.
#[derive(Debug, Clone)]
pub struct ScoredIntent {
    pub intent: TradeIntent,
    /// Final score after bonuses, clamped to [0, 100]
    pub final_score: f64,
    /// Labels of the bonus rules that applied
    pub applied_bonuses: Vec<&'static str>,
}

/// Authorized, sized intent - the only thing the coordinator will execute.
#[derive(Debug, Clone)]
pub struct SizedIntent {
    pub intent: TradeIntent,
    pub final_score: f64,
    /// Capital fraction in (0, max_position_cap]
    pub fraction: Decimal,
}

/// Open position as reported by a broker adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub instrument: Instrument,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
}
