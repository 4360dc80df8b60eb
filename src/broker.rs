//! Broker Adapter - the external execution seam
//!
//! The core treats every brokerage polymorphically: one async trait,
//! adapter-specific auth and wire protocols live outside this crate.
//! `PaperBroker` fills instantly against a mark price and is the default
//! for paper runs and integration tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::core::{Instrument, Position, Result, Side, SizedIntent};

/// What an adapter can do; gates nothing in the core, informs routing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BrokerCapabilities {
    pub fractional_shares: bool,
    pub event_contracts: bool,
    pub short_selling: bool,
}

/// Broker-facing order derived from an authorized, sized intent.
#[derive(Debug, Clone)]
pub struct OrderTicket {
    pub intent_id: Uuid,
    pub instrument: Instrument,
    pub side: Side,
    /// Capital fraction to commit
    pub fraction: Decimal,
    /// Price the intent was scored at, if known
    pub reference_price: Option<Decimal>,
}

impl From<&SizedIntent> for OrderTicket {
    fn from(sized: &SizedIntent) -> Self {
        Self {
            intent_id: sized.intent.id,
            instrument: sized.intent.instrument.clone(),
            side: sized.intent.side,
            fraction: sized.fraction,
            reference_price: sized.intent.reference_price,
        }
    }
}

/// Broker verdict on one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    Filled,
    Partial,
    /// Permanent decline - invalid instrument, insufficient funds, etc.
    Rejected,
}

#[derive(Debug, Clone)]
pub struct OrderResult {
    pub status: SubmitStatus,
    pub fill_price: Option<Decimal>,
    pub filled_qty: Decimal,
    /// Broker-side explanation for rejections/partials
    pub note: Option<String>,
}

/// The adapter seam. `submit_order` returns `Err(Error::BrokerTransport)`
/// only for transient transport failures; permanent declines come back as
/// `Ok` with `SubmitStatus::Rejected`.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn capabilities(&self) -> BrokerCapabilities;
    async fn submit_order(&self, ticket: &OrderTicket) -> Result<OrderResult>;
    async fn get_position(&self, instrument: &Instrument) -> Result<Option<Position>>;
}

/// Instant-fill paper broker. Fills at the configured mark price, or at
/// the ticket's reference price when no mark is set.
pub struct PaperBroker {
    marks: RwLock<HashMap<Instrument, Decimal>>,
    positions: RwLock<HashMap<Instrument, Position>>,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self {
            marks: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_mark(&self, instrument: Instrument, price: Decimal) {
        self.marks.write().insert(instrument, price);
    }

    fn fill_price(&self, ticket: &OrderTicket) -> Decimal {
        self.marks
            .read()
            .get(&ticket.instrument)
            .copied()
            .or(ticket.reference_price)
            .unwrap_or(Decimal::ONE)
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    fn name(&self) -> &str {
        "paper"
    }

    fn capabilities(&self) -> BrokerCapabilities {
        BrokerCapabilities {
            fractional_shares: true,
            event_contracts: true,
            short_selling: false,
        }
    }

    async fn submit_order(&self, ticket: &OrderTicket) -> Result<OrderResult> {
        let price = self.fill_price(ticket);
        // Quantity in "capital fraction units" - the paper book only needs
        // to be internally consistent.
        let qty = if price > Decimal::ZERO {
            ticket.fraction / price
        } else {
            Decimal::ZERO
        };

        info!(
            "📝 PAPER {}: {} fraction {} @ {}",
            ticket.side, ticket.instrument, ticket.fraction, price
        );

        match ticket.side {
            Side::Buy => {
                self.positions.write().insert(
                    ticket.instrument.clone(),
                    Position {
                        instrument: ticket.instrument.clone(),
                        side: Side::Buy,
                        quantity: qty,
                        entry_price: price,
                        opened_at: Utc::now(),
                    },
                );
            }
            Side::Sell => {
                self.positions.write().remove(&ticket.instrument);
            }
        }

        Ok(OrderResult {
            status: SubmitStatus::Filled,
            fill_price: Some(price),
            filled_qty: qty,
            note: None,
        })
    }

    async fn get_position(&self, instrument: &Instrument) -> Result<Option<Position>> {
        Ok(self.positions.read().get(instrument).cloned())
    }
}
