//! Error handling - one hierarchy for the whole pipeline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Conflux error hierarchy.
///
/// The variants split along the retry/abort boundary: `BrokerTransport`
/// is the only retryable failure. Everything else either terminates the
/// intent or (for the bus) is swallowed at the call site.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signal bus / backing store errors (advisory data - callers swallow these)
    #[error("Bus error: {0}")]
    Bus(String),

    /// A risk gate could not determine its own state - resolves to deny
    #[error("Gate error: {0}")]
    Gate(String),

    /// Kill switch halt observed
    #[error("Halted: {0}")]
    Halted(String),

    /// Transient broker transport failure (timeout, connection drop) - retryable
    #[error("Broker transport error: {0}")]
    BrokerTransport(String),

    /// Permanent broker rejection (invalid instrument, insufficient funds) - never retried
    #[error("Broker rejected: {0}")]
    BrokerRejected(String),

    /// Internal invariant violation - fatal for the intent
    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True for failures the execution coordinator may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::BrokerTransport(_))
    }
}
