use std::time::Duration;

use keysync_domain::event::ExchangeEvent;
use keysync_domain::wire::WireError;
use keysync_gatt::CovidCharacteristic;
use thiserror::Error;

/// The peripheral reported something the exchange protocol does not allow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("peripheral reports {count} infected keys but exposes only {slots} slots")]
    CountExceedsSlots { count: u64, slots: usize },

    #[error("peripheral requested key index {index} {requests} times in a row")]
    StalledIndex { index: usize, requests: u32 },

    #[error("upload exceeded {limit} writes for a store of {store_len} keys")]
    UploadLimitExceeded { limit: usize, store_len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("bluetooth adapter unavailable: {0}")]
    Adapter(String),

    #[error("scanning failed: {0}")]
    Scan(String),

    #[error("no peripheral advertising the Covid service found within {0:?}")]
    DiscoveryFailure(Duration),

    #[error("failed to connect to {peripheral}: {reason}")]
    Connect { peripheral: String, reason: String },

    #[error("service discovery on {peripheral} failed: {reason}")]
    ServiceDiscovery { peripheral: String, reason: String },

    #[error("peripheral does not expose the {0} characteristic")]
    MissingCharacteristic(CovidCharacteristic),

    #[error("reading {characteristic} failed: {reason}")]
    TransportRead {
        characteristic: CovidCharacteristic,
        reason: String,
    },

    #[error("writing {characteristic} failed: {reason}")]
    TransportWrite {
        characteristic: CovidCharacteristic,
        reason: String,
    },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("{characteristic}: {source}")]
    Wire {
        characteristic: CovidCharacteristic,
        #[source]
        source: WireError,
    },

    #[error("exchange cancelled")]
    Cancelled,
}

impl ExchangeError {
    /// Whether the error only ends the current session, leaving the outer
    /// scan loop free to carry on with the next peripheral.
    pub fn is_session_local(&self) -> bool {
        !matches!(self, ExchangeError::Adapter(_) | ExchangeError::Cancelled)
    }
}

/// A fatal error that ended the scan loop, together with the events of the
/// cycle it interrupted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct CycleError {
    pub error: ExchangeError,
    pub events: Vec<ExchangeEvent>,
}

impl From<ExchangeError> for CycleError {
    fn from(error: ExchangeError) -> Self {
        CycleError {
            error,
            events: vec![],
        }
    }
}

impl From<btleplug::Error> for ExchangeError {
    fn from(e: btleplug::Error) -> Self {
        ExchangeError::Adapter(e.to_string())
    }
}
