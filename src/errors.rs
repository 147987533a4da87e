//! Readout Protocol Error Hierarchy
//!
//! Defines error types for the readout/subscription engine, categorized by
//! protocol layer and operational concerns.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or illegal protocol traffic
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Message channel failures (delivery, correlation, timeout)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Engine configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Data acquisition failed while a readout job was running
    #[error("Readout source error: {0}")]
    Source(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Stanza could not be parsed against the sensor data vocabulary
    #[error("Malformed stanza: {0}")]
    Malformed(String),

    /// The remote party actively rejected the request
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Response referenced a sequence number other than the requested one
    #[error("Sequence number mismatch (sent: {sent}, received: {received})")]
    SequenceNumberMismatch { sent: u32, received: u32 },

    /// Caller supplied a sequence number already tracked locally
    #[error("Sequence number {0} is already in use")]
    DuplicateSequenceNumber(u32),

    /// Sequence number points to an active readout that is not a subscription
    #[error("Sequence number {0} does not refer to a subscription")]
    NotASubscription(u32),

    /// Subscription interval bounds must be positive and ordered
    #[error("Invalid event interval: {0}")]
    InvalidInterval(String),

    /// Trigger thresholds must be strictly positive
    #[error("Invalid field condition for {field}: {reason}")]
    InvalidCondition { field: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Push or acknowledgement could not be handed to the message channel
    #[error("Failed to send to {peer}: {reason}")]
    SendFailed { peer: String, reason: String },

    /// Peer communication timeout
    #[error("No response from {peer} after {duration:?}")]
    Timeout { peer: String, duration: Duration },

    /// Background task failed: readout worker or chunk forwarder
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    /// Internal channel closed before the job finished streaming
    #[error("{0}")]
    ChannelClosed(String),
}

// ============== Conversion Implementations ============== //
impl From<roxmltree::Error> for Error {
    fn from(e: roxmltree::Error) -> Self {
        ProtocolError::Malformed(e.to_string()).into()
    }
}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        TransportError::TaskFailed(e).into()
    }
}
