//! Engine error taxonomy.
//!
//! No variant is fatal to the process: the worst outcome of any single bad
//! message is the loss of that one observation. Decode and validation
//! failures are dropped and counted; transport failures are logged,
//! published as a connectivity transition, and retried on a fixed interval.

use thiserror::Error;

/// Malformed or unrecognized payload. The message is dropped and counted,
/// never propagated as a fault.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,
    #[error("payload is not valid UTF-8")]
    NotText,
    #[error("unrecognized wire format")]
    UnknownFormat,
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed XML: {0}")]
    Xml(String),
}

/// A decoded message that cannot become a usable observation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Zero-coordinate drone observation with no corroborating signal
    /// reading. With an RSSI present the message is redirected to a
    /// proximity estimate instead of raising this.
    #[error("zero coordinate with no signal reading")]
    ZeroCoordinate,
}

/// Socket-level failure on one of the inbound transports.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("multicast join failed for {group}: {source}")]
    MulticastJoin {
        group: String,
        #[source]
        source: std::io::Error,
    },
}
