//! Error types for mesh routing.

use crate::transport::TransportError;
use thiserror::Error;

/// Errors that can occur while encoding, routing or sending packets.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Inbound bytes could not be decoded
    #[error("Malformed packet: {0}")]
    Malformed(String),

    /// Encoded header does not fit the u16 length prefix
    #[error("Header too large: {len} bytes")]
    HeaderTooLarge { len: usize },

    /// No fresh route and discovery did not produce one
    #[error("No route found to destination: {destination}")]
    NoRoute { destination: String },

    /// Packet ran out of hops
    #[error("TTL exceeded for packet {packet_id}")]
    TtlExceeded { packet_id: String },

    /// Packet id already seen
    #[error("Duplicate packet: {0}")]
    Duplicate(String),

    /// The injected transport refused the frame
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for routing operations.
pub type RoutingResult<T> = Result<T, RoutingError>;
