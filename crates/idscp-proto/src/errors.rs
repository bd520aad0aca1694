//! Protocol error types.

use thiserror::Error;

/// Result type for wire encoding and decoding.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding protocol messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame exceeds the maximum message size
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Size of the offending frame
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// CBOR serialization failed
    #[error("encode error: {0}")]
    Encode(String),

    /// Frame is not a valid CBOR encoded message
    #[error("decode error: {0}")]
    Decode(String),
}
