//! Error types for sc64-link.

use thiserror::Error;

/// Main error type for all link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// I/O error on the serial transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Inbound frame did not start with `CMP`, `ERR` or `PKT`.
    #[error("Framing error: unrecognized literal {literal:?}")]
    Framing {
        /// The three bytes found where the literal was expected.
        literal: [u8; 3],
    },

    /// Inbound frame announced a payload above the configured limit.
    #[error("Payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Announced payload length.
        size: u32,
        /// Configured limit.
        max: u32,
    },

    /// VLQ value does not fit in five bytes.
    #[error("VLQ overflow")]
    VlqOverflow,

    /// Buffer ended before a record or VLQ was complete.
    #[error("Truncated input")]
    TruncatedInput,

    /// Unsolicited packet payload did not match its sub-header layout.
    #[error("Malformed packet '{}': {reason}", tag_char(.tag))]
    MalformedPacket {
        /// Packet tag.
        tag: u8,
        /// What was wrong with the payload.
        reason: String,
    },

    /// No handler registered for the given packet tag.
    #[error("Handler not found for packet tag '{}'", tag_char(.0))]
    HandlerNotFound(u8),

    /// Device answered with `ERR`, or never answered.
    #[error("Command '{}' failed", tag_char(.tag))]
    CommandFailed {
        /// Command tag.
        tag: u8,
    },

    /// DTR/DSR handshake did not complete within its poll budget.
    #[error("Handshake failed")]
    HandshakeFailed,

    /// Transport closed or writer task gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Other protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

fn tag_char(tag: &u8) -> char {
    char::from(*tag)
}

/// Result type alias using LinkError.
pub type Result<T> = std::result::Result<T, LinkError>;
