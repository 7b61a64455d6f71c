//! Engine error taxonomy
//!
//! Codec and frame errors terminate at most the connection they occurred on;
//! nothing in this crate decides to end the process.

use thiserror::Error;

use crate::session::ConnId;

pub type Result<T> = std::result::Result<T, OscarError>;

/// Error types for every layer of the engine
#[derive(Debug, Error)]
pub enum OscarError {
    #[error("Truncated data: need {need} bytes, have {have}")]
    TruncatedData { need: usize, have: usize },

    #[error("Truncated TLV 0x{tlv_type:04x}: declared {declared} bytes, {remaining} remaining")]
    TruncatedTlv {
        tlv_type: u16,
        declared: usize,
        remaining: usize,
    },

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Authentication failed: code=0x{code:04x}")]
    AuthFailure { code: u16, url: Option<String> },

    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Write exceeds capacity: requested={requested}, available={available}")]
    CapacityExceeded { requested: usize, available: usize },

    #[error("Password too long for XOR encoding: {len} bytes (max {max})")]
    PasswordTooLong { len: usize, max: usize },

    #[error("Invalid cookie length: {0} (expected 16)")]
    InvalidCookieLength(usize),

    #[error("SNAC request ids exhausted")]
    RequestIdExhausted,

    #[error("Duplicate FLAP sequence 0x{0:04x}")]
    DuplicateSequence(u16),

    #[error("Invalid login transition: {event} while {from}")]
    InvalidTransition {
        from: &'static str,
        event: &'static str,
    },

    #[error("Connection closed: {0}")]
    ConnectionClosed(ConnId),

    #[error("Connection not found: {0}")]
    UnknownConnection(ConnId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OscarError {
    /// Shorthand for a [`OscarError::ProtocolError`] with a formatted message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        OscarError::ProtocolError(msg.into())
    }

    /// True when the connection the error came from must be closed.
    ///
    /// Truncation rejects one unit (or waits for more bytes); auth failures
    /// and duplicate frames leave the connection usable.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            OscarError::ProtocolError(_)
                | OscarError::ConnectionClosed(_)
                | OscarError::Io(_)
                | OscarError::InvalidCookieLength(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(OscarError::protocol("bad marker").is_fatal_to_connection());
        assert!(OscarError::ConnectionClosed(ConnId(1)).is_fatal_to_connection());
        assert!(!OscarError::TruncatedData { need: 4, have: 2 }.is_fatal_to_connection());
        assert!(!OscarError::AuthFailure { code: 5, url: None }.is_fatal_to_connection());
        assert!(!OscarError::DuplicateSequence(7).is_fatal_to_connection());
    }

    #[test]
    fn test_display_messages() {
        let err = OscarError::TruncatedTlv {
            tlv_type: 0x0005,
            declared: 12,
            remaining: 3,
        };
        assert_eq!(
            err.to_string(),
            "Truncated TLV 0x0005: declared 12 bytes, 3 remaining"
        );
        assert_eq!(
            OscarError::InvalidCookieLength(15).to_string(),
            "Invalid cookie length: 15 (expected 16)"
        );
    }
}
