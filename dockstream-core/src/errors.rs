//! Error types for dockstream.
//!
//! Every failure a stream can report travels through [`StreamError`], either
//! as the payload of a [`StreamEvent::Error`](crate::StreamEvent::Error) or as
//! the failure of a collecting future. Errors are `Clone` so a single upstream
//! failure can be delivered to several derived streams.

use thiserror::Error;

/// Errors reported by streams and stream adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The future that was supposed to produce the stream failed.
    #[error("Upstream rejected: {0}")]
    UpstreamRejected(String),

    /// The future resolved with something that is not a stream.
    #[error("Expected a stream, got {0}")]
    TypeMismatch(String),

    /// A JSON value could not be parsed, even with more input.
    #[error("Malformed JSON value: {0}")]
    MalformedValue(String),

    /// The stream ended with bytes that do not form a complete value.
    #[error("Unexpected trailing data at end of stream ({0} bytes)")]
    TrailingData(usize),

    /// The multiplexed framing was violated.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Error forwarded from the wrapped stream.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The stream was already closed.
    #[error("Stream is already closed")]
    AlreadyClosed,

    /// An internal buffer grew past its configured limit.
    #[error("Buffer exceeded limit of {limit} bytes")]
    BufferOverflow {
        /// Configured limit in bytes.
        limit: usize,
    },
}

impl StreamError {
    /// Create a rejection error from any displayable cause.
    pub fn rejected<E: std::fmt::Display>(err: E) -> Self {
        Self::UpstreamRejected(err.to_string())
    }

    /// Create an upstream error from any displayable cause.
    pub fn upstream<E: std::fmt::Display>(err: E) -> Self {
        Self::Upstream(err.to_string())
    }

    /// Create a protocol violation.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation(message.into())
    }

    /// Check if the error was caused by malformed input rather than the source.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedValue(_)
                | Self::TrailingData(_)
                | Self::ProtocolViolation(_)
                | Self::BufferOverflow { .. }
        )
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedValue(err.to_string())
    }
}

/// Result type for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StreamError::TrailingData(3);
        assert_eq!(
            err.to_string(),
            "Unexpected trailing data at end of stream (3 bytes)"
        );

        let err = StreamError::BufferOverflow { limit: 16 };
        assert_eq!(err.to_string(), "Buffer exceeded limit of 16 bytes");
    }

    #[test]
    fn test_protocol_errors() {
        assert!(StreamError::protocol("bad channel").is_protocol_error());
        assert!(StreamError::TrailingData(1).is_protocol_error());
        assert!(!StreamError::AlreadyClosed.is_protocol_error());
        assert!(!StreamError::upstream("reset").is_protocol_error());
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err: StreamError = io.into();
        assert_eq!(err, StreamError::Upstream("reset by peer".to_string()));
    }

    #[test]
    fn test_from_json_error() {
        let json = serde_json::from_str::<serde_json::Value>("{]").unwrap_err();
        let err: StreamError = json.into();
        assert!(matches!(err, StreamError::MalformedValue(_)));
    }
}
