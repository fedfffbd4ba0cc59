//! Stream events and lifecycle states.

use crate::errors::StreamError;
use serde::{Deserialize, Serialize};

/// An event emitted by an [`EventStream`](crate::EventStream).
///
/// A well-formed stream emits any number of `Data` events, then at most one
/// of `Error` or `End`, then exactly one `Close`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<T> {
    /// A payload.
    Data(T),
    /// The stream failed.
    Error(StreamError),
    /// The stream finished gracefully.
    End,
    /// Terminal event, always the last one.
    Close,
}

impl<T> StreamEvent<T> {
    /// Get the kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Data(_) => EventKind::Data,
            Self::Error(_) => EventKind::Error,
            Self::End => EventKind::End,
            Self::Close => EventKind::Close,
        }
    }

    /// Get the payload, if this is a data event.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Data(item) => Some(item),
            _ => None,
        }
    }

    /// Take the payload, if this is a data event.
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Data(item) => Some(item),
            _ => None,
        }
    }

    /// Get the error, if this is an error event.
    pub fn error(&self) -> Option<&StreamError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Check if this event ends the data phase of a stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Data(_))
    }

    /// Map the payload, keeping lifecycle events.
    pub fn map<U, F>(self, f: F) -> StreamEvent<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Data(item) => StreamEvent::Data(f(item)),
            Self::Error(err) => StreamEvent::Error(err),
            Self::End => StreamEvent::End,
            Self::Close => StreamEvent::Close,
        }
    }
}

/// Kind of a [`StreamEvent`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Payload event.
    Data,
    /// Error event.
    Error,
    /// Graceful end.
    End,
    /// Terminal close.
    Close,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Data => "data",
            Self::Error => "error",
            Self::End => "end",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// Emitting data.
    Open,
    /// An error was emitted, close is pending.
    Erroring,
    /// End was emitted, close is pending.
    Ending,
    /// Close was reached. Nothing more will be emitted.
    Closed,
}

impl StreamState {
    /// Check if data may still arrive.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind() {
        assert_eq!(StreamEvent::Data(1).kind(), EventKind::Data);
        assert_eq!(StreamEvent::<u8>::End.kind(), EventKind::End);
        assert_eq!(EventKind::Close.to_string(), "close");
    }

    #[test]
    fn test_event_map() {
        let event = StreamEvent::Data(2).map(|n| n * 10);
        assert_eq!(event, StreamEvent::Data(20));

        let event: StreamEvent<String> = StreamEvent::<u8>::Close.map(|n| n.to_string());
        assert_eq!(event, StreamEvent::Close);
    }

    #[test]
    fn test_terminal_events() {
        assert!(!StreamEvent::Data("x").is_terminal());
        assert!(StreamEvent::<u8>::Error(StreamError::AlreadyClosed).is_terminal());
        assert!(StreamEvent::<u8>::Close.is_terminal());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&StreamState::Erroring).unwrap();
        assert_eq!(json, "\"erroring\"");
        assert!(StreamState::Open.is_open());
        assert!(!StreamState::Ending.is_open());
    }
}
