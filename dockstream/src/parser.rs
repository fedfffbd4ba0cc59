//! The caller-facing streaming parser.
//!
//! [`StreamingParser`] composes the adapters from `dockstream-streaming` into
//! the handful of shapes an API client needs: JSON progress streams, plain
//! byte streams, collected results and demultiplexed container output.

use bytes::Bytes;
use dockstream_core::EventStream;
use dockstream_streaming::{
    bridge, collect, demux_with_config, json, split_channels, ChannelStreams, Collect,
    EventSelector, Frame, StreamConfig, Upstream,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;

/// Turns response bodies into event streams and futures.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use dockstream::{EventStream, StreamingParser};
/// use futures::StreamExt;
///
/// # tokio_test::block_on(async {
/// let parser = StreamingParser::new();
///
/// let (tx, body) = EventStream::channel();
/// tx.data(Bytes::from_static(b"{\"status\":\"Pulling\"}")).unwrap();
/// tx.end().unwrap();
///
/// let mut values = parser.parse_json_stream(async move { Ok::<_, String>(body) });
/// let first = values.next().await.and_then(|event| event.into_data());
/// assert_eq!(first, Some(serde_json::json!({"status": "Pulling"})));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct StreamingParser {
    config: StreamConfig,
}

impl StreamingParser {
    /// Create a parser without buffer limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser applying `config` to every decoder it builds.
    pub fn with_config(config: StreamConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Bridge a pending response body and decode it as concatenated JSON.
    pub fn parse_json_stream<F, U, E>(&self, future: F) -> EventStream<Value>
    where
        F: Future<Output = Result<U, E>> + Send + 'static,
        U: Into<Upstream<Bytes>> + 'static,
        E: fmt::Display + 'static,
    {
        self.parse_json_stream_as(future)
    }

    /// Like [`parse_json_stream`](Self::parse_json_stream), deserializing
    /// each value into `T`.
    pub fn parse_json_stream_as<T, F, U, E>(&self, future: F) -> EventStream<T>
    where
        T: DeserializeOwned + Send + 'static,
        F: Future<Output = Result<U, E>> + Send + 'static,
        U: Into<Upstream<Bytes>> + 'static,
        E: fmt::Display + 'static,
    {
        json::decode_with_config(bridge(future), &self.config)
    }

    /// Bridge a pending response body into a plain byte stream.
    pub fn parse_plain_stream<F, U, E>(&self, future: F) -> EventStream<Bytes>
    where
        F: Future<Output = Result<U, E>> + Send + 'static,
        U: Into<Upstream<Bytes>> + 'static,
        E: fmt::Display + 'static,
    {
        bridge(future)
    }

    /// Collect the payloads picked by `selector` into a single future.
    ///
    /// See [`collect()`] for the resolution rules.
    pub fn deferred_stream<T, S>(&self, stream: EventStream<T>, selector: S) -> Collect<T, S>
    where
        S: EventSelector<T>,
    {
        collect(stream, selector)
    }

    /// Demultiplex a combined stdout/stderr body into frames.
    pub fn demultiplex_stream(&self, stream: EventStream<Bytes>) -> EventStream<Frame> {
        demux_with_config(stream, &self.config)
    }

    /// Demultiplex a combined body into separate stdout and stderr streams.
    pub fn demultiplex_channels(&self, stream: EventStream<Bytes>) -> ChannelStreams {
        split_channels(self.demultiplex_stream(stream))
    }
}
