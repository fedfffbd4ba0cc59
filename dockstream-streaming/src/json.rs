//! Incremental decoding of concatenated JSON values.
//!
//! API replies such as image pulls or build logs arrive as a sequence of JSON
//! documents with no framing in between. [`JsonDecoder`] splits them using
//! JSON's own grammar, and [`JsonStream`] drives it from a byte stream.

use crate::config::StreamConfig;
use bytes::{Buf, Bytes, BytesMut};
use dockstream_core::{EventStream, StreamError, StreamEvent, StreamResult};
use futures::{ready, Stream};
use pin_project_lite::pin_project;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Splitter for a byte stream of concatenated JSON values.
///
/// Values may be separated by nothing, whitespace or newlines. Decoded values
/// are queued and taken with [`JsonDecoder::next_value`].
#[derive(Debug)]
pub struct JsonDecoder<T = Value> {
    buffer: BytesMut,
    values: VecDeque<T>,
    max_buffer_size: Option<usize>,
    _value: PhantomData<fn() -> T>,
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self {
            buffer: BytesMut::new(),
            values: VecDeque::new(),
            max_buffer_size: None,
            _value: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> JsonDecoder<T> {
    /// Create a new unbounded decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with the limits from `config`.
    #[must_use]
    pub fn with_config(config: &StreamConfig) -> Self {
        Self {
            max_buffer_size: config.max_buffer_size,
            ..Self::default()
        }
    }

    /// Cap the number of undecoded bytes held between chunks.
    #[must_use]
    pub fn with_max_buffer_size(mut self, limit: usize) -> Self {
        self.max_buffer_size = Some(limit);
        self
    }

    /// Feed a chunk and decode every value it completes.
    ///
    /// Values decoded before an error stay queued.
    pub fn feed(&mut self, chunk: &[u8]) -> StreamResult<()> {
        self.buffer.extend_from_slice(chunk);
        self.parse_buffer(false)?;

        if let Some(limit) = self.max_buffer_size {
            if self.buffer.len() > limit {
                return Err(StreamError::BufferOverflow { limit });
            }
        }

        Ok(())
    }

    /// Call when the input ends.
    ///
    /// Anything but whitespace left in the buffer is reported as
    /// [`StreamError::TrailingData`].
    pub fn finish(&mut self) -> StreamResult<()> {
        self.parse_buffer(true)?;

        let remaining = self.buffer.len();
        self.buffer.clear();
        if remaining > 0 {
            return Err(StreamError::TrailingData(remaining));
        }

        Ok(())
    }

    /// Get the next decoded value.
    pub fn next_value(&mut self) -> Option<T> {
        self.values.pop_front()
    }

    /// Check if there are decoded values waiting.
    pub fn has_values(&self) -> bool {
        !self.values.is_empty()
    }

    /// Number of bytes held that do not form a complete value yet.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the decoder state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.values.clear();
    }

    fn parse_buffer(&mut self, at_end: bool) -> StreamResult<()> {
        let mut consumed = 0;
        let mut failure = None;

        {
            let mut values = serde_json::Deserializer::from_slice(&self.buffer).into_iter::<T>();
            loop {
                match values.next() {
                    Some(Ok(value)) => {
                        let offset = values.byte_offset();
                        // A number touching the end of the buffer may still grow.
                        if !at_end
                            && offset == self.buffer.len()
                            && self.buffer[offset - 1].is_ascii_digit()
                        {
                            break;
                        }
                        self.values.push_back(value);
                        consumed = offset;
                    }
                    Some(Err(err)) if err.is_eof() => break,
                    Some(Err(err)) => {
                        failure = Some(StreamError::MalformedValue(err.to_string()));
                        break;
                    }
                    // Only whitespace left.
                    None => {
                        consumed = values.byte_offset();
                        break;
                    }
                }
            }
        }

        self.buffer.advance(consumed);

        match failure {
            Some(err) => {
                self.buffer.clear();
                Err(err)
            }
            None => Ok(()),
        }
    }
}

pin_project! {
    /// Stream adapter that decodes JSON values from a byte event stream.
    pub struct JsonStream<S, T> {
        #[pin]
        inner: S,
        decoder: JsonDecoder<T>,
        pending: VecDeque<StreamEvent<T>>,
        finished: bool,
    }
}

impl<S, T> JsonStream<S, T>
where
    S: Stream<Item = StreamEvent<Bytes>>,
    T: DeserializeOwned,
{
    /// Create a new JSON stream over a byte event stream.
    pub fn new(inner: S) -> Self {
        Self::with_decoder(inner, JsonDecoder::new())
    }

    /// Create a new JSON stream with a preconfigured decoder.
    pub fn with_decoder(inner: S, decoder: JsonDecoder<T>) -> Self {
        Self {
            inner,
            decoder,
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

impl<S, T> Stream for JsonStream<S, T>
where
    S: Stream<Item = StreamEvent<Bytes>>,
    T: DeserializeOwned,
{
    type Item = StreamEvent<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(event));
            }

            if *this.finished {
                return Poll::Ready(None);
            }

            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(StreamEvent::Data(chunk)) => {
                    tracing::trace!(len = chunk.len(), "decoding JSON chunk");
                    let result = this.decoder.feed(&chunk);
                    while let Some(value) = this.decoder.next_value() {
                        this.pending.push_back(StreamEvent::Data(value));
                    }
                    if let Err(err) = result {
                        tracing::debug!(error = %err, "JSON stream failed");
                        this.pending.push_back(StreamEvent::Error(err));
                        this.pending.push_back(StreamEvent::Close);
                        *this.finished = true;
                    }
                }
                Some(StreamEvent::End) => match finish_into(this.decoder, this.pending) {
                    Ok(()) => this.pending.push_back(StreamEvent::End),
                    Err(err) => {
                        tracing::debug!(error = %err, "JSON stream ended mid-value");
                        this.pending.push_back(StreamEvent::Error(err));
                    }
                },
                Some(StreamEvent::Error(err)) => {
                    this.pending.push_back(StreamEvent::Error(err));
                    this.pending.push_back(StreamEvent::Close);
                    *this.finished = true;
                }
                // Closing without End still must not lose a partial value.
                Some(StreamEvent::Close) | None => {
                    if let Err(err) = finish_into(this.decoder, this.pending) {
                        tracing::debug!(error = %err, "JSON stream closed mid-value");
                        this.pending.push_back(StreamEvent::Error(err));
                    }
                    this.pending.push_back(StreamEvent::Close);
                    *this.finished = true;
                }
            }
        }
    }
}

fn finish_into<T: DeserializeOwned>(
    decoder: &mut JsonDecoder<T>,
    pending: &mut VecDeque<StreamEvent<T>>,
) -> StreamResult<()> {
    let result = decoder.finish();
    while let Some(value) = decoder.next_value() {
        pending.push_back(StreamEvent::Data(value));
    }
    result
}

/// Decode a byte stream into a stream of JSON values.
///
/// An input that is already closed gives an already closed output.
pub fn decode<T>(input: EventStream<Bytes>) -> EventStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    decode_with_config(input, &StreamConfig::default())
}

/// Decode a byte stream into a stream of JSON values, with limits.
pub fn decode_with_config<T>(input: EventStream<Bytes>, config: &StreamConfig) -> EventStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    if !input.is_readable() {
        return EventStream::closed();
    }

    EventStream::from_events(JsonStream::with_decoder(
        input,
        JsonDecoder::with_config(config),
    ))
}
