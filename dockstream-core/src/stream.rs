//! The event stream primitive.
//!
//! [`EventStream`] wraps any source of [`StreamEvent`]s and enforces the
//! stream lifecycle on top of it: data only while open, at most one of
//! `Error` / `End`, and exactly one terminal `Close`.

use crate::errors::{StreamError, StreamResult};
use crate::events::{StreamEvent, StreamState};
use futures::stream::{self, BoxStream, FusedStream};
use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// A stream of [`StreamEvent`]s with an explicit lifecycle.
pub struct EventStream<T> {
    inner: Option<BoxStream<'static, StreamEvent<T>>>,
    state: StreamState,
    close_emitted: bool,
}

impl<T: Send + 'static> EventStream<T> {
    /// Wrap a raw event source.
    ///
    /// A source that finishes without emitting `Close` gets one synthesized.
    pub fn from_events<S>(source: S) -> Self
    where
        S: Stream<Item = StreamEvent<T>> + Send + 'static,
    {
        Self {
            inner: Some(source.boxed()),
            state: StreamState::Open,
            close_emitted: false,
        }
    }

    /// Wrap a fallible item stream, such as an HTTP body.
    ///
    /// Items become `Data`, the first error becomes `Error`, and exhaustion of
    /// the source becomes `End`.
    pub fn from_results<S, E>(source: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: Into<StreamError>,
    {
        let events = source
            .map(|result| match result {
                Ok(item) => StreamEvent::Data(item),
                Err(err) => StreamEvent::Error(err.into()),
            })
            .chain(stream::once(async { StreamEvent::End }));
        Self::from_events(events)
    }

    /// Create an in-process stream fed through an [`EventSender`].
    pub fn channel() -> (EventSender<T>, Self) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = stream::poll_fn(move |cx| rx.poll_recv(cx));
        (EventSender { tx }, Self::from_events(source))
    }

    /// Convert into a stream of results, dropping lifecycle events.
    pub fn into_results(self) -> impl Stream<Item = StreamResult<T>> + Send + 'static {
        self.filter_map(|event| {
            futures::future::ready(match event {
                StreamEvent::Data(item) => Some(Ok(item)),
                StreamEvent::Error(err) => Some(Err(err)),
                StreamEvent::End | StreamEvent::Close => None,
            })
        })
    }
}

impl<T> EventStream<T> {
    /// Create a stream that is already closed.
    ///
    /// It emits nothing, not even `Close`: nobody could have been listening
    /// when it closed.
    pub fn closed() -> Self {
        Self {
            inner: None,
            state: StreamState::Closed,
            close_emitted: true,
        }
    }

    /// Get the lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Check if data may still be read from this stream.
    pub fn is_readable(&self) -> bool {
        self.state.is_open()
    }

    /// Request the stream to close.
    ///
    /// The upstream source is dropped immediately. The next poll yields
    /// `Close` unless it was already emitted.
    pub fn close(&mut self) {
        if self.state != StreamState::Closed {
            tracing::trace!(state = ?self.state, "closing event stream");
        }
        self.finish();
    }

    fn finish(&mut self) {
        self.inner = None;
        self.state = StreamState::Closed;
    }
}

impl<T> Stream for EventStream<T> {
    type Item = StreamEvent<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match this.state {
                StreamState::Closed => {
                    if this.close_emitted {
                        return Poll::Ready(None);
                    }
                    this.close_emitted = true;
                    return Poll::Ready(Some(StreamEvent::Close));
                }
                // Only Close may follow Error or End.
                StreamState::Erroring | StreamState::Ending => {
                    this.finish();
                    continue;
                }
                StreamState::Open => {}
            }

            let Some(inner) = this.inner.as_mut() else {
                this.finish();
                continue;
            };

            match inner.poll_next_unpin(cx) {
                Poll::Ready(Some(StreamEvent::Data(item))) => {
                    return Poll::Ready(Some(StreamEvent::Data(item)));
                }
                Poll::Ready(Some(StreamEvent::Error(err))) => {
                    this.state = StreamState::Erroring;
                    return Poll::Ready(Some(StreamEvent::Error(err)));
                }
                Poll::Ready(Some(StreamEvent::End)) => {
                    this.state = StreamState::Ending;
                    return Poll::Ready(Some(StreamEvent::End));
                }
                Poll::Ready(Some(StreamEvent::Close)) | Poll::Ready(None) => {
                    this.finish();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<T> FusedStream for EventStream<T> {
    fn is_terminated(&self) -> bool {
        self.state == StreamState::Closed && self.close_emitted
    }
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("state", &self.state)
            .field("close_emitted", &self.close_emitted)
            .finish_non_exhaustive()
    }
}

/// Producer handle for a stream created with [`EventStream::channel`].
pub struct EventSender<T> {
    tx: mpsc::UnboundedSender<StreamEvent<T>>,
}

impl<T> EventSender<T> {
    /// Send a raw event.
    ///
    /// Fails with [`StreamError::AlreadyClosed`] once the consuming stream has
    /// been dropped or closed.
    pub fn send(&self, event: StreamEvent<T>) -> StreamResult<()> {
        self.tx.send(event).map_err(|_| StreamError::AlreadyClosed)
    }

    /// Send a payload.
    pub fn data(&self, item: T) -> StreamResult<()> {
        self.send(StreamEvent::Data(item))
    }

    /// Send an error.
    pub fn error(&self, err: StreamError) -> StreamResult<()> {
        self.send(StreamEvent::Error(err))
    }

    /// Signal a graceful end.
    pub fn end(&self) -> StreamResult<()> {
        self.send(StreamEvent::End)
    }

    /// Close the stream.
    pub fn close(&self) -> StreamResult<()> {
        self.send(StreamEvent::Close)
    }

    /// Check if the consumer went away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> fmt::Debug for EventSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("closed", &self.is_closed())
            .finish()
    }
}
