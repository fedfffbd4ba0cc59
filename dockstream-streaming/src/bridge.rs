//! Bridging a future-of-stream into a stream.
//!
//! The body of a remote call is usually not known until the request has been
//! dispatched and answered. [`bridge`] hands the caller an [`EventStream`]
//! right away and switches it over to the real stream once the future
//! resolves.

use dockstream_core::{EventStream, StreamError, StreamEvent, StreamResult};
use futures::future::BoxFuture;
use futures::{ready, stream, FutureExt, Stream, StreamExt};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// What a stream-producing future resolves with.
pub enum Upstream<T> {
    /// A live stream.
    Stream(EventStream<T>),
    /// The producer handed back something that is not a stream.
    Mismatch(String),
}

impl<T> Upstream<T> {
    /// Describe a non-stream resolution.
    pub fn mismatch(description: impl Into<String>) -> Self {
        Self::Mismatch(description.into())
    }
}

impl<T> From<EventStream<T>> for Upstream<T> {
    fn from(stream: EventStream<T>) -> Self {
        Self::Stream(stream)
    }
}

impl<T> From<Value> for Upstream<T> {
    fn from(value: Value) -> Self {
        let kind = match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        };
        Self::Mismatch(kind.to_string())
    }
}

impl<T> fmt::Debug for Upstream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
            Self::Mismatch(description) => f.debug_tuple("Mismatch").field(description).finish(),
        }
    }
}

/// Turn a future that resolves to a stream into a stream, immediately.
///
/// The future is polled once before returning:
///
/// - already failed: the returned stream is closed and emits nothing
/// - already resolved: the real stream is returned as is
/// - still pending: the returned stream waits for it. A later failure is
///   reported as [`StreamError::UpstreamRejected`] followed by `Close`, a
///   later success forwards every event of the real stream unchanged.
///
/// A [`Upstream::Mismatch`] resolution is reported as
/// [`StreamError::TypeMismatch`] followed by `Close`.
pub fn bridge<F, U, E, T>(future: F) -> EventStream<T>
where
    F: Future<Output = Result<U, E>> + Send + 'static,
    U: Into<Upstream<T>> + 'static,
    E: fmt::Display + 'static,
    T: Send + 'static,
{
    let mut pending: BoxFuture<'static, StreamResult<Upstream<T>>> = future
        .map(|result| result.map(Into::into).map_err(StreamError::rejected))
        .boxed();

    match (&mut pending).now_or_never() {
        Some(Ok(upstream)) => resolved(upstream),
        Some(Err(err)) => {
            tracing::debug!(error = %err, "upstream rejected before bridging");
            EventStream::closed()
        }
        None => EventStream::from_events(BridgeStream {
            state: BridgeState::Pending(pending),
        }),
    }
}

/// Extension trait for bridging futures with [`bridge`].
pub trait StreamFutureExt<T>: Future + Sized {
    /// Bridge this future into an [`EventStream`].
    fn into_event_stream(self) -> EventStream<T>;
}

impl<F, U, E, T> StreamFutureExt<T> for F
where
    F: Future<Output = Result<U, E>> + Send + 'static,
    U: Into<Upstream<T>> + 'static,
    E: fmt::Display + 'static,
    T: Send + 'static,
{
    fn into_event_stream(self) -> EventStream<T> {
        bridge(self)
    }
}

fn resolved<T: Send + 'static>(upstream: Upstream<T>) -> EventStream<T> {
    match upstream {
        Upstream::Stream(stream) => stream,
        Upstream::Mismatch(description) => {
            tracing::debug!(%description, "upstream resolved with a non-stream value");
            EventStream::from_events(stream::iter(vec![
                StreamEvent::Error(StreamError::TypeMismatch(description)),
                StreamEvent::Close,
            ]))
        }
    }
}

enum BridgeState<T> {
    Pending(BoxFuture<'static, StreamResult<Upstream<T>>>),
    Forwarding(EventStream<T>),
    Done,
}

struct BridgeStream<T> {
    state: BridgeState<T>,
}

impl<T: Send + 'static> Stream for BridgeStream<T> {
    type Item = StreamEvent<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match &mut this.state {
                BridgeState::Pending(future) => match ready!(future.poll_unpin(cx)) {
                    Ok(upstream) => {
                        tracing::trace!("upstream resolved, forwarding");
                        this.state = BridgeState::Forwarding(resolved(upstream));
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "upstream rejected");
                        this.state = BridgeState::Done;
                        return Poll::Ready(Some(StreamEvent::Error(err)));
                    }
                },
                BridgeState::Forwarding(stream) => return stream.poll_next_unpin(cx),
                BridgeState::Done => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use dockstream_core::StreamState;
    use serde_json::json;
    use tokio::sync::oneshot;
    use tokio_test::{assert_pending, task};

    type Deferred<T> = oneshot::Sender<Result<T, String>>;

    fn deferred<T: Send + 'static>() -> (Deferred<T>, impl Future<Output = Result<T, String>>) {
        let (tx, rx) = oneshot::channel();
        let future = async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err("deferred dropped".to_string()),
            }
        };
        (tx, future)
    }

    #[tokio::test]
    async fn test_rejected_future_gives_closed_stream() {
        let mut stream: EventStream<Bytes> =
            bridge(futures::future::ready(Err::<EventStream<Bytes>, _>("refused")));

        assert!(!stream.is_readable());
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_rejecting_future_emits_error_and_close() {
        let (deferred, future) = deferred::<EventStream<Bytes>>();
        let mut stream: EventStream<Bytes> = bridge(future);
        assert!(stream.is_readable());

        deferred.send(Err("boom".to_string())).unwrap();

        assert_eq!(
            stream.next().await,
            Some(StreamEvent::Error(StreamError::UpstreamRejected(
                "boom".to_string()
            )))
        );
        assert_eq!(stream.next().await, Some(StreamEvent::Close));
        assert_eq!(stream.next().await, None);
        assert!(!stream.is_readable());
    }

    #[tokio::test]
    async fn test_resolving_with_wrong_value_emits_error_and_close() {
        let (deferred, future) = deferred::<Value>();
        let stream: EventStream<Bytes> = bridge(future);
        assert!(stream.is_readable());

        deferred.send(Ok(json!("not a stream"))).unwrap();

        let events: Vec<_> = stream.collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Error(StreamError::TypeMismatch("string".to_string())),
                StreamEvent::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_resolved_stream_is_forwarded() {
        let (deferred, future) = deferred::<EventStream<Bytes>>();
        let stream: EventStream<Bytes> = bridge(future);

        let (tx, real) = EventStream::channel();
        deferred.send(Ok(real)).unwrap();
        tx.data(Bytes::from_static(b"hello")).unwrap();
        tx.end().unwrap();

        let events: Vec<_> = stream.collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Data(Bytes::from_static(b"hello")),
                StreamEvent::End,
                StreamEvent::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_forwarded_error_is_not_a_rejection() {
        let (deferred, future) = deferred::<EventStream<u32>>();
        let stream: EventStream<u32> = bridge(future);

        let (tx, real) = EventStream::channel();
        deferred.send(Ok(real)).unwrap();
        tx.data(1).unwrap();
        tx.error(StreamError::upstream("connection reset")).unwrap();

        let events: Vec<_> = stream.collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Data(1),
                StreamEvent::Error(StreamError::Upstream("connection reset".to_string())),
                StreamEvent::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_already_resolved_stream_is_returned_directly() {
        let (tx, real) = EventStream::<u32>::channel();
        let stream: EventStream<u32> =
            bridge(futures::future::ready(Ok::<_, String>(real)));

        assert_eq!(stream.state(), StreamState::Open);
        tx.data(5).unwrap();
        drop(tx);

        let events: Vec<_> = stream.collect().await;
        assert_eq!(events, vec![StreamEvent::Data(5), StreamEvent::Close]);
    }

    #[test]
    fn test_unresolved_future_stays_pending() {
        let (_deferred, future) = deferred::<EventStream<u32>>();
        let mut stream = task::spawn(bridge::<_, _, _, u32>(future));

        assert_pending!(stream.poll_next());
        assert!(stream.is_readable());
    }

    #[tokio::test]
    async fn test_extension_trait() {
        let future = futures::future::ready(Ok::<_, String>(Value::Null));
        let events: Vec<StreamEvent<u8>> = future.into_event_stream().collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Error(StreamError::TypeMismatch("null".to_string())),
                StreamEvent::Close,
            ]
        );
    }
}
