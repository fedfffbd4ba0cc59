//! Collecting stream payloads into a single future result.

use crate::frame::{Channel, Frame};
use bytes::Bytes;
use dockstream_core::{EventStream, StreamError, StreamEvent, StreamResult};
use futures::StreamExt;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Picks the payloads a [`Collect`] keeps.
///
/// Implemented for closures returning `Option`, for [`AllData`], and for
/// [`Channel`] over demultiplexed [`Frame`]s.
pub trait EventSelector<T> {
    /// Collected payload type.
    type Output;

    /// Return the payload to keep, or `None` to skip the item.
    fn select(&mut self, item: T) -> Option<Self::Output>;
}

impl<T, P, F> EventSelector<T> for F
where
    F: FnMut(T) -> Option<P>,
{
    type Output = P;

    fn select(&mut self, item: T) -> Option<P> {
        self(item)
    }
}

/// Selector keeping every payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllData;

impl<T> EventSelector<T> for AllData {
    type Output = T;

    fn select(&mut self, item: T) -> Option<T> {
        Some(item)
    }
}

impl EventSelector<Frame> for Channel {
    type Output = Bytes;

    fn select(&mut self, frame: Frame) -> Option<Bytes> {
        (frame.channel == *self).then_some(frame.payload)
    }
}

pin_project! {
    /// Future returned by [`collect`].
    ///
    /// Dropping it before it settles drops the stream it owns, which closes
    /// the upstream source.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct Collect<T, S>
    where
        S: EventSelector<T>,
    {
        stream: Option<EventStream<T>>,
        selector: S,
        items: Vec<S::Output>,
        failure: Option<StreamError>,
    }
}

impl<T, S> Collect<T, S>
where
    S: EventSelector<T>,
{
    /// Number of payloads collected so far.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing was collected yet.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T, S> Future for Collect<T, S>
where
    S: EventSelector<T>,
{
    type Output = StreamResult<Vec<S::Output>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        if let Some(err) = this.failure.take() {
            return Poll::Ready(Err(err));
        }

        let Some(stream) = this.stream.as_mut() else {
            return Poll::Ready(Err(StreamError::AlreadyClosed));
        };

        loop {
            match stream.poll_next_unpin(cx) {
                Poll::Ready(Some(StreamEvent::Data(item))) => {
                    if let Some(payload) = this.selector.select(item) {
                        this.items.push(payload);
                    }
                }
                Poll::Ready(Some(StreamEvent::End)) => {}
                Poll::Ready(Some(StreamEvent::Error(err))) => {
                    tracing::debug!(error = %err, collected = this.items.len(), "collect failed");
                    *this.stream = None;
                    this.items.clear();
                    return Poll::Ready(Err(err));
                }
                Poll::Ready(Some(StreamEvent::Close)) | Poll::Ready(None) => {
                    *this.stream = None;
                    return Poll::Ready(Ok(std::mem::take(this.items)));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Collect the payloads picked by `selector` until the stream closes.
///
/// The future resolves with the payloads in arrival order once the stream
/// closes, or fails with the first error the stream emits. A stream that is
/// not readable any more fails right away with
/// [`StreamError::AlreadyClosed`], since earlier payloads may have been
/// missed.
pub fn collect<T, S>(stream: EventStream<T>, selector: S) -> Collect<T, S>
where
    S: EventSelector<T>,
{
    let (stream, failure) = if stream.is_readable() {
        (Some(stream), None)
    } else {
        tracing::debug!(state = ?stream.state(), "cannot collect from a closed stream");
        (None, Some(StreamError::AlreadyClosed))
    };

    Collect {
        stream,
        selector,
        items: Vec::new(),
        failure,
    }
}

/// Collect every payload until the stream closes.
pub fn collect_data<T>(stream: EventStream<T>) -> Collect<T, AllData> {
    collect(stream, AllData)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[derive(Debug, Clone, PartialEq)]
    enum Progress {
        Status(&'static str),
        Ignored(&'static str),
    }

    fn statuses(event: Progress) -> Option<&'static str> {
        match event {
            Progress::Status(status) => Some(status),
            Progress::Ignored(_) => None,
        }
    }

    #[tokio::test]
    async fn test_closed_stream_rejects() {
        let result = collect_data(EventStream::<u8>::closed()).await;
        assert_eq!(result, Err(StreamError::AlreadyClosed));
    }

    #[tokio::test]
    async fn test_closed_stream_rejects_without_events() {
        let (_tx, mut stream) = EventStream::<u8>::channel();
        stream.close();

        let result = collect(stream, AllData).await;
        assert_eq!(result, Err(StreamError::AlreadyClosed));
    }

    #[tokio::test]
    async fn test_selected_events_are_buffered_in_order() {
        let (tx, stream) = EventStream::channel();
        let future = collect(stream, statuses);

        tx.data(Progress::Ignored("ignored")).unwrap();
        tx.data(Progress::Status("a")).unwrap();
        tx.data(Progress::Status("b")).unwrap();
        tx.close().unwrap();

        assert_eq!(future.await, Ok(vec!["a", "b"]));
    }

    #[tokio::test]
    async fn test_error_rejects_with_first_error() {
        let (tx, stream) = EventStream::channel();
        let future = collect(stream, statuses);

        tx.data(Progress::Ignored("ignored")).unwrap();
        tx.data(Progress::Status("a")).unwrap();
        tx.error(StreamError::upstream("value")).unwrap();
        tx.error(StreamError::upstream("ignored")).unwrap();
        tx.close().unwrap();

        assert_eq!(
            future.await,
            Err(StreamError::Upstream("value".to_string()))
        );
    }

    #[tokio::test]
    async fn test_empty_stream_resolves_empty() {
        let (tx, stream) = EventStream::<u8>::channel();
        tx.end().unwrap();

        assert_eq!(collect_data(stream).await, Ok(vec![]));
    }

    #[test]
    fn test_pending_until_close() {
        let (tx, stream) = EventStream::channel();
        let mut future = task::spawn(collect_data(stream));

        tx.data(1).unwrap();
        assert_pending!(future.poll());
        assert_eq!(future.len(), 1);

        tx.data(2).unwrap();
        tx.close().unwrap();
        assert!(future.is_woken());
        assert_ready_eq!(future.poll(), Ok(vec![1, 2]));
    }

    #[test]
    fn test_cancelling_closes_stream() {
        let (tx, stream) = EventStream::<u8>::channel();
        let mut future = task::spawn(collect_data(stream));
        assert_pending!(future.poll());
        assert!(!tx.is_closed());

        drop(future);

        assert!(tx.is_closed());
        assert_eq!(tx.data(1), Err(StreamError::AlreadyClosed));
    }

    #[tokio::test]
    async fn test_channel_selector() {
        let (tx, stream) = EventStream::channel();
        tx.data(Frame::new(Channel::Stdout, Bytes::from_static(b"out")))
            .unwrap();
        tx.data(Frame::new(Channel::Stderr, Bytes::from_static(b"err")))
            .unwrap();
        tx.end().unwrap();

        let stderr = collect(stream, Channel::Stderr).await.unwrap();
        assert_eq!(stderr, vec![Bytes::from_static(b"err")]);
    }
}
