//! Demultiplexing interleaved stdout/stderr streams.
//!
//! [`Demultiplexer`] turns a byte stream in the framing described in
//! [`crate::frame`] into a stream of [`Frame`]s. [`split_channels`] then
//! hands out one independent stream per channel over that shared source.

use crate::config::StreamConfig;
use crate::frame::{Channel, Frame, FrameDecoder};
use bytes::Bytes;
use dockstream_core::{EventStream, StreamEvent};
use futures::{ready, Stream, StreamExt};
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

pin_project! {
    /// Stream adapter that decodes frames from a byte event stream.
    pub struct Demultiplexer<S> {
        #[pin]
        inner: S,
        decoder: FrameDecoder,
        pending: VecDeque<StreamEvent<Frame>>,
        finished: bool,
    }
}

impl<S> Demultiplexer<S>
where
    S: Stream<Item = StreamEvent<Bytes>>,
{
    /// Create a new demultiplexer.
    pub fn new(inner: S) -> Self {
        Self::with_decoder(inner, FrameDecoder::new())
    }

    /// Create a new demultiplexer with a preconfigured decoder.
    pub fn with_decoder(inner: S, decoder: FrameDecoder) -> Self {
        Self {
            inner,
            decoder,
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

impl<S> Stream for Demultiplexer<S>
where
    S: Stream<Item = StreamEvent<Bytes>>,
{
    type Item = StreamEvent<Frame>;

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
                    let result = this.decoder.feed(&chunk);
                    while let Some(frame) = this.decoder.next_frame() {
                        this.pending.push_back(StreamEvent::Data(frame));
                    }
                    if let Err(err) = result {
                        tracing::debug!(error = %err, "demultiplexing failed");
                        this.pending.push_back(StreamEvent::Error(err));
                        this.pending.push_back(StreamEvent::Close);
                        *this.finished = true;
                    }
                }
                Some(StreamEvent::End) => match this.decoder.finish() {
                    Ok(()) => this.pending.push_back(StreamEvent::End),
                    Err(err) => {
                        tracing::debug!(error = %err, "stream ended inside a frame");
                        this.pending.push_back(StreamEvent::Error(err));
                    }
                },
                Some(StreamEvent::Error(err)) => {
                    this.pending.push_back(StreamEvent::Error(err));
                    this.pending.push_back(StreamEvent::Close);
                    *this.finished = true;
                }
                Some(StreamEvent::Close) | None => {
                    if let Err(err) = this.decoder.finish() {
                        tracing::debug!(error = %err, "stream closed inside a frame");
                        this.pending.push_back(StreamEvent::Error(err));
                    }
                    this.pending.push_back(StreamEvent::Close);
                    *this.finished = true;
                }
            }
        }
    }
}

/// Demultiplex a byte stream into a combined stream of frames.
///
/// An input that is already closed gives an already closed output.
pub fn demux(input: EventStream<Bytes>) -> EventStream<Frame> {
    demux_with_config(input, &StreamConfig::default())
}

/// Demultiplex a byte stream into a combined stream of frames, with limits.
pub fn demux_with_config(input: EventStream<Bytes>, config: &StreamConfig) -> EventStream<Frame> {
    if !input.is_readable() {
        return EventStream::closed();
    }

    EventStream::from_events(Demultiplexer::with_decoder(
        input,
        FrameDecoder::with_config(config),
    ))
}

/// Independent per-channel streams over one demultiplexed source.
///
/// Each stream receives its own channel's payloads in source order. `Error`,
/// `End` and `Close` reach both. Drive both streams (or drop the one you do
/// not need): payloads for a live but idle stream are buffered until it is
/// polled.
///
/// Only the half that polled last is woken by the shared source. A half that
/// stops being polled must be dropped, for example the losing branch of a
/// `select!`, otherwise its sibling can stall.
#[derive(Debug)]
pub struct ChannelStreams {
    /// Standard output payloads.
    pub stdout: EventStream<Bytes>,
    /// Standard error payloads.
    pub stderr: EventStream<Bytes>,
}

impl ChannelStreams {
    /// Split into `(stdout, stderr)`.
    pub fn into_parts(self) -> (EventStream<Bytes>, EventStream<Bytes>) {
        (self.stdout, self.stderr)
    }
}

/// Split a combined frame stream into one stream per channel.
pub fn split_channels(combined: EventStream<Frame>) -> ChannelStreams {
    let readable = combined.is_readable();
    let shared = Arc::new(Mutex::new(SplitShared {
        source: combined,
        queues: [VecDeque::new(), VecDeque::new()],
        wakers: [None, None],
        attached: [true, true],
    }));

    let half = |channel| {
        if !readable {
            return EventStream::closed();
        }
        EventStream::from_events(ChannelHalf {
            channel,
            shared: Arc::clone(&shared),
        })
    };

    ChannelStreams {
        stdout: half(Channel::Stdout),
        stderr: half(Channel::Stderr),
    }
}

struct SplitShared {
    source: EventStream<Frame>,
    queues: [VecDeque<StreamEvent<Bytes>>; 2],
    wakers: [Option<Waker>; 2],
    attached: [bool; 2],
}

impl SplitShared {
    fn deliver(&mut self, index: usize, event: StreamEvent<Bytes>) {
        if !self.attached[index] {
            return;
        }
        self.queues[index].push_back(event);
        if let Some(waker) = self.wakers[index].take() {
            waker.wake();
        }
    }
}

struct ChannelHalf {
    channel: Channel,
    shared: Arc<Mutex<SplitShared>>,
}

impl Stream for ChannelHalf {
    type Item = StreamEvent<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let channel = self.channel;
        let own = channel.index();
        let other = 1 - own;

        let mut guard = self.shared.lock();
        let shared = &mut *guard;

        loop {
            if let Some(event) = shared.queues[own].pop_front() {
                return Poll::Ready(Some(event));
            }

            match shared.source.poll_next_unpin(cx) {
                Poll::Ready(Some(StreamEvent::Data(frame))) => {
                    if frame.channel == channel {
                        return Poll::Ready(Some(StreamEvent::Data(frame.payload)));
                    }
                    shared.deliver(other, StreamEvent::Data(frame.payload));
                }
                Poll::Ready(Some(event)) => {
                    let event = event.map(|frame| frame.payload);
                    shared.deliver(other, event.clone());
                    return Poll::Ready(Some(event));
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => {
                    shared.wakers[own] = Some(cx.waker().clone());
                    return Poll::Pending;
                }
            }
        }
    }
}

impl Drop for ChannelHalf {
    fn drop(&mut self) {
        let index = self.channel.index();
        let mut shared = self.shared.lock();
        shared.attached[index] = false;
        shared.queues[index].clear();
        shared.wakers[index] = None;
        // The source may hold this half's waker; let the sibling re-register.
        if let Some(waker) = shared.wakers[1 - index].take() {
            waker.wake();
        }
    }
}

impl fmt::Debug for ChannelHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHalf")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
