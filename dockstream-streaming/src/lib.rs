//! # dockstream-streaming
//!
//! Stream adapters for container engine API replies.
//!
//! This crate turns raw HTTP bodies into typed [`EventStream`]s and back
//! into plain futures.
//!
//! ## Core Concepts
//!
//! - **[`bridge()`]**: Turn a future-of-stream into a stream right away
//! - **[`json::decode`]**: Split concatenated JSON documents into values
//! - **[`demux()`]**: Split interleaved stdout/stderr frames
//! - **[`collect()`]**: Buffer selected payloads until the stream closes
//!
//! ## Example - Decoding a progress stream
//!
//! ```rust
//! use bytes::Bytes;
//! use dockstream_streaming::{collect_data, json, EventStream};
//! use serde_json::Value;
//!
//! # tokio_test::block_on(async {
//! let (tx, body) = EventStream::channel();
//! tx.data(Bytes::from_static(b"{\"status\":\"a\"}{\"sta")).unwrap();
//! tx.data(Bytes::from_static(b"tus\":\"b\"}")).unwrap();
//! tx.end().unwrap();
//!
//! let values: Vec<Value> = collect_data(json::decode(body)).await.unwrap();
//! assert_eq!(values[1], serde_json::json!({"status": "b"}));
//! # });
//! ```
//!
//! ## Example - Demultiplexing
//!
//! ```rust
//! use bytes::Bytes;
//! use dockstream_streaming::{collect, demux, encode_frame, Channel, EventStream};
//!
//! # tokio_test::block_on(async {
//! let (tx, body) = EventStream::channel();
//! tx.data(encode_frame(Channel::Stdout, b"out").unwrap()).unwrap();
//! tx.data(encode_frame(Channel::Stderr, b"err").unwrap()).unwrap();
//! tx.end().unwrap();
//!
//! let stderr = collect(demux(body), Channel::Stderr).await.unwrap();
//! assert_eq!(stderr, vec![Bytes::from_static(b"err")]);
//! # });
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod bridge;
pub mod collect;
pub mod config;
pub mod demux;
pub mod frame;
pub mod json;

// Re-exports
pub use bridge::{bridge, StreamFutureExt, Upstream};
pub use collect::{collect, collect_data, AllData, Collect, EventSelector};
pub use config::StreamConfig;
pub use demux::{demux, demux_with_config, split_channels, ChannelStreams, Demultiplexer};
pub use frame::{encode_frame, Channel, Frame, FrameDecoder, FrameHeader};
pub use json::{JsonDecoder, JsonStream};

pub use dockstream_core::{
    EventKind, EventSender, EventStream, StreamError, StreamEvent, StreamResult, StreamState,
};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::bridge::{bridge, StreamFutureExt, Upstream};
    pub use crate::collect::{collect, collect_data, EventSelector};
    pub use crate::config::StreamConfig;
    pub use crate::demux::{demux, split_channels, ChannelStreams};
    pub use crate::frame::{Channel, Frame};
    pub use dockstream_core::prelude::*;
}
