//! # dockstream - Streaming Adapters for Container Engine APIs
//!
//! dockstream turns the long-lived response bodies of a container engine API
//! (image pulls, build logs, attached container output) into typed event
//! streams you can poll, decode, collect and split.
//!
//! ## Quick Start
//!
//! ```rust
//! use bytes::Bytes;
//! use dockstream::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let parser = StreamingParser::new();
//!
//! // Normally the future of an HTTP request returning the body.
//! let (tx, body) = EventStream::channel();
//! let progress = parser.parse_json_stream(async move { Ok::<_, String>(body) });
//!
//! tx.data(Bytes::from_static(b"{\"status\":\"Pulling\"}{\"status\":\"Done\"}"))
//!     .unwrap();
//! tx.end().unwrap();
//!
//! let values = parser.deferred_stream(progress, AllData).await.unwrap();
//! assert_eq!(values.len(), 2);
//! # });
//! ```
//!
//! ## Key Features
//!
//! - **Immediate streams** for responses that have not arrived yet
//! - **JSON splitting** for bodies made of concatenated documents
//! - **Collecting** selected payloads into a single future
//! - **Demultiplexing** of interleaved stdout/stderr output
//! - **Explicit lifecycle**: every stream ends with exactly one `Close`
//!
//! ## Architecture
//!
//! dockstream is organized as a workspace of focused crates:
//!
//! - [`dockstream_core`] - Stream events, lifecycle and errors
//! - [`dockstream_streaming`] - Bridging, decoding, collecting and demultiplexing

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod parser;

// ============================================================================
// Crate Re-exports
// ============================================================================

/// Core events, streams and errors.
pub use dockstream_core as core;

/// Stream adapters.
pub use dockstream_streaming as streaming;

// ============================================================================
// Type Re-exports (Flat)
// ============================================================================

pub use dockstream_core::{
    EventKind, EventSender, EventStream, StreamError, StreamEvent, StreamResult, StreamState,
};

pub use dockstream_streaming::{
    bridge, collect, collect_data, demux, encode_frame, split_channels, AllData, Channel,
    ChannelStreams, Collect, EventSelector, Frame, StreamConfig, StreamFutureExt, Upstream,
};

pub use parser::StreamingParser;

// ============================================================================
// Prelude
// ============================================================================

/// Prelude module for common imports.
///
/// ```rust
/// use dockstream::prelude::*;
/// ```
pub mod prelude {
    pub use crate::parser::StreamingParser;
    pub use dockstream_core::prelude::*;
    pub use dockstream_streaming::{
        AllData, Channel, ChannelStreams, EventSelector, Frame, StreamConfig, StreamFutureExt,
        Upstream,
    };
}
