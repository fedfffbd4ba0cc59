//! # dockstream-core
//!
//! Core types for the dockstream streaming adapters.
//!
//! This crate provides the foundational pieces every adapter builds on:
//!
//! - **Events**: the closed set of [`StreamEvent`]s and the [`StreamState`] lifecycle
//! - **Streams**: [`EventStream`], a lifecycle-enforcing wrapper over any event source
//! - **Errors**: the [`StreamError`] taxonomy shared by all adapters
//!
//! ## Example
//!
//! ```rust
//! use dockstream_core::{EventStream, StreamEvent};
//! use futures::StreamExt;
//!
//! # tokio_test::block_on(async {
//! let (tx, stream) = EventStream::channel();
//! tx.data("hello").unwrap();
//! tx.end().unwrap();
//!
//! let events: Vec<_> = stream.collect().await;
//! assert_eq!(
//!     events,
//!     vec![StreamEvent::Data("hello"), StreamEvent::End, StreamEvent::Close]
//! );
//! # });
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod errors;
pub mod events;
pub mod stream;

// Re-exports for convenience
pub use errors::{StreamError, StreamResult};
pub use events::{EventKind, StreamEvent, StreamState};
pub use stream::{EventSender, EventStream};

/// Prelude module for common imports.
///
/// ```rust
/// use dockstream_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::errors::{StreamError, StreamResult};
    pub use crate::events::{EventKind, StreamEvent, StreamState};
    pub use crate::stream::{EventSender, EventStream};
}
