//! Decoder configuration.

use serde::{Deserialize, Serialize};

/// Limits applied by the decoding adapters.
///
/// Both limits default to `None`: decode and frame buffers grow for as long as
/// the input stays well-formed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Maximum number of bytes a decoder may hold while waiting for a
    /// complete value or frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_buffer_size: Option<usize>,

    /// Maximum payload length a frame header may announce.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frame_size: Option<u32>,
}

impl StreamConfig {
    /// Default buffer cap used by [`StreamConfig::bounded`].
    pub const DEFAULT_MAX_BUFFER_SIZE: usize = 10 * 1024 * 1024;

    /// Default frame cap used by [`StreamConfig::bounded`].
    pub const DEFAULT_MAX_FRAME_SIZE: u32 = 8 * 1024 * 1024;

    /// Create an unbounded configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with conservative limits.
    #[must_use]
    pub fn bounded() -> Self {
        Self::new()
            .max_buffer_size(Self::DEFAULT_MAX_BUFFER_SIZE)
            .max_frame_size(Self::DEFAULT_MAX_FRAME_SIZE)
    }

    /// Set the buffer cap.
    #[must_use]
    pub fn max_buffer_size(mut self, bytes: usize) -> Self {
        self.max_buffer_size = Some(bytes);
        self
    }

    /// Set the frame cap.
    #[must_use]
    pub fn max_frame_size(mut self, bytes: u32) -> Self {
        self.max_frame_size = Some(bytes);
        self
    }
}
