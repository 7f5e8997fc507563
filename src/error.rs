//! Error types for the ndi-framekit library.

use thiserror::Error;

use crate::frames::FourCC;

/// The main error type for frame buffering and format conversion.
///
/// Every failure path leaves the data structure that raised it in its last
/// fully-consistent state, so callers may retry after handling the error.
#[derive(Debug, Error)]
pub enum Error {
    /// A read was attempted while no valid slots were buffered.
    ///
    /// This is recoverable; poll again or wait for data.
    #[error("Buffer is empty")]
    EmptyBuffer,

    /// The payload does not match the buffer's established per-slot size.
    #[error("Buffer size mismatch: expected {expected} elements, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// An operation was called in a state that does not allow it.
    ///
    /// For example capturing a second frame-sync view without releasing the first.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The raw buffer length does not match the geometry computed for its FourCC.
    #[error("Invalid buffer size for {fourcc:?}: expected {expected} bytes, got {actual}")]
    InvalidBufferSize {
        fourcc: FourCC,
        expected: usize,
        actual: usize,
    },

    /// A slot could not grow to hold an incoming payload.
    ///
    /// The slot keeps its previous contents.
    #[error("Allocation failed: {0}")]
    AllocationFailure(String),

    /// The ring slot about to be written is still exposed through a view.
    #[error("Slot {index} is referenced by {views} outstanding view(s)")]
    SlotInUse { index: usize, views: usize },

    /// The send slot about to be written is still pending on the transport.
    #[error("Send slot {index} is still pending on the transport")]
    SlotPending { index: usize },

    /// An array argument has the wrong shape.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Configuration parameters are invalid.
    ///
    /// This can occur when builder validation fails or conflicting options are set.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Frame data is invalid or corrupted.
    #[error("Invalid frame data: {0}")]
    InvalidFrame(String),

    /// The transport reported a failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Image encoding failed.
    #[error("Image encoding failed: {0}")]
    Encoding(String),
}
