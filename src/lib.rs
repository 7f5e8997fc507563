//! Frame buffering, frame synchronization and format engines for NDI®-style
//! video transports.
//!
//! This crate sits between an opaque video-over-IP transport and application
//! code. The transport delivers and consumes raw frames on its own threads;
//! the crate buffers them, paces them and converts their pixel, colour and
//! audio-level formats.
//!
//! # Quick Start
//!
//! ```
//! use std::{sync::Arc, time::Duration};
//! use ndi_framekit::{
//!     AudioFormat, FourCC, LoopbackTransport, Receiver, ReceiverOptions, Sender,
//!     SenderOptions, VideoFormat, VideoFrameSync,
//! };
//!
//! # fn main() -> Result<(), ndi_framekit::Error> {
//! // Any `SendTransport`/`RecvTransport` pair works; the loopback keeps it in memory
//! let transport = Arc::new(LoopbackTransport::default());
//!
//! let format = VideoFormat::builder()
//!     .fourcc(FourCC::UYVY)
//!     .resolution(8, 4)
//!     .frame_rate(30000, 1001)
//!     .build()?;
//! let options = SenderOptions::builder("Camera 1").clock_video(false).build()?;
//! let sender = Sender::new(Arc::clone(&transport), options, format, AudioFormat::default(), 1602)?;
//! let receiver = Receiver::new(Arc::clone(&transport), ReceiverOptions::default())?;
//!
//! sender.open();
//! sender.write_video(&vec![128u8; format.buffer_size()], 0)?;
//! receiver.receive(Duration::from_millis(100))?;
//!
//! let sync = VideoFrameSync::new(receiver.video_frame());
//! if let Some(frame) = sync.capture()? {
//!     let rgba = frame.to_rgba8()?;
//!     assert_eq!(rgba.len(), 8 * 4 * 4);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Core Concepts
//!
//! ## Receive buffers
//!
//! [`VideoRecvFrame`] and [`AudioRecvFrame`] are fixed-capacity rings built on
//! [`RingBuffer`]. When full, the oldest segment is evicted. Video frames can
//! be borrowed without copying through [`VideoFrameView`]; a viewed slot is
//! never overwritten.
//!
//! ## Send frames
//!
//! [`VideoSendFrame`] and [`AudioSendFrame`] stage outgoing data in slots
//! tracked by [`SendFrameStatus`], which guarantees the slot the transport is
//! reading is never written.
//!
//! ## Frame sync
//!
//! [`VideoFrameSync`] hands out the newest frame with a single-outstanding
//! capture/release contract; [`AudioFrameSync`] returns exactly `n` samples
//! per call regardless of how the transport segmented them.
//!
//! ## Format engines
//!
//! - [`ImageReader`] unpacks every [`FourCC`] into component arrays and packs
//!   them back.
//! - [`ColorFormat`] converts between RGB and YUV (Rec. 601, 709, 2020) at 8
//!   to 16 bits, studio or full range.
//! - [`AudioReferenceConverter`] rescales audio between the wire level and
//!   dBu, dBVU or dBFS references.
//!
//! # Thread Safety
//!
//! Every buffer and send frame is `Send + Sync` and guarded by exactly one
//! lock, so no operation ever holds two buffers' locks at once. Blocking
//! waits take a timeout and return `false` when it expires.
//!
//! # Features
//!
//! - `image-encoding`: PNG, JPEG and data-URL encoding of received frames.
//! - `tokio` / `async-std`: async wrappers that run blocking waits on the
//!   runtime's blocking pool.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

// Internal modules
mod error;
mod waitable_completion;

// Public modules
pub mod audio_frame;
pub mod audio_reference;
pub mod frames;
pub mod framesync;
pub mod pixel;
pub mod receiver;
pub mod ring_buffer;
pub mod send_frame_status;
pub mod sender;
pub mod state;
pub mod transport;
pub mod video_frame;
pub mod yuv;

#[cfg(any(feature = "tokio", feature = "async-std"))]
mod async_runtime;

#[cfg(feature = "async-std")]
pub use async_runtime::async_std;
#[cfg(feature = "tokio")]
pub use async_runtime::tokio;

// Re-exports
pub use {
    audio_frame::{AudioRecvFrame, AudioSendFrame},
    audio_reference::{AudioReference, AudioReferenceConverter},
    error::*,
    frames::{
        AudioFormat, ChromaSubsampling, FourCC, FrameRate, ScanType, VideoFormat,
        VideoFormatBuilder,
    },
    framesync::{AudioFrameSync, SyncedVideoFrame, VideoFrameSync},
    pixel::{ImageFormat, ImageReader, PixelComponent},
    receiver::{ReceiveWorker, Receiver, ReceiverOptions, ReceiverOptionsBuilder, ReceiverStats},
    ring_buffer::{FrameSlot, RecvBufferOptions, RecvBufferOptionsBuilder, RingBuffer, WriteOutcome},
    send_frame_status::SendFrameStatus,
    sender::{Sender, SenderOptions, SenderOptionsBuilder},
    state::StateGroup,
    transport::{
        FrameSink, FrameType, LoopbackTransport, RawAudioFrame, RawVideoFrame, RecvTransport,
        SendTransport,
    },
    video_frame::{to_rgba8, VideoFrameView, VideoRecvFrame, VideoSendFrame},
    yuv::{ColorFormat, ColorStandard, Scaling},
};

#[cfg(feature = "image-encoding")]
pub use video_frame::ImageEncoding;

/// Alias for Result with our Error type
pub type Result<T> = std::result::Result<T, crate::error::Error>;
