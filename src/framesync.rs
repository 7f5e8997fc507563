//! Pull-style frame synchronization over the receive buffers.
//!
//! Receive buffers are filled at whatever cadence the transport delivers.
//! The types here let a consumer pull on its own clock instead:
//!
//! - [`VideoFrameSync`] hands out the newest video frame as a borrowed view.
//!   Only one capture may be outstanding; it must be released (or dropped)
//!   before the next.
//! - [`AudioFrameSync`] returns exactly `n` samples per channel per call,
//!   stitching them together from however many incoming segments it takes.
//!   No sample is skipped, duplicated or reordered, whatever the relation
//!   between request size and segment size.
//!
//! | Call | Nothing buffered | Contract violation |
//! |------|------------------|--------------------|
//! | `VideoFrameSync::capture` | `Ok(None)` | `Err(InvalidState)` |
//! | `AudioFrameSync::get_array` | `Ok(None)` | `Err(ShapeMismatch)` |
//!
//! # Example
//!
//! ```
//! use ndarray::Array2;
//! use ndi_framekit::{AudioFormat, AudioFrameSync, AudioRecvFrame};
//!
//! # fn main() -> Result<(), ndi_framekit::Error> {
//! let recv = AudioRecvFrame::with_format(8, AudioFormat::new(48000, 2)?)?;
//! recv.write_data(Array2::<f32>::zeros((2, 1000)).view(), 0)?;
//! recv.write_data(Array2::<f32>::zeros((2, 1000)).view(), 208_333)?;
//!
//! let sync = AudioFrameSync::new(&recv);
//! // 1601 samples is one frame of 29.97 fps audio at 48 kHz
//! let window = sync.get_array(1601)?.expect("enough samples buffered");
//! assert_eq!(window.dim(), (2, 1601));
//! assert_eq!(sync.available_samples(), 399);
//! assert!(sync.get_array(1601)?.is_none());
//! # Ok(())
//! # }
//! ```

use std::{
    fmt,
    ops::Deref,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use ndarray::{Array2, ArrayViewMut2};
use tracing::trace;

use crate::{
    audio_frame::AudioRecvFrame,
    video_frame::{VideoFrameView, VideoRecvFrame},
    Error, Result,
};

/// Single-outstanding-view capture of the newest video frame.
///
/// # Lifetime
///
/// The `'a` lifetime ties this sync to the [`VideoRecvFrame`] it reads, and
/// every captured frame to this sync.
pub struct VideoFrameSync<'a> {
    frame: &'a VideoRecvFrame,
    outstanding: AtomicBool,
}

impl<'a> VideoFrameSync<'a> {
    pub fn new(frame: &'a VideoRecvFrame) -> Self {
        Self {
            frame,
            outstanding: AtomicBool::new(false),
        }
    }

    pub fn frame(&self) -> &'a VideoRecvFrame {
        self.frame
    }

    /// 1 while a captured frame is alive, otherwise 0.
    pub fn num_outstanding(&self) -> usize {
        usize::from(self.outstanding.load(Ordering::Acquire))
    }

    /// Borrows the newest frame.
    ///
    /// Returns `Ok(None)` when no new frame arrived since the last capture.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if the previous capture has not been released.
    pub fn capture(&self) -> Result<Option<SyncedVideoFrame<'_>>> {
        if self
            .outstanding
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::InvalidState(
                "previous video capture has not been released".into(),
            ));
        }
        match self.frame.view() {
            Ok(Some(view)) => {
                trace!(timestamp = view.timestamp(), "video frame captured");
                Ok(Some(SyncedVideoFrame {
                    view,
                    outstanding: &self.outstanding,
                }))
            }
            other => {
                self.outstanding.store(false, Ordering::Release);
                other.map(|_| None)
            }
        }
    }

    /// Releases a captured frame. Dropping it has the same effect.
    pub fn release(&self, frame: SyncedVideoFrame<'_>) {
        drop(frame);
    }

    /// Blocks until a new frame is buffered.
    pub fn wait_for_frame(&self, timeout: Duration) -> bool {
        self.frame.wait_for_frame(timeout)
    }
}

impl fmt::Debug for VideoFrameSync<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrameSync")
            .field("num_outstanding", &self.num_outstanding())
            .finish()
    }
}

/// A frame captured through [`VideoFrameSync::capture`].
#[derive(Debug)]
pub struct SyncedVideoFrame<'a> {
    view: VideoFrameView<'a>,
    outstanding: &'a AtomicBool,
}

impl<'a> Deref for SyncedVideoFrame<'a> {
    type Target = VideoFrameView<'a>;

    fn deref(&self) -> &Self::Target {
        &self.view
    }
}

impl Drop for SyncedVideoFrame<'_> {
    fn drop(&mut self) {
        self.outstanding.store(false, Ordering::Release);
    }
}

/// Fixed-size audio windows over an [`AudioRecvFrame`].
#[derive(Debug)]
pub struct AudioFrameSync<'a> {
    frame: &'a AudioRecvFrame,
}

impl<'a> AudioFrameSync<'a> {
    pub fn new(frame: &'a AudioRecvFrame) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> &'a AudioRecvFrame {
        self.frame
    }

    /// Unread samples per channel.
    pub fn available_samples(&self) -> usize {
        self.frame.get_read_length()
    }

    /// Returns exactly `num_samples` per channel, or `Ok(None)` (consuming
    /// nothing) when fewer are buffered.
    pub fn get_array(&self, num_samples: usize) -> Result<Option<Array2<f32>>> {
        Ok(self
            .get_array_with_timestamp(num_samples)?
            .map(|(samples, _)| samples))
    }

    /// Like [`Self::get_array`], also returning the first sample's timestamp.
    pub fn get_array_with_timestamp(&self, num_samples: usize) -> Result<Option<(Array2<f32>, i64)>> {
        if num_samples == 0 {
            return Err(Error::InvalidConfiguration(
                "audio window must hold at least one sample".into(),
            ));
        }
        let Some(format) = self.frame.format() else {
            return Ok(None);
        };
        let mut samples = Array2::zeros((format.num_channels, num_samples));
        Ok(self
            .frame
            .read_exact_into(samples.view_mut())?
            .map(|timestamp| (samples, timestamp)))
    }

    /// Fills `dest` (`channels x n`) completely.
    ///
    /// Returns `Ok(false)` and leaves `dest` untouched when fewer than `n`
    /// samples are buffered.
    pub fn fill_array(&self, dest: ArrayViewMut2<'_, f32>) -> Result<bool> {
        if dest.ncols() == 0 {
            return Err(Error::InvalidConfiguration(
                "audio window must hold at least one sample".into(),
            ));
        }
        Ok(self.frame.read_exact_into(dest)?.is_some())
    }

    /// Blocks until `num_samples` per channel are buffered.
    pub fn wait_for_samples(&self, num_samples: usize, timeout: Duration) -> bool {
        self.frame.wait_for_samples(num_samples, timeout)
    }
}
