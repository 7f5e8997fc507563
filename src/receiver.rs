//! Receiving side: pulls frames out of a [`RecvTransport`] into receive
//! buffers.
//!
//! A [`Receiver`] owns one [`VideoRecvFrame`] and one [`AudioRecvFrame`]
//! behind [`Arc`]s, so consumers (typically through [`crate::VideoFrameSync`]
//! and [`crate::AudioFrameSync`]) can read on their own threads while the
//! receiver writes. A video format change on the wire reconfigures the video
//! buffer; an audio format change resets the audio buffer.
//!
//! [`Receiver::receive`] handles one frame on the calling thread;
//! [`Receiver::spawn`] runs the same loop on a background thread.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, trace, warn};

use crate::{
    audio_frame::AudioRecvFrame,
    audio_reference::AudioReference,
    ring_buffer::{RecvBufferOptions, DEFAULT_MAX_BUFFERS},
    transport::{FrameSink, FrameType, RawAudioFrame, RawVideoFrame, RecvTransport},
    video_frame::VideoRecvFrame,
    Error, Result,
};

/// Metadata messages kept for [`Receiver::take_metadata`].
const METADATA_BACKLOG: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceiverOptions {
    pub max_video_buffers: usize,
    pub max_audio_buffers: usize,
    /// Level applied to received audio on read.
    pub audio_reference: AudioReference,
    /// Per-iteration wait of the background receive loop.
    pub capture_timeout: Duration,
}

impl ReceiverOptions {
    /// Create a builder for configuring receiver options
    pub fn builder() -> ReceiverOptionsBuilder {
        ReceiverOptionsBuilder::default()
    }
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            max_video_buffers: DEFAULT_MAX_BUFFERS,
            max_audio_buffers: DEFAULT_MAX_BUFFERS,
            audio_reference: AudioReference::default(),
            capture_timeout: Duration::from_millis(100),
        }
    }
}

/// Builder for [`ReceiverOptions`]
#[derive(Debug, Clone, Default)]
pub struct ReceiverOptionsBuilder {
    max_video_buffers: Option<usize>,
    max_audio_buffers: Option<usize>,
    audio_reference: Option<AudioReference>,
    capture_timeout: Option<Duration>,
}

impl ReceiverOptionsBuilder {
    /// Set the number of video ring slots
    #[must_use]
    pub fn max_video_buffers(mut self, max_buffers: usize) -> Self {
        self.max_video_buffers = Some(max_buffers);
        self
    }

    /// Set the number of audio ring slots
    #[must_use]
    pub fn max_audio_buffers(mut self, max_buffers: usize) -> Self {
        self.max_audio_buffers = Some(max_buffers);
        self
    }

    /// Set the reference level applied when reading audio
    #[must_use]
    pub fn audio_reference(mut self, reference: AudioReference) -> Self {
        self.audio_reference = Some(reference);
        self
    }

    /// Set how long the background loop waits for each frame
    #[must_use]
    pub fn capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = Some(timeout);
        self
    }

    /// Build the `ReceiverOptions`
    ///
    /// # Errors
    ///
    /// Returns an error if either buffer count is zero or the capture timeout
    /// is zero.
    pub fn build(self) -> Result<ReceiverOptions> {
        let defaults = ReceiverOptions::default();
        let video = RecvBufferOptions::builder()
            .max_buffers(self.max_video_buffers.unwrap_or(defaults.max_video_buffers))
            .build()?;
        let audio = RecvBufferOptions::builder()
            .max_buffers(self.max_audio_buffers.unwrap_or(defaults.max_audio_buffers))
            .build()?;
        let capture_timeout = self.capture_timeout.unwrap_or(defaults.capture_timeout);
        if capture_timeout.is_zero() {
            return Err(Error::InvalidConfiguration(
                "capture timeout must be non-zero".into(),
            ));
        }
        Ok(ReceiverOptions {
            max_video_buffers: video.max_buffers,
            max_audio_buffers: audio.max_buffers,
            audio_reference: self.audio_reference.unwrap_or(defaults.audio_reference),
            capture_timeout,
        })
    }
}

/// Frame counters since the receiver was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub video_frames: u64,
    pub audio_frames: u64,
    pub metadata_frames: u64,
    /// Video frames dropped because the target slot was still viewed.
    pub dropped_video_frames: u64,
    pub status_changes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    video: AtomicU64,
    audio: AtomicU64,
    metadata: AtomicU64,
    dropped_video: AtomicU64,
    status_changes: AtomicU64,
}

struct BufferSink<'a> {
    video: &'a VideoRecvFrame,
    audio: &'a AudioRecvFrame,
    metadata: &'a Mutex<VecDeque<(String, i64)>>,
    counters: &'a Counters,
}

impl FrameSink for BufferSink<'_> {
    fn video(&mut self, frame: RawVideoFrame<'_>) -> Result<()> {
        match self.video.write_frame(frame) {
            Ok(_) => {
                self.counters.video.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(Error::SlotInUse { index, views }) => {
                self.counters.dropped_video.fetch_add(1, Ordering::Relaxed);
                trace!(index, views, "video frame dropped, slot still viewed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn audio(&mut self, frame: RawAudioFrame<'_>) -> Result<()> {
        self.audio.write_planar(frame)?;
        self.counters.audio.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn metadata(&mut self, data: &str, timestamp: i64) -> Result<()> {
        let mut backlog = self
            .metadata
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if backlog.len() == METADATA_BACKLOG {
            backlog.pop_front();
        }
        backlog.push_back((data.to_owned(), timestamp));
        self.counters.metadata.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Pulls frames from a [`RecvTransport`] into shared receive buffers.
#[derive(Debug)]
pub struct Receiver<T: RecvTransport> {
    transport: Arc<T>,
    options: ReceiverOptions,
    video: Arc<VideoRecvFrame>,
    audio: Arc<AudioRecvFrame>,
    metadata: Mutex<VecDeque<(String, i64)>>,
    counters: Counters,
}

impl<T: RecvTransport> Receiver<T> {
    pub fn new(transport: Arc<T>, options: ReceiverOptions) -> Result<Self> {
        let video = VideoRecvFrame::new(options.max_video_buffers)?;
        let audio = AudioRecvFrame::new(options.max_audio_buffers)?;
        audio.set_reference_level(options.audio_reference);
        Ok(Self {
            transport,
            options,
            video: Arc::new(video),
            audio: Arc::new(audio),
            metadata: Mutex::new(VecDeque::with_capacity(METADATA_BACKLOG)),
            counters: Counters::default(),
        })
    }

    pub fn options(&self) -> &ReceiverOptions {
        &self.options
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn video_frame(&self) -> &Arc<VideoRecvFrame> {
        &self.video
    }

    pub fn audio_frame(&self) -> &Arc<AudioRecvFrame> {
        &self.audio
    }

    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            video_frames: self.counters.video.load(Ordering::Relaxed),
            audio_frames: self.counters.audio.load(Ordering::Relaxed),
            metadata_frames: self.counters.metadata.load(Ordering::Relaxed),
            dropped_video_frames: self.counters.dropped_video.load(Ordering::Relaxed),
            status_changes: self.counters.status_changes.load(Ordering::Relaxed),
        }
    }

    /// Drains buffered metadata messages with their timestamps, oldest first.
    pub fn take_metadata(&self) -> Vec<(String, i64)> {
        self.metadata
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect()
    }

    /// Waits up to `timeout` for one frame and stores it.
    ///
    /// Returns [`FrameType::None`] on timeout. A video frame that can not be
    /// stored because its slot is still viewed is counted in
    /// [`ReceiverStats::dropped_video_frames`] and still reported as video.
    pub fn receive(&self, timeout: Duration) -> Result<FrameType> {
        let mut sink = BufferSink {
            video: &self.video,
            audio: &self.audio,
            metadata: &self.metadata,
            counters: &self.counters,
        };
        let frame_type = self.transport.capture(timeout, &mut sink)?;
        if frame_type == FrameType::StatusChange {
            self.counters.status_changes.fetch_add(1, Ordering::Relaxed);
            debug!("transport reported a status change");
        }
        Ok(frame_type)
    }
}

impl<T: RecvTransport + 'static> Receiver<T> {
    /// Runs [`Self::receive`] on a background thread until the returned
    /// handle is stopped or dropped.
    ///
    /// Transport errors are logged and the loop keeps going.
    pub fn spawn(self: &Arc<Self>) -> Result<ReceiveWorker> {
        let stop = Arc::new(AtomicBool::new(false));
        let receiver = Arc::clone(self);
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("ndi-framekit-recv".into())
            .spawn(move || {
                debug!("receive loop started");
                let timeout = receiver.options.capture_timeout;
                let mut handled = 0u64;
                while !flag.load(Ordering::Acquire) {
                    match receiver.receive(timeout) {
                        Ok(FrameType::None) => {}
                        Ok(_) => handled += 1,
                        Err(e) => warn!(error = %e, "receive failed"),
                    }
                }
                debug!(handled, "receive loop stopped");
                handled
            })
            .map_err(|e| Error::InvalidState(format!("failed to spawn receive thread: {e}")))?;
        Ok(ReceiveWorker {
            stop,
            handle: Some(handle),
        })
    }
}

/// Handle to a background receive loop started by [`Receiver::spawn`].
#[derive(Debug)]
pub struct ReceiveWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl ReceiveWorker {
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the loop and returns how many frames it handled.
    ///
    /// Returns within one capture timeout.
    pub fn stop(mut self) -> Result<u64> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<u64> {
        self.stop.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::InvalidState("receive thread panicked".into())),
            None => Ok(0),
        }
    }
}

impl Drop for ReceiveWorker {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "receive worker shutdown failed");
        }
    }
}
