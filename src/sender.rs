//! Sending side: stages frames in send slots and pushes them through a
//! [`SendTransport`].
//!
//! A [`Sender`] owns one [`VideoSendFrame`] and one [`AudioSendFrame`]. Every
//! write copies the caller's data into the next free slot, hands that slot
//! to the transport and marks it complete once the transport is done with it.
//!
//! # Async video
//!
//! [`Sender::write_video_async`] leaves the slot referenced by the transport
//! after the call returns, so the caller may immediately prepare the next
//! frame. The slot is released by the next video send, by [`Sender::flush`]
//! or by [`Sender::close`].
//!
//! # Clocking
//!
//! With `clock_video` enabled, video writes are paced to the configured frame
//! rate; with `clock_audio`, audio writes are paced to the duration of each
//! segment. Unclocked writes return as soon as the transport accepts them.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ndi_framekit::{
//!     AudioFormat, FourCC, LoopbackTransport, Sender, SenderOptions, VideoFormat,
//! };
//!
//! # fn main() -> Result<(), ndi_framekit::Error> {
//! let transport = Arc::new(LoopbackTransport::default());
//! let options = SenderOptions::builder("Studio A")
//!     .clock_video(false)
//!     .clock_audio(false)
//!     .build()?;
//! let video = VideoFormat::builder()
//!     .fourcc(FourCC::BGRA)
//!     .resolution(4, 2)
//!     .build()?;
//! let sender = Sender::new(Arc::clone(&transport), options, video, AudioFormat::default(), 1600)?;
//!
//! sender.open();
//! sender.write_video(&[0u8; 4 * 2 * 4], 0)?;
//! assert_eq!(transport.queued(), 1);
//! sender.close()?;
//! # Ok(())
//! # }
//! ```

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread,
    time::{Duration, Instant},
};

use ndarray::{ArrayView2, ArrayView3};
use tracing::{debug, trace, warn};

use crate::{
    audio_frame::AudioSendFrame,
    frames::{AudioFormat, VideoFormat},
    pixel::PixelComponent,
    transport::SendTransport,
    video_frame::VideoSendFrame,
    Error, Result,
};

#[derive(Debug, Clone)]
pub struct SenderOptions {
    pub name: String,
    /// Pace video writes to the frame rate.
    pub clock_video: bool,
    /// Pace audio writes to the segment duration.
    pub clock_audio: bool,
}

impl SenderOptions {
    /// Create a builder for configuring sender options
    pub fn builder<S: Into<String>>(name: S) -> SenderOptionsBuilder {
        SenderOptionsBuilder::new(name)
    }
}

/// Builder for [`SenderOptions`]
#[derive(Debug, Clone)]
pub struct SenderOptionsBuilder {
    name: String,
    clock_video: Option<bool>,
    clock_audio: Option<bool>,
}

impl SenderOptionsBuilder {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            clock_video: None,
            clock_audio: None,
        }
    }

    /// Configure whether to clock video
    #[must_use]
    pub fn clock_video(mut self, clock: bool) -> Self {
        self.clock_video = Some(clock);
        self
    }

    /// Configure whether to clock audio
    #[must_use]
    pub fn clock_audio(mut self, clock: bool) -> Self {
        self.clock_audio = Some(clock);
        self
    }

    /// Build the `SenderOptions`
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or contains only whitespace.
    pub fn build(self) -> Result<SenderOptions> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "Sender name cannot be empty or contain only whitespace".into(),
            ));
        }
        Ok(SenderOptions {
            name: self.name,
            clock_video: self.clock_video.unwrap_or(true),
            clock_audio: self.clock_audio.unwrap_or(true),
        })
    }
}

/// Sleeps so that consecutive ticks are at least one period apart.
#[derive(Debug, Default)]
struct FrameClock {
    next: Option<Instant>,
}

impl FrameClock {
    fn tick(&mut self, period: Duration) {
        let now = Instant::now();
        let start = match self.next {
            Some(next) if next > now => {
                thread::sleep(next - now);
                next
            }
            _ => now,
        };
        self.next = Some(start + period);
    }

    fn reset(&mut self) {
        self.next = None;
    }
}

fn ticks_to_duration(ticks: i64) -> Duration {
    Duration::from_nanos(u64::try_from(ticks).unwrap_or(0) * 100)
}

/// Pushes video, audio and metadata through a [`SendTransport`].
///
/// All methods take `&self`; video and audio may be written from different
/// threads. Writes on the same media type are serialized.
#[derive(Debug)]
pub struct Sender<T: SendTransport> {
    transport: Arc<T>,
    options: SenderOptions,
    video: VideoSendFrame,
    audio: AudioSendFrame,
    open: AtomicBool,
    async_video: AtomicBool,
    video_clock: Mutex<FrameClock>,
    audio_clock: Mutex<FrameClock>,
}

fn lock_clock(clock: &Mutex<FrameClock>) -> MutexGuard<'_, FrameClock> {
    clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: SendTransport> Sender<T> {
    /// Creates a closed sender.
    ///
    /// `max_audio_samples` bounds the samples per channel of one audio write.
    pub fn new(
        transport: Arc<T>,
        options: SenderOptions,
        video_format: VideoFormat,
        audio_format: AudioFormat,
        max_audio_samples: usize,
    ) -> Result<Self> {
        let video = VideoSendFrame::new(video_format)?;
        let audio = AudioSendFrame::new(audio_format, max_audio_samples)?;
        debug!(name = %options.name, "sender created");
        Ok(Self {
            transport,
            options,
            video,
            audio,
            open: AtomicBool::new(false),
            async_video: AtomicBool::new(false),
            video_clock: Mutex::new(FrameClock::default()),
            audio_clock: Mutex::new(FrameClock::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn options(&self) -> &SenderOptions {
        &self.options
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn video_frame(&self) -> &VideoSendFrame {
        &self.video
    }

    pub fn audio_frame(&self) -> &AudioSendFrame {
        &self.audio
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Activates both send frames. Opening twice is a no-op.
    pub fn open(&self) {
        if self.open.swap(true, Ordering::AcqRel) {
            return;
        }
        self.video.set_sender_status(true);
        self.audio.set_sender_status(true);
        lock_clock(&self.video_clock).reset();
        lock_clock(&self.audio_clock).reset();
        debug!(name = %self.options.name, "sender opened");
    }

    /// Releases any in-flight async video and deactivates both frames.
    pub fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let flushed = self.flush();
        self.video.set_sender_status(false);
        self.audio.set_sender_status(false);
        debug!(name = %self.options.name, "sender closed");
        flushed
    }

    fn require_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "sender {:?} is not open",
                self.options.name
            )))
        }
    }

    /// Changes the video format, flushing any async frame first.
    pub fn set_video_format(&self, format: VideoFormat) -> Result<()> {
        let _clock = lock_clock(&self.video_clock);
        self.flush_locked()?;
        self.video.set_format(format)
    }

    pub fn set_audio_format(&self, format: AudioFormat, max_num_samples: usize) -> Result<()> {
        let _clock = lock_clock(&self.audio_clock);
        self.audio.set_format(format, max_num_samples)
    }

    /// Sends one packed video frame and waits until the transport is done
    /// with it.
    pub fn write_video(&self, data: &[u8], timestamp: i64) -> Result<()> {
        self.require_open()?;
        let mut clock = lock_clock(&self.video_clock);
        self.stage_video(self.video.write_data(data, timestamp))?;
        self.send_video_locked(&mut clock, false)
    }

    /// Sends one packed video frame, leaving its slot referenced by the
    /// transport until the next video send or [`Self::flush`].
    pub fn write_video_async(&self, data: &[u8], timestamp: i64) -> Result<()> {
        self.require_open()?;
        let mut clock = lock_clock(&self.video_clock);
        self.stage_video(self.video.write_data(data, timestamp))?;
        self.send_video_locked(&mut clock, true)
    }

    /// Packs a component array and sends it.
    pub fn write_video_array<P: PixelComponent>(
        &self,
        src: ArrayView3<'_, P>,
        planar: bool,
        timestamp: i64,
    ) -> Result<()> {
        self.require_open()?;
        let mut clock = lock_clock(&self.video_clock);
        self.stage_video(self.video.write_array(src, planar, timestamp))?;
        self.send_video_locked(&mut clock, false)
    }

    /// Sends one `(channels, samples)` audio segment.
    pub fn write_audio(&self, samples: ArrayView2<'_, f32>, timestamp: i64) -> Result<()> {
        self.require_open()?;
        let mut clock = lock_clock(&self.audio_clock);
        if !self.audio.write_data(samples, timestamp)? {
            return Err(self.closed_during_write());
        }
        let sent = self
            .audio
            .with_pending_frame(|frame| self.transport.send_audio(frame))
            .unwrap_or(Ok(()));
        self.audio.send_complete();
        if let Err(e) = sent {
            warn!(error = %e, "audio send failed");
            return Err(e);
        }
        trace!(timestamp, samples = samples.ncols(), "audio frame sent");
        if self.options.clock_audio {
            let duration = self.audio.format().duration_of(samples.ncols());
            clock.tick(ticks_to_duration(duration));
        }
        Ok(())
    }

    /// Sends a video frame and an audio segment sharing one timestamp.
    pub fn write_video_and_audio(
        &self,
        video: &[u8],
        audio: ArrayView2<'_, f32>,
        timestamp: i64,
    ) -> Result<()> {
        self.write_video(video, timestamp)?;
        self.write_audio(audio, timestamp)
    }

    pub fn send_metadata(&self, data: &str, timestamp: i64) -> Result<()> {
        self.require_open()?;
        self.transport.send_metadata(data, timestamp)
    }

    /// Releases the slot held by an async video send, if any.
    pub fn flush(&self) -> Result<()> {
        let _clock = lock_clock(&self.video_clock);
        self.flush_locked()
    }

    fn flush_locked(&self) -> Result<()> {
        if !self.async_video.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let flushed = self.transport.flush_async();
        self.video.send_complete();
        trace!("async video flushed");
        flushed
    }

    fn closed_during_write(&self) -> Error {
        Error::InvalidState(format!(
            "sender {:?} closed during write",
            self.options.name
        ))
    }

    fn stage_video(&self, written: Result<bool>) -> Result<()> {
        match written {
            Ok(true) => Ok(()),
            Ok(false) => Err(self.closed_during_write()),
            Err(e) => Err(e),
        }
    }

    fn send_video_locked(&self, clock: &mut FrameClock, asynchronous: bool) -> Result<()> {
        let sent = self
            .video
            .with_pending_frame(|frame| {
                if asynchronous {
                    self.transport.send_video_async(frame)
                } else {
                    self.transport.send_video(frame)
                }
            })
            .unwrap_or(Ok(()));
        // any earlier async buffer is released by this send
        if let Err(e) = sent {
            self.async_video.store(false, Ordering::Release);
            self.video.send_complete();
            warn!(error = %e, "video send failed");
            return Err(e);
        }
        self.async_video.store(asynchronous, Ordering::Release);
        if !asynchronous {
            self.video.send_complete();
        }
        trace!(asynchronous, "video frame sent");
        if self.options.clock_video {
            let duration = self.video.format().frame_rate.frame_duration();
            clock.tick(ticks_to_duration(duration));
        }
        Ok(())
    }
}

impl<T: SendTransport> Drop for Sender<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "flush on drop failed");
        }
        self.video.destroy();
        self.audio.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frames::FourCC,
        transport::{FrameSink, FrameType, LoopbackTransport, RawAudioFrame, RawVideoFrame, RecvTransport},
    };
    use ndarray::Array2;

    #[derive(Default)]
    struct Collect {
        video: Vec<(Vec<u8>, i64)>,
        audio: Vec<(Vec<f32>, i64)>,
        metadata: Vec<String>,
    }

    impl FrameSink for Collect {
        fn video(&mut self, frame: RawVideoFrame<'_>) -> Result<()> {
            self.video.push((frame.data.to_vec(), frame.timestamp));
            Ok(())
        }

        fn audio(&mut self, frame: RawAudioFrame<'_>) -> Result<()> {
            self.audio.push((frame.data.to_vec(), frame.timestamp));
            Ok(())
        }

        fn metadata(&mut self, data: &str, _timestamp: i64) -> Result<()> {
            self.metadata.push(data.to_owned());
            Ok(())
        }
    }

    fn drain(transport: &LoopbackTransport) -> Collect {
        let mut sink = Collect::default();
        while transport.capture(Duration::ZERO, &mut sink).unwrap() != FrameType::None {}
        sink
    }

    fn unclocked(transport: &Arc<LoopbackTransport>) -> Sender<LoopbackTransport> {
        let options = SenderOptions::builder("test")
            .clock_video(false)
            .clock_audio(false)
            .build()
            .unwrap();
        let video = VideoFormat::builder()
            .fourcc(FourCC::RGBA)
            .resolution(2, 2)
            .build()
            .unwrap();
        Sender::new(Arc::clone(transport), options, video, AudioFormat::new(48000, 2).unwrap(), 64).unwrap()
    }

    #[test]
    fn test_options_builder() {
        assert!(SenderOptions::builder("  ").build().is_err());
        let options = SenderOptions::builder("cam").build().unwrap();
        assert!(options.clock_video);
        assert!(options.clock_audio);
    }

    #[test]
    fn test_write_requires_open() {
        let transport = Arc::new(LoopbackTransport::default());
        let sender = unclocked(&transport);
        assert!(matches!(sender.write_video(&[0; 16], 0), Err(Error::InvalidState(_))));
        assert!(sender.send_metadata("<x/>", 0).is_err());
        sender.open();
        sender.write_video(&[0; 16], 0).unwrap();
        sender.close().unwrap();
        assert!(sender.write_audio(Array2::zeros((2, 4)).view(), 0).is_err());
        assert_eq!(transport.queued(), 1);
    }

    #[test]
    fn test_sync_write_completes_slot() {
        let transport = Arc::new(LoopbackTransport::default());
        let sender = unclocked(&transport);
        sender.open();
        sender.write_video(&[7; 16], 100).unwrap();
        assert_eq!(sender.video_frame().read_index(), None);
        assert_eq!(sender.video_frame().write_index(), 1);

        let sink = drain(&transport);
        assert_eq!(sink.video, vec![(vec![7; 16], 100)]);
    }

    #[test]
    fn test_async_write_held_until_next_send() {
        let transport = Arc::new(LoopbackTransport::default());
        let sender = unclocked(&transport);
        sender.open();
        sender.write_video_async(&[1; 16], 0).unwrap();
        assert!(transport.async_in_flight());
        assert_eq!(sender.video_frame().read_index(), Some(0));

        sender.write_video_async(&[2; 16], 1).unwrap();
        assert_eq!(sender.video_frame().read_index(), Some(1));

        sender.write_video(&[3; 16], 2).unwrap();
        assert!(!transport.async_in_flight());
        assert_eq!(sender.video_frame().read_index(), None);

        sender.write_video_async(&[4; 16], 3).unwrap();
        sender.close().unwrap();
        assert!(!transport.async_in_flight());
        assert_eq!(sender.video_frame().read_index(), None);

        let timestamps: Vec<i64> = drain(&transport).video.iter().map(|(_, ts)| *ts).collect();
        assert_eq!(timestamps, [0, 1, 2, 3]);
    }

    #[test]
    fn test_audio_and_metadata() {
        let transport = Arc::new(LoopbackTransport::default());
        let sender = unclocked(&transport);
        sender.open();
        let samples = Array2::from_shape_fn((2, 3), |(c, i)| (c * 10 + i) as f32);
        sender.write_video_and_audio(&[0; 16], samples.view(), 50).unwrap();
        sender.send_metadata("<tally/>", 50).unwrap();

        let sink = drain(&transport);
        assert_eq!(sink.video.len(), 1);
        assert_eq!(sink.audio, vec![(vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0], 50)]);
        assert_eq!(sink.metadata, ["<tally/>"]);
    }

    #[test]
    fn test_video_clock_paces_writes() {
        let transport = Arc::new(LoopbackTransport::default());
        let options = SenderOptions::builder("clocked").clock_audio(false).build().unwrap();
        let video = VideoFormat::builder()
            .fourcc(FourCC::RGBA)
            .resolution(2, 2)
            .frame_rate(50, 1)
            .build()
            .unwrap();
        let sender = Sender::new(Arc::clone(&transport), options, video, AudioFormat::default(), 16).unwrap();
        sender.open();
        let start = Instant::now();
        for i in 0..4 {
            sender.write_video(&[0; 16], i).unwrap();
        }
        // three full periods of 20 ms between the four sends
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_wrong_size_rejected() {
        let transport = Arc::new(LoopbackTransport::default());
        let sender = unclocked(&transport);
        sender.open();
        assert!(matches!(
            sender.write_video(&[0; 15], 0),
            Err(Error::BufferSizeMismatch { expected: 16, actual: 15 })
        ));
        assert_eq!(transport.queued(), 0);
    }
}
