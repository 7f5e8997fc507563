//! Boundary to the opaque transport that actually moves frames.
//!
//! The transport is whatever sits behind the C ABI: it sends frames out,
//! hands received frames in, and may invoke completion from its own threads.
//! This crate only needs the traits below; [`LoopbackTransport`] implements
//! both sides in memory.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
    time::Duration,
};

use crate::{
    frames::{AudioFormat, VideoFormat},
    Error, Result,
};

/// Frame category reported by [`RecvTransport::capture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Nothing arrived before the timeout.
    None,
    Video,
    Audio,
    Metadata,
    /// The connection's settings changed (e.g. source switched).
    StatusChange,
}

/// A borrowed video frame at the transport boundary.
///
/// `data` is tightly packed and exactly `format.buffer_size()` bytes long.
#[derive(Debug, Clone, Copy)]
pub struct RawVideoFrame<'a> {
    pub format: VideoFormat,
    pub data: &'a [u8],
    /// 100 ns units.
    pub timestamp: i64,
}

impl RawVideoFrame<'_> {
    pub fn validate(&self) -> Result<()> {
        let expected = self.format.buffer_size();
        if self.data.len() != expected {
            return Err(Error::InvalidBufferSize {
                fourcc: self.format.fourcc,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// A borrowed planar float audio frame at the transport boundary.
///
/// Channel `c` starts at `data[c * channel_stride]` and holds `num_samples`
/// samples.
#[derive(Debug, Clone, Copy)]
pub struct RawAudioFrame<'a> {
    pub format: AudioFormat,
    pub num_samples: usize,
    /// Distance between channel starts, in samples.
    pub channel_stride: usize,
    pub data: &'a [f32],
    /// 100 ns units.
    pub timestamp: i64,
}

impl<'a> RawAudioFrame<'a> {
    pub fn validate(&self) -> Result<()> {
        if self.channel_stride < self.num_samples {
            return Err(Error::InvalidFrame(format!(
                "channel stride {} shorter than {} samples",
                self.channel_stride, self.num_samples
            )));
        }
        let channels = self.format.num_channels;
        if channels == 0 {
            return Err(Error::InvalidFrame("audio frame has no channels".into()));
        }
        let needed = (channels - 1) * self.channel_stride + self.num_samples;
        if self.data.len() < needed {
            return Err(Error::BufferSizeMismatch {
                expected: needed,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Samples of one channel.
    pub fn channel(&self, index: usize) -> &'a [f32] {
        let start = index * self.channel_stride;
        &self.data[start..start + self.num_samples]
    }
}

/// Outgoing side of the transport.
///
/// Asynchronous video follows the usual SDK contract: the buffer passed to
/// [`SendTransport::send_video_async`] stays referenced until the next video
/// send or [`SendTransport::flush_async`] returns. Implementations must not
/// block on completion of an earlier frame while inside these calls.
pub trait SendTransport: Send + Sync {
    /// Sends a video frame and returns once the buffer is no longer needed.
    fn send_video(&self, frame: RawVideoFrame<'_>) -> Result<()>;

    /// Queues a video frame whose buffer stays referenced after return.
    fn send_video_async(&self, frame: RawVideoFrame<'_>) -> Result<()>;

    /// Releases any buffer still referenced by an asynchronous send.
    fn flush_async(&self) -> Result<()>;

    /// Sends an audio frame; audio is always synchronous.
    fn send_audio(&self, frame: RawAudioFrame<'_>) -> Result<()>;

    fn send_metadata(&self, _data: &str, _timestamp: i64) -> Result<()> {
        Ok(())
    }
}

/// Receives frames pulled from the transport.
pub trait FrameSink {
    fn video(&mut self, frame: RawVideoFrame<'_>) -> Result<()>;

    fn audio(&mut self, frame: RawAudioFrame<'_>) -> Result<()>;

    fn metadata(&mut self, _data: &str, _timestamp: i64) -> Result<()> {
        Ok(())
    }
}

/// Incoming side of the transport.
pub trait RecvTransport: Send + Sync {
    /// Waits up to `timeout` for the next frame and hands it to `sink`.
    ///
    /// The borrowed frame data is only valid for the duration of the sink call.
    fn capture(&self, timeout: Duration, sink: &mut dyn FrameSink) -> Result<FrameType>;
}

#[derive(Debug)]
enum QueuedFrame {
    Video {
        format: VideoFormat,
        data: Vec<u8>,
        timestamp: i64,
    },
    Audio {
        format: AudioFormat,
        num_samples: usize,
        data: Vec<f32>,
        timestamp: i64,
    },
    Metadata {
        data: String,
        timestamp: i64,
    },
    StatusChange,
}

/// In-memory transport: frames sent on one side are captured on the other.
///
/// Sent frames are copied into a bounded queue; when the queue is full the
/// oldest frame is dropped.
#[derive(Debug)]
pub struct LoopbackTransport {
    queue: Mutex<VecDeque<QueuedFrame>>,
    ready: Condvar,
    capacity: usize,
    async_in_flight: Mutex<bool>,
}

impl LoopbackTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Condvar::new(),
            capacity: capacity.max(1),
            async_in_flight: Mutex::new(false),
        }
    }

    fn push(&self, frame: QueuedFrame) {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if queue.len() == self.capacity {
            queue.pop_front();
        }
        queue.push_back(frame);
        self.ready.notify_all();
    }

    /// Frames queued and not yet captured.
    pub fn queued(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Whether an asynchronous video buffer is still referenced.
    pub fn async_in_flight(&self) -> bool {
        *self
            .async_in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues a status change, as a transport reports when the remote end
    /// changes its settings.
    pub fn notify_status_change(&self) {
        self.push(QueuedFrame::StatusChange);
    }

    fn set_async_in_flight(&self, value: bool) {
        *self
            .async_in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = value;
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new(16)
    }
}

impl SendTransport for LoopbackTransport {
    fn send_video(&self, frame: RawVideoFrame<'_>) -> Result<()> {
        frame.validate()?;
        self.set_async_in_flight(false);
        self.push(QueuedFrame::Video {
            format: frame.format,
            data: frame.data.to_vec(),
            timestamp: frame.timestamp,
        });
        Ok(())
    }

    fn send_video_async(&self, frame: RawVideoFrame<'_>) -> Result<()> {
        self.send_video(frame)?;
        self.set_async_in_flight(true);
        Ok(())
    }

    fn flush_async(&self) -> Result<()> {
        self.set_async_in_flight(false);
        Ok(())
    }

    fn send_audio(&self, frame: RawAudioFrame<'_>) -> Result<()> {
        frame.validate()?;
        let mut data = Vec::with_capacity(frame.format.num_channels * frame.num_samples);
        for c in 0..frame.format.num_channels {
            data.extend_from_slice(frame.channel(c));
        }
        self.push(QueuedFrame::Audio {
            format: frame.format,
            num_samples: frame.num_samples,
            data,
            timestamp: frame.timestamp,
        });
        Ok(())
    }

    fn send_metadata(&self, data: &str, timestamp: i64) -> Result<()> {
        self.push(QueuedFrame::Metadata {
            data: data.to_owned(),
            timestamp,
        });
        Ok(())
    }
}

impl RecvTransport for LoopbackTransport {
    fn capture(&self, timeout: Duration, sink: &mut dyn FrameSink) -> Result<FrameType> {
        let queue = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let (mut queue, _) = self
            .ready
            .wait_timeout_while(queue, timeout, |q| q.is_empty())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(frame) = queue.pop_front() else {
            return Ok(FrameType::None);
        };
        drop(queue);

        match frame {
            QueuedFrame::Video {
                format,
                data,
                timestamp,
            } => {
                sink.video(RawVideoFrame {
                    format,
                    data: &data,
                    timestamp,
                })?;
                Ok(FrameType::Video)
            }
            QueuedFrame::Audio {
                format,
                num_samples,
                data,
                timestamp,
            } => {
                sink.audio(RawAudioFrame {
                    format,
                    num_samples,
                    channel_stride: num_samples,
                    data: &data,
                    timestamp,
                })?;
                Ok(FrameType::Audio)
            }
            QueuedFrame::Metadata { data, timestamp } => {
                sink.metadata(&data, timestamp)?;
                Ok(FrameType::Metadata)
            }
            QueuedFrame::StatusChange => Ok(FrameType::StatusChange),
        }
    }
}
