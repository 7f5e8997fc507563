//! Audio receive buffer and audio send frame.
//!
//! Audio travels as planar `f32` segments shaped `(channels, samples)`.
//! [`AudioRecvFrame`] queues segments of any length in a [`RingBuffer`] and
//! supports reads that start or stop inside a segment; [`AudioSendFrame`]
//! stages outgoing segments in a [`SendFrameStatus`].

use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use ndarray::{s, Array2, ArrayView2, ArrayViewMut2};
use tracing::{debug, trace};

use crate::{
    audio_reference::{AudioReference, AudioReferenceConverter},
    frames::AudioFormat,
    ring_buffer::{RecvBufferOptions, RingBuffer, Shared, WriteOutcome},
    send_frame_status::SendFrameStatus,
    transport::RawAudioFrame,
    Error, Result,
};

#[derive(Debug)]
struct AudioRecvState {
    ring: RingBuffer<f32>,
    format: Option<AudioFormat>,
    /// Samples per channel already consumed from the front segment.
    front_offset: usize,
    converter: AudioReferenceConverter,
}

impl AudioRecvState {
    fn num_channels(&self) -> usize {
        self.format.map_or(0, |f| f.num_channels)
    }

    fn available(&self) -> usize {
        match self.num_channels() {
            0 => 0,
            ch => self.ring.total_len() / ch - self.front_offset,
        }
    }

    fn front_timestamp(&self) -> Option<i64> {
        let slot = self.ring.front()?;
        let offset = self
            .format
            .map_or(0, |format| format.duration_of(self.front_offset));
        Some(slot.timestamp() + offset)
    }

    fn on_write(&mut self, outcome: WriteOutcome) {
        if outcome.evicted && self.front_offset > 0 {
            trace!(
                discarded = self.front_offset,
                "partially read audio segment evicted"
            );
            self.front_offset = 0;
        }
    }

    /// Copies exactly `dest.ncols()` samples per channel, crossing segment
    /// boundaries as needed. The caller has checked availability.
    fn copy_samples(&mut self, mut dest: ArrayViewMut2<'_, f32>) {
        let ch = self.num_channels();
        let want = dest.ncols();
        let converter = self.converter;
        let mut written = 0;

        while written < want {
            let Some(slot) = self.ring.front() else {
                break;
            };
            let n = slot.len() / ch;
            let offset = self.front_offset;
            let take = (n - offset).min(want - written);
            let data = slot.data();
            for c in 0..ch {
                let src = &data[c * n + offset..c * n + offset + take];
                let mut row = dest.slice_mut(s![c, written..written + take]);
                for (d, s) in row.iter_mut().zip(src) {
                    *d = converter.from_ndi(*s);
                }
            }
            written += take;
            if offset + take == n {
                self.ring.pop_front();
                self.front_offset = 0;
            } else {
                self.front_offset = offset + take;
            }
        }
    }
}

/// Receive-side audio buffer.
///
/// A producer (typically the network receive thread) writes segments; a
/// consumer reads whole segments, everything at once, or an exact number of
/// samples. Segments may differ in length. When the ring is full the oldest
/// segment is evicted.
///
/// Reads convert wire amplitudes into the selected [`AudioReference`].
#[derive(Debug)]
pub struct AudioRecvFrame {
    shared: Shared<AudioRecvState>,
}

impl AudioRecvFrame {
    /// Creates a buffer with room for `max_buffers` segments.
    ///
    /// The format is taken from the first [`Self::write_planar`] call or set with
    /// [`Self::set_format`].
    pub fn new(max_buffers: usize) -> Result<Self> {
        Ok(Self {
            shared: Shared::new(AudioRecvState {
                ring: RingBuffer::new(max_buffers)?,
                format: None,
                front_offset: 0,
                converter: AudioReferenceConverter::default(),
            }),
        })
    }

    pub fn with_options(options: RecvBufferOptions) -> Result<Self> {
        Self::new(options.max_buffers)
    }

    pub fn with_format(max_buffers: usize, format: AudioFormat) -> Result<Self> {
        let frame = Self::new(max_buffers)?;
        frame.set_format(format)?;
        Ok(frame)
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.shared.lock().format
    }

    /// Sets the stream format, discarding buffered audio if it changes.
    pub fn set_format(&self, format: AudioFormat) -> Result<()> {
        let format = AudioFormat::new(format.sample_rate, format.num_channels)?;
        let mut state = self.shared.lock();
        Self::apply_format(&mut state, format);
        Ok(())
    }

    fn apply_format(state: &mut AudioRecvState, format: AudioFormat) {
        if state.format != Some(format) {
            if !state.ring.is_empty() {
                debug!(?format, "audio format changed, dropping buffered segments");
            }
            state.ring.clear();
            state.front_offset = 0;
            state.format = Some(format);
        }
    }

    pub fn reference_level(&self) -> AudioReference {
        self.shared.lock().converter.reference()
    }

    pub fn set_reference_level(&self, reference: AudioReference) {
        self.shared.lock().converter.set_reference(reference);
    }

    pub fn max_buffers(&self) -> usize {
        self.shared.lock().ring.max_buffers()
    }

    /// Number of buffered segments.
    pub fn get_buffer_depth(&self) -> usize {
        self.shared.lock().ring.peek_depth()
    }

    /// Unread samples per channel across all buffered segments.
    pub fn get_read_length(&self) -> usize {
        self.shared.lock().available()
    }

    /// Segments evicted by overwrite since construction.
    pub fn evicted_segments(&self) -> u64 {
        self.shared.lock().ring.evicted()
    }

    /// Appends one `(channels, samples)` segment.
    pub fn write_data(&self, samples: ArrayView2<'_, f32>, timestamp: i64) -> Result<WriteOutcome> {
        let (ch, n) = samples.dim();
        if n == 0 {
            return Err(Error::InvalidFrame("empty audio segment".into()));
        }
        let mut state = self.shared.lock();
        let expected = state.num_channels();
        if expected == 0 {
            return Err(Error::InvalidState(
                "audio format not set before the first write".into(),
            ));
        }
        if ch != expected {
            return Err(Error::ShapeMismatch {
                expected: vec![expected, n],
                actual: vec![ch, n],
            });
        }
        let outcome = state.ring.write_with(ch * n, timestamp, |dest| {
            for (c, row) in samples.outer_iter().enumerate() {
                for (d, s) in dest[c * n..(c + 1) * n].iter_mut().zip(row.iter()) {
                    *d = *s;
                }
            }
        })?;
        state.on_write(outcome);
        drop(state);
        self.shared.notify_all();
        Ok(outcome)
    }

    /// Appends a segment delivered by the transport, adopting its format.
    pub fn write_planar(&self, frame: RawAudioFrame<'_>) -> Result<WriteOutcome> {
        frame.validate()?;
        if frame.num_samples == 0 {
            return Err(Error::InvalidFrame("empty audio segment".into()));
        }
        let format = AudioFormat::new(frame.format.sample_rate, frame.format.num_channels)?;
        let ch = format.num_channels;
        let n = frame.num_samples;

        let mut state = self.shared.lock();
        Self::apply_format(&mut state, format);
        let outcome = state.ring.write_with(ch * n, frame.timestamp, |dest| {
            for c in 0..ch {
                dest[c * n..(c + 1) * n].copy_from_slice(frame.channel(c));
            }
        })?;
        state.on_write(outcome);
        drop(state);
        self.shared.notify_all();
        Ok(outcome)
    }

    /// Pops the oldest segment (or its unread remainder) into `dest`.
    ///
    /// `dest` needs one row per channel and at least as many columns as the
    /// segment has unread samples. Returns the sample count and timestamp.
    pub fn fill_read_data(&self, mut dest: ArrayViewMut2<'_, f32>) -> Result<(usize, i64)> {
        let mut state = self.shared.lock();
        let ch = state.num_channels();
        let (len, timestamp) = match (state.ring.front(), state.front_timestamp()) {
            (Some(slot), Some(ts)) => (slot.len() / ch - state.front_offset, ts),
            _ => return Err(Error::EmptyBuffer),
        };
        if dest.nrows() != ch || dest.ncols() < len {
            return Err(Error::ShapeMismatch {
                expected: vec![ch, len],
                actual: dest.shape().to_vec(),
            });
        }
        state.copy_samples(dest.slice_mut(s![.., ..len]));
        Ok((len, timestamp))
    }

    /// Pops the oldest segment into a new array.
    pub fn read_data(&self) -> Result<(Array2<f32>, i64)> {
        let mut state = self.shared.lock();
        let ch = state.num_channels();
        let (len, timestamp) = match (state.ring.front(), state.front_timestamp()) {
            (Some(slot), Some(ts)) => (slot.len() / ch - state.front_offset, ts),
            _ => return Err(Error::EmptyBuffer),
        };
        let mut out = Array2::zeros((ch, len));
        state.copy_samples(out.view_mut());
        Ok((out, timestamp))
    }

    /// Drains every buffered sample into one `(channels, total)` array.
    ///
    /// Returns one timestamp per drained segment; the first is advanced past
    /// any samples already consumed from it.
    pub fn get_all_read_data(&self) -> Result<(Array2<f32>, Vec<i64>)> {
        let mut state = self.shared.lock();
        if state.ring.is_empty() {
            return Err(Error::EmptyBuffer);
        }
        let mut timestamps: Vec<i64> = state.ring.iter().map(|slot| slot.timestamp()).collect();
        if let (Some(first), Some(ts)) = (timestamps.first_mut(), state.front_timestamp()) {
            *first = ts;
        }
        let mut out = Array2::zeros((state.num_channels(), state.available()));
        state.copy_samples(out.view_mut());
        Ok((out, timestamps))
    }

    /// Reads exactly `dest.ncols()` samples per channel if that many are
    /// buffered, returning the timestamp of the first one.
    ///
    /// Returns `Ok(None)` and consumes nothing when fewer are available.
    pub fn read_exact_into(&self, dest: ArrayViewMut2<'_, f32>) -> Result<Option<i64>> {
        let mut state = self.shared.lock();
        let ch = state.num_channels();
        if ch == 0 {
            return Ok(None);
        }
        if dest.nrows() != ch {
            return Err(Error::ShapeMismatch {
                expected: vec![ch, dest.ncols()],
                actual: dest.shape().to_vec(),
            });
        }
        if state.available() < dest.ncols() {
            return Ok(None);
        }
        let timestamp = state.front_timestamp().unwrap_or_default();
        state.copy_samples(dest);
        Ok(Some(timestamp))
    }

    /// Blocks until at least one segment is buffered.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        self.wait_for_samples(1, timeout)
    }

    /// Blocks until `num_samples` per channel are buffered.
    pub fn wait_for_samples(&self, num_samples: usize, timeout: Duration) -> bool {
        let guard = self.shared.lock();
        let (_guard, ready) = self
            .shared
            .wait_until(guard, timeout, |state| state.available() >= num_samples.max(1));
        ready
    }

    /// Drops every buffered segment.
    pub fn clear(&self) {
        let mut state = self.shared.lock();
        state.ring.clear();
        state.front_offset = 0;
    }
}

#[derive(Debug, Clone, Copy)]
struct AudioSendConfig {
    format: AudioFormat,
    max_num_samples: usize,
    converter: AudioReferenceConverter,
}

/// Send-side audio frame.
///
/// Segments written here are converted to wire level and staged in a
/// [`SendFrameStatus`] slot until the transport has consumed them.
#[derive(Debug)]
pub struct AudioSendFrame {
    config: Mutex<AudioSendConfig>,
    status: SendFrameStatus<f32>,
}

impl AudioSendFrame {
    /// Creates an idle send frame for segments of up to `max_num_samples`.
    pub fn new(format: AudioFormat, max_num_samples: usize) -> Result<Self> {
        let format = AudioFormat::new(format.sample_rate, format.num_channels)?;
        if max_num_samples == 0 {
            return Err(Error::InvalidConfiguration(
                "max_num_samples must be at least 1".into(),
            ));
        }
        Ok(Self {
            status: SendFrameStatus::new(format.num_channels * max_num_samples)?,
            config: Mutex::new(AudioSendConfig {
                format,
                max_num_samples,
                converter: AudioReferenceConverter::default(),
            }),
        })
    }

    fn config(&self) -> MutexGuard<'_, AudioSendConfig> {
        self.config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn format(&self) -> AudioFormat {
        self.config().format
    }

    pub fn max_num_samples(&self) -> usize {
        self.config().max_num_samples
    }

    /// Changes the format; refused while a segment is pending.
    pub fn set_format(&self, format: AudioFormat, max_num_samples: usize) -> Result<()> {
        let format = AudioFormat::new(format.sample_rate, format.num_channels)?;
        self.status
            .set_slot_capacity(format.num_channels * max_num_samples)?;
        let mut config = self.config();
        config.format = format;
        config.max_num_samples = max_num_samples;
        Ok(())
    }

    pub fn reference_level(&self) -> AudioReference {
        self.config().converter.reference()
    }

    pub fn set_reference_level(&self, reference: AudioReference) {
        self.config().converter.set_reference(reference);
    }

    /// Stages one `(channels, samples)` segment for sending.
    ///
    /// Returns `Ok(false)` while the frame is idle.
    pub fn write_data(&self, samples: ArrayView2<'_, f32>, timestamp: i64) -> Result<bool> {
        let config = *self.config();
        let (ch, n) = samples.dim();
        if ch != config.format.num_channels || n > config.max_num_samples {
            return Err(Error::ShapeMismatch {
                expected: vec![config.format.num_channels, config.max_num_samples],
                actual: vec![ch, n],
            });
        }
        let converter = config.converter;
        self.status.write(ch * n, timestamp, |dest| {
            for (c, row) in samples.outer_iter().enumerate() {
                for (d, s) in dest[c * n..(c + 1) * n].iter_mut().zip(row.iter()) {
                    *d = converter.to_ndi(*s);
                }
            }
        })
    }

    /// Runs `f` on the pending segment as the transport sees it.
    pub fn with_pending_frame<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(RawAudioFrame<'_>) -> R,
    {
        let format = self.format();
        self.status.with_pending(|slot| {
            let num_samples = slot.data.len() / format.num_channels;
            f(RawAudioFrame {
                format,
                num_samples,
                channel_stride: num_samples,
                data: slot.data,
                timestamp: slot.timestamp,
            })
        })
    }

    pub fn status(&self) -> &SendFrameStatus<f32> {
        &self.status
    }

    pub fn write_index(&self) -> usize {
        self.status.write_index()
    }

    pub fn read_index(&self) -> Option<usize> {
        self.status.read_index()
    }

    pub fn set_sender_status(&self, active: bool) {
        self.status.set_sender_status(active);
    }

    pub fn send_complete(&self) {
        self.status.send_complete();
    }

    /// Blocks until the pending segment has been consumed.
    pub fn wait_send_complete(&self, timeout: Duration) -> bool {
        self.status.wait_send_complete(timeout)
    }

    pub fn destroy(&self) {
        self.status.destroy();
    }
}
