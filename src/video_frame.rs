//! Video receive buffer with zero-copy views, and the video send frame.
//!
//! [`VideoRecvFrame`] stores whole packed frames in a [`RingBuffer`]. The
//! per-slot byte length is fixed by the first write (or by
//! [`VideoRecvFrame::set_format`]) and every later frame must match it.
//!
//! [`VideoRecvFrame::view`] exposes the newest frame without copying. While a
//! [`VideoFrameView`] is alive its slot can not be overwritten: a write that
//! lands on it fails with [`Error::SlotInUse`], and
//! [`VideoRecvFrame::write_data_timeout`] waits for the view to be dropped.

use std::{
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use ndarray::{Array3, ArrayView3};
use tracing::{debug, warn};

use crate::{
    frames::{FourCC, VideoFormat},
    pixel::{ImageReader, PixelComponent},
    ring_buffer::{RecvBufferOptions, RingBuffer, Shared, WriteOutcome},
    send_frame_status::SendFrameStatus,
    transport::RawVideoFrame,
    yuv::{ColorFormat, ColorStandard},
    Error, Result,
};

#[derive(Debug)]
struct VideoRecvState {
    ring: RingBuffer<u8>,
    format: Option<VideoFormat>,
    buffer_size: Option<usize>,
}

impl VideoRecvState {
    fn check_size(&self, len: usize) -> Result<()> {
        if len == 0 {
            return Err(Error::InvalidFrame("empty video frame".into()));
        }
        match self.buffer_size {
            Some(expected) if expected != len => Err(Error::BufferSizeMismatch {
                expected,
                actual: len,
            }),
            _ => Ok(()),
        }
    }

    fn write(&mut self, data: &[u8], timestamp: i64) -> Result<WriteOutcome> {
        self.check_size(data.len())?;
        let outcome = self.ring.write(data, timestamp).map_err(|e| {
            if let Error::SlotInUse { index, views } = &e {
                warn!(index, views, "video slot still viewed, frame rejected");
            }
            e
        })?;
        self.buffer_size = Some(data.len());
        Ok(outcome)
    }

    fn next_slot_viewed(&self) -> bool {
        self.ring
            .slot(self.ring.next_write_index())
            .map_or(false, |slot| slot.views() > 0)
    }
}

/// Receive-side video buffer.
#[derive(Debug)]
pub struct VideoRecvFrame {
    shared: Shared<VideoRecvState>,
}

impl VideoRecvFrame {
    pub fn new(max_buffers: usize) -> Result<Self> {
        Ok(Self {
            shared: Shared::new(VideoRecvState {
                ring: RingBuffer::new(max_buffers)?,
                format: None,
                buffer_size: None,
            }),
        })
    }

    pub fn with_options(options: RecvBufferOptions) -> Result<Self> {
        Self::new(options.max_buffers)
    }

    pub fn format(&self) -> Option<VideoFormat> {
        self.shared.lock().format
    }

    /// Sets the stream format and fixes the slot size to its buffer size.
    ///
    /// Buffered frames are discarded when the size changes. Fails with
    /// [`Error::InvalidState`] while views are outstanding.
    pub fn set_format(&self, format: VideoFormat) -> Result<()> {
        format.validate()?;
        let mut state = self.shared.lock();
        Self::apply_format(&mut state, format)
    }

    fn apply_format(state: &mut VideoRecvState, format: VideoFormat) -> Result<()> {
        let views = state.ring.view_count();
        if views > 0 {
            return Err(Error::InvalidState(format!(
                "can not change video format with {views} outstanding view(s)"
            )));
        }
        let size = format.buffer_size();
        if state.buffer_size != Some(size) {
            debug!(
                fourcc = %format.fourcc,
                width = format.width,
                height = format.height,
                "video buffer size changed"
            );
            state.ring.clear();
            state.buffer_size = Some(size);
        }
        state.format = Some(format);
        Ok(())
    }

    /// Per-slot byte length, 0 until fixed.
    pub fn get_buffer_size(&self) -> usize {
        self.shared.lock().buffer_size.unwrap_or(0)
    }

    /// Number of unread frames.
    pub fn get_buffer_depth(&self) -> usize {
        self.shared.lock().ring.peek_depth()
    }

    /// Outstanding views across all slots.
    pub fn get_view_count(&self) -> usize {
        self.shared.lock().ring.view_count()
    }

    pub fn max_buffers(&self) -> usize {
        self.shared.lock().ring.max_buffers()
    }

    /// Frames evicted by overwrite since construction.
    pub fn evicted_frames(&self) -> u64 {
        self.shared.lock().ring.evicted()
    }

    /// Writes one packed frame.
    ///
    /// The first write fixes the slot size unless a format was set.
    pub fn write_data(&self, data: &[u8], timestamp: i64) -> Result<WriteOutcome> {
        let outcome = self.shared.lock().write(data, timestamp)?;
        self.shared.notify_all();
        Ok(outcome)
    }

    /// Like [`Self::write_data`], but waits up to `timeout` for a view on the
    /// target slot to be dropped.
    pub fn write_data_timeout(
        &self,
        data: &[u8],
        timestamp: i64,
        timeout: Duration,
    ) -> Result<WriteOutcome> {
        let guard = self.shared.lock();
        let (mut state, _) = self
            .shared
            .wait_until(guard, timeout, |state| !state.next_slot_viewed());
        let outcome = state.write(data, timestamp)?;
        drop(state);
        self.shared.notify_all();
        Ok(outcome)
    }

    /// Writes a frame delivered by the transport, adopting its format.
    pub fn write_frame(&self, frame: RawVideoFrame<'_>) -> Result<WriteOutcome> {
        frame.validate()?;
        let mut state = self.shared.lock();
        if state.format != Some(frame.format) {
            Self::apply_format(&mut state, frame.format)?;
        }
        let outcome = state.write(frame.data, frame.timestamp)?;
        drop(state);
        self.shared.notify_all();
        Ok(outcome)
    }

    /// Borrows the newest frame without copying.
    ///
    /// Every buffered frame is marked read. Returns `Ok(None)` when nothing
    /// new has arrived since the last read.
    pub fn view(&self) -> Result<Option<VideoFrameView<'_>>> {
        let mut state = self.shared.lock();
        let Some(back) = state.ring.back() else {
            return Ok(None);
        };
        let timestamp = back.timestamp();
        let len = back.len();
        let index = (state.ring.next_write_index() + state.ring.max_buffers() - 1)
            % state.ring.max_buffers();
        let data = state
            .ring
            .share(index)
            .ok_or_else(|| Error::InvalidState(format!("slot {index} out of range")))?;
        state.ring.clear();
        Ok(Some(VideoFrameView {
            frame: self,
            data: Some(data),
            len,
            index,
            timestamp,
            format: state.format,
        }))
    }

    /// Pops the oldest frame, copying it out.
    pub fn read_data(&self) -> Result<(Vec<u8>, i64)> {
        self.shared.lock().ring.read()
    }

    /// Pops the oldest frame into `dest`.
    pub fn read_data_into(&self, dest: &mut [u8]) -> Result<(usize, i64)> {
        self.shared.lock().ring.read_into(dest)
    }

    /// Blocks until a frame is buffered.
    pub fn wait_for_frame(&self, timeout: Duration) -> bool {
        let guard = self.shared.lock();
        let (_guard, ready) = self
            .shared
            .wait_until(guard, timeout, |state| !state.ring.is_empty());
        ready
    }

    pub fn clear(&self) {
        self.shared.lock().ring.clear();
    }
}

/// A zero-copy view of one received frame.
///
/// The slot stays protected from overwrites until the view is dropped.
#[derive(Debug)]
pub struct VideoFrameView<'a> {
    frame: &'a VideoRecvFrame,
    data: Option<Arc<Vec<u8>>>,
    len: usize,
    index: usize,
    timestamp: i64,
    format: Option<VideoFormat>,
}

impl VideoFrameView<'_> {
    pub fn data(&self) -> &[u8] {
        match &self.data {
            Some(data) => &data[..self.len],
            None => &[],
        }
    }

    /// Timestamp in 100 ns units.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Ring slot the view points into.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn format(&self) -> Option<VideoFormat> {
        self.format
    }

    fn require_format(&self) -> Result<VideoFormat> {
        self.format
            .ok_or_else(|| Error::InvalidState("video format unknown for this frame".into()))
    }

    /// Unpacks the frame into a component array.
    pub fn unpack<T: PixelComponent>(&self, planar: bool, expand_chroma: bool) -> Result<Array3<T>> {
        let format = self.require_format()?;
        ImageReader::new(format.fourcc, format.width, format.height, planar, expand_chroma)?
            .unpack(self.data())
    }

    /// Converts the frame to 8-bit RGBA, row-major.
    ///
    /// YUV formats are decoded as studio-range Rec. 709.
    pub fn to_rgba8(&self) -> Result<Vec<u8>> {
        let format = self.require_format()?;
        to_rgba8(&format, self.data())
    }
}

impl Deref for VideoFrameView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data()
    }
}

impl AsRef<[u8]> for VideoFrameView<'_> {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

impl Drop for VideoFrameView<'_> {
    fn drop(&mut self) {
        let _state = self.frame.shared.lock();
        self.data = None;
        self.frame.shared.notify_all();
    }
}

/// Converts one packed frame of any FourCC to 8-bit RGBA, row-major.
pub fn to_rgba8(format: &VideoFormat, data: &[u8]) -> Result<Vec<u8>> {
    let reader = ImageReader::new(format.fourcc, format.width, format.height, false, true)?;
    let pixels = reader.unpack::<u16>(data)?;
    let has_alpha = format.fourcc.has_alpha();
    let shift = if format.fourcc.is_16bit() { 8 } else { 0 };
    let mut rgba = Vec::with_capacity(format.width * format.height * 4);

    if format.fourcc.is_rgb() {
        for px in pixels.rows() {
            rgba.extend_from_slice(&[px[0] as u8, px[1] as u8, px[2] as u8]);
            rgba.push(if has_alpha { px[3] as u8 } else { u8::MAX });
        }
        return Ok(rgba);
    }

    let bpp = if format.fourcc.is_16bit() { 16 } else { 8 };
    let yuv_format = ColorFormat::new(ColorStandard::Rec709, bpp, false)?;
    let yuv: Vec<[u16; 3]> = pixels.rows().into_iter().map(|px| [px[0], px[1], px[2]]).collect();
    let rgb = yuv_format.to_rgb(&yuv, true)?;
    for (px, src) in rgb.iter().zip(pixels.rows()) {
        rgba.extend(px.iter().map(|v| (v >> shift) as u8));
        rgba.push(if has_alpha { (src[3] >> shift) as u8 } else { u8::MAX });
    }
    Ok(rgba)
}

/// Output container for [`VideoFrameView::encode_data_url`].
#[cfg(feature = "image-encoding")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// PNG format (lossless compression)
    Png,
    /// JPEG format with quality setting (1-100, where 100 is highest quality)
    Jpeg(u8),
}

#[cfg(feature = "image-encoding")]
impl VideoFrameView<'_> {
    /// Encodes the frame as PNG, converting any FourCC to RGBA first.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        use png::{BitDepth, ColorType, Encoder};

        let format = self.require_format()?;
        let rgba = self.to_rgba8()?;
        let mut png_data = Vec::new();
        let mut encoder = Encoder::new(&mut png_data, format.width as u32, format.height as u32);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);

        encoder
            .write_header()
            .and_then(|mut writer| writer.write_image_data(&rgba))
            .map_err(|e| Error::Encoding(format!("PNG encoding failed: {e}")))?;

        Ok(png_data)
    }

    /// Encodes the frame as JPEG; alpha is dropped.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        use jpeg_encoder::{ColorType as JpegColorType, Encoder as JpegEncoder};

        let format = self.require_format()?;
        let (width, height) = match (u16::try_from(format.width), u16::try_from(format.height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => {
                return Err(Error::Encoding(format!(
                    "{}x{} exceeds the JPEG size limit",
                    format.width, format.height
                )))
            }
        };
        let rgb: Vec<u8> = self
            .to_rgba8()?
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        let mut jpeg_data = Vec::new();
        JpegEncoder::new(&mut jpeg_data, quality)
            .encode(&rgb, width, height, JpegColorType::Rgb)
            .map_err(|e| Error::Encoding(format!("JPEG encoding failed: {e}")))?;

        Ok(jpeg_data)
    }

    /// Encodes the frame as a base64 `data:` URL.
    pub fn encode_data_url(&self, encoding: ImageEncoding) -> Result<String> {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let (mime_type, image_bytes) = match encoding {
            ImageEncoding::Png => ("image/png", self.encode_png()?),
            ImageEncoding::Jpeg(quality) => ("image/jpeg", self.encode_jpeg(quality)?),
        };

        let base64_data = STANDARD.encode(&image_bytes);
        Ok(format!("data:{mime_type};base64,{base64_data}"))
    }
}

/// Send-side video frame.
///
/// Frames are copied into a [`SendFrameStatus`] slot so the transport can
/// read them while the application prepares the next one.
#[derive(Debug)]
pub struct VideoSendFrame {
    format: Mutex<VideoFormat>,
    status: SendFrameStatus<u8>,
}

impl VideoSendFrame {
    pub fn new(format: VideoFormat) -> Result<Self> {
        format.validate()?;
        Ok(Self {
            status: SendFrameStatus::new(format.buffer_size())?,
            format: Mutex::new(format),
        })
    }

    fn lock_format(&self) -> MutexGuard<'_, VideoFormat> {
        self.format
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn format(&self) -> VideoFormat {
        *self.lock_format()
    }

    pub fn fourcc(&self) -> FourCC {
        self.lock_format().fourcc
    }

    /// Changes the format; refused while a frame is pending.
    pub fn set_format(&self, format: VideoFormat) -> Result<()> {
        format.validate()?;
        let mut current = self.lock_format();
        if current.buffer_size() != format.buffer_size() {
            self.status.set_slot_capacity(format.buffer_size())?;
        } else if self.status.is_pending() && !current.same_geometry(&format) {
            return Err(Error::InvalidState(
                "can not change video format while a frame is pending".into(),
            ));
        }
        *current = format;
        Ok(())
    }

    /// Bytes one frame must have.
    pub fn get_buffer_size(&self) -> usize {
        self.lock_format().buffer_size()
    }

    fn check_size(&self, len: usize) -> Result<()> {
        let expected = self.get_buffer_size();
        if len != expected {
            return Err(Error::BufferSizeMismatch {
                expected,
                actual: len,
            });
        }
        Ok(())
    }

    /// Stages one packed frame. Returns `Ok(false)` while idle.
    pub fn write_data(&self, data: &[u8], timestamp: i64) -> Result<bool> {
        self.check_size(data.len())?;
        self.status
            .write(data.len(), timestamp, |dest| dest.copy_from_slice(data))
    }

    /// Like [`Self::write_data`], waiting up to `timeout` for a pending slot.
    pub fn write_data_timeout(&self, data: &[u8], timestamp: i64, timeout: Duration) -> Result<bool> {
        self.check_size(data.len())?;
        let start = Instant::now();
        let written = self
            .status
            .write_timeout(data.len(), timestamp, timeout, |dest| {
                dest.copy_from_slice(data)
            })?;
        debug!(waited = ?start.elapsed(), "video frame staged");
        Ok(written)
    }

    /// Packs a component array straight into the next slot.
    ///
    /// `src` is shaped as [`crate::pixel::ImageFormat::shape`] for this
    /// frame's format with chroma not expanded.
    pub fn write_array<T: PixelComponent>(
        &self,
        src: ArrayView3<'_, T>,
        planar: bool,
        timestamp: i64,
    ) -> Result<bool> {
        let format = self.format();
        let reader = ImageReader::new(format.fourcc, format.width, format.height, planar, false)?;
        if src.shape() != reader.shape() {
            return Err(Error::ShapeMismatch {
                expected: reader.shape().to_vec(),
                actual: src.shape().to_vec(),
            });
        }
        // a slot only becomes pending once the whole frame is packed
        let packed = reader.pack(src)?;
        self.write_data(&packed, timestamp)
    }

    /// Runs `f` on the pending frame as the transport sees it.
    pub fn with_pending_frame<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(RawVideoFrame<'_>) -> R,
    {
        let format = self.format();
        self.status.with_pending(|slot| {
            f(RawVideoFrame {
                format,
                data: slot.data,
                timestamp: slot.timestamp,
            })
        })
    }

    pub fn status(&self) -> &SendFrameStatus<u8> {
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

    pub fn wait_send_complete(&self, timeout: Duration) -> bool {
        self.status.wait_send_complete(timeout)
    }

    pub fn destroy(&self) {
        self.status.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn small_format(fourcc: FourCC) -> VideoFormat {
        VideoFormat::builder()
            .fourcc(fourcc)
            .resolution(4, 2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_first_write_fixes_buffer_size() {
        let frame = VideoRecvFrame::new(2).unwrap();
        assert_eq!(frame.get_buffer_size(), 0);
        frame.write_data(&[1; 16], 0).unwrap();
        assert_eq!(frame.get_buffer_size(), 16);
        assert!(matches!(
            frame.write_data(&[1; 12], 1),
            Err(Error::BufferSizeMismatch {
                expected: 16,
                actual: 12
            })
        ));
        assert_eq!(frame.get_buffer_depth(), 1);
    }

    #[test]
    fn test_view_returns_newest_and_marks_read() {
        let frame = VideoRecvFrame::new(4).unwrap();
        for i in 0..3u8 {
            frame.write_data(&[i; 8], i64::from(i)).unwrap();
        }
        {
            let view = frame.view().unwrap().unwrap();
            assert_eq!(view.data(), &[2; 8]);
            assert_eq!(view.timestamp(), 2);
            assert_eq!(frame.get_view_count(), 1);
            assert_eq!(frame.get_buffer_depth(), 0);
            assert!(frame.view().unwrap().is_none());
        }
        assert_eq!(frame.get_view_count(), 0);
    }

    #[test]
    fn test_viewed_slot_rejects_overwrite() {
        let frame = VideoRecvFrame::new(1).unwrap();
        frame.write_data(&[1; 4], 0).unwrap();
        let view = frame.view().unwrap().unwrap();
        assert!(matches!(
            frame.write_data(&[2; 4], 1),
            Err(Error::SlotInUse { index: 0, views: 1 })
        ));
        assert_eq!(&*view, &[1; 4]);
        drop(view);
        frame.write_data(&[2; 4], 1).unwrap();
        assert_eq!(frame.read_data().unwrap(), (vec![2; 4], 1));
    }

    #[test]
    fn test_write_timeout_waits_for_view_release() {
        let frame = VideoRecvFrame::new(1).unwrap();
        frame.write_data(&[1; 4], 0).unwrap();
        thread::scope(|s| {
            let view = frame.view().unwrap().unwrap();
            assert!(frame
                .write_data_timeout(&[2; 4], 1, Duration::from_millis(10))
                .is_err());
            s.spawn(move || {
                thread::sleep(Duration::from_millis(20));
                drop(view);
            });
            frame
                .write_data_timeout(&[3; 4], 2, Duration::from_secs(5))
                .unwrap();
        });
        assert_eq!(frame.read_data().unwrap(), (vec![3; 4], 2));
    }

    #[test]
    fn test_set_format_refused_while_viewed() {
        let frame = VideoRecvFrame::new(2).unwrap();
        let format = small_format(FourCC::UYVY);
        frame.set_format(format).unwrap();
        assert_eq!(frame.get_buffer_size(), 16);
        frame.write_data(&[0; 16], 0).unwrap();
        let view = frame.view().unwrap().unwrap();
        assert_eq!(view.format(), Some(format));
        assert!(matches!(
            frame.set_format(small_format(FourCC::RGBA)),
            Err(Error::InvalidState(_))
        ));
        drop(view);
        frame.set_format(small_format(FourCC::RGBA)).unwrap();
        assert_eq!(frame.get_buffer_size(), 32);
    }

    #[test]
    fn test_write_frame_reconfigures_on_format_change() {
        let frame = VideoRecvFrame::new(2).unwrap();
        let uyvy = small_format(FourCC::UYVY);
        frame
            .write_frame(RawVideoFrame {
                format: uyvy,
                data: &[0; 16],
                timestamp: 0,
            })
            .unwrap();
        let bgra = small_format(FourCC::BGRA);
        frame
            .write_frame(RawVideoFrame {
                format: bgra,
                data: &[0; 32],
                timestamp: 1,
            })
            .unwrap();
        assert_eq!(frame.format(), Some(bgra));
        assert_eq!(frame.get_buffer_depth(), 1);
    }

    #[test]
    fn test_wait_for_frame() {
        let frame = VideoRecvFrame::new(2).unwrap();
        assert!(!frame.wait_for_frame(Duration::from_millis(10)));
        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(10));
                frame.write_data(&[1; 4], 0).unwrap();
            });
            assert!(frame.wait_for_frame(Duration::from_secs(5)));
        });
    }

    #[test]
    fn test_view_to_rgba8_from_uyvy() {
        let frame = VideoRecvFrame::new(2).unwrap();
        frame.set_format(small_format(FourCC::UYVY)).unwrap();
        // studio-range white
        let white: Vec<u8> = [128u8, 235, 128, 235].repeat(4);
        frame.write_data(&white, 0).unwrap();
        let view = frame.view().unwrap().unwrap();
        let rgba = view.to_rgba8().unwrap();
        assert_eq!(rgba.len(), 4 * 2 * 4);
        assert!(rgba.iter().all(|v| *v == 255));
        let yuv = view.unpack::<u8>(true, true).unwrap();
        assert!(yuv.iter().take(8).all(|v| *v == 235));
    }

    #[test]
    fn test_view_to_rgba8_from_bgrx() {
        let frame = VideoRecvFrame::new(1).unwrap();
        let format = VideoFormat::builder()
            .fourcc(FourCC::BGRX)
            .resolution(1, 1)
            .build()
            .unwrap();
        frame.set_format(format).unwrap();
        frame.write_data(&[10, 20, 30, 0], 0).unwrap();
        let view = frame.view().unwrap().unwrap();
        assert_eq!(view.to_rgba8().unwrap(), vec![30, 20, 10, 255]);
    }

    #[test]
    fn test_send_frame_size_checked() {
        let frame = VideoSendFrame::new(small_format(FourCC::UYVY)).unwrap();
        frame.set_sender_status(true);
        assert!(matches!(
            frame.write_data(&[0; 15], 0),
            Err(Error::BufferSizeMismatch {
                expected: 16,
                actual: 15
            })
        ));
        assert!(frame.write_data(&[7; 16], 3).unwrap());
        let seen = frame
            .with_pending_frame(|raw| (raw.data.to_vec(), raw.timestamp, raw.format.fourcc))
            .unwrap();
        assert_eq!(seen, (vec![7; 16], 3, FourCC::UYVY));
    }

    #[test]
    fn test_send_frame_idle_and_format_change() {
        let frame = VideoSendFrame::new(small_format(FourCC::UYVY)).unwrap();
        assert!(!frame.write_data(&[0; 16], 0).unwrap());
        frame.set_sender_status(true);
        frame.write_data(&[0; 16], 0).unwrap();
        assert!(frame.set_format(small_format(FourCC::RGBA)).is_err());
        frame.send_complete();
        frame.set_format(small_format(FourCC::RGBA)).unwrap();
        assert_eq!(frame.get_buffer_size(), 32);
        assert!(frame.write_data(&[0; 32], 0).unwrap());
    }

    #[test]
    fn test_send_frame_write_array() {
        let frame = VideoSendFrame::new(small_format(FourCC::RGBA)).unwrap();
        frame.set_sender_status(true);
        let src = Array3::<u8>::from_shape_fn((2, 4, 4), |(y, x, c)| (y * 16 + x * 4 + c) as u8);
        assert!(frame.write_array(src.view(), false, 0).unwrap());
        let data = frame.with_pending_frame(|raw| raw.data.to_vec()).unwrap();
        assert_eq!(data, (0..32u8).collect::<Vec<_>>());

        frame.send_complete();

        let wrong = Array3::<u8>::zeros((4, 2, 4));
        assert!(matches!(
            frame.write_array(wrong.view(), false, 1),
            Err(Error::ShapeMismatch { .. })
        ));
        assert_eq!(frame.read_index(), None);
        assert_eq!(frame.write_index(), 1);
    }
}
