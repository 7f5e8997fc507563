//! Frame format descriptors: FourCC pixel layouts, frame rates, video and audio formats.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use std::{fmt, str::FromStr};

use crate::{Error, Result};

const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | (code[1] as u32) << 8 | (code[2] as u32) << 16 | (code[3] as u32) << 24
}

/// Video pixel format identifiers (FourCC codes).
///
/// The numeric value is the four ASCII characters packed little-endian, the
/// same encoding the transport uses on the wire.
///
/// # Examples
///
/// ```
/// use ndi_framekit::FourCC;
///
/// let format: FourCC = "UYVY".parse().unwrap();
/// assert_eq!(format, FourCC::UYVY);
/// assert!(format.is_422());
/// assert_eq!(FourCC::try_from(u32::from(FourCC::BGRA)).unwrap(), FourCC::BGRA);
/// ```
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum FourCC {
    /// YCbCr 4:2:2 packed, 16 bits per pixel.
    UYVY = fourcc(b"UYVY"),
    /// UYVY followed by an 8-bit alpha plane.
    UYVA = fourcc(b"UYVA"),
    /// 16-bit YCbCr 4:2:2: Y plane then interleaved UV plane.
    P216 = fourcc(b"P216"),
    /// P216 followed by a 16-bit alpha plane.
    PA16 = fourcc(b"PA16"),
    /// Planar 4:2:0, Y then V then U.
    YV12 = fourcc(b"YV12"),
    /// Planar 4:2:0, Y then U then V.
    I420 = fourcc(b"I420"),
    /// Semi-planar 4:2:0, Y then interleaved UV.
    NV12 = fourcc(b"NV12"),
    /// Blue-Green-Red-Alpha, 32 bits per pixel.
    BGRA = fourcc(b"BGRA"),
    /// Blue-Green-Red with padding byte.
    BGRX = fourcc(b"BGRX"),
    /// Red-Green-Blue-Alpha, 32 bits per pixel.
    RGBA = fourcc(b"RGBA"),
    /// Red-Green-Blue with padding byte.
    RGBX = fourcc(b"RGBX"),
}

/// Chroma layout relative to luma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChromaSubsampling {
    /// No chroma planes (RGB formats).
    None,
    /// Half horizontal chroma resolution.
    Yuv422,
    /// Half horizontal and vertical chroma resolution.
    Yuv420,
}

impl FourCC {
    /// Every supported format, in declaration order.
    pub const ALL: [FourCC; 11] = [
        FourCC::UYVY,
        FourCC::UYVA,
        FourCC::P216,
        FourCC::PA16,
        FourCC::YV12,
        FourCC::I420,
        FourCC::NV12,
        FourCC::BGRA,
        FourCC::BGRX,
        FourCC::RGBA,
        FourCC::RGBX,
    ];

    /// The four ASCII characters of the code.
    pub fn code(self) -> [u8; 4] {
        u32::from(self).to_le_bytes()
    }

    pub fn is_rgb(self) -> bool {
        matches!(
            self,
            FourCC::BGRA | FourCC::BGRX | FourCC::RGBA | FourCC::RGBX
        )
    }

    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            FourCC::UYVA | FourCC::PA16 | FourCC::BGRA | FourCC::RGBA
        )
    }

    pub fn is_16bit(self) -> bool {
        matches!(self, FourCC::P216 | FourCC::PA16)
    }

    pub fn subsampling(self) -> ChromaSubsampling {
        match self {
            FourCC::UYVY | FourCC::UYVA | FourCC::P216 | FourCC::PA16 => ChromaSubsampling::Yuv422,
            FourCC::YV12 | FourCC::I420 | FourCC::NV12 => ChromaSubsampling::Yuv420,
            FourCC::BGRA | FourCC::BGRX | FourCC::RGBA | FourCC::RGBX => ChromaSubsampling::None,
        }
    }

    pub fn is_422(self) -> bool {
        self.subsampling() == ChromaSubsampling::Yuv422
    }

    pub fn is_420(self) -> bool {
        self.subsampling() == ChromaSubsampling::Yuv420
    }

    /// Formats whose luma and chroma share one interleaved plane.
    pub fn is_packed(self) -> bool {
        self.is_rgb() || matches!(self, FourCC::UYVY | FourCC::UYVA)
    }

    /// Components in unpacked form: Y, U, V (+A) or R, G, B (+A).
    pub fn num_components(self) -> usize {
        if self.has_alpha() {
            4
        } else {
            3
        }
    }

    /// Bytes per stored sample.
    pub fn bytes_per_sample(self) -> usize {
        if self.is_16bit() {
            2
        } else {
            1
        }
    }

    /// Average bits of picture information per pixel.
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            FourCC::UYVY => 16,
            FourCC::UYVA => 24,
            FourCC::P216 => 32,
            FourCC::PA16 => 48,
            FourCC::YV12 | FourCC::I420 | FourCC::NV12 => 12,
            FourCC::BGRA | FourCC::RGBA => 32,
            FourCC::BGRX | FourCC::RGBX => 24,
        }
    }

    /// Bits per pixel including padding bytes.
    pub fn padded_bits_per_pixel(self) -> u32 {
        if self.is_rgb() {
            32
        } else {
            self.bits_per_pixel()
        }
    }

    /// Bytes per row of the first plane.
    pub fn line_stride(self, width: usize) -> usize {
        match self {
            FourCC::BGRA | FourCC::BGRX | FourCC::RGBA | FourCC::RGBX => width * 4,
            FourCC::UYVY | FourCC::UYVA => width * 2,
            FourCC::P216 | FourCC::PA16 => width * 2,
            FourCC::YV12 | FourCC::I420 | FourCC::NV12 => width,
        }
    }

    /// Chroma plane dimensions for a picture of `width` x `height`.
    pub fn chroma_resolution(self, width: usize, height: usize) -> (usize, usize) {
        match self.subsampling() {
            ChromaSubsampling::None => (width, height),
            ChromaSubsampling::Yuv422 => (ceil_div2(width), height),
            ChromaSubsampling::Yuv420 => (ceil_div2(width), ceil_div2(height)),
        }
    }

    /// Exact byte length of a tightly packed frame.
    ///
    /// YUV formats: `luma + 2 * chroma + alpha` planes; RGB formats: 4 bytes per pixel.
    pub fn buffer_size(self, width: usize, height: usize) -> usize {
        if self.is_rgb() {
            return width * height * (self.padded_bits_per_pixel() as usize / 8);
        }
        let sample = self.bytes_per_sample();
        let (cw, ch) = self.chroma_resolution(width, height);
        let luma = width * height * sample;
        let chroma = cw * ch * sample;
        let alpha = if self.has_alpha() { luma } else { 0 };
        luma + 2 * chroma + alpha
    }

    /// Checks that `width` x `height` is representable in this format.
    ///
    /// Subsampled formats need even dimensions.
    pub fn validate_resolution(self, width: usize, height: usize) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "resolution {width}x{height} must be non-zero"
            )));
        }
        if !self.is_rgb() && (width % 2 != 0 || height % 2 != 0) {
            return Err(Error::InvalidConfiguration(format!(
                "{self} requires even dimensions, got {width}x{height}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code();
        write!(f, "{}", String::from_utf8_lossy(&code))
    }
}

impl FromStr for FourCC {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| Error::InvalidConfiguration(format!("'{s}' is not a FourCC code")))?;
        FourCC::try_from(u32::from_le_bytes(bytes))
            .map_err(|_| Error::InvalidConfiguration(format!("unsupported FourCC '{s}'")))
    }
}

pub(crate) fn ceil_div2(value: usize) -> usize {
    value / 2 + value % 2
}

/// Video scan type (progressive, interlaced, or field-based).
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ScanType {
    /// Alternating even/odd lines in one frame.
    Interleaved = 0,
    /// Full frames rendered sequentially.
    Progressive = 1,
    /// First field of interlaced content.
    Field0 = 2,
    /// Second field of interlaced content.
    Field1 = 3,
}

impl Default for ScanType {
    fn default() -> Self {
        ScanType::Progressive
    }
}

/// A frame rate expressed as a fraction, e.g. 30000/1001 for 29.97 fps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    pub fn new(numerator: u32, denominator: u32) -> Result<Self> {
        if numerator == 0 || denominator == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "frame rate {numerator}/{denominator} must have non-zero terms"
            )));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.numerator) / f64::from(self.denominator)
    }

    /// Duration of one frame in 100 ns units.
    pub fn frame_duration(self) -> i64 {
        10_000_000 * i64::from(self.denominator) / i64::from(self.numerator)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self {
            numerator: 30000,
            denominator: 1001,
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Geometry and timing of a video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoFormat {
    pub fourcc: FourCC,
    pub width: usize,
    pub height: usize,
    pub frame_rate: FrameRate,
    pub scan_type: ScanType,
    pub aspect_ratio: f32,
}

impl VideoFormat {
    /// Create a builder for configuring a video format.
    pub fn builder() -> VideoFormatBuilder {
        VideoFormatBuilder::new()
    }

    /// Bytes per row of the first plane.
    pub fn line_stride(&self) -> usize {
        self.fourcc.line_stride(self.width)
    }

    /// Exact byte length of one frame.
    pub fn buffer_size(&self) -> usize {
        self.fourcc.buffer_size(self.width, self.height)
    }

    /// Whether a frame of `other` can reuse buffers sized for `self`.
    pub fn same_geometry(&self, other: &VideoFormat) -> bool {
        self.fourcc == other.fourcc && self.width == other.width && self.height == other.height
    }

    pub fn validate(&self) -> Result<()> {
        self.fourcc.validate_resolution(self.width, self.height)?;
        FrameRate::new(self.frame_rate.numerator, self.frame_rate.denominator)?;
        if !(self.aspect_ratio.is_finite() && self.aspect_ratio >= 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "aspect ratio {} must be finite and non-negative",
                self.aspect_ratio
            )));
        }
        Ok(())
    }
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self {
            fourcc: FourCC::UYVY,
            width: 1920,
            height: 1080,
            frame_rate: FrameRate::default(),
            scan_type: ScanType::Progressive,
            aspect_ratio: 16.0 / 9.0,
        }
    }
}

/// Builder for [`VideoFormat`] with validation on [`VideoFormatBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct VideoFormatBuilder {
    fourcc: Option<FourCC>,
    resolution: Option<(usize, usize)>,
    frame_rate: Option<(u32, u32)>,
    scan_type: Option<ScanType>,
    aspect_ratio: Option<f32>,
}

impl VideoFormatBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pixel format
    #[must_use]
    pub fn fourcc(mut self, fourcc: FourCC) -> Self {
        self.fourcc = Some(fourcc);
        self
    }

    /// Set the video resolution
    #[must_use]
    pub fn resolution(mut self, width: usize, height: usize) -> Self {
        self.resolution = Some((width, height));
        self
    }

    /// Set the frame rate as a fraction (e.g., 30000/1001 for 29.97fps)
    #[must_use]
    pub fn frame_rate(mut self, numerator: u32, denominator: u32) -> Self {
        self.frame_rate = Some((numerator, denominator));
        self
    }

    #[must_use]
    pub fn scan_type(mut self, scan_type: ScanType) -> Self {
        self.scan_type = Some(scan_type);
        self
    }

    /// Set the picture aspect ratio; 0 means square pixels.
    #[must_use]
    pub fn aspect_ratio(mut self, ratio: f32) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    pub fn build(self) -> Result<VideoFormat> {
        let defaults = VideoFormat::default();
        let (width, height) = self.resolution.unwrap_or((defaults.width, defaults.height));
        let frame_rate = match self.frame_rate {
            Some((n, d)) => FrameRate::new(n, d)?,
            None => defaults.frame_rate,
        };
        let format = VideoFormat {
            fourcc: self.fourcc.unwrap_or(defaults.fourcc),
            width,
            height,
            frame_rate,
            scan_type: self.scan_type.unwrap_or(defaults.scan_type),
            aspect_ratio: self
                .aspect_ratio
                .unwrap_or(width as f32 / height.max(1) as f32),
        };
        format.validate()?;
        Ok(format)
    }
}

/// Sample rate and channel count of an audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub num_channels: usize,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, num_channels: usize) -> Result<Self> {
        if sample_rate == 0 || num_channels == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "audio format needs a non-zero sample rate and channel count, got {sample_rate} Hz x {num_channels}"
            )));
        }
        Ok(Self {
            sample_rate,
            num_channels,
        })
    }

    /// Duration of `num_samples` per channel in 100 ns units.
    pub fn duration_of(&self, num_samples: usize) -> i64 {
        (num_samples as i64 * 10_000_000) / i64::from(self.sample_rate)
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            num_channels: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_codes_round_trip() {
        for fourcc in FourCC::ALL {
            let code = fourcc.to_string();
            assert_eq!(code.parse::<FourCC>().unwrap(), fourcc);
            assert_eq!(FourCC::try_from(u32::from(fourcc)).unwrap(), fourcc);
        }
        assert_eq!(u32::from(FourCC::UYVY), 0x5956_5955);
        assert!("ABCD".parse::<FourCC>().is_err());
        assert!("UYV".parse::<FourCC>().is_err());
    }

    /// RGB formats are 24 bpp without alpha and 32 with, always padded to 32.
    #[test]
    fn test_rgb_bits_per_pixel() {
        for fourcc in [FourCC::BGRA, FourCC::BGRX, FourCC::RGBA, FourCC::RGBX] {
            let expected = if fourcc.has_alpha() { 32 } else { 24 };
            assert_eq!(fourcc.bits_per_pixel(), expected, "{fourcc}");
            assert_eq!(fourcc.padded_bits_per_pixel(), 32);
            assert_eq!(fourcc.buffer_size(1920, 1080), 1920 * 1080 * 4);
        }
    }

    #[test]
    fn test_yuv_buffer_sizes() {
        let (w, h) = (1920, 1080);
        assert_eq!(FourCC::UYVY.buffer_size(w, h), w * h * 2);
        assert_eq!(FourCC::UYVA.buffer_size(w, h), w * h * 3);
        assert_eq!(FourCC::P216.buffer_size(w, h), w * h * 4);
        assert_eq!(FourCC::PA16.buffer_size(w, h), w * h * 6);
        for fourcc in [FourCC::YV12, FourCC::I420, FourCC::NV12] {
            assert_eq!(fourcc.buffer_size(w, h), w * h * 3 / 2);
        }
        // odd dimensions round chroma up
        assert_eq!(FourCC::I420.buffer_size(5, 3), 15 + 2 * (3 * 2));
    }

    #[test]
    fn test_bits_per_pixel_matches_buffer_size() {
        for fourcc in FourCC::ALL {
            let size = fourcc.buffer_size(64, 32);
            assert_eq!(
                size * 8,
                64 * 32 * fourcc.padded_bits_per_pixel() as usize,
                "{fourcc}"
            );
        }
    }

    #[test]
    fn test_resolution_validation() {
        assert!(FourCC::UYVY.validate_resolution(1920, 1080).is_ok());
        assert!(FourCC::UYVY.validate_resolution(1921, 1080).is_err());
        assert!(FourCC::NV12.validate_resolution(1920, 1081).is_err());
        assert!(FourCC::RGBA.validate_resolution(1921, 1081).is_ok());
        assert!(FourCC::RGBA.validate_resolution(0, 10).is_err());
    }

    #[test]
    fn test_video_format_builder() {
        let format = VideoFormat::builder()
            .fourcc(FourCC::NV12)
            .resolution(640, 360)
            .frame_rate(60, 1)
            .build()
            .unwrap();
        assert_eq!(format.buffer_size(), 640 * 360 * 3 / 2);
        assert_eq!(format.line_stride(), 640);
        assert_eq!(format.frame_rate.frame_duration(), 166_666);
        assert!((format.aspect_ratio - 16.0 / 9.0).abs() < 1e-6);

        assert!(VideoFormat::builder().frame_rate(0, 1).build().is_err());
        assert!(VideoFormat::builder()
            .fourcc(FourCC::UYVY)
            .resolution(641, 360)
            .build()
            .is_err());
    }

    #[test]
    fn test_audio_format() {
        let format = AudioFormat::new(48000, 2).unwrap();
        assert_eq!(format.duration_of(48000), 10_000_000);
        assert_eq!(format.duration_of(480), 100_000);
        assert!(AudioFormat::new(0, 2).is_err());
        assert!(AudioFormat::new(48000, 0).is_err());
    }
}
