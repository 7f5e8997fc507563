//! Pixel format engine: unpack raw transport buffers into component arrays and back.
//!
//! An [`ImageFormat`] pairs a [`FourCC`] with a resolution and two layout
//! switches:
//!
//! - `planar`: arrays are shaped `(component, height, width)` instead of
//!   `(height, width, component)`.
//! - `expand_chroma`: subsampled U/V planes are duplicated up to full
//!   resolution. Without it the chroma samples occupy the top-left
//!   `chroma_height x chroma_width` region of their component and the rest is
//!   left untouched.
//!
//! Components are always ordered Y, U, V (A) for YUV formats and R, G, B (A)
//! for RGB formats, so `BGRA` data is swapped into RGB order on unpack.
//!
//! # Example
//!
//! ```
//! use ndi_framekit::{pixel::ImageReader, FourCC};
//!
//! let reader = ImageReader::new(FourCC::UYVY, 4, 2, false, true).unwrap();
//! let raw = vec![128u8; reader.format().size_in_bytes()];
//! let yuv = reader.unpack::<u8>(&raw).unwrap();
//! assert_eq!(yuv.shape(), &[2, 4, 3]);
//!
//! let mut packed = vec![0u8; raw.len()];
//! reader.pack_into(yuv.view(), &mut packed).unwrap();
//! assert_eq!(packed, raw);
//! ```

use ndarray::{Array3, ArrayView3, ArrayViewMut3};

use crate::{
    frames::{ChromaSubsampling, FourCC},
    Error, Result,
};

/// Destination (or source) element type for unpacked components.
///
/// `u16` arrays hold samples at the format's native scale. `u8` arrays hold
/// 8-bit samples; 16-bit formats keep only the high byte.
pub trait PixelComponent: Copy + Default + Send + Sync + 'static {
    fn from_u8(value: u8) -> Self;
    fn from_u16(value: u16) -> Self;
    fn to_u8(self) -> u8;
    fn to_u16(self) -> u16;
}

impl PixelComponent for u8 {
    fn from_u8(value: u8) -> Self {
        value
    }

    fn from_u16(value: u16) -> Self {
        (value >> 8) as u8
    }

    fn to_u8(self) -> u8 {
        self
    }

    fn to_u16(self) -> u16 {
        u16::from(self) << 8
    }
}

impl PixelComponent for u16 {
    fn from_u8(value: u8) -> Self {
        u16::from(value)
    }

    fn from_u16(value: u16) -> Self {
        value
    }

    fn to_u8(self) -> u8 {
        self.min(u16::from(u8::MAX)) as u8
    }

    fn to_u16(self) -> u16 {
        self
    }
}

/// Geometry of an unpacked image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageFormat {
    fourcc: FourCC,
    width: usize,
    height: usize,
    planar: bool,
    expand_chroma: bool,
}

impl ImageFormat {
    /// Validates and creates a format.
    ///
    /// Packed 4:2:2 formats (`UYVY`, `UYVA`) share one chroma pair between two
    /// pixels and need an even width. Other odd sizes are accepted with
    /// ceil-half chroma planes, unlike [`crate::VideoFormat`] which requires
    /// even dimensions for every YUV format.
    pub fn new(
        fourcc: FourCC,
        width: usize,
        height: usize,
        planar: bool,
        expand_chroma: bool,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "image resolution {width}x{height} must be non-zero"
            )));
        }
        if matches!(fourcc, FourCC::UYVY | FourCC::UYVA) && width % 2 != 0 {
            return Err(Error::InvalidConfiguration(format!(
                "{fourcc} requires an even width, got {width}"
            )));
        }
        Ok(Self {
            fourcc,
            width,
            height,
            planar,
            expand_chroma,
        })
    }

    pub fn fourcc(&self) -> FourCC {
        self.fourcc
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn planar(&self) -> bool {
        self.planar
    }

    pub fn expand_chroma(&self) -> bool {
        self.expand_chroma
    }

    pub fn chroma_width(&self) -> usize {
        self.chroma_resolution().0
    }

    pub fn chroma_height(&self) -> usize {
        self.chroma_resolution().1
    }

    pub fn chroma_resolution(&self) -> (usize, usize) {
        self.fourcc.chroma_resolution(self.width, self.height)
    }

    pub fn num_components(&self) -> usize {
        self.fourcc.num_components()
    }

    pub fn is_16bit(&self) -> bool {
        self.fourcc.is_16bit()
    }

    /// Shape of the unpacked array.
    pub fn shape(&self) -> [usize; 3] {
        let c = self.num_components();
        if self.planar {
            [c, self.height, self.width]
        } else {
            [self.height, self.width, c]
        }
    }

    /// Exact byte length of the raw buffer.
    pub fn size_in_bytes(&self) -> usize {
        self.fourcc.buffer_size(self.width, self.height)
    }

    /// Vertical and horizontal chroma decimation.
    fn chroma_step(&self) -> (usize, usize) {
        match self.fourcc.subsampling() {
            ChromaSubsampling::None => (1, 1),
            ChromaSubsampling::Yuv422 => (1, 2),
            ChromaSubsampling::Yuv420 => (2, 2),
        }
    }

    /// Where each component lives in the raw buffer.
    fn planes(&self) -> Vec<Plane> {
        let (w, h) = (self.width, self.height);
        let (cw, ch) = self.chroma_resolution();
        let luma = w * h;
        let full = |offset, step, row_stride| Plane {
            offset,
            step,
            row_stride,
            width: w,
            height: h,
            chroma: false,
        };
        let chroma = |offset, step, row_stride| Plane {
            offset,
            step,
            row_stride,
            width: cw,
            height: ch,
            chroma: true,
        };

        match self.fourcc {
            FourCC::RGBA | FourCC::RGBX | FourCC::BGRA | FourCC::BGRX => {
                let order: [usize; 4] = if matches!(self.fourcc, FourCC::BGRA | FourCC::BGRX) {
                    [2, 1, 0, 3]
                } else {
                    [0, 1, 2, 3]
                };
                order[..self.num_components()]
                    .iter()
                    .map(|&offset| full(offset, 4, w * 4))
                    .collect()
            }
            FourCC::UYVY | FourCC::UYVA => {
                let mut planes = vec![
                    full(1, 2, w * 2),
                    chroma(0, 4, w * 2),
                    chroma(2, 4, w * 2),
                ];
                if self.fourcc == FourCC::UYVA {
                    planes.push(full(w * h * 2, 1, w));
                }
                planes
            }
            FourCC::P216 | FourCC::PA16 => {
                let mut planes = vec![
                    full(0, 1, w),
                    chroma(luma, 2, cw * 2),
                    chroma(luma + 1, 2, cw * 2),
                ];
                if self.fourcc == FourCC::PA16 {
                    planes.push(full(luma + 2 * cw * ch, 1, w));
                }
                planes
            }
            FourCC::I420 => vec![
                full(0, 1, w),
                chroma(luma, 1, cw),
                chroma(luma + cw * ch, 1, cw),
            ],
            FourCC::YV12 => vec![
                full(0, 1, w),
                chroma(luma + cw * ch, 1, cw),
                chroma(luma, 1, cw),
            ],
            FourCC::NV12 => vec![
                full(0, 1, w),
                chroma(luma, 2, cw * 2),
                chroma(luma + 1, 2, cw * 2),
            ],
        }
    }
}

/// One component's sample positions, in units of samples (not bytes).
#[derive(Debug, Clone, Copy)]
struct Plane {
    offset: usize,
    step: usize,
    row_stride: usize,
    width: usize,
    height: usize,
    chroma: bool,
}

impl Plane {
    fn index(&self, y: usize, x: usize) -> usize {
        self.offset + y * self.row_stride + x * self.step
    }
}

/// Unpacks and packs raw buffers of one [`ImageFormat`].
#[derive(Debug, Clone)]
pub struct ImageReader {
    format: ImageFormat,
    planes: Vec<Plane>,
}

impl ImageReader {
    pub fn new(
        fourcc: FourCC,
        width: usize,
        height: usize,
        planar: bool,
        expand_chroma: bool,
    ) -> Result<Self> {
        Ok(Self::from_format(ImageFormat::new(
            fourcc,
            width,
            height,
            planar,
            expand_chroma,
        )?))
    }

    pub fn from_format(format: ImageFormat) -> Self {
        Self {
            planes: format.planes(),
            format,
        }
    }

    pub fn format(&self) -> &ImageFormat {
        &self.format
    }

    pub fn shape(&self) -> [usize; 3] {
        self.format.shape()
    }

    fn check_buffer(&self, len: usize) -> Result<()> {
        let expected = self.format.size_in_bytes();
        if len != expected {
            return Err(Error::InvalidBufferSize {
                fourcc: self.format.fourcc,
                expected,
                actual: len,
            });
        }
        Ok(())
    }

    fn check_shape(&self, shape: &[usize]) -> Result<()> {
        let expected = self.format.shape();
        if shape != expected {
            return Err(Error::ShapeMismatch {
                expected: expected.to_vec(),
                actual: shape.to_vec(),
            });
        }
        Ok(())
    }

    fn read_sample<T: PixelComponent>(&self, src: &[u8], index: usize) -> T {
        if self.format.is_16bit() {
            let at = index * 2;
            T::from_u16(u16::from_le_bytes([src[at], src[at + 1]]))
        } else {
            T::from_u8(src[index])
        }
    }

    fn write_sample<T: PixelComponent>(&self, dest: &mut [u8], index: usize, value: T) {
        if self.format.is_16bit() {
            let at = index * 2;
            dest[at..at + 2].copy_from_slice(&value.to_u16().to_le_bytes());
        } else {
            dest[index] = value.to_u8();
        }
    }

    /// Unpacks `src` into `dest`, which must have [`ImageFormat::shape`].
    ///
    /// Fails with [`Error::InvalidBufferSize`] before touching `dest` when
    /// `src` is not exactly [`ImageFormat::size_in_bytes`] long.
    pub fn unpack_into<T: PixelComponent>(&self, src: &[u8], dest: ArrayViewMut3<'_, T>) -> Result<()> {
        self.check_buffer(src.len())?;
        self.check_shape(dest.shape())?;
        let mut dest = if self.format.planar {
            dest
        } else {
            dest.permuted_axes([2, 0, 1])
        };
        let (ystep, xstep) = self.format.chroma_step();

        for (c, plane) in self.planes.iter().enumerate() {
            let mut component = dest.index_axis_mut(ndarray::Axis(0), c);
            if plane.chroma && self.format.expand_chroma {
                for ((y, x), value) in component.indexed_iter_mut() {
                    *value = self.read_sample(src, plane.index(y / ystep, x / xstep));
                }
            } else {
                for y in 0..plane.height {
                    for x in 0..plane.width {
                        component[[y, x]] = self.read_sample(src, plane.index(y, x));
                    }
                }
            }
        }
        Ok(())
    }

    /// Unpacks `src` into a new zero-initialised array.
    pub fn unpack<T: PixelComponent>(&self, src: &[u8]) -> Result<Array3<T>> {
        let mut dest = Array3::default(self.format.shape());
        self.unpack_into(src, dest.view_mut())?;
        Ok(dest)
    }

    /// Packs `src` (shaped per [`ImageFormat::shape`]) into `dest`.
    ///
    /// With `expand_chroma` each chroma sample is taken from the top-left
    /// pixel of its block. Padding bytes of `RGBX`/`BGRX` are written as `0xFF`.
    pub fn pack_into<T: PixelComponent>(&self, src: ArrayView3<'_, T>, dest: &mut [u8]) -> Result<()> {
        self.check_buffer(dest.len())?;
        self.check_shape(src.shape())?;
        let src = if self.format.planar {
            src
        } else {
            src.permuted_axes([2, 0, 1])
        };
        let (ystep, xstep) = self.format.chroma_step();
        let expand = self.format.expand_chroma;

        for (c, plane) in self.planes.iter().enumerate() {
            let component = src.index_axis(ndarray::Axis(0), c);
            for y in 0..plane.height {
                for x in 0..plane.width {
                    let value = if plane.chroma && expand {
                        component[[y * ystep, x * xstep]]
                    } else {
                        component[[y, x]]
                    };
                    self.write_sample(dest, plane.index(y, x), value);
                }
            }
        }

        if matches!(self.format.fourcc, FourCC::RGBX | FourCC::BGRX) {
            for pixel in dest.chunks_exact_mut(4) {
                pixel[3] = u8::MAX;
            }
        }
        Ok(())
    }

    /// Packs `src` into a new buffer.
    pub fn pack<T: PixelComponent>(&self, src: ArrayView3<'_, T>) -> Result<Vec<u8>> {
        let mut dest = vec![0u8; self.format.size_in_bytes()];
        self.pack_into(src, &mut dest)?;
        Ok(dest)
    }
}
