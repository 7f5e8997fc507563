//! Color-space transforms between YUV (Rec. 601/709/2020) and RGB.
//!
//! A [`ColorFormat`] combines a [`ColorStandard`] with a [`Scaling`] (bit
//! depth plus full or studio range). Conversions run
//! integer → float → 3x3 matrix → integer, rounding to nearest and clamping
//! to the target's `[0, max_value]`.
//!
//! Float conventions: Y and RGB components lie in `[0, 1]`, U and V in
//! `[-0.5, 0.5]`.
//!
//! # Example
//!
//! ```
//! use ndi_framekit::yuv::{ColorFormat, ColorStandard};
//!
//! let rgb = ColorFormat::lookup(ColorStandard::Rgb, 8, true).unwrap();
//! let yuv = rgb.to_yuv(&[[255, 0, 0]], Some(ColorStandard::Rec709), false).unwrap();
//! assert_eq!(yuv, vec![[63, 102, 240]]);
//! ```

use std::{collections::HashMap, fmt, str::FromStr};

use once_cell::sync::Lazy;

use crate::{Error, Result};

/// Row-major 3x3 matrix.
pub type Matrix3 = [[f64; 3]; 3];

/// One pixel's three components as stored integers.
pub type Pixel = [u16; 3];

/// Bit depths registered in the shared [`ColorFormat`] table.
pub const REGISTERED_BIT_DEPTHS: [u32; 3] = [8, 10, 12];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorStandard {
    Rec601,
    Rec709,
    Rec2020,
    Rgb,
}

impl ColorStandard {
    pub const ALL: [ColorStandard; 4] = [
        ColorStandard::Rec601,
        ColorStandard::Rec709,
        ColorStandard::Rec2020,
        ColorStandard::Rgb,
    ];

    pub fn is_yuv(self) -> bool {
        self != ColorStandard::Rgb
    }

    /// Luma coefficients, `None` for [`ColorStandard::Rgb`].
    pub fn coefficients(self) -> Option<Coefficients> {
        match self {
            ColorStandard::Rec601 => Some(Coefficients::new(0.114, 0.299)),
            ColorStandard::Rec709 => Some(Coefficients::new(0.0722, 0.2126)),
            ColorStandard::Rec2020 => Some(Coefficients::new(0.0593, 0.2627)),
            ColorStandard::Rgb => None,
        }
    }
}

impl fmt::Display for ColorStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorStandard::Rec601 => "Rec601",
            ColorStandard::Rec709 => "Rec709",
            ColorStandard::Rec2020 => "Rec2020",
            ColorStandard::Rgb => "RGB",
        };
        f.write_str(name)
    }
}

impl FromStr for ColorStandard {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ColorStandard::ALL
            .into_iter()
            .find(|standard| standard.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidConfiguration(format!("unknown color standard '{s}'")))
    }
}

/// Luma weights of a YUV standard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub kb: f64,
    pub kr: f64,
    pub kg: f64,
}

impl Coefficients {
    pub fn new(kb: f64, kr: f64) -> Self {
        Self {
            kb,
            kr,
            kg: 1.0 - kb - kr,
        }
    }

    /// RGB → YUV.
    pub fn yuv_matrix(&self) -> Matrix3 {
        let Self { kb, kr, kg } = *self;
        [
            [kr, kg, kb],
            [-kr / (1.0 - kb) / 2.0, -kg / (1.0 - kb) / 2.0, 0.5],
            [0.5, -kg / (1.0 - kr) / 2.0, -kb / (1.0 - kr) / 2.0],
        ]
    }

    /// YUV → RGB.
    pub fn rgb_matrix(&self) -> Matrix3 {
        let Self { kb, kr, kg } = *self;
        [
            [1.0, 0.0, 2.0 - 2.0 * kr],
            [1.0, -(kb / kg) * (2.0 - 2.0 * kb), -(kr / kg) * (2.0 - 2.0 * kr)],
            [1.0, 2.0 - 2.0 * kb, 0.0],
        ]
    }
}

const IDENTITY: Matrix3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

fn mat_mul(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn apply(m: &Matrix3, v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Integer range of one bit depth, full or studio ("legal") range.
///
/// Studio range places Y (and studio RGB) in `16..=235` and chroma in
/// `16..=240`, shifted left by `bpp - 8` for deeper formats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
    pub bpp: u32,
    pub full_scale: bool,
    pub max_value: u32,
    pub y_min: u32,
    pub y_max: u32,
    pub y_scale: u32,
    pub c_min: u32,
    pub c_max: u32,
    /// Half the chroma span.
    pub c_scale: f64,
    pub c_center: f64,
}

impl Scaling {
    /// Builds the scaling for `bpp` in `8..=16`.
    pub fn new(bpp: u32, full_scale: bool) -> Result<Self> {
        if !(8..=16).contains(&bpp) {
            return Err(Error::InvalidConfiguration(format!(
                "bit depth {bpp} outside 8..=16"
            )));
        }
        let shift = bpp - 8;
        let max_value = (1u32 << bpp) - 1;
        let (y_min, y_max, c_min, c_max) = if full_scale {
            (0, max_value, 0, max_value)
        } else {
            (16 << shift, 235 << shift, 16 << shift, 240 << shift)
        };
        let c_scale = f64::from(c_max - c_min) / 2.0;
        Ok(Self {
            bpp,
            full_scale,
            max_value,
            y_min,
            y_max,
            y_scale: y_max - y_min,
            c_min,
            c_max,
            c_scale,
            c_center: f64::from(c_min) + c_scale,
        })
    }

    fn offsets(&self, is_yuv: bool) -> ([f64; 3], [f64; 3]) {
        let y_min = f64::from(self.y_min);
        let y_scale = f64::from(self.y_scale);
        if is_yuv {
            let c_full = 2.0 * self.c_scale;
            (
                [y_min, self.c_center, self.c_center],
                [y_scale, c_full, c_full],
            )
        } else {
            ([y_min; 3], [y_scale; 3])
        }
    }

    /// Integer sample triple to float.
    pub fn scale_to_float(&self, pixel: Pixel, is_yuv: bool) -> [f64; 3] {
        let (offset, scale) = self.offsets(is_yuv);
        let mut out = [0.0; 3];
        for i in 0..3 {
            out[i] = (f64::from(pixel[i]) - offset[i]) / scale[i];
        }
        out
    }

    /// Float triple to integers, rounded and clamped to `[0, max_value]`.
    pub fn scale_from_float(&self, value: [f64; 3], is_yuv: bool) -> Pixel {
        let (offset, scale) = self.offsets(is_yuv);
        let max = f64::from(self.max_value);
        let mut out = [0u16; 3];
        for i in 0..3 {
            out[i] = (value[i] * scale[i] + offset[i]).clamp(0.0, max).round() as u16;
        }
        out
    }
}

/// A color standard at a specific bit depth and range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorFormat {
    standard: ColorStandard,
    scaling: Scaling,
    rgb_matrix: Matrix3,
    yuv_matrix: Matrix3,
}

type ColorKey = (ColorStandard, u32, bool);

static REGISTRY: Lazy<HashMap<ColorKey, ColorFormat>> = Lazy::new(|| {
    let mut formats = HashMap::new();
    for standard in ColorStandard::ALL {
        for bpp in REGISTERED_BIT_DEPTHS {
            for full_scale in [false, true] {
                if let Ok(format) = ColorFormat::new(standard, bpp, full_scale) {
                    formats.insert((standard, bpp, full_scale), format);
                }
            }
        }
    }
    formats
});

impl ColorFormat {
    /// Builds an unregistered format for any bit depth in `8..=16`.
    pub fn new(standard: ColorStandard, bpp: u32, full_scale: bool) -> Result<Self> {
        let scaling = Scaling::new(bpp, full_scale)?;
        let (rgb_matrix, yuv_matrix) = match standard.coefficients() {
            Some(coeff) => (coeff.rgb_matrix(), coeff.yuv_matrix()),
            None => (IDENTITY, IDENTITY),
        };
        Ok(Self {
            standard,
            scaling,
            rgb_matrix,
            yuv_matrix,
        })
    }

    /// Shared descriptor for a registered bit depth (8, 10 or 12).
    pub fn lookup(standard: ColorStandard, bpp: u32, full_scale: bool) -> Result<&'static Self> {
        REGISTRY.get(&(standard, bpp, full_scale)).ok_or_else(|| {
            Error::InvalidConfiguration(format!(
                "no registered color format for {standard} at {bpp} bits"
            ))
        })
    }

    fn resolve(standard: ColorStandard, bpp: u32, full_scale: bool) -> Result<Self> {
        match Self::lookup(standard, bpp, full_scale) {
            Ok(format) => Ok(*format),
            Err(_) => Self::new(standard, bpp, full_scale),
        }
    }

    pub fn standard(&self) -> ColorStandard {
        self.standard
    }

    pub fn scaling(&self) -> &Scaling {
        &self.scaling
    }

    pub fn bpp(&self) -> u32 {
        self.scaling.bpp
    }

    pub fn full_scale(&self) -> bool {
        self.scaling.full_scale
    }

    pub fn is_yuv(&self) -> bool {
        self.standard.is_yuv()
    }

    pub fn rgb_matrix(&self) -> &Matrix3 {
        &self.rgb_matrix
    }

    pub fn yuv_matrix(&self) -> &Matrix3 {
        &self.yuv_matrix
    }

    fn key(&self) -> ColorKey {
        (self.standard, self.scaling.bpp, self.scaling.full_scale)
    }

    /// Picks the natural counterpart for unspecified parameters.
    ///
    /// YUV formats default to full-range RGB, RGB formats to studio-range
    /// Rec. 709. The bit depth defaults to this format's.
    pub fn guess_convert_to(
        &self,
        standard: Option<ColorStandard>,
        bpp: Option<u32>,
        full_scale: Option<bool>,
    ) -> Result<Self> {
        let bpp = bpp.unwrap_or(self.bpp());
        let (standard, full_scale) = if self.is_yuv() {
            (
                standard.unwrap_or(ColorStandard::Rgb),
                full_scale.unwrap_or(true),
            )
        } else {
            (
                standard.unwrap_or(ColorStandard::Rec709),
                full_scale.unwrap_or(false),
            )
        };
        Self::resolve(standard, bpp, full_scale)
    }

    /// Converts to RGB of the same bit depth.
    pub fn to_rgb(&self, src: &[Pixel], full_scale: bool) -> Result<Vec<Pixel>> {
        if !self.is_yuv() && self.full_scale() == full_scale {
            return Ok(src.to_vec());
        }
        let other = self.guess_convert_to(Some(ColorStandard::Rgb), None, Some(full_scale))?;
        Ok(self.to_other(src, &other))
    }

    /// Converts to YUV of the same bit depth.
    ///
    /// `standard` defaults to this format's own standard when it is YUV and to
    /// Rec. 709 otherwise.
    pub fn to_yuv(
        &self,
        src: &[Pixel],
        standard: Option<ColorStandard>,
        full_scale: bool,
    ) -> Result<Vec<Pixel>> {
        if standard == Some(ColorStandard::Rgb) {
            return Err(Error::InvalidConfiguration(
                "to_yuv needs a YUV color standard".into(),
            ));
        }
        let standard = match standard {
            Some(standard) => standard,
            None if self.is_yuv() => self.standard,
            None => ColorStandard::Rec709,
        };
        let other = self.guess_convert_to(Some(standard), None, Some(full_scale))?;
        Ok(self.to_other(src, &other))
    }

    /// Matrix taking this format's floats to `other`'s floats.
    fn transform_to(&self, other: &ColorFormat) -> Matrix3 {
        match (self.is_yuv(), other.is_yuv()) {
            (true, false) => self.rgb_matrix,
            (false, true) => other.yuv_matrix,
            (true, true) if self.standard != other.standard => {
                mat_mul(&other.yuv_matrix, &self.rgb_matrix)
            }
            _ => IDENTITY,
        }
    }

    /// Converts every pixel of `src` into `other`.
    pub fn to_other(&self, src: &[Pixel], other: &ColorFormat) -> Vec<Pixel> {
        let mut dest = vec![[0u16; 3]; src.len()];
        self.convert_into(src, other, &mut dest);
        dest
    }

    /// Like [`Self::to_other`], writing into `dest` of the same length.
    pub fn to_other_into(&self, src: &[Pixel], other: &ColorFormat, dest: &mut [Pixel]) -> Result<()> {
        if dest.len() != src.len() {
            return Err(Error::BufferSizeMismatch {
                expected: src.len(),
                actual: dest.len(),
            });
        }
        self.convert_into(src, other, dest);
        Ok(())
    }

    fn convert_into(&self, src: &[Pixel], other: &ColorFormat, dest: &mut [Pixel]) {
        if self.key() == other.key() {
            dest.copy_from_slice(src);
            return;
        }
        let transform = self.transform_to(other);
        for (out, pixel) in dest.iter_mut().zip(src) {
            let value = self.scaling.scale_to_float(*pixel, self.is_yuv());
            *out = other
                .scaling
                .scale_from_float(apply(&transform, value), other.is_yuv());
        }
    }
}

impl fmt::Display for ColorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}bpp, full_scale={}",
            self.standard,
            self.bpp(),
            self.full_scale()
        )
    }
}
