//! Audio reference levels and amplitude conversion.
//!
//! Wire audio is normalised so that an amplitude of 1.0 sits at 0 dBVU. The
//! other references place their 0 dB point at a fixed offset from that level:
//!
//! | Reference | Offset (dB) |
//! |---|---|
//! | [`AudioReference::Dbu`] | +4 |
//! | [`AudioReference::Dbvu`] | 0 |
//! | [`AudioReference::DbfsSmpte`] | -20 |
//! | [`AudioReference::DbfsEbu`] | -14 |
//!
//! Converting *from* wire amplitude into a reference multiplies by
//! `10^(offset/20)`; converting *to* wire amplitude divides by it. dBVU is the
//! native reference and its conversions are plain copies.

use std::fmt;

use ndarray::{ArrayView, ArrayViewMut, Dimension, Zip};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{Error, Result};

/// Audio level reference standards.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AudioReference {
    /// dBu, 0 dBu = 0.775 V RMS.
    Dbu = 0,
    /// dBVU, the wire-native reference.
    Dbvu = 1,
    /// dBFS with SMPTE alignment (-20 dBFS reference tone).
    DbfsSmpte = 2,
    /// dBFS with EBU alignment (-14 dBFS reference tone).
    DbfsEbu = 3,
}

impl AudioReference {
    pub const ALL: [AudioReference; 4] = [
        AudioReference::Dbu,
        AudioReference::Dbvu,
        AudioReference::DbfsSmpte,
        AudioReference::DbfsEbu,
    ];

    /// Offset in dB between this reference's 0 dB point and wire level.
    pub fn value(self) -> f64 {
        match self {
            AudioReference::Dbu => 4.0,
            AudioReference::Dbvu => 0.0,
            AudioReference::DbfsSmpte => -20.0,
            AudioReference::DbfsEbu => -14.0,
        }
    }

    pub fn is_ndi_native(self) -> bool {
        self == AudioReference::Dbvu
    }

    /// Wire amplitude for a level of `db` in this reference.
    pub fn calc_amplitude(self, db: f64) -> f64 {
        10f64.powf((db - self.value()) / 20.0)
    }

    /// Level in this reference for a wire amplitude.
    pub fn calc_db(self, amplitude: f64) -> f64 {
        20.0 * amplitude.log10() + self.value()
    }
}

impl Default for AudioReference {
    fn default() -> Self {
        AudioReference::Dbvu
    }
}

impl fmt::Display for AudioReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioReference::Dbu => "dBu",
            AudioReference::Dbvu => "dBVU",
            AudioReference::DbfsSmpte => "dBFS (SMPTE)",
            AudioReference::DbfsEbu => "dBFS (EBU)",
        };
        f.write_str(name)
    }
}

/// Converts sample amplitudes between wire level and a chosen reference.
///
/// The scale factors are computed once when the reference is selected.
///
/// ```
/// use ndi_framekit::{AudioReference, AudioReferenceConverter};
///
/// let conv = AudioReferenceConverter::new(AudioReference::DbfsSmpte);
/// assert_eq!(conv.calc_amplitude(-20.0), 1.0);
/// assert!((conv.from_ndi(1.0) - 0.1).abs() < 1e-7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioReferenceConverter {
    reference: AudioReference,
    from_ndi_scale: f32,
    to_ndi_scale: f32,
}

impl AudioReferenceConverter {
    pub fn new(reference: AudioReference) -> Self {
        let value = reference.value();
        Self {
            reference,
            from_ndi_scale: 10f64.powf(value / 20.0) as f32,
            to_ndi_scale: 10f64.powf(-value / 20.0) as f32,
        }
    }

    pub fn reference(&self) -> AudioReference {
        self.reference
    }

    pub fn set_reference(&mut self, reference: AudioReference) {
        *self = Self::new(reference);
    }

    pub fn value(&self) -> f64 {
        self.reference.value()
    }

    pub fn is_ndi_native(&self) -> bool {
        self.reference.is_ndi_native()
    }

    pub fn calc_amplitude(&self, db: f64) -> f64 {
        self.reference.calc_amplitude(db)
    }

    pub fn calc_db(&self, amplitude: f64) -> f64 {
        self.reference.calc_db(amplitude)
    }

    /// Multiplier applied by [`Self::from_ndi`].
    pub fn from_ndi_scale(&self) -> f32 {
        self.from_ndi_scale
    }

    /// Multiplier applied by [`Self::to_ndi`].
    pub fn to_ndi_scale(&self) -> f32 {
        self.to_ndi_scale
    }

    /// Reference amplitude to wire amplitude.
    pub fn to_ndi(&self, amplitude: f32) -> f32 {
        if self.is_ndi_native() {
            amplitude
        } else {
            amplitude * self.to_ndi_scale
        }
    }

    /// Wire amplitude to reference amplitude.
    pub fn from_ndi(&self, amplitude: f32) -> f32 {
        if self.is_ndi_native() {
            amplitude
        } else {
            amplitude * self.from_ndi_scale
        }
    }

    /// Re-expresses an amplitude in this reference as an amplitude in `other`.
    ///
    /// Equivalent to `other.calc_amplitude(self.calc_db(amplitude))` in a
    /// single multiply.
    pub fn to_other(&self, other: AudioReference, amplitude: f64) -> f64 {
        if self.reference == other {
            return amplitude;
        }
        amplitude * 10f64.powf((self.value() - other.value()) / 20.0)
    }

    fn scale_slice(scale: Option<f32>, src: &[f32], dst: &mut [f32]) -> Result<()> {
        if src.len() != dst.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![src.len()],
                actual: vec![dst.len()],
            });
        }
        match scale {
            None => dst.copy_from_slice(src),
            Some(scale) => {
                for (d, s) in dst.iter_mut().zip(src) {
                    *d = *s * scale;
                }
            }
        }
        Ok(())
    }

    fn scale_array<D: Dimension>(
        scale: Option<f32>,
        src: ArrayView<'_, f32, D>,
        mut dst: ArrayViewMut<'_, f32, D>,
    ) -> Result<()> {
        if src.shape() != dst.shape() {
            return Err(Error::ShapeMismatch {
                expected: src.shape().to_vec(),
                actual: dst.shape().to_vec(),
            });
        }
        match scale {
            None => dst.assign(&src),
            Some(scale) => Zip::from(&mut dst).and(&src).for_each(|d, &s| *d = s * scale),
        }
        Ok(())
    }

    fn to_ndi_factor(&self) -> Option<f32> {
        (!self.is_ndi_native()).then_some(self.to_ndi_scale)
    }

    fn from_ndi_factor(&self) -> Option<f32> {
        (!self.is_ndi_native()).then_some(self.from_ndi_scale)
    }

    pub fn to_ndi_slice(&self, src: &[f32], dst: &mut [f32]) -> Result<()> {
        Self::scale_slice(self.to_ndi_factor(), src, dst)
    }

    pub fn from_ndi_slice(&self, src: &[f32], dst: &mut [f32]) -> Result<()> {
        Self::scale_slice(self.from_ndi_factor(), src, dst)
    }

    pub fn to_ndi_in_place(&self, data: &mut [f32]) {
        if let Some(scale) = self.to_ndi_factor() {
            data.iter_mut().for_each(|v| *v *= scale);
        }
    }

    pub fn from_ndi_in_place(&self, data: &mut [f32]) {
        if let Some(scale) = self.from_ndi_factor() {
            data.iter_mut().for_each(|v| *v *= scale);
        }
    }

    /// Element-wise [`Self::to_ndi`] into a destination of identical shape.
    pub fn to_ndi_array<D: Dimension>(
        &self,
        src: ArrayView<'_, f32, D>,
        dst: ArrayViewMut<'_, f32, D>,
    ) -> Result<()> {
        Self::scale_array(self.to_ndi_factor(), src, dst)
    }

    /// Element-wise [`Self::from_ndi`] into a destination of identical shape.
    pub fn from_ndi_array<D: Dimension>(
        &self,
        src: ArrayView<'_, f32, D>,
        dst: ArrayViewMut<'_, f32, D>,
    ) -> Result<()> {
        Self::scale_array(self.from_ndi_factor(), src, dst)
    }

    /// Element-wise [`Self::to_other`] into a destination of identical shape.
    pub fn to_other_array<D: Dimension>(
        &self,
        other: AudioReference,
        src: ArrayView<'_, f32, D>,
        dst: ArrayViewMut<'_, f32, D>,
    ) -> Result<()> {
        let scale = (self.reference != other).then(|| self.to_other(other, 1.0) as f32);
        Self::scale_array(scale, src, dst)
    }
}

impl Default for AudioReferenceConverter {
    fn default() -> Self {
        Self::new(AudioReference::Dbvu)
    }
}

impl From<AudioReference> for AudioReferenceConverter {
    fn from(reference: AudioReference) -> Self {
        Self::new(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    const AMPLITUDES: [f64; 5] = [0.063, 0.1, 0.63, 1.0, 10.0];

    fn expected_db(reference: AudioReference) -> ([f64; 5], [f64; 5]) {
        match reference {
            AudioReference::Dbu => (AMPLITUDES, [-20.0, -16.0, 0.0, 4.0, 24.0]),
            AudioReference::Dbvu => (AMPLITUDES, [-24.0, -20.0, -4.0, 0.0, 20.0]),
            AudioReference::DbfsSmpte => (AMPLITUDES, [-44.0, -40.0, -24.0, -20.0, 0.0]),
            AudioReference::DbfsEbu => (
                [0.063, 0.1, 0.63, 1.0, 5.01],
                [-38.0, -34.0, -18.0, -14.0, 0.0],
            ),
        }
    }

    #[test]
    fn test_reference_values() {
        assert_eq!(AudioReference::Dbu.value(), 4.0);
        assert_eq!(AudioReference::Dbvu.value(), 0.0);
        assert_eq!(AudioReference::DbfsSmpte.value(), -20.0);
        assert_eq!(AudioReference::DbfsEbu.value(), -14.0);
        assert!(AudioReference::Dbvu.is_ndi_native());
        assert!(!AudioReference::Dbu.is_ndi_native());
    }

    /// Amplitude/dB tables agree within the precision of the tabulated amplitudes.
    #[test]
    fn test_db_amplitude_tables() {
        for reference in AudioReference::ALL {
            let (amps, dbs) = expected_db(reference);
            for (amp, db) in amps.iter().zip(dbs.iter()) {
                let got = reference.calc_db(*amp);
                assert!((got - db).abs() < 0.1, "{reference}: {amp} -> {got}, want {db}");
                let back = reference.calc_amplitude(*db);
                assert!((back - amp).abs() / amp < 0.01, "{reference}: {db} -> {back}");
            }
        }
    }

    #[test]
    fn test_smpte_exact_points() {
        assert_eq!(AudioReference::DbfsSmpte.calc_amplitude(-20.0), 1.0);
        assert_eq!(AudioReference::DbfsSmpte.calc_amplitude(0.0), 10.0);
    }

    #[test]
    fn test_to_other_matches_db_round_trip() {
        for src in AudioReference::ALL {
            let conv = AudioReferenceConverter::new(src);
            for dst in AudioReference::ALL {
                for amp in AMPLITUDES {
                    let direct = conv.to_other(dst, amp);
                    let via_db = dst.calc_amplitude(src.calc_db(amp));
                    assert!(
                        (direct - via_db).abs() <= 1e-9 * via_db.abs().max(1.0),
                        "{src} -> {dst}: {direct} vs {via_db}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_native_reference_is_identity() {
        let conv = AudioReferenceConverter::default();
        let src = Array2::from_shape_fn((2, 7), |(c, i)| (c as f32 + 0.1) * (i as f32 - 3.3));
        let mut dst = Array2::<f32>::zeros((2, 7));
        conv.to_ndi_array(src.view(), dst.view_mut()).unwrap();
        assert_eq!(dst, src);
        conv.from_ndi_array(src.view(), dst.view_mut()).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn test_to_and_from_ndi_scale() {
        let conv = AudioReferenceConverter::new(AudioReference::Dbu);
        let src = [0.5f32, -0.25, 1.0];
        let mut wire = [0.0f32; 3];
        conv.to_ndi_slice(&src, &mut wire).unwrap();
        let scale = 10f32.powf(-4.0 / 20.0);
        for (w, s) in wire.iter().zip(src.iter()) {
            assert!((w - s * scale).abs() < 1e-6);
        }
        let mut back = [0.0f32; 3];
        conv.from_ndi_slice(&wire, &mut back).unwrap();
        for (b, s) in back.iter().zip(src.iter()) {
            assert!((b - s).abs() < 1e-6);
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let conv = AudioReferenceConverter::new(AudioReference::DbfsEbu);
        let src = Array2::<f32>::zeros((2, 4));
        let mut dst = Array2::<f32>::zeros((2, 5));
        assert!(matches!(
            conv.from_ndi_array(src.view(), dst.view_mut()),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(conv.to_ndi_slice(&[0.0; 3], &mut [0.0; 2]).is_err());
    }

    #[test]
    fn test_to_other_array() {
        let conv = AudioReferenceConverter::new(AudioReference::DbfsSmpte);
        let src = Array2::from_elem((1, 3), 1.0f32);
        let mut dst = Array2::<f32>::zeros((1, 3));
        conv.to_other_array(AudioReference::Dbvu, src.view(), dst.view_mut())
            .unwrap();
        // -20 dBFS is 0.1 of the dBVU amplitude
        for v in dst.iter() {
            assert!((v - 0.1).abs() < 1e-7);
        }
    }
}
