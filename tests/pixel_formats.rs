//! Pack/unpack coverage for every FourCC.

use ndarray::Array3;
use ndi_framekit::{FourCC, ImageReader, VideoFormat};
use proptest::prelude::*;

fn raw_frame(fourcc: FourCC, len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    let mut raw: Vec<u8> = (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect();
    // the padding byte of RGBX/BGRX is always written as 0xFF
    if matches!(fourcc, FourCC::RGBX | FourCC::BGRX) {
        raw.chunks_exact_mut(4).for_each(|px| px[3] = 0xFF);
    }
    raw
}

/// Luma + two ceil-half chroma planes (+ alpha), or 4 bytes per RGB pixel.
fn expected_size(fourcc: FourCC, width: usize, height: usize) -> usize {
    let (cw, ch) = ((width + 1) / 2, (height + 1) / 2);
    let luma = width * height;
    match fourcc {
        FourCC::BGRA | FourCC::BGRX | FourCC::RGBA | FourCC::RGBX => luma * 4,
        FourCC::UYVY => luma + 2 * cw * height,
        FourCC::UYVA => 2 * luma + 2 * cw * height,
        FourCC::P216 => 2 * (luma + 2 * cw * height),
        FourCC::PA16 => 2 * (2 * luma + 2 * cw * height),
        FourCC::YV12 | FourCC::I420 | FourCC::NV12 => luma + 2 * cw * ch,
    }
}

proptest! {
    #[test]
    fn pack_inverts_unpack(
        index in 0usize..FourCC::ALL.len(),
        width in 1usize..16,
        height in 1usize..12,
        planar in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let fourcc = FourCC::ALL[index];
        // packed 4:2:2 shares one chroma pair between two pixels
        let width = if matches!(fourcc, FourCC::UYVY | FourCC::UYVA) {
            width + width % 2
        } else {
            width
        };
        let reader = ImageReader::new(fourcc, width, height, planar, false).unwrap();
        prop_assert_eq!(reader.format().size_in_bytes(), expected_size(fourcc, width, height));
        let raw = raw_frame(fourcc, fourcc.buffer_size(width, height), seed);

        let unpacked = reader.unpack::<u16>(&raw).unwrap();
        prop_assert_eq!(unpacked.shape(), &reader.shape()[..]);
        prop_assert_eq!(reader.pack(unpacked.view()).unwrap(), raw);
    }
}

#[test]
fn buffer_sizes_agree_with_video_format() {
    for fourcc in FourCC::ALL {
        let format = VideoFormat::builder()
            .fourcc(fourcc)
            .resolution(16, 8)
            .build()
            .unwrap();
        let reader = ImageReader::new(fourcc, 16, 8, false, false).unwrap();
        assert_eq!(reader.format().size_in_bytes(), format.buffer_size(), "{fourcc}");
    }
}

#[test]
fn odd_sizes_round_trip_byte_exact() {
    let formats = [
        FourCC::I420,
        FourCC::YV12,
        FourCC::NV12,
        FourCC::P216,
        FourCC::PA16,
        FourCC::RGBX,
        FourCC::BGRA,
    ];
    for fourcc in formats {
        for planar in [false, true] {
            let reader = ImageReader::new(fourcc, 5, 3, planar, false).unwrap();
            assert_eq!(reader.format().size_in_bytes(), expected_size(fourcc, 5, 3), "{fourcc}");
            let raw = raw_frame(fourcc, reader.format().size_in_bytes(), 11);
            let unpacked = reader.unpack::<u16>(&raw).unwrap();
            let mut packed = vec![0u8; raw.len()];
            reader.pack_into(unpacked.view(), &mut packed).unwrap();
            assert_eq!(packed, raw, "{fourcc} planar={planar}");
        }
    }
}

#[test]
fn packed_422_rejects_odd_width() {
    for fourcc in [FourCC::UYVY, FourCC::UYVA] {
        assert!(ImageReader::new(fourcc, 5, 2, false, false).is_err(), "{fourcc}");
    }
}

#[test]
fn eight_bit_formats_round_trip_through_u8() {
    for fourcc in FourCC::ALL.into_iter().filter(|f| !f.is_16bit()) {
        for planar in [false, true] {
            let reader = ImageReader::new(fourcc, 6, 4, planar, false).unwrap();
            let raw = raw_frame(fourcc, reader.format().size_in_bytes(), 7);
            let unpacked: Array3<u8> = reader.unpack(&raw).unwrap();
            assert_eq!(reader.pack(unpacked.view()).unwrap(), raw, "{fourcc} planar={planar}");
        }
    }
}

#[test]
fn expanded_chroma_has_full_resolution() {
    for fourcc in FourCC::ALL {
        let reader = ImageReader::new(fourcc, 8, 4, true, true).unwrap();
        let shape = reader.shape();
        assert_eq!(shape[0], fourcc.num_components(), "{fourcc}");
        assert_eq!((shape[1], shape[2]), (4, 8), "{fourcc}");
    }
}
