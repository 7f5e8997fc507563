//! SMPTE RP 219 colour bars through the colour engine.

use ndi_framekit::{
    yuv::{Pixel, REGISTERED_BIT_DEPTHS},
    ColorFormat, ColorStandard,
};

const BARS: [[u16; 3]; 7] = [
    [1, 1, 1], // white
    [1, 1, 0], // yellow
    [0, 1, 1], // cyan
    [0, 1, 0], // green
    [1, 0, 1], // magenta
    [1, 0, 0], // red
    [0, 0, 1], // blue
];

/// 100% bars, 75% bars, 40% grey, black, +2% and +4% pluge.
fn bars(full: u16, three_quarter: u16, zero: u16, extra: [u16; 4]) -> Vec<Pixel> {
    let scale = |level: u16| BARS.map(|c| c.map(|on| if on == 1 { level } else { zero }));
    let mut out = scale(full).to_vec();
    out.extend(scale(three_quarter));
    out.extend(extra.map(|v| [v; 3]));
    out
}

fn full_rgb_bars() -> Vec<Pixel> {
    bars(255, 191, 0, [102, 0, 5, 10])
}

fn studio_rgb_bars() -> Vec<Pixel> {
    bars(235, 180, 16, [104, 16, 20, 25])
}

/// Rec. 709 studio-range YUV of the bars above.
const YUV_BARS: [Pixel; 18] = [
    [235, 128, 128],
    [219, 16, 138],
    [188, 154, 16],
    [173, 42, 26],
    [78, 214, 230],
    [63, 102, 240],
    [32, 240, 118],
    [180, 128, 128],
    [168, 44, 136],
    [145, 147, 44],
    [133, 63, 52],
    [63, 193, 204],
    [51, 109, 212],
    [28, 212, 120],
    [104, 128, 128],
    [16, 128, 128],
    [20, 128, 128],
    [25, 128, 128],
];

fn max_error(a: &[Pixel], b: &[Pixel]) -> u16 {
    a.iter()
        .zip(b)
        .flat_map(|(x, y)| x.iter().zip(y).map(|(p, q)| p.abs_diff(*q)))
        .max()
        .unwrap_or(0)
}

fn lookup(standard: ColorStandard, bpp: u32, full: bool) -> &'static ColorFormat {
    ColorFormat::lookup(standard, bpp, full).unwrap()
}

#[test]
fn full_rgb_bars_to_yuv_are_exact() {
    let yuv = lookup(ColorStandard::Rgb, 8, true)
        .to_yuv(&full_rgb_bars(), Some(ColorStandard::Rec709), false)
        .unwrap();
    assert_eq!(yuv, YUV_BARS);
}

#[test]
fn studio_rgb_bars_to_yuv_are_exact() {
    let yuv = lookup(ColorStandard::Rgb, 8, false)
        .to_yuv(&studio_rgb_bars(), None, false)
        .unwrap();
    assert_eq!(yuv, YUV_BARS);
}

#[test]
fn yuv_bars_to_rgb_within_one_step() {
    let rec709 = lookup(ColorStandard::Rec709, 8, false);
    let full = rec709.to_rgb(&YUV_BARS, true).unwrap();
    assert!(max_error(&full, &full_rgb_bars()) <= 1);
    let studio = rec709.to_rgb(&YUV_BARS, false).unwrap();
    assert!(max_error(&studio, &studio_rgb_bars()) <= 1);
}

#[test]
fn deeper_yuv_bars_match_shifted_8bit() {
    let rec709 = lookup(ColorStandard::Rec709, 8, false);
    for bpp in [10, 12] {
        let shift = bpp - 8;
        let deep = lookup(ColorStandard::Rec709, bpp, false);
        let shifted: Vec<Pixel> = YUV_BARS.iter().map(|px| px.map(|v| v << shift)).collect();

        assert_eq!(rec709.to_other(&YUV_BARS, deep), shifted, "{bpp} bit");
        assert_eq!(deep.to_other(&shifted, rec709), YUV_BARS, "{bpp} bit");
    }
}

#[test]
fn deeper_rgb_bars_to_yuv_within_tolerance() {
    for bpp in [10u32, 12] {
        let shift = bpp - 8;
        let max = f64::from((1u32 << bpp) - 1);
        let full: Vec<Pixel> = full_rgb_bars()
            .iter()
            .map(|px| px.map(|v| (f64::from(v) / 255.0 * max).round() as u16))
            .collect();
        let studio: Vec<Pixel> = studio_rgb_bars().iter().map(|px| px.map(|v| v << shift)).collect();
        let expected: Vec<Pixel> = YUV_BARS.iter().map(|px| px.map(|v| v << shift)).collect();
        let tolerance = 1 << shift;

        let from_full = lookup(ColorStandard::Rgb, bpp, true)
            .to_yuv(&full, Some(ColorStandard::Rec709), false)
            .unwrap();
        assert!(max_error(&from_full, &expected) <= tolerance, "{bpp} bit full");

        let from_studio = lookup(ColorStandard::Rgb, bpp, false)
            .to_yuv(&studio, Some(ColorStandard::Rec709), false)
            .unwrap();
        assert!(max_error(&from_studio, &expected) <= tolerance, "{bpp} bit studio");
    }
}

#[test]
fn rgb_yuv_rgb_round_trip_every_standard() {
    for standard in [ColorStandard::Rec601, ColorStandard::Rec709, ColorStandard::Rec2020] {
        for bpp in REGISTERED_BIT_DEPTHS {
            let shift = bpp - 8;
            let max = f64::from((1u32 << bpp) - 1);
            let tolerance = 1u16 << shift;
            let full: Vec<Pixel> = full_rgb_bars()
                .iter()
                .map(|px| px.map(|v| (f64::from(v) / 255.0 * max).round() as u16))
                .collect();
            let studio: Vec<Pixel> = studio_rgb_bars().iter().map(|px| px.map(|v| v << shift)).collect();

            for (rgb, rgb_full) in [(full, true), (studio, false)] {
                let source = lookup(ColorStandard::Rgb, bpp, rgb_full);
                for yuv_full in [false, true] {
                    let yuv = source.to_yuv(&rgb, Some(standard), yuv_full).unwrap();
                    let back = lookup(standard, bpp, yuv_full).to_rgb(&yuv, rgb_full).unwrap();
                    assert!(
                        max_error(&back, &rgb) <= tolerance,
                        "{standard} {bpp} bit rgb_full={rgb_full} yuv_full={yuv_full}"
                    );
                }
            }
        }
    }
}

#[test]
fn cross_standard_conversion_keeps_grey_axis() {
    let rec709 = lookup(ColorStandard::Rec709, 8, false);
    let rec601 = lookup(ColorStandard::Rec601, 8, false);
    let converted = rec709.to_yuv(&YUV_BARS, Some(ColorStandard::Rec601), false).unwrap();
    assert_eq!(converted[0], YUV_BARS[0]);
    assert_eq!(&converted[14..], &YUV_BARS[14..]);
    assert_eq!(converted[1], [210, 16, 146]);
    assert_eq!(converted, rec709.to_other(&YUV_BARS, rec601));
}
