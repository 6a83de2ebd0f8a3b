//! The "jet" color scale: dark blue through cyan, yellow and red.

use image::{GrayImage, Rgb, RgbImage};

/// Piecewise-linear jet ramp for one channel, clamped to `[0, 1]`.
fn ramp(x: f32, center: f32) -> f32 {
    (1.5 - (4.0 * x - center).abs()).clamp(0.0, 1.0)
}

/// Color for an intensity in `[0, 1]`; values outside are clamped.
///
/// ```rust
/// use pneumo_vision::jet;
///
/// assert_eq!(jet(0.0).0, [0, 0, 128]);
/// assert_eq!(jet(0.5).0, [128, 255, 128]);
/// assert_eq!(jet(1.0).0, [128, 0, 0]);
/// ```
pub fn jet(value: f32) -> Rgb<u8> {
    let x = value.clamp(0.0, 1.0);
    let to_u8 = |c: f32| (c * 255.0).round() as u8;
    Rgb([to_u8(ramp(x, 3.0)), to_u8(ramp(x, 2.0)), to_u8(ramp(x, 1.0))])
}

/// Color for an 8-bit intensity.
pub fn jet_u8(level: u8) -> Rgb<u8> {
    jet(f32::from(level) / 255.0)
}

/// Map every gray level of `heat` through the jet scale.
pub fn colorize(heat: &GrayImage) -> RgbImage {
    let lut: Vec<Rgb<u8>> = (0..=255u8).map(jet_u8).collect();
    RgbImage::from_fn(heat.width(), heat.height(), |x, y| {
        lut[usize::from(heat.get_pixel(x, y).0[0])]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_endpoints_and_midpoint() {
        assert_eq!(jet(0.0), Rgb([0, 0, 128]));
        assert_eq!(jet(1.0), Rgb([128, 0, 0]));
        assert_eq!(jet(0.5), Rgb([128, 255, 128]));
    }

    #[test]
    fn test_blue_to_red_progression() {
        let low = jet(0.1);
        let high = jet(0.9);
        assert!(low.0[2] > low.0[0]);
        assert!(high.0[0] > high.0[2]);
    }

    #[test]
    fn test_out_of_range_clamped() {
        assert_eq!(jet(-3.0), jet(0.0));
        assert_eq!(jet(7.0), jet(1.0));
    }

    #[test]
    fn test_colorize_uses_lut() {
        let heat = GrayImage::from_fn(3, 1, |x, _| Luma([[0u8, 128, 255][x as usize]]));
        let colored = colorize(&heat);
        assert_eq!(colored.dimensions(), (3, 1));
        assert_eq!(*colored.get_pixel(0, 0), jet_u8(0));
        assert_eq!(*colored.get_pixel(2, 0), jet(1.0));
    }
}
