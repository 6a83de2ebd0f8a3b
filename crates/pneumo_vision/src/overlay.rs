//! Blending an activation map over the original image.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use ndarray::Array2;
use pneumo_explain::ActivationMap;
use tracing::info;

use crate::colormap::colorize;
use crate::error::{Result, VisionError};

/// Heatmap weight used when none is configured.
pub const DEFAULT_ALPHA: f32 = 0.40;

/// Resize a heatmap to `width x height` with bilinear interpolation.
///
/// Resizing to the map's own size returns it unchanged.
pub fn resize_heatmap(map: &ActivationMap, width: u32, height: u32) -> Array2<f32> {
    let values = map.values();
    if (map.width(), map.height()) == (width as usize, height as usize) {
        return values.clone();
    }

    let raw: Vec<f32> = values.iter().copied().collect();
    let source: Option<ImageBuffer<Luma<f32>, Vec<f32>>> =
        ImageBuffer::from_raw(map.width() as u32, map.height() as u32, raw);
    let Some(source) = source else {
        return Array2::zeros((height as usize, width as usize));
    };

    let resized = imageops::resize(&source, width, height, FilterType::Triangle);
    Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
        resized.get_pixel(col as u32, row as u32).0[0].clamp(0.0, 1.0)
    })
}

/// Scale `[0, 1]` values to 8-bit gray levels.
pub fn to_gray(values: &Array2<f32>) -> GrayImage {
    let (height, width) = values.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([(255.0 * values[[y as usize, x as usize]].clamp(0.0, 1.0)) as u8])
    })
}

/// `round((1 - alpha) * original + alpha * overlay)` per pixel and channel.
///
/// # Errors
///
/// Fails on alpha outside `[0, 1]` or images of different sizes.
pub fn blend(original: &RgbImage, overlay: &RgbImage, alpha: f32) -> Result<RgbImage> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(VisionError::InvalidAlpha(alpha));
    }
    if original.dimensions() != overlay.dimensions() {
        return Err(VisionError::Tensor(pneumo_core::CoreError::InvalidShape {
            expected: format!("{:?}", original.dimensions()),
            got: format!("{:?}", overlay.dimensions()),
        }));
    }

    let mut out = original.clone();
    for (dst, src) in out.pixels_mut().zip(overlay.pixels()) {
        for (d, s) in dst.0.iter_mut().zip(src.0) {
            let mixed = (1.0 - alpha) * f32::from(*d) + alpha * f32::from(s);
            *d = mixed.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

/// Colorize `map` at the original resolution and blend it over `original`.
pub fn overlay_image(original: &RgbImage, map: &ActivationMap, alpha: f32) -> Result<RgbImage> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(VisionError::InvalidAlpha(alpha));
    }
    let (width, height) = original.dimensions();
    let heat = resize_heatmap(map, width, height);
    let colored = colorize(&to_gray(&heat));
    blend(original, &colored, alpha)
}

/// Render the overlay and write it to `output`, replacing any existing file.
///
/// The format follows the output extension.
///
/// # Errors
///
/// [`VisionError::IoWrite`] if the file cannot be encoded or written.
pub fn render_overlay(
    original: &RgbImage,
    map: &ActivationMap,
    output: &Path,
    alpha: f32,
) -> Result<PathBuf> {
    let overlay = overlay_image(original, map, alpha)?;
    overlay.save(output).map_err(|e| VisionError::IoWrite {
        path: output.to_path_buf(),
        reason: e.to_string(),
    })?;
    info!(
        path = %output.display(),
        width = overlay.width(),
        height = overlay.height(),
        alpha,
        "Wrote overlay"
    );
    Ok(output.to_path_buf())
}
