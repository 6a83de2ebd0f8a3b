//! Turning image files into classifier input.

use std::path::Path;

use burn::prelude::*;
use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};
use pneumo_core::InputTensor;
use tracing::debug;

use crate::error::{Result, VisionError};

/// Square side the reference classifier expects.
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

/// An image at its original resolution plus the tensor derived from it.
#[derive(Debug, Clone)]
pub struct Preprocessed<B: Backend> {
    /// Decoded pixels, untouched.
    pub original: RgbImage,
    /// Resized, normalized `(1, size, size, 3)` input.
    pub input: InputTensor<B>,
}

/// Decode `path` into 8-bit RGB. Grayscale images have their channel
/// replicated.
///
/// The format is sniffed from the file contents; the extension is only a
/// fallback.
///
/// # Errors
///
/// [`VisionError::ImageNotFound`] if there is no file, otherwise
/// [`VisionError::ImageRead`] when decoding fails.
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    if !path.is_file() {
        return Err(VisionError::ImageNotFound(path.to_path_buf()));
    }
    let read_error = |reason: String| VisionError::ImageRead {
        path: path.to_path_buf(),
        reason,
    };
    let image = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| read_error(e.to_string()))?
        .decode()
        .map_err(|e| read_error(e.to_string()))?;
    Ok(image.to_rgb8())
}

/// Resize `image` to `size x size` (bilinear) and scale pixels to `[0, 1]`.
pub fn preprocess<B: Backend>(
    image: &RgbImage,
    size: u32,
    device: &B::Device,
) -> Result<InputTensor<B>> {
    if size == 0 {
        return Err(VisionError::InvalidSize);
    }
    let resized = if image.dimensions() == (size, size) {
        image.clone()
    } else {
        imageops::resize(image, size, size, FilterType::Triangle)
    };
    let side = size as usize;
    Ok(InputTensor::from_rgb_bytes(
        resized.as_raw(),
        side,
        side,
        device,
    )?)
}

/// Read an image and prepare it for the classifier.
pub fn load_and_preprocess<B: Backend>(
    path: &Path,
    size: u32,
    device: &B::Device,
) -> Result<Preprocessed<B>> {
    let original = load_rgb(path)?;
    let input = preprocess(&original, size, device)?;
    debug!(
        path = %path.display(),
        width = original.width(),
        height = original.height(),
        size,
        "Preprocessed image"
    );
    Ok(Preprocessed { original, input })
}
