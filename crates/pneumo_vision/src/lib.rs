//! # pneumo_vision
//!
//! Image input and output around a Grad-CAM explanation.
//!
//! - [`load_and_preprocess`]: decode an image, keep the original pixels and
//!   build the `(1, size, size, 3)` classifier input (values in `[0, 1]`)
//! - [`jet`] / [`colorize`]: the blue-to-red color scale
//! - [`render_overlay`]: resize a heatmap to the original resolution, color
//!   it and alpha-blend it over the original image
//!
//! Pixels are handled in RGB order throughout.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod colormap;
mod error;
mod overlay;
mod preprocess;

pub use colormap::{colorize, jet, jet_u8};
pub use error::{Result, VisionError};
pub use overlay::{blend, overlay_image, render_overlay, resize_heatmap, to_gray, DEFAULT_ALPHA};
pub use preprocess::{load_and_preprocess, load_rgb, preprocess, Preprocessed, DEFAULT_IMAGE_SIZE};

pub use image::RgbImage;
