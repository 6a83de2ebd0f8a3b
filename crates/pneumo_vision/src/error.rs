//! Error types for pneumo_vision.

use std::path::PathBuf;

use pneumo_core::CoreError;
use thiserror::Error;

/// Result type alias using [`VisionError`].
pub type Result<T> = std::result::Result<T, VisionError>;

/// Errors raised while reading, rendering or writing images.
#[derive(Error, Debug)]
pub enum VisionError {
    /// No file at the image path.
    #[error("Image not found at {}", .0.display())]
    ImageNotFound(PathBuf),

    /// The file exists but could not be decoded.
    #[error("Cannot read image {}: {reason}", .path.display())]
    ImageRead {
        /// Image path.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// The overlay could not be written.
    #[error("Cannot write image {}: {reason}", .path.display())]
    IoWrite {
        /// Output path.
        path: PathBuf,
        /// Encoder or filesystem message.
        reason: String,
    },

    /// Blend factor outside `[0, 1]`.
    #[error("Alpha must be within [0, 1], got {0}")]
    InvalidAlpha(f32),

    /// Target size of zero.
    #[error("Image size must be positive")]
    InvalidSize,

    /// Tensor conversion failure.
    #[error(transparent)]
    Tensor(#[from] CoreError),
}
