//! # pneumo_core
//!
//! Core types shared by every pneumo crate.
//!
//! This crate provides:
//! - [`FeatureShape`] for per-sample activation shapes (batch excluded)
//! - [`FeatureTensor`] a dynamic-rank wrapper over Burn tensors flowing between layers
//! - [`InputTensor`] the validated `(1, H, W, 3)` image tensor fed to a classifier
//! - [`Seed`] for deterministic weight initialization
//! - Error types and backend aliases
//!
//! ## Layout Convention
//!
//! Image activations follow the channels-last convention `(B, H, W, C)`:
//! - `B`: Batch size (always 1 for explanations)
//! - `H`, `W`: Spatial extent
//! - `C`: Channels/filters
//!
//! ## Example
//!
//! ```rust,ignore
//! use pneumo_core::{FeatureShape, InputTensor};
//!
//! let shape = FeatureShape::map(224, 224, 3);
//! let input = InputTensor::<NdArray>::from_rgb_bytes(&pixels, 224, 224, &device)?;
//! assert_eq!(input.shape(), shape);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod seed;
mod shape;
mod tensor;

pub use error::{CoreError, Result};
pub use seed::Seed;
pub use shape::FeatureShape;
pub use tensor::{FeatureTensor, InputTensor};

/// Backend type aliases for convenience.
pub mod backend {
    pub use burn_autodiff::Autodiff;
    pub use burn_ndarray::{NdArray, NdArrayDevice};

    /// Backend used for explanations: CPU tensors with reverse-mode differentiation.
    pub type ExplainBackend = Autodiff<NdArray>;
}
