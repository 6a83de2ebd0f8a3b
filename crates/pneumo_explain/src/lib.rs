//! # pneumo_explain
//!
//! Grad-CAM explanations for layer-graph classifiers.
//!
//! This crate provides:
//! - [`clone_with_unique_names`]: a structural copy of a classifier with every layer renamed
//! - [`build_dual_output_graph`]: replay of a nested sub-network exposing a target layer
//! - [`compute_activation_map`]: one recorded forward/backward pass turned into a heatmap
//!
//! ## Example
//!
//! ```rust,ignore
//! use pneumo_explain::{build_dual_output_graph, clone_with_unique_names, compute_activation_map};
//!
//! let clone = clone_with_unique_names(&model, "gc", &registry, &device)?;
//! let dual = build_dual_output_graph(
//!     &clone,
//!     &clone.qualified_name("sequential"),
//!     &clone.qualified_name("conv2d_2"),
//!     input.shape(),
//! )?;
//! let heatmap = compute_activation_map(&dual, &input)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod activation;
mod attribution;
mod error;
mod surgery;

pub use activation::{build_dual_output_graph, DualOutput, DualOutputGraph};
pub use attribution::{
    compute_activation_map, grad_cam, ActivationMap, ActivationStats, NORMALIZATION_EPSILON,
};
pub use error::{ExplainError, Result};
pub use surgery::{clone_with_unique_names, ClonedClassifier, DEFAULT_CLONE_SUFFIX};
