//! Error types for pneumo_explain.

use pneumo_core::CoreError;
use pneumo_models::ModelError;
use thiserror::Error;

/// Result type alias using [`ExplainError`].
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors raised while rewriting a classifier or computing its explanation.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// A layer could not be recreated from its configuration.
    #[error("Cannot reconstruct layer '{layer}': {reason}")]
    StructuralClone {
        /// Layer class or name.
        layer: String,
        /// What went wrong.
        reason: String,
    },

    /// No layer with the requested sub-network name.
    #[error("Sub-network '{0}' not found in model")]
    SubnetworkNotFound(String),

    /// The named layer exists but has no nested layers.
    #[error("Layer '{0}' is not a sub-network")]
    NotASubnetwork(String),

    /// No replayed layer carries the target name.
    #[error("Target layer '{target}' not found among replayed layers [{}]", .replayed.join(", "))]
    TargetLayerNotFound {
        /// Requested layer name.
        target: String,
        /// Names of every replayed layer, in order.
        replayed: Vec<String>,
    },

    /// The target layer does not produce a spatial map.
    #[error("Target layer '{layer}' produces {shape}, expected a spatial map")]
    TargetNotSpatial {
        /// Target layer name.
        layer: String,
        /// Its output shape.
        shape: String,
    },

    /// The replayed sub-network does not end in a flat score vector.
    #[error("Sub-network '{subnetwork}' produces {shape}, expected a flat score output")]
    UnsupportedOutput {
        /// Sub-network name.
        subnetwork: String,
        /// Its output shape.
        shape: String,
    },

    /// Gradients could not be computed or were not finite.
    #[error("Gradient computation failed: {0}")]
    Differentiation(String),

    /// Model-level failure (shape, weights, build).
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Tensor-level failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}
