//! Error types for pneumo_models.

use pneumo_core::CoreError;
use thiserror::Error;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while assembling, building or running a layer graph.
#[derive(Error, Debug)]
pub enum ModelError {
    /// No constructor registered for a layer class.
    #[error("Unknown layer class '{0}'")]
    UnknownLayer(String),

    /// A layer configuration could not be parsed or is out of range.
    #[error("Invalid configuration for {layer}: {reason}")]
    InvalidConfig {
        /// Layer class or name.
        layer: String,
        /// What was wrong.
        reason: String,
    },

    /// A layer cannot accept the shape it was given.
    #[error("Layer '{layer}' cannot accept input {input}: {reason}")]
    IncompatibleInput {
        /// Layer name.
        layer: String,
        /// Offending input shape.
        input: String,
        /// What was wrong.
        reason: String,
    },

    /// A layer was run or given weights before `build`.
    #[error("Layer '{0}' has not been built")]
    NotBuilt(String),

    /// Weight arrays do not match what a layer expects.
    #[error("Weight mismatch for '{layer}': {reason}")]
    WeightMismatch {
        /// Layer or graph name.
        layer: String,
        /// What was wrong.
        reason: String,
    },

    /// Two layers in one graph share a name.
    #[error("Duplicate layer name '{name}' in graph '{graph}'")]
    DuplicateName {
        /// Graph name.
        graph: String,
        /// Repeated layer name.
        name: String,
    },

    /// A graph was created without layers.
    #[error("Graph '{0}' has no layers")]
    EmptyGraph(String),

    /// Tensor-level failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ModelError {
    pub(crate) fn incompatible(
        layer: &str,
        input: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::IncompatibleInput {
            layer: layer.to_string(),
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn weight_mismatch(layer: &str, reason: impl Into<String>) -> Self {
        Self::WeightMismatch {
            layer: layer.to_string(),
            reason: reason.into(),
        }
    }
}
