//! Error type for the explanation and prediction pipelines.

use pneumo_core::CoreError;
use pneumo_explain::ExplainError;
use pneumo_models::{CheckpointError, ModelError};
use pneumo_vision::VisionError;
use thiserror::Error;

/// Result type alias using [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Any failure of a pipeline stage.
///
/// Stage errors are wrapped unchanged; [`PipelineError::kind`] names the
/// category reported to callers.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration value out of range or unreadable config file.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model file missing or unloadable.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Image read, render or write failure.
    #[error(transparent)]
    Vision(#[from] VisionError),

    /// Graph surgery or gradient failure.
    #[error(transparent)]
    Explain(#[from] ExplainError),

    /// Model execution failure.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Tensor-level failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PipelineError {
    /// Category name of this error.
    ///
    /// ```rust
    /// use pneumo::PipelineError;
    /// use pneumo::models::CheckpointError;
    ///
    /// let err = PipelineError::from(CheckpointError::NotFound("model.json".into()));
    /// assert_eq!(err.kind(), "ModelNotFoundError");
    /// ```
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "InvalidConfigError",
            Self::Checkpoint(e) => match e {
                CheckpointError::NotFound(_) => "ModelNotFoundError",
                CheckpointError::Load(_) => "ModelLoadError",
                CheckpointError::Save(_) => "ModelSaveError",
            },
            Self::Vision(e) => match e {
                VisionError::ImageNotFound(_) | VisionError::ImageRead { .. } => "ImageReadError",
                VisionError::IoWrite { .. } => "IOWriteError",
                VisionError::InvalidAlpha(_) | VisionError::InvalidSize => "InvalidConfigError",
                VisionError::Tensor(_) => "TensorError",
            },
            Self::Explain(e) => match e {
                ExplainError::StructuralClone { .. } => "StructuralCloneError",
                ExplainError::SubnetworkNotFound(_) | ExplainError::NotASubnetwork(_) => {
                    "SubnetworkNotFoundError"
                }
                ExplainError::TargetLayerNotFound { .. } => "TargetLayerNotFoundError",
                ExplainError::TargetNotSpatial { .. } | ExplainError::UnsupportedOutput { .. } => {
                    "UnsupportedModelError"
                }
                ExplainError::Differentiation(_) => "DifferentiationError",
                ExplainError::Model(_) => "ModelExecutionError",
                ExplainError::Core(_) => "TensorError",
            },
            Self::Model(_) => "ModelExecutionError",
            Self::Core(_) => "TensorError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_kinds() {
        let cases: Vec<(PipelineError, &str)> = vec![
            (CheckpointError::NotFound(PathBuf::from("m.json")).into(), "ModelNotFoundError"),
            (CheckpointError::Load("bad".into()).into(), "ModelLoadError"),
            (VisionError::ImageNotFound(PathBuf::from("x.png")).into(), "ImageReadError"),
            (
                VisionError::IoWrite {
                    path: PathBuf::from("/nope/out.png"),
                    reason: "denied".into(),
                }
                .into(),
                "IOWriteError",
            ),
            (
                ExplainError::StructuralClone {
                    layer: "Lambda".into(),
                    reason: "unknown".into(),
                }
                .into(),
                "StructuralCloneError",
            ),
            (
                ExplainError::TargetLayerNotFound {
                    target: "conv2d_9_gc".into(),
                    replayed: vec!["conv2d_gc".into()],
                }
                .into(),
                "TargetLayerNotFoundError",
            ),
            (ExplainError::Differentiation("nan".into()).into(), "DifferentiationError"),
            (PipelineError::InvalidConfig("alpha".into()), "InvalidConfigError"),
        ];

        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{}", err);
        }
    }

    #[test]
    fn test_messages_pass_through() {
        let err = PipelineError::from(VisionError::ImageNotFound(PathBuf::from("scan.png")));
        assert_eq!(err.to_string(), "Image not found at scan.png");

        let err = PipelineError::from(CheckpointError::NotFound(PathBuf::from("model.json")));
        assert_eq!(err.to_string(), "Model not found at model.json");
    }
}
