//! One-line JSON results for command-line callers.

use pneumo_models::GraphSummary;
use serde::Serialize;

use crate::error::{PipelineError, Result};

/// Payload of a successful Grad-CAM run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradcamOutput {
    /// Where the overlay was written.
    pub output_path: String,
}

/// Payload of a successful model inspection.
#[derive(Debug, Clone, Serialize)]
pub struct InspectOutput {
    /// Model file that was inspected.
    pub model_path: String,
    /// Layer tree with shapes and parameter counts.
    pub model: GraphSummary,
}

/// Payload of a successful `init-model` run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitModelOutput {
    /// Where the model file was written.
    pub model_path: String,
    /// Trainable parameter count.
    pub params: usize,
}

/// Outcome of one invocation, serialized as a single JSON object tagged by
/// `status`.
///
/// ```rust
/// use pneumo::{GradcamOutput, Report};
///
/// let ok = Report::Success(GradcamOutput { output_path: "scan_gradcam.png".into() });
/// assert_eq!(
///     ok.to_json_line(),
///     r#"{"status":"success","output_path":"scan_gradcam.png"}"#
/// );
/// assert_eq!(ok.exit_code(), 0);
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Report<T> {
    /// Every stage succeeded.
    Success(T),
    /// A stage failed; nothing else was produced.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

impl<T: Serialize> Report<T> {
    /// Convert a pipeline result.
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(e) => Self::from_error(&e),
        }
    }

    /// Failure report for `error`.
    pub fn from_error(error: &PipelineError) -> Self {
        Self::Error {
            message: error.to_string(),
        }
    }

    /// Failure report with a free-form message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this is a success report.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Process exit status: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// Compact JSON without a trailing newline.
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "status": "error", "message": e.to_string() }).to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Prediction;
    use pneumo_models::CheckpointError;
    use serde_json::Value;
    use std::path::PathBuf;

    #[test]
    fn test_error_line() {
        let err = PipelineError::from(CheckpointError::NotFound(PathBuf::from("m.json")));
        let report: Report<GradcamOutput> = Report::from_result(Err(err));
        assert_eq!(report.exit_code(), 1);

        let value: Value = serde_json::from_str(&report.to_json_line()).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "Model not found at m.json");
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_prediction_line() {
        let report = Report::Success(Prediction::from_probability(0.75, 0.5));
        let value: Value = serde_json::from_str(&report.to_json_line()).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["prediction"], "PNEUMONIA");
        assert!((value["probability"].as_f64().unwrap() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_single_line() {
        let report: Report<GradcamOutput> = Report::error("line one\nline two");
        let line = report.to_json_line();
        assert!(!line.contains('\n'));
        assert!(!report.is_success());
    }
}
