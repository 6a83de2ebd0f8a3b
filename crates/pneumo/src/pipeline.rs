//! End-to-end explanation and prediction.
//!
//! Both entry points run their stages strictly in order and stop at the
//! first failure; nothing is written unless every earlier stage succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use pneumo_core::backend::ExplainBackend;
use pneumo_explain::{build_dual_output_graph, clone_with_unique_names, compute_activation_map};
use pneumo_models::{LayerGraph, ModelProvider};
use pneumo_vision::{load_and_preprocess, load_rgb, preprocess, render_overlay};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Label for probabilities at or above the threshold.
pub const POSITIVE_LABEL: &str = "PNEUMONIA";

/// Label for probabilities below the threshold.
pub const NEGATIVE_LABEL: &str = "NORMAL";

/// Suffix inserted before the extension of a derived overlay path.
pub const OUTPUT_SUFFIX: &str = "_gradcam";

/// Overlay path used when none is given: `_gradcam` before the extension.
///
/// Paths without an extension get `.png`.
///
/// ```rust
/// use pneumo::derive_output_path;
/// use std::path::Path;
///
/// assert_eq!(
///     derive_output_path(Path::new("scans/chest.jpeg")).unwrap(),
///     Path::new("scans/chest_gradcam.jpeg")
/// );
/// assert_eq!(derive_output_path(Path::new("chest")).unwrap(), Path::new("chest_gradcam.png"));
/// assert!(derive_output_path(Path::new("/")).is_err());
/// ```
///
/// # Errors
///
/// [`PipelineError::InvalidConfig`] if `image` has no file name to derive from.
pub fn derive_output_path(image: &Path) -> Result<PathBuf> {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "cannot derive an output path from {}",
                image.display()
            ))
        })?;
    let extension = image
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
    Ok(image.with_file_name(format!("{}{}.{}", stem, OUTPUT_SUFFIX, extension)))
}

/// Explain the classifier's decision on `image` with a Grad-CAM overlay.
///
/// Uses the process-wide model cache on the CPU backend. Returns the path
/// the overlay was written to.
///
/// # Example
///
/// ```rust,ignore
/// use pneumo::{generate_gradcam, PipelineConfig};
///
/// let written = generate_gradcam("scan.png", None, &PipelineConfig::default())?;
/// assert_eq!(written, std::path::Path::new("scan_gradcam.png"));
/// ```
pub fn generate_gradcam(
    image: impl AsRef<Path>,
    output: Option<&Path>,
    config: &PipelineConfig,
) -> Result<PathBuf> {
    generate_gradcam_with(ModelProvider::<ExplainBackend>::global(), image, output, config)
}

/// [`generate_gradcam`] with an explicit model provider.
///
/// Stages: load model, preprocess, clone with renamed layers, force-build
/// the clone, replay the inner sub-network into a dual-output graph,
/// compute the activation map, render the overlay.
///
/// # Errors
///
/// The first stage error, wrapped in [`crate::PipelineError`].
pub fn generate_gradcam_with<B: AutodiffBackend>(
    provider: &ModelProvider<B>,
    image: impl AsRef<Path>,
    output: Option<&Path>,
    config: &PipelineConfig,
) -> Result<PathBuf> {
    let image = image.as_ref();
    let _span = info_span!("generate_gradcam", image = %image.display()).entered();
    config.validate()?;

    let model = provider.load(config.model_path.as_deref())?;
    let size = config.resolve_image_size(model.input_shape());
    let prepared = load_and_preprocess::<B>(image, size, provider.device())?;

    let clone = clone_with_unique_names(
        &model,
        &config.clone_suffix,
        provider.registry(),
        provider.device(),
    )?;
    let score = clone.force_build(&prepared.input)?;
    debug!(score, "Clone forward pass");

    let dual = build_dual_output_graph(
        &clone,
        &clone.qualified_name(&config.inner_subnetwork),
        &clone.qualified_name(&config.target_layer),
        prepared.input.shape(),
    )?;
    let heatmap = compute_activation_map(&dual, &prepared.input)?;

    let output = match output {
        Some(path) => path.to_path_buf(),
        None => derive_output_path(image)?,
    };
    let written = render_overlay(&prepared.original, &heatmap, &output, config.alpha)?;

    info!(output = %written.display(), "Grad-CAM complete");
    Ok(written)
}

/// A thresholded classifier decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// `PNEUMONIA` or `NORMAL`.
    pub prediction: String,
    /// Sigmoid probability of the positive class.
    pub probability: f32,
}

impl Prediction {
    /// Label `probability` against `threshold` (inclusive for the positive class).
    ///
    /// ```rust
    /// use pneumo::Prediction;
    ///
    /// assert_eq!(Prediction::from_probability(0.5, 0.5).prediction, "PNEUMONIA");
    /// assert_eq!(Prediction::from_probability(0.49, 0.5).prediction, "NORMAL");
    /// ```
    pub fn from_probability(probability: f32, threshold: f32) -> Self {
        let label = if probability >= threshold {
            POSITIVE_LABEL
        } else {
            NEGATIVE_LABEL
        };
        Self {
            prediction: label.to_string(),
            probability,
        }
    }

    /// Whether the positive class was predicted.
    pub fn is_positive(&self) -> bool {
        self.prediction == POSITIVE_LABEL
    }
}

/// Classify `image` with the process-wide cached model.
pub fn predict(image: impl AsRef<Path>, config: &PipelineConfig) -> Result<Prediction> {
    predict_with(ModelProvider::<ExplainBackend>::global(), image, config)
}

/// [`predict`] with an explicit model provider.
///
/// # Errors
///
/// The first stage error, wrapped in [`crate::PipelineError`].
pub fn predict_with<B: Backend>(
    provider: &ModelProvider<B>,
    image: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<Prediction> {
    let image = image.as_ref();
    let _span = info_span!("predict", image = %image.display()).entered();
    config.validate()?;

    let original = load_rgb(image)?;
    let model = provider.load(config.model_path.as_deref())?;
    let size = config.resolve_image_size(model.input_shape());
    let input = preprocess::<B>(&original, size, provider.device())?;

    let probability = model.score(input.into_inner())?;
    let prediction = Prediction::from_probability(probability, config.threshold);
    info!(
        label = %prediction.prediction,
        probability,
        "Prediction complete"
    );
    Ok(prediction)
}

/// Load the configured model through `provider` for inspection.
pub fn load_model_with<B: Backend>(
    provider: &ModelProvider<B>,
    config: &PipelineConfig,
) -> Result<Arc<LayerGraph<B>>> {
    Ok(provider.load(config.model_path.as_deref())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_output_path() {
        assert_eq!(
            derive_output_path(Path::new("/data/xray.png")).unwrap(),
            PathBuf::from("/data/xray_gradcam.png")
        );
        assert_eq!(
            derive_output_path(Path::new("a.b.jpg")).unwrap(),
            PathBuf::from("a.b_gradcam.jpg")
        );
        assert_eq!(
            derive_output_path(Path::new("scan")).unwrap(),
            PathBuf::from("scan_gradcam.png")
        );
    }

    #[test]
    fn test_derive_output_path_needs_file_name() {
        for path in ["/", "", "scans/.."] {
            let err = derive_output_path(Path::new(path)).unwrap_err();
            assert_eq!(err.kind(), "InvalidConfigError", "{path:?}");
        }
    }

    #[test]
    fn test_prediction_threshold() {
        let p = Prediction::from_probability(0.93, 0.5);
        assert!(p.is_positive());
        assert_eq!(p.prediction, "PNEUMONIA");

        let n = Prediction::from_probability(0.12, 0.5);
        assert!(!n.is_positive());
        assert_eq!(n.prediction, "NORMAL");

        assert_eq!(Prediction::from_probability(0.6, 0.7).prediction, "NORMAL");
    }
}
