//! Pipeline configuration.

use std::path::{Path, PathBuf};

use pneumo_core::FeatureShape;
use pneumo_explain::DEFAULT_CLONE_SUFFIX;
use pneumo_vision::{DEFAULT_ALPHA, DEFAULT_IMAGE_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Default name of the nested sub-network holding the classifier layers.
pub const DEFAULT_INNER_SUBNETWORK: &str = "sequential";

/// Default convolution layer whose activations are explained.
pub const DEFAULT_TARGET_LAYER: &str = "conv2d_2";

/// Default decision threshold on the positive-class probability.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Settings shared by `generate_gradcam` and `predict`.
///
/// Layer names are given as they appear in the loaded model; they are
/// mapped into the clone's namespace by appending `_<clone_suffix>`.
/// Missing fields in a JSON file fall back to the defaults.
///
/// # Example
///
/// ```rust
/// use pneumo::PipelineConfig;
///
/// let config = PipelineConfig::default()
///     .with_target_layer("conv2d_1")
///     .with_alpha(0.6);
/// assert_eq!(config.inner_subnetwork, "sequential");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model file; `model/best_cnn.json` beside the executable when unset.
    pub model_path: Option<PathBuf>,
    /// Name of the nested sub-network to replay.
    pub inner_subnetwork: String,
    /// Name of the convolution layer to explain.
    pub target_layer: String,
    /// Suffix appended to every layer name of the clone.
    pub clone_suffix: String,
    /// Square preprocessing size; taken from the model input when unset.
    pub image_size: Option<u32>,
    /// Heatmap opacity in `[0, 1]`.
    pub alpha: f32,
    /// Probability at or above which the image is labelled PNEUMONIA.
    pub threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            inner_subnetwork: DEFAULT_INNER_SUBNETWORK.to_string(),
            target_layer: DEFAULT_TARGET_LAYER.to_string(),
            clone_suffix: DEFAULT_CLONE_SUFFIX.to_string(),
            image_size: None,
            alpha: DEFAULT_ALPHA,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl PipelineConfig {
    /// Read a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Set the model file.
    #[must_use]
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Set the sub-network to replay.
    #[must_use]
    pub fn with_inner_subnetwork(mut self, name: impl Into<String>) -> Self {
        self.inner_subnetwork = name.into();
        self
    }

    /// Set the layer to explain.
    #[must_use]
    pub fn with_target_layer(mut self, name: impl Into<String>) -> Self {
        self.target_layer = name.into();
        self
    }

    /// Set the clone suffix.
    #[must_use]
    pub fn with_clone_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.clone_suffix = suffix.into();
        self
    }

    /// Fix the preprocessing size instead of following the model input.
    #[must_use]
    pub fn with_image_size(mut self, size: u32) -> Self {
        self.image_size = Some(size);
        self
    }

    /// Set the heatmap opacity.
    #[must_use]
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set the decision threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Check value ranges and names.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if !(0.0..=1.0).contains(&self.alpha) {
            return invalid(format!("alpha must be within [0, 1], got {}", self.alpha));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return invalid(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            ));
        }
        if self.image_size == Some(0) {
            return invalid("image_size must be positive".to_string());
        }
        for (field, value) in [
            ("inner_subnetwork", &self.inner_subnetwork),
            ("target_layer", &self.target_layer),
            ("clone_suffix", &self.clone_suffix),
        ] {
            if value.trim().is_empty() {
                return invalid(format!("{} must not be empty", field));
            }
        }
        Ok(())
    }

    /// The preprocessing size for a model with the given input shape.
    ///
    /// An explicit `image_size` wins; otherwise a square spatial input
    /// decides, and anything else falls back to 224.
    pub fn resolve_image_size(&self, model_input: Option<FeatureShape>) -> u32 {
        if let Some(size) = self.image_size {
            return size;
        }
        match model_input {
            Some(FeatureShape::Map { height, width, .. }) if height == width && height > 0 => {
                u32::try_from(height).unwrap_or(DEFAULT_IMAGE_SIZE)
            }
            _ => DEFAULT_IMAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.inner_subnetwork, "sequential");
        assert_eq!(config.target_layer, "conv2d_2");
        assert_eq!(config.clone_suffix, "gc");
        assert!((config.alpha - 0.40).abs() < 1e-6);
        assert!((config.threshold - 0.5).abs() < 1e-6);
        assert!(config.model_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"target_layer": "conv2d_1", "alpha": 0.25}"#).unwrap();
        assert_eq!(config.target_layer, "conv2d_1");
        assert!((config.alpha - 0.25).abs() < 1e-6);
        assert_eq!(config.inner_subnetwork, "sequential");
        assert_eq!(config.image_size, None);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(PipelineConfig::default().with_alpha(1.5).validate().is_err());
        assert!(PipelineConfig::default().with_alpha(-0.1).validate().is_err());
        assert!(PipelineConfig::default().with_threshold(2.0).validate().is_err());
        assert!(PipelineConfig::default().with_image_size(0).validate().is_err());
        assert!(PipelineConfig::default().with_target_layer(" ").validate().is_err());
        assert!(PipelineConfig::default().with_alpha(0.0).validate().is_ok());
        assert!(PipelineConfig::default().with_alpha(1.0).validate().is_ok());
    }

    #[test]
    fn test_resolve_image_size() {
        let config = PipelineConfig::default();
        assert_eq!(config.resolve_image_size(Some(FeatureShape::map(64, 64, 3))), 64);
        assert_eq!(config.resolve_image_size(Some(FeatureShape::map(64, 32, 3))), 224);
        assert_eq!(config.resolve_image_size(None), 224);

        let fixed = config.with_image_size(128);
        assert_eq!(fixed.resolve_image_size(Some(FeatureShape::map(64, 64, 3))), 128);
    }

    #[test]
    fn test_from_json_file() {
        let dir = std::env::temp_dir().join(format!("pneumo_config_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pipeline.json");
        std::fs::write(&path, r#"{"image_size": 96, "threshold": 0.7}"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.image_size, Some(96));
        assert!((config.threshold - 0.7).abs() < 1e-6);

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(&path),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(PipelineConfig::from_json_file(dir.join("missing.json")).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
