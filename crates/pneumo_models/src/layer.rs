//! The layer abstraction shared by every graph node.

use burn::prelude::*;
use burn::tensor::activation;
use pneumo_core::{FeatureShape, FeatureTensor};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::graph::LayerGraph;
use crate::weight::Weight;

/// A node of a layer graph.
///
/// Layers are created unbuilt from a configuration, then `build` allocates
/// their weights for a concrete input shape. Weights are exchanged as a flat
/// list in the layer's structural order, so two layers with the same
/// configuration can copy weights between each other.
pub trait Layer<B: Backend>: Send + Sync + std::fmt::Debug {
    /// Registry class name, e.g. `"Conv2D"`.
    fn class_name(&self) -> &'static str;

    /// Name of this layer inside its graph.
    fn name(&self) -> &str;

    /// Full configuration as JSON, including `"name"`.
    fn config(&self) -> Result<Value>;

    /// Class name and configuration together.
    fn spec(&self) -> Result<LayerSpec> {
        Ok(LayerSpec::new(self.class_name(), self.config()?))
    }

    /// Allocate weights for `input` and return the output shape.
    fn build(&mut self, input: FeatureShape, device: &B::Device) -> Result<FeatureShape>;

    /// Output shape for `input` without touching any tensor.
    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape>;

    /// Run the layer on a batch.
    fn forward(&self, x: FeatureTensor<B>) -> Result<FeatureTensor<B>>;

    /// Weights in structural order. Empty for parameter-free layers.
    fn weights(&self) -> Vec<Weight<B>> {
        Vec::new()
    }

    /// Number of weight arrays `set_weights` expects.
    fn weight_count(&self) -> usize {
        0
    }

    /// Replace all weights.
    fn set_weights(&mut self, weights: Vec<Weight<B>>) -> Result<()> {
        if weights.is_empty() {
            Ok(())
        } else {
            Err(ModelError::weight_mismatch(
                self.name(),
                format!("layer has no weights, got {}", weights.len()),
            ))
        }
    }

    /// Total number of scalar parameters.
    fn param_count(&self) -> usize {
        self.weights().iter().map(Weight::numel).sum()
    }

    /// The nested graph, for layers that wrap a sub-network.
    fn sublayers(&self) -> Option<&LayerGraph<B>> {
        None
    }
}

/// Serialized form of a layer: what the registry needs to recreate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Registry class name.
    pub class_name: String,
    /// Layer configuration, including `"name"`.
    pub config: Value,
}

impl LayerSpec {
    /// Create a new spec.
    pub fn new(class_name: impl Into<String>, config: Value) -> Self {
        Self {
            class_name: class_name.into(),
            config,
        }
    }

    /// The configured layer name, if any.
    pub fn name(&self) -> Option<&str> {
        self.config.get("name").and_then(Value::as_str)
    }

    /// Copy of this spec with every layer name rewritten by `rename`.
    ///
    /// Specs nested under a `"layers"` array (sub-networks) are renamed too.
    ///
    /// ```rust
    /// use pneumo_models::LayerSpec;
    /// use serde_json::json;
    ///
    /// let spec = LayerSpec::new(
    ///     "Sequential",
    ///     json!({"name": "sequential", "layers": [
    ///         {"class_name": "Flatten", "config": {"name": "flatten"}}
    ///     ]}),
    /// );
    /// let renamed = spec.renamed(&|name| format!("{name}_gc")).unwrap();
    /// assert_eq!(renamed.name(), Some("sequential_gc"));
    /// assert_eq!(renamed.config["layers"][0]["config"]["name"], "flatten_gc");
    /// ```
    ///
    /// # Errors
    ///
    /// [`ModelError::InvalidConfig`] if a nested entry is not a layer spec.
    pub fn renamed(&self, rename: &dyn Fn(&str) -> String) -> Result<Self> {
        let mut config = self.config.clone();
        if let Some(obj) = config.as_object_mut() {
            if let Some(name) = obj.get("name").and_then(Value::as_str) {
                let new_name = rename(name);
                obj.insert("name".to_string(), Value::String(new_name));
            }
            if let Some(children) = obj.get_mut("layers").and_then(Value::as_array_mut) {
                for (index, child) in children.iter_mut().enumerate() {
                    let spec: LayerSpec =
                        serde_json::from_value(child.clone()).map_err(|e| {
                            ModelError::InvalidConfig {
                                layer: self.name().unwrap_or(self.class_name.as_str()).to_string(),
                                reason: format!("nested layer {}: {}", index, e),
                            }
                        })?;
                    *child = to_config(&spec.renamed(rename)?)?;
                }
            }
        }
        Ok(Self {
            class_name: self.class_name.clone(),
            config,
        })
    }
}

/// Element-wise activation applied after a layer's linear part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationKind {
    /// Identity.
    #[default]
    Linear,
    /// `max(x, 0)`.
    Relu,
    /// Logistic sigmoid.
    Sigmoid,
    /// Softmax over the last axis.
    Softmax,
    /// Hyperbolic tangent.
    Tanh,
}

impl ActivationKind {
    /// Apply to a feature tensor of either rank.
    pub fn apply<B: Backend>(self, x: FeatureTensor<B>) -> FeatureTensor<B> {
        match x {
            FeatureTensor::Map(t) => FeatureTensor::Map(self.apply_tensor(t)),
            FeatureTensor::Vector(t) => FeatureTensor::Vector(self.apply_tensor(t)),
        }
    }

    fn apply_tensor<B: Backend, const D: usize>(self, t: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Linear => t,
            Self::Relu => activation::relu(t),
            Self::Sigmoid => activation::sigmoid(t),
            Self::Softmax => activation::softmax(t, D - 1),
            Self::Tanh => t.tanh(),
        }
    }
}

/// Spatial padding mode for convolution and pooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    /// No padding; windows must fit entirely.
    #[default]
    Valid,
    /// Pad so that `out = ceil(in / stride)`.
    Same,
}

impl Padding {
    /// Resolve one spatial axis into `(output_extent, leading_pad)`.
    ///
    /// `Same` padding that would need an extra cell on one side only is
    /// rejected, since the convolution kernels pad symmetrically.
    pub fn resolve(
        self,
        input: usize,
        kernel: usize,
        stride: usize,
    ) -> std::result::Result<(usize, usize), String> {
        if kernel == 0 || stride == 0 {
            return Err("kernel and stride must be positive".to_string());
        }
        match self {
            Self::Valid => {
                if input < kernel {
                    Err(format!("window {} larger than extent {}", kernel, input))
                } else {
                    Ok(((input - kernel) / stride + 1, 0))
                }
            }
            Self::Same => {
                let output = input.div_ceil(stride);
                let total = ((output.saturating_sub(1)) * stride + kernel).saturating_sub(input);
                if total % 2 == 0 {
                    Ok((output, total / 2))
                } else {
                    Err(format!(
                        "'same' padding on extent {} with window {} and stride {} is asymmetric",
                        input, kernel, stride
                    ))
                }
            }
        }
    }
}

/// Parse a layer configuration into its typed form.
pub(crate) fn parse_config<T: DeserializeOwned>(class_name: &str, config: &Value) -> Result<T> {
    serde_json::from_value(config.clone()).map_err(|e| ModelError::InvalidConfig {
        layer: class_name.to_string(),
        reason: e.to_string(),
    })
}

/// Serialize a typed configuration back to JSON.
pub(crate) fn to_config<T: Serialize>(config: &T) -> Result<Value> {
    serde_json::to_value(config).map_err(|e| ModelError::InvalidConfig {
        layer: std::any::type_name::<T>().to_string(),
        reason: e.to_string(),
    })
}

/// Shorthand for the spatial dimensions of a map shape.
pub(crate) fn spatial(layer: &str, input: FeatureShape) -> Result<(usize, usize, usize)> {
    match input {
        FeatureShape::Map {
            height,
            width,
            channels,
        } => Ok((height, width, channels)),
        FeatureShape::Vector { .. } => Err(ModelError::incompatible(
            layer,
            input,
            "expected a spatial input",
        )),
    }
}

pub(crate) fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use serde_json::json;

    type TestBackend = NdArray;

    #[test]
    fn test_valid_padding() {
        assert_eq!(Padding::Valid.resolve(224, 3, 1), Ok((222, 0)));
        assert_eq!(Padding::Valid.resolve(111, 2, 2), Ok((55, 0)));
        assert!(Padding::Valid.resolve(2, 3, 1).is_err());
    }

    #[test]
    fn test_same_padding() {
        assert_eq!(Padding::Same.resolve(28, 3, 1), Ok((28, 1)));
        assert_eq!(Padding::Same.resolve(28, 2, 2), Ok((14, 0)));
        // Odd extent pooled by 2 needs one trailing cell only.
        assert!(Padding::Same.resolve(5, 2, 2).is_err());
    }

    #[test]
    fn test_activation_relu_and_sigmoid() {
        let device = Default::default();
        let x: FeatureTensor<TestBackend> =
            Tensor::<TestBackend, 2>::from_floats([[-1.0, 0.0, 2.0]], &device).into();

        let relu = ActivationKind::Relu.apply(x.clone()).to_vec().unwrap();
        assert_eq!(relu, vec![0.0, 0.0, 2.0]);

        let sigmoid = ActivationKind::Sigmoid.apply(x).to_vec().unwrap();
        assert!((sigmoid[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_uses_last_axis() {
        let device = Default::default();
        let x: FeatureTensor<TestBackend> =
            Tensor::<TestBackend, 4>::ones([1, 2, 2, 4], &device).into();
        let values = ActivationKind::Softmax.apply(x).to_vec().unwrap();
        assert!(values.iter().all(|v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_activation_serde_names() {
        let kind: ActivationKind = serde_json::from_value(json!("relu")).unwrap();
        assert_eq!(kind, ActivationKind::Relu);
        assert_eq!(serde_json::to_value(Padding::Same).unwrap(), json!("same"));
    }

    #[test]
    fn test_spec_renamed_leaves_other_fields() {
        let spec = LayerSpec::new("Dense", json!({"name": "dense", "units": 4}));
        let renamed = spec.renamed(&|n| format!("{n}_x")).unwrap();
        assert_eq!(renamed.name(), Some("dense_x"));
        assert_eq!(renamed.config["units"], 4);
        assert_eq!(spec.name(), Some("dense"));
    }

    #[test]
    fn test_spec_renamed_rejects_malformed_child() {
        let spec = LayerSpec::new(
            "Sequential",
            json!({"name": "sequential", "layers": [
                {"class_name": "Flatten", "config": {"name": "flatten"}},
                {"units": 3}
            ]}),
        );
        let err = spec.renamed(&|n| format!("{n}_gc")).unwrap_err();
        match err {
            ModelError::InvalidConfig { layer, reason } => {
                assert_eq!(layer, "sequential");
                assert!(reason.contains("nested layer 1"), "{}", reason);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
