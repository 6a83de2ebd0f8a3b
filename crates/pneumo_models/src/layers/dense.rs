//! Fully connected layer.

use burn::prelude::*;
use pneumo_core::{FeatureShape, FeatureTensor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::layer::{default_true, to_config, ActivationKind, Layer};
use crate::weight::Weight;

/// Configuration for [`Dense`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseConfig {
    /// Layer name.
    pub name: String,
    /// Output features.
    pub units: usize,
    /// Activation applied to the output.
    #[serde(default)]
    pub activation: ActivationKind,
    /// Whether a bias is added.
    #[serde(default = "default_true")]
    pub use_bias: bool,
}

impl DenseConfig {
    /// Create a config with a bias and no activation.
    pub fn new(name: impl Into<String>, units: usize) -> Self {
        Self {
            name: name.into(),
            units,
            activation: ActivationKind::Linear,
            use_bias: true,
        }
    }

    /// Set the output activation.
    #[must_use]
    pub fn with_activation(mut self, activation: ActivationKind) -> Self {
        self.activation = activation;
        self
    }

    /// Enable or disable the bias.
    #[must_use]
    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    /// Create the unbuilt layer.
    pub fn init<B: Backend>(&self) -> Dense<B> {
        Dense {
            config: self.clone(),
            kernel: None,
            bias: None,
        }
    }
}

/// `y = activation(x · W + b)` with `W` shaped `(in, units)`.
#[derive(Debug)]
pub struct Dense<B: Backend> {
    config: DenseConfig,
    kernel: Option<Tensor<B, 2>>,
    bias: Option<Tensor<B, 1>>,
}

impl<B: Backend> Dense<B> {
    fn input_features(&self, input: FeatureShape) -> Result<usize> {
        let FeatureShape::Vector { features } = input else {
            return Err(ModelError::incompatible(
                &self.config.name,
                input,
                "expected a flat input; add a Flatten or pooling layer first",
            ));
        };
        if let Some(kernel) = &self.kernel {
            let [expected, _] = kernel.dims();
            if expected != features {
                return Err(ModelError::incompatible(
                    &self.config.name,
                    input,
                    format!("built for {} input features", expected),
                ));
            }
        }
        Ok(features)
    }
}

impl<B: Backend> Layer<B> for Dense<B> {
    fn class_name(&self) -> &'static str {
        "Dense"
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> Result<Value> {
        to_config(&self.config)
    }

    fn build(&mut self, input: FeatureShape, device: &B::Device) -> Result<FeatureShape> {
        self.kernel = None;
        let features = self.input_features(input)?;
        self.kernel = Some(Tensor::zeros([features, self.config.units], device));
        self.bias = self
            .config
            .use_bias
            .then(|| Tensor::zeros([self.config.units], device));
        Ok(FeatureShape::vector(self.config.units))
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        self.input_features(input)?;
        Ok(FeatureShape::vector(self.config.units))
    }

    fn forward(&self, x: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        let kernel = self
            .kernel
            .clone()
            .ok_or_else(|| ModelError::NotBuilt(self.config.name.clone()))?;
        self.input_features(x.shape())?;

        let mut out = x.into_vector()?.matmul(kernel);
        if let Some(bias) = &self.bias {
            out = out + bias.clone().reshape([1, self.config.units]);
        }
        Ok(self.config.activation.apply(FeatureTensor::Vector(out)))
    }

    fn weights(&self) -> Vec<Weight<B>> {
        self.kernel
            .iter()
            .map(|k| Weight::from_tensor(k.clone()))
            .chain(self.bias.iter().map(|b| Weight::from_tensor(b.clone())))
            .collect()
    }

    fn weight_count(&self) -> usize {
        1 + usize::from(self.config.use_bias)
    }

    fn set_weights(&mut self, weights: Vec<Weight<B>>) -> Result<()> {
        let name = self.config.name.clone();
        let dims = self
            .kernel
            .as_ref()
            .map(|k| k.dims())
            .ok_or_else(|| ModelError::NotBuilt(name.clone()))?;
        if weights.len() != self.weight_count() {
            return Err(ModelError::weight_mismatch(
                &name,
                format!("expected {} arrays, got {}", self.weight_count(), weights.len()),
            ));
        }

        let mut weights = weights.into_iter();
        if let Some(kernel) = weights.next() {
            self.kernel = Some(kernel.into_tensor(&name, dims)?);
        }
        if let Some(bias) = weights.next() {
            self.bias = Some(bias.into_tensor(&name, [self.config.units])?);
        }
        Ok(())
    }
}
