//! 2D convolution over channels-last feature maps.

use burn::prelude::*;
use burn::tensor::module::conv2d;
use burn::tensor::ops::ConvOptions;
use pneumo_core::{FeatureShape, FeatureTensor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::layer::{default_true, spatial, to_config, ActivationKind, Layer, Padding};
use crate::weight::Weight;

fn unit_strides() -> [usize; 2] {
    [1, 1]
}

/// Configuration for [`Conv2d`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv2dConfig {
    /// Layer name.
    pub name: String,
    /// Number of output channels.
    pub filters: usize,
    /// Kernel `(height, width)`.
    pub kernel_size: [usize; 2],
    /// Stride `(height, width)`.
    #[serde(default = "unit_strides")]
    pub strides: [usize; 2],
    /// Padding mode.
    #[serde(default)]
    pub padding: Padding,
    /// Activation applied to the output.
    #[serde(default)]
    pub activation: ActivationKind,
    /// Whether a bias is added.
    #[serde(default = "default_true")]
    pub use_bias: bool,
}

impl Conv2dConfig {
    /// Create a config with unit strides, valid padding and no activation.
    pub fn new(name: impl Into<String>, filters: usize, kernel_size: [usize; 2]) -> Self {
        Self {
            name: name.into(),
            filters,
            kernel_size,
            strides: unit_strides(),
            padding: Padding::Valid,
            activation: ActivationKind::Linear,
            use_bias: true,
        }
    }

    /// Set the strides.
    #[must_use]
    pub fn with_strides(mut self, strides: [usize; 2]) -> Self {
        self.strides = strides;
        self
    }

    /// Set the padding mode.
    #[must_use]
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
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
    pub fn init<B: Backend>(&self) -> Conv2d<B> {
        Conv2d {
            config: self.clone(),
            kernel: None,
            bias: None,
        }
    }
}

/// Convolution layer with a `(kh, kw, in, out)` kernel.
#[derive(Debug)]
pub struct Conv2d<B: Backend> {
    config: Conv2dConfig,
    kernel: Option<Tensor<B, 4>>,
    bias: Option<Tensor<B, 1>>,
}

impl<B: Backend> Conv2d<B> {
    /// The layer configuration.
    pub fn layer_config(&self) -> &Conv2dConfig {
        &self.config
    }

    /// Output shape and symmetric `(pad_h, pad_w)` for `input`.
    fn geometry(&self, input: FeatureShape) -> Result<(FeatureShape, [usize; 2])> {
        let (height, width, channels) = spatial(&self.config.name, input)?;
        if let Some(kernel) = &self.kernel {
            let expected = kernel.dims()[2];
            if channels != expected {
                return Err(ModelError::incompatible(
                    &self.config.name,
                    input,
                    format!("built for {} input channels", expected),
                ));
            }
        }

        let [kh, kw] = self.config.kernel_size;
        let [sh, sw] = self.config.strides;
        let padding = self.config.padding;
        let (out_h, pad_h) = padding
            .resolve(height, kh, sh)
            .map_err(|reason| ModelError::incompatible(&self.config.name, input, reason))?;
        let (out_w, pad_w) = padding
            .resolve(width, kw, sw)
            .map_err(|reason| ModelError::incompatible(&self.config.name, input, reason))?;

        Ok((
            FeatureShape::map(out_h, out_w, self.config.filters),
            [pad_h, pad_w],
        ))
    }
}

impl<B: Backend> Layer<B> for Conv2d<B> {
    fn class_name(&self) -> &'static str {
        "Conv2D"
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> Result<Value> {
        to_config(&self.config)
    }

    fn build(&mut self, input: FeatureShape, device: &B::Device) -> Result<FeatureShape> {
        self.kernel = None;
        let (output, _) = self.geometry(input)?;
        let [kh, kw] = self.config.kernel_size;
        self.kernel = Some(Tensor::zeros(
            [kh, kw, input.channels(), self.config.filters],
            device,
        ));
        self.bias = self
            .config
            .use_bias
            .then(|| Tensor::zeros([self.config.filters], device));
        Ok(output)
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        self.geometry(input).map(|(shape, _)| shape)
    }

    fn forward(&self, x: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        let kernel = self
            .kernel
            .clone()
            .ok_or_else(|| ModelError::NotBuilt(self.config.name.clone()))?;
        let (_, padding) = self.geometry(x.shape())?;
        let x = x.into_map()?;

        // (kh, kw, in, out) -> (out, in, kh, kw)
        let weight = kernel.permute([3, 2, 0, 1]);
        let options = ConvOptions::new(self.config.strides, padding, [1, 1], 1);
        let out = conv2d(x.permute([0, 3, 1, 2]), weight, self.bias.clone(), options);

        Ok(self
            .config
            .activation
            .apply(FeatureTensor::Map(out.permute([0, 2, 3, 1]))))
    }

    fn weights(&self) -> Vec<Weight<B>> {
        let mut weights = Vec::with_capacity(2);
        if let Some(kernel) = &self.kernel {
            weights.push(Weight::from_tensor(kernel.clone()));
        }
        if let Some(bias) = &self.bias {
            weights.push(Weight::from_tensor(bias.clone()));
        }
        weights
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
            self.bias = Some(bias.into_tensor(&name, [self.config.filters])?);
        }
        Ok(())
    }
}
