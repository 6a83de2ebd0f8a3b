//! Parameter-free layers: reshaping, dropout, activations and rescaling.

use burn::prelude::*;
use pneumo_core::{FeatureShape, FeatureTensor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::layer::{to_config, ActivationKind, Layer};

/// Implements the name/config/build boilerplate shared by stateless layers.
macro_rules! stateless_layer {
    ($layer:ty, $class:literal) => {
        impl<B: Backend> Layer<B> for $layer {
            fn class_name(&self) -> &'static str {
                $class
            }

            fn name(&self) -> &str {
                &self.config.name
            }

            fn config(&self) -> Result<Value> {
                to_config(&self.config)
            }

            fn build(&mut self, input: FeatureShape, _device: &B::Device) -> Result<FeatureShape> {
                self.infer(input)
            }

            fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
                self.infer(input)
            }

            fn forward(&self, x: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
                self.apply(x)
            }
        }
    };
}

/// Configuration for [`Flatten`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenConfig {
    /// Layer name.
    pub name: String,
}

impl FlattenConfig {
    /// Create a config.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Create the layer.
    pub fn init(&self) -> Flatten {
        Flatten {
            config: self.clone(),
        }
    }
}

/// Collapses a `(H, W, C)` map into `H * W * C` features, row-major.
#[derive(Debug, Clone)]
pub struct Flatten {
    config: FlattenConfig,
}

impl Flatten {
    fn infer(&self, input: FeatureShape) -> Result<FeatureShape> {
        Ok(FeatureShape::vector(input.num_elements()))
    }

    fn apply<B: Backend>(&self, x: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        Ok(match x {
            FeatureTensor::Map(t) => {
                let [batch, h, w, c] = t.dims();
                FeatureTensor::Vector(t.reshape([batch, h * w * c]))
            }
            vector => vector,
        })
    }
}

stateless_layer!(Flatten, "Flatten");

/// Configuration for [`Dropout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropoutConfig {
    /// Layer name.
    pub name: String,
    /// Drop probability during training.
    pub rate: f64,
}

impl DropoutConfig {
    /// Create a config.
    pub fn new(name: impl Into<String>, rate: f64) -> Self {
        Self {
            name: name.into(),
            rate,
        }
    }

    /// Create the layer.
    ///
    /// # Errors
    ///
    /// Returns an error if `rate` is outside `[0, 1)`.
    pub fn init(&self) -> Result<Dropout> {
        if !(0.0..1.0).contains(&self.rate) {
            return Err(ModelError::InvalidConfig {
                layer: self.name.clone(),
                reason: format!("dropout rate {} outside [0, 1)", self.rate),
            });
        }
        Ok(Dropout {
            config: self.clone(),
        })
    }
}

/// Dropout. Graphs here only run inference, so this is the identity.
#[derive(Debug, Clone)]
pub struct Dropout {
    config: DropoutConfig,
}

impl Dropout {
    fn infer(&self, input: FeatureShape) -> Result<FeatureShape> {
        Ok(input)
    }

    fn apply<B: Backend>(&self, x: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        Ok(x)
    }
}

stateless_layer!(Dropout, "Dropout");

/// Configuration for [`Activation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationConfig {
    /// Layer name.
    pub name: String,
    /// Function to apply.
    pub activation: ActivationKind,
}

impl ActivationConfig {
    /// Create a config.
    pub fn new(name: impl Into<String>, activation: ActivationKind) -> Self {
        Self {
            name: name.into(),
            activation,
        }
    }

    /// Create the layer.
    pub fn init(&self) -> Activation {
        Activation {
            config: self.clone(),
        }
    }
}

/// A standalone element-wise activation.
#[derive(Debug, Clone)]
pub struct Activation {
    config: ActivationConfig,
}

impl Activation {
    fn infer(&self, input: FeatureShape) -> Result<FeatureShape> {
        Ok(input)
    }

    fn apply<B: Backend>(&self, x: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        Ok(self.config.activation.apply(x))
    }
}

stateless_layer!(Activation, "Activation");

/// Configuration for [`Rescaling`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescalingConfig {
    /// Layer name.
    pub name: String,
    /// Multiplier.
    pub scale: f64,
    /// Added after scaling.
    #[serde(default)]
    pub offset: f64,
}

impl RescalingConfig {
    /// Create a config with zero offset.
    pub fn new(name: impl Into<String>, scale: f64) -> Self {
        Self {
            name: name.into(),
            scale,
            offset: 0.0,
        }
    }

    /// Set the offset.
    #[must_use]
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Create the layer.
    pub fn init(&self) -> Rescaling {
        Rescaling {
            config: self.clone(),
        }
    }
}

/// `y = x * scale + offset`.
#[derive(Debug, Clone)]
pub struct Rescaling {
    config: RescalingConfig,
}

impl Rescaling {
    fn infer(&self, input: FeatureShape) -> Result<FeatureShape> {
        Ok(input)
    }

    fn apply<B: Backend>(&self, x: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        let (scale, offset) = (self.config.scale, self.config.offset);
        Ok(match x {
            FeatureTensor::Map(t) => FeatureTensor::Map(t.mul_scalar(scale).add_scalar(offset)),
            FeatureTensor::Vector(t) => {
                FeatureTensor::Vector(t.mul_scalar(scale).add_scalar(offset))
            }
        })
    }
}

stateless_layer!(Rescaling, "Rescaling");
