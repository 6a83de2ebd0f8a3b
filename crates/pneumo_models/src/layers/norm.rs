//! Batch normalization with frozen statistics.

use burn::prelude::*;
use pneumo_core::{FeatureShape, FeatureTensor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::layer::{default_true, to_config, Layer};
use crate::weight::Weight;

fn default_epsilon() -> f64 {
    1e-3
}

/// Configuration for [`BatchNorm`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNormConfig {
    /// Layer name.
    pub name: String,
    /// Added to the variance before the square root.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Whether a learned offset (`beta`) is applied.
    #[serde(default = "default_true")]
    pub center: bool,
    /// Whether a learned scale (`gamma`) is applied.
    #[serde(default = "default_true")]
    pub scale: bool,
}

impl BatchNormConfig {
    /// Create a config with scale and offset enabled.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            epsilon: default_epsilon(),
            center: true,
            scale: true,
        }
    }

    /// Set epsilon.
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Create the unbuilt layer.
    pub fn init<B: Backend>(&self) -> BatchNorm<B> {
        BatchNorm {
            config: self.clone(),
            params: None,
        }
    }
}

#[derive(Debug)]
struct NormParams<B: Backend> {
    gamma: Option<Tensor<B, 1>>,
    beta: Option<Tensor<B, 1>>,
    moving_mean: Tensor<B, 1>,
    moving_variance: Tensor<B, 1>,
}

/// Normalizes the last axis with stored moving statistics.
///
/// Weights follow the order `gamma`, `beta`, `moving_mean`,
/// `moving_variance`, skipping `gamma`/`beta` when disabled.
#[derive(Debug)]
pub struct BatchNorm<B: Backend> {
    config: BatchNormConfig,
    params: Option<NormParams<B>>,
}

impl<B: Backend> BatchNorm<B> {
    fn channels(&self) -> Option<usize> {
        self.params.as_ref().map(|p| p.moving_mean.dims()[0])
    }

    fn check_input(&self, input: FeatureShape) -> Result<()> {
        match self.channels() {
            Some(expected) if expected != input.channels() => Err(ModelError::incompatible(
                &self.config.name,
                input,
                format!("built for {} channels", expected),
            )),
            _ => Ok(()),
        }
    }

    /// Per-channel `(factor, shift)` so that `y = x * factor + shift`.
    fn affine(&self, params: &NormParams<B>) -> (Tensor<B, 1>, Tensor<B, 1>) {
        let inv_std = params
            .moving_variance
            .clone()
            .add_scalar(self.config.epsilon)
            .sqrt()
            .recip();
        let factor = match &params.gamma {
            Some(gamma) => gamma.clone() * inv_std,
            None => inv_std,
        };
        let shift = params.moving_mean.clone().neg() * factor.clone();
        let shift = match &params.beta {
            Some(beta) => shift + beta.clone(),
            None => shift,
        };
        (factor, shift)
    }
}

impl<B: Backend> Layer<B> for BatchNorm<B> {
    fn class_name(&self) -> &'static str {
        "BatchNormalization"
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> Result<Value> {
        to_config(&self.config)
    }

    fn build(&mut self, input: FeatureShape, device: &B::Device) -> Result<FeatureShape> {
        let channels = input.channels();
        self.params = Some(NormParams {
            gamma: self.config.scale.then(|| Tensor::ones([channels], device)),
            beta: self.config.center.then(|| Tensor::zeros([channels], device)),
            moving_mean: Tensor::zeros([channels], device),
            moving_variance: Tensor::ones([channels], device),
        });
        Ok(input)
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        self.check_input(input)?;
        Ok(input)
    }

    fn forward(&self, x: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| ModelError::NotBuilt(self.config.name.clone()))?;
        self.check_input(x.shape())?;

        let (factor, shift) = self.affine(params);
        let channels = factor.dims()[0];
        Ok(match x {
            FeatureTensor::Map(t) => FeatureTensor::Map(
                t * factor.reshape([1, 1, 1, channels]) + shift.reshape([1, 1, 1, channels]),
            ),
            FeatureTensor::Vector(t) => FeatureTensor::Vector(
                t * factor.reshape([1, channels]) + shift.reshape([1, channels]),
            ),
        })
    }

    fn weights(&self) -> Vec<Weight<B>> {
        let Some(params) = &self.params else {
            return Vec::new();
        };
        params
            .gamma
            .iter()
            .chain(params.beta.iter())
            .chain([&params.moving_mean, &params.moving_variance])
            .map(|t| Weight::from_tensor(t.clone()))
            .collect()
    }

    fn weight_count(&self) -> usize {
        2 + usize::from(self.config.scale) + usize::from(self.config.center)
    }

    fn set_weights(&mut self, weights: Vec<Weight<B>>) -> Result<()> {
        let name = self.config.name.clone();
        let channels = self.channels().ok_or_else(|| ModelError::NotBuilt(name.clone()))?;
        if weights.len() != self.weight_count() {
            return Err(ModelError::weight_mismatch(
                &name,
                format!("expected {} arrays, got {}", self.weight_count(), weights.len()),
            ));
        }

        let mut weights = weights.into_iter();
        let mut next = || -> Result<Tensor<B, 1>> {
            weights
                .next()
                .ok_or_else(|| ModelError::weight_mismatch(&name, "missing array"))?
                .into_tensor(&name, [channels])
        };
        let gamma = if self.config.scale { Some(next()?) } else { None };
        let beta = if self.config.center { Some(next()?) } else { None };
        let moving_mean = next()?;
        let moving_variance = next()?;

        self.params = Some(NormParams {
            gamma,
            beta,
            moving_mean,
            moving_variance,
        });
        Ok(())
    }
}
