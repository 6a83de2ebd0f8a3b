//! Spatial pooling layers.

use burn::prelude::*;
use burn::tensor::module::max_pool2d;
use pneumo_core::{FeatureShape, FeatureTensor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::layer::{spatial, to_config, Layer, Padding};

fn default_pool_size() -> [usize; 2] {
    [2, 2]
}

/// Configuration for [`MaxPool2d`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxPool2dConfig {
    /// Layer name.
    pub name: String,
    /// Window `(height, width)`.
    #[serde(default = "default_pool_size")]
    pub pool_size: [usize; 2],
    /// Stride; defaults to the window size.
    #[serde(default)]
    pub strides: Option<[usize; 2]>,
    /// Padding mode.
    #[serde(default)]
    pub padding: Padding,
}

impl MaxPool2dConfig {
    /// Create a config with non-overlapping windows.
    pub fn new(name: impl Into<String>, pool_size: [usize; 2]) -> Self {
        Self {
            name: name.into(),
            pool_size,
            strides: None,
            padding: Padding::Valid,
        }
    }

    /// Set explicit strides.
    #[must_use]
    pub fn with_strides(mut self, strides: [usize; 2]) -> Self {
        self.strides = Some(strides);
        self
    }

    /// Set the padding mode.
    #[must_use]
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Create the layer.
    pub fn init(&self) -> MaxPool2d {
        MaxPool2d {
            config: self.clone(),
        }
    }
}

/// Max pooling over channels-last maps.
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    config: MaxPool2dConfig,
}

impl MaxPool2d {
    fn strides(&self) -> [usize; 2] {
        self.config.strides.unwrap_or(self.config.pool_size)
    }

    fn geometry(&self, input: FeatureShape) -> Result<(FeatureShape, [usize; 2])> {
        let (height, width, channels) = spatial(&self.config.name, input)?;
        let [ph, pw] = self.config.pool_size;
        let [sh, sw] = self.strides();
        let (out_h, pad_h) = self
            .config
            .padding
            .resolve(height, ph, sh)
            .map_err(|reason| ModelError::incompatible(&self.config.name, input, reason))?;
        let (out_w, pad_w) = self
            .config
            .padding
            .resolve(width, pw, sw)
            .map_err(|reason| ModelError::incompatible(&self.config.name, input, reason))?;
        Ok((FeatureShape::map(out_h, out_w, channels), [pad_h, pad_w]))
    }
}

impl<B: Backend> Layer<B> for MaxPool2d {
    fn class_name(&self) -> &'static str {
        "MaxPooling2D"
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> Result<Value> {
        to_config(&self.config)
    }

    fn build(&mut self, input: FeatureShape, _device: &B::Device) -> Result<FeatureShape> {
        <Self as Layer<B>>::output_shape(self, input)
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        self.geometry(input).map(|(shape, _)| shape)
    }

    fn forward(&self, x: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        let (_, padding) = self.geometry(x.shape())?;
        let x = x.into_map()?.permute([0, 3, 1, 2]);
        let out = max_pool2d(x, self.config.pool_size, self.strides(), padding, [1, 1]);
        Ok(FeatureTensor::Map(out.permute([0, 2, 3, 1])))
    }
}

/// Configuration for [`GlobalAvgPool2d`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalAvgPool2dConfig {
    /// Layer name.
    pub name: String,
}

impl GlobalAvgPool2dConfig {
    /// Create a config.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Create the layer.
    pub fn init(&self) -> GlobalAvgPool2d {
        GlobalAvgPool2d {
            config: self.clone(),
        }
    }
}

/// Averages every channel over the spatial axes, producing a vector.
#[derive(Debug, Clone)]
pub struct GlobalAvgPool2d {
    config: GlobalAvgPool2dConfig,
}

impl<B: Backend> Layer<B> for GlobalAvgPool2d {
    fn class_name(&self) -> &'static str {
        "GlobalAveragePooling2D"
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> Result<Value> {
        to_config(&self.config)
    }

    fn build(&mut self, input: FeatureShape, _device: &B::Device) -> Result<FeatureShape> {
        <Self as Layer<B>>::output_shape(self, input)
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        let (_, _, channels) = spatial(&self.config.name, input)?;
        Ok(FeatureShape::vector(channels))
    }

    fn forward(&self, x: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        let x = x.into_map()?;
        let [batch, _, _, channels] = x.dims();
        let pooled = x.mean_dim(1).mean_dim(2).reshape([batch, channels]);
        Ok(FeatureTensor::Vector(pooled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_max_pool_floors_odd_extent() {
        let pool = MaxPool2dConfig::new("max_pooling2d", [2, 2]).init();
        let out = Layer::<TestBackend>::output_shape(&pool, FeatureShape::map(111, 111, 32));
        assert_eq!(out.unwrap(), FeatureShape::map(55, 55, 32));
    }

    #[test]
    fn test_max_pool_forward() {
        let device = Default::default();
        let pool = MaxPool2dConfig::new("p", [2, 2]).init();
        let x = Tensor::<TestBackend, 4>::from_floats(
            [[
                [[1.0, -1.0], [2.0, -2.0]],
                [[3.0, -3.0], [4.0, -4.0]],
            ]],
            &device,
        );
        let out = pool.forward(FeatureTensor::Map(x)).unwrap();
        assert_eq!(out.shape(), FeatureShape::map(1, 1, 2));
        assert_eq!(out.to_vec().unwrap(), vec![4.0, -1.0]);
    }

    #[test]
    fn test_global_average_pool() {
        let device = Default::default();
        let pool = GlobalAvgPool2dConfig::new("gap").init();
        let x = Tensor::<TestBackend, 4>::from_floats(
            [[[[1.0, 10.0], [3.0, 30.0]], [[5.0, 50.0], [7.0, 70.0]]]],
            &device,
        );
        let out = pool.forward(FeatureTensor::Map(x)).unwrap();
        assert_eq!(out.shape(), FeatureShape::vector(2));
        assert_eq!(out.to_vec().unwrap(), vec![4.0, 40.0]);
    }

    #[test]
    fn test_pool_config_defaults() {
        let config: MaxPool2dConfig =
            serde_json::from_value(serde_json::json!({"name": "p"})).unwrap();
        assert_eq!(config.pool_size, [2, 2]);
        assert_eq!(config.strides, None);
        assert_eq!(config.padding, Padding::Valid);
    }
}
