//! The reference pneumonia classifier architecture.
//!
//! A root graph holding one `Sequential` sub-network:
//!
//! ```text
//! pneumonia_cnn
//! └── sequential
//!     ├── conv2d          Conv2D(32, 3x3, relu)
//!     ├── max_pooling2d   MaxPooling2D(2x2)
//!     ├── conv2d_1        Conv2D(64, 3x3, relu)
//!     ├── max_pooling2d_1 MaxPooling2D(2x2)
//!     ├── conv2d_2        Conv2D(128, 3x3, relu)
//!     ├── max_pooling2d_2 MaxPooling2D(2x2)
//!     ├── flatten
//!     ├── dense           Dense(128, relu)
//!     ├── dropout         Dropout(0.5)
//!     └── dense_1         Dense(1, sigmoid)
//! ```

use burn::prelude::*;
use pneumo_core::{FeatureShape, Seed};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::LayerGraph;
use crate::layer::{ActivationKind, Layer};
use crate::layers::{
    Conv2d, Conv2dConfig, DenseConfig, DropoutConfig, FlattenConfig, MaxPool2dConfig, Sequential,
};
use crate::weight::Weight;

/// Architecture name recorded in model metadata.
pub const PNEUMONIA_CNN_ARCH: &str = "PneumoniaCNN";

/// Configuration for the reference classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PneumoniaCnnConfig {
    /// Square input size in pixels.
    pub image_size: usize,
    /// Filters of the three convolution blocks.
    pub filters: [usize; 3],
    /// Square kernel size of every convolution.
    pub kernel_size: usize,
    /// Units of the hidden dense layer.
    pub dense_units: usize,
    /// Dropout rate before the output layer.
    pub dropout: f64,
}

impl Default for PneumoniaCnnConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            filters: [32, 64, 128],
            kernel_size: 3,
            dense_units: 128,
            dropout: 0.5,
        }
    }
}

impl PneumoniaCnnConfig {
    /// Create a config for the given input size.
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            ..Default::default()
        }
    }

    /// Set the filters of the three convolution blocks.
    #[must_use]
    pub fn with_filters(mut self, filters: [usize; 3]) -> Self {
        self.filters = filters;
        self
    }

    /// Set the hidden dense width.
    #[must_use]
    pub fn with_dense_units(mut self, dense_units: usize) -> Self {
        self.dense_units = dense_units;
        self
    }

    /// Set the dropout rate.
    #[must_use]
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Build the graph with deterministic random weights.
    ///
    /// Kernels use He-uniform initialization; biases are small uniform
    /// values so that ReLU units are not all dead at the start.
    ///
    /// # Errors
    ///
    /// Fails if the input size is too small for three conv/pool blocks.
    pub fn init<B: Backend>(&self, seed: Seed, device: &B::Device) -> Result<LayerGraph<B>> {
        let k = [self.kernel_size, self.kernel_size];
        let [f0, f1, f2] = self.filters;
        let inner: Vec<Box<dyn Layer<B>>> = vec![
            Box::new(conv::<B>("conv2d", f0, k)),
            Box::new(MaxPool2dConfig::new("max_pooling2d", [2, 2]).init()),
            Box::new(conv::<B>("conv2d_1", f1, k)),
            Box::new(MaxPool2dConfig::new("max_pooling2d_1", [2, 2]).init()),
            Box::new(conv::<B>("conv2d_2", f2, k)),
            Box::new(MaxPool2dConfig::new("max_pooling2d_2", [2, 2]).init()),
            Box::new(FlattenConfig::new("flatten").init()),
            Box::new(
                DenseConfig::new("dense", self.dense_units)
                    .with_activation(ActivationKind::Relu)
                    .init::<B>(),
            ),
            Box::new(DropoutConfig::new("dropout", self.dropout).init()?),
            Box::new(
                DenseConfig::new("dense_1", 1)
                    .with_activation(ActivationKind::Sigmoid)
                    .init::<B>(),
            ),
        ];

        let sequential = Sequential::new(LayerGraph::new("sequential", inner)?);
        let mut graph = LayerGraph::new(
            "pneumonia_cnn",
            vec![Box::new(sequential) as Box<dyn Layer<B>>],
        )?;
        graph.build(
            FeatureShape::map(self.image_size, self.image_size, 3),
            device,
        )?;

        let weights = graph
            .weights()
            .iter()
            .enumerate()
            .map(|(i, w)| seeded_weight(w.shape(), seed.derive(&format!("weight_{i}")), device))
            .collect::<Result<Vec<_>>>()?;
        graph.set_weights(weights)?;

        Ok(graph)
    }
}

fn conv<B: Backend>(name: &str, filters: usize, kernel: [usize; 2]) -> Conv2d<B> {
    Conv2dConfig::new(name, filters, kernel)
        .with_activation(ActivationKind::Relu)
        .init()
}

fn seeded_weight<B: Backend>(
    shape: &[usize],
    seed: Seed,
    device: &B::Device,
) -> Result<Weight<B>> {
    let numel: usize = shape.iter().product();
    let limit = match shape.split_last() {
        Some((_, fan_in_dims)) if !fan_in_dims.is_empty() => {
            let fan_in: usize = fan_in_dims.iter().product();
            (6.0 / fan_in.max(1) as f32).sqrt()
        }
        _ => 0.05,
    };

    let mut rng = seed.to_rng();
    let values = (0..numel).map(|_| rng.gen_range(-limit..limit)).collect();
    Weight::from_values(shape.to_vec(), values, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_reference_layer_names() {
        let device = Default::default();
        let graph = PneumoniaCnnConfig::new(32)
            .with_filters([2, 2, 2])
            .with_dense_units(4)
            .init::<TestBackend>(Seed::new(0), &device)
            .unwrap();

        assert_eq!(graph.layer_names(), vec!["sequential"]);
        let inner = graph.layer("sequential").unwrap().sublayers().unwrap();
        assert_eq!(
            inner.layer_names(),
            vec![
                "conv2d",
                "max_pooling2d",
                "conv2d_1",
                "max_pooling2d_1",
                "conv2d_2",
                "max_pooling2d_2",
                "flatten",
                "dense",
                "dropout",
                "dense_1",
            ]
        );
    }

    #[test]
    fn test_default_shapes() {
        let device = Default::default();
        let graph = PneumoniaCnnConfig::default()
            .with_filters([2, 2, 2])
            .with_dense_units(2)
            .init::<TestBackend>(Seed::new(0), &device)
            .unwrap();
        let inner = graph.layer("sequential").unwrap().sublayers().unwrap();
        let summary = graph.summary();
        let conv2d_2 = summary.layers[0]
            .layers
            .iter()
            .find(|l| l.name == "conv2d_2")
            .unwrap();
        assert_eq!(conv2d_2.output_shape, Some(FeatureShape::map(52, 52, 2)));
        assert_eq!(inner.output_shape(), Some(FeatureShape::vector(1)));
    }

    #[test]
    fn test_same_seed_same_weights() {
        let device = Default::default();
        let config = PneumoniaCnnConfig::new(32).with_filters([2, 2, 2]).with_dense_units(4);
        let a = config.init::<TestBackend>(Seed::new(9), &device).unwrap();
        let b = config.init::<TestBackend>(Seed::new(9), &device).unwrap();
        let c = config.init::<TestBackend>(Seed::new(10), &device).unwrap();

        let first = |g: &LayerGraph<TestBackend>| g.weights()[0].to_vec().unwrap();
        assert_eq!(first(&a), first(&b));
        assert_ne!(first(&a), first(&c));
    }

    #[test]
    fn test_probability_in_unit_interval() {
        let device = Default::default();
        let graph = PneumoniaCnnConfig::new(32)
            .with_filters([2, 2, 2])
            .with_dense_units(4)
            .init::<TestBackend>(Seed::new(5), &device)
            .unwrap();
        let score = graph
            .score(Tensor::<TestBackend, 4>::ones([1, 32, 32, 3], &device))
            .unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_too_small_input_fails() {
        let device = Default::default();
        let result = PneumoniaCnnConfig::new(8).init::<TestBackend>(Seed::new(0), &device);
        assert!(result.is_err());
    }
}
