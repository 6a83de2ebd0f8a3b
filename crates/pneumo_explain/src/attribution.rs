//! Gradient-weighted class activation maps.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use ndarray::Array2;
use pneumo_core::{CoreError, InputTensor};
use serde::Serialize;
use tracing::debug;

use crate::activation::{DualOutput, DualOutputGraph};
use crate::error::{ExplainError, Result};

/// Added to the maximum before normalizing, so an all-zero map stays zero.
pub const NORMALIZATION_EPSILON: f32 = 1e-8;

/// A 2-D heatmap over the target layer's spatial grid, values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationMap {
    values: Array2<f32>,
}

impl ActivationMap {
    /// Wrap an array of values.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is outside `[0, 1]` or not finite.
    pub fn new(values: Array2<f32>) -> Result<Self> {
        if let Some(bad) = values.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(CoreError::InvalidShape {
                expected: "activation values in [0, 1]".to_string(),
                got: bad.to_string(),
            }
            .into());
        }
        Ok(Self { values })
    }

    /// Build from row-major values.
    pub fn from_shape_vec(height: usize, width: usize, values: Vec<f32>) -> Result<Self> {
        let values = Array2::from_shape_vec((height, width), values).map_err(|e| {
            CoreError::InvalidShape {
                expected: format!("{} values", height * width),
                got: e.to_string(),
            }
        })?;
        Self::new(values)
    }

    /// Rows of the map.
    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    /// Columns of the map.
    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    /// The underlying array.
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Consume the map, returning its array.
    pub fn into_array(self) -> Array2<f32> {
        self.values
    }

    /// Value at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.values.get((row, col)).copied()
    }

    /// Largest value, 0 for an empty map.
    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }

    /// Whether every value is zero.
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    /// Summary statistics for logging and reports.
    pub fn stats(&self) -> ActivationStats {
        let n = self.values.len().max(1) as f32;
        ActivationStats {
            height: self.height(),
            width: self.width(),
            min: self.values.iter().copied().fold(f32::INFINITY, f32::min).min(1.0),
            max: self.max(),
            mean: self.values.sum() / n,
        }
    }
}

/// Summary of an [`ActivationMap`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActivationStats {
    /// Rows.
    pub height: usize,
    /// Columns.
    pub width: usize,
    /// Smallest value.
    pub min: f32,
    /// Largest value.
    pub max: f32,
    /// Mean value.
    pub mean: f32,
}

/// Compute the Grad-CAM heatmap from target activations and their gradients.
///
/// # Arguments
///
/// * `activations` - Target layer output `(B, H, W, C)`; batch 0 is explained
/// * `gradients` - Gradient of the score w.r.t. `activations`, same shape
///
/// # Returns
///
/// The `(H, W)` map `relu(sum_c w_c * A[0, :, :, c]) / (max + 1e-8)` where
/// `w_c` is the gradient averaged over batch and spatial axes.
pub fn grad_cam<B: Backend>(
    activations: Tensor<B, 4>,
    gradients: Tensor<B, 4>,
) -> Result<ActivationMap> {
    let [_, height, width, channels] = activations.dims();
    if gradients.dims()[1..] != activations.dims()[1..] {
        return Err(ExplainError::Differentiation(format!(
            "gradient shape {:?} does not match activations {:?}",
            gradients.dims(),
            activations.dims()
        )));
    }

    // (B, H, W, C) -> (1, 1, 1, C)
    let weights = gradients.mean_dim(0).mean_dim(1).mean_dim(2);

    let conv = activations.slice([0..1, 0..height, 0..width, 0..channels]);
    let cam = (conv * weights)
        .sum_dim(3)
        .reshape([height, width])
        .clamp_min(0.0);

    let max: f32 = cam.clone().max().into_scalar().elem();
    let cam = cam.div_scalar(max + NORMALIZATION_EPSILON);

    let values = cam
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| ExplainError::Differentiation(format!("{:?}", e)))?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ExplainError::Differentiation(
            "activation map contains non-finite values".to_string(),
        ));
    }
    // Rounding can land a hair above 1.
    let values = values.into_iter().map(|v| v.min(1.0)).collect();
    ActivationMap::from_shape_vec(height, width, values)
}

/// Run the dual-output graph once and turn its gradients into a heatmap.
///
/// The score of interest is column 0 of the first prediction row. Gradients
/// flow only from the target layer onward; the recorded graph is dropped
/// before this function returns.
///
/// # Errors
///
/// Returns [`ExplainError::Differentiation`] if no gradient reaches the
/// target layer or the map is not finite.
pub fn compute_activation_map<B: AutodiffBackend>(
    graph: &DualOutputGraph<'_, B>,
    input: &InputTensor<B>,
) -> Result<ActivationMap> {
    let DualOutput { conv, prediction } = graph.forward_recorded(input.inner().clone())?;

    let score = prediction.slice([0..1, 0..1]);
    debug!(
        target_layer = graph.target(),
        score = score.clone().into_scalar().elem::<f32>(),
        "Recorded forward pass"
    );

    let grads = score.backward();
    let conv_grad = conv.grad(&grads).ok_or_else(|| {
        ExplainError::Differentiation(format!(
            "no gradient reached target layer '{}'",
            graph.target()
        ))
    })?;

    let map = grad_cam(conv.inner(), conv_grad)?;
    let stats = map.stats();
    debug!(
        height = stats.height,
        width = stats.width,
        max = stats.max,
        mean = stats.mean,
        "Computed activation map"
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::build_dual_output_graph;
    use crate::surgery::clone_with_unique_names;
    use burn_ndarray::NdArray;
    use pneumo_core::backend::ExplainBackend;
    use pneumo_core::{FeatureShape, Seed};
    use pneumo_models::{
        default_registry, ActivationKind, Conv2dConfig, DenseConfig, GlobalAvgPool2dConfig,
        Layer, LayerGraph, PneumoniaCnnConfig, Sequential, Weight,
    };

    type TestBackend = NdArray;

    #[test]
    fn test_grad_cam_uniform_gradients() {
        let device = Default::default();
        // Two channels: channel 0 ramps 0..3, channel 1 is constant 5.
        let activations = Tensor::<TestBackend, 4>::from_floats(
            [[[[0.0, 5.0], [1.0, 5.0]], [[2.0, 5.0], [3.0, 5.0]]]],
            &device,
        );
        // Positive weight on channel 0, zero on channel 1.
        let gradients = Tensor::<TestBackend, 4>::from_floats(
            [[[[1.0, 0.0], [1.0, 0.0]], [[1.0, 0.0], [1.0, 0.0]]]],
            &device,
        );

        let map = grad_cam(activations, gradients).unwrap();
        assert_eq!((map.height(), map.width()), (2, 2));
        let v = map.values();
        assert!(v[[0, 0]].abs() < 1e-6);
        assert!((v[[0, 1]] - 1.0 / 3.0).abs() < 1e-5);
        assert!((v[[1, 1]] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_grad_cam_clips_negative_evidence() {
        let device = Default::default();
        let activations = Tensor::<TestBackend, 4>::ones([1, 3, 3, 1], &device);
        let gradients = Tensor::<TestBackend, 4>::ones([1, 3, 3, 1], &device).neg();

        let map = grad_cam(activations, gradients).unwrap();
        assert!(map.is_zero());
        assert_eq!(map.max(), 0.0);
    }

    #[test]
    fn test_grad_cam_rejects_mismatched_gradients() {
        let device = Default::default();
        let activations = Tensor::<TestBackend, 4>::ones([1, 3, 3, 2], &device);
        let gradients = Tensor::<TestBackend, 4>::ones([1, 3, 3, 1], &device);
        assert!(matches!(
            grad_cam(activations, gradients),
            Err(ExplainError::Differentiation(_))
        ));
    }

    #[test]
    fn test_activation_map_validation() {
        assert!(ActivationMap::from_shape_vec(1, 2, vec![0.0, 1.5]).is_err());
        assert!(ActivationMap::from_shape_vec(2, 2, vec![0.0; 3]).is_err());
        let map = ActivationMap::from_shape_vec(1, 2, vec![0.25, 0.75]).unwrap();
        let stats = map.stats();
        assert_eq!(stats.min, 0.25);
        assert_eq!(stats.max, 0.75);
        assert!((stats.mean - 0.5).abs() < 1e-6);
    }

    /// conv (1x1, picks channel 0) -> global average pool -> dense(1, weight 1)
    ///
    /// The score is the mean of channel 0, so every gradient is `1 / (H*W)`
    /// and the map is channel 0 divided by its maximum.
    fn linear_scorer() -> LayerGraph<ExplainBackend> {
        let device = Default::default();
        let inner: Vec<Box<dyn Layer<ExplainBackend>>> = vec![
            Box::new(Conv2dConfig::new("conv", 1, [1, 1]).init::<ExplainBackend>()),
            Box::new(GlobalAvgPool2dConfig::new("gap").init()),
            Box::new(
                DenseConfig::new("out", 1)
                    .with_activation(ActivationKind::Linear)
                    .init::<ExplainBackend>(),
            ),
        ];
        let seq = Sequential::new(LayerGraph::new("inner", inner).unwrap());
        let mut graph =
            LayerGraph::new("scorer", vec![Box::new(seq) as Box<dyn Layer<ExplainBackend>>])
                .unwrap();
        graph.build(FeatureShape::map(2, 2, 3), &device).unwrap();

        let w = |shape: Vec<usize>, values: Vec<f32>| {
            Weight::from_values(shape, values, &device).unwrap()
        };
        graph
            .set_weights(vec![
                w(vec![1, 1, 3, 1], vec![1.0, 0.0, 0.0]),
                w(vec![1], vec![0.0]),
                w(vec![1, 1], vec![1.0]),
                w(vec![1], vec![0.0]),
            ])
            .unwrap();
        graph
    }

    #[test]
    fn test_compute_activation_map_on_linear_scorer() {
        let device = Default::default();
        let source = linear_scorer();
        let clone = clone_with_unique_names(&source, "gc", &default_registry(), &device).unwrap();
        let dual =
            build_dual_output_graph(&clone, "inner_gc", "conv_gc", FeatureShape::map(2, 2, 3))
                .unwrap();

        // Red channel 0.2, 0.4, 0.6, 0.8; green/blue ignored by the scorer.
        let rgb = [51u8, 9, 9, 102, 9, 9, 153, 9, 9, 204, 9, 9];
        let input = InputTensor::<ExplainBackend>::from_rgb_bytes(&rgb, 2, 2, &device).unwrap();

        let map = compute_activation_map(&dual, &input).unwrap();
        let v = map.values();
        assert!((v[[0, 0]] - 0.25).abs() < 1e-5);
        assert!((v[[0, 1]] - 0.5).abs() < 1e-5);
        assert!((v[[1, 0]] - 0.75).abs() < 1e-5);
        assert!((v[[1, 1]] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_compute_activation_map_properties() {
        let device = Default::default();
        let source = PneumoniaCnnConfig::new(32)
            .with_filters([2, 3, 4])
            .with_dense_units(4)
            .init::<ExplainBackend>(Seed::new(4), &device)
            .unwrap();
        let clone = clone_with_unique_names(&source, "gc", &default_registry(), &device).unwrap();
        let dual = build_dual_output_graph(
            &clone,
            "sequential_gc",
            "conv2d_2_gc",
            FeatureShape::map(32, 32, 3),
        )
        .unwrap();

        let input = InputTensor::new(Tensor::<ExplainBackend, 4>::random(
            [1, 32, 32, 3],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        ))
        .unwrap();
        let map = compute_activation_map(&dual, &input).unwrap();

        assert_eq!((map.height(), map.width()), (4, 4));
        assert!(map.values().iter().all(|v| (0.0..=1.0).contains(v)));
        if !map.is_zero() {
            assert!((map.max() - 1.0).abs() < 1e-3);
        }
    }
}
