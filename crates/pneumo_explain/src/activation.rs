//! Dual-output replay of a nested sub-network.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use pneumo_core::{CoreError, FeatureShape, FeatureTensor};
use pneumo_models::{Layer, LayerGraph};
use tracing::debug;

use crate::error::{ExplainError, Result};
use crate::surgery::ClonedClassifier;

/// Outputs of one replayed forward pass.
#[derive(Debug, Clone)]
pub struct DualOutput<B: Backend> {
    /// Target layer activations, `(1, H, W, C)`.
    pub conv: Tensor<B, 4>,
    /// Final output of the sub-network, `(1, F)`.
    pub prediction: Tensor<B, 2>,
}

impl<B: Backend> DualOutput<B> {
    /// Score of interest: batch 0, column 0.
    pub fn score(&self) -> f32 {
        self.prediction
            .clone()
            .slice([0..1, 0..1])
            .into_scalar()
            .elem::<f32>()
    }
}

/// The layers of one sub-network, replayed in order, with a tap on the
/// target layer.
///
/// Borrows the layers of a [`ClonedClassifier`]; no weights are copied.
#[derive(Debug)]
pub struct DualOutputGraph<'a, B: Backend> {
    subnetwork: String,
    layers: Vec<&'a dyn Layer<B>>,
    target_index: usize,
    input_shape: FeatureShape,
    conv_shape: FeatureShape,
    prediction_shape: FeatureShape,
}

/// Find a layer anywhere in `graph`, depth-first.
fn find_layer<'a, B: Backend>(
    graph: &'a LayerGraph<B>,
    name: &str,
) -> Option<&'a dyn Layer<B>> {
    graph.layers().iter().find_map(|layer| {
        if layer.name() == name {
            Some(layer.as_ref())
        } else {
            layer.sublayers().and_then(|sub| find_layer(sub, name))
        }
    })
}

/// Replay the layers of sub-network `inner` of `clone` against a fresh
/// input of `input_shape`, tapping `target`.
///
/// Names are looked up as they appear in the clone (already suffixed). The
/// replay is symbolic: every layer's output shape is derived in order, and
/// the target is only declared missing once all layers have been replayed.
///
/// # Errors
///
/// - [`ExplainError::SubnetworkNotFound`] / [`ExplainError::NotASubnetwork`]
/// - [`ExplainError::TargetLayerNotFound`] listing the replayed names
/// - [`ExplainError::TargetNotSpatial`] if the target yields a flat tensor
/// - a model error if a layer cannot accept its replayed input
pub fn build_dual_output_graph<'a, B: Backend>(
    clone: &'a ClonedClassifier<B>,
    inner: &str,
    target: &str,
    input_shape: FeatureShape,
) -> Result<DualOutputGraph<'a, B>> {
    let subnetwork = find_layer(clone.graph(), inner)
        .ok_or_else(|| ExplainError::SubnetworkNotFound(inner.to_string()))?;
    let sublayers = subnetwork
        .sublayers()
        .ok_or_else(|| ExplainError::NotASubnetwork(inner.to_string()))?;

    let mut layers = Vec::with_capacity(sublayers.layers().len());
    let mut tap = None;
    let mut shape = input_shape;
    for (index, layer) in sublayers.layers().iter().enumerate() {
        shape = layer.output_shape(shape)?;
        if layer.name() == target {
            tap = Some((index, shape));
        }
        layers.push(layer.as_ref());
    }

    let Some((target_index, conv_shape)) = tap else {
        return Err(ExplainError::TargetLayerNotFound {
            target: target.to_string(),
            replayed: layers.iter().map(|l| l.name().to_string()).collect(),
        });
    };
    if !conv_shape.is_map() {
        return Err(ExplainError::TargetNotSpatial {
            layer: target.to_string(),
            shape: conv_shape.to_string(),
        });
    }
    if shape.is_map() {
        return Err(ExplainError::UnsupportedOutput {
            subnetwork: inner.to_string(),
            shape: shape.to_string(),
        });
    }

    debug!(
        subnetwork = inner,
        target_layer = target,
        layers = layers.len(),
        conv = %conv_shape,
        prediction = %shape,
        "Built dual-output graph"
    );
    Ok(DualOutputGraph {
        subnetwork: inner.to_string(),
        layers,
        target_index,
        input_shape,
        conv_shape,
        prediction_shape: shape,
    })
}

impl<'a, B: Backend> DualOutputGraph<'a, B> {
    /// Name of the replayed sub-network.
    pub fn subnetwork(&self) -> &str {
        &self.subnetwork
    }

    /// Names of the replayed layers in order.
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// Name of the tapped layer.
    pub fn target(&self) -> &str {
        self.layers[self.target_index].name()
    }

    /// Per-sample input shape.
    pub fn input_shape(&self) -> FeatureShape {
        self.input_shape
    }

    /// Per-sample shape of the tapped activations.
    pub fn conv_shape(&self) -> FeatureShape {
        self.conv_shape
    }

    /// Per-sample shape of the prediction.
    pub fn prediction_shape(&self) -> FeatureShape {
        self.prediction_shape
    }

    /// Plain forward pass returning both outputs.
    pub fn forward(&self, x: Tensor<B, 4>) -> Result<DualOutput<B>> {
        self.replay(x, |conv| conv)
    }

    fn replay(
        &self,
        x: Tensor<B, 4>,
        mark: impl FnOnce(Tensor<B, 4>) -> Tensor<B, 4>,
    ) -> Result<DualOutput<B>> {
        let input = FeatureTensor::Map(x);
        if input.shape() != self.input_shape {
            return Err(CoreError::InvalidShape {
                expected: self.input_shape.to_string(),
                got: input.shape().to_string(),
            }
            .into());
        }

        let mut mark = Some(mark);
        let mut conv = None;
        let mut x = input;
        for (index, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x)?;
            if index == self.target_index {
                let tapped = x.into_map()?;
                let tapped = match mark.take() {
                    Some(mark) => mark(tapped),
                    None => tapped,
                };
                conv = Some(tapped.clone());
                x = FeatureTensor::Map(tapped);
            }
        }

        let conv = conv.ok_or_else(|| ExplainError::TargetLayerNotFound {
            target: self.target().to_string(),
            replayed: self.layer_names().iter().map(|s| s.to_string()).collect(),
        })?;
        Ok(DualOutput {
            conv,
            prediction: x.into_vector()?,
        })
    }
}

impl<'a, B: AutodiffBackend> DualOutputGraph<'a, B> {
    /// Forward pass that records operations from the target layer onward.
    ///
    /// The tapped activations become a gradient leaf, so a backward pass from
    /// the prediction yields `d prediction / d conv` directly.
    pub fn forward_recorded(&self, x: Tensor<B, 4>) -> Result<DualOutput<B>> {
        self.replay(x, |conv| conv.detach().require_grad())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surgery::clone_with_unique_names;
    use burn_ndarray::NdArray;
    use pneumo_core::Seed;
    use pneumo_models::{default_registry, PneumoniaCnnConfig};

    type TestBackend = NdArray;

    fn cloned() -> (LayerGraph<TestBackend>, ClonedClassifier<TestBackend>) {
        let device = Default::default();
        let source = PneumoniaCnnConfig::new(32)
            .with_filters([2, 3, 4])
            .with_dense_units(4)
            .init(Seed::new(21), &device)
            .unwrap();
        let clone = clone_with_unique_names(&source, "gc", &default_registry(), &device).unwrap();
        (source, clone)
    }

    #[test]
    fn test_dual_graph_with_present_target() {
        let (_, clone) = cloned();
        let dual = build_dual_output_graph(
            &clone,
            "sequential_gc",
            "conv2d_2_gc",
            FeatureShape::map(32, 32, 3),
        )
        .unwrap();

        assert_eq!(dual.target(), "conv2d_2_gc");
        assert_eq!(dual.layer_names().len(), 10);
        assert_eq!(dual.conv_shape(), FeatureShape::map(4, 4, 4));
        assert_eq!(dual.prediction_shape(), FeatureShape::vector(1));
    }

    #[test]
    fn test_prediction_matches_classifier() {
        let (source, clone) = cloned();
        let dual = build_dual_output_graph(
            &clone,
            "sequential_gc",
            "conv2d_2_gc",
            FeatureShape::map(32, 32, 3),
        )
        .unwrap();

        let x = Tensor::<TestBackend, 4>::random(
            [1, 32, 32, 3],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &Default::default(),
        );
        let out = dual.forward(x.clone()).unwrap();
        assert_eq!(out.conv.dims(), [1, 4, 4, 4]);
        let expected = source.score(x).unwrap();
        assert!((out.score() - expected).abs() < 1e-5);
    }

    #[test]
    fn test_absent_target_lists_replayed_layers() {
        let (_, clone) = cloned();
        let err = build_dual_output_graph(
            &clone,
            "sequential_gc",
            "conv2d_9_gc",
            FeatureShape::map(32, 32, 3),
        )
        .unwrap_err();

        match err {
            ExplainError::TargetLayerNotFound { target, replayed } => {
                assert_eq!(target, "conv2d_9_gc");
                assert_eq!(replayed.len(), 10);
                assert_eq!(replayed[0], "conv2d_gc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unsuffixed_target_is_not_found() {
        let (_, clone) = cloned();
        let result = build_dual_output_graph(
            &clone,
            "sequential_gc",
            "conv2d_2",
            FeatureShape::map(32, 32, 3),
        );
        assert!(matches!(result, Err(ExplainError::TargetLayerNotFound { .. })));
    }

    #[test]
    fn test_subnetwork_errors() {
        let (_, clone) = cloned();
        let shape = FeatureShape::map(32, 32, 3);
        assert!(matches!(
            build_dual_output_graph(&clone, "missing", "conv2d_gc", shape),
            Err(ExplainError::SubnetworkNotFound(_))
        ));
        assert!(matches!(
            build_dual_output_graph(&clone, "conv2d_gc", "conv2d_gc", shape),
            Err(ExplainError::NotASubnetwork(_))
        ));
    }

    #[test]
    fn test_flat_target_rejected() {
        let (_, clone) = cloned();
        let result = build_dual_output_graph(
            &clone,
            "sequential_gc",
            "dense_gc",
            FeatureShape::map(32, 32, 3),
        );
        assert!(matches!(result, Err(ExplainError::TargetNotSpatial { .. })));
    }

    #[test]
    fn test_wrong_input_shape_rejected() {
        let (_, clone) = cloned();
        let dual = build_dual_output_graph(
            &clone,
            "sequential_gc",
            "conv2d_2_gc",
            FeatureShape::map(32, 32, 3),
        )
        .unwrap();
        let x = Tensor::<TestBackend, 4>::zeros([1, 16, 16, 3], &Default::default());
        assert!(dual.forward(x).is_err());
    }
}
