//! Ordered layer graphs.

use std::collections::HashSet;

use burn::prelude::*;
use pneumo_core::{FeatureShape, FeatureTensor};
use serde::Serialize;
use tracing::debug;

use crate::error::{ModelError, Result};
use crate::layer::{Layer, LayerSpec};
use crate::registry::LayerRegistry;
use crate::weight::Weight;

/// A named chain of layers, each feeding the next.
///
/// Layer names are unique within one graph. A graph is *built* once an input
/// shape has been fixed and every layer has allocated its weights.
///
/// # Example
///
/// ```rust,ignore
/// use pneumo_models::{default_registry, LayerGraph};
///
/// let registry = default_registry::<NdArray>();
/// let mut graph = LayerGraph::from_specs("model", &specs, &registry)?;
/// graph.build(FeatureShape::map(224, 224, 3), &device)?;
/// let probability = graph.score(image)?;
/// ```
#[derive(Debug)]
pub struct LayerGraph<B: Backend> {
    name: String,
    layers: Vec<Box<dyn Layer<B>>>,
    input_shape: Option<FeatureShape>,
    output_shape: Option<FeatureShape>,
}

impl<B: Backend> LayerGraph<B> {
    /// Assemble a graph from unbuilt layers.
    ///
    /// # Errors
    ///
    /// Fails on an empty layer list or duplicate layer names.
    pub fn new(name: impl Into<String>, layers: Vec<Box<dyn Layer<B>>>) -> Result<Self> {
        let name = name.into();
        if layers.is_empty() {
            return Err(ModelError::EmptyGraph(name));
        }

        let mut seen = HashSet::new();
        for layer in &layers {
            if !seen.insert(layer.name()) {
                return Err(ModelError::DuplicateName {
                    graph: name,
                    name: layer.name().to_string(),
                });
            }
        }

        Ok(Self {
            name,
            layers,
            input_shape: None,
            output_shape: None,
        })
    }

    /// Instantiate every spec through `registry`.
    pub fn from_specs(
        name: impl Into<String>,
        specs: &[LayerSpec],
        registry: &LayerRegistry<B>,
    ) -> Result<Self> {
        let layers = specs
            .iter()
            .map(|spec| registry.create_from_spec(spec))
            .collect::<Result<Vec<_>>>()?;
        Self::new(name, layers)
    }

    /// Graph name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Top-level layers in execution order.
    pub fn layers(&self) -> &[Box<dyn Layer<B>>] {
        &self.layers
    }

    /// Look up a top-level layer by name.
    pub fn layer(&self, name: &str) -> Option<&dyn Layer<B>> {
        self.layers
            .iter()
            .find(|layer| layer.name() == name)
            .map(|layer| layer.as_ref())
    }

    /// Top-level layer names in execution order.
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    /// Input shape, once built.
    pub fn input_shape(&self) -> Option<FeatureShape> {
        self.input_shape
    }

    /// Output shape, once built.
    pub fn output_shape(&self) -> Option<FeatureShape> {
        self.output_shape
    }

    /// Whether weights have been allocated.
    pub fn is_built(&self) -> bool {
        self.input_shape.is_some()
    }

    /// Build every layer in order for `input`.
    pub fn build(&mut self, input: FeatureShape, device: &B::Device) -> Result<FeatureShape> {
        let mut shape = input;
        for layer in &mut self.layers {
            shape = layer.build(shape, device)?;
            debug!(graph = %self.name, layer = layer.name(), output = %shape, "Built layer");
        }
        self.input_shape = Some(input);
        self.output_shape = Some(shape);
        Ok(shape)
    }

    /// Output shape for `input`, computed symbolically.
    pub fn infer_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        self.layers
            .iter()
            .try_fold(input, |shape, layer| layer.output_shape(shape))
    }

    /// Run all layers.
    pub fn forward(&self, x: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        self.layers.iter().try_fold(x, |x, layer| layer.forward(x))
    }

    /// Classifier probability of the first sample.
    ///
    /// The graph must end in a flat output; the first output unit is read.
    pub fn score(&self, input: Tensor<B, 4>) -> Result<f32> {
        let output = self.forward(FeatureTensor::Map(input))?.into_vector()?;
        let [_, features] = output.dims();
        if features == 0 {
            return Err(ModelError::incompatible(
                &self.name,
                FeatureShape::vector(0),
                "classifier produced no outputs",
            ));
        }
        Ok(output.slice([0..1, 0..1]).into_scalar().elem::<f32>())
    }

    /// Specs of the top-level layers.
    pub fn specs(&self) -> Result<Vec<LayerSpec>> {
        self.layers.iter().map(|layer| layer.spec()).collect()
    }

    /// All weights, layer by layer, in structural order.
    pub fn weights(&self) -> Vec<Weight<B>> {
        self.layers.iter().flat_map(|layer| layer.weights()).collect()
    }

    /// Number of weight arrays across all layers.
    pub fn weight_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.weight_count()).sum()
    }

    /// Total scalar parameters.
    pub fn param_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.param_count()).sum()
    }

    /// Distribute a flat weight list over the layers.
    ///
    /// # Errors
    ///
    /// Fails unless the list has exactly [`Self::weight_count`] arrays of the
    /// shapes each layer expects.
    pub fn set_weights(&mut self, weights: Vec<Weight<B>>) -> Result<()> {
        let expected = self.weight_count();
        if weights.len() != expected {
            return Err(ModelError::weight_mismatch(
                &self.name,
                format!("expected {} arrays, got {}", expected, weights.len()),
            ));
        }

        let mut weights = weights.into_iter();
        for layer in &mut self.layers {
            let chunk: Vec<_> = weights.by_ref().take(layer.weight_count()).collect();
            layer.set_weights(chunk)?;
        }
        Ok(())
    }

    /// Layer tree with output shapes and parameter counts.
    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            name: self.name.clone(),
            input_shape: self.input_shape,
            output_shape: self.output_shape,
            params: self.param_count(),
            layers: summarize(self, self.input_shape),
        }
    }
}

fn summarize<B: Backend>(graph: &LayerGraph<B>, input: Option<FeatureShape>) -> Vec<LayerSummary> {
    let mut shape = input;
    let mut out = Vec::with_capacity(graph.layers.len());
    for layer in &graph.layers {
        let layer_input = shape;
        shape = shape.and_then(|s| layer.output_shape(s).ok());
        out.push(LayerSummary {
            name: layer.name().to_string(),
            class_name: layer.class_name().to_string(),
            output_shape: shape,
            params: layer.param_count(),
            layers: layer
                .sublayers()
                .map(|sub| summarize(sub, layer_input))
                .unwrap_or_default(),
        });
    }
    out
}

/// Serializable overview of a graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSummary {
    /// Graph name.
    pub name: String,
    /// Input shape, if built.
    pub input_shape: Option<FeatureShape>,
    /// Output shape, if built.
    pub output_shape: Option<FeatureShape>,
    /// Total scalar parameters.
    pub params: usize,
    /// Top-level layers.
    pub layers: Vec<LayerSummary>,
}

/// One node of a [`GraphSummary`].
#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    /// Layer name.
    pub name: String,
    /// Registry class name.
    pub class_name: String,
    /// Output shape, when the input shape is known.
    pub output_shape: Option<FeatureShape>,
    /// Scalar parameters.
    pub params: usize,
    /// Nested layers of a sub-network.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<LayerSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::ActivationKind;
    use crate::layers::{Conv2dConfig, DenseConfig, FlattenConfig, MaxPool2dConfig, Sequential};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn small_graph() -> LayerGraph<TestBackend> {
        let inner: Vec<Box<dyn Layer<TestBackend>>> = vec![
            Box::new(
                Conv2dConfig::new("conv2d", 2, [3, 3])
                    .with_activation(ActivationKind::Relu)
                    .init::<TestBackend>(),
            ),
            Box::new(MaxPool2dConfig::new("max_pooling2d", [2, 2]).init()),
            Box::new(FlattenConfig::new("flatten").init()),
            Box::new(
                DenseConfig::new("dense", 1)
                    .with_activation(ActivationKind::Sigmoid)
                    .init::<TestBackend>(),
            ),
        ];
        let seq = Sequential::new(LayerGraph::new("sequential", inner).unwrap());
        LayerGraph::new("model", vec![Box::new(seq) as Box<dyn Layer<TestBackend>>]).unwrap()
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let layers: Vec<Box<dyn Layer<TestBackend>>> = vec![
            Box::new(FlattenConfig::new("x").init()),
            Box::new(FlattenConfig::new("x").init()),
        ];
        assert!(matches!(
            LayerGraph::new("g", layers),
            Err(ModelError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_empty_graph_rejected() {
        assert!(matches!(
            LayerGraph::<TestBackend>::new("g", Vec::new()),
            Err(ModelError::EmptyGraph(_))
        ));
    }

    #[test]
    fn test_build_and_score() {
        let device = Default::default();
        let mut graph = small_graph();
        assert!(!graph.is_built());

        let out = graph.build(FeatureShape::map(6, 6, 3), &device).unwrap();
        assert_eq!(out, FeatureShape::vector(1));
        assert!(graph.is_built());

        // All weights are zero after build, so the sigmoid sees 0.
        let score = graph
            .score(Tensor::<TestBackend, 4>::ones([1, 6, 6, 3], &device))
            .unwrap();
        assert!((score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_set_weights_checks_total() {
        let device = Default::default();
        let mut graph = small_graph();
        graph.build(FeatureShape::map(6, 6, 3), &device).unwrap();

        let weights = graph.weights();
        assert_eq!(weights.len(), 4);
        assert!(graph.set_weights(weights[..3].to_vec()).is_err());
        assert!(graph.set_weights(weights).is_ok());
    }

    #[test]
    fn test_infer_shape_matches_build() {
        let device = Default::default();
        let mut graph = small_graph();
        let inferred = graph.infer_shape(FeatureShape::map(10, 10, 3)).unwrap();
        let built = graph.build(FeatureShape::map(10, 10, 3), &device).unwrap();
        assert_eq!(inferred, built);
    }

    #[test]
    fn test_summary_nests_sublayers() {
        let device = Default::default();
        let mut graph = small_graph();
        graph.build(FeatureShape::map(6, 6, 3), &device).unwrap();

        let summary = graph.summary();
        assert_eq!(summary.layers.len(), 1);
        let seq = &summary.layers[0];
        assert_eq!(seq.class_name, "Sequential");
        assert_eq!(seq.layers.len(), 4);
        assert_eq!(seq.layers[0].output_shape, Some(FeatureShape::map(4, 4, 2)));
        // 3*3*3*2 + 2 + (2*2*2)*1 + 1
        assert_eq!(summary.params, 54 + 2 + 8 + 1);
    }

    #[test]
    fn test_lookup_by_name() {
        let graph = small_graph();
        assert!(graph.layer("sequential").is_some());
        assert!(graph.layer("conv2d").is_none());
        assert_eq!(graph.layer_names(), vec!["sequential"]);
    }
}
