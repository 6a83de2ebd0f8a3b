//! Structural copies of a classifier under fresh layer names.
//!
//! A classifier that wraps its feature extractor in a nested sub-network
//! repeats layer names between the outer and inner graph. Copying the whole
//! structure with a suffix appended to every name gives a graph whose layers
//! can be addressed unambiguously before any of them is replayed.

use burn::prelude::*;
use pneumo_core::InputTensor;
use pneumo_models::{LayerGraph, LayerRegistry, LayerSpec, ModelError, Weight};
use tracing::{debug, info};

use crate::error::{ExplainError, Result};

/// Suffix appended to cloned layer names unless configured otherwise.
pub const DEFAULT_CLONE_SUFFIX: &str = "gc";

/// A classifier copy whose every layer name ends in `_<suffix>`.
///
/// Weights are copied, never shared, so the copy can be consumed or dropped
/// without touching the cached original.
#[derive(Debug)]
pub struct ClonedClassifier<B: Backend> {
    graph: LayerGraph<B>,
    suffix: String,
}

impl<B: Backend> ClonedClassifier<B> {
    /// The cloned graph.
    pub fn graph(&self) -> &LayerGraph<B> {
        &self.graph
    }

    /// Consume the clone, returning its graph.
    pub fn into_graph(self) -> LayerGraph<B> {
        self.graph
    }

    /// The suffix appended to every name.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Name a layer of the source graph has inside the clone.
    ///
    /// ```rust,ignore
    /// assert_eq!(clone.qualified_name("conv2d_2"), "conv2d_2_gc");
    /// ```
    pub fn qualified_name(&self, original: &str) -> String {
        suffixed(original, &self.suffix)
    }

    /// Run one forward pass on `input` and return the classifier score.
    ///
    /// This materializes every layer output once, so a graph that cannot
    /// actually execute on `input` fails here rather than mid-explanation.
    pub fn force_build(&self, input: &InputTensor<B>) -> Result<f32> {
        let score = self.graph.score(input.inner().clone())?;
        debug!(graph = self.graph.name(), score, "Forced clone build");
        Ok(score)
    }
}

fn suffixed(name: &str, suffix: &str) -> String {
    format!("{}_{}", name, suffix)
}

fn structural_error(err: ModelError) -> ExplainError {
    match err {
        ModelError::UnknownLayer(class) => ExplainError::StructuralClone {
            layer: class,
            reason: "no constructor registered for this layer class".to_string(),
        },
        ModelError::InvalidConfig { layer, reason } => {
            ExplainError::StructuralClone { layer, reason }
        }
        other => ExplainError::Model(other),
    }
}

/// Copy `source` layer by layer, renaming every node to `<name>_<suffix>`.
///
/// Each layer, including those nested inside sub-networks, is recreated
/// through `registry` from its configuration. The copy is then built for the
/// source's input shape and receives a deep copy of the source weights in
/// structural order.
///
/// # Errors
///
/// Returns [`ExplainError::StructuralClone`] if a layer class is missing from
/// the registry, its configuration is rejected, or the source is unbuilt.
pub fn clone_with_unique_names<B: Backend>(
    source: &LayerGraph<B>,
    suffix: &str,
    registry: &LayerRegistry<B>,
    device: &B::Device,
) -> Result<ClonedClassifier<B>> {
    let input_shape = source.input_shape().ok_or_else(|| ExplainError::StructuralClone {
        layer: source.name().to_string(),
        reason: "source graph has not been built".to_string(),
    })?;

    let rename = |name: &str| suffixed(name, suffix);
    let specs: Vec<LayerSpec> = source
        .specs()
        .and_then(|specs| specs.iter().map(|spec| spec.renamed(&rename)).collect())
        .map_err(structural_error)?;

    let mut graph = LayerGraph::from_specs(rename(source.name()), &specs, registry)
        .map_err(structural_error)?;

    graph.build(input_shape, device)?;
    let weights: Vec<Weight<B>> = source.weights().iter().map(Weight::deep_copy).collect();
    graph.set_weights(weights)?;

    info!(
        source = source.name(),
        clone = graph.name(),
        params = graph.param_count(),
        "Cloned classifier"
    );
    Ok(ClonedClassifier {
        graph,
        suffix: suffix.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use pneumo_core::{FeatureShape, Seed};
    use pneumo_models::{default_registry, FlattenConfig, Layer, PneumoniaCnnConfig};

    type TestBackend = NdArray;

    fn classifier() -> LayerGraph<TestBackend> {
        PneumoniaCnnConfig::new(32)
            .with_filters([2, 3, 4])
            .with_dense_units(4)
            .init(Seed::new(11), &Default::default())
            .unwrap()
    }

    fn all_names(graph: &LayerGraph<TestBackend>, out: &mut Vec<String>) {
        for layer in graph.layers() {
            out.push(layer.name().to_string());
            if let Some(sub) = layer.sublayers() {
                all_names(sub, out);
            }
        }
    }

    #[test]
    fn test_clone_renames_recursively() {
        let device = Default::default();
        let source = classifier();
        let registry = default_registry();
        let clone = clone_with_unique_names(&source, "gc", &registry, &device).unwrap();

        assert_eq!(clone.graph().name(), "pneumonia_cnn_gc");
        let mut names = Vec::new();
        all_names(clone.graph(), &mut names);
        assert_eq!(names.len(), 11);
        assert!(names.iter().all(|n| n.ends_with("_gc")));
        assert!(names.contains(&"conv2d_2_gc".to_string()));
        assert_eq!(clone.qualified_name("sequential"), "sequential_gc");
    }

    #[test]
    fn test_clone_matches_source_outputs() {
        let device = Default::default();
        let source = classifier();
        let registry = default_registry();
        let clone = clone_with_unique_names(&source, "gc", &registry, &device).unwrap();

        let input = InputTensor::new(Tensor::<TestBackend, 4>::random(
            [1, 32, 32, 3],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        ))
        .unwrap();
        let expected = source.score(input.inner().clone()).unwrap();
        let actual = clone.force_build(&input).unwrap();
        assert!((expected - actual).abs() < 1e-5);
    }

    #[test]
    fn test_clone_weights_are_copies() {
        let device = Default::default();
        let source = classifier();
        let registry = default_registry();
        let clone = clone_with_unique_names(&source, "x", &registry, &device).unwrap();

        let a = source.weights()[0].to_vec().unwrap();
        drop(source);
        let b = clone.graph().weights()[0].to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_registry_entry_is_structural_error() {
        let device = Default::default();
        let source = classifier();
        let mut registry = LayerRegistry::<TestBackend>::new();
        registry.register("Flatten", |_, _| {
            Ok(Box::new(FlattenConfig::new("f").init()) as Box<dyn Layer<TestBackend>>)
        });

        let err = clone_with_unique_names(&source, "gc", &registry, &device).unwrap_err();
        assert!(matches!(
            err,
            ExplainError::StructuralClone { ref layer, .. } if layer == "Sequential"
        ));
    }

    #[test]
    fn test_malformed_nested_spec_is_structural_error() {
        let spec = LayerSpec::new(
            "Sequential",
            serde_json::json!({"name": "sequential", "layers": [{"filters": 8}]}),
        );
        let err = spec
            .renamed(&|n| suffixed(n, "gc"))
            .map_err(structural_error)
            .unwrap_err();
        assert!(matches!(
            err,
            ExplainError::StructuralClone { ref layer, ref reason }
                if layer == "sequential" && reason.contains("nested layer 0")
        ));
    }

    #[test]
    fn test_unbuilt_source_rejected() {
        let device = Default::default();
        let layers: Vec<Box<dyn Layer<TestBackend>>> =
            vec![Box::new(FlattenConfig::new("flatten").init())];
        let source = LayerGraph::new("unbuilt", layers).unwrap();
        assert_eq!(source.input_shape(), None::<FeatureShape>);

        let err = clone_with_unique_names(&source, "gc", &default_registry(), &device).unwrap_err();
        assert!(matches!(err, ExplainError::StructuralClone { .. }));
    }
}
