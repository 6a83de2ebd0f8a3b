//! A nested sub-network that behaves as a single layer.

use burn::prelude::*;
use pneumo_core::{FeatureShape, FeatureTensor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::graph::LayerGraph;
use crate::layer::{to_config, Layer, LayerSpec};
use crate::registry::LayerRegistry;
use crate::weight::Weight;

/// Configuration for [`Sequential`]: a name and the child layer specs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequentialConfig {
    /// Layer name.
    pub name: String,
    /// Child layers in execution order.
    pub layers: Vec<LayerSpec>,
}

/// A chain of layers embedded in an outer graph.
///
/// The outer graph sees one node; [`Layer::sublayers`] exposes the inner
/// layers so their intermediate outputs can be reached by name.
#[derive(Debug)]
pub struct Sequential<B: Backend> {
    graph: LayerGraph<B>,
}

impl<B: Backend> Sequential<B> {
    /// Wrap an existing graph.
    pub fn new(graph: LayerGraph<B>) -> Self {
        Self { graph }
    }

    /// Recreate the sub-network from its configuration.
    pub fn from_config(config: &SequentialConfig, registry: &LayerRegistry<B>) -> Result<Self> {
        let graph = LayerGraph::from_specs(&config.name, &config.layers, registry)?;
        Ok(Self::new(graph))
    }

    /// The wrapped graph.
    pub fn graph(&self) -> &LayerGraph<B> {
        &self.graph
    }
}

impl<B: Backend> Layer<B> for Sequential<B> {
    fn class_name(&self) -> &'static str {
        "Sequential"
    }

    fn name(&self) -> &str {
        self.graph.name()
    }

    fn config(&self) -> Result<Value> {
        to_config(&SequentialConfig {
            name: self.graph.name().to_string(),
            layers: self.graph.specs()?,
        })
    }

    fn build(&mut self, input: FeatureShape, device: &B::Device) -> Result<FeatureShape> {
        self.graph.build(input, device)
    }

    fn output_shape(&self, input: FeatureShape) -> Result<FeatureShape> {
        self.graph.infer_shape(input)
    }

    fn forward(&self, x: FeatureTensor<B>) -> Result<FeatureTensor<B>> {
        self.graph.forward(x)
    }

    fn weights(&self) -> Vec<Weight<B>> {
        self.graph.weights()
    }

    fn weight_count(&self) -> usize {
        self.graph.weight_count()
    }

    fn set_weights(&mut self, weights: Vec<Weight<B>>) -> Result<()> {
        self.graph.set_weights(weights)
    }

    fn sublayers(&self) -> Option<&LayerGraph<B>> {
        Some(&self.graph)
    }
}
