//! Model files: layer specs and weights in a single JSON document.
//!
//! # Format
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "name": "pneumonia_cnn",
//!   "input_shape": {"kind": "map", "height": 224, "width": 224, "channels": 3},
//!   "layers": [{"class_name": "Sequential", "config": {...}}],
//!   "weights": [{"shape": [3, 3, 3, 32], "values": [...]}, ...],
//!   "metadata": {"arch": "PneumoniaCNN", "epoch": 12, ...}
//! }
//! ```
//!
//! Weights are listed in the graph's structural order, kernels in
//! channels-last layout.
//!
//! # Example
//!
//! ```rust,ignore
//! use pneumo_models::checkpoint::{save_model, load_model, CheckpointMetadata};
//!
//! let meta = CheckpointMetadata::new("PneumoniaCNN").with_epoch(12);
//! save_model(&graph, "model/best_cnn.json", Some(&meta))?;
//!
//! let registry = default_registry::<NdArray>();
//! let loaded = load_model("model/best_cnn.json", &registry, &device)?;
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use burn::prelude::*;
use pneumo_core::FeatureShape;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::graph::LayerGraph;
use crate::layer::LayerSpec;
use crate::registry::LayerRegistry;
use crate::weight::Weight;

/// Version written by [`save_model`] and accepted by [`load_model`].
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// One weight array as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRecord {
    /// Logical shape.
    pub shape: Vec<usize>,
    /// Row-major values.
    pub values: Vec<f32>,
}

/// The on-disk model document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    /// Format version.
    pub format_version: u32,
    /// Root graph name.
    pub name: String,
    /// Per-sample input shape the graph is built for.
    pub input_shape: FeatureShape,
    /// Top-level layer specs.
    pub layers: Vec<LayerSpec>,
    /// Weights in structural order.
    pub weights: Vec<WeightRecord>,
    /// Training metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CheckpointMetadata>,
}

impl ModelFile {
    /// Capture a built graph.
    ///
    /// # Errors
    ///
    /// Fails if the graph has not been built or weights cannot be read.
    pub fn from_graph<B: Backend>(
        graph: &LayerGraph<B>,
        metadata: Option<&CheckpointMetadata>,
    ) -> Result<Self> {
        let input_shape = graph.input_shape().ok_or_else(|| {
            CheckpointError::Save(format!("graph '{}' has not been built", graph.name()))
        })?;

        let weights = graph
            .weights()
            .iter()
            .map(|w| {
                Ok(WeightRecord {
                    shape: w.shape().to_vec(),
                    values: w.to_vec().map_err(|e| CheckpointError::Save(e.to_string()))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            format_version: MODEL_FORMAT_VERSION,
            name: graph.name().to_string(),
            input_shape,
            layers: graph.specs().map_err(|e| CheckpointError::Save(e.to_string()))?,
            weights,
            metadata: metadata.cloned(),
        })
    }

    /// Rebuild the graph through `registry` and load its weights.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Load`] for version, registry, shape or
    /// weight failures.
    pub fn into_graph<B: Backend>(
        self,
        registry: &LayerRegistry<B>,
        device: &B::Device,
    ) -> Result<LayerGraph<B>> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(CheckpointError::Load(format!(
                "unsupported format version {} (expected {})",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }

        let load_err = |e: crate::ModelError| CheckpointError::Load(e.to_string());
        let mut graph =
            LayerGraph::from_specs(&self.name, &self.layers, registry).map_err(load_err)?;
        graph.build(self.input_shape, device).map_err(load_err)?;

        let weights = self
            .weights
            .into_iter()
            .map(|record| Weight::from_values(record.shape, record.values, device))
            .collect::<crate::Result<Vec<_>>>()
            .map_err(load_err)?;
        graph.set_weights(weights).map_err(load_err)?;

        Ok(graph)
    }
}

/// Write a built graph to `path`, creating parent directories.
pub fn save_model<B: Backend>(
    graph: &LayerGraph<B>,
    path: impl AsRef<Path>,
    metadata: Option<&CheckpointMetadata>,
) -> Result<()> {
    let path = path.as_ref();
    let file = ModelFile::from_graph(graph, metadata)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CheckpointError::Save(e.to_string()))?;
    }
    let writer =
        BufWriter::new(File::create(path).map_err(|e| CheckpointError::Save(e.to_string()))?);
    serde_json::to_writer(writer, &file).map_err(|e| CheckpointError::Save(e.to_string()))?;

    info!(path = %path.display(), params = graph.param_count(), "Saved model");
    Ok(())
}

/// Read a model file and rebuild its graph.
///
/// # Errors
///
/// Returns [`CheckpointError::NotFound`] if `path` does not exist and
/// [`CheckpointError::Load`] for anything that goes wrong afterwards.
pub fn load_model<B: Backend>(
    path: impl AsRef<Path>,
    registry: &LayerRegistry<B>,
    device: &B::Device,
) -> Result<LayerGraph<B>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(CheckpointError::NotFound(path.to_path_buf()));
    }

    let reader =
        BufReader::new(File::open(path).map_err(|e| CheckpointError::Load(e.to_string()))?);
    let file: ModelFile =
        serde_json::from_reader(reader).map_err(|e| CheckpointError::Load(e.to_string()))?;
    debug!(
        name = %file.name,
        layers = file.layers.len(),
        weights = file.weights.len(),
        "Parsed model file"
    );

    file.into_graph(registry, device)
}

/// Model checkpoint metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Model architecture name.
    pub arch: String,
    /// Training epoch (if applicable).
    #[serde(default)]
    pub epoch: Option<usize>,
    /// Validation loss (if applicable).
    #[serde(default)]
    pub val_loss: Option<f32>,
    /// Validation accuracy (if applicable).
    #[serde(default)]
    pub val_acc: Option<f32>,
    /// Additional metadata.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl CheckpointMetadata {
    /// Create new metadata for a model.
    pub fn new(arch: impl Into<String>) -> Self {
        Self {
            arch: arch.into(),
            epoch: None,
            val_loss: None,
            val_acc: None,
            extra: HashMap::new(),
        }
    }

    /// Set the training epoch.
    #[must_use]
    pub fn with_epoch(mut self, epoch: usize) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Set the validation loss.
    #[must_use]
    pub fn with_val_loss(mut self, loss: f32) -> Self {
        self.val_loss = Some(loss);
        self
    }

    /// Set the validation accuracy.
    #[must_use]
    pub fn with_val_acc(mut self, acc: f32) -> Self {
        self.val_acc = Some(acc);
        self
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// No file at the requested path.
    #[error("Model not found at {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be turned into a graph.
    #[error("Failed to load model: {0}")]
    Load(String),

    /// Error saving checkpoint.
    #[error("Failed to save model: {0}")]
    Save(String),
}
