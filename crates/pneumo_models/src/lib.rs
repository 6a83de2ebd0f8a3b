//! # pneumo_models
//!
//! Dynamic layer graphs for image classifiers.
//!
//! A classifier is described as data (layer class names plus JSON
//! configuration) and rebuilt through a [`LayerRegistry`]. That makes it
//! possible to copy a model's structure under new names and to replay a
//! sub-network layer by layer, which fixed Burn modules cannot do.
//!
//! ## Layers
//! - [`Conv2d`], [`MaxPool2d`], [`GlobalAvgPool2d`] - spatial layers (channels-last)
//! - [`Dense`], [`Flatten`], [`Dropout`], [`Activation`], [`Rescaling`], [`BatchNorm`]
//! - [`Sequential`] - a nested sub-network exposed through [`Layer::sublayers`]
//!
//! ## Loading
//! - [`checkpoint`] - JSON model files with weights and metadata
//! - [`ModelProvider`] - cached, once-per-path loading shared across callers
//! - [`PneumoniaCnnConfig`] - the reference classifier with seeded weights

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod cnn;
mod error;
mod graph;
mod layer;
pub mod layers;
pub mod provider;
pub mod registry;
mod weight;

pub use checkpoint::{
    load_model, save_model, CheckpointError, CheckpointMetadata, ModelFile, WeightRecord,
    MODEL_FORMAT_VERSION,
};
pub use cnn::{PneumoniaCnnConfig, PNEUMONIA_CNN_ARCH};
pub use error::{ModelError, Result};
pub use graph::{GraphSummary, LayerGraph, LayerSummary};
pub use layer::{ActivationKind, Layer, LayerSpec, Padding};
pub use layers::*;
pub use provider::{default_model_path, ModelProvider, DEFAULT_MODEL_RELATIVE_PATH};
pub use registry::{default_registry, LayerConstructor, LayerRegistry};
pub use weight::Weight;
