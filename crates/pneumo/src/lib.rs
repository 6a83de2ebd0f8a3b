//! # pneumo
//!
//! Grad-CAM explanations for a binary chest X-ray classifier.
//!
//! pneumo loads a trained classifier described as a layer graph and answers
//! two questions about an image:
//!
//! - **What does the model predict?** [`predict`] returns `PNEUMONIA` or
//!   `NORMAL` with the sigmoid probability.
//! - **Where is it looking?** [`generate_gradcam`] writes a heatmap overlay
//!   highlighting the regions of a convolution layer that drove the score.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pneumo::prelude::*;
//!
//! let config = PipelineConfig::default().with_model_path("model/best_cnn.json");
//!
//! let result = predict("scan.png", &config)?;
//! println!("{} ({:.3})", result.prediction, result.probability);
//!
//! let overlay = generate_gradcam("scan.png", None, &config)?;
//! // scan_gradcam.png
//! ```
//!
//! ## Crates
//!
//! - [`core`]: shapes, tensors, seeds, backend aliases
//! - [`models`]: layers, graphs, registry, model files, model cache
//! - [`explain`]: graph surgery and activation maps
//! - [`vision`]: preprocessing, colormap, overlays

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod pipeline;
mod report;

pub use pneumo_core as core;
pub use pneumo_explain as explain;
pub use pneumo_models as models;
pub use pneumo_vision as vision;

pub use config::{
    PipelineConfig, DEFAULT_INNER_SUBNETWORK, DEFAULT_TARGET_LAYER, DEFAULT_THRESHOLD,
};
pub use error::{PipelineError, Result};
pub use pipeline::{
    derive_output_path, generate_gradcam, generate_gradcam_with, load_model_with, predict,
    predict_with, Prediction, NEGATIVE_LABEL, OUTPUT_SUFFIX, POSITIVE_LABEL,
};
pub use report::{GradcamOutput, InitModelOutput, InspectOutput, Report};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use pneumo::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        generate_gradcam, generate_gradcam_with, predict, predict_with, PipelineConfig,
        PipelineError, Prediction, Report,
    };

    pub use pneumo_core::backend::ExplainBackend;
    pub use pneumo_core::{FeatureShape, InputTensor, Seed};
    pub use pneumo_explain::{
        build_dual_output_graph, clone_with_unique_names, compute_activation_map, ActivationMap,
    };
    pub use pneumo_models::{
        default_registry, load_model, save_model, LayerGraph, ModelProvider, PneumoniaCnnConfig,
    };
    pub use pneumo_vision::{load_and_preprocess, render_overlay};
}
