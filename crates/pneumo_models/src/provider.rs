//! Process-wide access to loaded classifiers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use burn::prelude::*;
use parking_lot::Mutex;
use pneumo_core::backend::{ExplainBackend, NdArrayDevice};
use tracing::{debug, info};

use crate::checkpoint::{load_model, Result};
use crate::graph::LayerGraph;
use crate::registry::{default_registry, LayerRegistry};

/// Model location used when none is given, relative to the executable.
pub const DEFAULT_MODEL_RELATIVE_PATH: &str = "model/best_cnn.json";

/// Default model path: `model/best_cnn.json` next to the running executable,
/// or relative to the working directory if the executable path is unknown.
pub fn default_model_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_MODEL_RELATIVE_PATH)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_RELATIVE_PATH))
}

/// Loads classifiers once per path and hands out shared handles.
///
/// Loading happens while the cache lock is held, so concurrent first calls
/// for the same path perform a single load and all receive the same
/// instance. Cached graphs are never mutated.
///
/// # Example
///
/// ```rust,ignore
/// use pneumo_models::ModelProvider;
///
/// let provider = ModelProvider::global();
/// let model = provider.load(None)?; // model/best_cnn.json beside the binary
/// let again = provider.load(None)?;
/// assert!(Arc::ptr_eq(&model, &again));
/// ```
pub struct ModelProvider<B: Backend> {
    registry: LayerRegistry<B>,
    device: B::Device,
    cache: Mutex<HashMap<PathBuf, Arc<LayerGraph<B>>>>,
}

impl<B: Backend> ModelProvider<B> {
    /// Create a provider with the built-in layer registry.
    pub fn new(device: B::Device) -> Self {
        Self::with_registry(default_registry(), device)
    }

    /// Create a provider with a custom registry.
    pub fn with_registry(registry: LayerRegistry<B>, device: B::Device) -> Self {
        Self {
            registry,
            device,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Get the classifier stored at `path`, or at [`default_model_path`].
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no file and `Load` if it cannot be
    /// rebuilt. Failures are not cached; a later call retries.
    pub fn load(&self, path: Option<&Path>) -> Result<Arc<LayerGraph<B>>> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_model_path);
        let key = path.canonicalize().unwrap_or_else(|_| path.clone());

        let mut cache = self.cache.lock();
        if let Some(model) = cache.get(&key) {
            debug!(path = %key.display(), "Using cached model");
            return Ok(Arc::clone(model));
        }

        info!(path = %path.display(), "Loading model");
        let model = Arc::new(load_model(&path, &self.registry, &self.device)?);
        info!(
            name = model.name(),
            params = model.param_count(),
            "Model loaded"
        );
        cache.insert(key, Arc::clone(&model));
        Ok(model)
    }

    /// Whether a model for `path` is already cached.
    pub fn is_cached(&self, path: &Path) -> bool {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.cache.lock().contains_key(&key)
    }

    /// Number of cached models.
    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }

    /// The layer registry used for loading and cloning.
    pub fn registry(&self) -> &LayerRegistry<B> {
        &self.registry
    }

    /// The device models are loaded onto.
    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

impl<B: Backend> std::fmt::Debug for ModelProvider<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelProvider")
            .field("device", &self.device)
            .field("cached", &self.cached_count())
            .finish()
    }
}

impl ModelProvider<ExplainBackend> {
    /// The shared provider for the CPU explanation backend.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<ModelProvider<ExplainBackend>> = OnceLock::new();
        GLOBAL.get_or_init(|| Self::new(NdArrayDevice::Cpu))
    }
}
