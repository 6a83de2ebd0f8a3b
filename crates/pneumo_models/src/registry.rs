//! Layer registry for rebuilding graphs from their description.
//!
//! The registry maps a layer class name to a constructor that takes the
//! layer's JSON configuration. Model files store layer specs only, so every
//! class a file mentions must be registered here to be loaded.
//!
//! # Example
//!
//! ```rust,ignore
//! use pneumo_models::registry::default_registry;
//! use serde_json::json;
//!
//! let registry = default_registry::<NdArray>();
//! let config = json!({
//!     "name": "conv2d",
//!     "filters": 32,
//!     "kernel_size": [3, 3],
//!     "activation": "relu"
//! });
//! let layer = registry.create("Conv2D", &config)?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use burn::prelude::*;
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::layer::{parse_config, Layer, LayerSpec};
use crate::layers::{
    ActivationConfig, BatchNormConfig, Conv2dConfig, DenseConfig, DropoutConfig, FlattenConfig,
    GlobalAvgPool2dConfig, MaxPool2dConfig, RescalingConfig, Sequential, SequentialConfig,
};

/// Type alias for layer constructor.
///
/// The registry itself is passed along so container layers can build
/// their children.
pub type LayerConstructor<B> =
    Arc<dyn Fn(&Value, &LayerRegistry<B>) -> Result<Box<dyn Layer<B>>> + Send + Sync>;

/// Registry for creating layers by class name.
pub struct LayerRegistry<B: Backend> {
    constructors: HashMap<String, LayerConstructor<B>>,
}

impl<B: Backend> Default for LayerRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> std::fmt::Debug for LayerRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerRegistry")
            .field("classes", &self.list())
            .finish()
    }
}

impl<B: Backend> LayerRegistry<B> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register a layer constructor.
    ///
    /// # Arguments
    ///
    /// * `class_name` - The class name the layer is stored under
    /// * `constructor` - A function that creates the layer from config
    pub fn register<F>(&mut self, class_name: &str, constructor: F)
    where
        F: Fn(&Value, &LayerRegistry<B>) -> Result<Box<dyn Layer<B>>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(class_name.to_string(), Arc::new(constructor));
    }

    /// Create an unbuilt layer.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownLayer`] for unregistered classes, or the
    /// constructor's error for a bad configuration.
    pub fn create(&self, class_name: &str, config: &Value) -> Result<Box<dyn Layer<B>>> {
        let constructor = self
            .constructors
            .get(class_name)
            .ok_or_else(|| ModelError::UnknownLayer(class_name.to_string()))?;
        constructor(config, self)
    }

    /// Create an unbuilt layer from a spec.
    pub fn create_from_spec(&self, spec: &LayerSpec) -> Result<Box<dyn Layer<B>>> {
        self.create(&spec.class_name, &spec.config)
    }

    /// List all registered class names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check if a class is registered.
    pub fn contains(&self, class_name: &str) -> bool {
        self.constructors.contains_key(class_name)
    }
}

/// Create a registry with every built-in layer.
pub fn default_registry<B: Backend>() -> LayerRegistry<B> {
    let mut registry = LayerRegistry::new();

    registry.register("Conv2D", |config, _| {
        let config: Conv2dConfig = parse_config("Conv2D", config)?;
        if config.filters == 0 || config.kernel_size.contains(&0) || config.strides.contains(&0) {
            return Err(ModelError::InvalidConfig {
                layer: config.name,
                reason: "filters, kernel_size and strides must be positive".to_string(),
            });
        }
        Ok(Box::new(config.init::<B>()))
    });

    registry.register("MaxPooling2D", |config, _| {
        let config: MaxPool2dConfig = parse_config("MaxPooling2D", config)?;
        Ok(Box::new(config.init()))
    });

    registry.register("GlobalAveragePooling2D", |config, _| {
        let config: GlobalAvgPool2dConfig = parse_config("GlobalAveragePooling2D", config)?;
        Ok(Box::new(config.init()))
    });

    registry.register("Flatten", |config, _| {
        let config: FlattenConfig = parse_config("Flatten", config)?;
        Ok(Box::new(config.init()))
    });

    registry.register("Dense", |config, _| {
        let config: DenseConfig = parse_config("Dense", config)?;
        if config.units == 0 {
            return Err(ModelError::InvalidConfig {
                layer: config.name,
                reason: "units must be positive".to_string(),
            });
        }
        Ok(Box::new(config.init::<B>()))
    });

    registry.register("Dropout", |config, _| {
        let config: DropoutConfig = parse_config("Dropout", config)?;
        Ok(Box::new(config.init()?))
    });

    registry.register("Activation", |config, _| {
        let config: ActivationConfig = parse_config("Activation", config)?;
        Ok(Box::new(config.init()))
    });

    registry.register("Rescaling", |config, _| {
        let config: RescalingConfig = parse_config("Rescaling", config)?;
        Ok(Box::new(config.init()))
    });

    registry.register("BatchNormalization", |config, _| {
        let config: BatchNormConfig = parse_config("BatchNormalization", config)?;
        Ok(Box::new(config.init::<B>()))
    });

    registry.register("Sequential", |config, registry| {
        let config: SequentialConfig = parse_config("Sequential", config)?;
        Ok(Box::new(Sequential::from_config(&config, registry)?))
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use serde_json::json;

    type TestBackend = NdArray;

    #[test]
    fn test_default_registry_contents() {
        let registry = default_registry::<TestBackend>();
        for class in [
            "Conv2D",
            "MaxPooling2D",
            "GlobalAveragePooling2D",
            "Flatten",
            "Dense",
            "Dropout",
            "Activation",
            "Rescaling",
            "BatchNormalization",
            "Sequential",
        ] {
            assert!(registry.contains(class), "missing {class}");
        }
        assert_eq!(registry.list().len(), 10);
    }

    #[test]
    fn test_create_layer() {
        let registry = default_registry::<TestBackend>();
        let config = json!({"name": "conv2d", "filters": 4, "kernel_size": [3, 3]});
        let layer = registry.create("Conv2D", &config).unwrap();
        assert_eq!(layer.name(), "conv2d");
        assert_eq!(layer.class_name(), "Conv2D");
        assert_eq!(layer.config().unwrap()["padding"], "valid");
    }

    #[test]
    fn test_unknown_layer() {
        let registry = default_registry::<TestBackend>();
        let result = registry.create("LSTM", &json!({"name": "lstm"}));
        assert!(matches!(result, Err(ModelError::UnknownLayer(name)) if name == "LSTM"));
    }

    #[test]
    fn test_invalid_config() {
        let registry = default_registry::<TestBackend>();
        let missing_units = registry.create("Dense", &json!({"name": "dense"}));
        assert!(matches!(missing_units, Err(ModelError::InvalidConfig { .. })));

        let zero_units = registry.create("Dense", &json!({"name": "dense", "units": 0}));
        assert!(matches!(zero_units, Err(ModelError::InvalidConfig { .. })));
    }

    #[test]
    fn test_nested_unknown_layer_propagates() {
        let registry = default_registry::<TestBackend>();
        let config = json!({
            "name": "sequential",
            "layers": [{"class_name": "Mystery", "config": {"name": "m"}}]
        });
        assert!(matches!(
            registry.create("Sequential", &config),
            Err(ModelError::UnknownLayer(_))
        ));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = LayerRegistry::<TestBackend>::new();
        assert!(!registry.contains("Flatten"));
        registry.register("Flatten", |config, _| {
            let config: FlattenConfig = parse_config("Flatten", config)?;
            Ok(Box::new(config.init()))
        });
        assert!(registry.create("Flatten", &json!({"name": "f"})).is_ok());
    }
}
