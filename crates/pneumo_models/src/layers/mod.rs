//! Built-in layers.
//!
//! Class names follow the Keras vocabulary so exported model descriptions
//! map one-to-one onto registry entries.

mod basic;
mod conv;
mod dense;
mod norm;
mod pool;
mod sequential;

pub use basic::{
    Activation, ActivationConfig, Dropout, DropoutConfig, Flatten, FlattenConfig, Rescaling,
    RescalingConfig,
};
pub use conv::{Conv2d, Conv2dConfig};
pub use dense::{Dense, DenseConfig};
pub use norm::{BatchNorm, BatchNormConfig};
pub use pool::{GlobalAvgPool2d, GlobalAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
pub use sequential::{Sequential, SequentialConfig};
