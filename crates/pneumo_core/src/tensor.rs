//! Tensor wrappers for image classifiers.

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::{CoreError, Result};
use crate::shape::FeatureShape;

/// An activation flowing between layers of a dynamic graph.
///
/// Burn tensors carry their rank in the type, while a layer graph changes rank
/// at runtime (a `Flatten` turns a spatial map into a vector). This enum keeps
/// the two ranks a classifier needs:
/// - `Map`: `(B, H, W, C)`
/// - `Vector`: `(B, F)`
#[derive(Debug, Clone)]
pub enum FeatureTensor<B: Backend> {
    /// Spatial activation, channels-last.
    Map(Tensor<B, 4>),
    /// Flat activation.
    Vector(Tensor<B, 2>),
}

impl<B: Backend> FeatureTensor<B> {
    /// Per-sample shape (batch excluded).
    pub fn shape(&self) -> FeatureShape {
        match self {
            Self::Map(t) => {
                let [_, h, w, c] = t.dims();
                FeatureShape::map(h, w, c)
            }
            Self::Vector(t) => {
                let [_, f] = t.dims();
                FeatureShape::vector(f)
            }
        }
    }

    /// Batch size.
    pub fn batch(&self) -> usize {
        match self {
            Self::Map(t) => t.dims()[0],
            Self::Vector(t) => t.dims()[0],
        }
    }

    /// Device the tensor lives on.
    pub fn device(&self) -> B::Device {
        match self {
            Self::Map(t) => t.device(),
            Self::Vector(t) => t.device(),
        }
    }

    /// Unwrap a spatial activation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RankMismatch`] for flat activations.
    pub fn into_map(self) -> Result<Tensor<B, 4>> {
        match self {
            Self::Map(t) => Ok(t),
            other => Err(CoreError::RankMismatch {
                expected: "spatial",
                got: other.shape().to_string(),
            }),
        }
    }

    /// Unwrap a flat activation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RankMismatch`] for spatial activations.
    pub fn into_vector(self) -> Result<Tensor<B, 2>> {
        match self {
            Self::Vector(t) => Ok(t),
            other => Err(CoreError::RankMismatch {
                expected: "flat",
                got: other.shape().to_string(),
            }),
        }
    }

    /// Read all values back to the host in row-major order.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        let data = match self {
            Self::Map(t) => t.to_data(),
            Self::Vector(t) => t.to_data(),
        };
        data.to_vec::<f32>()
            .map_err(|e| CoreError::TensorData(format!("{:?}", e)))
    }
}

impl<B: Backend> From<Tensor<B, 4>> for FeatureTensor<B> {
    fn from(tensor: Tensor<B, 4>) -> Self {
        Self::Map(tensor)
    }
}

impl<B: Backend> From<Tensor<B, 2>> for FeatureTensor<B> {
    fn from(tensor: Tensor<B, 2>) -> Self {
        Self::Vector(tensor)
    }
}

/// The normalized image tensor a classifier consumes.
///
/// Always shaped `(1, H, W, 3)` with values in `[0, 1]`. Created once per
/// inference call and never retained.
///
/// # Example
///
/// ```rust,ignore
/// use pneumo_core::InputTensor;
///
/// let rgb: Vec<u8> = image.into_raw();
/// let input = InputTensor::<NdArray>::from_rgb_bytes(&rgb, 224, 224, &device)?;
/// assert_eq!(input.height(), 224);
/// ```
#[derive(Debug, Clone)]
pub struct InputTensor<B: Backend> {
    inner: Tensor<B, 4>,
}

impl<B: Backend> InputTensor<B> {
    /// Wrap an existing tensor.
    ///
    /// # Errors
    ///
    /// Returns an error unless the tensor is `(1, H, W, 3)` with non-zero `H`, `W`.
    pub fn new(tensor: Tensor<B, 4>) -> Result<Self> {
        let [batch, height, width, channels] = tensor.dims();
        if batch != 1 || channels != 3 || height == 0 || width == 0 {
            return Err(CoreError::InvalidShape {
                expected: "(1, H, W, 3)".to_string(),
                got: format!("({}, {}, {}, {})", batch, height, width, channels),
            });
        }
        Ok(Self { inner: tensor })
    }

    /// Build an input tensor from interleaved 8-bit RGB pixels.
    ///
    /// Each byte is scaled by `1/255`, so every value lands in `[0, 1]`.
    ///
    /// # Arguments
    ///
    /// * `rgb` - `height * width * 3` bytes, row-major, RGB order
    /// * `height` - Image height in pixels
    /// * `width` - Image width in pixels
    /// * `device` - Device to create the tensor on
    pub fn from_rgb_bytes(
        rgb: &[u8],
        height: usize,
        width: usize,
        device: &B::Device,
    ) -> Result<Self> {
        let expected = height * width * 3;
        if rgb.len() != expected {
            return Err(CoreError::InvalidShape {
                expected: format!("{} bytes for {}x{} RGB", expected, height, width),
                got: format!("{} bytes", rgb.len()),
            });
        }

        let values: Vec<f32> = rgb.iter().map(|&p| f32::from(p) / 255.0).collect();
        let tensor = Tensor::from_data(TensorData::new(values, [1, height, width, 3]), device);
        Self::new(tensor)
    }

    /// Per-sample shape `(H, W, 3)`.
    pub fn shape(&self) -> FeatureShape {
        let [_, h, w, c] = self.inner.dims();
        FeatureShape::map(h, w, c)
    }

    /// Image height.
    pub fn height(&self) -> usize {
        self.inner.dims()[1]
    }

    /// Image width.
    pub fn width(&self) -> usize {
        self.inner.dims()[2]
    }

    /// Get a reference to the underlying Burn tensor.
    #[must_use]
    pub const fn inner(&self) -> &Tensor<B, 4> {
        &self.inner
    }

    /// Consume self and return the underlying Burn tensor.
    #[must_use]
    pub fn into_inner(self) -> Tensor<B, 4> {
        self.inner
    }

    /// Get the device the tensor is on.
    pub fn device(&self) -> B::Device {
        self.inner.device()
    }
}
