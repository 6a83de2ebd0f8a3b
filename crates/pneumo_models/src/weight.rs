//! Weight arrays exchanged between layers and model files.

use burn::prelude::*;
use burn::tensor::TensorData;
use pneumo_core::CoreError;

use crate::error::{ModelError, Result};

/// One weight array of a layer, stored flat with its logical shape.
///
/// Kernels keep the channels-last layout they are declared with
/// (`(kh, kw, in, out)` for convolutions, `(in, out)` for dense layers).
#[derive(Debug, Clone)]
pub struct Weight<B: Backend> {
    shape: Vec<usize>,
    values: Tensor<B, 1>,
}

impl<B: Backend> Weight<B> {
    /// Take a tensor as a weight, remembering its shape.
    pub fn from_tensor<const D: usize>(tensor: Tensor<B, D>) -> Self {
        let shape = tensor.dims().to_vec();
        let numel: usize = shape.iter().product();
        Self {
            shape,
            values: tensor.reshape([numel]),
        }
    }

    /// Build a weight from host values.
    ///
    /// # Errors
    ///
    /// Returns an error if `values.len()` differs from the product of `shape`.
    pub fn from_values(shape: Vec<usize>, values: Vec<f32>, device: &B::Device) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if values.len() != numel {
            return Err(CoreError::InvalidShape {
                expected: format!("{} values for shape {:?}", numel, shape),
                got: format!("{} values", values.len()),
            }
            .into());
        }
        let values = Tensor::from_data(TensorData::new(values, [numel]), device);
        Ok(Self { shape, values })
    }

    /// Logical shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of scalars.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Copy values back to the host.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        self.values
            .to_data()
            .to_vec::<f32>()
            .map_err(|e| ModelError::from(CoreError::TensorData(format!("{:?}", e))))
    }

    /// Copy into fresh storage that shares nothing with `self`.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        let device = self.values.device();
        Self {
            shape: self.shape.clone(),
            values: Tensor::from_data(self.values.to_data(), &device),
        }
    }

    /// Reshape into the tensor a layer stores, checking the shape first.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::WeightMismatch`] if the logical shape differs
    /// from `expected`.
    pub fn into_tensor<const D: usize>(
        self,
        layer: &str,
        expected: [usize; D],
    ) -> Result<Tensor<B, D>> {
        if self.shape.as_slice() != expected.as_slice() {
            return Err(ModelError::weight_mismatch(
                layer,
                format!("expected shape {:?}, got {:?}", expected, self.shape),
            ));
        }
        Ok(self.values.reshape(expected))
    }
}
