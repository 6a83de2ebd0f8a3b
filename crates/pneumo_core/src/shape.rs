//! Per-sample activation shapes.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Shape of a single sample flowing through a layer graph.
///
/// The batch dimension is never part of a `FeatureShape`; graphs are built
/// against one sample and executed with a leading batch axis.
///
/// - `Map`: a spatial activation `(H, W, C)`, channels-last
/// - `Vector`: a flat activation `(F,)`
///
/// # Example
///
/// ```rust
/// use pneumo_core::FeatureShape;
///
/// let shape = FeatureShape::map(224, 224, 3);
/// assert_eq!(shape.num_elements(), 224 * 224 * 3);
/// assert!(shape.is_map());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureShape {
    /// Spatial activation `(height, width, channels)`.
    Map {
        /// Height in cells.
        height: usize,
        /// Width in cells.
        width: usize,
        /// Channel count.
        channels: usize,
    },
    /// Flat activation with `features` entries.
    Vector {
        /// Feature count.
        features: usize,
    },
}

impl FeatureShape {
    /// Create a spatial shape.
    #[must_use]
    pub const fn map(height: usize, width: usize, channels: usize) -> Self {
        Self::Map {
            height,
            width,
            channels,
        }
    }

    /// Create a flat shape.
    #[must_use]
    pub const fn vector(features: usize) -> Self {
        Self::Vector { features }
    }

    /// Create a shape from per-sample dimensions.
    ///
    /// # Arguments
    ///
    /// * `dims` - Either `[H, W, C]` or `[F]`
    ///
    /// # Errors
    ///
    /// Returns an error for any other number of dimensions.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pneumo_core::FeatureShape;
    ///
    /// let shape = FeatureShape::from_dims(&[26, 26, 128]).unwrap();
    /// assert_eq!(shape, FeatureShape::map(26, 26, 128));
    /// assert!(FeatureShape::from_dims(&[1, 2]).is_err());
    /// ```
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        match *dims {
            [height, width, channels] => Ok(Self::map(height, width, channels)),
            [features] => Ok(Self::vector(features)),
            _ => Err(CoreError::DimensionError {
                expected: 3,
                got: dims.len(),
            }),
        }
    }

    /// Per-sample dimensions.
    #[must_use]
    pub fn dims(&self) -> Vec<usize> {
        match *self {
            Self::Map {
                height,
                width,
                channels,
            } => vec![height, width, channels],
            Self::Vector { features } => vec![features],
        }
    }

    /// Dimensions with a leading batch axis.
    #[must_use]
    pub fn batched_dims(&self, batch: usize) -> Vec<usize> {
        let mut dims = Vec::with_capacity(4);
        dims.push(batch);
        dims.extend(self.dims());
        dims
    }

    /// Total number of elements per sample.
    #[must_use]
    pub fn num_elements(&self) -> usize {
        self.dims().iter().product()
    }

    /// Whether this is a spatial shape.
    #[must_use]
    pub const fn is_map(&self) -> bool {
        matches!(self, Self::Map { .. })
    }

    /// The channel (last-axis) size.
    #[must_use]
    pub const fn channels(&self) -> usize {
        match *self {
            Self::Map { channels, .. } => channels,
            Self::Vector { features } => features,
        }
    }

    /// Check if any dimension is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_elements() == 0
    }
}

impl std::fmt::Display for FeatureShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Map {
                height,
                width,
                channels,
            } => write!(f, "(H={}, W={}, C={})", height, width, channels),
            Self::Vector { features } => write!(f, "(F={})", features),
        }
    }
}

impl From<[usize; 3]> for FeatureShape {
    fn from([height, width, channels]: [usize; 3]) -> Self {
        Self::map(height, width, channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_shape() {
        let shape = FeatureShape::map(26, 26, 128);
        assert!(shape.is_map());
        assert_eq!(shape.channels(), 128);
        assert_eq!(shape.dims(), vec![26, 26, 128]);
        assert_eq!(shape.batched_dims(1), vec![1, 26, 26, 128]);
    }

    #[test]
    fn test_vector_shape() {
        let shape = FeatureShape::vector(10);
        assert!(!shape.is_map());
        assert_eq!(shape.num_elements(), 10);
        assert_eq!(shape.batched_dims(1), vec![1, 10]);
    }

    #[test]
    fn test_from_dims() {
        assert_eq!(
            FeatureShape::from_dims(&[4, 5, 6]).unwrap(),
            FeatureShape::map(4, 5, 6)
        );
        assert_eq!(FeatureShape::from_dims(&[7]).unwrap(), FeatureShape::vector(7));
        assert!(FeatureShape::from_dims(&[]).is_err());
        assert!(FeatureShape::from_dims(&[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn test_is_empty() {
        assert!(FeatureShape::map(0, 4, 4).is_empty());
        assert!(!FeatureShape::vector(1).is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(FeatureShape::map(2, 3, 4).to_string(), "(H=2, W=3, C=4)");
        assert_eq!(FeatureShape::vector(9).to_string(), "(F=9)");
    }

    #[test]
    fn test_shape_serialization() {
        let shape = FeatureShape::map(224, 224, 3);
        let json = serde_json::to_string(&shape).unwrap();
        assert!(json.contains("\"kind\":\"map\""));
        let restored: FeatureShape = serde_json::from_str(&json).unwrap();
        assert_eq!(shape, restored);
    }
}
