//! Error types for point cloud operations.

use cloud_types::{ErrorCategory, TensorError};
use thiserror::Error;

use crate::attribute::Attribute;

/// Errors that can occur when editing or transforming a point cloud.
///
/// Every variant is an input error: the cloud or an operand is not in the
/// shape the operation needs.
///
/// # Example
///
/// ```
/// use cloud_geometry::{Attribute, GeometryError};
/// use cloud_types::ErrorCategory;
///
/// let err = GeometryError::MissingAttribute(Attribute::Points);
/// assert_eq!(err.category(), ErrorCategory::Input);
/// assert_eq!(err.to_string(), "point cloud has no 'points' attribute");
/// ```
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GeometryError {
    /// A required attribute is absent.
    #[error("point cloud has no '{0}' attribute")]
    MissingAttribute(Attribute),

    /// The operation needs at least one point.
    #[error("point cloud has no points")]
    EmptyPointCloud,

    /// An attribute's row count disagrees with the point count.
    #[error("attribute '{attribute}' has {actual} rows but the cloud has {expected} points")]
    LengthMismatch {
        /// Attribute being assigned.
        attribute: Attribute,
        /// Current point count.
        expected: usize,
        /// Rows in the assigned tensor.
        actual: usize,
    },

    /// Two clouds hold different attribute sets.
    #[error("attribute sets differ: {left:?} vs {right:?}")]
    AttributeSetMismatch {
        /// Attributes of the receiver.
        left: Vec<Attribute>,
        /// Attributes of the argument.
        right: Vec<Attribute>,
    },

    /// A string did not name a known attribute.
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),

    /// A scalar parameter is out of range.
    #[error("invalid {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A tensor argument has the wrong shape, dtype or device.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

impl GeometryError {
    /// Returns the coarse category of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Tensor(e) => e.category(),
            _ => ErrorCategory::Input,
        }
    }
}

/// Result type for point cloud operations.
pub type GeometryResult<T> = Result<T, GeometryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use cloud_types::Device;

    #[test]
    fn test_length_mismatch_message() {
        let err = GeometryError::LengthMismatch {
            attribute: Attribute::Colors,
            expected: 4,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "attribute 'colors' has 2 rows but the cloud has 4 points"
        );
    }

    #[test]
    fn test_tensor_error_is_transparent() {
        let inner = TensorError::DeviceMismatch {
            expected: Device::Cpu,
            actual: Device::Gpu(0),
        };
        let message = inner.to_string();
        let err = GeometryError::from(inner);
        assert_eq!(err.to_string(), message);
        assert_eq!(err.category(), ErrorCategory::Input);
    }
}
