//! Error types for tensor operations.
//!
//! This module also defines [`ErrorCategory`], the coarse classification every
//! CloudForge error enum reports through its `category()` method.

use thiserror::Error;

use crate::{Device, Dtype};

/// Coarse classification shared by all CloudForge errors.
///
/// Callers that only care about *why* an operation was rejected can match on
/// the category instead of the individual error variants.
///
/// # Example
///
/// ```
/// use cloud_types::{ErrorCategory, TensorError, Dtype};
///
/// let err = TensorError::DtypeMismatch {
///     expected: Dtype::Float32,
///     actual: Dtype::Int64,
/// };
/// assert_eq!(err.category(), ErrorCategory::Input);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorCategory {
    /// An operation was called before the object was in the required state
    /// (e.g. searching before the matching index was prepared).
    State,

    /// The caller passed malformed input: wrong shape, dtype, device, empty
    /// data, a missing attribute or an out-of-range parameter.
    Input,

    /// The requested operation is not available on the selected execution
    /// target.
    Capability,

    /// The execution backend failed while running a valid request.
    Backend,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::State => "state error",
            Self::Input => "input error",
            Self::Capability => "capability error",
            Self::Backend => "backend error",
        };
        f.write_str(name)
    }
}

/// Errors that can occur when constructing or converting tensors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TensorError {
    /// The number of values does not match the requested shape.
    #[error("shape {shape:?} holds {expected} elements, got {actual}")]
    ElementCount {
        /// Requested shape.
        shape: Vec<usize>,
        /// Element count implied by the shape.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// The tensor does not have the shape an operation requires.
    #[error("expected shape {expected}, got {actual:?}")]
    ShapeMismatch {
        /// Human readable description of the required shape, e.g. `(N, 3)`.
        expected: String,
        /// Actual shape of the tensor.
        actual: Vec<usize>,
    },

    /// The tensor element type is not the one required.
    #[error("expected dtype {expected}, got {actual}")]
    DtypeMismatch {
        /// Required dtype.
        expected: Dtype,
        /// Actual dtype.
        actual: Dtype,
    },

    /// The operation needs a floating point tensor.
    #[error("expected a floating point dtype, got {0}")]
    NotFloat(Dtype),

    /// Operands live on different execution targets.
    #[error("operand on {actual} cannot be combined with tensors on {expected}")]
    DeviceMismatch {
        /// Device the operation runs on.
        expected: Device,
        /// Device of the offending operand.
        actual: Device,
    },

    /// Row index past the end of the tensor.
    #[error("row {index} out of range for tensor with {rows} rows")]
    RowOutOfRange {
        /// Requested row.
        index: usize,
        /// Number of rows.
        rows: usize,
    },

    /// A device string could not be parsed.
    #[error("invalid device string `{0}`, expected e.g. `CPU:0` or `GPU:0`")]
    InvalidDevice(String),

    /// A dtype string could not be parsed.
    #[error("unknown dtype `{0}`")]
    InvalidDtype(String),
}

impl TensorError {
    /// Returns the coarse category of this error.
    ///
    /// Every tensor error is a contract violation by the caller.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        ErrorCategory::Input
    }

    pub(crate) fn shape(expected: impl Into<String>, actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.to_vec(),
        }
    }
}

/// Result type for tensor operations.
pub type TensorResult<T> = Result<T, TensorError>;
