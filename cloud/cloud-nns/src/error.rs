//! Error types for neighbour search.

use cloud_gpu::GpuError;
use cloud_types::{Device, ErrorCategory, TensorError};
use thiserror::Error;

use crate::kind::SearchKind;

/// Errors that can occur when building or querying a spatial index.
///
/// # Example
///
/// ```
/// use cloud_nns::{NnsError, SearchKind};
/// use cloud_types::ErrorCategory;
///
/// let err = NnsError::NotPrepared(SearchKind::Knn);
/// assert_eq!(err.category(), ErrorCategory::State);
/// assert!(err.to_string().contains("knn_index"));
/// ```
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NnsError {
    /// A search was issued before the matching index was prepared.
    #[error("{0} search requires {0}_index() to be called first")]
    NotPrepared(SearchKind),

    /// The reference point set has no points.
    #[error("dataset points must not be empty")]
    EmptyDataset,

    /// A tensor argument has the wrong shape, dtype or device.
    #[error(transparent)]
    Tensor(#[from] TensorError),

    /// A scalar parameter is out of range.
    #[error("invalid {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The search variant cannot run on the index's device.
    #[error("{kind} search is not supported on {device}")]
    Unsupported {
        /// Requested variant.
        kind: SearchKind,
        /// Device of the index.
        device: Device,
    },

    /// The requested device does not exist on this machine.
    #[error("device {0} is not available")]
    DeviceUnavailable(Device),

    /// The GPU backend failed.
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

impl NnsError {
    /// Returns the coarse category of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NotPrepared(_) => ErrorCategory::State,
            Self::EmptyDataset | Self::InvalidParameter { .. } => ErrorCategory::Input,
            Self::Tensor(e) => e.category(),
            Self::Unsupported { .. } | Self::DeviceUnavailable(_) => ErrorCategory::Capability,
            Self::Gpu(e) => e.category(),
        }
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Result type for neighbour search.
pub type NnsResult<T> = Result<T, NnsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use cloud_types::Dtype;

    #[test]
    fn test_not_prepared_message() {
        let err = NnsError::NotPrepared(SearchKind::FixedRadius);
        assert_eq!(
            err.to_string(),
            "fixed_radius search requires fixed_radius_index() to be called first"
        );
    }

    #[test]
    fn test_categories() {
        assert_eq!(NnsError::EmptyDataset.category(), ErrorCategory::Input);
        assert_eq!(
            NnsError::from(TensorError::NotFloat(Dtype::Int32)).category(),
            ErrorCategory::Input
        );
        assert_eq!(
            NnsError::Unsupported {
                kind: SearchKind::MultiRadius,
                device: Device::Gpu(0)
            }
            .category(),
            ErrorCategory::Capability
        );
        assert_eq!(
            NnsError::from(GpuError::TooManyNeighbors { k: 100, max: 64 }).category(),
            ErrorCategory::Capability
        );
        assert_eq!(
            NnsError::from(GpuError::DeviceLost).category(),
            ErrorCategory::Backend
        );
    }

    #[test]
    fn test_unsupported_message() {
        let err = NnsError::Unsupported {
            kind: SearchKind::MultiRadius,
            device: Device::Gpu(0),
        };
        assert_eq!(err.to_string(), "multi_radius search is not supported on GPU:0");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NnsError>();
    }
}
