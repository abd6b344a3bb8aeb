//! GPU error types for neighbour search.
//!
//! This module provides error types for GPU operations, including
//! device unavailability, buffer limits, and shader failures.

use cloud_types::ErrorCategory;
use thiserror::Error;

/// Errors that can occur during GPU operations.
///
/// # Example
///
/// ```
/// use cloud_gpu::error::{GpuError, GpuResult};
///
/// fn check_gpu() -> GpuResult<()> {
///     Err(GpuError::NotAvailable)
/// }
/// assert!(check_gpu().is_err());
/// ```
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GpuError {
    /// GPU device is not available on this system.
    ///
    /// This can happen when:
    /// - No compatible GPU is present
    /// - GPU drivers are not installed
    /// - The system is running headless without a software adapter
    #[error("GPU not available: no compatible device found")]
    NotAvailable,

    /// A buffer would exceed the device's storage binding limit.
    #[error("GPU out of memory: required {required} bytes, available {available} bytes")]
    OutOfMemory {
        /// Memory required for the buffer in bytes.
        required: u64,
        /// Largest binding the device accepts in bytes.
        available: u64,
    },

    /// The requested neighbour count exceeds what the k-NN kernel keeps in
    /// private memory.
    #[error("k = {k} exceeds the GPU k-NN limit of {max}")]
    TooManyNeighbors {
        /// Requested neighbour count.
        k: usize,
        /// Largest supported neighbour count.
        max: usize,
    },

    /// Shader compilation failed.
    ///
    /// This usually indicates a bug in the shader code.
    #[error("shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// GPU device was lost during computation.
    #[error("GPU device lost")]
    DeviceLost,

    /// GPU command submission or execution failed.
    #[error("GPU execution failed: {0}")]
    Execution(String),

    /// Reading data back from the GPU failed.
    #[error("buffer mapping failed: {0}")]
    BufferMapping(String),
}

impl GpuError {
    /// Returns the coarse category of this error.
    ///
    /// Missing adapters and size limits are capability errors; everything
    /// else is a backend failure.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NotAvailable | Self::OutOfMemory { .. } | Self::TooManyNeighbors { .. } => {
                ErrorCategory::Capability
            }
            Self::ShaderCompilation(_)
            | Self::DeviceLost
            | Self::Execution(_)
            | Self::BufferMapping(_) => ErrorCategory::Backend,
        }
    }
}

/// Result type for GPU operations.
pub type GpuResult<T> = Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_available() {
        let msg = format!("{}", GpuError::NotAvailable);
        assert!(msg.contains("not available"));
    }

    #[test]
    fn test_error_display_out_of_memory() {
        let err = GpuError::OutOfMemory {
            required: 1024,
            available: 512,
        };
        let msg = format!("{err}");
        assert!(msg.contains("1024"));
        assert!(msg.contains("512"));
    }

    #[test]
    fn test_error_display_too_many_neighbors() {
        let err = GpuError::TooManyNeighbors { k: 100, max: 64 };
        assert_eq!(format!("{err}"), "k = 100 exceeds the GPU k-NN limit of 64");
    }

    #[test]
    fn test_error_display_buffer_mapping() {
        let err = GpuError::BufferMapping("mapping failed".to_string());
        assert!(format!("{err}").contains("mapping failed"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(GpuError::NotAvailable.category(), ErrorCategory::Capability);
        assert_eq!(
            GpuError::TooManyNeighbors { k: 65, max: 64 }.category(),
            ErrorCategory::Capability
        );
        assert_eq!(GpuError::DeviceLost.category(), ErrorCategory::Backend);
        assert_eq!(
            GpuError::Execution("x".into()).category(),
            ErrorCategory::Backend
        );
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GpuError>();
    }
}
