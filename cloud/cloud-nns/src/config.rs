//! Configuration and presets for neighbour search.
//!
//! # Presets
//!
//! - [`SearchConfig::default()`] - parallel queries, distance-sorted radius results
//! - [`SearchConfig::serial()`] - single-threaded queries
//! - [`SearchConfig::unsorted()`] - radius results in reference-index order
//!
//! # Example
//!
//! ```
//! use cloud_nns::SearchConfig;
//!
//! let config = SearchConfig::default()
//!     .with_leaf_size(32)
//!     .with_parallel(false);
//! assert_eq!(config.leaf_size, 32);
//! ```

use cloud_gpu::GpuDevicePreference;

/// Configuration for building and querying a spatial index.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchConfig {
    /// Maximum number of points in a kd-tree leaf.
    pub leaf_size: usize,

    /// Whether to process query points in parallel (via rayon).
    ///
    /// Multi-radius search ignores this and always runs serially.
    pub parallel: bool,

    /// Whether fixed-radius and multi-radius results are ordered by
    /// ascending distance (ties by index) rather than by reference index.
    pub sort_results: bool,

    /// Adapter preference used if this index initializes the GPU context.
    pub gpu_preference: GpuDevicePreference,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            leaf_size: 16,
            parallel: true,
            sort_results: true,
            gpu_preference: GpuDevicePreference::Auto,
        }
    }
}

impl SearchConfig {
    /// Create a configuration that answers queries on the calling thread.
    ///
    /// # Example
    ///
    /// ```
    /// use cloud_nns::SearchConfig;
    ///
    /// assert!(!SearchConfig::serial().parallel);
    /// ```
    #[must_use]
    pub fn serial() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    /// Create a configuration that leaves radius results in reference-index
    /// order.
    ///
    /// Skipping the per-query sort is cheaper when callers only need the
    /// neighbour set.
    #[must_use]
    pub fn unsorted() -> Self {
        Self {
            sort_results: false,
            ..Self::default()
        }
    }

    /// Set the kd-tree leaf size (at least 1).
    #[must_use]
    pub fn with_leaf_size(mut self, size: usize) -> Self {
        self.leaf_size = size.max(1);
        self
    }

    /// Enable or disable parallel query processing.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Choose distance-sorted or index-ordered radius results.
    #[must_use]
    pub const fn with_sort_results(mut self, sort: bool) -> Self {
        self.sort_results = sort;
        self
    }

    /// Set the GPU adapter preference.
    #[must_use]
    pub const fn with_gpu_preference(mut self, preference: GpuDevicePreference) -> Self {
        self.gpu_preference = preference;
        self
    }
}
