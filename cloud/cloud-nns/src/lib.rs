//! Nearest-neighbour search over 3D point sets.
//!
//! [`NearestNeighborSearch`] wraps a reference point tensor and answers four
//! kinds of queries:
//!
//! | Variant | Preparation | Query | CPU | GPU |
//! |---------|-------------|-------|-----|-----|
//! | k-NN | `knn_index()` | `knn_search(q, k)` | yes | yes, `k <= 64` |
//! | Fixed radius | `fixed_radius_index(r)` | `fixed_radius_search(q, r)` | yes | yes |
//! | Hybrid | `hybrid_index(r?)` | `hybrid_search(q, r, max_knn)` | yes | yes, `max_knn <= 64` |
//! | Multi radius | `multi_radius_index()` | `multi_radius_search(q, radii)` | yes | no |
//!
//! The backend follows the device of the reference tensor: CPU tensors get a
//! kd-tree (plus a hash grid for fixed-radius search), GPU tensors get the
//! brute-force compute pipelines from `cloud-gpu`.
//!
//! Distances are squared Euclidean; indices and counts are `Int64` tensors
//! and distances use the dataset dtype.
//!
//! # Example
//!
//! ```
//! use cloud_nns::NearestNeighborSearch;
//! use cloud_types::{Device, Tensor};
//!
//! let points = Tensor::from_rows(
//!     &[[0.0_f32, 0.0, 0.0], [0.0, 0.0, 0.1], [0.0, 0.1, 0.1], [0.1, 0.0, 0.0]],
//!     Device::Cpu,
//! );
//! let query = Tensor::from_rows(&[[0.05_f32, 0.04, 0.09]], Device::Cpu);
//!
//! let mut nns = NearestNeighborSearch::new(points)?;
//! nns.fixed_radius_index(0.1)?;
//! let result = nns.fixed_radius_search(&query, 0.1)?;
//! assert_eq!(result.counts.as_slice::<i64>()?, &[2]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Errors
//!
//! Every fallible call returns [`NnsError`]; [`NnsError::category`] maps it
//! onto the shared state / input / capability / backend taxonomy.

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod device;
mod error;
mod grid;
mod host;
mod index;
mod kdtree;
mod kind;
mod result;
mod search;

pub use config::SearchConfig;
pub use device::DeviceIndex;
pub use error::{NnsError, NnsResult};
pub use grid::HashGrid;
pub use host::HostIndex;
pub use index::{SpatialIndex, available_devices};
pub use kdtree::{KdTree, Neighbor};
pub use kind::SearchKind;
pub use result::{HybridResult, KnnResult, RadiusResult};
pub use search::NearestNeighborSearch;

pub use cloud_gpu::{GpuDevicePreference, MAX_GPU_KNN};
