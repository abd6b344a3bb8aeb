//! GPU-accelerated neighbour search using WGPU compute shaders.
//!
//! This crate provides the accelerator backend behind `cloud-nns` device
//! indices: a lazily initialized [`GpuContext`], point upload helpers, and a
//! [`SearchPipeline`] with brute-force k-NN and fixed-radius kernels.
//!
//! # GPU Availability
//!
//! GPU support is detected at runtime. Use [`GpuContext::is_available()`] to
//! check for an adapter, or the `try_*` helpers which return `None` instead
//! of an error when no GPU is present.
//!
//! # Limits
//!
//! - k-NN keeps at most [`MAX_GPU_KNN`] neighbours per query
//! - arithmetic is `f32`, whatever the host dtype
//! - a single storage binding bounds the point count and the match set
//!
//! # Example
//!
//! ```no_run
//! use cloud_gpu::{GpuContext, PointBuffers, SearchPipeline};
//!
//! if let Some(ctx) = GpuContext::get() {
//!     let points = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [5.0, 5.0, 5.0]];
//!     let dataset = PointBuffers::upload(ctx, &points).unwrap();
//!     let pipeline = SearchPipeline::new(ctx).unwrap();
//!
//!     let within = pipeline.fixed_radius(ctx, &dataset, &[[0.0, 0.0, 0.0]], 1.5).unwrap();
//!     assert_eq!(within.counts, vec![2]);
//! }
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffers;
pub mod context;
pub mod error;
pub mod search;

pub use context::{GpuAdapterInfo, GpuContext, GpuDevicePreference};
pub use error::{GpuError, GpuResult};
pub use search::{
    GpuKnnResult, GpuRadiusResult, MAX_GPU_KNN, SearchPipeline, knn_search_gpu, radius_search_gpu,
    try_knn_search_gpu,
};

pub use buffers::{GpuPoint, GpuSearchParams, PointBuffers};
