//! Tensor-backed point clouds.
//!
//! A [`PointCloud`] stores its per-point data in a [`TensorMap`] keyed by
//! [`Attribute`]: `points` defines the cloud, `colors` and `normals` are
//! optional and always have the same row count. Every tensor lives on the
//! cloud's device.
//!
//! Geometric transforms edit the cloud in place and return `&mut Self` so
//! they can be chained:
//!
//! - [`PointCloud::transform`] applies a 4x4 homogeneous matrix
//! - [`PointCloud::translate`] moves by an offset or to a new center
//! - [`PointCloud::scale`] scales about a center
//! - [`PointCloud::rotate`] applies a 3x3 matrix about a center
//!
//! Points get the full map. Normals get the linear part only and are not
//! renormalized. Colors are never touched.
//!
//! # Example
//!
//! ```
//! use cloud_geometry::{Attribute, PointCloud};
//! use cloud_types::{Device, Tensor};
//!
//! let points = Tensor::from_rows(&[[0.0_f64, 0.0, 0.0], [1.0, 2.0, 3.0]], Device::Cpu);
//! let mut cloud = PointCloud::from_points(points)?;
//!
//! let offset = Tensor::from_rows(&[[1.0_f64, 1.0, 1.0]], Device::Cpu).reshape(&[3])?;
//! cloud.translate(&offset, true)?;
//!
//! let min = cloud.get_min_bound()?;
//! assert_eq!(min.to_f64_vec(), vec![1.0, 1.0, 1.0]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod attribute;
mod downsample;
mod error;
mod legacy;
mod pointcloud;
mod tensor_map;

pub use attribute::Attribute;
pub use error::{GeometryError, GeometryResult};
pub use legacy::LegacyPointCloud;
pub use pointcloud::PointCloud;
pub use tensor_map::TensorMap;
