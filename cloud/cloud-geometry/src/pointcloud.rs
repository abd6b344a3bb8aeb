//! Tensor-backed point clouds.
//!
//! A [`PointCloud`] stores its per-point data in a [`TensorMap`] on one
//! device. Geometric transforms read the affected attributes, apply the map
//! in `f64`, and write the result back in each attribute's own dtype.
//!
//! # Example
//!
//! ```
//! use cloud_geometry::{Attribute, PointCloud};
//! use cloud_types::{Device, Tensor};
//!
//! let points = Tensor::from_rows(&[[0.0_f32, 1.0, 2.0], [6.0, 7.0, 8.0]], Device::Cpu);
//! let mut cloud = PointCloud::from_points(points)?;
//!
//! let offset = Tensor::from_vec(vec![10.0_f32, 20.0, 30.0], &[3], Device::Cpu)?;
//! cloud.translate(&offset, true)?;
//!
//! let expected = Tensor::from_rows(&[[10.0_f32, 21.0, 32.0], [16.0, 27.0, 38.0]], Device::Cpu);
//! assert!(cloud.point().require(Attribute::Points)?.allclose(&expected));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use cloud_types::{Device, Tensor};
use nalgebra::{Matrix3, Point3, Vector3};
use tracing::debug;

use crate::attribute::Attribute;
use crate::error::{GeometryError, GeometryResult};
use crate::tensor_map::TensorMap;

/// A set of 3D points with optional colors and normals.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointCloud {
    point: TensorMap,
}

impl PointCloud {
    /// An empty cloud on `device`.
    #[must_use]
    pub const fn new(device: Device) -> Self {
        Self {
            point: TensorMap::new(device),
        }
    }

    /// A cloud holding `points`, on the tensor's device.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Tensor`] unless `points` is a float `(N, 3)`
    /// tensor.
    pub fn from_points(points: Tensor) -> GeometryResult<Self> {
        let mut cloud = Self::new(points.device());
        cloud.point.set(Attribute::Points, points)?;
        Ok(cloud)
    }

    /// The attribute map.
    #[must_use]
    pub const fn point(&self) -> &TensorMap {
        &self.point
    }

    /// Mutable access to the attribute map.
    pub fn point_mut(&mut self) -> &mut TensorMap {
        &mut self.point
    }

    /// The cloud's device.
    #[must_use]
    pub const fn device(&self) -> Device {
        self.point.device()
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.point.len()
    }

    /// Returns true if the cloud has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.point.is_empty()
    }

    /// Whether normals are present.
    #[must_use]
    pub fn has_normals(&self) -> bool {
        self.point.contains(Attribute::Normals)
    }

    /// Whether colors are present.
    #[must_use]
    pub fn has_colors(&self) -> bool {
        self.point.contains(Attribute::Colors)
    }

    fn points(&self) -> GeometryResult<&Tensor> {
        self.point.require(Attribute::Points)
    }

    fn non_empty_points(&self) -> GeometryResult<Vec<Point3<f64>>> {
        let points = self.points()?.to_points()?;
        if points.is_empty() {
            return Err(GeometryError::EmptyPointCloud);
        }
        Ok(points)
    }

    fn bound(&self, pick: fn(f64, f64) -> f64) -> GeometryResult<Tensor> {
        let points = self.non_empty_points()?;
        let first = points[0].coords;
        let bound = points[1..].iter().fold(first, |acc, p| {
            Vector3::new(pick(acc.x, p.x), pick(acc.y, p.y), pick(acc.z, p.z))
        });
        let tensor = self.points()?;
        Ok(Tensor::from_vector3(&bound, tensor.dtype(), tensor.device()))
    }

    /// Componentwise minimum of the points, as a `(3,)` tensor.
    ///
    /// # Errors
    ///
    /// - [`GeometryError::MissingAttribute`] without points
    /// - [`GeometryError::EmptyPointCloud`] with zero points
    pub fn get_min_bound(&self) -> GeometryResult<Tensor> {
        self.bound(f64::min)
    }

    /// Componentwise maximum of the points, as a `(3,)` tensor.
    ///
    /// # Errors
    ///
    /// Same as [`PointCloud::get_min_bound`].
    pub fn get_max_bound(&self) -> GeometryResult<Tensor> {
        self.bound(f64::max)
    }

    /// Mean of the points, as a `(3,)` tensor.
    ///
    /// # Errors
    ///
    /// Same as [`PointCloud::get_min_bound`].
    pub fn get_center(&self) -> GeometryResult<Tensor> {
        let tensor = self.points()?;
        let center = self.center()?;
        Ok(Tensor::from_vector3(&center, tensor.dtype(), tensor.device()))
    }

    fn center(&self) -> GeometryResult<Vector3<f64>> {
        let points = self.non_empty_points()?;
        let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
        #[allow(clippy::cast_precision_loss)]
        let center = sum / points.len() as f64;
        Ok(center)
    }

    /// Applies `f` to every point and writes the points back.
    fn map_points(&mut self, f: impl Fn(&Point3<f64>) -> Point3<f64>) -> GeometryResult<()> {
        let tensor = self.points()?;
        let (dtype, device) = (tensor.dtype(), tensor.device());
        let mapped: Vec<Point3<f64>> = tensor.to_points()?.iter().map(f).collect();
        self.point
            .replace(Attribute::Points, Tensor::from_points(&mapped, dtype, device));
        Ok(())
    }

    /// Applies `linear` to every directional attribute that is present.
    fn map_directions(&mut self, linear: &Matrix3<f64>) -> GeometryResult<()> {
        for attr in Attribute::ALL.into_iter().filter(|a| a.is_directional()) {
            let Some(tensor) = self.point.get(attr) else {
                continue;
            };
            let (dtype, device) = (tensor.dtype(), tensor.device());
            let mapped: Vec<Vector3<f64>> = tensor.to_vectors()?.iter().map(|v| linear * v).collect();
            self.point
                .replace(attr, Tensor::from_vectors(&mapped, dtype, device));
        }
        Ok(())
    }

    /// Applies a homogeneous `(4, 4)` transform.
    ///
    /// Points get the full affine map; normals get its upper-left `3x3`
    /// block. Colors are untouched.
    ///
    /// # Errors
    ///
    /// - [`GeometryError::MissingAttribute`] without points
    /// - [`GeometryError::Tensor`] if `matrix` is not `(4, 4)` on the cloud's
    ///   device
    pub fn transform(&mut self, matrix: &Tensor) -> GeometryResult<&mut Self> {
        self.points()?;
        matrix.check_device(self.device())?;
        let m = matrix.to_matrix4()?;
        let linear: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
        let translation: Vector3<f64> = m.fixed_view::<3, 1>(0, 3).into_owned();

        debug!(points = self.len(), "Applying homogeneous transform");
        self.map_points(|p| Point3::from(linear * p.coords + translation))?;
        self.map_directions(&linear)?;
        Ok(self)
    }

    /// Translates the cloud.
    ///
    /// With `relative`, adds `translation` to every point. Otherwise moves the
    /// center to `translation`.
    ///
    /// # Errors
    ///
    /// - [`GeometryError::MissingAttribute`] without points
    /// - [`GeometryError::EmptyPointCloud`] for an absolute move of an empty
    ///   cloud
    /// - [`GeometryError::Tensor`] if `translation` is not a 3-vector on the
    ///   cloud's device
    pub fn translate(&mut self, translation: &Tensor, relative: bool) -> GeometryResult<&mut Self> {
        self.points()?;
        translation.check_device(self.device())?;
        let t = translation.to_vector3()?;
        let offset = if relative { t } else { t - self.center()? };
        self.map_points(|p| p + offset)?;
        Ok(self)
    }

    /// Scales every point about `center`: `center + factor * (p - center)`.
    ///
    /// # Errors
    ///
    /// - [`GeometryError::MissingAttribute`] without points
    /// - [`GeometryError::InvalidParameter`] if `factor` is not finite
    /// - [`GeometryError::Tensor`] if `center` is not a 3-vector on the
    ///   cloud's device
    pub fn scale(&mut self, factor: f64, center: &Tensor) -> GeometryResult<&mut Self> {
        self.points()?;
        if !factor.is_finite() {
            return Err(GeometryError::InvalidParameter {
                name: "factor",
                reason: format!("must be finite, got {factor}"),
            });
        }
        center.check_device(self.device())?;
        let c = Point3::from(center.to_vector3()?);
        self.map_points(|p| c + (p - c) * factor)?;
        Ok(self)
    }

    /// Rotates every point about `center`: `center + R * (p - center)`.
    ///
    /// Normals are multiplied by `R` without recentering. `R` is not checked
    /// for orthonormality.
    ///
    /// # Errors
    ///
    /// - [`GeometryError::MissingAttribute`] without points
    /// - [`GeometryError::Tensor`] if `rotation` is not `(3, 3)` or `center`
    ///   is not a 3-vector, or either lives on another device
    pub fn rotate(&mut self, rotation: &Tensor, center: &Tensor) -> GeometryResult<&mut Self> {
        self.points()?;
        rotation.check_device(self.device())?;
        center.check_device(self.device())?;
        let r = rotation.to_matrix3()?;
        let c = Point3::from(center.to_vector3()?);
        self.map_points(|p| c + r * (p - c))?;
        self.map_directions(&r)?;
        Ok(self)
    }

    /// A copy of the cloud on `device`.
    #[must_use]
    pub fn to_device(&self, device: Device) -> Self {
        Self {
            point: self.point.to_device(device),
        }
    }

    /// Concatenates `other` after this cloud.
    ///
    /// # Errors
    ///
    /// - [`GeometryError::AttributeSetMismatch`] if the clouds hold
    ///   different attributes
    /// - [`GeometryError::Tensor`] if the clouds differ in device or an
    ///   attribute's dtype
    pub fn append(&self, other: &Self) -> GeometryResult<Self> {
        let left: Vec<Attribute> = self.point.keys().collect();
        let right: Vec<Attribute> = other.point.keys().collect();
        if left != right {
            return Err(GeometryError::AttributeSetMismatch { left, right });
        }
        if other.device() != self.device() {
            return Err(cloud_types::TensorError::DeviceMismatch {
                expected: self.device(),
                actual: other.device(),
            }
            .into());
        }

        let mut merged = Self::new(self.device());
        for (attr, tensor) in self.point.iter() {
            let theirs = other.point.require(attr)?;
            merged.point.set(attr, Tensor::concat_rows(&[tensor, theirs])?)?;
        }
        Ok(merged)
    }
}
