//! Conversion to and from the plain host-side point cloud.

use cloud_types::{Device, Dtype, Tensor};
use nalgebra::{Point3, Vector3};

use crate::attribute::Attribute;
use crate::error::{GeometryError, GeometryResult};
use crate::pointcloud::PointCloud;

/// A point cloud as plain `f64` vectors, without an attribute map or device.
///
/// `colors` and `normals` are either empty or as long as `points`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LegacyPointCloud {
    /// Positions.
    pub points: Vec<Point3<f64>>,
    /// RGB colors, empty if absent.
    pub colors: Vec<Vector3<f64>>,
    /// Normals, empty if absent.
    pub normals: Vec<Vector3<f64>>,
}

impl LegacyPointCloud {
    /// A cloud holding only positions.
    #[must_use]
    pub fn from_points(points: Vec<Point3<f64>>) -> Self {
        Self {
            points,
            ..Self::default()
        }
    }

    /// Whether colors are present.
    #[must_use]
    pub fn has_colors(&self) -> bool {
        !self.colors.is_empty()
    }

    /// Whether normals are present.
    #[must_use]
    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }
}

impl PointCloud {
    /// Builds a tensor cloud of `dtype` on `device` from a legacy cloud.
    ///
    /// Empty `colors` / `normals` are left out of the attribute map.
    ///
    /// # Errors
    ///
    /// - [`GeometryError::Tensor`] if `dtype` is not a float type
    /// - [`GeometryError::LengthMismatch`] if colors or normals are present
    ///   with a different length than the points
    ///
    /// # Example
    ///
    /// ```
    /// use cloud_geometry::{LegacyPointCloud, PointCloud};
    /// use cloud_types::{Device, Dtype};
    /// use nalgebra::{Point3, Vector3};
    ///
    /// let legacy = LegacyPointCloud {
    ///     points: vec![Point3::new(0.0, 1.0, 2.0), Point3::new(3.0, 4.0, 5.0)],
    ///     colors: vec![Vector3::new(6.0, 7.0, 8.0), Vector3::new(9.0, 10.0, 11.0)],
    ///     normals: Vec::new(),
    /// };
    /// let cloud = PointCloud::from_legacy(&legacy, Dtype::Float32, Device::Cpu)?;
    /// assert_eq!(cloud.len(), 2);
    /// assert!(cloud.has_colors());
    /// assert!(!cloud.has_normals());
    /// # Ok::<(), cloud_geometry::GeometryError>(())
    /// ```
    pub fn from_legacy(legacy: &LegacyPointCloud, dtype: Dtype, device: Device) -> GeometryResult<Self> {
        let mut cloud = Self::new(device);
        let map = cloud.point_mut();
        map.set(Attribute::Points, Tensor::from_points(&legacy.points, dtype, device))?;
        if legacy.has_colors() {
            map.set(Attribute::Colors, Tensor::from_vectors(&legacy.colors, dtype, device))?;
        }
        if legacy.has_normals() {
            map.set(Attribute::Normals, Tensor::from_vectors(&legacy.normals, dtype, device))?;
        }
        Ok(cloud)
    }

    /// Copies the cloud into a legacy cloud, widening to `f64`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::MissingAttribute`] without points.
    pub fn to_legacy(&self) -> GeometryResult<LegacyPointCloud> {
        let map = self.point();
        let points = map.require(Attribute::Points)?.to_points()?;
        let vectors = |attr| -> GeometryResult<Vec<Vector3<f64>>> {
            map.get(attr)
                .map_or_else(|| Ok(Vec::new()), |t| t.to_vectors().map_err(GeometryError::from))
        };
        Ok(LegacyPointCloud {
            points,
            colors: vectors(Attribute::Colors)?,
            normals: vectors(Attribute::Normals)?,
        })
    }
}
