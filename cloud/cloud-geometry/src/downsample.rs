//! Voxel-grid down-sampling.

use cloud_types::Tensor;
use hashbrown::HashMap;
use tracing::debug;

use crate::attribute::Attribute;
use crate::error::{GeometryError, GeometryResult};
use crate::pointcloud::PointCloud;

/// Running per-voxel sums for every attribute present in the cloud.
struct VoxelSums {
    sums: Vec<[f64; 3]>,
    counts: Vec<u32>,
}

impl PointCloud {
    /// Down-samples the cloud to one point per occupied voxel.
    ///
    /// Voxels are axis-aligned cubes of edge `voxel_size` anchored at the
    /// origin. Every attribute is averaged over the points in a voxel. Output
    /// rows follow the order in which voxels are first hit, and each attribute
    /// keeps its dtype.
    ///
    /// # Errors
    ///
    /// - [`GeometryError::InvalidParameter`] unless `voxel_size` is finite and
    ///   positive
    /// - [`GeometryError::MissingAttribute`] without points
    ///
    /// # Example
    ///
    /// ```
    /// use cloud_geometry::{Attribute, PointCloud};
    /// use cloud_types::{Device, Tensor};
    ///
    /// let points = Tensor::from_rows(
    ///     &[[0.25_f64, 0.25, 0.25], [0.75, 0.75, 0.75], [1.5, 0.0, 0.0]],
    ///     Device::Cpu,
    /// );
    /// let cloud = PointCloud::from_points(points)?;
    /// let down = cloud.voxel_down_sample(1.0)?;
    /// assert_eq!(down.len(), 2);
    /// assert_eq!(down.point().require(Attribute::Points)?.row_f64(0)?, vec![0.5, 0.5, 0.5]);
    /// # Ok::<(), cloud_geometry::GeometryError>(())
    /// ```
    pub fn voxel_down_sample(&self, voxel_size: f64) -> GeometryResult<Self> {
        if !voxel_size.is_finite() || voxel_size <= 0.0 {
            return Err(GeometryError::InvalidParameter {
                name: "voxel_size",
                reason: format!("must be finite and positive, got {voxel_size}"),
            });
        }

        let points = self.point().require(Attribute::Points)?.to_f64_vec();
        let mut slots: HashMap<[i64; 3], usize> = HashMap::new();
        let mut voxel_of = Vec::with_capacity(points.len() / 3);
        for p in points.chunks_exact(3) {
            #[allow(clippy::cast_possible_truncation)]
            let key = [
                (p[0] / voxel_size).floor() as i64,
                (p[1] / voxel_size).floor() as i64,
                (p[2] / voxel_size).floor() as i64,
            ];
            let next = slots.len();
            voxel_of.push(*slots.entry(key).or_insert(next));
        }
        let voxels = slots.len();

        let mut out = Self::new(self.device());
        for (attr, tensor) in self.point().iter() {
            let mut acc = VoxelSums {
                sums: vec![[0.0; 3]; voxels],
                counts: vec![0; voxels],
            };
            let values = tensor.to_f64_vec();
            for (row, &voxel) in values.chunks_exact(3).zip(&voxel_of) {
                let sum = &mut acc.sums[voxel];
                sum[0] += row[0];
                sum[1] += row[1];
                sum[2] += row[2];
                acc.counts[voxel] += 1;
            }
            let averaged: Vec<f64> = acc
                .sums
                .iter()
                .zip(&acc.counts)
                .flat_map(|(sum, &count)| {
                    let n = f64::from(count);
                    [sum[0] / n, sum[1] / n, sum[2] / n]
                })
                .collect();
            let reduced = Tensor::from_f64(&averaged, &[voxels, 3], tensor.dtype(), self.device())?;
            out.point_mut().set(attr, reduced)?;
        }

        debug!(voxel_size, input = self.len(), output = voxels, "Voxel down-sampled");
        Ok(out)
    }
}
