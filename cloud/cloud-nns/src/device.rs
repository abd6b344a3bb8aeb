//! GPU backend built on the `cloud-gpu` compute pipelines.
//!
//! Points and queries are converted to `f32` for upload; results come back
//! as per-query neighbour lists in the same shape the host backend produces.

use cloud_gpu::{GpuContext, GpuKnnResult, PointBuffers, SearchPipeline};
use cloud_types::Device;
use tracing::info;

use crate::config::SearchConfig;
use crate::error::{NnsError, NnsResult};
use crate::kdtree::Neighbor;

/// Device-resident spatial index.
///
/// The reference points stay uploaded for the lifetime of the index; each
/// search uploads only its queries.
pub struct DeviceIndex {
    ctx: &'static GpuContext,
    pipeline: SearchPipeline,
    dataset: PointBuffers,
    device: Device,
    sort_results: bool,
}

#[allow(clippy::cast_possible_truncation)]
fn to_f32(points: &[[f64; 3]]) -> Vec<[f32; 3]> {
    points
        .iter()
        .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
        .collect()
}

impl DeviceIndex {
    /// Upload `points` and compile the search pipelines.
    ///
    /// # Errors
    ///
    /// - [`NnsError::DeviceUnavailable`] if `device` is not a present GPU
    /// - [`NnsError::Gpu`] if upload or shader compilation fails
    pub fn build(points: &[[f64; 3]], device: Device, config: &SearchConfig) -> NnsResult<Self> {
        if device.ordinal() != 0 || !device.is_gpu() {
            return Err(NnsError::DeviceUnavailable(device));
        }
        let ctx = GpuContext::get_with(config.gpu_preference)
            .ok_or(NnsError::DeviceUnavailable(device))?;
        let pipeline = SearchPipeline::new(ctx)?;
        let dataset = PointBuffers::upload(ctx, &to_f32(points))?;
        info!(
            points = dataset.len(),
            adapter = %ctx.adapter_info.name,
            "Uploaded reference points to GPU"
        );
        Ok(Self {
            ctx,
            pipeline,
            dataset,
            device,
            sort_results: config.sort_results,
        })
    }

    /// The device this index lives on.
    #[must_use]
    pub const fn device(&self) -> Device {
        self.device
    }

    /// Number of reference points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Returns true if there are no reference points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// The `k` nearest neighbours of each query.
    ///
    /// # Errors
    ///
    /// Returns [`NnsError::Gpu`] if `k` exceeds the GPU limit or the
    /// dispatch fails.
    pub fn knn(&self, queries: &[[f64; 3]], k: usize) -> NnsResult<Vec<Vec<Neighbor>>> {
        let result = self
            .pipeline
            .knn(self.ctx, &self.dataset, &to_f32(queries), k, f32::MAX)?;
        Ok(knn_rows(&result))
    }

    /// At most `max_knn` nearest neighbours within `radius` of each query.
    ///
    /// # Errors
    ///
    /// Returns [`NnsError::Gpu`] if `max_knn` exceeds the GPU limit or the
    /// dispatch fails.
    #[allow(clippy::cast_possible_truncation)]
    pub fn hybrid(&self, queries: &[[f64; 3]], radius: f64, max_knn: usize) -> NnsResult<Vec<Vec<Neighbor>>> {
        let max_dist_sq = (radius * radius) as f32;
        let result = self
            .pipeline
            .knn(self.ctx, &self.dataset, &to_f32(queries), max_knn, max_dist_sq)?;
        Ok(knn_rows(&result))
    }

    /// Every neighbour within `radius` of each query.
    ///
    /// # Errors
    ///
    /// Returns [`NnsError::Gpu`] if the match set does not fit on the
    /// device or the dispatch fails.
    #[allow(clippy::cast_possible_truncation)]
    pub fn fixed_radius(&self, queries: &[[f64; 3]], radius: f64) -> NnsResult<Vec<Vec<Neighbor>>> {
        let result = self
            .pipeline
            .fixed_radius(self.ctx, &self.dataset, &to_f32(queries), radius as f32)?;

        let mut rows = Vec::with_capacity(result.counts.len());
        let mut offset = 0;
        for &count in &result.counts {
            let count = count as usize;
            let mut row: Vec<Neighbor> = result.indices[offset..offset + count]
                .iter()
                .zip(&result.distances[offset..offset + count])
                .filter_map(|(&i, &d)| neighbor(i, d))
                .collect();
            if self.sort_results {
                row.sort_unstable_by(Neighbor::cmp_by_distance);
            }
            rows.push(row);
            offset += count;
        }
        Ok(rows)
    }
}

impl std::fmt::Debug for DeviceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIndex")
            .field("device", &self.device)
            .field("points", &self.dataset.len())
            .field("adapter", &self.ctx.adapter_info.name)
            .finish_non_exhaustive()
    }
}

fn neighbor(index: i32, dist_sq: f32) -> Option<Neighbor> {
    usize::try_from(index)
        .ok()
        .map(|i| Neighbor::new(i, f64::from(dist_sq)))
}

/// Splits a padded k-NN result into per-query lists, dropping `-1` padding.
fn knn_rows(result: &GpuKnnResult) -> Vec<Vec<Neighbor>> {
    (0..result.num_queries())
        .map(|q| {
            result.row(q).map_or_else(Vec::new, |(indices, distances)| {
                indices
                    .iter()
                    .zip(distances)
                    .filter_map(|(&i, &d)| neighbor(i, d))
                    .collect()
            })
        })
        .collect()
}
