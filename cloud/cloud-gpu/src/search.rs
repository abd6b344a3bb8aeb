//! GPU brute-force neighbour search.
//!
//! Every query point is handled by one shader invocation that scans the full
//! reference set, so cost grows with `queries * points`. That suits the
//! moderate dataset sizes typical of scan registration, where the GPU's raw
//! throughput beats a tree walk on the CPU.
//!
//! Three kernels share one bind group layout:
//!
//! | Entry point | Output |
//! |-------------|--------|
//! | `knn` | `k` padded slots per query, plus match counts |
//! | `count_within` | matches per query |
//! | `gather_within` | matches written at host-computed prefix offsets |
//!
//! Arithmetic is `f32`. Query batches larger than one dispatch (or one
//! storage binding) are split into chunks.
//!
//! # Example
//!
//! ```no_run
//! use cloud_gpu::search::knn_search_gpu;
//!
//! let points = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 2.0, 0.0]];
//! match knn_search_gpu(&points, &[[0.1, 0.0, 0.0]], 2) {
//!     Ok(result) => println!("nearest: {:?}", result.row(0)),
//!     Err(e) => eprintln!("GPU error: {e}"),
//! }
//! ```

use std::time::Instant;

use tracing::{debug, info};
use wgpu::{BindGroup, BindGroupLayout, Buffer, ComputePipeline};

use crate::buffers::{
    GpuPoint, GpuSearchParams, PointBuffers, allocate_output, download_buffer, gpu_len,
    upload_params, upload_points, upload_u32,
};
use crate::context::GpuContext;
use crate::error::{GpuError, GpuResult};

/// Shader source for the search kernels.
const NNS_SHADER: &str = include_str!("shaders/nns.wgsl");

/// Largest `k` the `knn` kernel can keep in private memory.
pub const MAX_GPU_KNN: usize = 64;

/// Invocations per workgroup, matching `@workgroup_size` in the shader.
pub const WORKGROUP_SIZE: u32 = 64;

/// Result of a GPU k-NN (or radius-capped k-NN) search.
///
/// Rows are `k` slots wide, sorted by ascending squared distance with ties
/// broken by ascending index. Unused slots hold index `-1` and distance `0`.
#[derive(Debug, Clone, Default)]
pub struct GpuKnnResult {
    /// Neighbour indices, `num_queries * k` row-major.
    pub indices: Vec<i32>,
    /// Squared distances, same layout as `indices`.
    pub distances: Vec<f32>,
    /// Filled slots per query.
    pub counts: Vec<u32>,
    /// Slots per query.
    pub k: usize,
    /// Wall time in milliseconds, uploads and downloads included.
    pub compute_time_ms: f64,
}

impl GpuKnnResult {
    /// Number of queries.
    #[must_use]
    pub fn num_queries(&self) -> usize {
        self.counts.len()
    }

    /// The filled slots for query `q`.
    #[must_use]
    pub fn row(&self, q: usize) -> Option<(&[i32], &[f32])> {
        let filled = *self.counts.get(q)? as usize;
        let start = q * self.k;
        Some((
            &self.indices[start..start + filled],
            &self.distances[start..start + filled],
        ))
    }
}

/// Result of a GPU fixed-radius search.
///
/// Matches are concatenated in query order; within a query they are in
/// ascending index order.
#[derive(Debug, Clone, Default)]
pub struct GpuRadiusResult {
    /// Matching reference indices.
    pub indices: Vec<i32>,
    /// Squared distances, parallel to `indices`.
    pub distances: Vec<f32>,
    /// Matches per query.
    pub counts: Vec<u32>,
    /// Wall time in milliseconds, uploads and downloads included.
    pub compute_time_ms: f64,
}

/// Compiled search kernels.
///
/// The pipelines are built once per index and reused for every query batch.
pub struct SearchPipeline {
    knn: ComputePipeline,
    count_within: ComputePipeline,
    gather_within: ComputePipeline,
    bind_group_layout: BindGroupLayout,
}

/// Buffers bound to one dispatch, in binding order.
struct SearchBindings<'a> {
    points: &'a Buffer,
    queries: &'a Buffer,
    params: &'a Buffer,
    out_indices: &'a Buffer,
    out_distances: &'a Buffer,
    counts: &'a Buffer,
    offsets: &'a Buffer,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl SearchPipeline {
    /// Compile the search kernels.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::ShaderCompilation`] if the shader or a pipeline
    /// fails validation.
    pub fn new(ctx: &GpuContext) -> GpuResult<Self> {
        debug!("Creating neighbour search pipelines");

        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("nns"),
                source: wgpu::ShaderSource::Wgsl(NNS_SHADER.into()),
            });

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("nns_bind_group_layout"),
                    entries: &[
                        // Reference points
                        storage_entry(0, true),
                        // Queries
                        storage_entry(1, true),
                        // Search params
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                        // Output indices and distances
                        storage_entry(3, false),
                        storage_entry(4, false),
                        // Per-query counts
                        storage_entry(5, false),
                        // Per-query output offsets
                        storage_entry(6, true),
                    ],
                });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("nns_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let make_pipeline = |entry_point: &str| {
            ctx.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry_point),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some(entry_point),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                })
        };

        let knn = make_pipeline("knn");
        let count_within = make_pipeline("count_within");
        let gather_within = make_pipeline("gather_within");

        if let Some(err) = pollster::block_on(ctx.device.pop_error_scope()) {
            return Err(GpuError::ShaderCompilation(err.to_string()));
        }

        Ok(Self {
            knn,
            count_within,
            gather_within,
            bind_group_layout,
        })
    }

    /// Find the `k` nearest points with squared distance `<= max_dist_sq`.
    ///
    /// Pass `f32::MAX` as `max_dist_sq` for an uncapped k-NN search.
    ///
    /// # Errors
    ///
    /// - [`GpuError::TooManyNeighbors`] if `k > MAX_GPU_KNN`
    /// - [`GpuError::OutOfMemory`] if a buffer exceeds device limits
    /// - [`GpuError::BufferMapping`] if results cannot be read back
    pub fn knn(
        &self,
        ctx: &GpuContext,
        dataset: &PointBuffers,
        queries: &[[f32; 3]],
        k: usize,
        max_dist_sq: f32,
    ) -> GpuResult<GpuKnnResult> {
        if k > MAX_GPU_KNN {
            return Err(GpuError::TooManyNeighbors { k, max: MAX_GPU_KNN });
        }

        let start = Instant::now();
        let mut result = GpuKnnResult {
            indices: Vec::with_capacity(queries.len() * k),
            distances: Vec::with_capacity(queries.len() * k),
            counts: Vec::with_capacity(queries.len()),
            k,
            compute_time_ms: 0.0,
        };

        if k == 0 || dataset.is_empty() {
            result.counts.resize(queries.len(), 0);
            result.indices.resize(queries.len() * k, -1);
            result.distances.resize(queries.len() * k, 0.0);
            return Ok(result);
        }

        let chunk_size = max_queries_per_dispatch(ctx, k * std::mem::size_of::<i32>());
        let k_u32 = gpu_len(k)?;
        let unused_offsets = upload_u32(ctx, "unused_offsets", &[]);

        for (chunk_index, chunk) in queries.chunks(chunk_size).enumerate() {
            let n = chunk.len();
            debug!(chunk = chunk_index, queries = n, k, "Dispatching k-NN chunk");

            let params = GpuSearchParams::new(dataset.point_count, gpu_len(n)?, k_u32, max_dist_sq);
            let params_buf = upload_params(ctx, &params);
            let query_buf = upload_points(ctx, "knn_queries", chunk);
            let out_indices = allocate_output::<i32>(ctx, "knn_indices", n * k)?;
            let out_distances = allocate_output::<f32>(ctx, "knn_distances", n * k)?;
            let counts = allocate_output::<u32>(ctx, "knn_counts", n)?;

            let bind_group = self.bind_group(
                ctx,
                &SearchBindings {
                    points: &dataset.points,
                    queries: &query_buf,
                    params: &params_buf,
                    out_indices: &out_indices,
                    out_distances: &out_distances,
                    counts: &counts,
                    offsets: &unused_offsets,
                },
            );
            self.dispatch(ctx, &self.knn, &bind_group, params.num_queries);

            result.indices.extend(download_buffer::<i32>(ctx, &out_indices, n * k)?);
            result.distances.extend(download_buffer::<f32>(ctx, &out_distances, n * k)?);
            result.counts.extend(download_buffer::<u32>(ctx, &counts, n)?);
        }

        result.compute_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            queries = queries.len(),
            points = dataset.len(),
            k,
            time_ms = result.compute_time_ms,
            "GPU k-NN search complete"
        );
        Ok(result)
    }

    /// Find every point within `radius` of each query.
    ///
    /// Runs `count_within`, a host prefix sum, then `gather_within`.
    /// A non-positive or NaN radius matches nothing.
    ///
    /// # Errors
    ///
    /// - [`GpuError::OutOfMemory`] if the match set exceeds device limits
    /// - [`GpuError::BufferMapping`] if results cannot be read back
    pub fn fixed_radius(
        &self,
        ctx: &GpuContext,
        dataset: &PointBuffers,
        queries: &[[f32; 3]],
        radius: f32,
    ) -> GpuResult<GpuRadiusResult> {
        let start = Instant::now();
        let mut result = GpuRadiusResult::default();

        if radius.is_nan() || radius <= 0.0 || dataset.is_empty() {
            result.counts.resize(queries.len(), 0);
            return Ok(result);
        }

        let max_dist_sq = radius * radius;
        let chunk_size = max_queries_per_dispatch(ctx, std::mem::size_of::<u32>());
        let placeholder_offsets = upload_u32(ctx, "unused_offsets", &[]);

        for (chunk_index, chunk) in queries.chunks(chunk_size).enumerate() {
            let n = chunk.len();
            let params = GpuSearchParams::new(dataset.point_count, gpu_len(n)?, 0, max_dist_sq);
            let params_buf = upload_params(ctx, &params);
            let query_buf = upload_points(ctx, "radius_queries", chunk);
            let counts = allocate_output::<u32>(ctx, "radius_counts", n)?;

            // Pass 1: counts only; the output buffers are placeholders.
            let unused_indices = allocate_output::<i32>(ctx, "unused_indices", 0)?;
            let unused_distances = allocate_output::<f32>(ctx, "unused_distances", 0)?;
            let count_group = self.bind_group(
                ctx,
                &SearchBindings {
                    points: &dataset.points,
                    queries: &query_buf,
                    params: &params_buf,
                    out_indices: &unused_indices,
                    out_distances: &unused_distances,
                    counts: &counts,
                    offsets: &placeholder_offsets,
                },
            );
            self.dispatch(ctx, &self.count_within, &count_group, params.num_queries);
            let chunk_counts = download_buffer::<u32>(ctx, &counts, n)?;

            let (offsets, total) = prefix_offsets(&chunk_counts)?;
            debug!(chunk = chunk_index, queries = n, matches = total, "Dispatching radius gather");

            if total > 0 {
                let offsets_buf = upload_u32(ctx, "radius_offsets", &offsets);
                let out_indices = allocate_output::<i32>(ctx, "radius_indices", total)?;
                let out_distances = allocate_output::<f32>(ctx, "radius_distances", total)?;
                let gather_group = self.bind_group(
                    ctx,
                    &SearchBindings {
                        points: &dataset.points,
                        queries: &query_buf,
                        params: &params_buf,
                        out_indices: &out_indices,
                        out_distances: &out_distances,
                        counts: &counts,
                        offsets: &offsets_buf,
                    },
                );
                self.dispatch(ctx, &self.gather_within, &gather_group, params.num_queries);

                result.indices.extend(download_buffer::<i32>(ctx, &out_indices, total)?);
                result.distances.extend(download_buffer::<f32>(ctx, &out_distances, total)?);
            }
            result.counts.extend(chunk_counts);
        }

        result.compute_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            queries = queries.len(),
            points = dataset.len(),
            matches = result.indices.len(),
            time_ms = result.compute_time_ms,
            "GPU fixed-radius search complete"
        );
        Ok(result)
    }

    fn bind_group(&self, ctx: &GpuContext, b: &SearchBindings<'_>) -> BindGroup {
        let buffers = [
            b.points,
            b.queries,
            b.params,
            b.out_indices,
            b.out_distances,
            b.counts,
            b.offsets,
        ];
        let entries: Vec<wgpu::BindGroupEntry<'_>> = (0_u32..)
            .zip(buffers)
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("nns_bind_group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        })
    }

    #[allow(clippy::unused_self)]
    fn dispatch(
        &self,
        ctx: &GpuContext,
        pipeline: &ComputePipeline,
        bind_group: &BindGroup,
        num_queries: u32,
    ) {
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("nns_encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("nns_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(num_queries.div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        ctx.queue.submit([encoder.finish()]);
    }
}

impl std::fmt::Debug for SearchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchPipeline").finish_non_exhaustive()
    }
}

/// Queries per dispatch given the output bytes each query writes.
fn max_queries_per_dispatch(ctx: &GpuContext, bytes_per_query: usize) -> usize {
    let by_dispatch = ctx.max_workgroups_per_dimension() as usize * WORKGROUP_SIZE as usize;
    let per_query = bytes_per_query.max(std::mem::size_of::<GpuPoint>());
    let by_storage = ctx.max_storage_buffer_size() as usize / per_query;
    by_dispatch.min(by_storage).max(1)
}

/// Exclusive prefix sum of `counts` and the total.
fn prefix_offsets(counts: &[u32]) -> GpuResult<(Vec<u32>, usize)> {
    let mut offsets = Vec::with_capacity(counts.len());
    let mut total: usize = 0;
    for &c in counts {
        offsets.push(gpu_len(total)?);
        total += c as usize;
    }
    // Offsets are u32 in the shader, so the total must fit too.
    gpu_len(total)?;
    Ok((offsets, total))
}

/// Run a k-NN search on the global GPU context.
///
/// Uploads `points`, compiles the pipeline, and searches. For repeated
/// queries against the same points keep a [`SearchPipeline`] and
/// [`PointBuffers`] instead.
///
/// # Errors
///
/// - [`GpuError::NotAvailable`] if no GPU is available
/// - any error from [`SearchPipeline::knn`]
pub fn knn_search_gpu(points: &[[f32; 3]], queries: &[[f32; 3]], k: usize) -> GpuResult<GpuKnnResult> {
    let ctx = GpuContext::try_get()?;
    let dataset = PointBuffers::upload(ctx, points)?;
    SearchPipeline::new(ctx)?.knn(ctx, &dataset, queries, k, f32::MAX)
}

/// Run a fixed-radius search on the global GPU context.
///
/// # Errors
///
/// - [`GpuError::NotAvailable`] if no GPU is available
/// - any error from [`SearchPipeline::fixed_radius`]
pub fn radius_search_gpu(
    points: &[[f32; 3]],
    queries: &[[f32; 3]],
    radius: f32,
) -> GpuResult<GpuRadiusResult> {
    let ctx = GpuContext::try_get()?;
    let dataset = PointBuffers::upload(ctx, points)?;
    SearchPipeline::new(ctx)?.fixed_radius(ctx, &dataset, queries, radius)
}

/// Like [`knn_search_gpu`], returning `None` on any GPU failure.
#[must_use]
pub fn try_knn_search_gpu(points: &[[f32; 3]], queries: &[[f32; 3]], k: usize) -> Option<GpuKnnResult> {
    knn_search_gpu(points, queries, k).ok()
}
