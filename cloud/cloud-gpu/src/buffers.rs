//! GPU buffer types for point and search data.
//!
//! # Memory Layout
//!
//! - [`GpuPoint`]: 16 bytes (vec4, the fourth lane is padding)
//! - [`GpuSearchParams`]: 32 bytes (aligned for a uniform buffer)

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;
use wgpu::{Buffer, BufferUsages};

use crate::context::GpuContext;
use crate::error::{GpuError, GpuResult};

/// GPU-friendly point with vec4 alignment.
///
/// # Example
///
/// ```
/// use cloud_gpu::buffers::GpuPoint;
///
/// let p = GpuPoint::new([1.0, 2.0, 3.0]);
/// assert_eq!(p.position[3], 0.0);
/// assert_eq!(std::mem::size_of::<GpuPoint>(), 16);
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuPoint {
    /// Position (xyz) + padding.
    pub position: [f32; 4],
}

impl GpuPoint {
    /// Create a GPU point from a position.
    #[must_use]
    pub const fn new(p: [f32; 3]) -> Self {
        Self {
            position: [p[0], p[1], p[2], 0.0],
        }
    }
}

/// Uniform parameters shared by every search kernel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuSearchParams {
    /// Number of reference points.
    pub num_points: u32,
    /// Number of queries in this dispatch.
    pub num_queries: u32,
    /// Neighbour slots per query (k-NN only).
    pub k: u32,
    _pad0: u32,
    /// Squared distance cap; `f32::MAX` disables it.
    pub max_dist_sq: f32,
    _pad1: [u32; 3],
}

impl GpuSearchParams {
    /// Create search parameters.
    ///
    /// # Example
    ///
    /// ```
    /// use cloud_gpu::buffers::GpuSearchParams;
    ///
    /// let params = GpuSearchParams::new(100, 8, 4, f32::MAX);
    /// assert_eq!(params.k, 4);
    /// assert_eq!(std::mem::size_of::<GpuSearchParams>(), 32);
    /// ```
    #[must_use]
    pub const fn new(num_points: u32, num_queries: u32, k: u32, max_dist_sq: f32) -> Self {
        Self {
            num_points,
            num_queries,
            k,
            _pad0: 0,
            max_dist_sq,
            _pad1: [0; 3],
        }
    }
}

/// Byte length of `count` elements of `T`, never zero.
///
/// WGPU rejects zero-sized bindings, so empty buffers hold one element.
#[must_use]
pub fn binding_bytes<T>(count: usize) -> u64 {
    (count.max(1) * std::mem::size_of::<T>()) as u64
}

/// Converts a host length to the `u32` the kernels index with.
///
/// # Errors
///
/// Returns [`GpuError::OutOfMemory`] if `count` does not fit in `u32`.
pub fn gpu_len(count: usize) -> GpuResult<u32> {
    u32::try_from(count).map_err(|_| GpuError::OutOfMemory {
        required: count as u64,
        available: u64::from(u32::MAX),
    })
}

/// Reference points uploaded to a GPU storage buffer.
///
/// The dataset is uploaded once when an index is built and reused by every
/// query.
pub struct PointBuffers {
    /// Point storage buffer (read-only in shaders).
    pub points: Buffer,
    /// Number of points.
    pub point_count: u32,
}

impl PointBuffers {
    /// Upload points to the GPU.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::OutOfMemory`] if the points do not fit in one
    /// storage binding.
    pub fn upload(ctx: &GpuContext, points: &[[f32; 3]]) -> GpuResult<Self> {
        let point_count = gpu_len(points.len())?;
        ctx.check_binding_size(binding_bytes::<GpuPoint>(points.len()))?;

        let buffer = upload_points(ctx, "cloud_points", points);
        Ok(Self {
            points: buffer,
            point_count,
        })
    }

    /// Number of points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.point_count as usize
    }

    /// Returns true if no points were uploaded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.point_count == 0
    }
}

impl std::fmt::Debug for PointBuffers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointBuffers")
            .field("point_count", &self.point_count)
            .finish_non_exhaustive()
    }
}

/// Uploads positions as a vec4 storage buffer.
pub(crate) fn upload_points(ctx: &GpuContext, label: &str, points: &[[f32; 3]]) -> Buffer {
    let mut gpu_points: Vec<GpuPoint> = points.iter().copied().map(GpuPoint::new).collect();
    if gpu_points.is_empty() {
        gpu_points.push(GpuPoint::zeroed());
    }
    ctx.device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&gpu_points),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        })
}

/// Uploads a uniform parameter block.
pub(crate) fn upload_params(ctx: &GpuContext, params: &GpuSearchParams) -> Buffer {
    ctx.device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("search_params"),
            contents: bytemuck::bytes_of(params),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        })
}

/// Uploads a read-only `u32` storage buffer.
pub(crate) fn upload_u32(ctx: &GpuContext, label: &str, values: &[u32]) -> Buffer {
    let contents: &[u32] = if values.is_empty() { &[0] } else { values };
    ctx.device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(contents),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        })
}

/// Allocates a writable storage buffer for `count` elements of `T`.
///
/// # Errors
///
/// Returns [`GpuError::OutOfMemory`] above the binding limit.
pub(crate) fn allocate_output<T>(ctx: &GpuContext, label: &str, count: usize) -> GpuResult<Buffer> {
    let size = binding_bytes::<T>(count);
    ctx.check_binding_size(size)?;
    Ok(ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    }))
}

/// Download the first `count` elements of a buffer to CPU memory.
///
/// # Errors
///
/// Returns [`GpuError::BufferMapping`] if the download fails.
pub fn download_buffer<T: Pod>(ctx: &GpuContext, buffer: &Buffer, count: usize) -> GpuResult<Vec<T>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let size = (count * std::mem::size_of::<T>()) as u64;
    if size > buffer.size() {
        return Err(GpuError::BufferMapping(format!(
            "requested {size} bytes from a {} byte buffer",
            buffer.size()
        )));
    }

    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("search_staging"),
        size,
        usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("search_download"),
        });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
    ctx.queue.submit([encoder.finish()]);

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        // The receiver outlives the poll below.
        let _ = tx.send(result);
    });

    ctx.device.poll(wgpu::Maintain::Wait);

    rx.recv()
        .map_err(|_| GpuError::BufferMapping("channel closed".into()))?
        .map_err(|e| GpuError::BufferMapping(format!("{e:?}")))?;

    let data = slice.get_mapped_range();
    let values: Vec<T> = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    staging.unmap();

    Ok(values)
}
