//! Backend dispatch between the host and device indices.

use cloud_gpu::GpuContext;
use cloud_types::{Device, Tensor};

use crate::config::SearchConfig;
use crate::device::DeviceIndex;
use crate::error::{NnsError, NnsResult};
use crate::host::HostIndex;
use crate::kdtree::Neighbor;
use crate::kind::SearchKind;

/// A spatial index bound to the device of its reference points.
#[derive(Debug)]
pub enum SpatialIndex {
    /// CPU kd-tree and hash grid.
    Host(HostIndex),
    /// GPU brute-force pipelines.
    Device(DeviceIndex),
}

/// Devices an index can currently be built on.
///
/// Always contains [`Device::Cpu`]; contains `Device::Gpu(0)` when a GPU
/// adapter can be initialized.
///
/// # Example
///
/// ```
/// use cloud_nns::available_devices;
/// use cloud_types::Device;
///
/// assert_eq!(available_devices()[0], Device::Cpu);
/// ```
#[must_use]
pub fn available_devices() -> Vec<Device> {
    let mut devices = vec![Device::Cpu];
    if GpuContext::is_available() {
        devices.push(Device::Gpu(0));
    }
    devices
}

/// Reads an `(N, 3)` float tensor into rows.
pub(crate) fn tensor_rows(points: &Tensor) -> Vec<[f64; 3]> {
    points
        .to_f64_vec()
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect()
}

/// Validates reference points: float dtype, shape `(N, 3)`, `N > 0`.
pub(crate) fn check_dataset(points: &Tensor) -> NnsResult<usize> {
    points.check_float()?;
    let n = points.check_nx3()?;
    if n == 0 {
        return Err(NnsError::EmptyDataset);
    }
    Ok(n)
}

impl SpatialIndex {
    /// Build an index on the device `points` lives on.
    ///
    /// # Errors
    ///
    /// - [`NnsError::Tensor`] if `points` is not a float `(N, 3)` tensor
    /// - [`NnsError::EmptyDataset`] if `N == 0`
    /// - [`NnsError::DeviceUnavailable`] if the tensor's GPU is absent
    pub fn build(points: &Tensor, config: &SearchConfig) -> NnsResult<Self> {
        check_dataset(points)?;
        let rows = tensor_rows(points);
        match points.device() {
            Device::Cpu => Ok(Self::Host(HostIndex::build(rows, config))),
            device @ Device::Gpu(_) => Ok(Self::Device(DeviceIndex::build(&rows, device, config)?)),
        }
    }

    /// The device the index lives on.
    #[must_use]
    pub const fn device(&self) -> Device {
        match self {
            Self::Host(_) => Device::Cpu,
            Self::Device(index) => index.device(),
        }
    }

    /// Number of reference points.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Host(index) => index.len(),
            Self::Device(index) => index.len(),
        }
    }

    /// Returns true if there are no reference points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `kind` can run on this index.
    #[must_use]
    pub const fn supports(&self, kind: SearchKind) -> bool {
        kind.supported_on(self.device())
    }

    /// Build any radius-specific acceleration structure.
    ///
    /// The device backend needs none.
    pub fn prepare_fixed_radius(&mut self, radius: f64) {
        if let Self::Host(index) = self {
            index.prepare_fixed_radius(radius);
        }
    }

    /// The `k` nearest neighbours of each query.
    ///
    /// # Errors
    ///
    /// Returns [`NnsError::Gpu`] on device failures.
    pub fn knn(&self, queries: &[[f64; 3]], k: usize) -> NnsResult<Vec<Vec<Neighbor>>> {
        match self {
            Self::Host(index) => Ok(index.knn(queries, k)),
            Self::Device(index) => index.knn(queries, k),
        }
    }

    /// Every neighbour within `radius` of each query.
    ///
    /// # Errors
    ///
    /// Returns [`NnsError::Gpu`] on device failures.
    pub fn fixed_radius(&self, queries: &[[f64; 3]], radius: f64) -> NnsResult<Vec<Vec<Neighbor>>> {
        match self {
            Self::Host(index) => Ok(index.fixed_radius(queries, radius)),
            Self::Device(index) => index.fixed_radius(queries, radius),
        }
    }

    /// At most `max_knn` nearest neighbours within `radius` of each query.
    ///
    /// # Errors
    ///
    /// Returns [`NnsError::Gpu`] on device failures.
    pub fn hybrid(&self, queries: &[[f64; 3]], radius: f64, max_knn: usize) -> NnsResult<Vec<Vec<Neighbor>>> {
        match self {
            Self::Host(index) => Ok(index.hybrid(queries, radius, max_knn)),
            Self::Device(index) => index.hybrid(queries, radius, max_knn),
        }
    }

    /// Every neighbour within a per-query radius.
    ///
    /// # Errors
    ///
    /// Returns [`NnsError::Unsupported`] on a device index.
    pub fn multi_radius(&self, queries: &[[f64; 3]], radii: &[f64]) -> NnsResult<Vec<Vec<Neighbor>>> {
        match self {
            Self::Host(index) => Ok(index.multi_radius(queries, radii)),
            Self::Device(_) => Err(NnsError::Unsupported {
                kind: SearchKind::MultiRadius,
                device: self.device(),
            }),
        }
    }
}
