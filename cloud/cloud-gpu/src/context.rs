//! GPU context management.
//!
//! This module provides lazy initialization of the GPU device and queue,
//! with fallback detection when no adapter is present.
//!
//! # Example
//!
//! ```no_run
//! use cloud_gpu::context::GpuContext;
//!
//! if let Some(ctx) = GpuContext::get() {
//!     println!("GPU available: {}", ctx.adapter_info.name);
//! } else {
//!     println!("No GPU available");
//! }
//! ```

use std::sync::OnceLock;

use tracing::{debug, info, warn};
use wgpu::{Device, DeviceDescriptor, Instance, Queue, RequestAdapterOptions};

use crate::error::{GpuError, GpuResult};

/// Global GPU context, lazily initialized on first access.
static GPU_CONTEXT: OnceLock<Option<GpuContext>> = OnceLock::new();

/// GPU device preference for adapter selection.
///
/// This controls which GPU is selected when multiple are available.
///
/// # Example
///
/// ```
/// use cloud_gpu::context::GpuDevicePreference;
///
/// assert_eq!(GpuDevicePreference::default(), GpuDevicePreference::Auto);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GpuDevicePreference {
    /// Automatically select the best available device.
    #[default]
    Auto,

    /// Prefer a high-performance discrete GPU.
    HighPerformance,

    /// Prefer a low-power integrated GPU.
    LowPower,
}

/// Information about the GPU adapter.
#[derive(Debug, Clone)]
pub struct GpuAdapterInfo {
    /// Device name (e.g., "NVIDIA RTX 3080").
    pub name: String,

    /// Vendor identifier.
    pub vendor: String,

    /// Device type (e.g., Discrete, Integrated).
    pub device_type: String,

    /// Backend API (e.g., Vulkan, Metal, Dx12).
    pub backend: String,
}

impl From<wgpu::AdapterInfo> for GpuAdapterInfo {
    fn from(info: wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name,
            vendor: format!("{}", info.vendor),
            device_type: format!("{:?}", info.device_type),
            backend: format!("{:?}", info.backend),
        }
    }
}

/// GPU context containing device, queue, and adapter information.
///
/// This is a lazily initialized process-wide singleton. Use
/// [`GpuContext::get()`] to access it, or [`GpuContext::try_get()`] when an
/// error is more convenient than an `Option`.
///
/// # Thread Safety
///
/// The context is initialized once and is safe to share between threads.
pub struct GpuContext {
    /// The WGPU device for creating resources and pipelines.
    pub device: Device,

    /// The command queue for submitting work.
    pub queue: Queue,

    /// Information about the GPU adapter.
    pub adapter_info: GpuAdapterInfo,

    /// Device limits for resource allocation.
    pub limits: wgpu::Limits,
}

impl GpuContext {
    /// Get or initialize the global GPU context with [`GpuDevicePreference::Auto`].
    ///
    /// Returns `None` if no GPU is available.
    #[must_use]
    pub fn get() -> Option<&'static Self> {
        Self::get_with(GpuDevicePreference::Auto)
    }

    /// Get or initialize the global GPU context.
    ///
    /// `preference` only takes effect on the call that initializes the
    /// context; later calls return the existing context.
    #[must_use]
    pub fn get_with(preference: GpuDevicePreference) -> Option<&'static Self> {
        GPU_CONTEXT
            .get_or_init(|| match pollster::block_on(Self::try_init(preference)) {
                Ok(ctx) => {
                    info!(
                        adapter = %ctx.adapter_info.name,
                        backend = %ctx.adapter_info.backend,
                        "GPU context initialized"
                    );
                    Some(ctx)
                }
                Err(e) => {
                    warn!("GPU initialization failed: {}", e);
                    None
                }
            })
            .as_ref()
    }

    /// Try to get the global GPU context, returning an error if unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::NotAvailable`] if no GPU is available.
    pub fn try_get() -> GpuResult<&'static Self> {
        Self::get().ok_or(GpuError::NotAvailable)
    }

    /// Like [`GpuContext::try_get`], honouring `preference` on first use.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::NotAvailable`] if no GPU is available.
    pub fn try_get_with(preference: GpuDevicePreference) -> GpuResult<&'static Self> {
        Self::get_with(preference).ok_or(GpuError::NotAvailable)
    }

    /// Check if a GPU is available.
    ///
    /// Note: this initializes the context on first call.
    #[must_use]
    pub fn is_available() -> bool {
        Self::get().is_some()
    }

    async fn try_init(preference: GpuDevicePreference) -> GpuResult<Self> {
        debug!("Initializing GPU context with preference: {:?}", preference);

        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_preference = match preference {
            GpuDevicePreference::Auto | GpuDevicePreference::HighPerformance => {
                wgpu::PowerPreference::HighPerformance
            }
            GpuDevicePreference::LowPower => wgpu::PowerPreference::LowPower,
        };

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(GpuError::NotAvailable)?;

        let adapter_info = adapter.get_info();
        debug!(
            name = %adapter_info.name,
            device_type = ?adapter_info.device_type,
            backend = ?adapter_info.backend,
            "GPU adapter found"
        );

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("cloud-gpu"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| GpuError::Execution(format!("device request failed: {e}")))?;

        let limits = device.limits();

        Ok(Self {
            device,
            queue,
            adapter_info: adapter_info.into(),
            limits,
        })
    }

    /// Maximum size of a single storage buffer binding in bytes.
    #[must_use]
    pub const fn max_storage_buffer_size(&self) -> u32 {
        self.limits.max_storage_buffer_binding_size
    }

    /// Maximum number of workgroups in one dispatch dimension.
    #[must_use]
    pub const fn max_workgroups_per_dimension(&self) -> u32 {
        self.limits.max_compute_workgroups_per_dimension
    }

    /// Fails with [`GpuError::OutOfMemory`] if `bytes` exceeds the storage
    /// binding limit.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn check_binding_size(&self, bytes: u64) -> GpuResult<()> {
        let available = u64::from(self.max_storage_buffer_size());
        if bytes > available {
            return Err(GpuError::OutOfMemory {
                required: bytes,
                available,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter_info", &self.adapter_info)
            .field(
                "max_storage_buffer_size",
                &self.limits.max_storage_buffer_binding_size,
            )
            .finish_non_exhaustive()
    }
}
