//! Execution targets.

use std::fmt;
use std::str::FromStr;

use crate::error::TensorError;

/// The memory/compute domain a tensor or index belongs to.
///
/// A device is a capability tag: tensors always keep their values in host
/// memory, and accelerator backends upload them when an operation runs on
/// [`Device::Gpu`]. Every operation checks that its operands share a device.
///
/// # Example
///
/// ```
/// use cloud_types::Device;
///
/// let gpu: Device = "CUDA:0".parse().unwrap();
/// assert_eq!(gpu, Device::Gpu(0));
/// assert_eq!(gpu.to_string(), "GPU:0");
///
/// assert_eq!(Device::default(), Device::Cpu);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Device {
    /// Host memory, computed on CPU threads.
    #[default]
    Cpu,

    /// Accelerator memory on the GPU with the given ordinal.
    Gpu(u32),
}

impl Device {
    /// Returns true for [`Device::Cpu`].
    #[must_use]
    pub const fn is_cpu(self) -> bool {
        matches!(self, Self::Cpu)
    }

    /// Returns true for any [`Device::Gpu`].
    #[must_use]
    pub const fn is_gpu(self) -> bool {
        matches!(self, Self::Gpu(_))
    }

    /// Device ordinal (always 0 for the CPU).
    #[must_use]
    pub const fn ordinal(self) -> u32 {
        match self {
            Self::Cpu => 0,
            Self::Gpu(id) => id,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU:0"),
            Self::Gpu(id) => write!(f, "GPU:{id}"),
        }
    }
}

impl FromStr for Device {
    type Err = TensorError;

    /// Parses `CPU`, `CPU:0`, `GPU:1` or `CUDA:1` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TensorError::InvalidDevice(s.to_string());
        let (kind, ordinal) = match s.split_once(':') {
            Some((kind, id)) => (kind, id.trim().parse::<u32>().map_err(|_| invalid())?),
            None => (s, 0),
        };

        match kind.trim().to_ascii_uppercase().as_str() {
            "CPU" if ordinal == 0 => Ok(Self::Cpu),
            "GPU" | "CUDA" => Ok(Self::Gpu(ordinal)),
            _ => Err(invalid()),
        }
    }
}
