//! Core value types for CloudForge point-cloud processing.
//!
//! This crate provides the dense [`Tensor`] shared by every other CloudForge
//! crate, together with its element type ([`Dtype`]) and execution target
//! ([`Device`]).
//!
//! # Devices
//!
//! A [`Device`] is a tag, not an allocation: tensor values always live in host
//! memory and GPU backends upload them on demand. Operations compare device
//! tags at their boundaries and reject mixed-device operands with
//! [`TensorError::DeviceMismatch`].
//!
//! # Errors
//!
//! [`ErrorCategory`] is the coarse classification every CloudForge error enum
//! exposes through a `category()` method:
//!
//! | Category | Meaning |
//! |----------|---------|
//! | `State` | operation called before the required preparation step |
//! | `Input` | malformed shape, dtype, device or parameter |
//! | `Capability` | unsupported on the selected device |
//! | `Backend` | accelerator failure |
//!
//! # Example
//!
//! ```
//! use cloud_types::{Device, Dtype, Tensor};
//!
//! let points = Tensor::from_rows(&[[0.0_f64, 0.0, 0.0], [1.0, 2.0, 3.0]], Device::Cpu);
//! assert_eq!(points.check_nx3().unwrap(), 2);
//!
//! let on_gpu = points.to_device(Device::Gpu(0));
//! assert!(on_gpu.check_device(Device::Cpu).is_err());
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod device;
mod dtype;
mod error;
mod tensor;

pub use device::Device;
pub use dtype::Dtype;
pub use error::{ErrorCategory, TensorError, TensorResult};
pub use tensor::{Element, Shape, Tensor, TensorData};
