//! Tensor element types.

use std::fmt;
use std::str::FromStr;

use crate::error::TensorError;

/// Element type of a [`Tensor`](crate::Tensor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Dtype {
    /// 32-bit IEEE float.
    Float32,
    /// 64-bit IEEE float.
    Float64,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer (indices and counts).
    Int64,
}

impl Dtype {
    /// Size of one element in bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use cloud_types::Dtype;
    ///
    /// assert_eq!(Dtype::Float32.byte_size(), 4);
    /// assert_eq!(Dtype::Int64.byte_size(), 8);
    /// ```
    #[must_use]
    pub const fn byte_size(self) -> usize {
        match self {
            Self::Float32 | Self::Int32 => 4,
            Self::Float64 | Self::Int64 => 8,
        }
    }

    /// Returns true for `Float32` and `Float64`.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
        };
        f.write_str(name)
    }
}

impl FromStr for Dtype {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "float32" | "f32" => Ok(Self::Float32),
            "float64" | "f64" => Ok(Self::Float64),
            "int32" | "i32" => Ok(Self::Int32),
            "int64" | "i64" => Ok(Self::Int64),
            _ => Err(TensorError::InvalidDtype(s.to_string())),
        }
    }
}
