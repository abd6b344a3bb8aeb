//! Dense row-major tensors with an explicit dtype and device tag.

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
use smallvec::SmallVec;

use crate::device::Device;
use crate::dtype::Dtype;
use crate::error::{TensorError, TensorResult};

/// Tensor shape. Point sets are `(N, 3)`, so four inline dims cover every
/// shape used in the workspace without allocating.
pub type Shape = SmallVec<[usize; 4]>;

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
}

/// Scalar types that can be stored in a [`Tensor`].
///
/// Sealed: implemented for `f32`, `f64`, `i32` and `i64` only.
pub trait Element: sealed::Sealed + Copy + Send + Sync + PartialOrd + std::fmt::Debug + 'static {
    /// The dtype tag for this scalar.
    const DTYPE: Dtype;

    /// Wraps owned values into typed storage.
    fn into_data(values: Vec<Self>) -> TensorData;

    /// Borrows storage if it holds this scalar type.
    fn slice(data: &TensorData) -> Option<&[Self]>;

    /// Mutably borrows storage if it holds this scalar type.
    fn slice_mut(data: &mut TensorData) -> Option<&mut [Self]>;

    /// Widens to `f64`.
    fn to_f64(self) -> f64;

    /// Narrows from `f64` (saturating for integers).
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: Dtype = $dtype;

            fn into_data(values: Vec<Self>) -> TensorData {
                TensorData::$variant(values)
            }

            fn slice(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(data: &mut TensorData) -> Option<&mut [Self]> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            #[allow(clippy::cast_precision_loss, clippy::cast_lossless, clippy::unnecessary_cast)]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[allow(clippy::cast_possible_truncation, clippy::unnecessary_cast)]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }
        }
    };
}

impl_element!(f32, F32, Dtype::Float32);
impl_element!(f64, F64, Dtype::Float64);
impl_element!(i32, I32, Dtype::Int32);
impl_element!(i64, I64, Dtype::Int64);

/// Typed contiguous storage behind a [`Tensor`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TensorData {
    /// `Float32` values.
    F32(Vec<f32>),
    /// `Float64` values.
    F64(Vec<f64>),
    /// `Int32` values.
    I32(Vec<i32>),
    /// `Int64` values.
    I64(Vec<i64>),
}

impl TensorData {
    /// The dtype of the stored values.
    #[must_use]
    pub const fn dtype(&self) -> Dtype {
        match self {
            Self::F32(_) => Dtype::Float32,
            Self::F64(_) => Dtype::Float64,
            Self::I32(_) => Dtype::Int32,
            Self::I64(_) => Dtype::Int64,
        }
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
        }
    }

    /// Returns true if no values are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts every value to `f64`.
    #[must_use]
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            Self::F32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::F64(v) => v.clone(),
            Self::I32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::I64(v) => v.iter().map(|&x| x.to_f64()).collect(),
        }
    }

    /// Builds storage of `dtype` from `f64` values.
    #[must_use]
    pub fn from_f64(values: &[f64], dtype: Dtype) -> Self {
        fn cast<T: Element>(values: &[f64]) -> TensorData {
            T::into_data(values.iter().map(|&x| T::from_f64(x)).collect())
        }
        match dtype {
            Dtype::Float32 => cast::<f32>(values),
            Dtype::Float64 => Self::F64(values.to_vec()),
            Dtype::Int32 => cast::<i32>(values),
            Dtype::Int64 => cast::<i64>(values),
        }
    }

    fn value_f64(&self, i: usize) -> f64 {
        match self {
            Self::F32(v) => f64::from(v[i]),
            Self::F64(v) => v[i],
            Self::I32(v) => f64::from(v[i]),
            Self::I64(v) => v[i].to_f64(),
        }
    }

    fn set_f64(&mut self, i: usize, value: f64) {
        match self {
            Self::F32(v) => v[i] = f32::from_f64(value),
            Self::F64(v) => v[i] = value,
            Self::I32(v) => v[i] = i32::from_f64(value),
            Self::I64(v) => v[i] = i64::from_f64(value),
        }
    }

    fn extend_from(&mut self, other: &Self) -> bool {
        match (self, other) {
            (Self::F32(a), Self::F32(b)) => a.extend_from_slice(b),
            (Self::F64(a), Self::F64(b)) => a.extend_from_slice(b),
            (Self::I32(a), Self::I32(b)) => a.extend_from_slice(b),
            (Self::I64(a), Self::I64(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }
}

/// A dense, row-major, n-dimensional array.
///
/// Values always live in host memory; [`Tensor::device`] records the
/// execution target that operations on this tensor must run on.
///
/// # Example
///
/// ```
/// use cloud_types::{Device, Dtype, Tensor};
///
/// let t = Tensor::from_rows(&[[0.0_f32, 1.0, 2.0], [3.0, 4.0, 5.0]], Device::Cpu);
/// assert_eq!(t.shape(), &[2, 3]);
/// assert_eq!(t.dtype(), Dtype::Float32);
///
/// let f64s = t.to_dtype(Dtype::Float64);
/// assert_eq!(f64s.as_slice::<f64>().unwrap()[4], 4.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tensor {
    data: TensorData,
    shape: Shape,
    device: Device,
}

fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

impl Tensor {
    /// Creates a tensor from owned values and a shape.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ElementCount`] if `values.len()` does not match
    /// the product of `shape`.
    pub fn from_vec<T: Element>(values: Vec<T>, shape: &[usize], device: Device) -> TensorResult<Self> {
        Self::from_data(T::into_data(values), shape, device)
    }

    /// Creates a tensor from typed storage and a shape.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ElementCount`] on a length mismatch.
    pub fn from_data(data: TensorData, shape: &[usize], device: Device) -> TensorResult<Self> {
        let expected = element_count(shape);
        if data.len() != expected {
            return Err(TensorError::ElementCount {
                shape: shape.to_vec(),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            shape: Shape::from_slice(shape),
            device,
        })
    }

    /// Creates an `(N, C)` tensor from fixed-width rows.
    #[must_use]
    pub fn from_rows<T: Element, const C: usize>(rows: &[[T; C]], device: Device) -> Self {
        let values: Vec<T> = rows.iter().flat_map(|row| row.iter().copied()).collect();
        Self {
            data: T::into_data(values),
            shape: Shape::from_slice(&[rows.len(), C]),
            device,
        }
    }

    /// Creates a tensor of `dtype` from `f64` values.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ElementCount`] on a length mismatch.
    pub fn from_f64(values: &[f64], shape: &[usize], dtype: Dtype, device: Device) -> TensorResult<Self> {
        Self::from_data(TensorData::from_f64(values, dtype), shape, device)
    }

    /// A tensor filled with `value`.
    #[must_use]
    pub fn full(shape: &[usize], value: f64, dtype: Dtype, device: Device) -> Self {
        let values = vec![value; element_count(shape)];
        Self {
            data: TensorData::from_f64(&values, dtype),
            shape: Shape::from_slice(shape),
            device,
        }
    }

    /// A tensor of zeros.
    #[must_use]
    pub fn zeros(shape: &[usize], dtype: Dtype, device: Device) -> Self {
        Self::full(shape, 0.0, dtype, device)
    }

    /// A tensor of ones.
    #[must_use]
    pub fn ones(shape: &[usize], dtype: Dtype, device: Device) -> Self {
        Self::full(shape, 1.0, dtype, device)
    }

    /// An `(N, 3)` tensor from nalgebra points.
    #[must_use]
    pub fn from_points(points: &[Point3<f64>], dtype: Dtype, device: Device) -> Self {
        let values: Vec<f64> = points.iter().flat_map(|p| [p.x, p.y, p.z]).collect();
        Self {
            data: TensorData::from_f64(&values, dtype),
            shape: Shape::from_slice(&[points.len(), 3]),
            device,
        }
    }

    /// An `(N, 3)` tensor from nalgebra vectors.
    #[must_use]
    pub fn from_vectors(vectors: &[Vector3<f64>], dtype: Dtype, device: Device) -> Self {
        let values: Vec<f64> = vectors.iter().flat_map(|v| [v.x, v.y, v.z]).collect();
        Self {
            data: TensorData::from_f64(&values, dtype),
            shape: Shape::from_slice(&[vectors.len(), 3]),
            device,
        }
    }

    /// A `(3,)` tensor from a vector.
    #[must_use]
    pub fn from_vector3(v: &Vector3<f64>, dtype: Dtype, device: Device) -> Self {
        Self {
            data: TensorData::from_f64(&[v.x, v.y, v.z], dtype),
            shape: Shape::from_slice(&[3]),
            device,
        }
    }

    /// The shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Size of the leading dimension (1 for a scalar tensor).
    #[must_use]
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Total number of elements.
    #[must_use]
    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the tensor holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The element type.
    #[must_use]
    pub const fn dtype(&self) -> Dtype {
        self.data.dtype()
    }

    /// The device tag.
    #[must_use]
    pub const fn device(&self) -> Device {
        self.device
    }

    /// Borrows the typed storage.
    #[must_use]
    pub const fn data(&self) -> &TensorData {
        &self.data
    }

    /// Borrows the values as a slice of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::DtypeMismatch`] if `T` is not the stored type.
    pub fn as_slice<T: Element>(&self) -> TensorResult<&[T]> {
        T::slice(&self.data).ok_or(TensorError::DtypeMismatch {
            expected: T::DTYPE,
            actual: self.dtype(),
        })
    }

    /// Mutably borrows the values as a slice of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::DtypeMismatch`] if `T` is not the stored type.
    pub fn as_mut_slice<T: Element>(&mut self) -> TensorResult<&mut [T]> {
        let actual = self.dtype();
        T::slice_mut(&mut self.data).ok_or(TensorError::DtypeMismatch {
            expected: T::DTYPE,
            actual,
        })
    }

    /// Copies every value to `f64`.
    #[must_use]
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.data.to_f64_vec()
    }

    /// Returns a copy cast to `dtype` (`as` semantics for narrowing casts).
    #[must_use]
    pub fn to_dtype(&self, dtype: Dtype) -> Self {
        if dtype == self.dtype() {
            return self.clone();
        }
        Self {
            data: TensorData::from_f64(&self.data.to_f64_vec(), dtype),
            shape: self.shape.clone(),
            device: self.device,
        }
    }

    /// Returns a copy tagged with `device`.
    #[must_use]
    pub fn to_device(&self, device: Device) -> Self {
        Self {
            data: self.data.clone(),
            shape: self.shape.clone(),
            device,
        }
    }

    /// Returns a copy with a new shape holding the same number of elements.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ElementCount`] if the element count differs.
    pub fn reshape(&self, shape: &[usize]) -> TensorResult<Self> {
        Self::from_data(self.data.clone(), shape, self.device)
    }

    /// Fails with [`TensorError::DeviceMismatch`] unless the tensor lives on
    /// `expected`.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn check_device(&self, expected: Device) -> TensorResult<()> {
        if self.device == expected {
            Ok(())
        } else {
            Err(TensorError::DeviceMismatch {
                expected,
                actual: self.device,
            })
        }
    }

    /// Fails with [`TensorError::NotFloat`] unless the dtype is a float.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn check_float(&self) -> TensorResult<()> {
        if self.dtype().is_float() {
            Ok(())
        } else {
            Err(TensorError::NotFloat(self.dtype()))
        }
    }

    /// Checks for shape `(N, 3)` and returns `N`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] for any other shape.
    pub fn check_nx3(&self) -> TensorResult<usize> {
        match self.shape() {
            &[n, 3] => Ok(n),
            other => Err(TensorError::shape("(N, 3)", other)),
        }
    }

    /// Checks that the tensor holds exactly `len` elements laid out as
    /// `(len,)`, `(1, len)` or `(len, 1)`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] otherwise.
    pub fn check_vector(&self, len: usize) -> TensorResult<()> {
        let ok = match self.shape() {
            &[n] => n == len,
            &[1, n] | &[n, 1] => n == len,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(TensorError::shape(format!("({len},)"), self.shape()))
        }
    }

    /// Reads an `(N, 3)` tensor as nalgebra points.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] unless the shape is `(N, 3)`.
    pub fn to_points(&self) -> TensorResult<Vec<Point3<f64>>> {
        self.check_nx3()?;
        Ok(self
            .to_f64_vec()
            .chunks_exact(3)
            .map(|c| Point3::new(c[0], c[1], c[2]))
            .collect())
    }

    /// Reads an `(N, 3)` tensor as nalgebra vectors.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] unless the shape is `(N, 3)`.
    pub fn to_vectors(&self) -> TensorResult<Vec<Vector3<f64>>> {
        self.check_nx3()?;
        Ok(self
            .to_f64_vec()
            .chunks_exact(3)
            .map(|c| Vector3::new(c[0], c[1], c[2]))
            .collect())
    }

    /// Reads a 3-element tensor as a vector.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] unless the tensor holds three
    /// values (see [`Tensor::check_vector`]).
    pub fn to_vector3(&self) -> TensorResult<Vector3<f64>> {
        self.check_vector(3)?;
        let v = self.to_f64_vec();
        Ok(Vector3::new(v[0], v[1], v[2]))
    }

    /// Reads a `(3, 3)` row-major tensor as a matrix.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] unless the shape is `(3, 3)`.
    pub fn to_matrix3(&self) -> TensorResult<Matrix3<f64>> {
        if self.shape() != [3, 3] {
            return Err(TensorError::shape("(3, 3)", self.shape()));
        }
        Ok(Matrix3::from_row_slice(&self.to_f64_vec()))
    }

    /// Reads a `(4, 4)` row-major tensor as a matrix.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] unless the shape is `(4, 4)`.
    pub fn to_matrix4(&self) -> TensorResult<Matrix4<f64>> {
        if self.shape() != [4, 4] {
            return Err(TensorError::shape("(4, 4)", self.shape()));
        }
        Ok(Matrix4::from_row_slice(&self.to_f64_vec()))
    }

    /// Number of values per leading-dimension row.
    fn row_width(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// Returns row `index` widened to `f64`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::RowOutOfRange`] past the last row.
    pub fn row_f64(&self, index: usize) -> TensorResult<Vec<f64>> {
        let rows = self.rows();
        if self.ndim() == 0 || index >= rows {
            return Err(TensorError::RowOutOfRange { index, rows });
        }
        let width = self.row_width();
        Ok((index * width..(index + 1) * width)
            .map(|i| self.data.value_f64(i))
            .collect())
    }

    /// Overwrites row `index` with `values`, casting to this tensor's dtype.
    ///
    /// # Errors
    ///
    /// - [`TensorError::DeviceMismatch`] if `values` is on another device
    /// - [`TensorError::RowOutOfRange`] past the last row
    /// - [`TensorError::ShapeMismatch`] if `values` is not one row wide
    pub fn set_row(&mut self, index: usize, values: &Self) -> TensorResult<()> {
        values.check_device(self.device)?;
        let rows = self.rows();
        if self.ndim() == 0 || index >= rows {
            return Err(TensorError::RowOutOfRange { index, rows });
        }
        let width = self.row_width();
        values.check_vector(width)?;
        for (offset, value) in values.to_f64_vec().into_iter().enumerate() {
            self.data.set_f64(index * width + offset, value);
        }
        Ok(())
    }

    /// Concatenates tensors along the leading dimension.
    ///
    /// # Errors
    ///
    /// - [`TensorError::ShapeMismatch`] if `parts` is empty or trailing
    ///   dimensions differ
    /// - [`TensorError::DtypeMismatch`] / [`TensorError::DeviceMismatch`] if
    ///   the parts disagree
    pub fn concat_rows(parts: &[&Self]) -> TensorResult<Self> {
        let Some((first, rest)) = parts.split_first() else {
            return Err(TensorError::shape("at least one tensor", &[]));
        };
        if first.ndim() == 0 {
            return Err(TensorError::shape("(N, ...)", first.shape()));
        }
        let mut data = first.data.clone();
        let mut rows = first.rows();
        for part in rest {
            part.check_device(first.device)?;
            if part.shape().get(1..) != first.shape().get(1..) {
                return Err(TensorError::shape(format!("(N, {:?})", &first.shape()[1..]), part.shape()));
            }
            if !data.extend_from(&part.data) {
                return Err(TensorError::DtypeMismatch {
                    expected: first.dtype(),
                    actual: part.dtype(),
                });
            }
            rows += part.rows();
        }
        let mut shape = first.shape.clone();
        shape[0] = rows;
        Ok(Self {
            data,
            shape,
            device: first.device,
        })
    }

    /// Element-wise closeness with `rtol = 1e-5`, `atol = 1e-8`.
    ///
    /// Shapes must match exactly; dtypes and devices may differ.
    #[must_use]
    pub fn allclose(&self, other: &Self) -> bool {
        self.allclose_with(other, 1e-5, 1e-8)
    }

    /// Element-wise `|a - b| <= atol + rtol * |b|`.
    #[must_use]
    pub fn allclose_with(&self, other: &Self, rtol: f64, atol: f64) -> bool {
        self.shape == other.shape
            && self
                .to_f64_vec()
                .iter()
                .zip(other.to_f64_vec())
                .all(|(a, b)| (a - b).abs() <= atol + rtol * b.abs())
    }
}
