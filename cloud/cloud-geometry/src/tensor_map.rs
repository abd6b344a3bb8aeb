//! Attribute-to-tensor storage for point clouds.
//!
//! A [`TensorMap`] holds at most one tensor per [`Attribute`]. All tensors
//! are float `(N, 3)` tensors on the map's device and share the same `N`,
//! which is checked whenever a tensor is assigned.

use cloud_types::{Device, Tensor};
use tracing::debug;

use crate::attribute::Attribute;
use crate::error::{GeometryError, GeometryResult};

/// Per-point attribute storage bound to one device.
///
/// # Example
///
/// ```
/// use cloud_geometry::{Attribute, TensorMap};
/// use cloud_types::{Device, Dtype, Tensor};
///
/// let mut map = TensorMap::new(Device::Cpu);
/// map.set(Attribute::Points, Tensor::ones(&[2, 3], Dtype::Float32, Device::Cpu))?;
/// map.set(Attribute::Colors, Tensor::zeros(&[2, 3], Dtype::Float32, Device::Cpu))?;
/// assert_eq!(map.len(), 2);
///
/// // Colors must match the point count.
/// assert!(map.set(Attribute::Colors, Tensor::zeros(&[3, 3], Dtype::Float32, Device::Cpu)).is_err());
/// # Ok::<(), cloud_geometry::GeometryError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TensorMap {
    device: Device,
    tensors: [Option<Tensor>; 3],
}

impl TensorMap {
    /// An empty map on `device`.
    #[must_use]
    pub const fn new(device: Device) -> Self {
        Self {
            device,
            tensors: [None, None, None],
        }
    }

    /// The device every tensor lives on.
    #[must_use]
    pub const fn device(&self) -> Device {
        self.device
    }

    /// Assign `tensor` to `attr`.
    ///
    /// Assigning `Points` with a new row count drops every other attribute.
    ///
    /// # Errors
    ///
    /// - [`GeometryError::Tensor`] unless `tensor` is a float `(N, 3)` tensor
    ///   on the map's device
    /// - [`GeometryError::LengthMismatch`] if a non-point attribute's `N`
    ///   differs from the existing rows
    pub fn set(&mut self, attr: Attribute, tensor: Tensor) -> GeometryResult<()> {
        tensor.check_device(self.device)?;
        tensor.check_float()?;
        let rows = tensor.check_nx3()?;

        match (attr, self.rows()) {
            (Attribute::Points, Some(current)) if current != rows => {
                for other in Attribute::ALL.into_iter().filter(|a| *a != Attribute::Points) {
                    if self.tensors[other.slot()].take().is_some() {
                        debug!(attribute = %other, old = current, new = rows, "Dropped stale attribute");
                    }
                }
            }
            (Attribute::Colors | Attribute::Normals, Some(current)) if current != rows => {
                return Err(GeometryError::LengthMismatch {
                    attribute: attr,
                    expected: current,
                    actual: rows,
                });
            }
            _ => {}
        }

        self.tensors[attr.slot()] = Some(tensor);
        Ok(())
    }

    /// The tensor stored for `attr`.
    #[must_use]
    pub fn get(&self, attr: Attribute) -> Option<&Tensor> {
        self.tensors[attr.slot()].as_ref()
    }

    /// Like [`TensorMap::get`], failing with
    /// [`GeometryError::MissingAttribute`] when absent.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn require(&self, attr: Attribute) -> GeometryResult<&Tensor> {
        self.get(attr).ok_or(GeometryError::MissingAttribute(attr))
    }

    /// Whether `attr` is present.
    #[must_use]
    pub fn contains(&self, attr: Attribute) -> bool {
        self.tensors[attr.slot()].is_some()
    }

    /// Remove and return the tensor for `attr`.
    pub fn remove(&mut self, attr: Attribute) -> Option<Tensor> {
        self.tensors[attr.slot()].take()
    }

    /// Overwrite row `index` of `attr` with a 3-element tensor.
    ///
    /// # Errors
    ///
    /// - [`GeometryError::MissingAttribute`] if `attr` is absent
    /// - [`GeometryError::Tensor`] on a bad row index, width or device
    pub fn set_row(&mut self, attr: Attribute, index: usize, values: &Tensor) -> GeometryResult<()> {
        let tensor = self.tensors[attr.slot()]
            .as_mut()
            .ok_or(GeometryError::MissingAttribute(attr))?;
        tensor.set_row(index, values)?;
        Ok(())
    }

    /// Number of points, or 0 without a `Points` attribute.
    #[must_use]
    pub fn len(&self) -> usize {
        self.get(Attribute::Points).map_or(0, Tensor::rows)
    }

    /// Returns true if there are no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Present attributes, in [`Attribute::ALL`] order.
    pub fn keys(&self) -> impl Iterator<Item = Attribute> + '_ {
        Attribute::ALL.into_iter().filter(|a| self.contains(*a))
    }

    /// Present attributes with their tensors.
    pub fn iter(&self) -> impl Iterator<Item = (Attribute, &Tensor)> + '_ {
        Attribute::ALL
            .into_iter()
            .filter_map(|a| self.get(a).map(|t| (a, t)))
    }

    /// Row count shared by the present tensors, `None` if the map is empty.
    fn rows(&self) -> Option<usize> {
        self.tensors.iter().flatten().map(Tensor::rows).next()
    }

    /// Replace a present tensor with one of the same shape, skipping checks.
    pub(crate) fn replace(&mut self, attr: Attribute, tensor: Tensor) {
        self.tensors[attr.slot()] = Some(tensor);
    }

    /// Retag every tensor with `device`.
    pub(crate) fn to_device(&self, device: Device) -> Self {
        Self {
            device,
            tensors: self
                .tensors
                .clone()
                .map(|t| t.map(|t| t.to_device(device))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloud_types::{Dtype, ErrorCategory};

    fn ones(rows: usize) -> Tensor {
        Tensor::ones(&[rows, 3], Dtype::Float32, Device::Cpu)
    }

    #[test]
    fn test_new_is_empty() {
        let map = TensorMap::new(Device::Cpu);
        assert!(map.is_empty());
        assert!(!map.contains(Attribute::Points));
        assert_eq!(map.keys().count(), 0);
    }

    #[test]
    fn test_zero_rows_allowed() {
        let mut map = TensorMap::new(Device::Cpu);
        map.set(Attribute::Points, ones(0)).unwrap();
        map.set(Attribute::Colors, ones(0)).unwrap();
        assert_eq!(map.len(), 0);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![Attribute::Points, Attribute::Colors]);
    }

    #[test]
    fn test_new_point_count_drops_other_attributes() {
        let mut map = TensorMap::new(Device::Cpu);
        map.set(Attribute::Points, ones(0)).unwrap();
        map.set(Attribute::Colors, ones(0)).unwrap();
        map.set(Attribute::Points, ones(1)).unwrap();
        assert!(!map.contains(Attribute::Colors));
        map.set(Attribute::Colors, ones(1)).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_same_point_count_keeps_attributes() {
        let mut map = TensorMap::new(Device::Cpu);
        map.set(Attribute::Points, ones(2)).unwrap();
        map.set(Attribute::Normals, ones(2)).unwrap();
        map.set(Attribute::Points, Tensor::zeros(&[2, 3], Dtype::Float32, Device::Cpu)).unwrap();
        assert!(map.contains(Attribute::Normals));
    }

    #[test]
    fn test_length_mismatch() {
        let mut map = TensorMap::new(Device::Cpu);
        map.set(Attribute::Points, ones(2)).unwrap();
        let err = map.set(Attribute::Colors, ones(3)).unwrap_err();
        assert!(matches!(
            err,
            GeometryError::LengthMismatch {
                attribute: Attribute::Colors,
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_rejects_bad_tensors() {
        let mut map = TensorMap::new(Device::Cpu);
        let cases = [
            Tensor::ones(&[2, 3], Dtype::Float32, Device::Gpu(0)),
            Tensor::ones(&[2, 3], Dtype::Int32, Device::Cpu),
            Tensor::ones(&[2, 4], Dtype::Float32, Device::Cpu),
        ];
        for tensor in cases {
            let err = map.set(Attribute::Points, tensor).unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Input);
        }
        assert!(map.is_empty());
    }

    #[test]
    fn test_set_row() {
        let mut map = TensorMap::new(Device::Cpu);
        map.set(Attribute::Points, ones(1)).unwrap();
        let row = Tensor::from_vec(vec![1.0_f32, 2.0, 3.0], &[3], Device::Cpu).unwrap();
        map.set_row(Attribute::Points, 0, &row).unwrap();
        let expected = Tensor::from_rows(&[[1.0_f32, 2.0, 3.0]], Device::Cpu);
        assert!(map.get(Attribute::Points).unwrap().allclose(&expected));

        assert!(matches!(
            map.set_row(Attribute::Normals, 0, &row),
            Err(GeometryError::MissingAttribute(Attribute::Normals))
        ));
        assert!(map.set_row(Attribute::Points, 1, &row).is_err());
    }

    #[test]
    fn test_remove() {
        let mut map = TensorMap::new(Device::Cpu);
        map.set(Attribute::Points, ones(2)).unwrap();
        assert!(map.remove(Attribute::Points).is_some());
        assert!(map.remove(Attribute::Points).is_none());
        assert!(matches!(
            map.require(Attribute::Points),
            Err(GeometryError::MissingAttribute(Attribute::Points))
        ));
    }
}
