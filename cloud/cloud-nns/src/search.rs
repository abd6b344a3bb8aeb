//! The user-facing nearest-neighbour search object.
//!
//! A [`NearestNeighborSearch`] wraps a reference point tensor. Each search
//! variant has to be prepared once with its `*_index` method before it can
//! be queried; preparing one variant does not prepare the others.

use cloud_types::{Device, Dtype, Tensor, TensorError};
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::error::{NnsError, NnsResult};
use crate::index::{SpatialIndex, check_dataset, tensor_rows};
use crate::kind::SearchKind;
use crate::result::{HybridResult, KnnResult, RadiusResult};

/// Nearest-neighbour search over a fixed set of reference points.
///
/// The reference points are copied when the first index is prepared, and
/// every result refers to that snapshot.
///
/// # Example
///
/// ```
/// use cloud_nns::NearestNeighborSearch;
/// use cloud_types::{Device, Tensor};
///
/// let points = Tensor::from_rows(
///     &[[0.0_f64, 0.0, 0.0], [0.0, 0.0, 0.1], [0.1, 0.0, 0.0]],
///     Device::Cpu,
/// );
/// let query = Tensor::from_rows(&[[0.0_f64, 0.0, 0.09]], Device::Cpu);
///
/// let mut nns = NearestNeighborSearch::new(points)?;
/// nns.knn_index()?;
/// let result = nns.knn_search(&query, 2)?;
/// assert_eq!(result.indices.as_slice::<i64>()?, &[1, 0]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct NearestNeighborSearch {
    dataset: Tensor,
    config: SearchConfig,
    index: Option<SpatialIndex>,
    prepared: [bool; 4],
    fixed_radius: Option<f64>,
    hybrid_radius: Option<f64>,
}

fn check_radius(name: &'static str, radius: f64) -> NnsResult<()> {
    if radius.is_finite() && radius > 0.0 {
        Ok(())
    } else {
        Err(NnsError::invalid(name, format!("must be positive and finite, got {radius}")))
    }
}

impl NearestNeighborSearch {
    /// Wrap `points` with the default configuration.
    ///
    /// # Errors
    ///
    /// - [`NnsError::Tensor`] unless `points` is a float `(N, 3)` tensor
    /// - [`NnsError::EmptyDataset`] if `N == 0`
    pub fn new(points: Tensor) -> NnsResult<Self> {
        Self::with_config(points, SearchConfig::default())
    }

    /// Wrap `points` with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Same as [`NearestNeighborSearch::new`].
    pub fn with_config(points: Tensor, config: SearchConfig) -> NnsResult<Self> {
        check_dataset(&points)?;
        Ok(Self {
            dataset: points,
            config,
            index: None,
            prepared: [false; 4],
            fixed_radius: None,
            hybrid_radius: None,
        })
    }

    /// The reference points.
    #[must_use]
    pub const fn dataset(&self) -> &Tensor {
        &self.dataset
    }

    /// Number of reference points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.rows()
    }

    /// Always false: construction rejects empty datasets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Device of the reference points and of every result.
    #[must_use]
    pub const fn device(&self) -> Device {
        self.dataset.device()
    }

    /// Dtype of the reference points and of every distance output.
    #[must_use]
    pub fn dtype(&self) -> Dtype {
        self.dataset.dtype()
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Whether `kind` has been prepared.
    #[must_use]
    pub const fn is_prepared(&self, kind: SearchKind) -> bool {
        self.prepared[kind.slot()]
    }

    /// The radius passed to [`NearestNeighborSearch::fixed_radius_index`].
    #[must_use]
    pub const fn fixed_radius(&self) -> Option<f64> {
        self.fixed_radius
    }

    /// The radius passed to [`NearestNeighborSearch::hybrid_index`], if any.
    #[must_use]
    pub const fn hybrid_radius(&self) -> Option<f64> {
        self.hybrid_radius
    }

    fn ensure_index(&mut self, kind: SearchKind) -> NnsResult<&mut SpatialIndex> {
        if !kind.supported_on(self.device()) {
            return Err(NnsError::Unsupported {
                kind,
                device: self.device(),
            });
        }
        let index = match self.index.take() {
            Some(index) => index,
            None => SpatialIndex::build(&self.dataset, &self.config)?,
        };
        Ok(self.index.insert(index))
    }

    fn mark_prepared(&mut self, kind: SearchKind) {
        self.prepared[kind.slot()] = true;
        info!(%kind, device = %self.device(), points = self.len(), "Prepared search index");
    }

    /// Prepare k-nearest-neighbour search.
    ///
    /// # Errors
    ///
    /// Returns [`NnsError::DeviceUnavailable`] or [`NnsError::Gpu`] if the
    /// device index cannot be built.
    pub fn knn_index(&mut self) -> NnsResult<()> {
        self.ensure_index(SearchKind::Knn)?;
        self.mark_prepared(SearchKind::Knn);
        Ok(())
    }

    /// Prepare fixed-radius search, tuning the index for `radius`.
    ///
    /// Searches may still use other radii.
    ///
    /// # Errors
    ///
    /// - [`NnsError::InvalidParameter`] unless `radius` is positive and finite
    /// - [`NnsError::DeviceUnavailable`] or [`NnsError::Gpu`] if the device
    ///   index cannot be built
    pub fn fixed_radius_index(&mut self, radius: f64) -> NnsResult<()> {
        check_radius("radius", radius)?;
        self.ensure_index(SearchKind::FixedRadius)?
            .prepare_fixed_radius(radius);
        self.fixed_radius = Some(radius);
        self.mark_prepared(SearchKind::FixedRadius);
        Ok(())
    }

    /// Prepare hybrid search. The radius is optional and only recorded.
    ///
    /// # Errors
    ///
    /// - [`NnsError::InvalidParameter`] if `radius` is given and is not
    ///   positive and finite
    /// - [`NnsError::DeviceUnavailable`] or [`NnsError::Gpu`] if the device
    ///   index cannot be built
    pub fn hybrid_index(&mut self, radius: Option<f64>) -> NnsResult<()> {
        if let Some(r) = radius {
            check_radius("radius", r)?;
        }
        self.ensure_index(SearchKind::Hybrid)?;
        self.hybrid_radius = radius;
        self.mark_prepared(SearchKind::Hybrid);
        Ok(())
    }

    /// Prepare multi-radius search.
    ///
    /// # Errors
    ///
    /// Returns [`NnsError::Unsupported`] for a GPU dataset.
    pub fn multi_radius_index(&mut self) -> NnsResult<()> {
        self.ensure_index(SearchKind::MultiRadius)?;
        self.mark_prepared(SearchKind::MultiRadius);
        Ok(())
    }

    fn prepared_index(&self, kind: SearchKind) -> NnsResult<&SpatialIndex> {
        match &self.index {
            Some(index) if self.is_prepared(kind) => Ok(index),
            _ => Err(NnsError::NotPrepared(kind)),
        }
    }

    fn query_rows(&self, query: &Tensor) -> NnsResult<Vec<[f64; 3]>> {
        query.check_device(self.device())?;
        if query.dtype() != self.dtype() {
            return Err(TensorError::DtypeMismatch {
                expected: self.dtype(),
                actual: query.dtype(),
            }
            .into());
        }
        query.check_nx3()?;
        Ok(tensor_rows(query))
    }

    /// The `k` nearest reference points of every query point.
    ///
    /// `k` larger than the dataset returns every point.
    ///
    /// # Errors
    ///
    /// - [`NnsError::NotPrepared`] before [`NearestNeighborSearch::knn_index`]
    /// - [`NnsError::InvalidParameter`] if `k == 0`
    /// - [`NnsError::Tensor`] if `query` is not `(Q, 3)` with the dataset's
    ///   dtype and device
    /// - [`NnsError::Gpu`] if `k` exceeds the GPU limit or a dispatch fails
    pub fn knn_search(&self, query: &Tensor, k: usize) -> NnsResult<KnnResult> {
        let index = self.prepared_index(SearchKind::Knn)?;
        if k == 0 {
            return Err(NnsError::invalid("k", "must be at least 1"));
        }
        let queries = self.query_rows(query)?;
        let k = k.min(self.len());
        debug!(queries = queries.len(), k, "k-NN search");
        let rows = index.knn(&queries, k)?;
        KnnResult::from_rows(&rows, k, self.dtype(), self.device())
    }

    /// Every reference point within `radius` of each query point.
    ///
    /// A non-positive or NaN radius matches nothing.
    ///
    /// # Errors
    ///
    /// - [`NnsError::NotPrepared`] before
    ///   [`NearestNeighborSearch::fixed_radius_index`]
    /// - [`NnsError::Tensor`] on a mismatched `query`
    /// - [`NnsError::Gpu`] if a dispatch fails
    pub fn fixed_radius_search(&self, query: &Tensor, radius: f64) -> NnsResult<RadiusResult> {
        let index = self.prepared_index(SearchKind::FixedRadius)?;
        let queries = self.query_rows(query)?;
        debug!(queries = queries.len(), radius, "Fixed-radius search");
        let rows = if radius > 0.0 {
            index.fixed_radius(&queries, radius)?
        } else {
            vec![Vec::new(); queries.len()]
        };
        RadiusResult::from_rows(&rows, self.dtype(), self.device())
    }

    /// Up to `max_knn` nearest reference points within `radius`.
    ///
    /// Rows are padded to `max_knn` columns.
    ///
    /// # Errors
    ///
    /// - [`NnsError::NotPrepared`] before
    ///   [`NearestNeighborSearch::hybrid_index`]
    /// - [`NnsError::InvalidParameter`] if `max_knn == 0`
    /// - [`NnsError::Tensor`] on a mismatched `query`
    /// - [`NnsError::Gpu`] if `max_knn` exceeds the GPU limit on a dataset
    ///   larger than it, or a dispatch fails
    pub fn hybrid_search(&self, query: &Tensor, radius: f64, max_knn: usize) -> NnsResult<HybridResult> {
        let index = self.prepared_index(SearchKind::Hybrid)?;
        if max_knn == 0 {
            return Err(NnsError::invalid("max_knn", "must be at least 1"));
        }
        let queries = self.query_rows(query)?;
        debug!(queries = queries.len(), radius, max_knn, "Hybrid search");
        let rows = if radius > 0.0 {
            index.hybrid(&queries, radius, max_knn.min(self.len()))?
        } else {
            vec![Vec::new(); queries.len()]
        };
        HybridResult::from_rows(&rows, max_knn, self.dtype(), self.device())
    }

    /// Every reference point within `radii[i]` of query point `i`.
    ///
    /// Queries run one after another on the calling thread.
    ///
    /// # Errors
    ///
    /// - [`NnsError::NotPrepared`] before
    ///   [`NearestNeighborSearch::multi_radius_index`]
    /// - [`NnsError::Tensor`] on a mismatched `query`, or if `radii` is not
    ///   `(Q,)` with the dataset's dtype and device
    pub fn multi_radius_search(&self, query: &Tensor, radii: &Tensor) -> NnsResult<RadiusResult> {
        let index = self.prepared_index(SearchKind::MultiRadius)?;
        let queries = self.query_rows(query)?;
        radii.check_device(self.device())?;
        if radii.dtype() != self.dtype() {
            return Err(TensorError::DtypeMismatch {
                expected: self.dtype(),
                actual: radii.dtype(),
            }
            .into());
        }
        radii.check_vector(queries.len())?;
        debug!(queries = queries.len(), "Multi-radius search");
        let rows = index.multi_radius(&queries, &radii.to_f64_vec())?;
        RadiusResult::from_rows(&rows, self.dtype(), self.device())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloud_types::ErrorCategory;

    fn dataset() -> Tensor {
        Tensor::from_rows(
            &[[0.0_f64, 0.0, 0.0], [0.0, 0.0, 0.1], [0.1, 0.0, 0.0]],
            Device::Cpu,
        )
    }

    #[test]
    fn test_search_before_index_is_state_error() {
        let nns = NearestNeighborSearch::new(dataset()).unwrap();
        let query = Tensor::from_rows(&[[0.0_f64, 0.0, 0.0]], Device::Cpu);
        let err = nns.knn_search(&query, 1).unwrap_err();
        assert!(matches!(err, NnsError::NotPrepared(SearchKind::Knn)));
        assert_eq!(err.category(), ErrorCategory::State);
    }

    #[test]
    fn test_preparing_one_kind_leaves_others_unprepared() {
        let mut nns = NearestNeighborSearch::new(dataset()).unwrap();
        nns.knn_index().unwrap();
        assert!(nns.is_prepared(SearchKind::Knn));
        let query = Tensor::from_rows(&[[0.0_f64, 0.0, 0.0]], Device::Cpu);
        assert!(matches!(
            nns.fixed_radius_search(&query, 0.1),
            Err(NnsError::NotPrepared(SearchKind::FixedRadius))
        ));
        assert!(matches!(
            nns.hybrid_search(&query, 0.1, 1),
            Err(NnsError::NotPrepared(SearchKind::Hybrid))
        ));
    }

    #[test]
    fn test_state_checked_before_arguments() {
        let nns = NearestNeighborSearch::new(dataset()).unwrap();
        let bad = Tensor::from_rows(&[[0_i64, 0]], Device::Cpu);
        assert!(matches!(
            nns.knn_search(&bad, 0),
            Err(NnsError::NotPrepared(SearchKind::Knn))
        ));
    }

    #[test]
    fn test_invalid_fixed_radius_index() {
        let mut nns = NearestNeighborSearch::new(dataset()).unwrap();
        for r in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = nns.fixed_radius_index(r).unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Input);
        }
        assert!(!nns.is_prepared(SearchKind::FixedRadius));
        nns.fixed_radius_index(0.1).unwrap();
        assert_eq!(nns.fixed_radius(), Some(0.1));
    }

    #[test]
    fn test_hybrid_index_radius_optional() {
        let mut nns = NearestNeighborSearch::new(dataset()).unwrap();
        nns.hybrid_index(None).unwrap();
        assert_eq!(nns.hybrid_radius(), None);
        nns.hybrid_index(Some(0.5)).unwrap();
        assert_eq!(nns.hybrid_radius(), Some(0.5));
        assert!(nns.hybrid_index(Some(-0.5)).is_err());
    }

    #[test]
    fn test_query_dtype_mismatch() {
        let mut nns = NearestNeighborSearch::new(dataset()).unwrap();
        nns.knn_index().unwrap();
        let query = Tensor::from_rows(&[[0.0_f32, 0.0, 0.0]], Device::Cpu);
        let err = nns.knn_search(&query, 1).unwrap_err();
        assert!(matches!(err, NnsError::Tensor(TensorError::DtypeMismatch { .. })));
    }

    #[test]
    fn test_zero_k_rejected() {
        let mut nns = NearestNeighborSearch::new(dataset()).unwrap();
        nns.knn_index().unwrap();
        let query = Tensor::from_rows(&[[0.0_f64, 0.0, 0.0]], Device::Cpu);
        assert!(matches!(
            nns.knn_search(&query, 0),
            Err(NnsError::InvalidParameter { name: "k", .. })
        ));
    }

    #[test]
    fn test_non_positive_search_radius_matches_nothing() {
        let mut nns = NearestNeighborSearch::new(dataset()).unwrap();
        nns.fixed_radius_index(0.1).unwrap();
        let query = Tensor::from_rows(&[[0.0_f64, 0.0, 0.0]], Device::Cpu);
        let result = nns.fixed_radius_search(&query, 0.0).unwrap();
        assert_eq!(result.total(), 0);
        assert_eq!(result.counts.as_slice::<i64>().unwrap(), &[0]);
    }
}
