//! Tensor-shaped search results.

use cloud_types::{Device, Dtype, Tensor};

use crate::error::NnsResult;
use crate::kdtree::Neighbor;

#[allow(clippy::cast_possible_wrap)]
const fn to_i64(value: usize) -> i64 {
    value as i64
}

/// Output of a k-nearest-neighbour search.
///
/// Both tensors have shape `(Q, k')` with `k' = min(k, N)`. Each row is
/// sorted by ascending squared distance, ties by ascending reference index.
#[derive(Debug, Clone, PartialEq)]
pub struct KnnResult {
    /// Reference indices, `Int64`.
    pub indices: Tensor,
    /// Squared distances in the dataset dtype.
    pub distances: Tensor,
}

impl KnnResult {
    pub(crate) fn from_rows(rows: &[Vec<Neighbor>], k: usize, dtype: Dtype, device: Device) -> NnsResult<Self> {
        let q = rows.len();
        let mut indices = Vec::with_capacity(q * k);
        let mut distances = Vec::with_capacity(q * k);
        for row in rows {
            for slot in 0..k {
                let n = row.get(slot);
                indices.push(n.map_or(-1, |n| to_i64(n.index)));
                distances.push(n.map_or(0.0, |n| n.dist_sq));
            }
        }
        Ok(Self {
            indices: Tensor::from_vec(indices, &[q, k], device)?,
            distances: Tensor::from_f64(&distances, &[q, k], dtype, device)?,
        })
    }

    /// Number of query points.
    #[must_use]
    pub fn num_queries(&self) -> usize {
        self.indices.shape()[0]
    }

    /// Neighbours per query.
    #[must_use]
    pub fn k(&self) -> usize {
        self.indices.shape().get(1).copied().unwrap_or(0)
    }
}

/// Output of a fixed-radius or multi-radius search.
///
/// Matches for all queries are concatenated in query order; `counts[i]`
/// says how many belong to query `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct RadiusResult {
    /// Reference indices, shape `(M,)`, `Int64`.
    pub indices: Tensor,
    /// Squared distances, shape `(M,)`, dataset dtype.
    pub distances: Tensor,
    /// Matches per query, shape `(Q,)`, `Int64`.
    pub counts: Tensor,
}

impl RadiusResult {
    pub(crate) fn from_rows(rows: &[Vec<Neighbor>], dtype: Dtype, device: Device) -> NnsResult<Self> {
        let total: usize = rows.iter().map(Vec::len).sum();
        let mut indices = Vec::with_capacity(total);
        let mut distances = Vec::with_capacity(total);
        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            counts.push(to_i64(row.len()));
            for n in row {
                indices.push(to_i64(n.index));
                distances.push(n.dist_sq);
            }
        }
        Ok(Self {
            indices: Tensor::from_vec(indices, &[total], device)?,
            distances: Tensor::from_f64(&distances, &[total], dtype, device)?,
            counts: Tensor::from_vec(counts, &[rows.len()], device)?,
        })
    }

    /// Number of query points.
    #[must_use]
    pub fn num_queries(&self) -> usize {
        self.counts.shape()[0]
    }

    /// Total number of matches.
    #[must_use]
    pub fn total(&self) -> usize {
        self.indices.shape()[0]
    }

    /// Prefix sums of `counts`, shape `(Q + 1,)`, `Int64`.
    ///
    /// Matches of query `i` occupy `row_splits[i]..row_splits[i + 1]`.
    #[must_use]
    pub fn row_splits(&self) -> Tensor {
        let counts = self.counts.as_slice::<i64>().unwrap_or(&[]);
        let mut splits = Vec::with_capacity(counts.len() + 1);
        let mut acc = 0_i64;
        splits.push(acc);
        for &c in counts {
            acc += c;
            splits.push(acc);
        }
        let len = splits.len();
        Tensor::from_vec(splits, &[len], self.counts.device())
            .unwrap_or_else(|_| Tensor::zeros(&[1], Dtype::Int64, self.counts.device()))
    }
}

/// Output of a hybrid (radius-capped k-NN) search.
///
/// `indices` and `distances` are `(Q, max_knn)`; unused slots hold `-1` and
/// `0`. `counts[i]` is the number of filled slots in row `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridResult {
    /// Reference indices, `Int64`, padded with `-1`.
    pub indices: Tensor,
    /// Squared distances in the dataset dtype, padded with `0`.
    pub distances: Tensor,
    /// Filled slots per query, shape `(Q,)`, `Int64`.
    pub counts: Tensor,
}

impl HybridResult {
    pub(crate) fn from_rows(rows: &[Vec<Neighbor>], max_knn: usize, dtype: Dtype, device: Device) -> NnsResult<Self> {
        let padded = KnnResult::from_rows(rows, max_knn, dtype, device)?;
        let counts: Vec<i64> = rows.iter().map(|row| to_i64(row.len().min(max_knn))).collect();
        Ok(Self {
            indices: padded.indices,
            distances: padded.distances,
            counts: Tensor::from_vec(counts, &[rows.len()], device)?,
        })
    }

    /// Number of query points.
    #[must_use]
    pub fn num_queries(&self) -> usize {
        self.counts.shape()[0]
    }
}
