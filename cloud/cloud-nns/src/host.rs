//! CPU backend: kd-tree for k-NN, hybrid and multi-radius, hash grid for
//! fixed-radius.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::grid::HashGrid;
use crate::kdtree::{KdTree, Neighbor};
use crate::kind::SearchKind;

/// Host-side spatial index over an `f64` snapshot of the reference points.
#[derive(Debug, Clone)]
pub struct HostIndex {
    tree: KdTree,
    grid: Option<HashGrid>,
    config: SearchConfig,
}

impl HostIndex {
    /// Build the kd-tree. The hash grid is built later by
    /// [`HostIndex::prepare_fixed_radius`].
    #[must_use]
    pub fn build(points: Vec<[f64; 3]>, config: &SearchConfig) -> Self {
        let count = points.len();
        let tree = KdTree::build(points, config.leaf_size);
        info!(points = count, leaf_size = config.leaf_size, "Built host kd-tree");
        Self {
            tree,
            grid: None,
            config: config.clone(),
        }
    }

    /// Number of reference points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns true if there are no reference points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// The reference points.
    #[must_use]
    pub fn points(&self) -> &[[f64; 3]] {
        self.tree.points()
    }

    /// Build (or rebuild) the hash grid with cell size `radius`.
    pub fn prepare_fixed_radius(&mut self, radius: f64) {
        let grid = HashGrid::build(self.tree.points(), radius);
        debug!(radius, cells = grid.occupied_cells(), "Built fixed-radius hash grid");
        self.grid = Some(grid);
    }

    /// The `k` nearest neighbours of each query.
    #[must_use]
    pub fn knn(&self, queries: &[[f64; 3]], k: usize) -> Vec<Vec<Neighbor>> {
        self.run(SearchKind::Knn, queries, |_, q| {
            self.tree.nearest(q, k, f64::INFINITY)
        })
    }

    /// At most `max_knn` nearest neighbours within `radius` of each query.
    #[must_use]
    pub fn hybrid(&self, queries: &[[f64; 3]], radius: f64, max_knn: usize) -> Vec<Vec<Neighbor>> {
        let radius_sq = radius * radius;
        self.run(SearchKind::Hybrid, queries, |_, q| {
            self.tree.nearest(q, max_knn, radius_sq)
        })
    }

    /// Every neighbour within `radius` of each query.
    #[must_use]
    pub fn fixed_radius(&self, queries: &[[f64; 3]], radius: f64) -> Vec<Vec<Neighbor>> {
        self.run(SearchKind::FixedRadius, queries, |_, q| {
            let found = match &self.grid {
                Some(grid) => grid.within(self.tree.points(), q, radius),
                None => self.tree.within(q, radius * radius),
            };
            self.ordered(found)
        })
    }

    /// Every neighbour within `radii[i]` of query `i`.
    ///
    /// `radii` must have one entry per query. Non-positive or NaN radii
    /// match nothing.
    #[must_use]
    pub fn multi_radius(&self, queries: &[[f64; 3]], radii: &[f64]) -> Vec<Vec<Neighbor>> {
        self.run(SearchKind::MultiRadius, queries, |i, q| {
            let radius = radii[i];
            if radius.is_nan() || radius <= 0.0 {
                return Vec::new();
            }
            self.ordered(self.tree.within(q, radius * radius))
        })
    }

    fn ordered(&self, mut found: Vec<Neighbor>) -> Vec<Neighbor> {
        if self.config.sort_results {
            found.sort_unstable_by(Neighbor::cmp_by_distance);
        } else {
            found.sort_unstable_by_key(|n| n.index);
        }
        found
    }

    fn run<F>(&self, kind: SearchKind, queries: &[[f64; 3]], search: F) -> Vec<Vec<Neighbor>>
    where
        F: Fn(usize, &[f64; 3]) -> Vec<Neighbor> + Sync + Send,
    {
        let parallel = self.config.parallel && kind.parallel_queries();
        debug!(%kind, queries = queries.len(), parallel, "Running host search");
        if parallel {
            queries
                .par_iter()
                .enumerate()
                .map(|(i, q)| search(i, q))
                .collect()
        } else {
            queries
                .iter()
                .enumerate()
                .map(|(i, q)| search(i, q))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> Vec<[f64; 3]> {
        vec![
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 0.1],
            [0.0, 0.0, 0.2],
            [0.0, 0.1, 0.0],
            [0.0, 0.1, 0.1],
            [0.0, 0.1, 0.2],
            [0.0, 0.2, 0.0],
            [0.0, 0.2, 0.1],
            [0.0, 0.2, 0.2],
            [0.1, 0.0, 0.0],
        ]
    }

    const QUERY: [f64; 3] = [0.064_705, 0.043_921, 0.087_843];

    fn indices(row: &[Neighbor]) -> Vec<usize> {
        row.iter().map(|n| n.index).collect()
    }

    #[test]
    fn test_knn_reference_scenario() {
        let index = HostIndex::build(points(), &SearchConfig::default());
        let rows = index.knn(&[QUERY], 3);
        assert_eq!(indices(&rows[0]), vec![1, 4, 9]);
    }

    #[test]
    fn test_fixed_radius_with_and_without_grid() {
        let mut index = HostIndex::build(points(), &SearchConfig::default());
        let tree_only = index.fixed_radius(&[QUERY], 0.1);
        index.prepare_fixed_radius(0.1);
        let with_grid = index.fixed_radius(&[QUERY], 0.1);
        assert_eq!(indices(&tree_only[0]), vec![1, 4]);
        assert_eq!(tree_only, with_grid);
    }

    #[test]
    fn test_unsorted_orders_by_index() {
        let index = HostIndex::build(points(), &SearchConfig::unsorted());
        let rows = index.fixed_radius(&[[0.0, 0.1, 0.1]], 0.15);
        let got = indices(&rows[0]);
        let mut sorted = got.clone();
        sorted.sort_unstable();
        assert_eq!(got, sorted);
        assert_eq!(got.len(), 9);
    }

    #[test]
    fn test_hybrid_caps_by_radius_and_count() {
        let index = HostIndex::build(points(), &SearchConfig::serial());
        let rows = index.hybrid(&[QUERY], 0.1, 1);
        assert_eq!(indices(&rows[0]), vec![1]);
        let rows = index.hybrid(&[QUERY], 0.1, 5);
        assert_eq!(indices(&rows[0]), vec![1, 4]);
    }

    #[test]
    fn test_multi_radius_per_query() {
        let index = HostIndex::build(points(), &SearchConfig::default());
        let rows = index.multi_radius(&[QUERY, QUERY, QUERY], &[0.1, 0.0, f64::NAN]);
        assert_eq!(indices(&rows[0]), vec![1, 4]);
        assert!(rows[1].is_empty());
        assert!(rows[2].is_empty());
    }

    #[test]
    fn test_parallel_matches_serial() {
        let serial = HostIndex::build(points(), &SearchConfig::serial());
        let parallel = HostIndex::build(points(), &SearchConfig::default());
        let queries: Vec<[f64; 3]> = (0..50)
            .map(|i| {
                let t = f64::from(i) / 50.0;
                [t * 0.1, t * 0.2, 0.2 - t * 0.2]
            })
            .collect();
        assert_eq!(serial.knn(&queries, 4), parallel.knn(&queries, 4));
    }
}
