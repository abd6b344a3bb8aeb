//! Balanced kd-tree over 3D points.
//!
//! Nodes live in a flat vector and leaves reference contiguous ranges of a
//! permutation of point indices. Each split is at the median of the widest
//! axis of the node's bounding box, so the tree stays balanced even when many
//! points are coincident or coplanar.
//!
//! Distances are squared Euclidean throughout.

use std::cmp::Ordering;

use smallvec::SmallVec;

/// A reference point matched by a query.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Neighbor {
    /// Index into the reference point set.
    pub index: usize,
    /// Squared Euclidean distance to the query.
    pub dist_sq: f64,
}

impl Neighbor {
    /// Create a neighbour entry.
    #[must_use]
    pub const fn new(index: usize, dist_sq: f64) -> Self {
        Self { index, dist_sq }
    }

    /// Orders by ascending distance, then ascending index.
    #[must_use]
    pub fn cmp_by_distance(&self, other: &Self) -> Ordering {
        self.dist_sq
            .total_cmp(&other.dist_sq)
            .then(self.index.cmp(&other.index))
    }
}

/// Squared Euclidean distance.
#[inline]
#[must_use]
pub(crate) fn dist_sq(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    Leaf { start: usize, end: usize },
    Split { left: usize, right: usize },
}

#[derive(Debug, Clone, Copy)]
struct KdNode {
    min: [f64; 3],
    max: [f64; 3],
    kind: NodeKind,
}

impl KdNode {
    /// Squared distance from `q` to this node's bounding box (0 inside).
    fn box_dist_sq(&self, q: &[f64; 3]) -> f64 {
        let mut d = 0.0;
        for axis in 0..3 {
            let excess = if q[axis] < self.min[axis] {
                self.min[axis] - q[axis]
            } else if q[axis] > self.max[axis] {
                q[axis] - self.max[axis]
            } else {
                0.0
            };
            d += excess * excess;
        }
        d
    }
}

/// A static kd-tree over a snapshot of 3D points.
///
/// # Example
///
/// ```
/// use cloud_nns::KdTree;
///
/// let tree = KdTree::build(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 2.0, 0.0]], 16);
/// let nearest = tree.nearest(&[0.9, 0.0, 0.0], 1, f64::INFINITY);
/// assert_eq!(nearest[0].index, 1);
///
/// let within = tree.within(&[0.0, 0.0, 0.0], 1.0);
/// assert_eq!(within.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct KdTree {
    points: Vec<[f64; 3]>,
    order: Vec<usize>,
    nodes: Vec<KdNode>,
}

impl KdTree {
    /// Build a tree with at most `leaf_size` points per leaf.
    #[must_use]
    pub fn build(points: Vec<[f64; 3]>, leaf_size: usize) -> Self {
        let count = points.len();
        let mut tree = Self {
            points,
            order: (0..count).collect(),
            nodes: Vec::with_capacity(2 * count / leaf_size.max(1) + 1),
        };
        if count > 0 {
            tree.build_recursive(0, count, leaf_size.max(1));
        }
        tree
    }

    fn build_recursive(&mut self, start: usize, end: usize, leaf_size: usize) -> usize {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for &i in &self.order[start..end] {
            let p = &self.points[i];
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }

        let node_idx = self.nodes.len();
        self.nodes.push(KdNode {
            min,
            max,
            kind: NodeKind::Leaf { start, end },
        });

        if end - start <= leaf_size {
            return node_idx;
        }

        let extent = [max[0] - min[0], max[1] - min[1], max[2] - min[2]];
        let axis = if extent[0] >= extent[1] && extent[0] >= extent[2] {
            0
        } else if extent[1] >= extent[2] {
            1
        } else {
            2
        };

        let mid = start + (end - start) / 2;
        let points = &self.points;
        self.order[start..end].select_nth_unstable_by(mid - start, |&a, &b| {
            points[a][axis]
                .total_cmp(&points[b][axis])
                .then(a.cmp(&b))
        });

        let left = self.build_recursive(start, mid, leaf_size);
        let right = self.build_recursive(mid, end, leaf_size);
        self.nodes[node_idx].kind = NodeKind::Split { left, right };
        node_idx
    }

    /// Number of indexed points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the tree holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The indexed points, in original order.
    #[must_use]
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// The `k` nearest points with `dist_sq <= max_dist_sq`.
    ///
    /// Sorted by ascending distance, ties by ascending index. Pass
    /// `f64::INFINITY` for an uncapped search.
    #[must_use]
    pub fn nearest(&self, query: &[f64; 3], k: usize, max_dist_sq: f64) -> Vec<Neighbor> {
        let mut best = Vec::with_capacity(k.min(self.len()) + 1);
        if k > 0 && !self.nodes.is_empty() {
            self.nearest_recursive(0, query, k, max_dist_sq, &mut best);
        }
        best
    }

    fn nearest_recursive(
        &self,
        node_idx: usize,
        query: &[f64; 3],
        k: usize,
        max_dist_sq: f64,
        best: &mut Vec<Neighbor>,
    ) {
        let node = &self.nodes[node_idx];
        let box_dist = node.box_dist_sq(query);
        if box_dist > max_dist_sq {
            return;
        }
        // Equal distances may still win on index, so only prune strictly worse boxes.
        if best.len() == k && box_dist > best[k - 1].dist_sq {
            return;
        }

        match node.kind {
            NodeKind::Leaf { start, end } => {
                for &i in &self.order[start..end] {
                    let d = dist_sq(&self.points[i], query);
                    if d <= max_dist_sq {
                        insert_bounded(best, Neighbor::new(i, d), k);
                    }
                }
            }
            NodeKind::Split { left, right } => {
                let dl = self.nodes[left].box_dist_sq(query);
                let dr = self.nodes[right].box_dist_sq(query);
                let (first, second) = if dl <= dr { (left, right) } else { (right, left) };
                self.nearest_recursive(first, query, k, max_dist_sq, best);
                self.nearest_recursive(second, query, k, max_dist_sq, best);
            }
        }
    }

    /// Every point with `dist_sq <= radius_sq`, in tree order.
    #[must_use]
    pub fn within(&self, query: &[f64; 3], radius_sq: f64) -> Vec<Neighbor> {
        let mut found = Vec::new();
        if self.nodes.is_empty() {
            return found;
        }

        let mut stack: SmallVec<[usize; 64]> = SmallVec::new();
        stack.push(0);
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];
            if node.box_dist_sq(query) > radius_sq {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { start, end } => {
                    for &i in &self.order[start..end] {
                        let d = dist_sq(&self.points[i], query);
                        if d <= radius_sq {
                            found.push(Neighbor::new(i, d));
                        }
                    }
                }
                NodeKind::Split { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        found
    }
}

/// Inserts `cand` into the sorted `best`, keeping at most `k` entries.
fn insert_bounded(best: &mut Vec<Neighbor>, cand: Neighbor, k: usize) {
    if best.len() == k && cand.cmp_by_distance(&best[k - 1]) != Ordering::Less {
        return;
    }
    let pos = best.partition_point(|n| n.cmp_by_distance(&cand) == Ordering::Less);
    best.insert(pos, cand);
    best.truncate(k);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_precision_loss)]
mod tests {
    use super::*;

    fn brute_force(points: &[[f64; 3]], q: &[f64; 3]) -> Vec<Neighbor> {
        let mut all: Vec<Neighbor> = points
            .iter()
            .enumerate()
            .map(|(i, p)| Neighbor::new(i, dist_sq(p, q)))
            .collect();
        all.sort_by(Neighbor::cmp_by_distance);
        all
    }

    fn grid_points(n: usize) -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    points.push([x as f64 * 0.5, y as f64 * 0.25, z as f64]);
                }
            }
        }
        points
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::build(Vec::new(), 16);
        assert!(tree.is_empty());
        assert!(tree.nearest(&[0.0; 3], 3, f64::INFINITY).is_empty());
        assert!(tree.within(&[0.0; 3], 1.0).is_empty());
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let points = grid_points(6);
        let tree = KdTree::build(points.clone(), 4);
        for q in [[0.3, 0.4, 1.2], [2.6, 1.3, 5.5], [-1.0, -1.0, -1.0]] {
            let got = tree.nearest(&q, 7, f64::INFINITY);
            let expected: Vec<Neighbor> = brute_force(&points, &q).into_iter().take(7).collect();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn test_ties_prefer_lower_index() {
        // Query equidistant from all four points.
        let points = vec![[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, -1.0, 0.0]];
        let tree = KdTree::build(points, 1);
        let got = tree.nearest(&[0.0, 0.0, 0.0], 2, f64::INFINITY);
        assert_eq!(got[0].index, 0);
        assert_eq!(got[1].index, 1);
    }

    #[test]
    fn test_coincident_points_build() {
        let points = vec![[1.0, 1.0, 1.0]; 100];
        let tree = KdTree::build(points, 4);
        let got = tree.nearest(&[1.0, 1.0, 1.0], 3, f64::INFINITY);
        let indices: Vec<usize> = got.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(tree.within(&[1.0, 1.0, 1.0], 0.0).len(), 100);
    }

    #[test]
    fn test_k_larger_than_count() {
        let tree = KdTree::build(vec![[0.0; 3], [1.0, 0.0, 0.0]], 16);
        assert_eq!(tree.nearest(&[0.0; 3], 10, f64::INFINITY).len(), 2);
    }

    #[test]
    fn test_nearest_radius_cap() {
        let tree = KdTree::build(grid_points(4), 2);
        let got = tree.nearest(&[0.0, 0.0, 0.0], 50, 0.25 * 0.25);
        assert!(got.iter().all(|n| n.dist_sq <= 0.0625));
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn test_within_matches_brute_force() {
        let points = grid_points(5);
        let tree = KdTree::build(points.clone(), 3);
        let q = [1.0, 0.5, 2.0];
        let mut got = tree.within(&q, 0.8);
        got.sort_by(Neighbor::cmp_by_distance);
        let expected: Vec<Neighbor> = brute_force(&points, &q)
            .into_iter()
            .filter(|n| n.dist_sq <= 0.8)
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_insert_bounded() {
        let mut best = Vec::new();
        for (i, d) in [(0, 3.0), (1, 1.0), (2, 2.0), (3, 1.0)] {
            insert_bounded(&mut best, Neighbor::new(i, d), 3);
        }
        let indices: Vec<usize> = best.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![1, 3, 2]);
    }
}
