//! Property-based tests for neighbour search.
//!
//! Results are checked against a brute-force scan and, for k-NN distances,
//! against the `kiddo` kd-tree.
//!
//! Run with: cargo test -p cloud-nns -- proptest

#![allow(clippy::unwrap_used, clippy::cast_possible_truncation)]

use cloud_nns::{NearestNeighborSearch, SearchConfig};
use cloud_types::{Device, Tensor};
use kiddo::{KdTree, SquaredEuclidean};
use proptest::prelude::*;

// =============================================================================
// Strategies and oracles
// =============================================================================

fn arb_point() -> impl Strategy<Value = [f64; 3]> {
    prop::array::uniform3(-10.0..10.0f64)
}

fn arb_points(min: usize, max: usize) -> impl Strategy<Value = Vec<[f64; 3]>> {
    prop::collection::vec(arb_point(), min..=max)
}

fn dist_sq(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (0..3).map(|i| (a[i] - b[i]) * (a[i] - b[i])).sum()
}

/// All points sorted by (distance, index).
fn brute_force(points: &[[f64; 3]], q: &[f64; 3]) -> Vec<(i64, f64)> {
    let mut all: Vec<(i64, f64)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| (i as i64, dist_sq(p, q)))
        .collect();
    all.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    all
}

fn tensor(points: &[[f64; 3]]) -> Tensor {
    Tensor::from_rows(points, Device::Cpu)
}

// =============================================================================
// k-NN
// =============================================================================

proptest! {
    /// k-NN rows equal the first k' entries of a brute-force sort.
    #[test]
    fn knn_matches_brute_force(
        points in arb_points(1, 200),
        queries in arb_points(1, 10),
        k in 1usize..20,
        leaf_size in 1usize..32,
    ) {
        let config = SearchConfig::default().with_leaf_size(leaf_size);
        let mut nns = NearestNeighborSearch::with_config(tensor(&points), config).unwrap();
        nns.knn_index().unwrap();
        let result = nns.knn_search(&tensor(&queries), k).unwrap();

        let k_eff = k.min(points.len());
        prop_assert_eq!(result.indices.shape(), &[queries.len(), k_eff]);
        let indices = result.indices.as_slice::<i64>().unwrap();
        let distances = result.distances.as_slice::<f64>().unwrap();

        for (qi, q) in queries.iter().enumerate() {
            let expected = brute_force(&points, q);
            for slot in 0..k_eff {
                prop_assert_eq!(indices[qi * k_eff + slot], expected[slot].0);
                prop_assert_eq!(distances[qi * k_eff + slot], expected[slot].1);
            }
        }
    }

    /// k-NN distances agree with kiddo.
    #[test]
    fn knn_distances_match_kiddo(
        points in arb_points(1, 300),
        query in arb_point(),
        k in 1usize..16,
    ) {
        let mut reference: KdTree<f64, 3> = KdTree::new();
        for (i, p) in points.iter().enumerate() {
            reference.add(p, i as u64);
        }
        let k_eff = k.min(points.len());
        let expected = reference.nearest_n::<SquaredEuclidean>(&query, k_eff);

        let mut nns = NearestNeighborSearch::new(tensor(&points)).unwrap();
        nns.knn_index().unwrap();
        let result = nns.knn_search(&tensor(&[query]), k).unwrap();
        let distances = result.distances.to_f64_vec();

        prop_assert_eq!(distances.len(), expected.len());
        for (got, want) in distances.iter().zip(&expected) {
            prop_assert!((got - want.distance).abs() <= 1e-9 * want.distance.max(1.0));
        }
    }
}

// =============================================================================
// Radius searches
// =============================================================================

proptest! {
    /// Fixed-radius results are exactly the points with d² <= r², sorted.
    #[test]
    fn fixed_radius_matches_brute_force(
        points in arb_points(1, 200),
        queries in arb_points(1, 8),
        index_radius in 0.5f64..5.0,
        search_radius in 0.5f64..5.0,
    ) {
        let mut nns = NearestNeighborSearch::new(tensor(&points)).unwrap();
        nns.fixed_radius_index(index_radius).unwrap();
        let result = nns.fixed_radius_search(&tensor(&queries), search_radius).unwrap();

        let indices = result.indices.as_slice::<i64>().unwrap();
        let splits = result.row_splits();
        let splits = splits.as_slice::<i64>().unwrap();
        let r2 = search_radius * search_radius;

        for (qi, q) in queries.iter().enumerate() {
            let expected: Vec<i64> = brute_force(&points, q)
                .into_iter()
                .filter(|(_, d)| *d <= r2)
                .map(|(i, _)| i)
                .collect();
            let row = &indices[splits[qi] as usize..splits[qi + 1] as usize];
            prop_assert_eq!(row, expected.as_slice());
        }
    }

    /// Unsorted results hold the same set in index order.
    #[test]
    fn unsorted_radius_is_index_ordered(
        points in arb_points(1, 150),
        query in arb_point(),
        radius in 0.5f64..6.0,
    ) {
        let mut sorted = NearestNeighborSearch::new(tensor(&points)).unwrap();
        let mut unsorted = NearestNeighborSearch::with_config(tensor(&points), SearchConfig::unsorted()).unwrap();
        sorted.fixed_radius_index(radius).unwrap();
        unsorted.fixed_radius_index(radius).unwrap();

        let a = sorted.fixed_radius_search(&tensor(&[query]), radius).unwrap();
        let b = unsorted.fixed_radius_search(&tensor(&[query]), radius).unwrap();

        let mut a_indices = a.indices.as_slice::<i64>().unwrap().to_vec();
        let b_indices = b.indices.as_slice::<i64>().unwrap().to_vec();
        prop_assert!(b_indices.windows(2).all(|w| w[0] < w[1]));
        a_indices.sort_unstable();
        prop_assert_eq!(a_indices, b_indices);
    }

    /// Hybrid rows are the radius-filtered prefix of the k-NN rows.
    #[test]
    fn hybrid_is_capped_knn(
        points in arb_points(1, 150),
        query in arb_point(),
        radius in 0.5f64..6.0,
        max_knn in 1usize..12,
    ) {
        let mut nns = NearestNeighborSearch::new(tensor(&points)).unwrap();
        nns.hybrid_index(Some(radius)).unwrap();
        let result = nns.hybrid_search(&tensor(&[query]), radius, max_knn).unwrap();

        let expected: Vec<i64> = brute_force(&points, &query)
            .into_iter()
            .filter(|(_, d)| *d <= radius * radius)
            .take(max_knn)
            .map(|(i, _)| i)
            .collect();
        let indices = result.indices.as_slice::<i64>().unwrap();
        prop_assert_eq!(indices.len(), max_knn);
        prop_assert_eq!(&indices[..expected.len()], expected.as_slice());
        prop_assert!(indices[expected.len()..].iter().all(|&i| i == -1));
        prop_assert_eq!(result.counts.as_slice::<i64>().unwrap(), &[expected.len() as i64]);
    }

    /// Multi-radius with equal radii matches fixed-radius.
    #[test]
    fn multi_radius_with_equal_radii_matches_fixed(
        points in arb_points(1, 150),
        queries in arb_points(1, 6),
        radius in 0.5f64..5.0,
    ) {
        let mut nns = NearestNeighborSearch::new(tensor(&points)).unwrap();
        nns.fixed_radius_index(radius).unwrap();
        nns.multi_radius_index().unwrap();

        let radii = Tensor::from_vec(vec![radius; queries.len()], &[queries.len()], Device::Cpu).unwrap();
        let multi = nns.multi_radius_search(&tensor(&queries), &radii).unwrap();
        let fixed = nns.fixed_radius_search(&tensor(&queries), radius).unwrap();
        prop_assert_eq!(multi, fixed);
    }
}
