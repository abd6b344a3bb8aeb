//! End-to-end scenarios for `NearestNeighborSearch`.
//!
//! CPU tests always run. Tests marked with `#[ignore]` repeat the scenarios
//! on every available device and should be run with:
//! ```bash
//! cargo test -p cloud-nns -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use approx::assert_relative_eq;
use cloud_nns::{
    NearestNeighborSearch, NnsError, SearchConfig, SearchKind, available_devices,
};
use cloud_types::{Device, Dtype, ErrorCategory, Tensor};

// =============================================================================
// Fixtures
// =============================================================================

const REFERENCE: [[f64; 3]; 10] = [
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
];

const QUERY: [f64; 3] = [0.064_705, 0.043_921, 0.087_843];

fn points(dtype: Dtype, device: Device) -> Tensor {
    let flat: Vec<f64> = REFERENCE.iter().flatten().copied().collect();
    Tensor::from_f64(&flat, &[REFERENCE.len(), 3], dtype, device).unwrap()
}

fn queries(count: usize, dtype: Dtype, device: Device) -> Tensor {
    let flat: Vec<f64> = (0..count).flat_map(|_| QUERY).collect();
    Tensor::from_f64(&flat, &[count, 3], dtype, device).unwrap()
}

fn assert_distances(actual: &Tensor, expected: &[f64]) {
    let actual = actual.to_f64_vec();
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert_relative_eq!(*a, *e, epsilon = 1e-6);
    }
}

// =============================================================================
// Scenarios, parameterized by device and dtype
// =============================================================================

fn knn_scenario(dtype: Dtype, device: Device) {
    let mut nns = NearestNeighborSearch::new(points(dtype, device)).unwrap();
    nns.knn_index().unwrap();

    let result = nns.knn_search(&queries(1, dtype, device), 3).unwrap();
    assert_eq!(result.indices.shape(), &[1, 3]);
    assert_eq!(result.indices.dtype(), Dtype::Int64);
    assert_eq!(result.indices.as_slice::<i64>().unwrap(), &[1, 4, 9]);
    assert_eq!(result.distances.dtype(), dtype);
    assert_eq!(result.distances.device(), device);
    assert_distances(&result.distances, &[0.006_263_58, 0.007_479_38, 0.010_891_2]);

    let result = nns.knn_search(&queries(2, dtype, device), 3).unwrap();
    assert_eq!(result.indices.shape(), &[2, 3]);
    assert_eq!(result.indices.as_slice::<i64>().unwrap(), &[1, 4, 9, 1, 4, 9]);
}

fn fixed_radius_scenario(dtype: Dtype, device: Device) {
    let mut nns = NearestNeighborSearch::new(points(dtype, device)).unwrap();
    nns.fixed_radius_index(0.1).unwrap();

    let result = nns.fixed_radius_search(&queries(1, dtype, device), 0.1).unwrap();
    assert_eq!(result.indices.as_slice::<i64>().unwrap(), &[1, 4]);
    assert_eq!(result.counts.as_slice::<i64>().unwrap(), &[2]);
    assert_distances(&result.distances, &[0.006_263_58, 0.007_479_38]);

    let result = nns.fixed_radius_search(&queries(2, dtype, device), 0.1).unwrap();
    assert_eq!(result.indices.as_slice::<i64>().unwrap(), &[1, 4, 1, 4]);
    assert_eq!(result.counts.as_slice::<i64>().unwrap(), &[2, 2]);
    assert_eq!(result.row_splits().as_slice::<i64>().unwrap(), &[0, 2, 4]);
}

fn hybrid_scenario(dtype: Dtype, device: Device) {
    let mut nns = NearestNeighborSearch::new(points(dtype, device)).unwrap();
    nns.hybrid_index(None).unwrap();

    let result = nns.hybrid_search(&queries(1, dtype, device), 0.1, 3).unwrap();
    assert_eq!(result.indices.shape(), &[1, 3]);
    assert_eq!(result.indices.as_slice::<i64>().unwrap(), &[1, 4, -1]);
    assert_eq!(result.counts.as_slice::<i64>().unwrap(), &[2]);
    assert_distances(&result.distances, &[0.006_263_58, 0.007_479_38, 0.0]);

    let result = nns.hybrid_search(&queries(2, dtype, device), 0.1, 1).unwrap();
    assert_eq!(result.indices.as_slice::<i64>().unwrap(), &[1, 1]);
    assert_eq!(result.counts.as_slice::<i64>().unwrap(), &[1, 1]);
}

// =============================================================================
// CPU
// =============================================================================

#[test]
fn knn_on_cpu() {
    knn_scenario(Dtype::Float32, Device::Cpu);
    knn_scenario(Dtype::Float64, Device::Cpu);
}

#[test]
fn fixed_radius_on_cpu() {
    fixed_radius_scenario(Dtype::Float32, Device::Cpu);
    fixed_radius_scenario(Dtype::Float64, Device::Cpu);
}

#[test]
fn fixed_radius_unsorted_on_cpu() {
    let mut nns = NearestNeighborSearch::with_config(
        points(Dtype::Float64, Device::Cpu),
        SearchConfig::unsorted(),
    )
    .unwrap();
    nns.fixed_radius_index(0.11).unwrap();
    let query = Tensor::from_rows(&[[0.0_f64, 0.1, 0.1]], Device::Cpu);
    let result = nns.fixed_radius_search(&query, 0.11).unwrap();
    assert_eq!(result.indices.as_slice::<i64>().unwrap(), &[1, 3, 4, 5, 7]);
}

#[test]
fn fixed_radius_search_at_other_radius() {
    let mut nns = NearestNeighborSearch::new(points(Dtype::Float64, Device::Cpu)).unwrap();
    nns.fixed_radius_index(0.05).unwrap();
    let result = nns
        .fixed_radius_search(&queries(1, Dtype::Float64, Device::Cpu), 0.1)
        .unwrap();
    assert_eq!(result.indices.as_slice::<i64>().unwrap(), &[1, 4]);
}

#[test]
fn hybrid_on_cpu() {
    hybrid_scenario(Dtype::Float32, Device::Cpu);
    hybrid_scenario(Dtype::Float64, Device::Cpu);
}

#[test]
fn multi_radius_on_cpu() {
    let mut nns = NearestNeighborSearch::new(points(Dtype::Float64, Device::Cpu)).unwrap();
    nns.multi_radius_index().unwrap();

    let radii = Tensor::from_vec(vec![0.1_f64, 0.105], &[2], Device::Cpu).unwrap();
    let result = nns
        .multi_radius_search(&queries(2, Dtype::Float64, Device::Cpu), &radii)
        .unwrap();
    assert_eq!(result.indices.as_slice::<i64>().unwrap(), &[1, 4, 1, 4, 9]);
    assert_eq!(result.counts.as_slice::<i64>().unwrap(), &[2, 3]);
    assert_eq!(result.row_splits().as_slice::<i64>().unwrap(), &[0, 2, 5]);
}

#[test]
fn knn_larger_than_dataset_returns_everything() {
    let mut nns = NearestNeighborSearch::new(points(Dtype::Float64, Device::Cpu)).unwrap();
    nns.knn_index().unwrap();
    let result = nns
        .knn_search(&queries(1, Dtype::Float64, Device::Cpu), 100)
        .unwrap();
    assert_eq!(result.indices.shape(), &[1, 10]);
    let mut indices = result.indices.as_slice::<i64>().unwrap().to_vec();
    indices.sort_unstable();
    assert_eq!(indices, (0..10).collect::<Vec<i64>>());
    let distances = result.distances.to_f64_vec();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn serial_and_parallel_agree() {
    let dataset = points(Dtype::Float64, Device::Cpu);
    let mut serial = NearestNeighborSearch::with_config(dataset.clone(), SearchConfig::serial()).unwrap();
    let mut parallel = NearestNeighborSearch::new(dataset).unwrap();
    serial.fixed_radius_index(0.15).unwrap();
    parallel.fixed_radius_index(0.15).unwrap();

    let query = Tensor::from_rows(
        &[[0.0_f64, 0.0, 0.0], [0.0, 0.1, 0.1], [0.05, 0.05, 0.05], [1.0, 1.0, 1.0]],
        Device::Cpu,
    );
    assert_eq!(
        serial.fixed_radius_search(&query, 0.15).unwrap(),
        parallel.fixed_radius_search(&query, 0.15).unwrap()
    );
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn every_search_requires_its_own_index() {
    let mut nns = NearestNeighborSearch::new(points(Dtype::Float64, Device::Cpu)).unwrap();
    let query = queries(1, Dtype::Float64, Device::Cpu);
    let radii = Tensor::from_vec(vec![0.1_f64], &[1], Device::Cpu).unwrap();

    nns.multi_radius_index().unwrap();
    let errors = [
        nns.knn_search(&query, 1).unwrap_err(),
        nns.fixed_radius_search(&query, 0.1).unwrap_err(),
        nns.hybrid_search(&query, 0.1, 1).unwrap_err(),
    ];
    for err in &errors {
        assert_eq!(err.category(), ErrorCategory::State, "{err}");
    }
    assert!(nns.multi_radius_search(&query, &radii).is_ok());
}

#[test]
fn invalid_datasets_are_input_errors() {
    let cases = [
        Tensor::zeros(&[0, 3], Dtype::Float32, Device::Cpu),
        Tensor::zeros(&[5, 2], Dtype::Float32, Device::Cpu),
        Tensor::zeros(&[15], Dtype::Float32, Device::Cpu),
        Tensor::zeros(&[5, 3], Dtype::Int32, Device::Cpu),
    ];
    for points in cases {
        let err = NearestNeighborSearch::new(points).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Input, "{err}");
    }
}

#[test]
fn query_mismatches_are_input_errors() {
    let mut nns = NearestNeighborSearch::new(points(Dtype::Float32, Device::Cpu)).unwrap();
    nns.knn_index().unwrap();

    let wrong_dtype = queries(1, Dtype::Float64, Device::Cpu);
    let wrong_width = Tensor::zeros(&[1, 2], Dtype::Float32, Device::Cpu);
    let wrong_device = queries(1, Dtype::Float32, Device::Gpu(0));
    for query in [wrong_dtype, wrong_width, wrong_device] {
        let err = nns.knn_search(&query, 1).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Input, "{err}");
    }
}

#[test]
fn multi_radius_radii_must_match_queries() {
    let mut nns = NearestNeighborSearch::new(points(Dtype::Float64, Device::Cpu)).unwrap();
    nns.multi_radius_index().unwrap();
    let query = queries(2, Dtype::Float64, Device::Cpu);

    let too_few = Tensor::from_vec(vec![0.1_f64], &[1], Device::Cpu).unwrap();
    assert!(matches!(
        nns.multi_radius_search(&query, &too_few),
        Err(NnsError::Tensor(_))
    ));
    let wrong_dtype = Tensor::from_vec(vec![0.1_f32, 0.1], &[2], Device::Cpu).unwrap();
    assert!(matches!(
        nns.multi_radius_search(&query, &wrong_dtype),
        Err(NnsError::Tensor(_))
    ));
}

#[test]
fn hybrid_zero_max_knn_rejected() {
    let mut nns = NearestNeighborSearch::new(points(Dtype::Float64, Device::Cpu)).unwrap();
    nns.hybrid_index(Some(0.1)).unwrap();
    let err = nns
        .hybrid_search(&queries(1, Dtype::Float64, Device::Cpu), 0.1, 0)
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Input);
}

// =============================================================================
// Every available device (run with --ignored)
// =============================================================================

#[test]
#[ignore = "Requires GPU"]
fn scenarios_on_all_devices() {
    for device in available_devices() {
        for dtype in [Dtype::Float32, Dtype::Float64] {
            knn_scenario(dtype, device);
            fixed_radius_scenario(dtype, device);
            hybrid_scenario(dtype, device);
        }
    }
}

#[test]
#[ignore = "Requires GPU"]
fn multi_radius_rejected_on_gpu() {
    if !available_devices().contains(&Device::Gpu(0)) {
        return;
    }
    let mut nns = NearestNeighborSearch::new(points(Dtype::Float32, Device::Gpu(0))).unwrap();
    let err = nns.multi_radius_index().unwrap_err();
    assert!(matches!(
        err,
        NnsError::Unsupported {
            kind: SearchKind::MultiRadius,
            device: Device::Gpu(0)
        }
    ));
    assert_eq!(err.category(), ErrorCategory::Capability);
}

#[test]
#[ignore = "Requires GPU"]
fn gpu_knn_limit_is_capability_error() {
    if !available_devices().contains(&Device::Gpu(0)) {
        return;
    }
    let flat: Vec<f64> = (0..300).map(f64::from).collect();
    let dataset = Tensor::from_f64(&flat, &[100, 3], Dtype::Float32, Device::Gpu(0)).unwrap();
    let mut nns = NearestNeighborSearch::new(dataset).unwrap();
    nns.knn_index().unwrap();
    let query = queries(1, Dtype::Float32, Device::Gpu(0));
    let err = nns.knn_search(&query, 65).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Capability);
    assert!(nns.knn_search(&query, 64).is_ok());
}
