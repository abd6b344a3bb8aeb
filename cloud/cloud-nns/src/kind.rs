//! Search variants and their capability surface.

use std::fmt;

use cloud_types::Device;

/// The four neighbour-search variants.
///
/// Each variant needs its own preparation step before it can be queried
/// (see [`NearestNeighborSearch`](crate::NearestNeighborSearch)).
///
/// # Example
///
/// ```
/// use cloud_nns::SearchKind;
/// use cloud_types::Device;
///
/// assert!(SearchKind::Knn.supported_on(Device::Gpu(0)));
/// assert!(!SearchKind::MultiRadius.supported_on(Device::Gpu(0)));
/// assert!(!SearchKind::MultiRadius.parallel_queries());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchKind {
    /// k nearest neighbours.
    Knn,
    /// All neighbours within one radius.
    FixedRadius,
    /// Up to `max_knn` nearest neighbours within a radius.
    Hybrid,
    /// All neighbours within a per-query radius.
    MultiRadius,
}

impl SearchKind {
    /// Every variant, in declaration order.
    pub const ALL: [Self; 4] = [Self::Knn, Self::FixedRadius, Self::Hybrid, Self::MultiRadius];

    /// Whether this variant can run on `device`.
    ///
    /// Multi-radius search is host only.
    #[must_use]
    pub const fn supported_on(self, device: Device) -> bool {
        match self {
            Self::Knn | Self::FixedRadius | Self::Hybrid => true,
            Self::MultiRadius => device.is_cpu(),
        }
    }

    /// Whether queries of this variant may be processed concurrently.
    ///
    /// Multi-radius queries always run one after another on a single thread.
    #[must_use]
    pub const fn parallel_queries(self) -> bool {
        !matches!(self, Self::MultiRadius)
    }

    /// Short snake-case name used in logs and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Knn => "knn",
            Self::FixedRadius => "fixed_radius",
            Self::Hybrid => "hybrid",
            Self::MultiRadius => "multi_radius",
        }
    }

    pub(crate) const fn slot(self) -> usize {
        match self {
            Self::Knn => 0,
            Self::FixedRadius => 1,
            Self::Hybrid => 2,
            Self::MultiRadius => 3,
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_supports_everything() {
        for kind in SearchKind::ALL {
            assert!(kind.supported_on(Device::Cpu), "{kind} on CPU");
        }
    }

    #[test]
    fn test_gpu_rejects_multi_radius_only() {
        let gpu = Device::Gpu(0);
        assert!(SearchKind::Knn.supported_on(gpu));
        assert!(SearchKind::FixedRadius.supported_on(gpu));
        assert!(SearchKind::Hybrid.supported_on(gpu));
        assert!(!SearchKind::MultiRadius.supported_on(gpu));
    }

    #[test]
    fn test_parallel_flags() {
        assert!(SearchKind::Knn.parallel_queries());
        assert!(SearchKind::FixedRadius.parallel_queries());
        assert!(SearchKind::Hybrid.parallel_queries());
        assert!(!SearchKind::MultiRadius.parallel_queries());
    }

    #[test]
    fn test_slots_are_distinct() {
        let mut seen = [false; 4];
        for kind in SearchKind::ALL {
            assert!(!seen[kind.slot()]);
            seen[kind.slot()] = true;
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(SearchKind::FixedRadius.to_string(), "fixed_radius");
    }
}
