//! Recognized per-point attributes.

use std::fmt;
use std::str::FromStr;

use crate::error::GeometryError;

/// A per-point attribute of a [`PointCloud`](crate::PointCloud).
///
/// Every attribute is an `(N, 3)` float tensor.
///
/// # Example
///
/// ```
/// use cloud_geometry::Attribute;
///
/// let attr: Attribute = "normals".parse().unwrap();
/// assert_eq!(attr, Attribute::Normals);
/// assert_eq!(Attribute::Colors.to_string(), "colors");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Attribute {
    /// Positions. Defines the point count.
    Points,
    /// RGB colors.
    Colors,
    /// Unit normals.
    Normals,
}

impl Attribute {
    /// Every attribute, in storage order.
    pub const ALL: [Self; 3] = [Self::Points, Self::Colors, Self::Normals];

    /// The attribute's key in the point map.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::Colors => "colors",
            Self::Normals => "normals",
        }
    }

    /// Whether the attribute moves with the geometry under a linear map.
    #[must_use]
    pub const fn is_directional(self) -> bool {
        matches!(self, Self::Normals)
    }

    pub(crate) const fn slot(self) -> usize {
        match self {
            Self::Points => 0,
            Self::Colors => 1,
            Self::Normals => 2,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| GeometryError::UnknownAttribute(s.to_string()))
    }
}
