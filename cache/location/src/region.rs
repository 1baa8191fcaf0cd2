//! Server regions, as reported by the coordinate segmentation service.

use protocol_craq::ServerId;

/// An axis aligned box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    pub const fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    /// Smallest box containing both `self` and `other`.
    pub fn merge(&self, other: &BoundingBox) -> BoundingBox {
        let mut merged = *self;
        for axis in 0..3 {
            merged.min[axis] = merged.min[axis].min(other.min[axis]);
            merged.max[axis] = merged.max[axis].max(other.max[axis]);
        }
        merged
    }

    pub fn center(&self) -> [f64; 3] {
        let mut center = [0.0; 3];
        for (axis, c) in center.iter_mut().enumerate() {
            *c = (self.min[axis] as f64 + self.max[axis] as f64) / 2.0;
        }
        center
    }
}

/// Spatial partitioning of the world across servers.
pub trait CoordinateSegmentation: Send + Sync {
    /// The boxes making up `server`'s region. Empty if unknown.
    fn server_region(&self, server: ServerId) -> Vec<BoundingBox>;
}

/// Center of the bounds enclosing every box of a region.
pub fn region_centroid(region: &[BoundingBox]) -> Option<[f64; 3]> {
    let (first, rest) = region.split_first()?;
    let bounds = rest.iter().fold(*first, |acc, b| acc.merge(b));
    Some(bounds.center())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_of_union() {
        let region = [
            BoundingBox::new([0.0, 0.0, 0.0], [2.0, 2.0, 2.0]),
            BoundingBox::new([4.0, -2.0, 0.0], [6.0, 0.0, 2.0]),
        ];
        assert_eq!(region_centroid(&region), Some([3.0, 0.0, 1.0]));
    }

    #[test]
    fn test_empty_region() {
        assert_eq!(region_centroid(&[]), None);
    }
}
