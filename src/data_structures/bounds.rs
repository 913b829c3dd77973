//! Axis-aligned bounding boxes.

use cgmath::{EuclideanSpace, Matrix4, Point3, Transform, Vector3};

/// An axis-aligned bounding box. An empty box has `min > max` on every axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extend(&mut self, p: Point3<f32>) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    pub fn from_points(points: impl IntoIterator<Item = Point3<f32>>) -> Self {
        let mut bounds = Self::empty();
        points.into_iter().for_each(|p| bounds.extend(p));
        bounds
    }

    /// Adds every position of `positions` after transforming it by `matrix`.
    pub fn extend_transformed(&mut self, positions: &[[f32; 3]], matrix: &Matrix4<f32>) {
        for p in positions {
            self.extend(matrix.transform_point(Point3::from(*p)));
        }
    }

    pub fn center(&self) -> Point3<f32> {
        if self.is_empty() {
            return Point3::origin();
        }
        self.min.midpoint(self.max)
    }

    pub fn size(&self) -> Vector3<f32> {
        if self.is_empty() {
            return Vector3::new(0.0, 0.0, 0.0);
        }
        self.max - self.min
    }

    pub fn max_dimension(&self) -> f32 {
        let size = self.size();
        size.x.max(size.y).max(size.z)
    }
}

/// Bounding figures handed out with a normalized asset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingMetrics {
    /// Canonical (post-normalization) bounds.
    pub bounds: BoundingBox,
    /// Bounds of the source geometry before normalization.
    pub raw_bounds: BoundingBox,
    /// Uniform scale that was applied.
    pub scale: f32,
}

impl BoundingMetrics {
    pub fn size(&self) -> Vector3<f32> {
        self.bounds.size()
    }

    pub fn max_dimension(&self) -> f32 {
        self.bounds.max_dimension()
    }

    pub fn center(&self) -> Point3<f32> {
        self.bounds.center()
    }

    /// Radius of the sphere enclosing the canonical bounds.
    pub fn radius(&self) -> f32 {
        use cgmath::InnerSpace;
        self.bounds.size().magnitude() * 0.5
    }
}
