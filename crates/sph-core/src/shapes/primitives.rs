//! Primitive shapes with closed-form signed distances.

use glam::{Vec2, Vec3};

use super::{BoundingBox, Shape};

/// Sphere (or a disc when every query stays in the `z = 0` plane).
#[derive(Clone, Copy, Debug)]
pub struct Ball {
    pub center: Vec3,
    pub radius: f32,
}

impl Ball {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }
}

impl Shape for Ball {
    fn signed_distance(&self, point: Vec3) -> f32 {
        (point - self.center).length() - self.radius
    }

    fn bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.center - Vec3::splat(self.radius),
            self.center + Vec3::splat(self.radius),
        )
    }
}

/// Axis-aligned box given by its centre and half extents.
///
/// A planar cuboid ignores `z` entirely and behaves as a rectangle.
#[derive(Clone, Copy, Debug)]
pub struct Cuboid {
    pub center: Vec3,
    pub half_size: Vec3,
    planar: bool,
}

impl Cuboid {
    pub fn new(center: Vec3, half_size: Vec3) -> Self {
        Self {
            center,
            half_size,
            planar: false,
        }
    }

    pub fn planar(center: Vec2, half_size: Vec2) -> Self {
        Self {
            center: center.extend(0.0),
            half_size: half_size.extend(0.0),
            planar: true,
        }
    }
}

impl Shape for Cuboid {
    fn signed_distance(&self, point: Vec3) -> f32 {
        if self.planar {
            let q = (point.truncate() - self.center.truncate()).abs() - self.half_size.truncate();
            let outside = q.max(Vec2::ZERO).length();
            let inside = q.x.max(q.y).min(0.0);
            return outside + inside;
        }
        let q = (point - self.center).abs() - self.half_size;
        let outside = q.max(Vec3::ZERO).length();
        let inside = q.x.max(q.y).max(q.z).min(0.0);
        outside + inside
    }

    fn bounds(&self) -> BoundingBox {
        let b = BoundingBox::new(self.center - self.half_size, self.center + self.half_size);
        if self.planar {
            b.planar(0.0)
        } else {
            b
        }
    }
}
