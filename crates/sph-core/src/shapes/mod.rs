//! Geometry collaborators: anything that can answer signed-distance queries.
//!
//! Level sets, adaptive spacing and lattice particle generation only ever talk to the
//! [`Shape`] trait; concrete primitives live in [`primitives`].
pub mod primitives;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::config::Dimensions;
use crate::error::{Result, SphError};

/// Axis-aligned box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lower: Vec3,
    pub upper: Vec3,
}

impl BoundingBox {
    pub fn new(lower: Vec3, upper: Vec3) -> Self {
        Self { lower, upper }
    }

    /// Fails unless every axis has `lower < upper` and both corners are finite.
    pub fn validate(&self) -> Result<()> {
        let ok = self.lower.is_finite()
            && self.upper.is_finite()
            && self.lower.cmplt(self.upper).all();
        if ok {
            Ok(())
        } else {
            Err(SphError::InvalidDomain {
                lower: self.lower.to_array(),
                upper: self.upper.to_array(),
            })
        }
    }

    #[inline]
    pub fn extent(&self) -> Vec3 {
        self.upper - self.lower
    }

    #[inline]
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.lower).all() && point.cmple(self.upper).all()
    }

    #[inline]
    pub fn clamp(&self, point: Vec3) -> Vec3 {
        point.clamp(self.lower, self.upper)
    }

    pub fn expanded(&self, margin: f32) -> Self {
        Self::new(self.lower - Vec3::splat(margin), self.upper + Vec3::splat(margin))
    }

    /// Collapse the z extent to the plane `z = 0`, padded by `margin`.
    pub fn planar(&self, margin: f32) -> Self {
        Self::new(
            Vec3::new(self.lower.x, self.lower.y, -margin),
            Vec3::new(self.upper.x, self.upper.y, margin),
        )
    }
}

/// Shape boundary representation consumed by level sets and particle generation.
///
/// Signed distance is negative inside and positive outside.
pub trait Shape: Send + Sync {
    fn signed_distance(&self, point: Vec3) -> f32;

    fn contains_point(&self, point: Vec3) -> bool {
        self.signed_distance(point) < 0.0
    }

    fn bounds(&self) -> BoundingBox;
}

/// Regular lattice positions (cell-centred, spacing `spacing`) inside `shape`.
///
/// In 2D the lattice lies in the `z = 0` plane.
pub fn lattice_positions(
    shape: &dyn Shape,
    spacing: f32,
    dimensions: Dimensions,
) -> Result<Vec<Vec3>> {
    if !(spacing > 0.0 && spacing.is_finite()) {
        return Err(SphError::InvalidSpacing(spacing));
    }
    let bounds = shape.bounds();
    let extent = bounds.extent();
    let nx = (extent.x / spacing).floor().max(0.0) as usize;
    let ny = (extent.y / spacing).floor().max(0.0) as usize;
    let nz = match dimensions {
        Dimensions::Two => 1,
        Dimensions::Three => (extent.z / spacing).floor().max(0.0) as usize,
    };

    let mut positions = Vec::new();
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let z = match dimensions {
                    Dimensions::Two => 0.0,
                    Dimensions::Three => bounds.lower.z + (k as f32 + 0.5) * spacing,
                };
                let p = Vec3::new(
                    bounds.lower.x + (i as f32 + 0.5) * spacing,
                    bounds.lower.y + (j as f32 + 0.5) * spacing,
                    z,
                );
                if shape.contains_point(p) {
                    positions.push(p);
                }
            }
        }
    }
    Ok(positions)
}
