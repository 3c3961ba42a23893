//! Signed-distance fields sampled on regular grids.

use glam::Vec3;

use crate::config::Dimensions;
use crate::error::{Result, SphError};
use crate::shapes::{BoundingBox, Shape};

/// Padding around the shape bounds, in grid cells.
const PADDING_CELLS: f32 = 4.0;

/// Signed distance sampled on the nodes of one regular grid.
#[derive(Clone, Debug)]
pub struct LevelSetGrid {
    dimensions: Dimensions,
    origin: Vec3,
    spacing: f32,
    nodes: [usize; 3],
    phi: Vec<f32>,
}

impl LevelSetGrid {
    pub fn new(shape: &dyn Shape, spacing: f32, dimensions: Dimensions) -> Result<Self> {
        if !(spacing > 0.0 && spacing.is_finite()) {
            return Err(SphError::InvalidSpacing(spacing));
        }
        let bounds = shape.bounds();
        let pad = Vec3::splat(PADDING_CELLS * spacing);
        let mut origin = bounds.lower - pad;
        let extent = bounds.extent() + 2.0 * pad;
        let axis = |len: f32| (len / spacing).ceil() as usize + 1;
        let nodes = match dimensions {
            Dimensions::Two => {
                origin.z = 0.0;
                [axis(extent.x), axis(extent.y), 1]
            }
            Dimensions::Three => [axis(extent.x), axis(extent.y), axis(extent.z)],
        };

        let mut phi = Vec::with_capacity(nodes[0] * nodes[1] * nodes[2]);
        for k in 0..nodes[2] {
            for j in 0..nodes[1] {
                for i in 0..nodes[0] {
                    let node = origin + Vec3::new(i as f32, j as f32, k as f32) * spacing;
                    phi.push(shape.signed_distance(node));
                }
            }
        }
        Ok(Self {
            dimensions,
            origin,
            spacing,
            nodes,
            phi,
        })
    }

    #[inline]
    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    /// Region covered by grid nodes.
    pub fn bounds(&self) -> BoundingBox {
        let upper = self.origin
            + Vec3::new(
                (self.nodes[0] - 1) as f32,
                (self.nodes[1] - 1) as f32,
                (self.nodes[2] - 1) as f32,
            ) * self.spacing;
        BoundingBox::new(self.origin, upper)
    }

    pub fn contains(&self, x: Vec3) -> bool {
        let b = self.bounds();
        match self.dimensions {
            Dimensions::Two => {
                x.x >= b.lower.x && x.x <= b.upper.x && x.y >= b.lower.y && x.y <= b.upper.y
            }
            Dimensions::Three => b.contains(x),
        }
    }

    /// Interpolated signed distance; linear extrapolation outside the sampled box.
    pub fn probe_signed_distance(&self, x: Vec3) -> f32 {
        let b = self.bounds();
        let mut clamped = b.clamp(x);
        let mut offset = x - clamped;
        if self.dimensions == Dimensions::Two {
            clamped.z = 0.0;
            offset.z = 0.0;
        }
        self.interpolate(clamped) + offset.length()
    }

    /// Outward unit normal from central differences, zero where the gradient vanishes.
    pub fn probe_normal_direction(&self, x: Vec3) -> Vec3 {
        let d = self.spacing;
        let diff = |axis: Vec3| {
            self.probe_signed_distance(x + axis * d) - self.probe_signed_distance(x - axis * d)
        };
        let gradient = Vec3::new(
            diff(Vec3::X),
            diff(Vec3::Y),
            match self.dimensions {
                Dimensions::Two => 0.0,
                Dimensions::Three => diff(Vec3::Z),
            },
        );
        gradient.normalize_or_zero()
    }

    fn node(&self, i: usize, j: usize, k: usize) -> f32 {
        self.phi[(k * self.nodes[1] + j) * self.nodes[0] + i]
    }

    /// Multilinear interpolation at a point inside the sampled box.
    fn interpolate(&self, x: Vec3) -> f32 {
        let local = (x - self.origin) / self.spacing;
        let split = |v: f32, n: usize| -> (usize, f32) {
            if n < 2 {
                return (0, 0.0);
            }
            let base = (v.floor().max(0.0) as usize).min(n - 2);
            (base, (v - base as f32).clamp(0.0, 1.0))
        };
        let (i, fx) = split(local.x, self.nodes[0]);
        let (j, fy) = split(local.y, self.nodes[1]);
        let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
        let bilinear = |k: usize| {
            let bottom = lerp(self.node(i, j, k), self.node(i + 1, j, k), fx);
            let top = lerp(self.node(i, j + 1, k), self.node(i + 1, j + 1, k), fx);
            lerp(bottom, top, fy)
        };
        match self.dimensions {
            Dimensions::Two => bilinear(0),
            Dimensions::Three => {
                let (k, fz) = split(local.z, self.nodes[2]);
                lerp(bilinear(k), bilinear(k + 1), fz)
            }
        }
    }
}

/// Nested level-set grids, coarsest first; each level halves the spacing.
#[derive(Clone, Debug)]
pub struct LevelSet {
    levels: Vec<LevelSetGrid>,
}

impl LevelSet {
    pub fn new(
        shape: &dyn Shape,
        coarsest_spacing: f32,
        total_levels: usize,
        dimensions: Dimensions,
    ) -> Result<Self> {
        if total_levels == 0 {
            return Err(SphError::InvalidConfig("a level set needs at least one level".into()));
        }
        let levels = (0..total_levels)
            .map(|l| LevelSetGrid::new(shape, coarsest_spacing / (1u32 << l) as f32, dimensions))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { levels })
    }

    pub fn total_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, l: usize) -> Option<&LevelSetGrid> {
        self.levels.get(l)
    }

    fn finest(&self) -> &LevelSetGrid {
        &self.levels[self.levels.len() - 1]
    }

    /// Level whose resolution matches a particle's smoothing-length ratio.
    pub fn level_for(&self, h_ratio: f32) -> usize {
        let l = h_ratio.max(1.0).log2().floor() as usize;
        l.min(self.levels.len() - 1)
    }

    pub fn probe_signed_distance(&self, x: Vec3) -> f32 {
        self.finest().probe_signed_distance(x)
    }

    /// Probe at level `l`, clamped to the available levels.
    pub fn probe_signed_distance_at_level(&self, l: usize, x: Vec3) -> f32 {
        self.levels[l.min(self.levels.len() - 1)].probe_signed_distance(x)
    }

    pub fn probe_normal_direction(&self, x: Vec3) -> Vec3 {
        self.finest().probe_normal_direction(x)
    }

    pub fn probe_is_within_mesh_bound(&self, x: Vec3) -> bool {
        self.finest().contains(x)
    }
}

/// A level set stands in for the shape it was sampled from.
impl Shape for LevelSet {
    fn signed_distance(&self, point: Vec3) -> f32 {
        self.probe_signed_distance(point)
    }

    fn bounds(&self) -> BoundingBox {
        self.finest().bounds()
    }
}
