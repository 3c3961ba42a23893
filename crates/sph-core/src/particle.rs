use glam::Vec3;

use crate::config::Dimensions;
use crate::error::{Result, SphError};
use crate::fields::FieldStore;

/// SoA particle storage
///
/// The built-in columns are the ones every kernel touches. Anything else (stress
/// tensors, repulsion densities, rates of change) is registered in `fields`.
#[derive(Clone, Debug)]
pub struct ParticleSet {
    pub count: usize,
    pub position: Vec<Vec3>,
    pub velocity: Vec<Vec3>,
    pub density: Vec<f32>,
    pub pressure: Vec<f32>,
    pub mass: Vec<f32>,
    /// Reference volume per particle
    pub volume: Vec<f32>,
    /// Forces computed outside the acoustic loop (gravity, contact repulsion)
    pub force_prior: Vec<Vec3>,
    /// Local smoothing-length ratio, `h_ref / h_i`. 1.0 for uniform bodies
    pub h_ratio: Vec<f32>,
    pub fields: FieldStore,
}

impl ParticleSet {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            position: vec![Vec3::ZERO; count],
            velocity: vec![Vec3::ZERO; count],
            density: vec![0.0; count],
            pressure: vec![0.0; count],
            mass: vec![0.0; count],
            volume: vec![0.0; count],
            force_prior: vec![Vec3::ZERO; count],
            h_ratio: vec![1.0; count],
            fields: FieldStore::new(count),
        }
    }

    /// Particles at rest with reference density, volume `spacing^d` and matching mass.
    pub fn from_positions(
        positions: Vec<Vec3>,
        spacing: f32,
        reference_density: f32,
        dimensions: Dimensions,
    ) -> Result<Self> {
        if !(spacing > 0.0 && spacing.is_finite()) {
            return Err(SphError::InvalidSpacing(spacing));
        }
        let count = positions.len();
        let volume = spacing.powi(dimensions.count() as i32);
        let mut set = Self::new(count);
        set.position = positions;
        set.density.fill(reference_density);
        set.volume.fill(volume);
        set.mass.fill(reference_density * volume);
        Ok(set)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Largest speed over all particles.
    pub fn max_speed(&self) -> f32 {
        self.velocity.iter().map(|v| v.length()).fold(0.0, f32::max)
    }

    /// First non-finite position, velocity or density, as a divergence error.
    pub fn check_finite(&self, time: f32) -> Result<()> {
        for i in 0..self.count {
            let field = if !self.position[i].is_finite() {
                "position"
            } else if !self.velocity[i].is_finite() {
                "velocity"
            } else if !self.density[i].is_finite() {
                "density"
            } else {
                continue;
            };
            return Err(SphError::Diverged { field, index: i, time });
        }
        Ok(())
    }
}
