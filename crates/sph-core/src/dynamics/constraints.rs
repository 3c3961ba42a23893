//! Kinematic constraints applied directly to particle positions and velocities.

use glam::Vec3;

use super::{InteractionContext, ParticleDynamics};
use crate::adaptation::Adaptation;
use crate::error::{Result, SphError};
use crate::level_set::LevelSet;
use crate::particle::ParticleSet;
use crate::time_step::TimeContext;

/// Keeps particles at least `constrained_distance` inside a level-set surface.
///
/// A particle with `φ > -d` is pushed back along the outward normal by `φ + d`.
#[derive(Debug)]
pub struct SurfaceBounding {
    level_set: LevelSet,
    constrained_distance: f32,
}

impl SurfaceBounding {
    pub fn new(level_set: LevelSet, constrained_distance: f32) -> Result<Self> {
        if !(constrained_distance >= 0.0 && constrained_distance.is_finite()) {
            return Err(SphError::InvalidConfig(format!(
                "constrained distance must be non-negative, got {constrained_distance}"
            )));
        }
        Ok(Self {
            level_set,
            constrained_distance,
        })
    }

    /// Half the finest particle spacing of `adaptation`.
    pub fn for_adaptation(level_set: LevelSet, adaptation: &Adaptation) -> Result<Self> {
        Self::new(level_set, 0.5 * adaptation.minimum_spacing())
    }

    pub fn constrained_distance(&self) -> f32 {
        self.constrained_distance
    }
}

impl ParticleDynamics for SurfaceBounding {
    type Accumulation = Vec3;

    fn name(&self) -> &'static str {
        "SurfaceBounding"
    }

    fn interaction(&self, ctx: &InteractionContext<'_>, i: usize, _dt: f32) -> Vec3 {
        let x = ctx.particles.position[i];
        let phi = self.level_set.probe_signed_distance(x);
        if phi > -self.constrained_distance {
            -(phi + self.constrained_distance) * self.level_set.probe_normal_direction(x)
        } else {
            Vec3::ZERO
        }
    }

    fn update(&self, particles: &mut ParticleSet, i: usize, shift: Vec3, _dt: f32) {
        particles.position[i] += shift;
    }
}

/// Multiplies the velocity of selected particles component-wise by `axis_mask`.
///
/// A zero component pins that axis, a one leaves it free.
#[derive(Debug)]
pub struct FixedInAxisDirection {
    axis_mask: Vec3,
    selected: Vec<bool>,
}

impl FixedInAxisDirection {
    pub fn new(particles: &ParticleSet, part: &[usize], axis_mask: Vec3) -> Result<Self> {
        let mut selected = vec![false; particles.len()];
        for &i in part {
            *selected.get_mut(i).ok_or_else(|| {
                SphError::InvalidConfig(format!(
                    "particle {i} is outside a body of {} particles",
                    particles.len()
                ))
            })? = true;
        }
        Ok(Self {
            axis_mask,
            selected,
        })
    }

    pub fn whole_body(particles: &ParticleSet, axis_mask: Vec3) -> Self {
        Self {
            axis_mask,
            selected: vec![true; particles.len()],
        }
    }
}

impl ParticleDynamics for FixedInAxisDirection {
    type Accumulation = ();

    fn name(&self) -> &'static str {
        "FixedInAxisDirection"
    }

    fn interaction(&self, _ctx: &InteractionContext<'_>, _i: usize, _dt: f32) {}

    fn update(&self, particles: &mut ParticleSet, i: usize, _: (), _dt: f32) {
        if self.selected.get(i).copied().unwrap_or(false) {
            particles.velocity[i] *= self.axis_mask;
        }
    }
}

/// Removes the mass-centre velocity of a body along the axes selected by `axis_mask`.
#[derive(Debug)]
pub struct ConstrainMassCenter {
    axis_mask: Vec3,
    correction: Vec3,
}

impl ConstrainMassCenter {
    pub fn new(axis_mask: Vec3) -> Self {
        Self {
            axis_mask,
            correction: Vec3::ZERO,
        }
    }

    /// Velocity subtracted from every particle in the last pass.
    pub fn correction(&self) -> Vec3 {
        self.correction
    }
}

impl ParticleDynamics for ConstrainMassCenter {
    type Accumulation = ();

    fn name(&self) -> &'static str {
        "ConstrainMassCenter"
    }

    fn setup(&mut self, particles: &mut ParticleSet, _time: &TimeContext, _dt: f32) {
        let total_mass: f32 = particles.mass.iter().sum();
        let momentum: Vec3 = particles
            .mass
            .iter()
            .zip(&particles.velocity)
            .map(|(&m, &v)| m * v)
            .sum();
        self.correction = if total_mass > 0.0 {
            self.axis_mask * momentum / total_mass
        } else {
            Vec3::ZERO
        };
    }

    fn interaction(&self, _ctx: &InteractionContext<'_>, _i: usize, _dt: f32) {}

    fn update(&self, particles: &mut ParticleSet, i: usize, _: (), _dt: f32) {
        particles.velocity[i] -= self.correction;
    }
}
