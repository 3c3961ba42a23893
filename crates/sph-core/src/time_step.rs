use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::adaptation::Adaptation;
use crate::materials::Material;
use crate::math::TINY;
use crate::particle::ParticleSet;

/// Simulation clock, passed explicitly to every stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeContext {
    pub physical_time: f32,
    pub steps: u64,
}

impl TimeContext {
    pub fn advance(&mut self, dt: f32) {
        self.physical_time += dt;
        self.steps += 1;
    }
}

/// Largest value of `f(i)` over the particles (0 when empty).
fn reduce_max<F>(count: usize, f: F) -> f32
where
    F: Fn(usize) -> f32 + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        (0..count).into_par_iter().map(f).reduce(|| 0.0, f32::max)
    }

    #[cfg(not(feature = "parallel"))]
    {
        (0..count).map(f).fold(0.0, f32::max)
    }
}

/// Acoustic CFL bound: `dt = cfl h_min / (max(c + |v|) + ε)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcousticTimeStep {
    pub cfl: f32,
}

impl Default for AcousticTimeStep {
    fn default() -> Self {
        Self { cfl: 0.6 }
    }
}

impl AcousticTimeStep {
    pub fn new(cfl: f32) -> Self {
        Self { cfl }
    }

    pub fn compute(
        &self,
        particles: &ParticleSet,
        material: &dyn Material,
        adaptation: &Adaptation,
    ) -> f32 {
        let signal_speed = reduce_max(particles.len(), |i| {
            let c = material.sound_speed(particles.pressure[i], particles.density[i]);
            c + particles.velocity[i].length()
        });
        self.cfl * adaptation.minimum_smoothing_length() / (signal_speed + TINY)
    }
}

/// Advection CFL bound:
/// `dt = cfl h_min / max(|v|_max, sqrt(h_min |a_prior|_max), reference_speed)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdvectionTimeStep {
    pub cfl: f32,
    pub reference_speed: f32,
}

impl Default for AdvectionTimeStep {
    fn default() -> Self {
        Self {
            cfl: 0.25,
            reference_speed: 1.0,
        }
    }
}

impl AdvectionTimeStep {
    pub fn new(cfl: f32, reference_speed: f32) -> Self {
        Self { cfl, reference_speed }
    }

    pub fn compute(&self, particles: &ParticleSet, adaptation: &Adaptation) -> f32 {
        let h_min = adaptation.minimum_smoothing_length();
        let speed = reduce_max(particles.len(), |i| particles.velocity[i].length());
        let acceleration = reduce_max(particles.len(), |i| {
            let mass = particles.mass[i];
            if mass > 0.0 {
                particles.force_prior[i].length() / mass
            } else {
                0.0
            }
        });
        let bound = speed.max((h_min * acceleration).sqrt()).max(self.reference_speed);
        self.cfl * h_min / (bound + TINY)
    }
}
