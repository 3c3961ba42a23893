//! Elastoplastic continuum integrated on the full stress tensor.
//!
//! An acoustic step is `PlasticMomentumRelaxation`, then optionally `StressDiffusion`,
//! then `PlasticStressRelaxation`. The stress rate stored by the second half (including
//! any diffusion contribution) is reused by the next step's first half.

use glam::{Mat3, Vec3};

use super::continuum::{KERNEL_CORRECTION_MATRIX, VELOCITY_GRADIENT, VON_MISES_STRESS};
use super::fluid::DENSITY_CHANGE_RATE;
use super::{InteractionContext, ParticleDynamics};
use crate::fields::FieldHandle;
use crate::materials::{Constitutive, Material, PlasticContinuum};
use crate::math::{outer, trace, von_mises};
use crate::particle::ParticleSet;

pub const STRESS_TENSOR: &str = "StressTensor";
pub const STRESS_RATE: &str = "StressRate";
pub const DIFFUSION_STRESS_RATE: &str = "DiffusionStressRate";

/// Momentum from the full stress: `dv/dt = Σ (σ_i + σ_j) e_ij dW_ij V_j / ρ_i + f_prior / m`.
///
/// Initialization advances density and stress by half a step from their stored rates
/// and moves the particle half a step. Update writes velocity.
#[derive(Debug)]
pub struct PlasticMomentumRelaxation<M: Constitutive> {
    material: M,
    stress: FieldHandle<Mat3>,
    stress_rate: FieldHandle<Mat3>,
    drho_dt: FieldHandle<f32>,
}

impl<M: Constitutive> PlasticMomentumRelaxation<M> {
    pub fn new(particles: &mut ParticleSet, material: M) -> Self {
        Self {
            material,
            stress: particles.fields.register(STRESS_TENSOR, Mat3::ZERO),
            stress_rate: particles.fields.register(STRESS_RATE, Mat3::ZERO),
            drho_dt: particles.fields.register(DENSITY_CHANGE_RATE, 0.0),
        }
    }

    pub fn material(&self) -> &M {
        &self.material
    }
}

impl<M: Constitutive> ParticleDynamics for PlasticMomentumRelaxation<M> {
    type Accumulation = Vec3;

    fn name(&self) -> &'static str {
        "PlasticMomentumRelaxation"
    }

    fn initialization(&self, particles: &mut ParticleSet, i: usize, dt: f32) {
        particles.density[i] += particles.fields.get(self.drho_dt)[i] * dt * 0.5;
        let rate = particles.fields.get(self.stress_rate)[i];
        particles.fields.get_mut(self.stress)[i] += rate * (0.5 * dt);
        particles.position[i] += particles.velocity[i] * dt * 0.5;
    }

    fn interaction(&self, ctx: &InteractionContext<'_>, i: usize, _dt: f32) -> Vec3 {
        let stress = ctx.particles.fields.get(self.stress);
        let mut acceleration = Vec3::ZERO;
        for n in ctx.inner_neighbors(i) {
            acceleration += (stress[i] + stress[n.j]) * n.e_ij * n.dw_ij_v_j;
        }
        acceleration / ctx.particles.density[i]
    }

    fn update(&self, particles: &mut ParticleSet, i: usize, acceleration: Vec3, dt: f32) {
        particles.velocity[i] += (acceleration + particles.force_prior[i] / particles.mass[i]) * dt;
    }
}

/// Velocity gradient and density rate of one particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlasticRates {
    pub velocity_gradient: Mat3,
    pub drho_dt: f32,
}

impl Default for PlasticRates {
    fn default() -> Self {
        Self {
            velocity_gradient: Mat3::ZERO,
            drho_dt: 0.0,
        }
    }
}

/// Stress update with return mapping.
///
/// Initialization moves the particle the second half step. Update advances density,
/// integrates `σ̇ = material rate + diffusion rate` over half a step, projects the
/// stress onto the yield surface and refreshes pressure and von Mises stress.
#[derive(Debug)]
pub struct PlasticStressRelaxation<M: Constitutive> {
    material: M,
    stress: FieldHandle<Mat3>,
    stress_rate: FieldHandle<Mat3>,
    velocity_gradient: FieldHandle<Mat3>,
    drho_dt: FieldHandle<f32>,
    von_mises_stress: FieldHandle<f32>,
    correction: Option<FieldHandle<Mat3>>,
    diffusion: Option<FieldHandle<Mat3>>,
}

impl<M: Constitutive> PlasticStressRelaxation<M> {
    pub fn new(particles: &mut ParticleSet, material: M) -> Self {
        let f = &mut particles.fields;
        Self {
            material,
            stress: f.register(STRESS_TENSOR, Mat3::ZERO),
            stress_rate: f.register(STRESS_RATE, Mat3::ZERO),
            velocity_gradient: f.register(VELOCITY_GRADIENT, Mat3::ZERO),
            drho_dt: f.register(DENSITY_CHANGE_RATE, 0.0),
            von_mises_stress: f.register(VON_MISES_STRESS, 0.0),
            correction: f.handle(KERNEL_CORRECTION_MATRIX),
            diffusion: f.handle(DIFFUSION_STRESS_RATE),
        }
    }

    /// Use "KernelCorrectionMatrix" in the velocity gradient.
    pub fn with_kernel_correction(mut self, particles: &mut ParticleSet) -> Self {
        self.correction = Some(particles.fields.register(KERNEL_CORRECTION_MATRIX, Mat3::IDENTITY));
        self
    }

    /// Add "DiffusionStressRate" to the constitutive stress rate.
    pub fn with_stress_diffusion(mut self, particles: &mut ParticleSet) -> Self {
        self.diffusion = Some(particles.fields.register(DIFFUSION_STRESS_RATE, Mat3::ZERO));
        self
    }
}

impl<M: Constitutive> ParticleDynamics for PlasticStressRelaxation<M> {
    type Accumulation = PlasticRates;

    fn name(&self) -> &'static str {
        "PlasticStressRelaxation"
    }

    fn initialization(&self, particles: &mut ParticleSet, i: usize, dt: f32) {
        particles.position[i] += particles.velocity[i] * dt * 0.5;
    }

    fn interaction(&self, ctx: &InteractionContext<'_>, i: usize, _dt: f32) -> PlasticRates {
        let vel = &ctx.particles.velocity;
        let b_i = self
            .correction
            .map_or(Mat3::IDENTITY, |h| ctx.particles.fields.get(h)[i]);
        let mut velocity_gradient = Mat3::ZERO;
        let mut divergence_sum = 0.0;
        for n in ctx.inner_neighbors(i) {
            let v_ij = vel[i] - vel[n.j];
            velocity_gradient -= outer(v_ij, b_i * n.e_ij * n.dw_ij_v_j);
            divergence_sum += v_ij.dot(n.e_ij) * n.dw_ij_v_j;
        }
        PlasticRates {
            velocity_gradient,
            drho_dt: divergence_sum * ctx.particles.density[i],
        }
    }

    fn update(&self, particles: &mut ParticleSet, i: usize, rates: PlasticRates, dt: f32) {
        particles.density[i] += rates.drho_dt * dt * 0.5;
        let f = &mut particles.fields;
        f.get_mut(self.drho_dt)[i] = rates.drho_dt;
        f.get_mut(self.velocity_gradient)[i] = rates.velocity_gradient;

        let stress = f.get(self.stress)[i];
        let mut rate = self.material.stress_rate(&rates.velocity_gradient, &stress);
        if let Some(diffusion) = self.diffusion {
            rate += f.get(diffusion)[i];
        }
        f.get_mut(self.stress_rate)[i] = rate;

        let stress = self.material.return_mapping(stress + rate * (0.5 * dt));
        f.get_mut(self.stress)[i] = stress;
        f.get_mut(self.von_mises_stress)[i] = von_mises(&stress);
        particles.pressure[i] = -trace(&stress) / 3.0;
    }
}

/// Smoothing of the stress field relative to a geostatic state.
///
/// `σ̇_i = Σ 2 ζ h c0 Δσ_ij r_ij dW_ij V_j / (r_ij² + 0.01 h²)`, where `Δσ_ij` has the
/// lithostatic gradient `ρ0 g y_ij` removed (scaled by `1 - sin φ` horizontally) and
/// `g = |f_prior,y| / m`. Update writes "DiffusionStressRate".
#[derive(Debug)]
pub struct StressDiffusion {
    zeta: f32,
    smoothing_length: f32,
    sound_speed: f32,
    reference_density: f32,
    friction_angle: f32,
    stress: FieldHandle<Mat3>,
    diffusion: FieldHandle<Mat3>,
}

impl StressDiffusion {
    pub fn new(
        particles: &mut ParticleSet,
        material: &PlasticContinuum,
        smoothing_length: f32,
    ) -> Self {
        Self {
            zeta: 0.1,
            smoothing_length,
            sound_speed: material.reference_sound_speed(),
            reference_density: material.reference_density(),
            friction_angle: material.friction_angle(),
            stress: particles.fields.register(STRESS_TENSOR, Mat3::ZERO),
            diffusion: particles.fields.register(DIFFUSION_STRESS_RATE, Mat3::ZERO),
        }
    }

    pub fn with_zeta(mut self, zeta: f32) -> Self {
        self.zeta = zeta;
        self
    }
}

impl ParticleDynamics for StressDiffusion {
    type Accumulation = Mat3;

    fn name(&self) -> &'static str {
        "StressDiffusion"
    }

    fn interaction(&self, ctx: &InteractionContext<'_>, i: usize, _dt: f32) -> Mat3 {
        let p = ctx.particles;
        let gravity = (p.force_prior[i].y / p.mass[i]).abs();
        let stress = p.fields.get(self.stress);
        let h = self.smoothing_length;
        let lateral = 1.0 - self.friction_angle.sin();
        let coefficient = 2.0 * self.zeta * h * self.sound_speed;

        let mut rate = Mat3::ZERO;
        for n in ctx.inner_neighbors(i) {
            let y_ij = p.position[i].y - p.position[n.j].y;
            let geostatic = self.reference_density * gravity * y_ij;
            let mut difference = stress[i] - stress[n.j];
            difference.x_axis.x -= lateral * geostatic;
            difference.y_axis.y -= geostatic;
            difference.z_axis.z -= lateral * geostatic;
            let weight = n.r_ij * n.dw_ij_v_j / (n.r_ij * n.r_ij + 0.01 * h * h);
            rate += difference * (coefficient * weight);
        }
        rate
    }

    fn update(&self, particles: &mut ParticleSet, i: usize, rate: Mat3, _dt: f32) {
        particles.fields.get_mut(self.diffusion)[i] = rate;
    }
}
