//! Shear part of a weakly-compressible continuum: kernel correction, shear stress and
//! the shear acceleration fed back into the momentum equation.

use glam::{Mat3, Vec3};

use super::{InteractionContext, ParticleDynamics};
use crate::config::Dimensions;
use crate::fields::FieldHandle;
use crate::materials::Constitutive;
use crate::math::{is_finite_mat, outer, symmetric, von_mises, TINY};
use crate::particle::ParticleSet;

pub const KERNEL_CORRECTION_MATRIX: &str = "KernelCorrectionMatrix";
pub const ACCELERATION_BY_SHEAR: &str = "AccelerationByShear";
pub const SHEAR_STRESS: &str = "ShearStress";
pub const SHEAR_STRESS_RATE: &str = "ShearStressRate";
pub const VELOCITY_GRADIENT: &str = "VelocityGradient";
pub const STRAIN_TENSOR: &str = "StrainTensor";
pub const STRAIN_TENSOR_RATE: &str = "StrainTensorRate";
pub const VON_MISES_STRESS: &str = "VonMisesStress";
pub const VON_MISES_STRAIN: &str = "VonMisesStrain";

/// `B_i = (Σ -r_ij dW_ij V_j e_ij ⊗ e_ij)^-1`, restoring first-order consistency of
/// gradients on irregular particle distributions.
#[derive(Debug)]
pub struct KernelCorrectionMatrix {
    dimensions: Dimensions,
    correction: FieldHandle<Mat3>,
}

impl KernelCorrectionMatrix {
    pub fn new(particles: &mut ParticleSet, dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            correction: particles.fields.register(KERNEL_CORRECTION_MATRIX, Mat3::IDENTITY),
        }
    }
}

impl ParticleDynamics for KernelCorrectionMatrix {
    type Accumulation = Mat3;

    fn name(&self) -> &'static str {
        "KernelCorrectionMatrix"
    }

    fn interaction(&self, ctx: &InteractionContext<'_>, i: usize, _dt: f32) -> Mat3 {
        let mut moment = Mat3::ZERO;
        for n in ctx.inner_neighbors(i) {
            moment -= outer(n.e_ij, n.e_ij) * (n.r_ij * n.dw_ij_v_j);
        }
        if self.dimensions == Dimensions::Two {
            moment.z_axis = Vec3::Z;
        }
        if moment.determinant().abs() < TINY {
            return Mat3::IDENTITY;
        }
        let inverse = moment.inverse();
        if is_finite_mat(&inverse) {
            inverse
        } else {
            Mat3::IDENTITY
        }
    }

    fn update(&self, particles: &mut ParticleSet, i: usize, correction: Mat3, _dt: f32) {
        particles.fields.get_mut(self.correction)[i] = correction;
    }
}

/// Viscous-like shear acceleration from the velocity field.
///
/// `η_ij = 2 (0.7 d + 2.1) (v_i - v_j)·e_ij / r_ij`; "AccelerationByShear" accumulates
/// `G Σ η_ij dW_ij V_j e_ij dt / ρ_i`.
#[derive(Debug)]
pub struct ShearAccelerationRelaxation<M: Constitutive> {
    material: M,
    dimensions: Dimensions,
    acc_shear: FieldHandle<Vec3>,
}

impl<M: Constitutive> ShearAccelerationRelaxation<M> {
    pub fn new(particles: &mut ParticleSet, material: M, dimensions: Dimensions) -> Self {
        Self {
            material,
            dimensions,
            acc_shear: particles.fields.register(ACCELERATION_BY_SHEAR, Vec3::ZERO),
        }
    }
}

impl<M: Constitutive> ParticleDynamics for ShearAccelerationRelaxation<M> {
    type Accumulation = Vec3;

    fn name(&self) -> &'static str {
        "ShearAccelerationRelaxation"
    }

    fn interaction(&self, ctx: &InteractionContext<'_>, i: usize, _dt: f32) -> Vec3 {
        let vel = &ctx.particles.velocity;
        let factor = 2.0 * (0.7 * self.dimensions.as_f32() + 2.1);
        let mut acceleration = Vec3::ZERO;
        for n in ctx.inner_neighbors(i) {
            let eta = factor * (vel[i] - vel[n.j]).dot(n.e_ij) / (n.r_ij + TINY);
            acceleration += eta * n.dw_ij_v_j * n.e_ij;
        }
        acceleration
    }

    fn update(&self, particles: &mut ParticleSet, i: usize, acceleration: Vec3, dt: f32) {
        let rho_i = particles.density[i];
        let increment = self.material.shear_modulus() * acceleration * dt / rho_i;
        particles.fields.get_mut(self.acc_shear)[i] += increment;
    }
}

#[derive(Debug, Clone, Copy)]
struct ShearFields {
    shear_stress: FieldHandle<Mat3>,
    shear_stress_rate: FieldHandle<Mat3>,
    velocity_gradient: FieldHandle<Mat3>,
    strain: FieldHandle<Mat3>,
    strain_rate: FieldHandle<Mat3>,
    correction: FieldHandle<Mat3>,
    von_mises_stress: FieldHandle<f32>,
    von_mises_strain: FieldHandle<f32>,
}

/// Shear stress and strain evolution from the corrected velocity gradient.
///
/// Initialization advances strain and shear stress by half a step from their rates.
/// Update stores the velocity gradient, advances strain and shear stress by the other
/// half step and refreshes both von Mises measures.
#[derive(Debug)]
pub struct ShearStressRelaxation<M: Constitutive> {
    material: M,
    fields: ShearFields,
}

impl<M: Constitutive> ShearStressRelaxation<M> {
    pub fn new(particles: &mut ParticleSet, material: M) -> Self {
        let f = &mut particles.fields;
        let fields = ShearFields {
            shear_stress: f.register(SHEAR_STRESS, Mat3::ZERO),
            shear_stress_rate: f.register(SHEAR_STRESS_RATE, Mat3::ZERO),
            velocity_gradient: f.register(VELOCITY_GRADIENT, Mat3::ZERO),
            strain: f.register(STRAIN_TENSOR, Mat3::ZERO),
            strain_rate: f.register(STRAIN_TENSOR_RATE, Mat3::ZERO),
            correction: f.register(KERNEL_CORRECTION_MATRIX, Mat3::IDENTITY),
            von_mises_stress: f.register(VON_MISES_STRESS, 0.0),
            von_mises_strain: f.register(VON_MISES_STRAIN, 0.0),
        };
        Self { material, fields }
    }
}

impl<M: Constitutive> ParticleDynamics for ShearStressRelaxation<M> {
    type Accumulation = Mat3;

    fn name(&self) -> &'static str {
        "ShearStressRelaxation"
    }

    fn initialization(&self, particles: &mut ParticleSet, i: usize, dt: f32) {
        let f = &mut particles.fields;
        let strain_rate = f.get(self.fields.strain_rate)[i];
        f.get_mut(self.fields.strain)[i] += strain_rate * (0.5 * dt);
        let stress_rate = f.get(self.fields.shear_stress_rate)[i];
        f.get_mut(self.fields.shear_stress)[i] += stress_rate * (0.5 * dt);
    }

    fn interaction(&self, ctx: &InteractionContext<'_>, i: usize, _dt: f32) -> Mat3 {
        let vel = &ctx.particles.velocity;
        let b_i = ctx.particles.fields.get(self.fields.correction)[i];
        let mut velocity_gradient = Mat3::ZERO;
        for n in ctx.inner_neighbors(i) {
            let v_ij = vel[i] - vel[n.j];
            velocity_gradient -= outer(v_ij, b_i * n.e_ij * n.dw_ij_v_j);
        }
        velocity_gradient
    }

    fn update(&self, particles: &mut ParticleSet, i: usize, velocity_gradient: Mat3, dt: f32) {
        let pressure = particles.pressure[i];
        let f = &mut particles.fields;
        f.get_mut(self.fields.velocity_gradient)[i] = velocity_gradient;

        let strain_rate = symmetric(&velocity_gradient);
        f.get_mut(self.fields.strain_rate)[i] = strain_rate;
        let strain = &mut f.get_mut(self.fields.strain)[i];
        *strain += strain_rate * (0.5 * dt);
        let strain = *strain;
        f.get_mut(self.fields.von_mises_strain)[i] = von_mises(&strain);

        let shear_stress = f.get(self.fields.shear_stress)[i];
        let rate = self.material.stress_rate(&velocity_gradient, &shear_stress);
        f.get_mut(self.fields.shear_stress_rate)[i] = rate;
        let shear_stress = shear_stress + rate * (0.5 * dt);
        f.get_mut(self.fields.shear_stress)[i] = shear_stress;

        let total = shear_stress - Mat3::from_diagonal(Vec3::splat(pressure));
        f.get_mut(self.fields.von_mises_stress)[i] = von_mises(&total);
    }
}
