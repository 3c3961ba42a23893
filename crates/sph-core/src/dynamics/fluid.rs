//! Weakly-compressible momentum and continuity relaxation with Riemann fluxes.
//!
//! One acoustic step is the pair `PressureRelaxation` then `DensityRelaxation`. Each
//! advances density and position by half a step in its initialization/update, so the
//! pair is a symplectic update of `(ρ, x, v)`.

use glam::Vec3;

use super::{ContactView, InteractionContext, NeighborSource, ParticleDynamics};
use crate::fields::FieldHandle;
use crate::materials::Material;
use crate::math::TINY;
use crate::neighborhood::NeighborPair;
use crate::particle::ParticleSet;

pub const DENSITY_CHANGE_RATE: &str = "DensityChangeRate";

/// Primitive state of one side of a particle pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FluidState {
    pub rho: f32,
    pub vel: Vec3,
    pub p: f32,
    pub c: f32,
}

/// Interface state of a pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StarState {
    pub p: f32,
    pub vel: Vec3,
}

/// Interface flux between two states along `e_ij` (pointing from `j` to `i`).
pub trait RiemannSolver: Send + Sync + std::fmt::Debug {
    fn interface_state(&self, i: &FluidState, j: &FluidState, e_ij: Vec3) -> StarState;
}

/// Density-weighted averages, no dissipation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRiemannSolver;

impl RiemannSolver for NoRiemannSolver {
    fn interface_state(&self, i: &FluidState, j: &FluidState, _e_ij: Vec3) -> StarState {
        let inv_sum = 1.0 / (i.rho + j.rho);
        StarState {
            p: (i.p * j.rho + j.p * i.rho) * inv_sum,
            vel: (i.vel * i.rho + j.vel * j.rho) * inv_sum,
        }
    }
}

/// Linearized acoustic solver with a limited dissipation term.
///
/// The pressure dissipation only acts when the pair is approaching, and saturates once
/// the normal approach speed reaches `c / limiter_parameter`.
#[derive(Clone, Copy, Debug)]
pub struct AcousticRiemannSolver {
    pub limiter_parameter: f32,
}

impl Default for AcousticRiemannSolver {
    fn default() -> Self {
        Self {
            limiter_parameter: 15.0,
        }
    }
}

impl RiemannSolver for AcousticRiemannSolver {
    fn interface_state(&self, i: &FluidState, j: &FluidState, e_ij: Vec3) -> StarState {
        let z_i = i.rho * i.c;
        let z_j = j.rho * j.c;
        let inv_z_sum = 1.0 / (z_i + z_j + TINY);

        let p_average = (i.p * z_j + j.p * z_i) * inv_z_sum;
        let vel_average = (i.vel * z_i + j.vel * z_j) * inv_z_sum;

        // normal velocities along the direction from i to j
        let ul = -e_ij.dot(i.vel);
        let ur = -e_ij.dot(j.vel);
        let u_jump = ul - ur;
        let c_average = 0.5 * (i.c + j.c);
        let limited = (self.limiter_parameter * (u_jump / (c_average + TINY)).max(0.0)).min(1.0);

        StarState {
            p: p_average + z_i * z_j * inv_z_sum * u_jump * limited,
            vel: vel_average - e_ij * (i.p - j.p) * inv_z_sum,
        }
    }
}

pub(super) fn own_state(particles: &ParticleSet, material: &dyn Material, i: usize) -> FluidState {
    let rho = particles.density[i];
    let p = particles.pressure[i];
    FluidState {
        rho,
        vel: particles.velocity[i],
        p,
        c: material.sound_speed(p, rho),
    }
}

/// State across a contact pair: the contact body's own state, or a wall mirror of `i`.
pub(super) fn neighbor_state(
    source: NeighborSource,
    ctx: &InteractionContext<'_>,
    contact: &ContactView<'_>,
    state_i: &FluidState,
    i: usize,
    n: &NeighborPair,
) -> FluidState {
    match source {
        NeighborSource::Wall => {
            let acc_prior = ctx.particles.force_prior[i] / ctx.particles.mass[i];
            let face_acc = acc_prior.dot(-n.e_ij).max(0.0);
            FluidState {
                p: state_i.p + state_i.rho * n.r_ij * face_acc,
                vel: 2.0 * contact.particles.velocity[n.j] - state_i.vel,
                ..*state_i
            }
        }
        _ => own_state(contact.particles, contact.material, n.j),
    }
}

/// Momentum equation: `dv/dt = -Σ 2 p* e_ij dW_ij V_j / ρ_i + f_prior / m`.
///
/// Initialization advances density by half a step from "DensityChangeRate", refreshes
/// pressure from the EOS and moves the particle half a step. Update writes velocity.
#[derive(Debug)]
pub struct PressureRelaxation<M: Material, R: RiemannSolver> {
    material: M,
    riemann: R,
    source: NeighborSource,
    drho_dt: FieldHandle<f32>,
    extra_acceleration: Option<FieldHandle<Vec3>>,
}

impl<M: Material, R: RiemannSolver> PressureRelaxation<M, R> {
    pub fn new(
        particles: &mut ParticleSet,
        material: M,
        riemann: R,
        source: NeighborSource,
    ) -> Self {
        Self {
            material,
            riemann,
            source,
            drho_dt: particles.fields.register(DENSITY_CHANGE_RATE, 0.0),
            extra_acceleration: None,
        }
    }

    /// Also add the acceleration stored in `name` (e.g. "AccelerationByShear") at update.
    pub fn with_extra_acceleration(mut self, particles: &mut ParticleSet, name: &str) -> Self {
        self.extra_acceleration = Some(particles.fields.register(name, Vec3::ZERO));
        self
    }
}

impl<M: Material, R: RiemannSolver> ParticleDynamics for PressureRelaxation<M, R> {
    type Accumulation = Vec3;

    fn name(&self) -> &'static str {
        "PressureRelaxation"
    }

    fn initialization(&self, particles: &mut ParticleSet, i: usize, dt: f32) {
        particles.density[i] += particles.fields.get(self.drho_dt)[i] * dt * 0.5;
        particles.pressure[i] = self.material.pressure(particles.density[i]);
        particles.position[i] += particles.velocity[i] * dt * 0.5;
    }

    fn interaction(&self, ctx: &InteractionContext<'_>, i: usize, _dt: f32) -> Vec3 {
        let state_i = own_state(ctx.particles, &self.material, i);
        let mut acceleration = Vec3::ZERO;
        for n in ctx.inner_neighbors(i) {
            let state_j = own_state(ctx.particles, &self.material, n.j);
            let star = self.riemann.interface_state(&state_i, &state_j, n.e_ij);
            acceleration -= 2.0 * star.p * n.e_ij * n.dw_ij_v_j;
        }
        if self.source != NeighborSource::Inner {
            for contact in &ctx.contacts {
                for n in contact.neighbors(i) {
                    let state_j = neighbor_state(self.source, ctx, contact, &state_i, i, &n);
                    let star = self.riemann.interface_state(&state_i, &state_j, n.e_ij);
                    acceleration -= 2.0 * star.p * n.e_ij * n.dw_ij_v_j;
                }
            }
        }
        acceleration / state_i.rho
    }

    fn update(&self, particles: &mut ParticleSet, i: usize, acceleration: Vec3, dt: f32) {
        let mut total = acceleration + particles.force_prior[i] / particles.mass[i];
        if let Some(extra) = self.extra_acceleration {
            total += particles.fields.get(extra)[i];
        }
        particles.velocity[i] += total * dt;
    }
}

/// Continuity equation: `dρ/dt = Σ 2 ρ_i (v_i - v*)·e_ij dW_ij V_j`.
///
/// Initialization moves the particle the second half step. Update writes
/// "DensityChangeRate" and advances density by half a step.
#[derive(Debug)]
pub struct DensityRelaxation<M: Material, R: RiemannSolver> {
    material: M,
    riemann: R,
    source: NeighborSource,
    drho_dt: FieldHandle<f32>,
}

impl<M: Material, R: RiemannSolver> DensityRelaxation<M, R> {
    pub fn new(
        particles: &mut ParticleSet,
        material: M,
        riemann: R,
        source: NeighborSource,
    ) -> Self {
        Self {
            material,
            riemann,
            source,
            drho_dt: particles.fields.register(DENSITY_CHANGE_RATE, 0.0),
        }
    }
}

impl<M: Material, R: RiemannSolver> ParticleDynamics for DensityRelaxation<M, R> {
    type Accumulation = f32;

    fn name(&self) -> &'static str {
        "DensityRelaxation"
    }

    fn initialization(&self, particles: &mut ParticleSet, i: usize, dt: f32) {
        particles.position[i] += particles.velocity[i] * dt * 0.5;
    }

    fn interaction(&self, ctx: &InteractionContext<'_>, i: usize, _dt: f32) -> f32 {
        let state_i = own_state(ctx.particles, &self.material, i);
        let mut rate = 0.0;
        for n in ctx.inner_neighbors(i) {
            let state_j = own_state(ctx.particles, &self.material, n.j);
            let star = self.riemann.interface_state(&state_i, &state_j, n.e_ij);
            rate += 2.0 * (state_i.vel - star.vel).dot(n.e_ij) * n.dw_ij_v_j;
        }
        if self.source != NeighborSource::Inner {
            for contact in &ctx.contacts {
                for n in contact.neighbors(i) {
                    let state_j = neighbor_state(self.source, ctx, contact, &state_i, i, &n);
                    let star = self.riemann.interface_state(&state_i, &state_j, n.e_ij);
                    rate += 2.0 * (state_i.vel - star.vel).dot(n.e_ij) * n.dw_ij_v_j;
                }
            }
        }
        rate * state_i.rho
    }

    fn update(&self, particles: &mut ParticleSet, i: usize, drho_dt: f32, dt: f32) {
        particles.fields.get_mut(self.drho_dt)[i] = drho_dt;
        particles.density[i] += drho_dt * dt * 0.5;
    }
}
