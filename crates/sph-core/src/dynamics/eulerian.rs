//! Weakly-compressible flow on particles fixed in space.
//!
//! Momentum density `ρv` and density are advanced by Riemann fluxes across the particle
//! pairs; positions never change. One acoustic step is `EulerianMomentumRelaxation` then
//! `EulerianDensityRelaxation`.

use glam::Vec3;

use super::fluid::{neighbor_state, own_state, FluidState, RiemannSolver, DENSITY_CHANGE_RATE};
use super::{InteractionContext, NeighborSource, ParticleDynamics};
use crate::fields::FieldHandle;
use crate::materials::Material;
use crate::neighborhood::NeighborPair;
use crate::particle::ParticleSet;

pub const MOMENTUM: &str = "Momentum";
pub const MOMENTUM_CHANGE_RATE: &str = "MomentumChangeRate";

/// `d(ρv)/dt = -Σ 2 (ρ* v* ⊗ v* + p* I) e_ij dW_ij V_j + ρ f_prior / m`.
///
/// "Momentum" starts from `ρv` when first registered. Initialization refreshes pressure
/// from the EOS; update advances momentum and writes `v = (ρv) / ρ`.
#[derive(Debug)]
pub struct EulerianMomentumRelaxation<M: Material, R: RiemannSolver> {
    material: M,
    riemann: R,
    source: NeighborSource,
    momentum: FieldHandle<Vec3>,
    dmom_dt: FieldHandle<Vec3>,
}

impl<M: Material, R: RiemannSolver> EulerianMomentumRelaxation<M, R> {
    pub fn new(
        particles: &mut ParticleSet,
        material: M,
        riemann: R,
        source: NeighborSource,
    ) -> Self {
        let fresh = !particles.fields.contains::<Vec3>(MOMENTUM);
        let momentum = particles.fields.register(MOMENTUM, Vec3::ZERO);
        if fresh {
            let values = particles.fields.get_mut(momentum);
            let states = particles.density.iter().zip(&particles.velocity);
            for (m, (&rho, &v)) in values.iter_mut().zip(states) {
                *m = rho * v;
            }
        }
        Self {
            material,
            riemann,
            source,
            momentum,
            dmom_dt: particles.fields.register(MOMENTUM_CHANGE_RATE, Vec3::ZERO),
        }
    }

    pub fn momentum_field(&self) -> FieldHandle<Vec3> {
        self.momentum
    }

    fn flux(&self, state_i: &FluidState, state_j: &FluidState, n: &NeighborPair) -> Vec3 {
        let star = self.riemann.interface_state(state_i, state_j, n.e_ij);
        let rho_star = self.material.density_from_pressure(star.p);
        let convected = rho_star * star.vel * star.vel.dot(n.e_ij);
        -2.0 * (convected + star.p * n.e_ij) * n.dw_ij_v_j
    }
}

impl<M: Material, R: RiemannSolver> ParticleDynamics for EulerianMomentumRelaxation<M, R> {
    type Accumulation = Vec3;

    fn name(&self) -> &'static str {
        "EulerianMomentumRelaxation"
    }

    fn initialization(&self, particles: &mut ParticleSet, i: usize, _dt: f32) {
        particles.pressure[i] = self.material.pressure(particles.density[i]);
    }

    fn interaction(&self, ctx: &InteractionContext<'_>, i: usize, _dt: f32) -> Vec3 {
        let state_i = own_state(ctx.particles, &self.material, i);
        let mut rate = Vec3::ZERO;
        for n in ctx.inner_neighbors(i) {
            let state_j = own_state(ctx.particles, &self.material, n.j);
            rate += self.flux(&state_i, &state_j, &n);
        }
        if self.source != NeighborSource::Inner {
            for contact in &ctx.contacts {
                for n in contact.neighbors(i) {
                    let state_j = neighbor_state(self.source, ctx, contact, &state_i, i, &n);
                    rate += self.flux(&state_i, &state_j, &n);
                }
            }
        }
        rate
    }

    fn update(&self, particles: &mut ParticleSet, i: usize, rate: Vec3, dt: f32) {
        let rho = particles.density[i];
        let prior = rho * particles.force_prior[i] / particles.mass[i];
        particles.fields.get_mut(self.dmom_dt)[i] = rate;
        let momentum = &mut particles.fields.get_mut(self.momentum)[i];
        *momentum += (rate + prior) * dt;
        let momentum = *momentum;
        particles.velocity[i] = momentum / rho;
    }
}

/// `dρ/dt = -Σ 2 ρ* v*·e_ij dW_ij V_j`, written to "DensityChangeRate".
#[derive(Debug)]
pub struct EulerianDensityRelaxation<M: Material, R: RiemannSolver> {
    material: M,
    riemann: R,
    source: NeighborSource,
    drho_dt: FieldHandle<f32>,
}

impl<M: Material, R: RiemannSolver> EulerianDensityRelaxation<M, R> {
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

impl<M: Material, R: RiemannSolver> ParticleDynamics for EulerianDensityRelaxation<M, R> {
    type Accumulation = f32;

    fn name(&self) -> &'static str {
        "EulerianDensityRelaxation"
    }

    fn interaction(&self, ctx: &InteractionContext<'_>, i: usize, _dt: f32) -> f32 {
        let state_i = own_state(ctx.particles, &self.material, i);
        let flux = |state_j: &FluidState, n: &NeighborPair| {
            let star = self.riemann.interface_state(&state_i, state_j, n.e_ij);
            let rho_star = self.material.density_from_pressure(star.p);
            -2.0 * rho_star * star.vel.dot(n.e_ij) * n.dw_ij_v_j
        };
        let mut rate = 0.0;
        for n in ctx.inner_neighbors(i) {
            rate += flux(&own_state(ctx.particles, &self.material, n.j), &n);
        }
        if self.source != NeighborSource::Inner {
            for contact in &ctx.contacts {
                for n in contact.neighbors(i) {
                    let state_j = neighbor_state(self.source, ctx, contact, &state_i, i, &n);
                    rate += flux(&state_j, &n);
                }
            }
        }
        rate
    }

    fn update(&self, particles: &mut ParticleSet, i: usize, drho_dt: f32, dt: f32) {
        particles.fields.get_mut(self.drho_dt)[i] = drho_dt;
        particles.density[i] += drho_dt * dt;
    }
}
