//! Penalty-free contact between solids through a repulsion "pressure".
//!
//! A repulsion density is summed over contact (or self-contact) neighbors, turned into
//! a pressure with the material's contact stiffness and integrated like a momentum
//! flux. The resulting force enters the acoustic loop through `force_prior`.

use glam::Vec3;

use super::{InteractionContext, NeighborSource, ParticleDynamics};
use crate::fields::FieldHandle;
use crate::particle::ParticleSet;

pub const SELF_REPULSION_DENSITY: &str = "SelfRepulsionDensity";
pub const REPULSION_DENSITY: &str = "RepulsionDensity";
pub const SELF_REPULSION_FORCE: &str = "SelfRepulsionForce";
pub const REPULSION_FORCE: &str = "RepulsionForce";

/// `ρ_rep,i = Σ_j W_ij V_j`.
///
/// Writes the repulsion density in `update`; the inner source writes
/// "SelfRepulsionDensity", contact and wall sources write "RepulsionDensity".
#[derive(Debug)]
pub struct RepulsionDensitySummation {
    source: NeighborSource,
    density: FieldHandle<f32>,
}

impl RepulsionDensitySummation {
    /// The summation a [`RepulsionForce`] of `variant` reads its densities from.
    pub fn for_variant(particles: &mut ParticleSet, variant: RepulsionVariant) -> Self {
        Self::new(particles, variant.source())
    }

    pub fn new(particles: &mut ParticleSet, source: NeighborSource) -> Self {
        let name = match source {
            NeighborSource::Inner => SELF_REPULSION_DENSITY,
            NeighborSource::Contact | NeighborSource::Wall => REPULSION_DENSITY,
        };
        Self {
            source,
            density: particles.fields.register(name, 0.0),
        }
    }

    pub fn density_field(&self) -> FieldHandle<f32> {
        self.density
    }
}

impl ParticleDynamics for RepulsionDensitySummation {
    type Accumulation = f32;

    fn name(&self) -> &'static str {
        "RepulsionDensitySummation"
    }

    fn interaction(&self, ctx: &InteractionContext<'_>, i: usize, _dt: f32) -> f32 {
        match self.source {
            NeighborSource::Inner => ctx.inner_neighbors(i).map(|n| n.w_ij_v_j).sum(),
            NeighborSource::Contact | NeighborSource::Wall => ctx
                .contacts
                .iter()
                .flat_map(|c| c.neighbors(i))
                .map(|n| n.w_ij_v_j)
                .sum(),
        }
    }

    fn update(&self, particles: &mut ParticleSet, i: usize, sigma: f32, _dt: f32) {
        particles.fields.get_mut(self.density)[i] = sigma;
    }
}

/// How the contact pressure `p*` of a pair is formed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepulsionVariant {
    /// Within one body: averaged pressures plus an impedance term on the approach speed.
    SelfContact,
    /// Against other deformable bodies: averaged pressures.
    Contact,
    /// A solid against a rigid wall: own pressure only.
    Wall,
    /// The wall side of a wall contact: the solid's pressure only.
    WallContact,
}

impl RepulsionVariant {
    /// Neighborhoods the repulsion density of this variant is summed over.
    pub fn source(self) -> NeighborSource {
        match self {
            RepulsionVariant::SelfContact => NeighborSource::Inner,
            RepulsionVariant::Contact | RepulsionVariant::WallContact => NeighborSource::Contact,
            RepulsionVariant::Wall => NeighborSource::Wall,
        }
    }
}

/// Contact force from repulsion densities, accumulated into `force_prior`.
///
/// Every instance owns its force column ("RepulsionForce", "RepulsionForce#1", ...), so
/// several repulsion stages on one body each keep their own contribution.
#[derive(Debug)]
pub struct RepulsionForce {
    variant: RepulsionVariant,
    resolution_scale: f32,
    density: FieldHandle<f32>,
    force: FieldHandle<Vec3>,
}

impl RepulsionForce {
    pub fn new(particles: &mut ParticleSet, variant: RepulsionVariant) -> Self {
        let (density, force) = match variant.source() {
            NeighborSource::Inner => (SELF_REPULSION_DENSITY, SELF_REPULSION_FORCE),
            NeighborSource::Contact | NeighborSource::Wall => (REPULSION_DENSITY, REPULSION_FORCE),
        };
        Self {
            variant,
            resolution_scale: 1.0,
            density: particles.fields.register(density, 0.0),
            force: particles.fields.register_unique(force, Vec3::ZERO),
        }
    }

    /// Scale the force by a body resolution ratio (thin shells in contact).
    pub fn with_resolution_scale(mut self, scale: f32) -> Self {
        self.resolution_scale = scale;
        self
    }

    pub fn force_field(&self) -> FieldHandle<Vec3> {
        self.force
    }

    fn self_contact(&self, ctx: &InteractionContext<'_>, i: usize) -> Vec3 {
        let stiffness = ctx.material.contact_stiffness();
        let impedance = ctx.material.reference_density() * stiffness.sqrt();
        let rho_rep = ctx.particles.fields.get(self.density);
        let vel = &ctx.particles.velocity;
        let p_i = rho_rep[i] * stiffness;
        let mut force = Vec3::ZERO;
        for n in ctx.inner_neighbors(i) {
            let p_star = 0.5 * (p_i + rho_rep[n.j] * stiffness);
            let impedance_p = 0.5 * impedance * (vel[i] - vel[n.j]).dot(-n.e_ij);
            force -= 2.0 * (p_star + impedance_p) * n.e_ij * n.dw_ij_v_j;
        }
        force
    }

    fn contact(&self, ctx: &InteractionContext<'_>, i: usize) -> Vec3 {
        let p_i = ctx.particles.fields.get(self.density)[i] * ctx.material.contact_stiffness();
        let mut force = Vec3::ZERO;
        for contact in &ctx.contacts {
            let stiffness_k = contact.material.contact_stiffness();
            let rho_rep_k = contact
                .particles
                .fields
                .handle::<f32>(REPULSION_DENSITY)
                .map(|h| contact.particles.fields.get(h));
            for n in contact.neighbors(i) {
                let p_j = rho_rep_k.map_or(0.0, |rho| rho[n.j] * stiffness_k);
                let p_star = match self.variant {
                    RepulsionVariant::Contact => 0.5 * (p_i + p_j),
                    RepulsionVariant::Wall => p_i,
                    _ => p_j,
                };
                force -= 2.0 * p_star * n.e_ij * n.dw_ij_v_j;
            }
        }
        force
    }
}

impl ParticleDynamics for RepulsionForce {
    type Accumulation = Vec3;

    fn name(&self) -> &'static str {
        "RepulsionForce"
    }

    fn interaction(&self, ctx: &InteractionContext<'_>, i: usize, _dt: f32) -> Vec3 {
        let force = match self.variant {
            RepulsionVariant::SelfContact => self.self_contact(ctx, i),
            _ => self.contact(ctx, i),
        };
        force * ctx.particles.volume[i] * self.resolution_scale
    }

    fn update(&self, particles: &mut ParticleSet, i: usize, force: Vec3, _dt: f32) {
        let stored = &mut particles.fields.get_mut(self.force)[i];
        let delta = force - *stored;
        *stored = force;
        particles.force_prior[i] += delta;
    }
}
