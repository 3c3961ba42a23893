//! Particle interaction kernels.
//!
//! Every kernel is a [`ParticleDynamics`] with up to four phases, executed by [`exec`]:
//!
//! 1. `setup` once per pass, with exclusive access to the kernel and the particles.
//! 2. `initialization` per particle, mutating only that particle's own state.
//! 3. `interaction` per particle, read-only over the whole [`InteractionContext`],
//!    returning an accumulation. This phase runs on the rayon pool with `parallel`.
//! 4. `update` per particle, applying the accumulation to that particle's own state.
//!
//! Field ownership: fields written in `initialization` or `update` must only be read
//! by `interaction` for neighbors, never written there.

pub mod acceleration;
pub mod constraints;
pub mod continuum;
pub mod eulerian;
pub mod fluid;
pub mod plastic;
pub mod repulsion;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::body::{Body, ContactLink};
use crate::error::{Result, SphError};
use crate::materials::Material;
use crate::neighborhood::{ContactRelation, InnerRelation, NeighborPair};
use crate::particle::ParticleSet;
use crate::time_step::TimeContext;

/// Which neighborhoods a kernel sums over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeighborSource {
    Inner,
    Contact,
    Wall,
}

/// A contact body seen from the body being updated.
#[derive(Clone, Copy)]
pub struct ContactView<'a> {
    pub particles: &'a ParticleSet,
    pub relation: &'a ContactRelation,
    pub material: &'a dyn Material,
}

/// Read-only view handed to the interaction phase.
pub struct InteractionContext<'a> {
    pub particles: &'a ParticleSet,
    pub inner: &'a InnerRelation,
    pub material: &'a dyn Material,
    pub contacts: Vec<ContactView<'a>>,
    pub time: &'a TimeContext,
}

impl ContactView<'_> {
    /// Neighbors of own particle `i` inside this contact body.
    pub fn neighbors(&self, i: usize) -> impl Iterator<Item = NeighborPair> + '_ {
        self.relation.neighborhoods().get(i).into_iter().flat_map(|nb| nb.iter())
    }
}

impl InteractionContext<'_> {
    pub fn inner_neighbors(&self, i: usize) -> impl Iterator<Item = NeighborPair> + '_ {
        self.inner.neighborhoods().get(i).into_iter().flat_map(|nb| nb.iter())
    }
}

pub trait ParticleDynamics: Send + Sync {
    type Accumulation: Copy + Default + Send + Sync;

    fn name(&self) -> &'static str;

    fn setup(&mut self, _particles: &mut ParticleSet, _time: &TimeContext, _dt: f32) {}

    fn initialization(&self, _particles: &mut ParticleSet, _i: usize, _dt: f32) {}

    fn interaction(&self, ctx: &InteractionContext<'_>, i: usize, dt: f32) -> Self::Accumulation;

    fn update(
        &self,
        particles: &mut ParticleSet,
        i: usize,
        accumulation: Self::Accumulation,
        dt: f32,
    );
}

/// Run one full pass of `dynamics` over `bodies[body]`.
///
/// `contacts` are the links the kernel reads its contact and wall neighbors from; every
/// one of them must start at `body`.
pub fn exec<D: ParticleDynamics>(
    dynamics: &mut D,
    bodies: &mut [Body],
    contacts: &[ContactLink],
    body: usize,
    time: &TimeContext,
    dt: f32,
) -> Result<()> {
    let links: Vec<usize> = (0..contacts.len()).collect();
    let mut buffer = Vec::new();
    exec_with_buffer(dynamics, bodies, contacts, &links, body, time, dt, &mut buffer)
}

/// [`exec`] over the links `contacts[l]` for `l` in `links`, reusing `buffer` for the
/// accumulations.
#[allow(clippy::too_many_arguments)]
pub fn exec_with_buffer<D: ParticleDynamics>(
    dynamics: &mut D,
    bodies: &mut [Body],
    contacts: &[ContactLink],
    links: &[usize],
    body: usize,
    time: &TimeContext,
    dt: f32,
    buffer: &mut Vec<D::Accumulation>,
) -> Result<()> {
    let count = bodies.get(body).ok_or(SphError::UnknownBody(body))?.len();
    let mut selected = Vec::with_capacity(links.len());
    for &l in links {
        let link = contacts.get(l).ok_or(SphError::UnknownContact(l))?;
        if link.body != body {
            return Err(SphError::InvalidConfig(format!(
                "contact link {l} starts at body {}, not at body {body}",
                link.body
            )));
        }
        if link.target >= bodies.len() {
            return Err(SphError::UnknownBody(link.target));
        }
        selected.push(link);
    }

    {
        let particles = &mut bodies[body].particles;
        dynamics.setup(particles, time, dt);
        for i in 0..count {
            dynamics.initialization(particles, i, dt);
        }
    }

    {
        let own = &bodies[body];
        let ctx = InteractionContext {
            particles: &own.particles,
            inner: &own.inner,
            material: own.material.as_ref(),
            contacts: selected
                .iter()
                .map(|l| {
                    let target = &bodies[l.target];
                    ContactView {
                        particles: &target.particles,
                        relation: &l.relation,
                        material: target.material.as_ref(),
                    }
                })
                .collect(),
            time,
        };
        let dynamics = &*dynamics;

        #[cfg(feature = "parallel")]
        {
            (0..count)
                .into_par_iter()
                .map(|i| dynamics.interaction(&ctx, i, dt))
                .collect_into_vec(buffer);
        }

        #[cfg(not(feature = "parallel"))]
        {
            buffer.clear();
            buffer.extend((0..count).map(|i| dynamics.interaction(&ctx, i, dt)));
        }
    }

    let particles = &mut bodies[body].particles;
    for (i, &acc) in buffer.iter().enumerate() {
        dynamics.update(particles, i, acc, dt);
    }
    Ok(())
}
