use crate::adaptation::Adaptation;
use crate::config::{AdaptationConfig, SimulationConfig};
use crate::error::{Result, SphError};
use crate::grid::SpatialIndex;
use crate::materials::Material;
use crate::neighborhood::{ContactRelation, InnerRelation};
use crate::particle::ParticleSet;

/// A particle set together with its resolution, spatial index and inner neighborhoods.
#[derive(Debug)]
pub struct Body {
    pub name: String,
    pub particles: ParticleSet,
    pub adaptation: Adaptation,
    pub index: SpatialIndex,
    pub inner: InnerRelation,
    pub material: Box<dyn Material>,
    /// Static bodies (walls) build their index and neighborhoods once.
    pub is_static: bool,
    configured: bool,
}

impl Body {
    pub fn new(
        name: impl Into<String>,
        particles: ParticleSet,
        adaptation_config: &AdaptationConfig,
        material: Box<dyn Material>,
        config: &SimulationConfig,
    ) -> Result<Self> {
        let name = name.into();
        let adaptation =
            Adaptation::new(config.system_spacing, adaptation_config, config.dimensions)?;
        let index = adaptation
            .create_cell_linked_list(config.domain, config.index_skin)?
            .with_forced_rebuild_interval(config.forced_rebuild_interval);
        log::debug!(
            "body `{name}`: {} particles, h_ref={}, refined={}",
            particles.len(),
            adaptation.reference_smoothing_length(),
            adaptation.is_refined()
        );
        Ok(Self {
            name,
            particles,
            adaptation,
            index,
            inner: InnerRelation::new(),
            material,
            is_static: false,
            configured: false,
        })
    }

    /// Immovable body whose neighborhoods are computed once.
    pub fn static_wall(
        name: impl Into<String>,
        particles: ParticleSet,
        adaptation_config: &AdaptationConfig,
        material: Box<dyn Material>,
        config: &SimulationConfig,
    ) -> Result<Self> {
        let mut body = Self::new(name, particles, adaptation_config, material, config)?;
        body.is_static = true;
        Ok(body)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Bring the spatial index and inner neighborhoods up to date with the positions.
    ///
    /// Returns whether the index was rebuilt.
    pub fn update_configuration(&mut self) -> Result<bool> {
        if self.is_static && self.configured {
            return Ok(false);
        }
        let rebuilt = self
            .index
            .update(&self.particles.position, &self.particles.h_ratio);
        self.inner.update(&self.particles, &self.index, &self.adaptation)?;
        self.configured = true;
        Ok(rebuilt)
    }
}

/// One body looking into another.
#[derive(Clone, Debug)]
pub struct ContactLink {
    pub body: usize,
    pub target: usize,
    pub relation: ContactRelation,
}

impl ContactLink {
    pub fn new(body: usize, target: usize) -> Self {
        Self {
            body,
            target,
            relation: ContactRelation::new(),
        }
    }

    /// Check that both ends exist and evaluate pairs with the same kernel.
    pub fn validate(bodies: &[Body], body: usize, target: usize) -> Result<()> {
        let own = bodies.get(body).ok_or(SphError::UnknownBody(body))?;
        let other = bodies.get(target).ok_or(SphError::UnknownBody(target))?;
        if own.adaptation.config().kernel != other.adaptation.config().kernel {
            return Err(SphError::KernelMismatch { body, target });
        }
        Ok(())
    }

    /// Rebuild from the target body's current index.
    pub fn update(&mut self, bodies: &[Body]) -> Result<()> {
        Self::validate(bodies, self.body, self.target)?;
        let own = &bodies[self.body];
        let other = &bodies[self.target];
        self.relation.update(
            &own.particles,
            &own.adaptation,
            &other.particles,
            &other.index,
            &other.adaptation,
        )
    }
}
