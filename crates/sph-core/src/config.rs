use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SphError};
use crate::kernel::KernelKind;
use crate::shapes::BoundingBox;

/// Spatial dimensionality of a simulation. 2D runs keep `z == 0` for every particle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimensions {
    Two,
    #[default]
    Three,
}

impl Dimensions {
    #[inline]
    pub fn count(self) -> usize {
        match self {
            Dimensions::Two => 2,
            Dimensions::Three => 3,
        }
    }

    #[inline]
    pub fn as_f32(self) -> f32 {
        self.count() as f32
    }
}

/// Per-body resolution parameters, consumed by [`crate::adaptation::Adaptation`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    /// Ratio of the reference smoothing length to the reference particle spacing.
    pub h_spacing_ratio: f32,
    /// Ratio of this body's resolution to the system resolution.
    pub system_resolution_ratio: f32,
    /// Number of halvings of the reference spacing allowed inside the body. Zero means
    /// a uniform-resolution body.
    pub local_refinement_level: u32,
    pub kernel: KernelKind,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            h_spacing_ratio: 1.3,
            system_resolution_ratio: 1.0,
            local_refinement_level: 0,
            kernel: KernelKind::WendlandC2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub dimensions: Dimensions,
    /// Global reference particle spacing.
    pub system_spacing: f32,
    /// Region covered by the cell-linked lists. Particles outside are clamped into the
    /// boundary cells.
    pub domain: BoundingBox,
    pub acoustic_cfl: f32,
    pub advection_cfl: f32,
    /// Lower bound on the speed used by the advection time step.
    pub reference_speed: f32,
    /// Fraction of the cutoff radius a particle may travel before the spatial index
    /// must be rebuilt.
    pub index_skin: f32,
    /// Rebuild the spatial index at least this often (in configuration updates).
    pub forced_rebuild_interval: u32,
    /// Upper bound on acoustic sub-steps inside one advection step.
    pub max_acoustic_substeps: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dimensions: Dimensions::Three,
            system_spacing: 0.01,
            domain: BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0)),
            acoustic_cfl: 0.6,
            advection_cfl: 0.25,
            reference_speed: 1.0,
            index_skin: 0.1,
            forced_rebuild_interval: 50,
            max_acoustic_substeps: 10_000,
        }
    }
}

impl SimulationConfig {
    /// Reject configurations that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if !(self.system_spacing > 0.0 && self.system_spacing.is_finite()) {
            return Err(SphError::InvalidSpacing(self.system_spacing));
        }
        self.domain.validate()?;
        if !(self.acoustic_cfl > 0.0 && self.acoustic_cfl <= 1.0) {
            return Err(SphError::InvalidConfig(format!(
                "acoustic_cfl must lie in (0, 1], got {}",
                self.acoustic_cfl
            )));
        }
        if !(self.advection_cfl > 0.0 && self.advection_cfl <= 1.0) {
            return Err(SphError::InvalidConfig(format!(
                "advection_cfl must lie in (0, 1], got {}",
                self.advection_cfl
            )));
        }
        if !(self.reference_speed >= 0.0 && self.reference_speed.is_finite()) {
            return Err(SphError::InvalidConfig(format!(
                "reference_speed must be non-negative, got {}",
                self.reference_speed
            )));
        }
        if !(self.index_skin >= 0.0 && self.index_skin < 1.0) {
            return Err(SphError::InvalidConfig(format!(
                "index_skin must lie in [0, 1), got {}",
                self.index_skin
            )));
        }
        if self.forced_rebuild_interval == 0 {
            return Err(SphError::InvalidConfig(
                "forced_rebuild_interval must be at least 1".into(),
            ));
        }
        if self.max_acoustic_substeps == 0 {
            return Err(SphError::InvalidConfig(
                "max_acoustic_substeps must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
