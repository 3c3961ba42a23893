//! Particle resolution of a body and the factories that depend on it.
//!
//! All lengths derive from the global system spacing: the body's reference spacing is
//! `system_spacing / system_resolution_ratio`, and the reference smoothing length is
//! `h_spacing_ratio` times that. Local refinement halves the spacing up to
//! `local_refinement_level` times; particles then carry their own `h_ratio`.

use glam::Vec3;

use crate::config::{AdaptationConfig, Dimensions};
use crate::error::{Result, SphError};
use crate::grid::{CellLinkedList, MultilevelCellLinkedList, SpatialIndex};
use crate::kernel::SmoothingKernel;
use crate::level_set::LevelSet;
use crate::math::smoothstep;
use crate::particle::ParticleSet;
use crate::shapes::{BoundingBox, Shape};

pub const MAX_REFINEMENT_LEVEL: u32 = 8;

/// `spacing / 2^level`, exact in binary floating point.
#[inline]
pub fn refined_spacing(spacing: f32, level: u32) -> f32 {
    spacing / (1u32 << level.min(31)) as f32
}

#[derive(Debug)]
pub struct Adaptation {
    dimensions: Dimensions,
    config: AdaptationConfig,
    system_spacing: f32,
    kernel: Box<dyn SmoothingKernel>,
    spacing_ref: f32,
    h_ref: f32,
    spacing_min: f32,
    spacing_ratio_min: f32,
    h_ratio_max: f32,
    number_density_min: f32,
    number_density_max: f32,
}

impl Adaptation {
    pub fn new(
        system_spacing: f32,
        config: &AdaptationConfig,
        dimensions: Dimensions,
    ) -> Result<Self> {
        if !(system_spacing > 0.0 && system_spacing.is_finite()) {
            return Err(SphError::InvalidSpacing(system_spacing));
        }
        let mut adaptation = Self {
            dimensions,
            config: config.clone(),
            system_spacing,
            kernel: config.kernel.build(dimensions),
            spacing_ref: 0.0,
            h_ref: 0.0,
            spacing_min: 0.0,
            spacing_ratio_min: 1.0,
            h_ratio_max: 1.0,
            number_density_min: 0.0,
            number_density_max: 0.0,
        };
        adaptation.derive()?;
        Ok(adaptation)
    }

    /// Replace the global ratios and recompute every derived quantity.
    pub fn reset_adaptation_ratios(
        &mut self,
        h_spacing_ratio: f32,
        system_resolution_ratio: f32,
    ) -> Result<()> {
        let previous = self.config.clone();
        self.config.h_spacing_ratio = h_spacing_ratio;
        self.config.system_resolution_ratio = system_resolution_ratio;
        if let Err(err) = self.derive() {
            self.config = previous;
            self.derive()?;
            return Err(err);
        }
        Ok(())
    }

    fn derive(&mut self) -> Result<()> {
        let c = self.config.clone();
        if !(c.system_resolution_ratio > 0.0 && c.system_resolution_ratio.is_finite()) {
            return Err(SphError::InvalidResolutionRatio(c.system_resolution_ratio));
        }
        if !(c.h_spacing_ratio > 0.0 && c.h_spacing_ratio.is_finite()) {
            return Err(SphError::InvalidSpacingRatio(c.h_spacing_ratio));
        }
        if c.local_refinement_level > MAX_REFINEMENT_LEVEL {
            return Err(SphError::RefinementTooDeep {
                level: c.local_refinement_level,
                max: MAX_REFINEMENT_LEVEL,
            });
        }

        self.spacing_ref = self.system_spacing / c.system_resolution_ratio;
        self.h_ref = c.h_spacing_ratio * self.spacing_ref;
        self.spacing_min = refined_spacing(self.spacing_ref, c.local_refinement_level);
        self.spacing_ratio_min = self.spacing_min / self.spacing_ref;
        self.h_ratio_max = (1u32 << c.local_refinement_level) as f32;
        self.number_density_min = self.reference_number_density(1.0);
        self.number_density_max = self.reference_number_density(self.h_ratio_max);

        log::debug!(
            "adaptation: spacing_ref={} h_ref={} spacing_min={} h_ratio_max={} sigma0={}",
            self.spacing_ref,
            self.h_ref,
            self.spacing_min,
            self.h_ratio_max,
            self.number_density_min
        );
        Ok(())
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn kernel(&self) -> &dyn SmoothingKernel {
        self.kernel.as_ref()
    }

    pub fn config(&self) -> &AdaptationConfig {
        &self.config
    }

    pub fn reference_spacing(&self) -> f32 {
        self.spacing_ref
    }

    pub fn reference_smoothing_length(&self) -> f32 {
        self.h_ref
    }

    pub fn minimum_spacing(&self) -> f32 {
        self.spacing_min
    }

    pub fn minimum_spacing_ratio(&self) -> f32 {
        self.spacing_ratio_min
    }

    pub fn maximum_h_ratio(&self) -> f32 {
        self.h_ratio_max
    }

    pub fn local_refinement_level(&self) -> u32 {
        self.config.local_refinement_level
    }

    pub fn is_refined(&self) -> bool {
        self.config.local_refinement_level > 0
    }

    pub fn minimum_number_density(&self) -> f32 {
        self.number_density_min
    }

    pub fn maximum_number_density(&self) -> f32 {
        self.number_density_max
    }

    #[inline]
    pub fn smoothing_length(&self, h_ratio: f32) -> f32 {
        self.h_ref / h_ratio
    }

    #[inline]
    pub fn cutoff_radius(&self, h_ratio: f32) -> f32 {
        self.kernel.cutoff_radius(self.smoothing_length(h_ratio))
    }

    /// Largest cutoff in the body (at `h_ratio == 1`).
    #[inline]
    pub fn maximum_cutoff_radius(&self) -> f32 {
        self.cutoff_radius(1.0)
    }

    pub fn minimum_smoothing_length(&self) -> f32 {
        self.smoothing_length(self.h_ratio_max)
    }

    /// Kernel sum `Σ W` over a full regular lattice at the given resolution.
    pub fn reference_number_density(&self, h_ratio: f32) -> f32 {
        let spacing = self.spacing_ref / h_ratio;
        let h = self.smoothing_length(h_ratio);
        let cutoff = self.kernel.cutoff_radius(h);
        let n = (cutoff / spacing).ceil() as i32;
        let nz = match self.dimensions {
            Dimensions::Two => 0,
            Dimensions::Three => n,
        };
        let mut sigma = 0.0;
        for k in -nz..=nz {
            for j in -n..=n {
                for i in -n..=n {
                    let r = (Vec3::new(i as f32, j as f32, k as f32) * spacing).length();
                    if r < cutoff {
                        sigma += self.kernel.w(r, h);
                    }
                }
            }
        }
        sigma
    }

    /// Smoothing ratio matching a local particle spacing, within `[1, h_ratio_max]`.
    pub fn h_ratio_for_spacing(&self, spacing: f32) -> f32 {
        (self.spacing_ref / spacing).clamp(1.0, self.h_ratio_max)
    }

    /// Spacing refined towards the surface of `shape`.
    ///
    /// Equals `spacing_min` on the surface and `spacing_ref` once the distance exceeds
    /// `kernel_size * 2 * spacing_ref`.
    pub fn local_spacing(&self, shape: &dyn Shape, x: Vec3) -> f32 {
        let phi = shape.signed_distance(x).abs();
        let ratio = phi / (2.0 * self.spacing_ref);
        let t = smoothstep(0.0, self.kernel.kernel_size(), ratio);
        self.spacing_min + (self.spacing_ref - self.spacing_min) * t
    }

    /// Set every particle's `h_ratio` from its surface-refined spacing.
    pub fn assign_h_ratios(&self, shape: &dyn Shape, particles: &mut ParticleSet) {
        if !self.is_refined() {
            particles.h_ratio.fill(1.0);
            return;
        }
        for (h_ratio, &x) in particles.h_ratio.iter_mut().zip(&particles.position) {
            *h_ratio = self.h_ratio_for_spacing(self.local_spacing(shape, x));
        }
    }

    /// Sample `shape` into a level set and refine `particles` towards its surface.
    ///
    /// The returned level set answers the later surface queries of the body.
    pub fn refine_by_shape(
        &self,
        shape: &dyn Shape,
        particles: &mut ParticleSet,
    ) -> Result<LevelSet> {
        let level_set = self.create_level_set(shape, 1.0)?;
        self.assign_h_ratios(&level_set, particles);
        Ok(level_set)
    }

    /// Uniform list for uniform bodies, one level per refinement step otherwise.
    pub fn create_cell_linked_list(&self, domain: BoundingBox, skin: f32) -> Result<SpatialIndex> {
        if !self.is_refined() {
            let cutoff = self.maximum_cutoff_radius();
            let list = CellLinkedList::new(domain, cutoff, skin, self.dimensions)?;
            return Ok(SpatialIndex::Uniform(list));
        }
        let cutoffs: Vec<f32> = (0..=self.config.local_refinement_level)
            .map(|l| self.cutoff_radius((1u32 << l) as f32))
            .collect();
        let list = MultilevelCellLinkedList::new(domain, &cutoffs, skin, self.dimensions)?;
        Ok(SpatialIndex::Multilevel(list))
    }

    /// Level set with one level per refinement step; coarsest spacing is
    /// `spacing_ref / refinement_ratio`.
    pub fn create_level_set(&self, shape: &dyn Shape, refinement_ratio: f32) -> Result<LevelSet> {
        if !(refinement_ratio > 0.0 && refinement_ratio.is_finite()) {
            return Err(SphError::InvalidResolutionRatio(refinement_ratio));
        }
        LevelSet::new(
            shape,
            self.spacing_ref / refinement_ratio,
            self.config.local_refinement_level as usize + 1,
            self.dimensions,
        )
    }
}
