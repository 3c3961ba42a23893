use std::ops::Index;

use glam::Vec3;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::adaptation::Adaptation;
use crate::error::{Result, SphError};
use crate::grid::SpatialIndex;
use crate::particle::ParticleSet;

/// One neighbor `j` of a particle `i`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighborPair {
    pub j: usize,
    /// Distance `|x_i - x_j|`
    pub r_ij: f32,
    /// Unit vector from `j` to `i`
    pub e_ij: Vec3,
    /// `W(r_ij) * V_j`
    pub w_ij_v_j: f32,
    /// `dW/dr(r_ij) * V_j`, never positive
    pub dw_ij_v_j: f32,
}

/// Neighbor list of one particle.
///
/// Buffers are kept between rebuilds; `current_size` marks the valid prefix.
#[derive(Clone, Debug, Default)]
pub struct Neighborhood {
    current_size: usize,
    j: Vec<usize>,
    r_ij: Vec<f32>,
    e_ij: Vec<Vec3>,
    w_ij_v_j: Vec<f32>,
    dw_ij_v_j: Vec<f32>,
}

impl Neighborhood {
    #[inline]
    pub fn len(&self) -> usize {
        self.current_size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current_size == 0
    }

    /// Allocated slots, including the ones beyond the valid prefix.
    pub fn capacity(&self) -> usize {
        self.j.len()
    }

    /// Forget all pairs without releasing memory.
    pub fn clear(&mut self) {
        self.current_size = 0;
    }

    pub fn push(&mut self, pair: NeighborPair) {
        let n = self.current_size;
        if n < self.j.len() {
            self.j[n] = pair.j;
            self.r_ij[n] = pair.r_ij;
            self.e_ij[n] = pair.e_ij;
            self.w_ij_v_j[n] = pair.w_ij_v_j;
            self.dw_ij_v_j[n] = pair.dw_ij_v_j;
        } else {
            self.j.push(pair.j);
            self.r_ij.push(pair.r_ij);
            self.e_ij.push(pair.e_ij);
            self.w_ij_v_j.push(pair.w_ij_v_j);
            self.dw_ij_v_j.push(pair.dw_ij_v_j);
        }
        self.current_size += 1;
    }

    #[inline]
    pub fn get(&self, n: usize) -> Option<NeighborPair> {
        (n < self.current_size).then(|| NeighborPair {
            j: self.j[n],
            r_ij: self.r_ij[n],
            e_ij: self.e_ij[n],
            w_ij_v_j: self.w_ij_v_j[n],
            dw_ij_v_j: self.dw_ij_v_j[n],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = NeighborPair> + '_ {
        (0..self.current_size).filter_map(move |n| self.get(n))
    }

    pub fn indices(&self) -> &[usize] {
        &self.j[..self.current_size]
    }

    pub fn find(&self, j: usize) -> Option<NeighborPair> {
        self.indices().iter().position(|&k| k == j).and_then(|n| self.get(n))
    }
}

impl PartialEq for Neighborhood {
    fn eq(&self, other: &Self) -> bool {
        let n = self.current_size;
        n == other.current_size
            && self.j[..n] == other.j[..n]
            && self.r_ij[..n] == other.r_ij[..n]
            && self.e_ij[..n] == other.e_ij[..n]
            && self.w_ij_v_j[..n] == other.w_ij_v_j[..n]
            && self.dw_ij_v_j[..n] == other.dw_ij_v_j[..n]
    }
}

/// Particles a neighborhood search looks into.
struct Candidates<'a> {
    particles: &'a ParticleSet,
    index: &'a SpatialIndex,
    adaptation: &'a Adaptation,
}

/// Fill `neighborhood` with every candidate strictly inside the pair cutoff.
///
/// The pair smoothing length is the larger of the two local smoothing lengths.
fn search(
    neighborhood: &mut Neighborhood,
    i: usize,
    particles: &ParticleSet,
    adaptation: &Adaptation,
    target: &Candidates<'_>,
    skip_self: bool,
) -> Result<()> {
    neighborhood.clear();
    let pos_i = particles.position[i];
    let h_i = adaptation.smoothing_length(particles.h_ratio[i]);
    let kernel = adaptation.kernel();
    let radius = adaptation
        .maximum_cutoff_radius()
        .max(target.adaptation.maximum_cutoff_radius());

    let mut failure = None;
    target.index.query_within(pos_i, radius, |j| {
        if failure.is_some() || (skip_self && j == i) {
            return;
        }
        let displacement = pos_i - target.particles.position[j];
        let r_ij = displacement.length();
        let h_j = target.adaptation.smoothing_length(target.particles.h_ratio[j]);
        let h = h_i.max(h_j);
        let cutoff = kernel.cutoff_radius(h);
        if r_ij >= cutoff {
            return;
        }
        if r_ij <= f32::EPSILON * cutoff {
            failure = Some(SphError::CoincidentParticles { i, j });
            return;
        }
        let v_j = target.particles.volume[j];
        neighborhood.push(NeighborPair {
            j,
            r_ij,
            e_ij: displacement / r_ij,
            w_ij_v_j: kernel.w(r_ij, h) * v_j,
            dw_ij_v_j: kernel.dw(r_ij, h) * v_j,
        });
    });
    failure.map_or(Ok(()), Err)
}

/// Neighborhoods of a body within itself.
#[derive(Clone, Debug, Default)]
pub struct InnerRelation {
    neighborhoods: Vec<Neighborhood>,
}

impl InnerRelation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.neighborhoods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighborhoods.is_empty()
    }

    pub fn neighborhoods(&self) -> &[Neighborhood] {
        &self.neighborhoods
    }

    /// Rebuild every particle's inner neighborhood from an up-to-date index.
    pub fn update(
        &mut self,
        particles: &ParticleSet,
        index: &SpatialIndex,
        adaptation: &Adaptation,
    ) -> Result<()> {
        self.neighborhoods.resize_with(particles.len(), Neighborhood::default);
        let target = Candidates {
            particles,
            index,
            adaptation,
        };

        #[cfg(feature = "parallel")]
        {
            self.neighborhoods
                .par_iter_mut()
                .enumerate()
                .try_for_each(|(i, nb)| search(nb, i, particles, adaptation, &target, true))
        }

        #[cfg(not(feature = "parallel"))]
        {
            self.neighborhoods
                .iter_mut()
                .enumerate()
                .try_for_each(|(i, nb)| search(nb, i, particles, adaptation, &target, true))
        }
    }
}

impl Index<usize> for InnerRelation {
    type Output = Neighborhood;

    fn index(&self, i: usize) -> &Neighborhood {
        &self.neighborhoods[i]
    }
}

/// Neighborhoods of a body's particles inside another body.
#[derive(Clone, Debug, Default)]
pub struct ContactRelation {
    neighborhoods: Vec<Neighborhood>,
}

impl ContactRelation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.neighborhoods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighborhoods.is_empty()
    }

    pub fn neighborhoods(&self) -> &[Neighborhood] {
        &self.neighborhoods
    }

    pub fn update(
        &mut self,
        particles: &ParticleSet,
        adaptation: &Adaptation,
        contact_particles: &ParticleSet,
        contact_index: &SpatialIndex,
        contact_adaptation: &Adaptation,
    ) -> Result<()> {
        self.neighborhoods.resize_with(particles.len(), Neighborhood::default);
        let target = Candidates {
            particles: contact_particles,
            index: contact_index,
            adaptation: contact_adaptation,
        };

        #[cfg(feature = "parallel")]
        {
            self.neighborhoods
                .par_iter_mut()
                .enumerate()
                .try_for_each(|(i, nb)| search(nb, i, particles, adaptation, &target, false))
        }

        #[cfg(not(feature = "parallel"))]
        {
            self.neighborhoods
                .iter_mut()
                .enumerate()
                .try_for_each(|(i, nb)| search(nb, i, particles, adaptation, &target, false))
        }
    }
}

impl Index<usize> for ContactRelation {
    type Output = Neighborhood;

    fn index(&self, i: usize) -> &Neighborhood {
        &self.neighborhoods[i]
    }
}
