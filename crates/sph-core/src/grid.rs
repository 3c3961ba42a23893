use glam::Vec3;

use crate::config::Dimensions;
use crate::error::{Result, SphError};
use crate::shapes::BoundingBox;

/// Why an index had to be rebuilt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildReason {
    NeverBuilt,
    CountChanged,
    Displacement,
    Interval,
}

/// Remembers positions at the last build and decides when a rebuild is due.
#[derive(Clone, Debug)]
struct RebuildTracker {
    reference: Vec<Vec3>,
    built: bool,
    updates_since_build: u32,
    max_displacement: f32,
    forced_interval: u32,
}

impl RebuildTracker {
    fn new(max_displacement: f32) -> Self {
        Self {
            reference: Vec::new(),
            built: false,
            updates_since_build: 0,
            max_displacement,
            forced_interval: u32::MAX,
        }
    }

    fn reason(&self, positions: &[Vec3]) -> Option<RebuildReason> {
        if !self.built {
            return Some(RebuildReason::NeverBuilt);
        }
        if positions.len() != self.reference.len() {
            return Some(RebuildReason::CountChanged);
        }
        if self.updates_since_build.saturating_add(1) >= self.forced_interval {
            return Some(RebuildReason::Interval);
        }
        let limit_sq = self.max_displacement * self.max_displacement;
        let moved = positions
            .iter()
            .zip(&self.reference)
            .any(|(p, r)| p.distance_squared(*r) > limit_sq);
        moved.then_some(RebuildReason::Displacement)
    }

    fn reset(&mut self, positions: &[Vec3]) {
        self.reference.clear();
        self.reference.extend_from_slice(positions);
        self.built = true;
        self.updates_since_build = 0;
    }
}

/// Largest bucket table a single cell-linked list allocates.
pub const MAX_TABLE_SIZE: usize = 1 << 20;

/// Cell-linked list over a bounded domain.
///
/// Uses counting sort for O(N) construction: count particles per bucket -> prefix sum ->
/// scatter. Positions outside the domain are clamped into the boundary cells, so every
/// particle lives in exactly one cell. The cell side is `cutoff * (1 + 2 * skin)`; as long
/// as no particle has moved more than `skin * cutoff` since the last build, the 3^d
/// stencil still covers every pair inside the cutoff.
///
/// Each cell owns one bucket while the grid has at most [`MAX_TABLE_SIZE`] cells. Finer
/// grids hash their cells into that many buckets, and queries skip members of colliding
/// cells.
#[derive(Clone, Debug)]
pub struct CellLinkedList {
    domain: BoundingBox,
    dimensions: Dimensions,
    cutoff: f32,
    cell_size: f32,
    inv_cell_size: f32,
    cells: [usize; 3],
    hashed: bool,
    /// cell_count[b] = number of particles in bucket b
    cell_count: Vec<u32>,
    /// cell_start[b] = index where particles for bucket b begin in sorted_indices
    cell_start: Vec<u32>,
    /// Particle indices sorted by bucket
    sorted_indices: Vec<u32>,
    /// Linear cell per particle, `usize::MAX` when the particle was filtered out
    particle_cells: Vec<usize>,
    /// Bucket per particle (used during build)
    particle_buckets: Vec<u32>,
    tracker: RebuildTracker,
}

impl CellLinkedList {
    pub fn new(
        domain: BoundingBox,
        cutoff: f32,
        skin: f32,
        dimensions: Dimensions,
    ) -> Result<Self> {
        domain.validate()?;
        if !(cutoff > 0.0 && cutoff.is_finite()) {
            return Err(SphError::InvalidSpacing(cutoff));
        }
        if !(0.0..1.0).contains(&skin) {
            return Err(SphError::InvalidConfig(format!(
                "index skin must lie in [0, 1), got {skin}"
            )));
        }
        let cell_size = cutoff * (1.0 + 2.0 * skin);
        let extent = domain.extent();
        let axis = |len: f32| ((len / cell_size).ceil() as usize).max(1);
        let cells = match dimensions {
            Dimensions::Two => [axis(extent.x), axis(extent.y), 1],
            Dimensions::Three => [axis(extent.x), axis(extent.y), axis(extent.z)],
        };
        let total = cells[0]
            .checked_mul(cells[1])
            .and_then(|n| n.checked_mul(cells[2]))
            .ok_or_else(|| {
                SphError::InvalidConfig(format!(
                    "cell size {cell_size} is too small for domain extent {extent:?}"
                ))
            })?;
        let table_size = total.min(MAX_TABLE_SIZE);
        let hashed = total > table_size;
        if hashed {
            log::debug!("cell-linked list hashes {total} cells into {table_size} buckets");
        }
        Ok(Self {
            domain,
            dimensions,
            cutoff,
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            cells,
            hashed,
            cell_count: vec![0; table_size],
            cell_start: vec![0; table_size],
            sorted_indices: Vec::new(),
            particle_cells: Vec::new(),
            particle_buckets: Vec::new(),
            tracker: RebuildTracker::new(skin * cutoff),
        })
    }

    /// Rebuild at least every `interval` calls to [`update`](Self::update).
    pub fn with_forced_rebuild_interval(mut self, interval: u32) -> Self {
        self.tracker.forced_interval = interval.max(1);
        self
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    /// Number of buckets, at most [`MAX_TABLE_SIZE`].
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cell_count.len()
    }

    /// Whether cells share buckets.
    #[inline]
    pub fn is_hashed(&self) -> bool {
        self.hashed
    }

    /// Build the list from current positions.
    pub fn build(&mut self, positions: &[Vec3]) {
        self.bin(positions, |_| true);
        self.tracker.reset(positions);
    }

    /// Counting sort of the particles accepted by `include`.
    pub(crate) fn bin(&mut self, positions: &[Vec3], include: impl Fn(usize) -> bool) {
        let n = positions.len();

        // 1. Clear cell_count
        self.cell_count.fill(0);
        self.particle_cells.clear();
        self.particle_cells.resize(n, usize::MAX);
        self.particle_buckets.clear();
        self.particle_buckets.resize(n, u32::MAX);

        // 2. For each particle, compute its cell and bucket, store them, and increment count
        let mut inserted = 0usize;
        for (i, &p) in positions.iter().enumerate() {
            if !include(i) {
                continue;
            }
            let coords = self.cell_coords(p);
            let b = self.bucket(coords);
            self.particle_cells[i] = self.linear_cell(coords);
            self.particle_buckets[i] = b as u32;
            self.cell_count[b] += 1;
            inserted += 1;
        }

        // 3. Prefix sum on cell_count -> cell_start
        let mut running = 0u32;
        for (start, &count) in self.cell_start.iter_mut().zip(&self.cell_count) {
            *start = running;
            running += count;
        }

        // 4. Reset cell_count to 0 (reuse for scatter offsets)
        self.cell_count.fill(0);

        // 5. Scatter particles into sorted_indices, ascending index within a bucket
        self.sorted_indices.clear();
        self.sorted_indices.resize(inserted, 0);
        for i in 0..n {
            let b = self.particle_buckets[i];
            if b == u32::MAX {
                continue;
            }
            let b = b as usize;
            let idx = self.cell_start[b] + self.cell_count[b];
            self.sorted_indices[idx as usize] = i as u32;
            self.cell_count[b] += 1;
        }
    }

    pub fn needs_rebuild(&self, positions: &[Vec3]) -> bool {
        self.tracker.reason(positions).is_some()
    }

    /// Rebuild if stale; returns whether a rebuild happened.
    pub fn update(&mut self, positions: &[Vec3]) -> bool {
        match self.tracker.reason(positions) {
            Some(reason) => {
                log::trace!(
                    "rebuilding cell-linked list ({} particles): {reason:?}",
                    positions.len()
                );
                self.build(positions);
                true
            }
            None => {
                self.tracker.updates_since_build += 1;
                false
            }
        }
    }

    /// Visit every particle in the 3^d cells around `pos`.
    /// The caller is responsible for distance checks.
    pub fn query_neighbors<F: FnMut(usize)>(&self, pos: Vec3, callback: F) {
        self.visit_stencil(pos, 1, callback);
    }

    /// Visit every particle in a stencil wide enough to cover `radius` around `pos`.
    ///
    /// Particles are binned at their positions of the last build, so the stencil also
    /// covers the displacement the list tolerates before it rebuilds.
    pub fn query_within<F: FnMut(usize)>(&self, pos: Vec3, radius: f32, callback: F) {
        let reach = (radius + self.tracker.max_displacement) * self.inv_cell_size;
        self.visit_stencil(pos, (reach.ceil() as i64).max(1), callback);
    }

    /// Particle indices in traversal order, grouped by bucket.
    pub fn sorted_indices(&self) -> &[u32] {
        &self.sorted_indices
    }

    /// Linear cell holding particle `i`, if it was inserted by the last build.
    pub fn cell_index_of_particle(&self, i: usize) -> Option<usize> {
        self.particle_cells.get(i).copied().filter(|&c| c != usize::MAX)
    }

    /// Particles stored in bucket `b`.
    pub fn cell_members(&self, b: usize) -> &[u32] {
        let start = self.cell_start[b] as usize;
        let end = start + self.cell_count[b] as usize;
        &self.sorted_indices[start..end]
    }

    fn visit_stencil<F: FnMut(usize)>(&self, pos: Vec3, reach: i64, mut callback: F) {
        let [cx, cy, cz] = self.cell_coords(pos);
        let z_reach = match self.dimensions {
            Dimensions::Two => 0,
            Dimensions::Three => reach,
        };
        let range = |c: usize, n: usize, r: i64| {
            let lo = (c as i64 - r).max(0) as usize;
            let hi = (c as i64 + r).min(n as i64 - 1) as usize;
            lo..=hi
        };
        for z in range(cz, self.cells[2], z_reach) {
            for y in range(cy, self.cells[1], reach) {
                for x in range(cx, self.cells[0], reach) {
                    let coords = [x, y, z];
                    let cell = self.linear_cell(coords);
                    for &j in self.cell_members(self.bucket(coords)) {
                        if !self.hashed || self.particle_cells[j as usize] == cell {
                            callback(j as usize);
                        }
                    }
                }
            }
        }
    }

    #[inline]
    fn linear_cell(&self, [x, y, z]: [usize; 3]) -> usize {
        (z * self.cells[1] + y) * self.cells[0] + x
    }

    /// Hash function: cell coords -> table index
    #[inline]
    fn bucket(&self, coords: [usize; 3]) -> usize {
        if !self.hashed {
            return self.linear_cell(coords);
        }
        let [x, y, z] = coords;
        let h = (x as u32).wrapping_mul(73856093)
            ^ (y as u32).wrapping_mul(19349663)
            ^ (z as u32).wrapping_mul(83492791);
        (h as usize) % self.cell_count.len()
    }

    /// Convert world position to clamped cell coordinates
    #[inline]
    fn cell_coords(&self, pos: Vec3) -> [usize; 3] {
        let local = (pos - self.domain.lower) * self.inv_cell_size;
        let clamp = |v: f32, n: usize| {
            if v.is_nan() {
                0
            } else {
                (v.floor().max(0.0) as usize).min(n - 1)
            }
        };
        [
            clamp(local.x, self.cells[0]),
            clamp(local.y, self.cells[1]),
            match self.dimensions {
                Dimensions::Two => 0,
                Dimensions::Three => clamp(local.z, self.cells[2]),
            },
        ]
    }
}

/// One cell-linked list per refinement level.
///
/// A particle with smoothing ratio `h_ratio` lives at level `floor(log2(h_ratio))`.
#[derive(Clone, Debug)]
pub struct MultilevelCellLinkedList {
    levels: Vec<CellLinkedList>,
    particle_levels: Vec<usize>,
    tracker: RebuildTracker,
}

impl MultilevelCellLinkedList {
    /// `cutoffs[l]` is the cutoff radius at level `l`, coarsest first.
    pub fn new(
        domain: BoundingBox,
        cutoffs: &[f32],
        skin: f32,
        dimensions: Dimensions,
    ) -> Result<Self> {
        if cutoffs.is_empty() {
            return Err(SphError::InvalidConfig(
                "a multilevel cell-linked list needs at least one level".into(),
            ));
        }
        let levels = cutoffs
            .iter()
            .map(|&cutoff| CellLinkedList::new(domain, cutoff, skin, dimensions))
            .collect::<Result<Vec<_>>>()?;
        let finest = cutoffs.iter().copied().fold(f32::INFINITY, f32::min);
        Ok(Self {
            levels,
            particle_levels: Vec::new(),
            tracker: RebuildTracker::new(skin * finest),
        })
    }

    pub fn with_forced_rebuild_interval(mut self, interval: u32) -> Self {
        self.tracker.forced_interval = interval.max(1);
        self
    }

    pub fn total_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, l: usize) -> Option<&CellLinkedList> {
        self.levels.get(l)
    }

    pub fn level_of(&self, h_ratio: f32) -> usize {
        let l = h_ratio.max(1.0).log2().floor() as usize;
        l.min(self.levels.len() - 1)
    }

    pub fn build(&mut self, positions: &[Vec3], h_ratio: &[f32]) {
        self.particle_levels.clear();
        let levels: Vec<usize> = (0..positions.len())
            .map(|i| self.level_of(h_ratio.get(i).copied().unwrap_or(1.0)))
            .collect();
        for (l, list) in self.levels.iter_mut().enumerate() {
            list.bin(positions, |i| levels[i] == l);
        }
        self.particle_levels = levels;
        self.tracker.reset(positions);
    }

    pub fn needs_rebuild(&self, positions: &[Vec3]) -> bool {
        self.tracker.reason(positions).is_some()
    }

    pub fn update(&mut self, positions: &[Vec3], h_ratio: &[f32]) -> bool {
        match self.tracker.reason(positions) {
            Some(reason) => {
                log::trace!(
                    "rebuilding {}-level cell-linked list ({} particles): {reason:?}",
                    self.levels.len(),
                    positions.len()
                );
                self.build(positions, h_ratio);
                true
            }
            None => {
                self.tracker.updates_since_build += 1;
                false
            }
        }
    }

    /// Level particle `i` was inserted at by the last build.
    pub fn particle_level(&self, i: usize) -> Option<usize> {
        self.particle_levels.get(i).copied()
    }

    pub fn query_within<F: FnMut(usize)>(&self, pos: Vec3, radius: f32, mut callback: F) {
        for list in &self.levels {
            list.query_within(pos, radius, &mut callback);
        }
    }
}

/// Spatial index chosen by a body's adaptation.
#[derive(Clone, Debug)]
pub enum SpatialIndex {
    Uniform(CellLinkedList),
    Multilevel(MultilevelCellLinkedList),
}

impl SpatialIndex {
    pub fn needs_rebuild(&self, positions: &[Vec3]) -> bool {
        match self {
            SpatialIndex::Uniform(list) => list.needs_rebuild(positions),
            SpatialIndex::Multilevel(list) => list.needs_rebuild(positions),
        }
    }

    pub fn update(&mut self, positions: &[Vec3], h_ratio: &[f32]) -> bool {
        match self {
            SpatialIndex::Uniform(list) => list.update(positions),
            SpatialIndex::Multilevel(list) => list.update(positions, h_ratio),
        }
    }

    pub fn force_rebuild(&mut self, positions: &[Vec3], h_ratio: &[f32]) {
        match self {
            SpatialIndex::Uniform(list) => list.build(positions),
            SpatialIndex::Multilevel(list) => list.build(positions, h_ratio),
        }
    }

    pub fn with_forced_rebuild_interval(self, interval: u32) -> Self {
        match self {
            SpatialIndex::Uniform(list) => {
                SpatialIndex::Uniform(list.with_forced_rebuild_interval(interval))
            }
            SpatialIndex::Multilevel(list) => {
                SpatialIndex::Multilevel(list.with_forced_rebuild_interval(interval))
            }
        }
    }

    pub fn query_within<F: FnMut(usize)>(&self, pos: Vec3, radius: f32, callback: F) {
        match self {
            SpatialIndex::Uniform(list) => list.query_within(pos, radius, callback),
            SpatialIndex::Multilevel(list) => list.query_within(pos, radius, callback),
        }
    }
}
