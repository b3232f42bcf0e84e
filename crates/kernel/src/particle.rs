//! Particle storage in struct-of-arrays layout.
//!
//! Two populations live here: the per-frame fluid snapshot loaded from the
//! upstream solver (read-only after the bucket grid is built) and the
//! diffuse pool that persists across frames.

use glam::DVec3;

/// Classification of a diffuse particle, derived from its local fluid
/// density (a neighbor count, see [`DiffuseClass::from_density`]).
///
/// Never stored: always recomputed from the density at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum DiffuseClass {
    /// Almost no fluid neighbors: ballistic droplets.
    Spray = 0,
    /// Mid-range density: surface foam advected with the fluid.
    Foam = 1,
    /// Dense neighborhood: submerged air bubbles.
    Bubble = 2,
}

impl DiffuseClass {
    /// Derive the class from a neighbor-count density and the two
    /// thresholds (`spray < bubbles`).
    ///
    /// ```text
    /// density < spray              -> Spray
    /// spray <= density <= bubbles  -> Foam
    /// density > bubbles            -> Bubble
    /// ```
    pub fn from_density(density: f64, spray: f64, bubbles: f64) -> Self {
        if density < spray {
            DiffuseClass::Spray
        } else if density > bubbles {
            DiffuseClass::Bubble
        } else {
            DiffuseClass::Foam
        }
    }
}

/// One frame of fluid particles in struct-of-arrays layout.
///
/// All arrays are parallel: index `i` across every array refers to the same
/// particle, and the storage index is the particle's dense id for the frame.
/// [`crate::neighbor::BucketGrid::build`] reorders the arrays so that every
/// grid cell owns a contiguous index range.
#[derive(Debug, Clone, Default)]
pub struct FluidFrame {
    /// Positions (meters).
    pub pos: Vec<DVec3>,
    /// Velocities (m/s).
    pub vel: Vec<DVec3>,
    /// Densities as reported by the upstream solver (kg/m^3).
    pub rhop: Vec<f64>,
}

impl FluidFrame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fluid particles in the frame.
    pub fn len(&self) -> usize {
        self.pos.len()
    }

    /// Return `true` if the frame holds no particles.
    pub fn is_empty(&self) -> bool {
        self.pos.is_empty()
    }

    /// Append one fluid particle.
    pub fn push(&mut self, pos: DVec3, vel: DVec3, rhop: f64) {
        self.pos.push(pos);
        self.vel.push(vel);
        self.rhop.push(rhop);
    }

    /// Reorder all arrays by the given permutation: entry `i` of the result
    /// is the old entry `order[i]`.
    pub(crate) fn permute(&mut self, order: &[u32]) {
        debug_assert_eq!(order.len(), self.len());
        self.pos = order.iter().map(|&i| self.pos[i as usize]).collect();
        self.vel = order.iter().map(|&i| self.vel[i as usize]).collect();
        self.rhop = order.iter().map(|&i| self.rhop[i as usize]).collect();
    }
}

/// Per-fluid-particle scratch fields, recomputed every frame.
///
/// `trapped_air`, `wave_crest` and `energy` hold raw potentials after the
/// field passes and clamped values in [0, 1] after
/// [`crate::fields::clamp_fields`]. `color_field` is never clamped.
#[derive(Debug, Clone, Default)]
pub struct FieldBuffers {
    /// Trapped-air potential per particle.
    pub trapped_air: Vec<f64>,
    /// Smoothed color field per particle (low near the free surface).
    pub color_field: Vec<f64>,
    /// Wave-crest curvature potential per particle.
    pub wave_crest: Vec<f64>,
    /// Kinetic energy per particle.
    pub energy: Vec<f64>,
    /// Gradient of the smoothed color field.
    pub gradient: Vec<DVec3>,
    /// Number of diffuse particles to spawn from each source particle.
    pub spawn_count: Vec<u32>,
}

impl FieldBuffers {
    /// Zeroed buffers sized for `n` fluid particles.
    pub fn new(n: usize) -> Self {
        Self {
            trapped_air: vec![0.0; n],
            color_field: vec![0.0; n],
            wave_crest: vec![0.0; n],
            energy: vec![0.0; n],
            gradient: vec![DVec3::ZERO; n],
            spawn_count: vec![0; n],
        }
    }

    /// Number of particle slots.
    pub fn len(&self) -> usize {
        self.trapped_air.len()
    }

    /// Return `true` if sized for zero particles.
    pub fn is_empty(&self) -> bool {
        self.trapped_air.is_empty()
    }
}

/// The diffuse-particle population, persistent across frames.
///
/// Struct-of-arrays held in lock-step; ids are globally unique and strictly
/// increasing over the whole run. Mutated only in the serial lifecycle step
/// and through per-slot parallel writes during advection.
#[derive(Debug, Clone, Default)]
pub struct DiffusePool {
    /// Positions (meters).
    pub pos: Vec<DVec3>,
    /// Velocities (m/s).
    pub vel: Vec<DVec3>,
    /// Globally unique, monotonically increasing ids.
    pub id: Vec<u64>,
    /// Remaining foam-frame lifetime.
    pub ttl: Vec<i32>,
    /// Local fluid density (neighbor count), recomputed each frame.
    pub density: Vec<f64>,
}

impl DiffusePool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of diffuse particles in the pool.
    pub fn len(&self) -> usize {
        self.id.len()
    }

    /// Return `true` if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    /// Pool sized for `n` particles, zero-initialized. Used by the spawner,
    /// which then fills disjoint slices in parallel.
    pub fn with_len(n: usize) -> Self {
        Self {
            pos: vec![DVec3::ZERO; n],
            vel: vec![DVec3::ZERO; n],
            id: vec![0; n],
            ttl: vec![0; n],
            density: vec![0.0; n],
        }
    }

    /// Append one diffuse particle.
    pub fn push(&mut self, pos: DVec3, vel: DVec3, id: u64, ttl: i32, density: f64) {
        self.pos.push(pos);
        self.vel.push(vel);
        self.id.push(id);
        self.ttl.push(ttl);
        self.density.push(density);
    }

    /// Move all particles of `batch` into this pool, leaving `batch` empty.
    pub fn append(&mut self, batch: &mut DiffusePool) {
        self.pos.append(&mut batch.pos);
        self.vel.append(&mut batch.vel);
        self.id.append(&mut batch.id);
        self.ttl.append(&mut batch.ttl);
        self.density.append(&mut batch.density);
    }

    /// Keep only the particles whose index satisfies `keep`, preserving
    /// order. All arrays are compacted in lock-step.
    pub fn retain_indices<F: FnMut(usize) -> bool>(&mut self, mut keep: F) {
        let mut write = 0;
        for read in 0..self.len() {
            if keep(read) {
                if write != read {
                    self.pos[write] = self.pos[read];
                    self.vel[write] = self.vel[read];
                    self.id[write] = self.id[read];
                    self.ttl[write] = self.ttl[read];
                    self.density[write] = self.density[read];
                }
                write += 1;
            }
        }
        self.pos.truncate(write);
        self.vel.truncate(write);
        self.id.truncate(write);
        self.ttl.truncate(write);
        self.density.truncate(write);
    }
}
