//! Diffuse-particle classification, advection and lifecycle.
//!
//! Every frame the local fluid density of each diffuse particle is
//! recomputed as a plain neighbor count within the kernel radius; the class
//! (spray / foam / bubble) is derived from it on the spot and selects the
//! integration law. The serial lifecycle step then ages foam, drops expired
//! or escaped particles and appends the newborns.

use glam::DVec3;
use rayon::prelude::*;

use crate::neighbor::BucketGrid;
use crate::particle::{DiffuseClass, DiffusePool, FluidFrame};
use crate::sph;

/// Gravitational acceleration (m/s^2), acting along -z.
pub const GRAVITY: f64 = 9.81;

/// Parameters of the per-frame advection step.
#[derive(Debug, Clone, Copy)]
pub struct AdvectParams {
    /// Kernel radius.
    pub h: f64,
    /// Current frame time step.
    pub dt: f64,
    /// Density below which a particle is spray.
    pub spray: f64,
    /// Density above which a particle is a bubble.
    pub bubbles: f64,
    /// Bubble buoyancy coefficient.
    pub buoyancy: f64,
    /// Bubble drag coefficient.
    pub drag: f64,
}

/// Count the fluid particles within `h` of each position.
///
/// This is the classifier's density: a neighbor count, not a mass-weighted
/// summation. Runs in parallel, one write slot per diffuse particle.
pub fn recount_density(
    pos: &[DVec3],
    density: &mut [f64],
    frame: &FluidFrame,
    grid: &BucketGrid,
    h: f64,
) {
    density
        .par_iter_mut()
        .zip(pos.par_iter())
        .for_each(|(rho, &x)| {
            *rho = count_neighbors(x, frame, grid, h);
        });
}

fn count_neighbors(x: DVec3, frame: &FluidFrame, grid: &BucketGrid, h: f64) -> f64 {
    let mut count = 0.0;
    for neighbors in grid.surrounding_point(x) {
        for j in neighbors {
            if (x - frame.pos[j]).length() <= h {
                count += 1.0;
            }
        }
    }
    count
}

/// Advect the persistent pool through one frame.
///
/// Per particle: recount the density at the pre-move position, then
/// integrate with the class-specific law (`g` along -z):
///
/// ```text
/// spray:  v_z -= g dt;                     x += dt v
/// bubble: v_xy += kd (vbar_xy - v_xy)
///         v_z  += kb g dt + kd (vbar_z - v_z);  x += dt v
/// foam:   v = vbar;                        x += dt vbar
/// ```
///
/// `vbar` is the Wendland-weighted mean fluid velocity over the 27-cell
/// neighborhood. A zero weight sum leaves `vbar` undefined, in which case
/// the particle falls back to the spray law.
pub fn advect(pool: &mut DiffusePool, frame: &FluidFrame, grid: &BucketGrid, p: &AdvectParams) {
    let DiffusePool {
        pos,
        vel,
        density,
        ..
    } = pool;

    pos.par_iter_mut()
        .zip(vel.par_iter_mut())
        .zip(density.par_iter_mut())
        .for_each(|((x, v), rho)| {
            *rho = count_neighbors(*x, frame, grid, p.h);

            // Spray never needs the smoothed fluid velocity.
            let mut num = DVec3::ZERO;
            let mut den = 0.0;
            if *rho >= p.spray {
                for neighbors in grid.surrounding_point(*x) {
                    for j in neighbors {
                        let w = sph::wendland((*x - frame.pos[j]).length(), p.h);
                        num += frame.vel[j] * w;
                        den += w;
                    }
                }
            }

            if *rho < p.spray || den <= 0.0 {
                v.z -= GRAVITY * p.dt;
                *x += p.dt * *v;
            } else if *rho > p.bubbles {
                let vbar = num / den;
                v.x += p.drag * (vbar.x - v.x);
                v.y += p.drag * (vbar.y - v.y);
                v.z += p.buoyancy * GRAVITY * p.dt + p.drag * (vbar.z - v.z);
                *x += p.dt * *v;
            } else {
                let vbar = num / den;
                *v = vbar;
                *x += p.dt * vbar;
            }
        });
}

/// Age foam and cull the pool after advection. Returns the number of
/// particles removed.
///
/// Every particle currently classified as foam loses one frame of lifetime;
/// any particle with negative lifetime or with a coordinate at or beyond the
/// domain box is dropped. Newborns are appended afterwards by the driver and
/// are not subject to this frame's decrement.
pub fn decrement_and_cull(
    pool: &mut DiffusePool,
    domain_min: DVec3,
    domain_max: DVec3,
    spray: f64,
    bubbles: f64,
) -> usize {
    for i in 0..pool.len() {
        if DiffuseClass::from_density(pool.density[i], spray, bubbles) == DiffuseClass::Foam {
            pool.ttl[i] -= 1;
        }
    }

    let before = pool.len();
    let keep: Vec<bool> = (0..before)
        .map(|i| {
            let x = pool.pos[i];
            pool.ttl[i] >= 0
                && x.x > domain_min.x
                && x.x < domain_max.x
                && x.y > domain_min.y
                && x.y < domain_max.y
                && x.z > domain_min.z
                && x.z < domain_max.z
        })
        .collect();
    pool.retain_indices(|i| keep[i]);
    before - pool.len()
}
