//! Diffuse-particle spawning.
//!
//! Each source particle with a nonzero spawn count emits new diffuse
//! particles inside a cylinder aligned with its velocity: radius equals the
//! kernel radius, height covers half the distance the particle travels in
//! one step. Uniform samples are pre-generated serially by the driver (one
//! RNG, three draws per spawn); the spawn loop itself runs in parallel over
//! occupied cells, each cell writing a disjoint slice of the newborn arrays
//! determined by a prefix sum of the spawn counts. Ids are assigned from the
//! same prefix sum, so id order equals source order at any thread count.

use std::f64::consts::PI;

use glam::DVec3;
use rayon::prelude::*;

use crate::neighbor::BucketGrid;
use crate::particle::{DiffusePool, FluidFrame};

/// Build a right-handed orthonormal pair `{e1, e2}` spanning the plane
/// perpendicular to `v`.
///
/// `e1` solves `v . e1 = 0` in closed form against the first nonzero
/// component of `v` (x, then y, then z); `e2 = normalize(e1 x v)`.
///
/// `v` must be nonzero; the spawner guarantees this because zero-velocity
/// sources are assigned a zero spawn count.
pub fn orthonormal_basis(v: DVec3) -> (DVec3, DVec3) {
    let e1 = if v.x != 0.0 {
        DVec3::new(-v.y / v.x, 1.0, 0.0)
    } else if v.y != 0.0 {
        DVec3::new(1.0, -v.x / v.y, 0.0)
    } else {
        DVec3::new(1.0, 0.0, -v.x / v.z)
    }
    .normalize();
    let e2 = e1.cross(v).normalize();
    (e1, e2)
}

/// Exclusive prefix sum of the spawn counts, one entry per particle plus the
/// grand total in the last slot.
pub fn spawn_offsets(spawn_count: &[u32]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(spawn_count.len() + 1);
    let mut running = 0usize;
    for &n in spawn_count {
        offsets.push(running);
        running += n as usize;
    }
    offsets.push(running);
    offsets
}

/// Spawn one frame's newborn diffuse particles.
///
/// For each source `i` with `spawn_count[i] >= 1`, consume three uniforms
/// `(u1, u2, u3)` per spawn:
///
/// ```text
/// h_along = u1 * |v_i| * dt / 2
/// r       = h * sqrt(u2)
/// theta   = 2 pi u3
/// x_d     = x_i + r cos(theta) e1 + r sin(theta) e2 + h_along v^
/// v_d     =       r cos(theta) e1 + r sin(theta) e2 + v_i
/// ```
///
/// Newborn ids are `base_id + offset[i] + j` and the initial lifetime is
/// `spawn_count[i] * lifetime`. Densities are left at zero for the
/// classifier to fill in.
///
/// # Panics
/// If `uniforms.len()` differs from `3 * sum(spawn_count)`.
pub fn spawn_diffuse(
    frame: &FluidFrame,
    grid: &BucketGrid,
    spawn_count: &[u32],
    uniforms: &[f64],
    dt: f64,
    h: f64,
    lifetime: i32,
    base_id: u64,
) -> DiffusePool {
    let offsets = spawn_offsets(spawn_count);
    let total = *offsets.last().expect("offsets never empty");
    assert_eq!(
        uniforms.len(),
        3 * total,
        "need exactly three uniform samples per spawn"
    );

    let mut batch = DiffusePool::with_len(total);
    if total == 0 {
        return batch;
    }

    // Per-cell output slice lengths, in occupied order.
    let cell_lens: Vec<usize> = grid
        .occupied_cells()
        .iter()
        .map(|&cell| {
            let r = grid.cell_range(cell);
            offsets[r.end] - offsets[r.start]
        })
        .collect();
    let pos_slices = split_by_lengths(&mut batch.pos, &cell_lens);
    let vel_slices = split_by_lengths(&mut batch.vel, &cell_lens);
    let id_slices = split_by_lengths(&mut batch.id, &cell_lens);
    let ttl_slices = split_by_lengths(&mut batch.ttl, &cell_lens);

    grid.occupied_cells()
        .par_iter()
        .zip(pos_slices)
        .zip(vel_slices)
        .zip(id_slices)
        .zip(ttl_slices)
        .for_each(|((((&cell, out_pos), out_vel), out_id), out_ttl)| {
            let range = grid.cell_range(cell);
            let cell_base = offsets[range.start];

            for i in range {
                let n = spawn_count[i] as usize;
                if n == 0 {
                    continue;
                }
                let vel = frame.vel[i];
                let pos = frame.pos[i];
                let (e1, e2) = orthonormal_basis(vel);
                let axis = vel.normalize();
                let speed = vel.length();

                for j in 0..n {
                    let global = offsets[i] + j;
                    let slot = global - cell_base;
                    let u = &uniforms[3 * global..3 * global + 3];

                    let h_along = u[0] * speed * dt * 0.5;
                    let r = h * u[1].sqrt();
                    let theta = 2.0 * PI * u[2];
                    let radial = r * theta.cos() * e1 + r * theta.sin() * e2;

                    out_pos[slot] = pos + radial + h_along * axis;
                    out_vel[slot] = radial + vel;
                    out_id[slot] = base_id + global as u64;
                    out_ttl[slot] = n as i32 * lifetime;
                }
            }
        });

    batch
}

/// Partition `data` into consecutive slices of the given lengths.
///
/// The lengths must sum to `data.len()`.
fn split_by_lengths<'a, T>(data: &'a mut [T], lens: &[usize]) -> Vec<&'a mut [T]> {
    let mut slices = Vec::with_capacity(lens.len());
    let mut rest = data;
    for &len in lens {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(len);
        slices.push(head);
        rest = tail;
    }
    debug_assert!(rest.is_empty());
    slices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basis_is_orthonormal() {
        for v in [
            DVec3::new(1.0, 2.0, 3.0),
            DVec3::new(-0.3, 0.0, 0.0),
            DVec3::new(0.0, 4.0, -1.0),
            DVec3::new(0.0, 0.0, 2.5),
        ] {
            let (e1, e2) = orthonormal_basis(v);
            assert!(v.dot(e1).abs() < 1.0e-12, "e1 not orthogonal to {v}");
            assert!(v.dot(e2).abs() < 1.0e-12, "e2 not orthogonal to {v}");
            assert!(e1.dot(e2).abs() < 1.0e-12, "e1 not orthogonal to e2");
            assert!((e1.length() - 1.0).abs() < 1.0e-12);
            assert!((e2.length() - 1.0).abs() < 1.0e-12);
        }
    }

    #[test]
    fn offsets_prefix_sum() {
        assert_eq!(spawn_offsets(&[2, 0, 3]), vec![0, 2, 2, 5]);
        assert_eq!(spawn_offsets(&[]), vec![0]);
    }

    fn spawn_fixture(counts: &[u32], vel: DVec3) -> (FluidFrame, BucketGrid, DiffusePool) {
        let mut frame = FluidFrame::new();
        for i in 0..counts.len() {
            frame.push(DVec3::new(i as f64 * 3.0, 0.0, 0.0), vel, 1000.0);
        }
        let grid = BucketGrid::build(
            1.0,
            DVec3::splat(-10.0),
            DVec3::splat(10.0),
            &mut frame,
        );
        let total: u32 = counts.iter().sum();
        // Deterministic "uniforms" spread over (0, 1).
        let uniforms: Vec<f64> = (0..3 * total)
            .map(|k| (k as f64 + 0.5) / (3.0 * total as f64))
            .collect();
        let batch = spawn_diffuse(&frame, &grid, counts, &uniforms, 0.01, 0.5, 10, 100);
        (frame, grid, batch)
    }

    #[test]
    fn spawns_land_in_cylinder() {
        let vel = DVec3::new(2.0, 1.0, 0.5);
        let (frame, _grid, batch) = spawn_fixture(&[8], vel);
        assert_eq!(batch.len(), 8);

        let axis = vel.normalize();
        let source = frame.pos[0];
        for k in 0..batch.len() {
            let d = batch.pos[k] - source;
            let along = d.dot(axis);
            let radial = (d - along * axis).length();
            assert!(radial <= 0.5 + 1.0e-12, "outside spawn radius: {radial}");
            assert!(along >= 0.0 && along <= vel.length() * 0.01 * 0.5 + 1.0e-12);
            // Velocity is the source velocity plus the radial offset.
            let dv = batch.vel[k] - vel;
            assert!(dv.dot(axis).abs() < 1.0e-12);
        }
    }

    #[test]
    fn ids_follow_source_order() {
        let (_frame, _grid, batch) = spawn_fixture(&[2, 3], DVec3::new(0.0, 1.0, 0.0));
        assert_eq!(batch.len(), 5);
        assert_eq!(batch.id, vec![100, 101, 102, 103, 104]);
        assert_eq!(batch.ttl[0], 2 * 10);
        assert_eq!(batch.ttl[4], 3 * 10);
    }

    #[test]
    fn zero_counts_spawn_nothing() {
        let (_frame, _grid, batch) = spawn_fixture(&[0, 0], DVec3::X);
        assert!(batch.is_empty());
    }

    #[test]
    fn spawning_is_deterministic() {
        let run = || {
            let (_f, _g, batch) = spawn_fixture(&[4, 1], DVec3::new(1.0, -2.0, 0.3));
            batch
        };
        let a = run();
        let b = run();
        assert_eq!(a.pos, b.pos);
        assert_eq!(a.vel, b.vel);
        assert_eq!(a.id, b.id);
    }
}
