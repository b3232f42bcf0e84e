//! Uniform-grid bucket index for neighbor search.
//!
//! Cell size equals the kernel support radius `h`, so for any point the 27
//! (3x3x3) adjacent cells contain every fluid particle within distance `h`.
//! Building the grid bucket-sorts the fluid frame: afterwards each cell owns
//! a contiguous range of the frame arrays, which lets the field passes hand
//! disjoint mutable slices of the scratch buffers to worker threads.

use std::ops::Range;

use glam::DVec3;

use crate::particle::FluidFrame;

/// Uniform-grid bucket index over a fixed axis-aligned domain.
pub struct BucketGrid {
    cell_size: f64,
    grid_min: DVec3,
    grid_dims: [u32; 3],
    /// Start offset into the (sorted) frame arrays for each cell.
    cell_offsets: Vec<u32>,
    /// Number of particles in each cell.
    cell_counts: Vec<u32>,
    /// Cells with at least one particle, ascending.
    occupied: Vec<u32>,
}

impl BucketGrid {
    /// Build the index for one frame and bucket-sort the frame in place.
    ///
    /// `cell_size` should be the kernel radius `h`. Positions outside
    /// `[domain_min, domain_max]` are clamped into the boundary cells; the
    /// distance test in the summation passes keeps them from contributing
    /// spurious neighbors.
    pub fn build(
        cell_size: f64,
        domain_min: DVec3,
        domain_max: DVec3,
        frame: &mut FluidFrame,
    ) -> Self {
        assert!(cell_size > 0.0, "cell_size must be positive");
        let dims = [
            ((domain_max.x - domain_min.x) / cell_size).ceil().max(1.0) as u32,
            ((domain_max.y - domain_min.y) / cell_size).ceil().max(1.0) as u32,
            ((domain_max.z - domain_min.z) / cell_size).ceil().max(1.0) as u32,
        ];
        let total_cells = (dims[0] as usize) * (dims[1] as usize) * (dims[2] as usize);

        let mut grid = Self {
            cell_size,
            grid_min: domain_min,
            grid_dims: dims,
            cell_offsets: vec![0; total_cells],
            cell_counts: vec![0; total_cells],
            occupied: Vec::new(),
        };

        let n = frame.len();

        // 1. Cell index per particle.
        let cell_indices: Vec<u32> = frame
            .pos
            .iter()
            .map(|&p| {
                let (cx, cy, cz) = grid.pos_to_cell(p);
                grid.cell_hash(cx, cy, cz)
            })
            .collect();

        // 2. Count particles per cell.
        for &ci in &cell_indices {
            grid.cell_counts[ci as usize] += 1;
        }

        // 3. Prefix-sum to get cell offsets.
        let mut running = 0u32;
        for c in 0..total_cells {
            grid.cell_offsets[c] = running;
            running += grid.cell_counts[c];
            if grid.cell_counts[c] > 0 {
                grid.occupied.push(c as u32);
            }
        }

        // 4. Scatter particle indices into sorted order and reorder the frame.
        let mut sorted_order = vec![0u32; n];
        let mut write_heads = grid.cell_offsets.clone();
        for i in 0..n {
            let ci = cell_indices[i] as usize;
            sorted_order[write_heads[ci] as usize] = i as u32;
            write_heads[ci] += 1;
        }
        frame.permute(&sorted_order);

        grid
    }

    /// Cells that hold at least one particle, in ascending cell order.
    pub fn occupied_cells(&self) -> &[u32] {
        &self.occupied
    }

    /// The contiguous frame range owned by `cell`.
    pub fn cell_range(&self, cell: u32) -> Range<usize> {
        let start = self.cell_offsets[cell as usize] as usize;
        start..start + self.cell_counts[cell as usize] as usize
    }

    /// Frame ranges of the up-to-27 cells surrounding (and including)
    /// `cell`. Empty cells are omitted.
    pub fn surrounding(&self, cell: u32) -> Vec<Range<usize>> {
        let (cx, cy, cz) = self.cell_coords(cell);
        self.collect_neighborhood(cx as i64, cy as i64, cz as i64)
    }

    /// Frame ranges of the up-to-27 cells around an arbitrary point. The
    /// point is clamped into the grid first, so callers can query positions
    /// slightly outside the domain (e.g. a diffuse particle mid-flight).
    pub fn surrounding_point(&self, p: DVec3) -> Vec<Range<usize>> {
        let (cx, cy, cz) = self.pos_to_cell(p);
        self.collect_neighborhood(cx as i64, cy as i64, cz as i64)
    }

    fn collect_neighborhood(&self, cx: i64, cy: i64, cz: i64) -> Vec<Range<usize>> {
        let mut ranges = Vec::with_capacity(27);
        for dz in -1i64..=1 {
            let nz = cz + dz;
            if nz < 0 || nz >= self.grid_dims[2] as i64 {
                continue;
            }
            for dy in -1i64..=1 {
                let ny = cy + dy;
                if ny < 0 || ny >= self.grid_dims[1] as i64 {
                    continue;
                }
                for dx in -1i64..=1 {
                    let nx = cx + dx;
                    if nx < 0 || nx >= self.grid_dims[0] as i64 {
                        continue;
                    }
                    let cell = self.cell_hash(nx as u32, ny as u32, nz as u32);
                    let range = self.cell_range(cell);
                    if !range.is_empty() {
                        ranges.push(range);
                    }
                }
            }
        }
        ranges
    }

    /// Map a world-space position to a cell (cx, cy, cz), clamped to bounds.
    #[inline]
    fn pos_to_cell(&self, p: DVec3) -> (u32, u32, u32) {
        let cx = ((p.x - self.grid_min.x) / self.cell_size)
            .floor()
            .max(0.0)
            .min((self.grid_dims[0] - 1) as f64) as u32;
        let cy = ((p.y - self.grid_min.y) / self.cell_size)
            .floor()
            .max(0.0)
            .min((self.grid_dims[1] - 1) as f64) as u32;
        let cz = ((p.z - self.grid_min.z) / self.cell_size)
            .floor()
            .max(0.0)
            .min((self.grid_dims[2] - 1) as f64) as u32;
        (cx, cy, cz)
    }

    /// Flat cell index from (cx, cy, cz).
    #[inline]
    fn cell_hash(&self, cx: u32, cy: u32, cz: u32) -> u32 {
        cx + cy * self.grid_dims[0] + cz * self.grid_dims[0] * self.grid_dims[1]
    }

    #[inline]
    fn cell_coords(&self, cell: u32) -> (u32, u32, u32) {
        let plane = self.grid_dims[0] * self.grid_dims[1];
        let cz = cell / plane;
        let rem = cell % plane;
        (rem % self.grid_dims[0], rem / self.grid_dims[0], cz)
    }
}

/// Partition `data` into one mutable slice per occupied cell, in occupied
/// order.
///
/// Relies on the bucket sort done by [`BucketGrid::build`]: the occupied
/// cells' ranges tile `data` exactly, so the partition is a chain of
/// `split_at_mut` calls and the returned slices are provably disjoint.
pub fn split_by_cells<'a, T>(data: &'a mut [T], grid: &BucketGrid) -> Vec<&'a mut [T]> {
    let mut slices = Vec::with_capacity(grid.occupied_cells().len());
    let mut rest = data;
    let mut cursor = 0usize;
    for &cell in grid.occupied_cells() {
        let range = grid.cell_range(cell);
        debug_assert_eq!(range.start, cursor);
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
        slices.push(head);
        rest = tail;
        cursor = range.end;
    }
    debug_assert!(rest.is_empty());
    slices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(points: &[[f64; 3]]) -> FluidFrame {
        let mut frame = FluidFrame::new();
        for p in points {
            frame.push(DVec3::from_array(*p), DVec3::ZERO, 1000.0);
        }
        frame
    }

    #[test]
    fn single_particle_one_occupied_cell() {
        let mut frame = frame_of(&[[0.5, 0.5, 0.5]]);
        let grid = BucketGrid::build(0.2, DVec3::ZERO, DVec3::ONE, &mut frame);
        assert_eq!(grid.occupied_cells().len(), 1);
        let cell = grid.occupied_cells()[0];
        assert_eq!(grid.cell_range(cell), 0..1);
    }

    #[test]
    fn surrounding_includes_adjacent_cell() {
        // Two particles in adjacent cells but within one cell size.
        let mut frame = frame_of(&[[0.19, 0.5, 0.5], [0.21, 0.5, 0.5]]);
        let grid = BucketGrid::build(0.2, DVec3::ZERO, DVec3::ONE, &mut frame);
        assert_eq!(grid.occupied_cells().len(), 2);

        let first_cell = grid.occupied_cells()[0];
        let hood = grid.surrounding(first_cell);
        let total: usize = hood.iter().map(|r| r.len()).sum();
        assert_eq!(total, 2, "neighborhood should see both particles");
    }

    #[test]
    fn far_particles_not_in_neighborhood() {
        let mut frame = frame_of(&[[0.1, 0.1, 0.1], [0.9, 0.9, 0.9]]);
        let grid = BucketGrid::build(0.2, DVec3::ZERO, DVec3::ONE, &mut frame);

        let hood = grid.surrounding_point(DVec3::splat(0.1));
        let total: usize = hood.iter().map(|r| r.len()).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn build_sorts_frame_by_cell() {
        let mut frame = frame_of(&[[0.9, 0.1, 0.1], [0.1, 0.1, 0.1], [0.5, 0.1, 0.1]]);
        let grid = BucketGrid::build(0.2, DVec3::ZERO, DVec3::ONE, &mut frame);
        // Ascending cell order implies ascending x here.
        assert!(frame.pos[0].x < frame.pos[1].x);
        assert!(frame.pos[1].x < frame.pos[2].x);

        // Ranges of occupied cells tile the frame exactly.
        let mut cursor = 0;
        for &cell in grid.occupied_cells() {
            let range = grid.cell_range(cell);
            assert_eq!(range.start, cursor);
            cursor = range.end;
        }
        assert_eq!(cursor, frame.len());
    }

    #[test]
    fn out_of_domain_point_clamps() {
        let mut frame = frame_of(&[[0.05, 0.05, 0.05]]);
        let grid = BucketGrid::build(0.2, DVec3::ZERO, DVec3::ONE, &mut frame);
        // Query far outside: clamped to the boundary cell, which is adjacent
        // to nothing occupied except possibly the corner cell.
        let hood = grid.surrounding_point(DVec3::new(-5.0, -5.0, -5.0));
        let total: usize = hood.iter().map(|r| r.len()).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn split_by_cells_is_disjoint_and_complete() {
        let mut frame = frame_of(&[
            [0.1, 0.1, 0.1],
            [0.5, 0.5, 0.5],
            [0.52, 0.5, 0.5],
            [0.9, 0.9, 0.9],
        ]);
        let grid = BucketGrid::build(0.2, DVec3::ZERO, DVec3::ONE, &mut frame);
        let mut scratch = vec![0.0f64; frame.len()];
        let slices = split_by_cells(&mut scratch, &grid);
        assert_eq!(slices.len(), grid.occupied_cells().len());
        let total: usize = slices.iter().map(|s| s.len()).sum();
        assert_eq!(total, frame.len());
    }
}
