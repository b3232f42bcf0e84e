//! Snapshot emitters.
//!
//! Four output families per frame, all derived from immutable views of the
//! diffuse pool and the fluid frame, so the driver may run them as
//! concurrent sections: a plain-text dump, a minimal position+velocity VTK,
//! the full diffuse VTK (ids, classes, velocities, densities) and the
//! fluid-intermediate VTK carrying the per-fluid-particle potentials.

use std::fs;
use std::io::Write as _;

use kernel::{DiffuseClass, DiffusePool, FieldBuffers, FluidFrame};

use crate::vtk::{self, ArrayData, DataArray, FileFormat, PolyData};

/// Write the plain-text snapshot: one `x y z class` line per diffuse
/// particle, scientific float formatting, class encoded as 0/1/2.
pub fn write_text_snapshot(
    path: &str,
    pool: &DiffusePool,
    spray: f64,
    bubbles: f64,
) -> Result<(), String> {
    let mut out: Vec<u8> = Vec::with_capacity(pool.len() * 64);
    for i in 0..pool.len() {
        let p = pool.pos[i];
        let class = DiffuseClass::from_density(pool.density[i], spray, bubbles) as u8;
        let _ = writeln!(out, "{:e} {:e} {:e} {}", p.x, p.y, p.z, class);
    }
    fs::write(path, out).map_err(|e| format!("Failed to write {path}: {e}"))
}

/// Write the minimal VTK snapshot: positions and velocities only.
pub fn write_posvel_vtk(path: &str, pool: &DiffusePool) -> Result<(), String> {
    let poly = PolyData {
        points: pool.pos.clone(),
        scalars: None,
        fields: vec![DataArray {
            name: "Velocity".to_string(),
            data: ArrayData::Float {
                components: 3,
                values: flatten(&pool.vel),
            },
        }],
    };
    vtk::write_polydata(path, &poly, FileFormat::Binary)
}

/// Write the full diffuse VTK snapshot: `id` scalars plus `ParticleType`,
/// `Velocity` and `Density` arrays.
pub fn write_diffuse_vtk(
    path: &str,
    pool: &DiffusePool,
    spray: f64,
    bubbles: f64,
) -> Result<(), String> {
    let types: Vec<i64> = pool
        .density
        .iter()
        .map(|&d| DiffuseClass::from_density(d, spray, bubbles) as i64)
        .collect();

    let poly = PolyData {
        points: pool.pos.clone(),
        scalars: Some(DataArray {
            name: "id".to_string(),
            data: ArrayData::Int {
                components: 1,
                values: pool.id.iter().map(|&id| id as i64).collect(),
            },
        }),
        fields: vec![
            DataArray {
                name: "ParticleType".to_string(),
                data: ArrayData::Int {
                    components: 1,
                    values: types,
                },
            },
            DataArray {
                name: "Velocity".to_string(),
                data: ArrayData::Float {
                    components: 3,
                    values: flatten(&pool.vel),
                },
            },
            DataArray {
                name: "Density".to_string(),
                data: ArrayData::Float {
                    components: 1,
                    values: pool.density.clone(),
                },
            },
        ],
    };
    vtk::write_polydata(path, &poly, FileFormat::Binary)
}

/// Write the fluid-intermediate VTK snapshot: every fluid particle with its
/// `TrappedAir`, `WaveCrests`, `Energy` and `DiffuseParticles` values.
pub fn write_fluid_vtk(
    path: &str,
    frame: &FluidFrame,
    fields: &FieldBuffers,
) -> Result<(), String> {
    let poly = PolyData {
        points: frame.pos.clone(),
        scalars: None,
        fields: vec![
            DataArray {
                name: "TrappedAir".to_string(),
                data: ArrayData::Float {
                    components: 1,
                    values: fields.trapped_air.clone(),
                },
            },
            DataArray {
                name: "WaveCrests".to_string(),
                data: ArrayData::Float {
                    components: 1,
                    values: fields.wave_crest.clone(),
                },
            },
            DataArray {
                name: "Energy".to_string(),
                data: ArrayData::Float {
                    components: 1,
                    values: fields.energy.clone(),
                },
            },
            DataArray {
                name: "DiffuseParticles".to_string(),
                data: ArrayData::Float {
                    components: 1,
                    values: fields.spawn_count.iter().map(|&n| n as f64).collect(),
                },
            },
        ],
    };
    vtk::write_polydata(path, &poly, FileFormat::Binary)
}

/// Min / max / mean summary of a field, for the per-frame statistics block.
pub fn vector_stats(values: &[f64]) -> String {
    if values.is_empty() {
        return "min -  max -  mean -".to_string();
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    format!(
        "min {:.6e}  max {:.6e}  mean {:.6e}",
        min,
        max,
        sum / values.len() as f64
    )
}

fn flatten(vectors: &[glam::DVec3]) -> Vec<f64> {
    let mut out = Vec::with_capacity(3 * vectors.len());
    for v in vectors {
        out.extend_from_slice(&[v.x, v.y, v.z]);
    }
    out
}
