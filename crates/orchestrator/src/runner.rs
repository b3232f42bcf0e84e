//! Per-frame driver loop.
//!
//! Walks the snapshot sequence `[frame_start, frame_end]`, running the full
//! pipeline for each frame: load and index the fluid snapshot, the three
//! field passes, clamping, spawning, classification of newborns, advection
//! of the persistent pool, the lifecycle step, and the output emitters.
//! Frames are bulk-synchronous; the only state carried across them is the
//! diffuse pool, the id counter and the RNG.

use std::path::Path;

use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use kernel::diffuse::{advect, decrement_and_cull, recount_density};
use kernel::fields::{
    clamp_fields, compute_color_gradient, compute_potentials, compute_wave_crests, count_spawns,
};
use kernel::spawn::spawn_diffuse;
use kernel::{AdvectParams, BucketGrid, DiffusePool, FieldBuffers};

use crate::config::FoamConfig;
use crate::emit;
use crate::vtk;

/// Counters reported after a run completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    /// Frames actually processed (may stop early at end-of-input).
    pub frames: u32,
    /// Diffuse particles spawned over the whole run.
    pub total_spawned: u64,
    /// Pool size after the last frame.
    pub final_population: usize,
}

/// Run the diffuse-particle simulation described by `config`.
///
/// A missing or unreadable fluid snapshot ends the frame loop cleanly
/// (treated as end-of-input); output written so far is kept. Emitter
/// failures are reported per file and do not abort the run.
pub fn run(config: &FoamConfig) -> Result<RunSummary, String> {
    config.validate()?;

    std::fs::create_dir_all(&config.output_path)
        .map_err(|e| format!("Failed to create output path {}: {e}", config.output_path))?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let domain_min = DVec3::from_array(config.domain.min);
    let domain_max = DVec3::from_array(config.domain.max);

    let mut pool = DiffusePool::new();
    let mut next_id: u64 = 0;
    let mut summary = RunSummary::default();

    for nstep in config.frame_start..=config.frame_end {
        let dt = config.timestep_for(nstep);
        let seq = config.sequence_tag(nstep);
        let input = Path::new(&config.data_path)
            .join(format!("{}{}.vtk", config.file_prefix, seq))
            .to_string_lossy()
            .into_owned();

        tracing::info!(
            "== frame {nstep} of {} ==  reading {input}",
            config.frame_end
        );

        let mut frame = match vtk::load_fluid_frame(&input) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::info!("Stopping frame loop: {e}");
                break;
            }
        };

        let grid = BucketGrid::build(config.h, domain_min, domain_max, &mut frame);
        let mut fields = FieldBuffers::new(frame.len());
        tracing::info!("{} fluid particles, dt = {dt}", frame.len());

        tracing::debug!("pass 1: trapped air, color field, energy");
        compute_potentials(&frame, &grid, config.h, config.mass, &mut fields);
        tracing::debug!("pass 2: color-field gradient");
        compute_color_gradient(&frame, &grid, config.h, &mut fields);
        tracing::debug!("pass 3: wave crests");
        compute_wave_crests(&frame, &grid, config.h, &mut fields);

        // Raw potentials, before clamping flattens them.
        let stats = format!(
            "Wave crests: {}\nTrapped air: {}\nEnergy:      {}\n",
            emit::vector_stats(&fields.wave_crest),
            emit::vector_stats(&fields.trapped_air),
            emit::vector_stats(&fields.energy),
        );

        clamp_fields(
            &mut fields,
            config.trapped_air.as_pair(),
            config.wave_crest.as_pair(),
            config.kinetic.as_pair(),
        );
        let newborn_count = count_spawns(&frame, &mut fields, config.k_ta, config.k_wc, dt);
        tracing::debug!("spawning {newborn_count} diffuse particles");

        // One serial draw per frame; the parallel spawn loop only reads.
        let uniforms: Vec<f64> = (0..3 * newborn_count as usize)
            .map(|_| rng.gen::<f64>())
            .collect();
        let mut batch = spawn_diffuse(
            &frame,
            &grid,
            &fields.spawn_count,
            &uniforms,
            dt,
            config.h,
            config.lifetime,
            next_id,
        );
        next_id += newborn_count;

        {
            let DiffusePool { pos, density, .. } = &mut batch;
            recount_density(pos, density, &frame, &grid, config.h);
        }

        advect(
            &mut pool,
            &frame,
            &grid,
            &AdvectParams {
                h: config.h,
                dt,
                spray: config.spray,
                bubbles: config.bubbles,
                buoyancy: config.buoyancy,
                drag: config.drag,
            },
        );
        let removed = decrement_and_cull(
            &mut pool,
            domain_min,
            domain_max,
            config.spray,
            config.bubbles,
        );
        pool.append(&mut batch);

        tracing::info!(
            "spawned {newborn_count}, removed {removed}, pool size {}",
            pool.len()
        );

        let out_base = Path::new(&config.output_path)
            .join(format!("{}{}", config.output_prefix, seq))
            .to_string_lossy()
            .into_owned();
        emit_outputs(config, &out_base, &pool, &frame, &fields);

        tracing::info!("statistics:\n{stats}");

        summary.frames += 1;
        summary.total_spawned += newborn_count;
        summary.final_population = pool.len();
    }

    Ok(summary)
}

/// Run the enabled emitters as concurrent sections; each reads immutable
/// snapshots and reports its own failure without stopping the others.
fn emit_outputs(
    config: &FoamConfig,
    out_base: &str,
    pool: &DiffusePool,
    frame: &kernel::FluidFrame,
    fields: &FieldBuffers,
) {
    rayon::scope(|s| {
        if config.outputs.text {
            s.spawn(|_| {
                let path = format!("{out_base}.txt");
                if let Err(e) =
                    emit::write_text_snapshot(&path, pool, config.spray, config.bubbles)
                {
                    tracing::error!("text snapshot failed: {e}");
                }
            });
        }
        if config.outputs.vtk_positions {
            s.spawn(|_| {
                let path = format!("{out_base}.vtk");
                if let Err(e) = emit::write_posvel_vtk(&path, pool) {
                    tracing::error!("position snapshot failed: {e}");
                }
            });
        }
        if config.outputs.vtk_diffuse {
            s.spawn(|_| {
                let path = format!("{out_base}_diffuse.vtk");
                if let Err(e) =
                    emit::write_diffuse_vtk(&path, pool, config.spray, config.bubbles)
                {
                    tracing::error!("diffuse snapshot failed: {e}");
                }
            });
        }
        if config.outputs.vtk_fluid {
            s.spawn(|_| {
                let path = format!("{out_base}_fluid.vtk");
                if let Err(e) = emit::write_fluid_vtk(&path, frame, fields) {
                    tracing::error!("fluid snapshot failed: {e}");
                }
            });
        }
    });
}
