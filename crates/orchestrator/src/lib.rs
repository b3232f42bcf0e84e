//! Orchestration layer for the diffuse-particle engine.
//!
//! This crate wraps the compute kernel with everything a run needs:
//! - JSON configuration loading and validation ([`config`]),
//! - the legacy VTK snapshot codec and fluid-frame loader ([`vtk`]),
//! - the per-frame output emitters ([`emit`]),
//! - the frame-sequence driver loop ([`runner`]).

#![warn(missing_docs)]

pub mod config;
pub mod emit;
pub mod runner;
pub mod vtk;

pub use config::FoamConfig;
pub use runner::{run, RunSummary};

/// Load a configuration file and run the simulation it describes.
///
/// # Example
/// ```no_run
/// let summary = orchestrator::run_from_config("configs/dam_break_foam.json")?;
/// println!("{} frames, {} diffuse particles spawned", summary.frames, summary.total_spawned);
/// # Ok::<(), String>(())
/// ```
pub fn run_from_config(config_path: &str) -> Result<RunSummary, String> {
    tracing::info!("Loading configuration: {config_path}");
    let config = FoamConfig::load(config_path)?;
    tracing::info!("Configuration loaded: {}", config.name);
    run(&config)
}
