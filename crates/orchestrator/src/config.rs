//! Configuration parsing and validation for diffuse-particle runs.

use serde::{Deserialize, Serialize};
use std::fs;

/// Main run configuration.
///
/// Immutable for the duration of a run; loaded from a JSON file and
/// validated before the first frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoamConfig {
    /// Human-readable run name.
    pub name: String,
    /// Directory holding the fluid snapshot sequence.
    pub data_path: String,
    /// File name prefix of the fluid snapshots.
    pub file_prefix: String,
    /// Directory receiving the diffuse snapshot outputs.
    pub output_path: String,
    /// File name prefix of the outputs.
    pub output_prefix: String,
    /// First frame index (inclusive).
    pub frame_start: i32,
    /// Last frame index (inclusive).
    pub frame_end: i32,
    /// Zero-pad width of the sequence number in file names.
    #[serde(default = "default_digits")]
    pub digits: usize,
    /// Simulation domain box.
    pub domain: DomainBounds,
    /// SPH kernel radius (also the bucket cell size).
    pub h: f64,
    /// Fluid particle mass.
    pub mass: f64,
    /// Clamp window for the trapped-air potential.
    pub trapped_air: ClampWindow,
    /// Clamp window for the wave-crest potential.
    pub wave_crest: ClampWindow,
    /// Clamp window for the kinetic energy.
    pub kinetic: ClampWindow,
    /// Trapped-air birth-rate coefficient.
    pub k_ta: f64,
    /// Wave-crest birth-rate coefficient.
    pub k_wc: f64,
    /// Neighbor-count density below which a diffuse particle is spray.
    pub spray: f64,
    /// Neighbor-count density above which a diffuse particle is a bubble.
    pub bubbles: f64,
    /// Foam lifetime scale (frames per spawned sibling).
    pub lifetime: i32,
    /// Bubble buoyancy coefficient.
    pub buoyancy: f64,
    /// Bubble drag coefficient.
    pub drag: f64,
    /// Which snapshot families to write each frame.
    #[serde(default)]
    pub outputs: OutputToggles,
    /// Time-step schedule: entry `k` applies to frames past its `nstep`.
    pub timesteps: Vec<TimestepEntry>,
    /// RNG seed for reproducible spawning; fresh entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Domain bounding box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainBounds {
    /// Minimum corner [x, y, z].
    pub min: [f64; 3],
    /// Maximum corner [x, y, z].
    pub max: [f64; 3],
}

/// A `(tmin, tmax)` clamping window; must satisfy `min < max`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClampWindow {
    /// Lower edge: inputs at or below map to 0.
    pub min: f64,
    /// Upper edge: inputs at or above map to 1.
    pub max: f64,
}

impl ClampWindow {
    /// The window as a `(min, max)` pair for the kernel clamp pass.
    pub fn as_pair(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

/// One schedule entry: from frame `nstep` onward the step size is `tout`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimestepEntry {
    /// Frame index from which this entry applies.
    pub nstep: i32,
    /// Step size in seconds.
    pub tout: f64,
}

/// Per-frame output file toggles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OutputToggles {
    /// Plain-text `x y z class` snapshot.
    pub text: bool,
    /// Position+velocity VTK snapshot.
    pub vtk_positions: bool,
    /// Full diffuse VTK snapshot (ids, classes, velocities, densities).
    pub vtk_diffuse: bool,
    /// Fluid-intermediate VTK snapshot (potentials per fluid particle).
    pub vtk_fluid: bool,
}

impl Default for OutputToggles {
    fn default() -> Self {
        Self {
            text: true,
            vtk_positions: false,
            vtk_diffuse: true,
            vtk_fluid: false,
        }
    }
}

fn default_digits() -> usize {
    4
}

impl FoamConfig {
    /// Load a configuration from a JSON file.
    pub fn load(path: &str) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;

        let config: FoamConfig = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse config JSON: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        for (axis, idx) in [("x", 0), ("y", 1), ("z", 2)] {
            if self.domain.min[idx] >= self.domain.max[idx] {
                return Err(format!("Domain min.{axis} must be less than max.{axis}"));
            }
        }

        if self.h <= 0.0 {
            return Err("Kernel radius h must be positive".to_string());
        }
        if self.mass <= 0.0 {
            return Err("Particle mass must be positive".to_string());
        }

        for (name, window) in [
            ("trapped_air", &self.trapped_air),
            ("wave_crest", &self.wave_crest),
            ("kinetic", &self.kinetic),
        ] {
            if window.max <= window.min {
                return Err(format!(
                    "Clamp window {name} must have min < max (got {} >= {})",
                    window.min, window.max
                ));
            }
        }

        if self.spray >= self.bubbles {
            return Err("Spray threshold must be below the bubble threshold".to_string());
        }
        if self.lifetime < 0 {
            return Err("Lifetime must be non-negative".to_string());
        }
        if self.frame_start > self.frame_end {
            return Err("frame_start must not exceed frame_end".to_string());
        }
        if self.digits == 0 {
            return Err("Sequence zero-pad width must be at least 1".to_string());
        }

        if self.timesteps.is_empty() {
            return Err("Timestep schedule must have at least one entry".to_string());
        }
        for pair in self.timesteps.windows(2) {
            if pair[1].nstep <= pair[0].nstep {
                return Err("Timestep schedule must be strictly increasing in nstep".to_string());
            }
        }
        for entry in &self.timesteps {
            if entry.tout <= 0.0 {
                return Err("Timestep tout values must be positive".to_string());
            }
        }

        Ok(())
    }

    /// Select the step size for frame `nstep`: the last schedule entry whose
    /// activation frame has been passed.
    pub fn timestep_for(&self, nstep: i32) -> f64 {
        let mut idx = 0;
        while idx + 1 < self.timesteps.len() && nstep > self.timesteps[idx + 1].nstep {
            idx += 1;
        }
        self.timesteps[idx].tout
    }

    /// Zero-padded sequence tag for frame `nstep`.
    pub fn sequence_tag(&self, nstep: i32) -> String {
        format!("{:0width$}", nstep, width = self.digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> FoamConfig {
        FoamConfig {
            name: "test".to_string(),
            data_path: "data".to_string(),
            file_prefix: "PartFluid_".to_string(),
            output_path: "out".to_string(),
            output_prefix: "foam_".to_string(),
            frame_start: 0,
            frame_end: 10,
            digits: 4,
            domain: DomainBounds {
                min: [0.0, 0.0, 0.0],
                max: [1.0, 1.0, 1.0],
            },
            h: 0.02,
            mass: 0.008,
            trapped_air: ClampWindow { min: 5.0, max: 20.0 },
            wave_crest: ClampWindow { min: 2.0, max: 8.0 },
            kinetic: ClampWindow { min: 0.1, max: 5.0 },
            k_ta: 4000.0,
            k_wc: 50000.0,
            spray: 6.0,
            bubbles: 20.0,
            lifetime: 4,
            buoyancy: 2.0,
            drag: 0.8,
            outputs: OutputToggles::default(),
            timesteps: vec![TimestepEntry { nstep: 0, tout: 0.01 }],
            seed: Some(7),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn inverted_domain_rejected() {
        let mut config = base_config();
        config.domain.min[1] = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn degenerate_clamp_window_rejected() {
        let mut config = base_config();
        config.wave_crest = ClampWindow { min: 3.0, max: 3.0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut config = base_config();
        config.spray = 25.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unsorted_schedule_rejected() {
        let mut config = base_config();
        config.timesteps = vec![
            TimestepEntry { nstep: 5, tout: 0.01 },
            TimestepEntry { nstep: 2, tout: 0.02 },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn schedule_lookup_advances_past_activation() {
        let mut config = base_config();
        config.timesteps = vec![
            TimestepEntry { nstep: 0, tout: 0.01 },
            TimestepEntry { nstep: 5, tout: 0.02 },
            TimestepEntry { nstep: 8, tout: 0.04 },
        ];
        assert_eq!(config.timestep_for(0), 0.01);
        assert_eq!(config.timestep_for(5), 0.01);
        assert_eq!(config.timestep_for(6), 0.02);
        assert_eq!(config.timestep_for(9), 0.04);
        assert_eq!(config.timestep_for(100), 0.04);
    }

    #[test]
    fn sequence_tag_pads() {
        let config = base_config();
        assert_eq!(config.sequence_tag(7), "0007");
        assert_eq!(config.sequence_tag(12345), "12345");
    }

    #[test]
    fn json_round_trip() {
        let config = base_config();
        let text = serde_json::to_string(&config).unwrap();
        let back: FoamConfig = serde_json::from_str(&text).unwrap();
        assert!(back.validate().is_ok());
        assert_eq!(back.name, config.name);
        assert_eq!(back.timesteps.len(), 1);
    }
}
