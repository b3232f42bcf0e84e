//! Analytical reference solutions for diffuse-particle validation.
//!
//! Provides closed-form trajectories against which the advector can be
//! compared for quantitative accuracy assessment.

/// Continuous projectile height under constant gravity:
///
/// ```text
/// z(t) = z0 + v_z t - g t^2 / 2
/// ```
pub fn projectile_height(z0: f64, vz: f64, g: f64, t: f64) -> f64 {
    z0 + vz * t - 0.5 * g * t * t
}

/// Exact height of the spray integrator after `n` fixed steps of size `dt`.
///
/// The spray law is semi-implicit Euler (velocity kick first, then the
/// position drift with the new velocity), so after `n` steps
///
/// ```text
/// v_z(n) = v_z - n g dt
/// z(n)   = z0 + n dt v_z - g dt^2 n (n + 1) / 2
/// ```
///
/// As `dt -> 0` with `t = n dt` fixed this converges to
/// [`projectile_height`]; at finite `dt` it is the quantity the simulation
/// reproduces to rounding error.
pub fn ballistic_height(z0: f64, vz: f64, g: f64, dt: f64, n: u32) -> f64 {
    let n = n as f64;
    z0 + n * dt * vz - 0.5 * g * dt * dt * n * (n + 1.0)
}

/// Horizontal coordinate of the spray integrator after `n` steps: gravity
/// only acts on z, so the motion is uniform.
pub fn ballistic_lateral(x0: f64, vx: f64, dt: f64, n: u32) -> f64 {
    x0 + n as f64 * dt * vx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projectile_apex_time() {
        // Apex at t = v_z / g; height v_z^2 / (2g).
        let (vz, g) = (3.0, 9.81);
        let apex = projectile_height(0.0, vz, g, vz / g);
        assert!((apex - vz * vz / (2.0 * g)).abs() < 1.0e-12);
    }

    #[test]
    fn ballistic_matches_step_by_step_integration() {
        let (z0, vz, g, dt) = (1.0, 2.0, 9.81, 0.01);
        let mut v = vz;
        let mut z = z0;
        for n in 1..=50u32 {
            v -= g * dt;
            z += dt * v;
            assert!(
                (z - ballistic_height(z0, vz, g, dt, n)).abs() < 1.0e-12,
                "mismatch at step {n}"
            );
        }
    }

    #[test]
    fn ballistic_converges_to_projectile() {
        let (z0, vz, g, t) = (0.0, 2.0, 9.81, 0.5);
        let coarse = ballistic_height(z0, vz, g, t / 10.0, 10);
        let fine = ballistic_height(z0, vz, g, t / 10000.0, 10000);
        let exact = projectile_height(z0, vz, g, t);
        assert!((fine - exact).abs() < (coarse - exact).abs());
        assert!((fine - exact).abs() < 1.0e-3);
    }

    #[test]
    fn lateral_is_uniform_motion() {
        assert!((ballistic_lateral(1.0, 3.0, 0.1, 10) - 4.0).abs() < 1.0e-12);
    }
}
