//! SPH smoothing kernel functions.
//!
//! Three radial kernels drive the diffuse-particle model: a linear spike
//! used as a cheap pair weight for trapped air and surface curvature, the
//! Wendland quintic used for the color field and the smoothed fluid
//! velocity, and Poly6 for density-style summations.
//!
//! All kernels take the pair distance `r` and the smoothing length `h` and
//! return 0 outside their support.

use std::f64::consts::PI;

/// Normalization constant for the 3D Wendland quintic kernel: 21 / (16 * pi).
///
/// With q = r/h and support radius 2h, the analytically correct
/// normalization in 3D is alpha_d = 21 / (16 * pi).
const WENDLAND_NORM_3D: f64 = 21.0 / (16.0 * PI);

/// Linear spike kernel.
///
/// ```text
/// W(r, h) = 1 - r/h   for r <= h
/// W(r, h) = 0         otherwise
/// ```
///
/// Unnormalized: it weighs pair terms that are clamped into [0, 1]
/// afterwards, so the absolute scale is absorbed by the clamp windows.
pub fn spike(r: f64, h: f64) -> f64 {
    if r <= h {
        1.0 - r / h
    } else {
        0.0
    }
}

/// Wendland quintic smoothing kernel in 3D.
///
/// ```text
/// W(r, h) = (21 / (16 pi h^3)) * (1 - q/2)^4 * (2q + 1)   for q = r/h <= 2
/// W(r, h) = 0                                              for q > 2
/// ```
///
/// # Arguments
/// * `r` - Distance between two particles (must be >= 0).
/// * `h` - Smoothing length. The support radius is 2h.
pub fn wendland(r: f64, h: f64) -> f64 {
    let q = r / h;
    if q > 2.0 {
        return 0.0;
    }
    let h3 = h * h * h;
    let one_minus_half_q = 1.0 - 0.5 * q;
    // (1 - q/2)^4
    let t = one_minus_half_q * one_minus_half_q;
    let t4 = t * t;
    WENDLAND_NORM_3D / h3 * t4 * (2.0 * q + 1.0)
}

/// Poly6 smoothing kernel in 3D.
///
/// ```text
/// W(r, h) = (315 / (64 pi h^9)) * (h^2 - r^2)^3   for 0 <= r <= h
/// W(r, h) = 0                                      otherwise
/// ```
pub fn poly6(r: f64, h: f64) -> f64 {
    if r > h {
        return 0.0;
    }
    let h2 = h * h;
    let d = h2 - r * r;
    315.0 / (64.0 * PI * h2.powi(4) * h) * d * d * d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spike_at_zero_is_one() {
        assert_eq!(spike(0.0, 0.1), 1.0);
    }

    #[test]
    fn spike_vanishes_at_support() {
        assert_eq!(spike(0.1, 0.1), 0.0);
        assert_eq!(spike(0.2, 0.1), 0.0);
    }

    #[test]
    fn spike_linear_ramp() {
        let h = 0.4;
        assert!((spike(0.1, h) - 0.75).abs() < 1.0e-12);
        assert!((spike(0.2, h) - 0.5).abs() < 1.0e-12);
    }

    #[test]
    fn wendland_at_zero_distance() {
        let h = 0.1;
        // At r=0: q=0, (1-0)^4*(1+0) = 1, so W = norm / h^3
        let expected = WENDLAND_NORM_3D / (h * h * h);
        assert!((wendland(0.0, h) - expected).abs() < 1.0e-9);
    }

    #[test]
    fn wendland_at_support_radius() {
        let h = 0.1;
        // At q = 2 (r = 2h) the kernel should be zero
        assert!(wendland(2.0 * h, h).abs() < 1.0e-12);
    }

    #[test]
    fn wendland_beyond_support() {
        assert_eq!(wendland(0.5, 0.1), 0.0); // q = 5 > 2
    }

    #[test]
    fn wendland_positive_inside_support() {
        let h = 0.1;
        for i in 1..20 {
            let r = (i as f64) * 0.01; // q = 0.1 .. 1.9
            assert!(wendland(r, h) > 0.0, "kernel should be positive at r={r}");
        }
    }

    #[test]
    fn wendland_normalization_numerical() {
        // Riemann sum over the support cube should integrate to ~1.
        let h = 0.1_f64;
        let n = 100;
        let half_extent = 2.0 * h;
        let cell = 2.0 * half_extent / (n as f64);
        let dv = cell * cell * cell;
        let mut integral = 0.0_f64;
        for ix in 0..n {
            let x = -half_extent + (ix as f64 + 0.5) * cell;
            for iy in 0..n {
                let y = -half_extent + (iy as f64 + 0.5) * cell;
                for iz in 0..n {
                    let z = -half_extent + (iz as f64 + 0.5) * cell;
                    let r = (x * x + y * y + z * z).sqrt();
                    integral += wendland(r, h) * dv;
                }
            }
        }
        assert!(
            (integral - 1.0).abs() < 0.02,
            "kernel integral = {integral}, expected ~1.0"
        );
    }

    #[test]
    fn poly6_at_support_is_zero() {
        assert!(poly6(0.1, 0.1).abs() < 1.0e-12);
        assert_eq!(poly6(0.2, 0.1), 0.0);
    }

    #[test]
    fn poly6_matches_closed_form() {
        let h = 0.2_f64;
        let r = 0.1_f64;
        let expected = 315.0 / (64.0 * PI * h.powi(9)) * (h * h - r * r).powi(3);
        assert!((poly6(r, h) - expected).abs() < 1.0e-9 * expected);
    }
}
