//! Deterministic point sets on the sphere
//!
//! Both point sets are generated in code with fixed iteration order so that
//! summation order, and therefore the numerical output, is reproducible
//! across platforms.

use admr_core::geom::cart;
use admr_core::Vec3;
use once_cell::sync::Lazy;

/// Points spread evenly over the sphere in rows of constant elevation.
///
/// With `n_rows = 37` the rows are spaced 5 degrees apart; the number of
/// points per row scales with the circumference of the row.
pub fn equal_area_grid(n_rows: usize) -> Vec<Vec3> {
    let mut positions = Vec::new();

    for row in 0..n_rows {
        let el = -90.0 + 180.0 * row as f64 / (n_rows - 1) as f64;

        let radius = el.to_radians().cos();
        let n_points = ((radius * 2.0 * (n_rows - 1) as f64).round() as usize).max(1);

        for i in 0..n_points {
            let az = 360.0 * i as f64 / n_points as f64;
            positions.push(cart(az, el, 1.0));
        }
    }

    positions
}

/// The spread grid used by the polar extent panner: 37 rows, 5 degree
/// spacing.
pub static SPREAD_GRID: Lazy<Vec<Vec3>> = Lazy::new(|| equal_area_grid(37));

/// A deterministic spherical Fibonacci point set.
///
/// Used as the virtual loudspeaker array for AllRAD decoder design in place
/// of a tabulated t-design; 5200 points integrate the spherical harmonics
/// involved well past the orders supported here.
pub fn fibonacci_sphere(n: usize) -> Vec<Vec3> {
    let golden_ratio = (1.0 + 5.0_f64.sqrt()) / 2.0;

    (0..n)
        .map(|i| {
            let theta = 2.0 * std::f64::consts::PI * i as f64 / golden_ratio;
            let phi = (1.0 - 2.0 * (i as f64 + 0.5) / n as f64).acos();

            Vec3::new(
                phi.sin() * theta.cos(),
                phi.sin() * theta.sin(),
                phi.cos(),
            )
        })
        .collect()
}

/// The AllRAD virtual array.
pub static ALLRAD_POINTS: Lazy<Vec<Vec3>> = Lazy::new(|| fibonacci_sphere(5200));
