//! Polar extent panning
//!
//! Spread sources are produced by weighting a fixed grid of virtual source
//! directions against the panning results for those directions. The weight
//! is one inside a width x height rounded rectangle in azimuth-elevation
//! space around the source, fading to zero over a fixed angular width.

use admr_core::geom::{azimuth, elevation, interp, local_coordinate_system};
use admr_core::Vec3;

use crate::error::RenderResult;
use crate::point_source::PointSourcePanner;
use crate::sphere::SPREAD_GRID;

/// Angle over which the weighting function fades from one to zero, degrees.
pub const FADE_WIDTH: f64 = 10.0;

/// Basis vectors that rotate (0, 1, 0) onto the source position.
///
/// Positions near the poles have indeterminate azimuth; zero is assumed.
fn calc_basis(source_pos: Vec3) -> [Vec3; 3] {
    let pos = source_pos.safe_norm();
    let el = elevation(pos);
    let az = if el.abs() > 90.0 - 1e-5 { 0.0 } else { azimuth(pos) };

    local_coordinate_system(az, el)
}

/// Polar to Cartesian in radians on a given basis.
fn cart_on_basis(basis: &[Vec3; 3], az: f64, el: f64) -> Vec3 {
    let rel = Vec3::new(az.sin() * el.cos(), az.cos() * el.cos(), el.sin());
    basis[0] * rel.x + basis[1] * rel.y + basis[2] * rel.z
}

/// Cartesian to polar in radians on a given basis, for unit vectors.
fn azimuth_elevation_on_basis(basis: &[Vec3; 3], position: Vec3) -> (f64, f64) {
    let x = position.dot(basis[0]).clamp(-1.0, 1.0);
    let y = position.dot(basis[1]).clamp(-1.0, 1.0);
    let z = position.dot(basis[2]).clamp(-1.0, 1.0);

    (x.atan2(y), z.asin())
}

/// The weighting function for one spread source.
pub struct WeightFunc {
    /// basis with width and height axes swapped if the source is taller than
    /// it is wide
    flipped_basis: [Vec3; 3],
    circle_radius: f64,
    /// angular distance of the rounded-corner centres from the source
    circle_pos: f64,
    circle_positions: [Vec3; 2],
}

impl WeightFunc {
    /// Build the weighting function for a source position and extent.
    ///
    /// Widths and heights are in degrees from one edge to the other. The
    /// straight edges follow azimuth lines of the (possibly flipped) basis;
    /// a width of 180 degrees is stretched so the two ends meet at the back.
    pub fn new(position: Vec3, width: f64, height: f64) -> Self {
        let mut width = width.to_radians() / 2.0;
        let mut height = height.to_radians() / 2.0;

        let basis = calc_basis(position);

        let circle_radius = width.min(height);

        // always wider than tall from here on
        let flipped_basis = if height > width {
            std::mem::swap(&mut width, &mut height);
            [basis[2], basis[1], basis[0]]
        } else {
            basis
        };

        use std::f64::consts::PI;
        let width_full = PI + height;
        let width_mod = interp(width, &[0.0, PI / 2.0, PI], &[0.0, PI / 2.0, width_full]);
        let width = interp(
            height,
            &[0.0, PI / 4.0, PI / 2.0, PI],
            &[width_mod, width_mod, width, width],
        );

        let circle_pos = width - circle_radius;

        Self {
            flipped_basis,
            circle_radius,
            circle_pos,
            circle_positions: [
                cart_on_basis(&flipped_basis, -circle_pos, 0.0),
                cart_on_basis(&flipped_basis, circle_pos, 0.0),
            ],
        }
    }

    /// Weight in [0, 1] for one virtual source direction.
    pub fn weight(&self, position: Vec3) -> f64 {
        let (az, el) = azimuth_elevation_on_basis(&self.flipped_basis, position);

        // distance is the angle from the shape boundary; zero or negative is
        // inside
        let distance = if az.abs() <= self.circle_pos {
            el.abs() - self.circle_radius
        } else {
            let circle_distance = self
                .circle_positions
                .iter()
                .map(|&c| position.dot(c).clamp(-1.0, 1.0).acos())
                .fold(f64::INFINITY, f64::min);
            circle_distance - self.circle_radius
        };

        interp(distance, &[0.0, FADE_WIDTH.to_radians()], &[1.0, 0.0])
    }
}

/// Panner that turns a weighting function over the spread grid into speaker
/// gains, using precomputed point-source results for the grid.
pub struct SpreadingPanner {
    grid_results: Vec<Vec<f64>>,
    num_channels: usize,
}

impl SpreadingPanner {
    pub fn new(panner: &PointSourcePanner) -> RenderResult<Self> {
        let grid_results = SPREAD_GRID
            .iter()
            .map(|&pos| panner.handle_or_err(pos))
            .collect::<RenderResult<Vec<_>>>()?;

        Ok(Self {
            num_channels: panner.num_channels(),
            grid_results,
        })
    }

    /// Panning values for a weighting function over the grid.
    pub fn values_for_weight(&self, weight: &WeightFunc) -> Vec<f64> {
        let mut total = vec![0.0; self.num_channels];

        for (&pos, result) in SPREAD_GRID.iter().zip(&self.grid_results) {
            let w = weight.weight(pos);
            if w != 0.0 {
                for (t, &g) in total.iter_mut().zip(result) {
                    *t += w * g;
                }
            }
        }

        let norm = total.iter().map(|g| g * g).sum::<f64>().sqrt();
        for t in &mut total {
            *t /= norm;
        }
        total
    }
}

/// Extent panner combining point-source panning for small sources with
/// spread panning for large ones.
pub struct PolarExtentPanner {
    spreading: SpreadingPanner,
}

impl PolarExtentPanner {
    pub fn new(panner: &PointSourcePanner) -> RenderResult<Self> {
        Ok(Self {
            spreading: SpreadingPanner::new(panner)?,
        })
    }

    /// Calculate the speaker panning values for the position, width and
    /// height of a source.
    ///
    /// Sizes below the fade width interpolate between point and spread
    /// panning values to keep the transition smooth.
    pub fn calc_pv_spread(
        &self,
        panner: &PointSourcePanner,
        position: Vec3,
        width: f64,
        height: f64,
    ) -> RenderResult<Vec<f64>> {
        let amount_spread = interp(width.max(height), &[0.0, FADE_WIDTH], &[0.0, 1.0]);
        let amount_point = 1.0 - amount_spread;

        let mut pv = vec![0.0; self.spreading.num_channels];

        if amount_point > 1e-10 {
            let point = panner.handle_or_err(position)?;
            for (o, g) in pv.iter_mut().zip(point) {
                *o += amount_point * g * g;
            }
        }
        if amount_spread > 1e-10 {
            let width = width.max(FADE_WIDTH / 2.0);
            let height = height.max(FADE_WIDTH / 2.0);

            let weight = WeightFunc::new(position, width, height);
            let spread = self.spreading.values_for_weight(&weight);
            for (o, g) in pv.iter_mut().zip(spread) {
                *o += amount_spread * g * g;
            }
        }

        for g in &mut pv {
            *g = g.sqrt();
        }
        Ok(pv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admr_core::bs2051;
    use admr_core::geom::cart;
    use crate::point_source::configure;

    fn setup() -> (PointSourcePanner, PolarExtentPanner) {
        let layout = bs2051::get_layout("4+5+0").unwrap().without_lfe();
        let panner = configure(&layout).unwrap();
        let extent = PolarExtentPanner::new(&panner).unwrap();
        (panner, extent)
    }

    #[test]
    fn test_weight_inside_and_outside() {
        let weight = WeightFunc::new(cart(0.0, 0.0, 1.0), 60.0, 30.0);

        // centre and points well inside the rectangle
        assert_eq!(weight.weight(cart(0.0, 0.0, 1.0)), 1.0);
        assert_eq!(weight.weight(cart(20.0, 0.0, 1.0)), 1.0);

        // points well outside
        assert_eq!(weight.weight(cart(180.0, 0.0, 1.0)), 0.0);
        assert_eq!(weight.weight(cart(0.0, 80.0, 1.0)), 0.0);

        // inside the fade region
        let w = weight.weight(cart(0.0, 20.0, 1.0));
        assert!(w > 0.0 && w < 1.0, "fade weight {}", w);
    }

    #[test]
    fn test_weight_symmetric() {
        let weight = WeightFunc::new(cart(0.0, 0.0, 1.0), 90.0, 40.0);
        for &(az, el) in &[(30.0, 10.0), (50.0, 5.0), (70.0, 20.0)] {
            let a = weight.weight(cart(az, el, 1.0));
            let b = weight.weight(cart(-az, el, 1.0));
            let c = weight.weight(cart(az, -el, 1.0));
            assert!((a - b).abs() < 1e-10);
            assert!((a - c).abs() < 1e-10);
        }
    }

    #[test]
    fn test_tall_sources_flip() {
        // a tall source behaves like a wide source rotated 90 degrees
        let wide = WeightFunc::new(cart(0.0, 0.0, 1.0), 60.0, 20.0);
        let tall = WeightFunc::new(cart(0.0, 0.0, 1.0), 20.0, 60.0);

        for &(az, el) in &[(10.0, 5.0), (25.0, 0.0), (0.0, 25.0)] {
            let w = wide.weight(cart(az, el, 1.0));
            let t = tall.weight(cart(el, az, 1.0));
            assert!((w - t).abs() < 1e-10, "({}, {}): {} != {}", az, el, w, t);
        }
    }

    #[test]
    fn test_zero_size_equals_point_source() {
        let (panner, extent) = setup();

        for &az in &[-120.0, -30.0, 0.0, 45.0, 170.0] {
            let pos = cart(az, 10.0, 1.0);
            let spread = extent.calc_pv_spread(&panner, pos, 0.0, 0.0).unwrap();
            let point = panner.handle(pos).unwrap();
            for (s, p) in spread.iter().zip(&point) {
                assert!((s - p).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_spread_power_normalised() {
        let (panner, extent) = setup();

        for &size in &[5.0, 20.0, 90.0, 360.0] {
            let pv = extent
                .calc_pv_spread(&panner, cart(0.0, 0.0, 1.0), size, size)
                .unwrap();
            let power: f64 = pv.iter().map(|g| g * g).sum();
            assert!((power - 1.0).abs() < 1e-10, "size {}: power {}", size, power);
        }
    }

    #[test]
    fn test_wide_source_spreads_energy() {
        let (panner, extent) = setup();

        // a very wide source should put substantial energy in the surrounds
        let pv = extent
            .calc_pv_spread(&panner, cart(0.0, 0.0, 1.0), 360.0, 360.0)
            .unwrap();
        let rear_power: f64 = pv[3] * pv[3] + pv[4] * pv[4];
        assert!(rear_power > 0.1, "rear power {}", rear_power);
    }
}
