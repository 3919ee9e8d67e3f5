//! Cartesian (allocentric) extent panning
//!
//! Spread sources in the cube are built from a grid of virtual source
//! positions along each axis, weighted by per-axis distance functions and
//! combined with boundary terms so that sources pushed against the walls of
//! the cube keep their energy.

use admr_core::geom::interp;
use admr_core::Vec3;

const NUM_VS: usize = 40;
const NEG130DB_EXP_LIM: f64 = 6.5;
const NEG130DB_LIM: f64 = 1e-6 * 0.31622776601683794; // 10^-6.5

fn scale_size(v: f64) -> f64 {
    interp(
        v.min(1.0),
        &[0.0, 0.2, 0.5, 0.75, 1.0],
        &[0.0, 0.3, 1.0, 1.8, 2.8],
    )
}

/// Effective size of the source given the dimensionality of the layout.
fn s_eff(channel_positions: &[Vec3], sx: f64, sy: f64, sz: f64) -> f64 {
    let first = channel_positions[0];

    if channel_positions.iter().all(|p| p.y == first.y && p.z == first.z) {
        // speakers in a left/right line
        sx
    } else if channel_positions.iter().all(|p| p.z == first.z) {
        // speakers in a horizontal plane
        let (lo, hi) = if sx < sy { (sx, sy) } else { (sy, sx) };
        0.75 * hi + 0.25 * lo
    } else {
        // speakers in a cube
        let mut sizes = [sx, sy, sz];
        sizes.sort_by(|a, b| a.partial_cmp(b).unwrap());
        (6.0 / 9.0) * sizes[2] + (2.0 / 9.0) * sizes[1] + (1.0 / 9.0) * sizes[0]
    }
}

fn power_exponent(s_eff: f64) -> f64 {
    if s_eff <= 0.5 {
        6.0
    } else {
        let s_max = 2.8;
        6.0 - 4.0 * ((s_eff - 0.5) / (s_max - 0.5))
    }
}

fn h(s: f64, d_bound: f64) -> f64 {
    if d_bound >= 2.0 * s && d_bound >= 0.4 {
        let n = (2.0 * s).max(0.4);
        ((n * n * n) / (0.16 * 2.0 * s)).powf(1.0 / 3.0)
    } else {
        let a = d_bound / 0.4;
        (d_bound / 2.0 * (a * a)).powf(1.0 / 3.0)
    }
}

fn d_bound(dim: usize, xo: f64, yo: f64, zo: f64) -> f64 {
    let mut d = (xo + 1.0).min(1.0 - xo);
    if dim >= 2 {
        d = d.min(yo + 1.0).min(1.0 - yo);
    }
    if dim >= 3 {
        d = d.min(zo + 1.0).min(1.0 - zo);
    }
    d
}

fn mu(dim: usize, sx: f64, sy: f64, sz: f64, xo: f64, yo: f64, zo: f64) -> f64 {
    let d_bound = d_bound(dim, xo, yo, zo);

    match dim {
        1 => {
            let n = h(sx, d_bound);
            n * n * n
        }
        2 => {
            let n = h(sx, d_bound) * h(sy, d_bound);
            n.powf(1.5)
        }
        _ => h(sx, d_bound) * h(sy, d_bound) * h(sz, d_bound),
    }
}

fn weights(offset: f64, size: f64, samples: &[f64], half: bool) -> Vec<f64> {
    samples
        .iter()
        .map(|&s| {
            let denom = if half { size } else { 2.0 * size };
            let t = (1.5 * (s - offset) / denom).powi(4).min(NEG130DB_EXP_LIM);
            10.0_f64.powf(-t)
        })
        .collect()
}

fn dim_of(channel_positions: &[Vec3]) -> usize {
    let first = channel_positions[0];
    let x = channel_positions.iter().any(|p| p.x != first.x) as usize;
    let y = channel_positions.iter().any(|p| p.y != first.y) as usize;
    let z = channel_positions.iter().any(|p| p.z != first.z) as usize;
    x + y + z
}

fn calc_f(p: f64, w: &[f64], g_point: &[Vec<f64>]) -> Vec<f64> {
    g_point
        .iter()
        .map(|g_row| {
            let f: f64 = g_row
                .iter()
                .zip(w)
                .map(|(&g, &wv)| (g * wv).powf(p))
                .sum();
            if f < NEG130DB_LIM {
                0.0
            } else {
                f
            }
        })
        .collect()
}

/// Bounds of the speaker coordinates bracketing a value along one axis,
/// restricted by the `select` predicate.
fn bracket(
    channel_positions: &[Vec3],
    value: f64,
    coord: impl Fn(Vec3) -> f64,
    select: impl Fn(Vec3) -> bool,
) -> (Option<f64>, Option<f64>) {
    let mut lo: Option<f64> = None;
    let mut hi: Option<f64> = None;

    for &pos in channel_positions {
        if !select(pos) {
            continue;
        }
        let c = coord(pos);
        if c <= value {
            lo = Some(lo.map_or(c, |l: f64| l.max(c)));
        }
        if c >= value {
            hi = Some(hi.map_or(c, |h: f64| h.min(c)));
        }
    }

    (lo, hi)
}

fn point_gain(pos_coord: f64, bounds: (Option<f64>, Option<f64>), value: f64) -> f64 {
    use std::f64::consts::FRAC_PI_2;

    match bounds {
        (None, Some(hi)) => (pos_coord == hi) as u8 as f64,
        (Some(lo), None) => (pos_coord == lo) as u8 as f64,
        (Some(lo), Some(hi)) => {
            if !(lo..=hi).contains(&pos_coord) {
                0.0
            } else if lo == hi {
                1.0
            } else if lo == pos_coord {
                ((value - lo) / (hi - lo) * FRAC_PI_2).cos()
            } else {
                ((value - lo) / (hi - lo) * FRAC_PI_2).sin()
            }
        }
        (None, None) => 0.0,
    }
}

/// Per-speaker, per-sample point gains along each axis separately.
fn calc_g_point_separated(
    channel_positions: &[Vec3],
    xs: &[f64],
    ys: &[f64],
    zs: &[f64],
) -> (Vec<Vec<f64>>, Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let mut gx = Vec::with_capacity(channel_positions.len());
    let mut gy = Vec::with_capacity(channel_positions.len());
    let mut gz = Vec::with_capacity(channel_positions.len());

    for &pos in channel_positions {
        gz.push(
            zs.iter()
                .map(|&z| {
                    let bounds = bracket(channel_positions, z, |p| p.z, |_| true);
                    point_gain(pos.z, bounds, z)
                })
                .collect(),
        );

        gy.push(
            ys.iter()
                .map(|&y| {
                    let bounds = bracket(channel_positions, y, |p| p.y, |p| p.z == pos.z);
                    point_gain(pos.y, bounds, y)
                })
                .collect(),
        );

        gx.push(
            xs.iter()
                .map(|&x| {
                    let bounds =
                        bracket(channel_positions, x, |p| p.x, |p| p.z == pos.z && p.y == pos.y);
                    point_gain(pos.x, bounds, x)
                })
                .collect(),
        );
    }

    (gx, gy, gz)
}

fn safe_norm(v: &mut [f64]) {
    let length = v.iter().map(|g| g * g).sum::<f64>().sqrt();
    if length > 1e-16 {
        for g in v {
            *g /= length;
        }
    } else {
        for g in v {
            *g = 0.0;
        }
    }
}

fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
        .collect()
}

/// Gains for a spread source in the cube.
pub fn get_gains(
    channel_positions: &[Vec3],
    position: Vec3,
    size_x: f64,
    size_y: f64,
    size_z: f64,
) -> Vec<f64> {
    let (xo, yo, mut zo) = (position.x, position.y, position.z);

    let has_three_z_planes = {
        let mut z_values: Vec<f64> = channel_positions.iter().map(|p| p.z).collect();
        z_values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        z_values.dedup();
        z_values.len() >= 3
    };

    let nx = NUM_VS;
    let ny = NUM_VS;
    let nz = if has_three_z_planes { NUM_VS } else { NUM_VS / 2 };

    let xs = linspace(-1.0, 1.0, nx);
    let ys = linspace(-1.0, 1.0, ny);
    let zs = if has_three_z_planes {
        linspace(-1.0, 1.0, nz)
    } else {
        zo = zo.max(0.0);
        linspace(0.0, 1.0, nz)
    };

    let sx = scale_size(size_x).max(2.0 / (nx - 1) as f64);
    let sy = scale_size(size_y).max(2.0 / (ny - 1) as f64);
    let sz = scale_size(size_z).max(2.0 / (nz - 1) as f64);
    let s_eff = s_eff(channel_positions, sx, sy, sz);
    let p = power_exponent(s_eff);
    let dim = dim_of(channel_positions);

    let mu = mu(dim, sx, sy, sz, xo, yo, zo);

    let wx = weights(xo, sx, &xs, false);
    let wy = weights(yo, sy, &ys, false);
    let wz: Vec<f64> = weights(zo, sz, &zs, true)
        .into_iter()
        .zip(&zs)
        .map(|(w, &z)| w * (z * std::f64::consts::PI * (3.0 / 7.0)).cos())
        .collect();

    let (g_point_x, g_point_y, g_point_z) = calc_g_point_separated(channel_positions, &xs, &ys, &zs);
    let fx = calc_f(p, &wx, &g_point_x);
    let fy = calc_f(p, &wy, &g_point_y);
    let fz = calc_f(p, &wz, &g_point_z);

    let mut g_inside: Vec<f64> = (0..channel_positions.len())
        .map(|i| fx[i] * fy[i] * fz[i])
        .collect();
    safe_norm(&mut g_inside);

    // boundary terms keep the energy of sources pressed against the walls
    let boundary = |g_point: &[Vec<f64>], w: &[f64], last: bool| -> Vec<f64> {
        let idx = if last { w.len() - 1 } else { 0 };
        g_point
            .iter()
            .map(|row| (row[idx] * w[idx]).powf(p))
            .collect()
    };

    let b_floor = boundary(&g_point_z, &wz, false);
    let b_ceil = boundary(&g_point_z, &wz, true);
    let b_left = boundary(&g_point_x, &wx, false);
    let b_right = boundary(&g_point_x, &wx, true);
    let b_front = boundary(&g_point_y, &wy, false);
    let b_back = boundary(&g_point_y, &wy, true);

    let mut g_size: Vec<f64> = (0..channel_positions.len())
        .map(|i| {
            let g_bound = b_left[i] * fy[i] * fz[i]
                + b_right[i] * fy[i] * fz[i]
                + fx[i] * b_front[i] * fz[i]
                + fx[i] * b_back[i] * fz[i]
                + fx[i] * fy[i] * b_ceil[i]
                + fx[i] * fy[i] * b_floor[i];
            (g_bound + mu * g_inside[i]).powf(1.0 / p)
        })
        .collect();
    safe_norm(&mut g_size);

    // fade between point and spread panning for small sources
    let s_fade = 0.2;
    let (alpha, beta) = if s_eff < s_fade {
        let t = s_eff * std::f64::consts::PI / (s_fade * 2.0);
        (t.cos(), t.sin())
    } else {
        (0.0, 1.0)
    };

    let (px, py, pz) = calc_g_point_separated(channel_positions, &[xo], &[yo], &[zo]);
    let mut g_total: Vec<f64> = (0..channel_positions.len())
        .map(|i| alpha * (px[i][0] * py[i][0] * pz[i][0]) + beta * g_size[i])
        .collect();
    safe_norm(&mut g_total);

    g_total
}

/// Cartesian extent panning: a point panner for zero-size sources, the
/// spread model otherwise.
pub fn allocentric_extent_pan(
    channel_positions: &[Vec3],
    position: Vec3,
    width: f64,
    height: f64,
    depth: f64,
) -> Vec<f64> {
    if width == 0.0 && height == 0.0 && depth == 0.0 {
        crate::allocentric::AllocentricPanner::new(channel_positions.to_vec()).handle(position)
    } else {
        get_gains(channel_positions, position, width, height, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admr_core::bs2051;
    use crate::allocentric::positions_for_layout;

    fn positions() -> Vec<Vec3> {
        let layout = bs2051::get_layout("4+5+0").unwrap().without_lfe();
        positions_for_layout(&layout).unwrap()
    }

    #[test]
    fn test_gains_normalised() {
        let positions = positions();

        for &size in &[0.1, 0.5, 1.0] {
            let gains = get_gains(&positions, Vec3::new(0.0, 1.0, 0.0), size, size, size);
            let power: f64 = gains.iter().map(|g| g * g).sum();
            assert!((power - 1.0).abs() < 1e-10, "size {}: {}", size, power);
        }
    }

    #[test]
    fn test_small_size_concentrated() {
        let positions = positions();

        // a small source at the front centre mostly feeds the front speakers
        let gains = get_gains(&positions, Vec3::new(0.0, 1.0, 0.0), 0.05, 0.05, 0.05);
        let front: f64 = (0..3).map(|i| gains[i] * gains[i]).sum();
        assert!(front > 0.9, "front power {}", front);
    }

    #[test]
    fn test_large_size_spreads() {
        let positions = positions();

        let gains = get_gains(&positions, Vec3::new(0.0, 0.0, 0.0), 1.0, 1.0, 1.0);
        let nonzero = gains.iter().filter(|&&g| g > 0.05).count();
        assert!(nonzero >= positions.len() / 2, "only {} speakers active", nonzero);
    }

    #[test]
    fn test_left_right_symmetry() {
        let positions = positions();
        let layout = bs2051::get_layout("4+5+0").unwrap().without_lfe();

        let gains_l = get_gains(&positions, Vec3::new(-0.5, 0.5, 0.0), 0.3, 0.3, 0.0);
        let gains_r = get_gains(&positions, Vec3::new(0.5, 0.5, 0.0), 0.3, 0.3, 0.0);

        for (i, channel) in layout.channels.iter().enumerate() {
            let mirror_name = if channel.name.contains('+') {
                channel.name.replace('+', "-")
            } else {
                channel.name.replace('-', "+")
            };
            if let Some(j) = layout.channel_index(&mirror_name) {
                assert!(
                    (gains_l[i] - gains_r[j]).abs() < 1e-10,
                    "{}: {} != {}",
                    channel.name,
                    gains_l[i],
                    gains_r[j]
                );
            }
        }
    }

    #[test]
    fn test_zero_size_uses_point_panner() {
        let positions = positions();
        let gains = allocentric_extent_pan(&positions, Vec3::new(0.0, 1.0, 0.0), 0.0, 0.0, 0.0);

        // M+000 is exactly at (0, 1, 0)
        let layout = bs2051::get_layout("4+5+0").unwrap().without_lfe();
        let i = layout.channel_index("M+000").unwrap();
        assert!((gains[i] - 1.0).abs() < 1e-10);
    }
}
