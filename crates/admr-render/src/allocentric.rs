//! Allocentric loudspeaker positions and the Cartesian point panner
//!
//! Allocentric positions place each loudspeaker on the surface of the
//! [-1, 1] cube. They are derived from the nominal polar positions through
//! the BS.2127 section 10 mapping, with the screen loudspeakers special
//! cased; the panner then works row/column-wise through the resulting grid.

use admr_core::layout::Layout;
use admr_core::Vec3;

use crate::conversion::point_polar_to_cart;
use crate::error::{RenderError, RenderResult};

/// Allocentric position for a screen loudspeaker.
///
/// Screen speakers sit between the front corners; their Y must be exactly on
/// the front wall (or X exactly on the side wall for wide positions).
fn screen_speaker_position(azimuth: f64) -> RenderResult<Vec3> {
    let mut pos = point_polar_to_cart(azimuth.abs(), 0.0, 1.0);

    let at_front = (pos.y - 1.0).abs() < 1e-10;
    let at_side = (pos.x + 1.0).abs() < 1e-10;
    if !at_front && !at_side {
        return Err(RenderError::InvalidLayout(format!(
            "screen speaker at azimuth {} is neither at the front nor the side",
            azimuth
        )));
    }

    if at_front {
        pos.y = 1.0;
    }
    if at_side {
        pos.x = -1.0;
    }

    // pos was computed for the left-hand speaker; mirror for the right
    if azimuth < 0.0 {
        pos.x = -pos.x;
    }
    Ok(pos)
}

/// Allocentric positions for each channel of a layout.
pub fn positions_for_layout(layout: &Layout) -> RenderResult<Vec<Vec3>> {
    layout
        .channels
        .iter()
        .map(|channel| {
            if channel.name == "M+SC" || channel.name == "M-SC" {
                screen_speaker_position(channel.polar_position.azimuth)
            } else {
                let nominal = channel.polar_nominal_position;
                Ok(point_polar_to_cart(nominal.azimuth, nominal.elevation, 1.0))
            }
        })
        .collect()
}

/// Extend an exclusion mask so the remaining speakers still form a
/// well-shaped grid.
///
/// If a side speaker (|x| = 1, |y| != 1) is excluded, the other speakers in
/// its row are excluded too. If this leaves nothing, exclusion is disabled.
pub fn get_excluded(channel_positions: &[Vec3], is_excluded: &[bool]) -> Vec<bool> {
    let mut excluded = is_excluded.to_vec();

    for (i, &pos) in channel_positions.iter().enumerate() {
        if is_excluded[i] && pos.x.abs() == 1.0 && pos.y.abs() != 1.0 {
            for (k, &other) in channel_positions.iter().enumerate() {
                if other.y == pos.y && other.z == pos.z {
                    excluded[k] = true;
                }
            }
        }
    }

    if excluded.iter().all(|&e| e) {
        excluded.fill(false);
    }

    excluded
}

/// Point panner over allocentric positions.
///
/// Speakers are organised into planes of constant Z, rows of constant Y and
/// columns of constant X; the position is panned pairwise along each axis
/// with a constant-power law and the gains multiplied through.
pub struct AllocentricPanner {
    positions: Vec<Vec3>,
    /// planes (by z) -> rows (by y) -> (channel index, position), all sorted
    tree: Vec<Vec<Vec<(usize, Vec3)>>>,
}

impl AllocentricPanner {
    pub fn new(positions: Vec<Vec3>) -> Self {
        let tree = Self::speaker_tree(&positions);
        Self { positions, tree }
    }

    pub fn num_channels(&self) -> usize {
        self.positions.len()
    }

    fn speaker_tree(positions: &[Vec3]) -> Vec<Vec<Vec<(usize, Vec3)>>> {
        let mut tree: Vec<Vec<Vec<(usize, Vec3)>>> = Vec::new();

        for (index, &pos) in positions.iter().enumerate() {
            // find or insert the z plane
            let zi = match tree.iter().position(|plane| plane[0][0].1.z >= pos.z) {
                Some(zi) if tree[zi][0][0].1.z == pos.z => zi,
                Some(zi) => {
                    tree.insert(zi, vec![vec![(index, pos)]]);
                    continue;
                }
                None => {
                    tree.push(vec![vec![(index, pos)]]);
                    continue;
                }
            };

            // find or insert the y row
            let plane = &mut tree[zi];
            let yi = match plane.iter().position(|row| row[0].1.y >= pos.y) {
                Some(yi) if plane[yi][0].1.y == pos.y => yi,
                Some(yi) => {
                    plane.insert(yi, vec![(index, pos)]);
                    continue;
                }
                None => {
                    plane.push(vec![(index, pos)]);
                    continue;
                }
            };

            // insert into the x column
            let row = &mut plane[yi];
            let xi = row
                .iter()
                .position(|&(_, p)| p.x >= pos.x)
                .unwrap_or(row.len());
            row.insert(xi, (index, pos));
        }

        tree
    }

    fn balance_pan(min: f64, max: f64, value: f64) -> (f64, f64) {
        if min == max {
            (1.0, 1.0)
        } else if value <= min {
            (0.0, 1.0)
        } else if value >= max {
            (1.0, 0.0)
        } else {
            let a = (value - min) / (max - min) * std::f64::consts::FRAC_PI_2;
            (a.cos(), a.sin())
        }
    }

    /// Find the two bracketing indices in a sorted list of coordinates.
    fn find_bounds(coords: &[f64], value: f64) -> (usize, usize) {
        if value <= coords[0] {
            return (0, 0);
        }
        for (i, &c) in coords.iter().enumerate() {
            if c == value {
                return (i, i);
            } else if c > value {
                return (i - 1, i);
            }
        }
        (coords.len() - 1, coords.len() - 1)
    }

    /// Gains for a position inside the cube.
    pub fn handle(&self, position: Vec3) -> Vec<f64> {
        let mut gains = vec![0.0; self.positions.len()];

        let plane_zs: Vec<f64> = self.tree.iter().map(|p| p[0][0].1.z).collect();
        let (z0, z1) = Self::find_bounds(&plane_zs, position.z);
        let z_gains = Self::balance_pan(plane_zs[z0], plane_zs[z1], position.z);

        for (&z_gain, &zi) in [z_gains.0, z_gains.1].iter().zip([z0, z1].iter()) {
            let plane = &self.tree[zi];
            let row_ys: Vec<f64> = plane.iter().map(|r| r[0].1.y).collect();
            let (y0, y1) = Self::find_bounds(&row_ys, position.y);
            let y_gains = Self::balance_pan(row_ys[y0], row_ys[y1], position.y);

            for (&y_gain, &yi) in [y_gains.0, y_gains.1].iter().zip([y0, y1].iter()) {
                let row = &plane[yi];
                let col_xs: Vec<f64> = row.iter().map(|&(_, p)| p.x).collect();
                let (x0, x1) = Self::find_bounds(&col_xs, position.x);
                let x_gains = Self::balance_pan(col_xs[x0], col_xs[x1], position.x);

                for (&x_gain, &xi) in [x_gains.0, x_gains.1].iter().zip([x0, x1].iter()) {
                    gains[row[xi].0] = z_gain * y_gain * x_gain;
                }
            }
        }

        gains
    }
}

/// Configure an allocentric point panner for a layout without LFE channels.
pub fn configure_allocentric(layout: &Layout) -> RenderResult<AllocentricPanner> {
    assert!(
        layout.channels.iter().all(|c| !c.is_lfe),
        "LFE channel passed to point source panner"
    );
    Ok(AllocentricPanner::new(positions_for_layout(layout)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use admr_core::bs2051;

    #[test]
    fn test_positions_on_cube() {
        let layout = bs2051::get_layout("4+5+0").unwrap().without_lfe();
        let positions = positions_for_layout(&layout).unwrap();

        for (channel, pos) in layout.channels.iter().zip(&positions) {
            let max_coord = pos.x.abs().max(pos.y.abs()).max(pos.z.abs());
            assert!((max_coord - 1.0).abs() < 1e-10, "{}: {:?}", channel.name, pos);
        }

        // front corners
        let i = layout.channel_index("M+030").unwrap();
        assert!((positions[i] - Vec3::new(-1.0, 1.0, 0.0)).norm() < 1e-10);
        let i = layout.channel_index("U+030").unwrap();
        assert!((positions[i] - Vec3::new(-1.0, 1.0, 1.0)).norm() < 1e-10);
    }

    #[test]
    fn test_panner_at_speaker_positions() {
        let layout = bs2051::get_layout("0+5+0").unwrap().without_lfe();
        let panner = configure_allocentric(&layout).unwrap();
        let positions = positions_for_layout(&layout).unwrap();

        for (i, &pos) in positions.iter().enumerate() {
            let gains = panner.handle(pos);
            assert!((gains[i] - 1.0).abs() < 1e-10, "channel {}", i);
            for (j, &g) in gains.iter().enumerate() {
                if j != i {
                    assert!(g.abs() < 1e-10, "channel {} leaked {}", j, g);
                }
            }
        }
    }

    #[test]
    fn test_panner_power_between_speakers() {
        let layout = bs2051::get_layout("0+5+0").unwrap().without_lfe();
        let panner = configure_allocentric(&layout).unwrap();

        // halfway between the front corners
        let gains = panner.handle(Vec3::new(0.0, 1.0, 0.0));
        let power: f64 = gains.iter().map(|g| g * g).sum();
        assert!((power - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_get_excluded_extends_rows() {
        let positions = vec![
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
        ];

        // excluding one side speaker excludes its whole row
        let excluded = get_excluded(&positions, &[false, false, true, false]);
        assert_eq!(excluded, vec![false, false, true, true]);
    }

    #[test]
    fn test_get_excluded_all_resets() {
        let positions = vec![Vec3::new(-1.0, 1.0, 0.0), Vec3::new(1.0, 1.0, 0.0)];
        let excluded = get_excluded(&positions, &[true, true]);
        assert_eq!(excluded, vec![false, false]);
    }
}
