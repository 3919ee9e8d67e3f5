//! Zone exclusion downmix
//!
//! For each channel, a priority-ordered list of groups of other channels is
//! precomputed; energy from an excluded channel moves to the highest
//! priority group containing at least one non-excluded channel, split
//! equally within the group.

use admr_core::layout::{Channel, Layout};
use ndarray::Array2;

/// Priority when moving between layers; prefer moving up before down.
/// Indexed by [from layer][to layer] over bottom/mid/upper/top.
const LAYER_PRIO: [[usize; 4]; 4] = [
    [0, 1, 2, 3],
    [3, 0, 1, 2],
    [3, 2, 0, 1],
    [3, 2, 1, 0],
];

fn layer(channel: &Channel) -> usize {
    let elevation = channel.polar_nominal_position.elevation;
    if elevation < -10.0 {
        0
    } else if elevation < 10.0 {
        1
    } else if elevation < 75.0 {
        2
    } else {
        3
    }
}

fn sign(x: f64) -> i32 {
    let epsilon = 1e-6;
    if x > epsilon {
        1
    } else if x < -epsilon {
        -1
    } else {
        0
    }
}

/// Calculate downmix coefficients to route output away from a set of
/// loudspeakers.
pub struct ZoneExclusionDownmix {
    num_channels: usize,
    /// per channel: groups of candidate channels in priority order
    channel_groups: Vec<Vec<Vec<usize>>>,
}

impl ZoneExclusionDownmix {
    pub fn new(layout: &Layout) -> Self {
        assert!(
            layout.channels.iter().all(|c| !c.is_lfe),
            "LFE channel passed to zone exclusion"
        );

        let epsilon = 1e-6;
        let num_channels = layout.channels.len();

        // key per channel pair; lexicographically smaller keys have higher
        // priority, and channels with equal keys may share energy
        let calc_key = |from: &Channel, to: &Channel| -> [f64; 4] {
            let layer_priority = LAYER_PRIO[layer(from)][layer(to)] as f64;

            // prefer to keep sources on the same side of the listener
            // front/back wise
            let front_back_change =
                (sign(from.nominal_position().y) - sign(to.nominal_position().y)).abs() as f64;

            let cart_dist = (from.nominal_position() - to.nominal_position()).norm();
            let front_back_dist = (from.nominal_position().y - to.nominal_position().y).abs();

            [layer_priority, front_back_change, cart_dist, front_back_dist]
        };

        let mut channel_groups = Vec::with_capacity(num_channels);
        for from in &layout.channels {
            let mut keyed: Vec<([f64; 4], usize)> = layout
                .channels
                .iter()
                .enumerate()
                .map(|(j, to)| (calc_key(from, to), j))
                .collect();

            keyed.sort_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap()
                    .then(a.1.cmp(&b.1))
            });

            // merge channels whose keys are equal within tolerance
            let mut groups: Vec<([f64; 4], Vec<usize>)> = Vec::new();
            for (key, j) in keyed {
                match groups.last_mut() {
                    Some((group_key, group))
                        if group_key
                            .iter()
                            .zip(&key)
                            .all(|(a, b)| (a - b).abs() < epsilon) =>
                    {
                        group.push(j)
                    }
                    _ => groups.push((key, vec![j])),
                }
            }

            let groups: Vec<Vec<usize>> = groups.into_iter().map(|(_, g)| g).collect();
            debug_assert_eq!(groups[0].len(), 1, "channel should map to itself first");

            channel_groups.push(groups);
        }

        Self {
            num_channels,
            channel_groups,
        }
    }

    /// Downmix matrix for a set of excluded channels; `m[[i, j]]` is the
    /// coefficient from channel i to channel j.
    pub fn downmix_for_excluded(&self, excluded: &[bool]) -> Array2<f64> {
        assert_eq!(excluded.len(), self.num_channels);

        if excluded.iter().all(|&e| e) || excluded.iter().all(|&e| !e) {
            return Array2::eye(self.num_channels);
        }

        let mut downmix = Array2::<f64>::zeros((self.num_channels, self.num_channels));

        for (i, groups) in self.channel_groups.iter().enumerate() {
            let group = groups
                .iter()
                .find(|g| g.iter().any(|&j| !excluded[j]))
                .expect("some channel is not excluded");

            let not_excluded: Vec<usize> =
                group.iter().copied().filter(|&j| !excluded[j]).collect();
            for &j in &not_excluded {
                downmix[[i, j]] = 1.0 / not_excluded.len() as f64;
            }
        }

        downmix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admr_core::bs2051;

    fn zed(name: &str) -> (Layout, ZoneExclusionDownmix) {
        let layout = bs2051::get_layout(name).unwrap().without_lfe();
        let zed = ZoneExclusionDownmix::new(&layout);
        (layout, zed)
    }

    #[test]
    fn test_nothing_excluded_is_identity() {
        let (layout, zed) = zed("0+5+0");
        let excluded = vec![false; layout.num_channels()];
        assert_eq!(zed.downmix_for_excluded(&excluded), Array2::<f64>::eye(5));
    }

    #[test]
    fn test_all_excluded_is_identity() {
        let (layout, zed) = zed("0+5+0");
        let excluded = vec![true; layout.num_channels()];
        assert_eq!(zed.downmix_for_excluded(&excluded), Array2::<f64>::eye(5));
    }

    #[test]
    fn test_excluded_centre_moves_to_front_pair() {
        let (layout, zed) = zed("0+5+0");
        let centre = layout.channel_index("M+000").unwrap();
        let left = layout.channel_index("M+030").unwrap();
        let right = layout.channel_index("M-030").unwrap();

        let mut excluded = vec![false; layout.num_channels()];
        excluded[centre] = true;

        let downmix = zed.downmix_for_excluded(&excluded);

        // energy from the centre splits equally between the front pair
        assert_eq!(downmix[[centre, left]], 0.5);
        assert_eq!(downmix[[centre, right]], 0.5);
        assert_eq!(downmix[[centre, centre]], 0.0);

        // unexcluded channels keep their energy
        assert_eq!(downmix[[left, left]], 1.0);
    }

    #[test]
    fn test_upper_layer_prefers_own_layer() {
        let (layout, zed) = zed("4+5+0");
        let u_left = layout.channel_index("U+030").unwrap();
        let u_right = layout.channel_index("U-030").unwrap();

        let mut excluded = vec![false; layout.num_channels()];
        excluded[u_left] = true;

        let downmix = zed.downmix_for_excluded(&excluded);

        // U+030 energy should stay in the upper layer
        assert_eq!(downmix[[u_left, u_right]], 1.0);
    }
}
