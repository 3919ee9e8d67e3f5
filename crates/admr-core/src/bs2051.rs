//! Embedded BS.2051 loudspeaker layout tables
//!
//! Layout data is built in code rather than loaded from a resource so that
//! channel ordering and positions are fixed at compile time. Channels appear
//! in the order given in BS.2051; real positions default to the nominal
//! positions.

use once_cell::sync::Lazy;

use crate::error::{CoreError, CoreResult};
use crate::layout::{Channel, Layout};
use crate::position::PolarPosition;

/// A channel spec: name, nominal azimuth/elevation, allowed ranges, LFE flag.
struct ChannelSpec {
    name: &'static str,
    az: f64,
    el: f64,
    az_range: Option<(f64, f64)>,
    el_range: Option<(f64, f64)>,
    is_lfe: bool,
}

const fn ch(name: &'static str, az: f64, el: f64) -> ChannelSpec {
    ChannelSpec { name, az, el, az_range: None, el_range: None, is_lfe: false }
}

const fn ch_r(
    name: &'static str,
    az: f64,
    el: f64,
    az_range: (f64, f64),
    el_range: (f64, f64),
) -> ChannelSpec {
    ChannelSpec { name, az, el, az_range: Some(az_range), el_range: Some(el_range), is_lfe: false }
}

const fn lfe(name: &'static str, az: f64) -> ChannelSpec {
    ChannelSpec {
        name,
        az,
        el: -30.0,
        az_range: Some((-180.0, 180.0)),
        el_range: Some((-90.0, 0.0)),
        is_lfe: true,
    }
}

fn build(name: &str, specs: &[ChannelSpec]) -> Layout {
    let channels = specs
        .iter()
        .map(|s| {
            let position = PolarPosition::new(s.az, s.el, 1.0);
            Channel {
                name: s.name.to_owned(),
                polar_position: position,
                polar_nominal_position: position,
                az_range: s.az_range.unwrap_or((s.az, s.az)),
                el_range: s.el_range.unwrap_or((s.el, s.el)),
                is_lfe: s.is_lfe,
            }
        })
        .collect();

    Layout::new(name, channels)
}

static LAYOUTS: Lazy<Vec<Layout>> = Lazy::new(|| {
    vec![
        // System A
        build("0+2+0", &[ch("M+030", 30.0, 0.0), ch("M-030", -30.0, 0.0)]),
        // System B
        build(
            "0+5+0",
            &[
                ch("M+030", 30.0, 0.0),
                ch("M-030", -30.0, 0.0),
                ch("M+000", 0.0, 0.0),
                lfe("LFE1", 45.0),
                ch_r("M+110", 110.0, 0.0, (100.0, 120.0), (0.0, 15.0)),
                ch_r("M-110", -110.0, 0.0, (-120.0, -100.0), (0.0, 15.0)),
            ],
        ),
        // System C
        build(
            "2+5+0",
            &[
                ch("M+030", 30.0, 0.0),
                ch("M-030", -30.0, 0.0),
                ch("M+000", 0.0, 0.0),
                lfe("LFE1", 45.0),
                ch_r("M+110", 110.0, 0.0, (100.0, 120.0), (0.0, 15.0)),
                ch_r("M-110", -110.0, 0.0, (-120.0, -100.0), (0.0, 15.0)),
                ch_r("U+030", 30.0, 30.0, (30.0, 45.0), (30.0, 55.0)),
                ch_r("U-030", -30.0, 30.0, (-45.0, -30.0), (30.0, 55.0)),
            ],
        ),
        // System D
        build(
            "4+5+0",
            &[
                ch("M+030", 30.0, 0.0),
                ch("M-030", -30.0, 0.0),
                ch("M+000", 0.0, 0.0),
                lfe("LFE1", 45.0),
                ch_r("M+110", 110.0, 0.0, (100.0, 120.0), (0.0, 15.0)),
                ch_r("M-110", -110.0, 0.0, (-120.0, -100.0), (0.0, 15.0)),
                ch_r("U+030", 30.0, 30.0, (30.0, 45.0), (30.0, 55.0)),
                ch_r("U-030", -30.0, 30.0, (-45.0, -30.0), (30.0, 55.0)),
                ch_r("U+110", 110.0, 30.0, (100.0, 135.0), (30.0, 55.0)),
                ch_r("U-110", -110.0, 30.0, (-135.0, -100.0), (30.0, 55.0)),
            ],
        ),
        // System E
        build(
            "4+5+1",
            &[
                ch("M+030", 30.0, 0.0),
                ch("M-030", -30.0, 0.0),
                ch("M+000", 0.0, 0.0),
                lfe("LFE1", 45.0),
                ch_r("M+110", 110.0, 0.0, (100.0, 120.0), (0.0, 15.0)),
                ch_r("M-110", -110.0, 0.0, (-120.0, -100.0), (0.0, 15.0)),
                ch_r("U+030", 30.0, 30.0, (30.0, 45.0), (30.0, 55.0)),
                ch_r("U-030", -30.0, 30.0, (-45.0, -30.0), (30.0, 55.0)),
                ch_r("U+110", 110.0, 30.0, (100.0, 135.0), (30.0, 55.0)),
                ch_r("U-110", -110.0, 30.0, (-135.0, -100.0), (30.0, 55.0)),
                ch_r("B+000", 0.0, -30.0, (0.0, 0.0), (-30.0, -15.0)),
            ],
        ),
        // System F
        build(
            "3+7+0",
            &[
                ch("M+000", 0.0, 0.0),
                ch("M+030", 30.0, 0.0),
                ch("M-030", -30.0, 0.0),
                ch_r("U+045", 45.0, 30.0, (30.0, 45.0), (30.0, 55.0)),
                ch_r("U-045", -45.0, 30.0, (-45.0, -30.0), (30.0, 55.0)),
                ch_r("M+090", 90.0, 0.0, (60.0, 110.0), (0.0, 15.0)),
                ch_r("M-090", -90.0, 0.0, (-110.0, -60.0), (0.0, 15.0)),
                ch_r("M+135", 135.0, 0.0, (110.0, 150.0), (0.0, 15.0)),
                ch_r("M-135", -135.0, 0.0, (-150.0, -110.0), (0.0, 15.0)),
                ch_r("UH+180", 180.0, 45.0, (180.0, 180.0), (45.0, 90.0)),
                lfe("LFE1", 45.0),
                lfe("LFE2", -45.0),
            ],
        ),
        // System G
        build(
            "4+9+0",
            &[
                ch("M+030", 30.0, 0.0),
                ch("M-030", -30.0, 0.0),
                ch("M+000", 0.0, 0.0),
                lfe("LFE1", 45.0),
                ch_r("M+090", 90.0, 0.0, (85.0, 110.0), (0.0, 15.0)),
                ch_r("M-090", -90.0, 0.0, (-110.0, -85.0), (0.0, 15.0)),
                ch_r("M+135", 135.0, 0.0, (120.0, 150.0), (0.0, 15.0)),
                ch_r("M-135", -135.0, 0.0, (-150.0, -120.0), (0.0, 15.0)),
                ch_r("U+045", 45.0, 30.0, (30.0, 45.0), (30.0, 55.0)),
                ch_r("U-045", -45.0, 30.0, (-45.0, -30.0), (30.0, 55.0)),
                ch_r("U+135", 135.0, 30.0, (100.0, 150.0), (30.0, 55.0)),
                ch_r("U-135", -135.0, 30.0, (-150.0, -100.0), (30.0, 55.0)),
                ch_r("M+SC", 15.0, 0.0, (5.0, 25.0), (0.0, 0.0)),
                ch_r("M-SC", -15.0, 0.0, (-25.0, -5.0), (0.0, 0.0)),
            ],
        ),
        // System H
        build(
            "9+10+3",
            &[
                ch_r("M+060", 60.0, 0.0, (45.0, 60.0), (0.0, 5.0)),
                ch_r("M-060", -60.0, 0.0, (-60.0, -45.0), (0.0, 5.0)),
                ch_r("M+000", 0.0, 0.0, (0.0, 0.0), (0.0, 5.0)),
                lfe("LFE1", 45.0),
                ch_r("M+135", 135.0, 0.0, (110.0, 135.0), (0.0, 15.0)),
                ch_r("M-135", -135.0, 0.0, (-135.0, -110.0), (0.0, 15.0)),
                ch_r("M+030", 30.0, 0.0, (22.5, 30.0), (0.0, 5.0)),
                ch_r("M-030", -30.0, 0.0, (-30.0, -22.5), (0.0, 5.0)),
                ch_r("M+180", 180.0, 0.0, (180.0, 180.0), (0.0, 15.0)),
                lfe("LFE2", -45.0),
                ch_r("M+090", 90.0, 0.0, (90.0, 90.0), (0.0, 15.0)),
                ch_r("M-090", -90.0, 0.0, (-90.0, -90.0), (0.0, 15.0)),
                ch_r("U+045", 45.0, 30.0, (45.0, 60.0), (30.0, 45.0)),
                ch_r("U-045", -45.0, 30.0, (-60.0, -45.0), (30.0, 45.0)),
                ch_r("U+000", 0.0, 30.0, (0.0, 0.0), (30.0, 45.0)),
                ch_r("T+000", 0.0, 90.0, (-180.0, 180.0), (90.0, 90.0)),
                ch_r("U+135", 135.0, 30.0, (110.0, 135.0), (30.0, 45.0)),
                ch_r("U-135", -135.0, 30.0, (-135.0, -110.0), (30.0, 45.0)),
                ch_r("U+090", 90.0, 30.0, (90.0, 90.0), (30.0, 45.0)),
                ch_r("U-090", -90.0, 30.0, (-90.0, -90.0), (30.0, 45.0)),
                ch_r("U+180", 180.0, 30.0, (180.0, 180.0), (30.0, 45.0)),
                ch_r("B+000", 0.0, -30.0, (0.0, 0.0), (-30.0, -15.0)),
                ch_r("B+045", 45.0, -30.0, (45.0, 60.0), (-30.0, -15.0)),
                ch_r("B-045", -45.0, -30.0, (-60.0, -45.0), (-30.0, -15.0)),
            ],
        ),
        // System I
        build(
            "0+7+0",
            &[
                ch("M+030", 30.0, 0.0),
                ch("M-030", -30.0, 0.0),
                ch("M+000", 0.0, 0.0),
                lfe("LFE1", 45.0),
                ch_r("M+090", 90.0, 0.0, (85.0, 110.0), (0.0, 15.0)),
                ch_r("M-090", -90.0, 0.0, (-110.0, -85.0), (0.0, 15.0)),
                ch_r("M+135", 135.0, 0.0, (120.0, 150.0), (0.0, 15.0)),
                ch_r("M-135", -135.0, 0.0, (-150.0, -120.0), (0.0, 15.0)),
            ],
        ),
        // System J
        build(
            "4+7+0",
            &[
                ch("M+030", 30.0, 0.0),
                ch("M-030", -30.0, 0.0),
                ch("M+000", 0.0, 0.0),
                lfe("LFE1", 45.0),
                ch_r("M+090", 90.0, 0.0, (85.0, 110.0), (0.0, 15.0)),
                ch_r("M-090", -90.0, 0.0, (-110.0, -85.0), (0.0, 15.0)),
                ch_r("M+135", 135.0, 0.0, (120.0, 150.0), (0.0, 15.0)),
                ch_r("M-135", -135.0, 0.0, (-150.0, -120.0), (0.0, 15.0)),
                ch_r("U+045", 45.0, 30.0, (30.0, 45.0), (30.0, 55.0)),
                ch_r("U-045", -45.0, 30.0, (-45.0, -30.0), (30.0, 55.0)),
                ch_r("U+135", 135.0, 30.0, (100.0, 150.0), (30.0, 55.0)),
                ch_r("U-135", -135.0, 30.0, (-150.0, -100.0), (30.0, 55.0)),
            ],
        ),
    ]
});

/// Names of all available layouts, in BS.2051 order.
pub fn layout_names() -> Vec<&'static str> {
    LAYOUTS.iter().map(|l| l.name.as_str()).collect()
}

/// Get data for a layout specified in BS.2051.
///
/// Real speaker positions are set to the nominal positions.
pub fn get_layout(name: &str) -> CoreResult<Layout> {
    LAYOUTS
        .iter()
        .find(|l| l.name == name)
        .cloned()
        .ok_or_else(|| CoreError::UnknownLayout(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::relative_angle;

    #[test]
    fn test_get_layout_data() {
        let layout = get_layout("4+5+0").unwrap();
        assert_eq!(&layout.channel_names()[..2], &["M+030", "M-030"]);
        assert_eq!(layout.channels.len(), 10);
        assert_eq!(layout.channels[0].polar_position, PolarPosition::new(30.0, 0.0, 1.0));
        assert_eq!(layout.channels[1].polar_position, PolarPosition::new(-30.0, 0.0, 1.0));
    }

    #[test]
    fn test_layout_names() {
        assert!(layout_names().contains(&"4+5+0"));
        assert_eq!(layout_names().len(), 10);
    }

    #[test]
    fn test_unknown_layout() {
        assert!(matches!(get_layout("wat"), Err(CoreError::UnknownLayout(_))));
    }

    #[test]
    fn test_all_positions_in_range() {
        for name in layout_names() {
            get_layout(name).unwrap().check_positions().unwrap();
        }
    }

    #[test]
    fn test_azimuth_ranges_not_inverted() {
        // screen speakers and LFE channels excepted, ranges should be small
        for name in layout_names() {
            for channel in &get_layout(name).unwrap().channels {
                // a speaker at the pole has indeterminate azimuth
                if channel.polar_nominal_position.elevation.abs() >= 90.0 {
                    continue;
                }
                if !channel.is_lfe && !channel.name.contains("SC") {
                    let (lo, hi) = channel.az_range;
                    assert!(relative_angle(lo, hi) - lo <= 180.0, "{}", channel.name);
                }
            }
        }
    }

    #[test]
    fn test_symmetry() {
        // paired speakers should have mirrored positions and ranges
        for name in layout_names() {
            let layout = get_layout(name).unwrap();
            for channel in &layout.channels {
                if channel.is_lfe {
                    continue;
                }
                let az = channel.polar_position.azimuth;
                if az == 0.0 || az == 180.0 || az == -180.0 {
                    continue;
                }

                let mirror_name: String = if channel.name.contains('+') {
                    channel.name.replace('+', "-")
                } else {
                    channel.name.replace('-', "+")
                };
                let mirror = layout
                    .channels
                    .iter()
                    .find(|c| c.name == mirror_name)
                    .unwrap_or_else(|| panic!("no mirror for {} in {}", channel.name, name));

                assert_eq!(mirror.polar_position.azimuth, -az);
                assert_eq!(mirror.polar_position.elevation, channel.polar_position.elevation);
                assert_eq!(mirror.az_range, (-channel.az_range.1, -channel.az_range.0));
                assert_eq!(mirror.el_range, channel.el_range);
            }
        }
    }
}
