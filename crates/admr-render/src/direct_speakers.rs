//! DirectSpeakers panning
//!
//! Maps a speaker label or a bounded nominal position to one output channel,
//! or to a set of channels through the BS.2051 downmix rules when the
//! content comes from a known common-definitions pack. Cartesian positions
//! match against the allocentric speaker grid.

use admr_core::geom::inside_angle_range;
use admr_core::layout::Layout;
use admr_core::{Vec3, Warnings};

use admr_model::blocks::DirectSpeakerPosition;
use admr_model::elements::Frequency;
use admr_model::items::DirectSpeakersTypeMetadata;

use crate::allocentric::{self, AllocentricPanner};
use crate::error::RenderResult;
use crate::point_source::{self, PointSourcePanner};
use crate::screen::ScreenEdgeLockHandler;

/// Remap a speaker label to a set of output gains if all the target
/// loudspeakers exist and the input/output layouts match.
struct MappingRule {
    speaker_label: &'static str,
    gains: &'static [(&'static str, f64)],
    input_layouts: Option<&'static [&'static str]>,
    output_layouts: Option<&'static [&'static str]>,
}

const RT1_2: f64 = std::f64::consts::FRAC_1_SQRT_2;
// sqrt(1/3), sqrt(2/3) and 1/2 for the asymmetric rules
const RT1_3: f64 = 0.5773502691896258;
const RT2_3: f64 = 0.816496580927726;
const HALF: f64 = 0.5;

/// The mapping rules of BS.2127 table 8, before symmetric expansion.
const RULES: &[MappingRule] = &[
    MappingRule { speaker_label: "M+000", gains: &[("M+000", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "M+000", gains: &[("M+030", RT1_2), ("M-030", RT1_2)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "M+060", gains: &[("M+060", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "M+060", gains: &[("M+030", RT2_3), ("M+110", RT1_3)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "M+060", gains: &[("M+030", RT1_2), ("M+090", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "M+060", gains: &[("M+030", 1.0)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "M+090", gains: &[("M+090", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "M+090", gains: &[("M+030", RT1_3), ("M+110", RT2_3)], input_layouts: Some(&["9+10+3"]), output_layouts: None },
    MappingRule { speaker_label: "M+090", gains: &[("M+030", RT1_2), ("M+110", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "M+090", gains: &[("M+030", RT1_2)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "M+110", gains: &[("M+110", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "M+110", gains: &[("M+135", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "M+110", gains: &[("M+030", RT1_2)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "M+135", gains: &[("M+135", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "M+135", gains: &[("M+110", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "M+135", gains: &[("M+030", RT1_2)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "M+180", gains: &[("M+180", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "M+180", gains: &[("M+135", RT1_2), ("M-135", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "M+180", gains: &[("M+110", RT1_2), ("M-110", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "M+180", gains: &[("M+030", HALF), ("M-030", HALF)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "U+000", gains: &[("U+000", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+000", gains: &[("U+030", RT1_2), ("U-030", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+000", gains: &[("U+045", RT1_2), ("U-045", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+000", gains: &[("M+000", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+000", gains: &[("M+030", RT1_2), ("M-030", RT1_2)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "U+030", gains: &[("U+030", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+030", gains: &[("U+045", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+030", gains: &[("M+030", 1.0)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "U+045", gains: &[("U+045", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+045", gains: &[("U+030", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+045", gains: &[("M+030", 1.0)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "U+090", gains: &[("U+090", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+090", gains: &[("U+045", RT2_3), ("UH+180", RT1_3)], input_layouts: Some(&["9+10+3"]), output_layouts: None },
    MappingRule { speaker_label: "U+090", gains: &[("U+030", RT1_2), ("U+110", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+090", gains: &[("U+045", RT1_2), ("U+135", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+090", gains: &[("M+090", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+090", gains: &[("U+030", RT1_2), ("M+110", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+090", gains: &[("M+030", RT1_2), ("M+110", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+090", gains: &[("M+030", RT1_2)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "U+110", gains: &[("U+110", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+110", gains: &[("U+135", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+110", gains: &[("U+045", RT1_2), ("UH+180", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+110", gains: &[("M+110", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+110", gains: &[("M+135", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+110", gains: &[("M+030", RT1_2)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "U+135", gains: &[("U+135", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+135", gains: &[("U+110", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+135", gains: &[("U+045", RT1_3), ("UH+180", RT2_3)], input_layouts: Some(&["9+10+3"]), output_layouts: None },
    MappingRule { speaker_label: "U+135", gains: &[("U+045", RT1_2), ("UH+180", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+135", gains: &[("M+135", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+135", gains: &[("M+110", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+135", gains: &[("M+030", RT1_2)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "U+180", gains: &[("U+180", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+180", gains: &[("UH+180", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+180", gains: &[("U+135", RT1_2), ("U-135", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+180", gains: &[("U+110", RT1_2), ("U-110", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+180", gains: &[("M+135", RT1_2), ("M-135", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+180", gains: &[("M+110", RT1_2), ("M-110", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "U+180", gains: &[("M+030", HALF), ("M-030", HALF)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "UH+180", gains: &[("UH+180", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "UH+180", gains: &[("U+180", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "UH+180", gains: &[("U+135", RT1_2), ("U-135", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "UH+180", gains: &[("U+110", RT1_2), ("U-110", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "UH+180", gains: &[("M+135", RT1_2), ("M-135", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "UH+180", gains: &[("M+110", RT1_2), ("M-110", RT1_2)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "UH+180", gains: &[("M+030", HALF), ("M-030", HALF)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "T+000", gains: &[("T+000", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "T+000", gains: &[("U+045", HALF), ("U-045", HALF), ("U+135", HALF), ("U-135", HALF)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "T+000", gains: &[("U+030", HALF), ("U-030", HALF), ("U+110", HALF), ("U-110", HALF)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "T+000", gains: &[("U+045", RT1_3), ("U-045", RT1_3), ("UH+180", RT1_3)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "T+000", gains: &[("U+045", HALF), ("U-045", HALF), ("M+135", HALF), ("M-135", HALF)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "T+000", gains: &[("U+030", HALF), ("U-030", HALF), ("M+110", HALF), ("M-110", HALF)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "T+000", gains: &[("M+030", HALF), ("M-030", HALF), ("M+135", HALF), ("M-135", HALF)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "T+000", gains: &[("M+030", HALF), ("M-030", HALF), ("M+110", HALF), ("M-110", HALF)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "T+000", gains: &[("M+030", HALF), ("M-030", HALF)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "B+000", gains: &[("B+000", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "B+000", gains: &[("M+000", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "B+000", gains: &[("M+030", RT1_2), ("M-030", RT1_2)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "B+045", gains: &[("B+045", 1.0)], input_layouts: None, output_layouts: None },
    MappingRule { speaker_label: "B+045", gains: &[("M+030", 1.0)], input_layouts: None, output_layouts: None },

    MappingRule { speaker_label: "LFE1", gains: &[("LFE1", 1.0)], input_layouts: Some(&["9+10+3", "3+7+0"]), output_layouts: Some(&["9+10+3", "3+7+0"]) },
    MappingRule { speaker_label: "LFE2", gains: &[("LFE2", 1.0)], input_layouts: Some(&["9+10+3", "3+7+0"]), output_layouts: Some(&["9+10+3", "3+7+0"]) },
    MappingRule { speaker_label: "LFE1", gains: &[("LFE1", RT1_2)], input_layouts: Some(&["9+10+3", "3+7+0"]), output_layouts: None },
    MappingRule { speaker_label: "LFE2", gains: &[("LFE1", RT1_2)], input_layouts: Some(&["9+10+3", "3+7+0"]), output_layouts: None },
    MappingRule { speaker_label: "LFE1", gains: &[("LFE1", 1.0)], input_layouts: None, output_layouts: None },
];

fn opposite_name(name: &str) -> String {
    if name.ends_with("000") || name.ends_with("180") {
        name.to_owned()
    } else if name.contains('+') {
        name.replace('+', "-")
    } else {
        name.replace('-', "+")
    }
}

/// A rule together with its left/right mirror, if that differs.
struct ExpandedRule {
    speaker_label: String,
    gains: Vec<(String, f64)>,
    input_layouts: Option<&'static [&'static str]>,
    output_layouts: Option<&'static [&'static str]>,
}

fn expanded_rules() -> Vec<ExpandedRule> {
    let mut out = Vec::new();

    for rule in RULES {
        out.push(ExpandedRule {
            speaker_label: rule.speaker_label.to_owned(),
            gains: rule.gains.iter().map(|&(n, g)| (n.to_owned(), g)).collect(),
            input_layouts: rule.input_layouts,
            output_layouts: rule.output_layouts,
        });

        let mirror_label = opposite_name(rule.speaker_label);
        let mirror_gains: Vec<(String, f64)> = rule
            .gains
            .iter()
            .map(|&(n, g)| (opposite_name(n), g))
            .collect();

        let mut sorted_a: Vec<_> = rule.gains.iter().map(|&(n, g)| (n.to_owned(), g)).collect();
        let mut sorted_b = mirror_gains.clone();
        sorted_a.sort_by(|a, b| a.partial_cmp(b).unwrap());
        sorted_b.sort_by(|a, b| a.partial_cmp(b).unwrap());

        if mirror_label != rule.speaker_label || sorted_a != sorted_b {
            out.push(ExpandedRule {
                speaker_label: mirror_label,
                gains: mirror_gains,
                input_layouts: rule.input_layouts,
                output_layouts: rule.output_layouts,
            });
        }
    }

    out
}

/// Determine if a channel is LFE from its frequency metadata.
pub fn frequency_is_lfe(frequency: &Frequency) -> bool {
    matches!(frequency.low_pass, Some(low_pass) if low_pass <= 200.0) && frequency.high_pass.is_none()
}

/// Panner for DirectSpeakers content.
pub struct DirectSpeakersPanner {
    layout: Layout,
    psp: PointSourcePanner,
    allo_psp: AllocentricPanner,
    allo_positions: Vec<Vec3>,
    screen_edge_lock: ScreenEdgeLockHandler,
    rules: Vec<ExpandedRule>,
    /// index of each non-LFE channel in the full channel list
    non_lfe_indices: Vec<usize>,
}

impl DirectSpeakersPanner {
    pub fn new(layout: &Layout) -> RenderResult<Self> {
        let without_lfe = layout.without_lfe();

        Ok(Self {
            layout: layout.clone(),
            psp: point_source::configure(&without_lfe)?,
            allo_psp: allocentric::configure_allocentric(&without_lfe)?,
            allo_positions: allocentric::positions_for_layout(layout)?,
            screen_edge_lock: ScreenEdgeLockHandler::new(layout.screen.as_ref(), layout)?,
            rules: expanded_rules(),
            non_lfe_indices: (0..layout.num_channels())
                .filter(|&i| !layout.channels[i].is_lfe)
                .collect(),
        })
    }

    pub fn num_channels(&self) -> usize {
        self.layout.num_channels()
    }

    /// The BS.2051 speaker label of an ADM speaker label: URNs are parsed
    /// and alternative LFE notations normalised.
    pub fn nominal_speaker_label(label: &str) -> &str {
        let label = label
            .strip_prefix("urn:itu:bs:2051:")
            .and_then(|rest| rest.split_once(":speaker:").map(|(_, l)| l))
            .unwrap_or(label);

        match label {
            "LFE" | "LFEL" => "LFE1",
            "LFER" => "LFE2",
            other => other,
        }
    }

    fn is_lfe_channel(&self, meta: &DirectSpeakersTypeMetadata, warnings: &mut Warnings) -> bool {
        let has_lfe_freq = frequency_is_lfe(&meta.extra_data.channel_frequency);
        if !has_lfe_freq
            && (meta.extra_data.channel_frequency.low_pass.is_some()
                || meta.extra_data.channel_frequency.high_pass.is_some())
        {
            warnings.warn("not treating channel with frequency information as LFE");
        }

        let has_lfe_name = meta
            .block_format
            .speaker_labels
            .iter()
            .any(|l| matches!(Self::nominal_speaker_label(l), "LFE1" | "LFE2"));

        if has_lfe_freq != has_lfe_name && !meta.block_format.speaker_labels.is_empty() {
            warnings.warn("LFE indication from frequency element does not match speakerLabel");
        }

        has_lfe_freq || has_lfe_name
    }

    /// Bit mask of channels within the bounds of a position.
    fn channels_within_bounds(&self, position: &DirectSpeakerPosition, tol: f64) -> Vec<bool> {
        match position {
            DirectSpeakerPosition::Polar(p) => {
                let (az_min, az_max) = (p.bounded_azimuth.min_value(), p.bounded_azimuth.max_value());
                let (el_min, el_max) =
                    (p.bounded_elevation.min_value(), p.bounded_elevation.max_value());
                let (dist_min, dist_max) =
                    (p.bounded_distance.min_value(), p.bounded_distance.max_value());

                self.layout
                    .channels
                    .iter()
                    .map(|c| {
                        let az = c.polar_nominal_position.azimuth;
                        let el = c.polar_nominal_position.elevation;
                        let dist = c.polar_nominal_position.distance;

                        // speakers at the poles match any azimuth range
                        (inside_angle_range(az, az_min, az_max, tol) || el.abs() >= 90.0 - tol)
                            && el > el_min - tol
                            && el < el_max + tol
                            && dist > dist_min - tol
                            && dist < dist_max + tol
                    })
                    .collect()
            }
            DirectSpeakerPosition::Cartesian(p) => {
                let mins = [p.bounded_x.min_value(), p.bounded_y.min_value(), p.bounded_z.min_value()];
                let maxs = [p.bounded_x.max_value(), p.bounded_y.max_value(), p.bounded_z.max_value()];

                self.allo_positions
                    .iter()
                    .map(|pos| {
                        let c = pos.as_array();
                        (0..3).all(|i| c[i] + tol >= mins[i] && c[i] - tol <= maxs[i])
                    })
                    .collect()
            }
        }
    }

    /// The unique closest candidate channel to a position, or `None` when
    /// several are equally close.
    fn closest_channel_index(
        positions: &[Vec3],
        target: Vec3,
        candidates: &[bool],
        tol: f64,
    ) -> Option<usize> {
        let distances: Vec<(usize, f64)> = positions
            .iter()
            .enumerate()
            .filter(|(i, _)| candidates[*i])
            .map(|(i, &p)| (i, (p - target).norm()))
            .collect();

        let &(min_idx, min_dist) = distances
            .iter()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())?;

        let within_tol = distances
            .iter()
            .filter(|(_, d)| (d - min_dist).abs() < tol)
            .count();

        (within_tol == 1).then_some(min_idx)
    }

    fn apply_screen_edge_lock(&self, position: &DirectSpeakerPosition) -> DirectSpeakerPosition {
        match position {
            DirectSpeakerPosition::Polar(p) => {
                let (az, el) =
                    self.screen_edge_lock
                        .handle_az_el(p.azimuth(), p.elevation(), p.screen_edge_lock);

                let mut out = *p;
                out.bounded_azimuth.value = az;
                out.bounded_elevation.value = el;
                DirectSpeakerPosition::Polar(out)
            }
            DirectSpeakerPosition::Cartesian(p) => {
                let locked = self.screen_edge_lock.handle_vector(
                    Vec3::new(p.bounded_x.value, p.bounded_y.value, p.bounded_z.value),
                    p.screen_edge_lock,
                    true,
                );

                let mut out = *p;
                out.bounded_x.value = locked.x;
                out.bounded_y.value = locked.y;
                out.bounded_z.value = locked.z;
                DirectSpeakerPosition::Cartesian(out)
            }
        }
    }

    fn one_hot(&self, index: usize) -> Vec<f64> {
        let mut pv = vec![0.0; self.layout.num_channels()];
        pv[index] = 1.0;
        pv
    }

    /// Compute the output gain vector for one DirectSpeakers block.
    pub fn handle(
        &self,
        meta: &DirectSpeakersTypeMetadata,
        warnings: &mut Warnings,
    ) -> RenderResult<Vec<f64>> {
        let tol = 1e-5;
        let block = &meta.block_format;
        let n = self.layout.num_channels();

        let is_lfe_channel = self.is_lfe_channel(meta, warnings);

        if !is_lfe_channel
            && block
                .speaker_labels
                .iter()
                .any(|l| l.to_uppercase().contains("LFE"))
        {
            warnings.warn(format!(
                "block {} not being treated as LFE, but has 'LFE' in a speakerLabel; \
                 use an ITU speakerLabel or audioChannelFormat frequency element instead",
                block.id
            ));
        }

        // content from a known common-definitions pack uses the mapping
        // rules
        if let Some(itu_layout) = &meta.itu_pack_layout {
            if let Some(first_label) = block.speaker_labels.first() {
                let nominal_label = Self::nominal_speaker_label(first_label);

                for rule in &self.rules {
                    if rule.speaker_label != nominal_label {
                        continue;
                    }
                    if let Some(inputs) = rule.input_layouts {
                        if !inputs.contains(&itu_layout.as_str()) {
                            continue;
                        }
                    }
                    if let Some(outputs) = rule.output_layouts {
                        if !outputs.contains(&self.layout.name.as_str()) {
                            continue;
                        }
                    }
                    let channel_indices: Option<Vec<usize>> = rule
                        .gains
                        .iter()
                        .map(|(name, _)| self.layout.channel_index(name))
                        .collect();
                    if let Some(indices) = channel_indices {
                        let mut pv = vec![0.0; n];
                        for (&i, (_, gain)) in indices.iter().zip(&rule.gains) {
                            pv[i] = *gain;
                        }
                        return Ok(pv);
                    }
                }
            }
        }

        // a speakerLabel matching a channel name routes 1:1; earlier labels
        // have higher priority
        for label in &block.speaker_labels {
            let nominal_label = Self::nominal_speaker_label(label);
            if let Some(index) = self.layout.channel_index(nominal_label) {
                if self.layout.channels[index].is_lfe == is_lfe_channel {
                    return Ok(self.one_hot(index));
                }
            }
        }

        // otherwise find the closest speaker of the right kind within the
        // position bounds
        let shifted_position = self.apply_screen_edge_lock(&block.position);

        let mut within_bounds = self.channels_within_bounds(&shifted_position, tol);
        for (w, channel) in within_bounds.iter_mut().zip(&self.layout.channels) {
            *w = *w && (channel.is_lfe == is_lfe_channel);
        }

        if within_bounds.iter().any(|&b| b) {
            let (positions, target): (Vec<Vec3>, Vec3) = match &shifted_position {
                DirectSpeakerPosition::Polar(p) => (
                    self.layout
                        .channels
                        .iter()
                        .map(|c| c.nominal_position())
                        .collect(),
                    p.as_cartesian(),
                ),
                DirectSpeakerPosition::Cartesian(p) => (
                    self.allo_positions.clone(),
                    Vec3::new(p.bounded_x.value, p.bounded_y.value, p.bounded_z.value),
                ),
            };

            if let Some(closest) =
                Self::closest_channel_index(&positions, target, &within_bounds, tol)
            {
                return Ok(self.one_hot(closest));
            }
        }

        // LFE content falls back to LFE1 or is discarded; other content
        // falls back to the point source panner
        if is_lfe_channel {
            return Ok(match self.layout.channel_index("LFE1") {
                Some(index) => self.one_hot(index),
                None => vec![0.0; n],
            });
        }

        let gains = match &shifted_position {
            DirectSpeakerPosition::Polar(p) => self.psp.handle_or_err(p.as_cartesian())?,
            DirectSpeakerPosition::Cartesian(p) => self
                .allo_psp
                .handle(Vec3::new(p.bounded_x.value, p.bounded_y.value, p.bounded_z.value)),
        };

        let mut pv = vec![0.0; n];
        for (&i, g) in self.non_lfe_indices.iter().zip(gains) {
            pv[i] = g;
        }
        Ok(pv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admr_core::bs2051;
    use admr_model::blocks::{
        BoundCoordinate, DirectSpeakerPolarPosition, DirectSpeakersBlock, ScreenEdgeLock,
    };
    use admr_model::items::ExtraData;

    fn panner(name: &str) -> (Layout, DirectSpeakersPanner) {
        let layout = bs2051::get_layout(name).unwrap();
        let panner = DirectSpeakersPanner::new(&layout).unwrap();
        (layout, panner)
    }

    fn block(labels: &[&str], az: f64, el: f64) -> DirectSpeakersBlock {
        DirectSpeakersBlock {
            id: "AB_1".into(),
            rtime: None,
            duration: None,
            position: DirectSpeakerPosition::polar(az, el),
            speaker_labels: labels.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    fn meta(block: DirectSpeakersBlock) -> DirectSpeakersTypeMetadata {
        DirectSpeakersTypeMetadata {
            block_format: block,
            itu_pack_layout: None,
            extra_data: ExtraData::default(),
        }
    }

    #[test]
    fn test_label_routes_one_to_one() {
        let (layout, panner) = panner("0+5+0");
        let mut warnings = Warnings::new();

        let pv = panner
            .handle(&meta(block(&["M+030"], 30.0, 0.0)), &mut warnings)
            .unwrap();
        let i = layout.channel_index("M+030").unwrap();
        assert_eq!(pv[i], 1.0);
        assert_eq!(pv.iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn test_urn_label() {
        let (layout, panner) = panner("0+5+0");
        let mut warnings = Warnings::new();

        let pv = panner
            .handle(
                &meta(block(&["urn:itu:bs:2051:0:speaker:M+030"], 30.0, 0.0)),
                &mut warnings,
            )
            .unwrap();
        assert_eq!(pv[layout.channel_index("M+030").unwrap()], 1.0);
    }

    #[test]
    fn test_bounds_matching() {
        let (layout, panner) = panner("0+5+0");
        let mut warnings = Warnings::new();

        // no label, but bounds that admit M-030 only
        let mut b = block(&[], -28.0, 0.0);
        b.position = DirectSpeakerPosition::Polar(DirectSpeakerPolarPosition {
            bounded_azimuth: BoundCoordinate { value: -28.0, min: Some(-45.0), max: Some(-15.0) },
            bounded_elevation: BoundCoordinate::exact(0.0),
            bounded_distance: BoundCoordinate::exact(1.0),
            screen_edge_lock: ScreenEdgeLock::default(),
        });

        let pv = panner.handle(&meta(b), &mut warnings).unwrap();
        assert_eq!(pv[layout.channel_index("M-030").unwrap()], 1.0);
    }

    #[test]
    fn test_fallback_to_point_source() {
        let (layout, panner) = panner("0+5+0");
        let mut warnings = Warnings::new();

        // an unknown label at an off-speaker position pans
        let pv = panner
            .handle(&meta(block(&["M+015"], 15.0, 0.0)), &mut warnings)
            .unwrap();

        let left = layout.channel_index("M+030").unwrap();
        let centre = layout.channel_index("M+000").unwrap();
        assert!(pv[left] > 0.0 && pv[centre] > 0.0);
        let power: f64 = pv.iter().map(|g| g * g).sum();
        assert!((power - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_lfe_name_warning() {
        let (_, panner) = panner("0+5+0");
        let mut warnings = Warnings::new();

        // "LFE" in a non-standard label without frequency info warns
        let pv = panner
            .handle(&meta(block(&["MyLFEChannel"], 0.0, -20.0)), &mut warnings)
            .unwrap();
        assert!(!warnings.is_empty());
        let _ = pv;
    }

    #[test]
    fn test_lfe_routes_to_lfe1() {
        let (layout, panner) = panner("0+5+0");
        let mut warnings = Warnings::new();

        let pv = panner
            .handle(&meta(block(&["LFE"], 45.0, -30.0)), &mut warnings)
            .unwrap();
        assert_eq!(pv[layout.channel_index("LFE1").unwrap()], 1.0);
    }

    #[test]
    fn test_lfe_discarded_without_output() {
        let (_, panner) = panner("0+2+0");
        let mut warnings = Warnings::new();

        let pv = panner
            .handle(&meta(block(&["LFE"], 45.0, -30.0)), &mut warnings)
            .unwrap();
        assert!(pv.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_itu_downmix_rule() {
        // M+110 content from the 0+5+0 common pack into 0+2+0 uses the
        // downmix rules rather than the panner
        let (layout, panner) = panner("0+2+0");
        let mut warnings = Warnings::new();

        let mut m = meta(block(&["M+110"], 110.0, 0.0));
        m.itu_pack_layout = Some("0+5+0".to_owned());

        let pv = panner.handle(&m, &mut warnings).unwrap();
        let left = layout.channel_index("M+030").unwrap();
        assert!((pv[left] - RT1_2).abs() < 1e-10);
        assert_eq!(pv[layout.channel_index("M-030").unwrap()], 0.0);
    }

    #[test]
    fn test_symmetric_rule_expansion() {
        // the mirrored rule for M-110 must exist
        let (layout, panner) = panner("0+2+0");
        let mut warnings = Warnings::new();

        let mut m = meta(block(&["M-110"], -110.0, 0.0));
        m.itu_pack_layout = Some("0+5+0".to_owned());

        let pv = panner.handle(&m, &mut warnings).unwrap();
        let right = layout.channel_index("M-030").unwrap();
        assert!((pv[right] - RT1_2).abs() < 1e-10);
    }

    #[test]
    fn test_mono_to_stereo_rule() {
        let (layout, panner) = panner("0+2+0");
        let mut warnings = Warnings::new();

        let mut m = meta(block(&["M+000"], 0.0, 0.0));
        m.itu_pack_layout = Some("0+1+0".to_owned());

        let pv = panner.handle(&m, &mut warnings).unwrap();
        assert!((pv[layout.channel_index("M+030").unwrap()] - RT1_2).abs() < 1e-10);
        assert!((pv[layout.channel_index("M-030").unwrap()] - RT1_2).abs() < 1e-10);
    }
}
