//! Point source panner on a triangulated sphere
//!
//! The real loudspeaker directions are augmented with extra channels filling
//! vertical gaps and virtual speakers at the poles, triangulated via their
//! convex hull, and turned into regions: triplets (VBAP), quads, and ngons
//! around the virtual speakers whose gain is redistributed to real speakers.
//! Stereo uses a dedicated 0+5+0-based downmix.

use admr_core::bs2051;
use admr_core::geom::ngon_vertex_order;
use admr_core::layout::{Channel, Layout};
use admr_core::position::PolarPosition;
use admr_core::Vec3;
use ndarray::Array2;

use crate::convex_hull::{adjacent_verts, convex_hull_facets};
use crate::error::{RenderError, RenderResult};

/// Region handler representing a triplet of loudspeakers, implementing VBAP.
///
/// If `handle(pos)` returns gains x then `sum(x[i] * positions[i])` is
/// collinear with pos, all gains are non-negative, and `norm(x) == 1`.
#[derive(Debug, Clone)]
pub struct Triplet {
    pub output_channels: [usize; 3],
    /// rows of the inverse position matrix scaled by 1/det; the barycentric
    /// gain for speaker i is the dot of the position with `basis[i]`
    basis: [Vec3; 3],
}

impl Triplet {
    pub fn new(output_channels: [usize; 3], positions: [Vec3; 3]) -> RenderResult<Self> {
        let [r0, r1, r2] = positions;
        let det = r0.dot(r1.cross(r2));
        if det.abs() < 1e-9 {
            return Err(RenderError::InvalidLayout(
                "triplet of colinear loudspeaker positions".into(),
            ));
        }

        Ok(Self {
            output_channels,
            basis: [
                r1.cross(r2) * (1.0 / det),
                r2.cross(r0) * (1.0 / det),
                r0.cross(r1) * (1.0 / det),
            ],
        })
    }

    fn handle(&self, position: Vec3) -> Option<Vec<f64>> {
        let epsilon = -1e-11;
        let mut pv = [
            position.dot(self.basis[0]),
            position.dot(self.basis[1]),
            position.dot(self.basis[2]),
        ];

        if pv.iter().all(|&g| g >= epsilon) {
            let norm = pv.iter().map(|g| g * g).sum::<f64>().sqrt();
            for g in &mut pv {
                *g = (*g / norm).clamp(0.0, 1.0);
            }
            Some(pv.to_vec())
        } else {
            None
        }
    }
}

/// Region handler for n real loudspeakers around a central virtual speaker
/// whose gain is distributed to the real ones.
#[derive(Debug, Clone)]
pub struct VirtualNgon {
    pub output_channels: Vec<usize>,
    centre_downmix: Vec<f64>,
    /// triplets in local channel numbering; index n is the virtual centre
    regions: Vec<Triplet>,
}

impl VirtualNgon {
    pub fn new(
        output_channels: Vec<usize>,
        positions: Vec<Vec3>,
        centre_position: Vec3,
        centre_downmix: Vec<f64>,
    ) -> RenderResult<Self> {
        let n = output_channels.len();
        assert!(n == positions.len() && n == centre_downmix.len());

        let order = ngon_vertex_order(&positions);

        let mut regions = Vec::with_capacity(n);
        for i in 0..n {
            let j = (i + 1) % n;
            regions.push(Triplet::new(
                [order[i], order[j], n],
                [positions[order[i]], positions[order[j]], centre_position],
            )?);
        }

        Ok(Self {
            output_channels,
            centre_downmix,
            regions,
        })
    }

    fn handle(&self, position: Vec3) -> Option<Vec<f64>> {
        let n = self.centre_downmix.len();
        for region in &self.regions {
            if let Some(pv) = region.handle(position) {
                let mut out = vec![0.0; n + 1];
                for (&channel, &g) in region.output_channels.iter().zip(&pv) {
                    out[channel] = g;
                }

                // downmix the virtual centre speaker into the real ones and
                // renormalise
                let centre_gain = out[n];
                out.truncate(n);
                for (g, &dm) in out.iter_mut().zip(&self.centre_downmix) {
                    *g += centre_gain * dm;
                }

                let norm = out.iter().map(|g| g * g).sum::<f64>().sqrt();
                for g in &mut out {
                    *g /= norm;
                }
                return Some(out);
            }
        }
        None
    }
}

/// Region handler for four approximately planar loudspeakers.
#[derive(Debug, Clone)]
pub struct QuadRegion {
    pub output_channels: [usize; 4],
    /// positions in perimeter order
    positions: [Vec3; 4],
    order: [usize; 4],
    pan_x: PanAxis,
    pan_y: PanAxis,
}

/// Polynomial coefficients for panning along one axis of a quad.
#[derive(Debug, Clone, Copy)]
struct PanAxis {
    poly: [Vec3; 3],
}

impl PanAxis {
    fn new(positions: [Vec3; 4]) -> Self {
        let [a, b, c, d] = positions;
        Self {
            poly: [
                (b - a).cross(c - d),
                a.cross(c - d) + (b - a).cross(d),
                a.cross(d),
            ],
        }
    }

    /// Find the panning parameter for a position: the root in [0, 1] of the
    /// quadratic formed by projecting the polynomial onto the position.
    fn handle(&self, position: Vec3) -> Option<f64> {
        let a = self.poly[0].dot(position);
        let b = self.poly[1].dot(position);
        let c = self.poly[2].dot(position);

        let epsilon = 1e-10;
        let in_range = |root: f64| (-epsilon..=1.0 + epsilon).contains(&root);

        if a.abs() < epsilon * (b.abs() + c.abs()).max(1.0) {
            if b.abs() < 1e-30 {
                return None;
            }
            let root = -c / b;
            return in_range(root).then(|| root.clamp(0.0, 1.0));
        }

        // clamp tiny negative discriminants so edge positions keep their
        // repeated real root
        let disc = b * b - 4.0 * a * c;
        let disc = if disc < 0.0 && disc > -1e-9 * (b * b).max(1.0) {
            0.0
        } else {
            disc
        };
        if disc < 0.0 {
            return None;
        }
        let sqrt_disc = disc.sqrt();

        for root in [(-b + sqrt_disc) / (2.0 * a), (-b - sqrt_disc) / (2.0 * a)] {
            if in_range(root) {
                return Some(root.clamp(0.0, 1.0));
            }
        }
        None
    }
}

impl QuadRegion {
    pub fn new(output_channels: [usize; 4], positions: [Vec3; 4]) -> Self {
        let order_vec = ngon_vertex_order(&positions);
        let order = [order_vec[0], order_vec[1], order_vec[2], order_vec[3]];
        let ordered = order.map(|i| positions[i]);

        Self {
            output_channels,
            positions: ordered,
            order,
            pan_x: PanAxis::new(ordered),
            pan_y: PanAxis::new([ordered[1], ordered[2], ordered[3], ordered[0]]),
        }
    }

    fn handle(&self, position: Vec3) -> Option<Vec<f64>> {
        let x = self.pan_x.handle(position)?;
        let y = self.pan_y.handle(position)?;

        let gains_ordered = [
            (1.0 - x) * (1.0 - y),
            x * (1.0 - y),
            x * y,
            (1.0 - x) * y,
        ];

        let mut pvs = [0.0; 4];
        for (i, &o) in self.order.iter().enumerate() {
            pvs[o] = gains_ordered[i];
        }

        // the velocity vector must point towards the source, not away
        let velocity = self
            .positions
            .iter()
            .zip(&gains_ordered)
            .fold(Vec3::ZERO, |acc, (&p, &g)| acc + p * g);
        if velocity.dot(position) <= 0.0 {
            return None;
        }

        let norm = pvs.iter().map(|g| g * g).sum::<f64>().sqrt();
        Some(pvs.iter().map(|g| g / norm).collect())
    }
}

/// Stereo panning region: 0+5+0 panning followed by a BS.775-style downmix
/// with corrected position and energy.
#[derive(Debug)]
pub struct StereoPanDownmix {
    pub left_channel: usize,
    pub right_channel: usize,
    psp: Box<PointSourcePanner>,
}

impl StereoPanDownmix {
    pub fn new(left_channel: usize, right_channel: usize) -> RenderResult<Self> {
        let layout = bs2051::get_layout("0+5+0")
            .expect("0+5+0 is always defined")
            .without_lfe();
        debug_assert_eq!(
            layout.channel_names(),
            vec!["M+030", "M-030", "M+000", "M+110", "M-110"]
        );

        Ok(Self {
            left_channel,
            right_channel,
            psp: Box::new(configure(&layout)?),
        })
    }

    fn handle(&self, position: Vec3) -> Option<Vec<f64>> {
        let pv = self.psp.handle(position)?;

        // centre downmix set to preserve the velocity vector rather than the
        // output power
        let downmix = [
            [1.0, 0.0, 3.0_f64.sqrt() / 3.0, 0.5_f64.sqrt(), 0.0],
            [0.0, 1.0, 3.0_f64.sqrt() / 3.0, 0.0, 0.5_f64.sqrt()],
        ];

        let mut pv_dmix: Vec<f64> = downmix
            .iter()
            .map(|row| row.iter().zip(&pv).map(|(d, g)| d * g).sum())
            .collect();
        let norm = pv_dmix.iter().map(|g: &f64| g * g).sum::<f64>().sqrt();
        for g in &mut pv_dmix {
            *g /= norm;
        }

        // 0dB at the front to -3dB at the back
        let front = pv[0].max(pv[1]).max(pv[2]);
        let back = pv[3].max(pv[4]);
        let level = 0.5_f64.powf(0.5 * back / (front + back));

        Some(pv_dmix.into_iter().map(|g| g * level).collect())
    }

    fn output_channels(&self) -> Vec<usize> {
        vec![self.left_channel, self.right_channel]
    }
}

/// One region of the sphere that can compute gains for positions inside it.
#[derive(Debug)]
pub enum RegionHandler {
    Triplet(Triplet),
    VirtualNgon(VirtualNgon),
    Quad(QuadRegion),
    StereoPanDownmix(StereoPanDownmix),
}

impl RegionHandler {
    fn handle(&self, position: Vec3) -> Option<Vec<f64>> {
        match self {
            RegionHandler::Triplet(t) => t.handle(position),
            RegionHandler::VirtualNgon(n) => n.handle(position),
            RegionHandler::Quad(q) => q.handle(position),
            RegionHandler::StereoPanDownmix(s) => s.handle(position),
        }
    }

    fn output_channels(&self) -> Vec<usize> {
        match self {
            RegionHandler::Triplet(t) => t.output_channels.to_vec(),
            RegionHandler::VirtualNgon(n) => n.output_channels.clone(),
            RegionHandler::Quad(q) => q.output_channels.to_vec(),
            RegionHandler::StereoPanDownmix(s) => s.output_channels(),
        }
    }

    /// Call handle and scatter the result over `nchannels` outputs.
    fn handle_remap(&self, position: Vec3, nchannels: usize) -> Option<Vec<f64>> {
        self.handle(position).map(|pv| {
            let mut out = vec![0.0; nchannels];
            for (channel, g) in self.output_channels().into_iter().zip(pv) {
                out[channel] = g;
            }
            out
        })
    }
}

/// The configured point source panner: regions over an intermediate channel
/// set, plus an optional downmix from intermediate to real channels.
#[derive(Debug)]
pub struct PointSourcePanner {
    regions: Vec<RegionHandler>,
    /// downmix from intermediate channels (with extras) to real channels
    downmix: Option<Array2<f64>>,
    num_intermediate: usize,
    num_channels: usize,
}

impl PointSourcePanner {
    pub fn new(regions: Vec<RegionHandler>, downmix: Option<Array2<f64>>) -> Self {
        let num_intermediate = regions
            .iter()
            .flat_map(|r| r.output_channels())
            .max()
            .map_or(0, |m| m + 1);
        let num_channels = match &downmix {
            Some(dm) => {
                assert!(dm.ncols() >= num_intermediate, "not enough channels");
                dm.nrows()
            }
            None => num_intermediate,
        };

        Self {
            regions,
            downmix,
            num_intermediate,
            num_channels,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Calculate gains for a position using one of the regions; `None` if no
    /// region can handle it.
    pub fn handle(&self, position: Vec3) -> Option<Vec<f64>> {
        let pv = self
            .regions
            .iter()
            .find_map(|r| r.handle_remap(position, self.num_intermediate))?;

        match &self.downmix {
            None => Some(pv),
            Some(dm) => {
                let mut out = vec![0.0; dm.nrows()];
                for (r, o) in out.iter_mut().enumerate() {
                    *o = (0..pv.len()).map(|c| dm[[r, c]] * pv[c]).sum();
                }
                let norm = out.iter().map(|g| g * g).sum::<f64>().sqrt();
                for g in &mut out {
                    *g /= norm;
                }
                Some(out)
            }
        }
    }

    /// Like `handle`, but positions outside every region are an error.
    pub fn handle_or_err(&self, position: Vec3) -> RenderResult<Vec<f64>> {
        self.handle(position)
            .ok_or(RenderError::PositionNotHandled(position.as_array()))
    }
}

/// Generate extra loudspeaker positions to fill vertical gaps between
/// layers, with a downmix sending them to the mid-layer speakers below or
/// above.
fn extra_pos_vertical_nominal(layout: &Layout) -> (Vec<Channel>, Array2<f64>) {
    let n = layout.channels.len();
    let mut extra_channels = Vec::new();
    let mut downmix_rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut row = vec![0.0; n];
            row[i] = 1.0;
            row
        })
        .collect();

    let nominal_el = |c: &Channel| c.polar_nominal_position.elevation;
    let nominal_az = |c: &Channel| c.polar_nominal_position.azimuth;

    let mid: Vec<usize> = (0..n)
        .filter(|&i| {
            let el = nominal_el(&layout.channels[i]);
            (-10.0..=10.0).contains(&el)
        })
        .collect();

    for (layer_nominal_el, layer_lb, layer_ub) in [(-30.0, -70.0, -10.0), (30.0, 10.0, 70.0)] {
        let layer: Vec<usize> = (0..n)
            .filter(|&i| {
                let el = nominal_el(&layout.channels[i]);
                (layer_lb..=layer_ub).contains(&el)
            })
            .collect();

        // speakers in the mid layer wider than the current layer get a
        // virtual speaker directly above/below, downmixed straight back;
        // the extra margin avoids fast vertical movement of horizontally
        // moving sources
        let (az_limit, layer_real_el) = if layer.is_empty() {
            (0.0, layer_nominal_el)
        } else {
            let az_range = layer
                .iter()
                .map(|&i| nominal_az(&layout.channels[i]).abs())
                .fold(0.0, f64::max);
            let real_el_mean = layer
                .iter()
                .map(|&i| layout.channels[i].polar_position.elevation)
                .sum::<f64>()
                / layer.len() as f64;
            (az_range + 40.0, real_el_mean)
        };

        for &mid_channel in &mid {
            let channel = &layout.channels[mid_channel];
            let epsilon = 1e-5;
            if nominal_az(channel).abs() >= az_limit - epsilon {
                extra_channels.push(Channel {
                    name: "extra".to_owned(),
                    polar_position: PolarPosition::new(
                        channel.polar_position.azimuth,
                        layer_real_el,
                        1.0,
                    ),
                    polar_nominal_position: PolarPosition::new(
                        nominal_az(channel),
                        layer_nominal_el,
                        1.0,
                    ),
                    az_range: (nominal_az(channel), nominal_az(channel)),
                    el_range: (layer_nominal_el, layer_nominal_el),
                    is_lfe: false,
                });

                let mut row = vec![0.0; n];
                row[mid_channel] = 1.0;
                downmix_rows.push(row);
            }
        }
    }

    // transpose: (real channels, intermediate channels)
    let cols = downmix_rows.len();
    let mut downmix = Array2::<f64>::zeros((n, cols));
    for (c, row) in downmix_rows.iter().enumerate() {
        for (r, &v) in row.iter().enumerate() {
            downmix[[r, c]] = v;
        }
    }

    (extra_channels, downmix)
}

/// Set the nominal positions of the screen speakers so that the
/// triangulation works for both nominal and real orderings: 45 degrees when
/// wider than 30 degrees, 15 otherwise.
fn set_screen_speaker_nominal_positions(layout: &Layout) -> Layout {
    if layout.channel_index("M+SC").is_none() {
        return layout.clone();
    }

    let mut layout = layout.clone();
    for channel in &mut layout.channels {
        if channel.name == "M+SC" || channel.name == "M-SC" {
            let old_az = channel.polar_position.azimuth;
            let new_az = old_az.signum() * if old_az.abs() > 30.0 { 45.0 } else { 15.0 };
            channel.polar_nominal_position = PolarPosition::new(new_az, 0.0, 1.0);
        }
    }
    layout
}

/// Check that screen loudspeakers are within the ranges allowed by BS.2051.
pub fn check_screen_speakers(layout: &Layout) -> RenderResult<()> {
    for channel in &layout.channels {
        if channel.name == "M+SC" || channel.name == "M-SC" {
            let abs_az = channel.polar_position.azimuth.abs();
            if !((5.0..=25.0).contains(&abs_az) || (35.0..=60.0).contains(&abs_az)) {
                return Err(RenderError::InvalidLayout(format!(
                    "channel {} has azimuth {}, which is not in the allowed ranges \
                     of 5 to 25 and 35 to 60 degrees",
                    channel.name, channel.polar_position.azimuth
                )));
            }
        }
    }
    Ok(())
}

fn configure_stereo(layout: &Layout) -> RenderResult<PointSourcePanner> {
    let left = layout.channel_index("M+030").ok_or_else(|| {
        RenderError::InvalidLayout("stereo layout is missing M+030".into())
    })?;
    let right = layout.channel_index("M-030").ok_or_else(|| {
        RenderError::InvalidLayout("stereo layout is missing M-030".into())
    })?;

    Ok(PointSourcePanner::new(
        vec![RegionHandler::StereoPanDownmix(StereoPanDownmix::new(
            left, right,
        )?)],
        None,
    ))
}

fn configure_full(layout: &Layout) -> RenderResult<PointSourcePanner> {
    let layout = set_screen_speaker_nominal_positions(layout);

    // extra height speakers are treated as real until the final downmix
    let (extra_channels, downmix) = extra_pos_vertical_nominal(&layout);
    let mut channels = layout.channels.clone();
    channels.extend(extra_channels);

    // virtual speakers above and below become centres of virtual ngons; no
    // upper one is added when a speaker may be directly overhead, which
    // would cause a step in the gains
    let mut virtual_positions = vec![Vec3::new(0.0, 0.0, -1.0)];
    if layout.channel_index("T+000").is_none() && layout.channel_index("UH+180").is_none() {
        virtual_positions.push(Vec3::new(0.0, 0.0, 1.0));
    }

    let mut positions_nominal: Vec<Vec3> =
        channels.iter().map(|c| c.nominal_position()).collect();
    let mut positions_real: Vec<Vec3> = channels.iter().map(|c| c.norm_position()).collect();
    let virtual_verts: Vec<usize> =
        (channels.len()..channels.len() + virtual_positions.len()).collect();
    positions_nominal.extend(&virtual_positions);
    positions_real.extend(&virtual_positions);

    let facets = convex_hull_facets(&positions_nominal)?;

    let mut regions = Vec::new();

    for &virtual_vert in &virtual_verts {
        let real_verts = adjacent_verts(&facets, virtual_vert);
        assert!(
            real_verts.iter().all(|v| !virtual_verts.contains(v)),
            "virtual speakers must not be adjacent"
        );

        let centre_downmix = vec![1.0 / (real_verts.len() as f64).sqrt(); real_verts.len()];
        regions.push(RegionHandler::VirtualNgon(VirtualNgon::new(
            real_verts.clone(),
            real_verts.iter().map(|&v| positions_real[v]).collect(),
            positions_real[virtual_vert],
            centre_downmix,
        )?));
    }

    for facet in &facets {
        if facet.iter().any(|v| virtual_verts.contains(v)) {
            continue;
        }

        match facet.as_slice() {
            &[a, b, c] => regions.push(RegionHandler::Triplet(Triplet::new(
                [a, b, c],
                [positions_real[a], positions_real[b], positions_real[c]],
            )?)),
            &[a, b, c, d] => regions.push(RegionHandler::Quad(QuadRegion::new(
                [a, b, c, d],
                [
                    positions_real[a],
                    positions_real[b],
                    positions_real[c],
                    positions_real[d],
                ],
            ))),
            _ => {
                return Err(RenderError::InvalidLayout(
                    "facets with more than 4 vertices are not supported".into(),
                ))
            }
        }
    }

    Ok(PointSourcePanner::new(regions, Some(downmix)))
}

/// Configure a point source panner for a layout without LFE channels,
/// outputting channels in the same order as the layout.
pub fn configure(layout: &Layout) -> RenderResult<PointSourcePanner> {
    assert!(
        layout.channels.iter().all(|c| !c.is_lfe),
        "LFE channel passed to point source panner"
    );

    check_screen_speakers(layout)?;

    if layout.name == "0+2+0" {
        configure_stereo(layout)
    } else {
        configure_full(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admr_core::geom::cart;

    fn panner(name: &str) -> (Layout, PointSourcePanner) {
        let layout = bs2051::get_layout(name).unwrap().without_lfe();
        let panner = configure(&layout).unwrap();
        (layout, panner)
    }

    #[test]
    fn test_triplet_barycentric() {
        let positions = [cart(30.0, 0.0, 1.0), cart(-30.0, 0.0, 1.0), cart(0.0, 30.0, 1.0)];
        let triplet = Triplet::new([0, 1, 2], positions).unwrap();

        // at each vertex the gain is a one-hot
        for (i, &pos) in positions.iter().enumerate() {
            let pv = triplet.handle(pos).unwrap();
            assert!((pv[i] - 1.0).abs() < 1e-10);
        }

        // inside: positive gains, unit norm, collinear velocity vector
        let pos = cart(10.0, 10.0, 1.0);
        let pv = triplet.handle(pos).unwrap();
        assert!(pv.iter().all(|&g| g >= 0.0));
        assert!((pv.iter().map(|g| g * g).sum::<f64>() - 1.0).abs() < 1e-10);

        let vv = positions
            .iter()
            .zip(&pv)
            .fold(Vec3::ZERO, |acc, (&p, &g)| acc + p * g);
        assert!((vv.safe_norm() - pos.safe_norm()).norm() < 1e-10);

        // outside
        assert!(triplet.handle(cart(180.0, 0.0, 1.0)).is_none());
    }

    #[test]
    fn test_virtual_ngon_downmix() {
        let positions = vec![
            cart(30.0, 0.0, 1.0),
            cart(-30.0, 0.0, 1.0),
            cart(30.0, 30.0, 1.0),
            cart(-30.0, 30.0, 1.0),
        ];
        let downmix = vec![0.2, 0.2, 0.3, 0.3];
        let centre = positions
            .iter()
            .zip(&downmix)
            .fold(Vec3::ZERO, |acc, (&p, &d)| acc + p * d);

        let ngon =
            VirtualNgon::new(vec![0, 1, 2, 3], positions, centre, downmix.clone()).unwrap();

        // panning to the virtual centre returns the normalised downmix
        let pv = ngon.handle(centre).unwrap();
        let downmix_norm = downmix.iter().map(|g| g * g).sum::<f64>().sqrt();
        for (g, d) in pv.iter().zip(&downmix) {
            assert!((g - d / downmix_norm).abs() < 1e-10);
        }
    }

    #[test]
    fn test_stereo_downmix_values() {
        let p = StereoPanDownmix::new(0, 1).unwrap();

        let cases = [
            (cart(0.0, 0.0, 1.0), [0.5_f64.sqrt(), 0.5_f64.sqrt()]),
            (cart(-30.0, 0.0, 1.0), [0.0, 1.0]),
            (cart(-110.0, 0.0, 1.0), [0.0, 0.5_f64.sqrt()]),
            (cart(-180.0, 0.0, 1.0), [0.25_f64.sqrt(), 0.25_f64.sqrt()]),
        ];

        for (pos, expected) in cases {
            let pv = p.handle(pos).unwrap();
            for (g, e) in pv.iter().zip(&expected) {
                assert!((g - e).abs() < 1e-5, "{:?}: {:?} != {:?}", pos, pv, expected);
            }
        }
    }

    #[test]
    fn test_speaker_positions_one_hot() {
        for name in ["0+5+0", "4+5+0", "4+9+0", "0+7+0"] {
            let (layout, panner) = panner(name);

            for (i, channel) in layout.channels.iter().enumerate() {
                let pv = panner.handle(channel.norm_position()).unwrap();
                for (j, &g) in pv.iter().enumerate() {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert!(
                        (g - expected).abs() < 1e-6,
                        "{} {} -> {} = {}",
                        name,
                        channel.name,
                        j,
                        g
                    );
                }
            }
        }
    }

    #[test]
    fn test_power_normalised_everywhere() {
        let (_, panner) = panner("4+5+0");

        for az_i in 0..24 {
            for el_i in -5..=5 {
                let pos = cart(az_i as f64 * 15.0 - 180.0, el_i as f64 * 18.0, 1.0);
                let pv = panner.handle(pos).unwrap();
                let power: f64 = pv.iter().map(|g| g * g).sum();
                assert!(
                    (power - 1.0).abs() < 1e-10,
                    "power {} at {:?}",
                    power,
                    pos
                );
                assert!(pv.iter().all(|&g| g >= -1e-10));
            }
        }
    }

    #[test]
    fn test_left_right_symmetry() {
        let (layout, panner) = panner("4+5+0");

        // map each channel to its left/right mirror
        let mirror: Vec<usize> = layout
            .channels
            .iter()
            .map(|c| {
                let mirror_name = if c.name.contains('+') {
                    c.name.replace('+', "-")
                } else {
                    c.name.replace('-', "+")
                };
                layout
                    .channel_index(&mirror_name)
                    .unwrap_or_else(|| layout.channel_index(&c.name).unwrap())
            })
            .collect();

        for az_i in 0..12 {
            for el_i in -2..=2 {
                let az = az_i as f64 * 30.0 - 165.0;
                let el = el_i as f64 * 30.0;
                let pv = panner.handle(cart(az, el, 1.0)).unwrap();
                let pv_mirrored = panner.handle(cart(-az, el, 1.0)).unwrap();

                for (i, &m) in mirror.iter().enumerate() {
                    assert!(
                        (pv[i] - pv_mirrored[m]).abs() < 1e-10,
                        "asymmetry at az {} el {}",
                        az,
                        el
                    );
                }
            }
        }
    }
}
