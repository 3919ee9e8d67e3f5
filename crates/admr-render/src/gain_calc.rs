//! Gain calculation for Objects content
//!
//! Computes one output gain vector per block format, running the position
//! through screen scaling and edge locking, divergence, extent panning, zone
//! exclusion and channel locking, then splitting into direct and diffuse
//! parts.

use admr_core::geom::{azimuth, cart, elevation, inside_angle_range, local_coordinate_system};
use admr_core::layout::Layout;
use admr_core::{Vec3, Warnings};

use admr_model::blocks::{ChannelLock, ObjectDivergence, ObjectPosition, Zone};
use admr_model::items::ObjectTypeMetadata;

use crate::allo_extent::allocentric_extent_pan;
use crate::allocentric;
use crate::error::{RenderError, RenderResult};
use crate::extent::PolarExtentPanner;
use crate::point_source::{self, PointSourcePanner};
use crate::screen::{ScreenEdgeLockHandler, ScreenScaleHandler};
use crate::zone::ZoneExclusionDownmix;

/// Gains for the direct and diffuse paths, over all layout channels
/// including LFE.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectDiffuseGains {
    pub direct: Vec<f64>,
    pub diffuse: Vec<f64>,
}

impl DirectDiffuseGains {
    /// The combined per-channel gains.
    ///
    /// With no decorrelator in the pipeline both paths feed the same output
    /// channels, so they sum.
    pub fn combined(&self) -> Vec<f64> {
        self.direct
            .iter()
            .zip(&self.diffuse)
            .map(|(d, f)| d + f)
            .collect()
    }
}

/// Cartesian position vector for an ADM position: spherical space for polar
/// positions, cubic space for Cartesian ones.
fn coord_trans(position: &ObjectPosition) -> Vec3 {
    match position {
        ObjectPosition::Polar(p) => cart(p.azimuth, p.elevation, p.distance),
        ObjectPosition::Cartesian(c) => Vec3::new(c.x, c.y, c.z).clamp(-1.0, 1.0),
    }
}

/// Split gains into a direct and a diffuse path.
fn direct_diffuse_split(gains: &[f64], diffuse: f64) -> DirectDiffuseGains {
    DirectDiffuseGains {
        direct: gains.iter().map(|g| g * (1.0 - diffuse).sqrt()).collect(),
        diffuse: gains.iter().map(|g| g * diffuse.sqrt()).collect(),
    }
}

/// Implement object divergence by duplicating and modifying source
/// directions; returns a gain and a position per source.
fn diverge(
    position: Vec3,
    divergence: Option<&ObjectDivergence>,
    cartesian: bool,
    warnings: &mut Warnings,
) -> (Vec<f64>, Vec<Vec3>) {
    let Some(divergence) = divergence else {
        return (vec![1.0], vec![position]);
    };
    if divergence.value == 0.0 {
        return (vec![1.0], vec![position]);
    }

    // gains such that g_l + g_c + g_r == 1, meeting at 1/3 each for x == 0.5
    let x = divergence.value;
    let g_lr = x / (x + 1.0);
    let g_c = (1.0 - x) / (x + 1.0);
    let gains = vec![g_lr, g_c, g_lr];

    if cartesian {
        if divergence.azimuth_range.is_some() {
            warnings.warn(
                "azimuthRange specified for blockFormat in Cartesian mode; using Cartesian divergence",
            );
        }

        let range = divergence.position_range.unwrap_or(0.0);
        let left = (position + Vec3::new(range, 0.0, 0.0)).clamp(-1.0, 1.0);
        let right = (position - Vec3::new(range, 0.0, 0.0)).clamp(-1.0, 1.0);

        (gains, vec![left, position.clamp(-1.0, 1.0), right])
    } else {
        if divergence.position_range.is_some() {
            warnings.warn(
                "positionRange specified for blockFormat in polar mode; using polar divergence",
            );
        }

        let azimuth_range = divergence.azimuth_range.unwrap_or(45.0);
        let distance = position.norm();

        let basis = local_coordinate_system(azimuth(position), elevation(position));
        let on_basis = |p: Vec3| basis[0] * p.x + basis[1] * p.y + basis[2] * p.z;

        let left = on_basis(cart(azimuth_range, 0.0, distance));
        let right = on_basis(cart(-azimuth_range, 0.0, distance));

        (gains, vec![left, position, right])
    }
}

/// Extent panning in polar mode, including the distance-dependent extent
/// modification and depth handling.
struct PolarExtentHandler;

impl PolarExtentHandler {
    /// Modify an extent parameter given a distance.
    ///
    /// A right triangle is formed with the adjacent edge being the distance
    /// and the opposite edge determined from the extent; the angle then
    /// determines the new extent. At distance 0 the extent is always 360; at
    /// distance 1 the original extent is used; beyond 1 it shrinks.
    fn extent_mod(extent: f64, distance: f64) -> f64 {
        use admr_core::geom::interp;

        let min_size = 0.2;
        let size = interp(extent, &[0.0, 360.0], &[min_size, 1.0]);
        let extent_1 = 4.0 * size.atan2(1.0).to_degrees();
        interp(
            4.0 * size.atan2(distance).to_degrees(),
            &[0.0, extent_1, 360.0],
            &[0.0, extent, 360.0],
        )
    }

    fn handle(
        extent: &PolarExtentPanner,
        psp: &PointSourcePanner,
        position: Vec3,
        width: f64,
        height: f64,
        depth: f64,
    ) -> RenderResult<Vec<f64>> {
        let distance = position.norm();

        let distances = if depth != 0.0 {
            vec![
                (distance + depth / 2.0).max(0.0),
                (distance - depth / 2.0).max(0.0),
            ]
        } else {
            vec![distance]
        };

        let pvs = distances
            .iter()
            .map(|&d| {
                extent.calc_pv_spread(
                    psp,
                    position,
                    Self::extent_mod(width, d),
                    Self::extent_mod(height, d),
                )
            })
            .collect::<RenderResult<Vec<_>>>()?;

        if pvs.len() == 1 {
            Ok(pvs.into_iter().next().unwrap())
        } else {
            // rms over the two depth extremes
            Ok((0..pvs[0].len())
                .map(|i| {
                    (pvs.iter().map(|pv| pv[i] * pv[i]).sum::<f64>() / pvs.len() as f64).sqrt()
                })
                .collect())
        }
    }
}

/// The per-layout state of the Objects gain calculator.
pub struct GainCalc {
    psp: PointSourcePanner,
    polar_extent: PolarExtentPanner,
    screen_scale: ScreenScaleHandler,
    screen_edge_lock: ScreenEdgeLockHandler,
    zone_downmix: ZoneExclusionDownmix,

    // per non-LFE channel data
    nominal_positions: Vec<Vec3>,
    nominal_azimuths: Vec<f64>,
    nominal_elevations: Vec<f64>,
    ego_positions: Vec<Vec3>,
    allo_positions: Vec<Vec3>,

    is_lfe: Vec<bool>,
}

impl GainCalc {
    pub fn new(layout: &Layout) -> RenderResult<Self> {
        let without_lfe = layout.without_lfe();

        let psp = point_source::configure(&without_lfe)?;
        let polar_extent = PolarExtentPanner::new(&psp)?;

        Ok(Self {
            psp,
            polar_extent,
            screen_scale: ScreenScaleHandler::new(layout.screen.as_ref(), &without_lfe)?,
            screen_edge_lock: ScreenEdgeLockHandler::new(layout.screen.as_ref(), &without_lfe)?,
            zone_downmix: ZoneExclusionDownmix::new(&without_lfe),
            nominal_positions: without_lfe.nominal_positions(),
            nominal_azimuths: without_lfe
                .channels
                .iter()
                .map(|c| c.polar_nominal_position.azimuth)
                .collect(),
            nominal_elevations: without_lfe
                .channels
                .iter()
                .map(|c| c.polar_nominal_position.elevation)
                .collect(),
            ego_positions: without_lfe.norm_positions(),
            allo_positions: allocentric::positions_for_layout(&without_lfe)?,
            is_lfe: layout.is_lfe(),
        })
    }

    /// Channels matched by a list of exclusion zones, on nominal positions.
    fn excluded_by_zones(&self, zones: &[Zone]) -> Vec<bool> {
        let epsilon = 1e-6;
        let n = self.nominal_positions.len();
        let mut excluded = vec![false; n];

        for zone in zones {
            for i in 0..n {
                let hit = match zone {
                    Zone::Cartesian(z) => {
                        let p = self.nominal_positions[i];
                        p.x - epsilon < z.max_x
                            && p.y - epsilon < z.max_y
                            && p.z - epsilon < z.max_z
                            && p.x + epsilon > z.min_x
                            && p.y + epsilon > z.min_y
                            && p.z + epsilon > z.min_z
                    }
                    Zone::Polar(z) => {
                        let el = self.nominal_elevations[i];
                        let az = self.nominal_azimuths[i];
                        el - epsilon < z.max_elevation
                            && el + epsilon > z.min_elevation
                            // speakers at the poles match any azimuth range
                            && (el.abs() > 90.0 - epsilon
                                || inside_angle_range(az, z.min_azimuth, z.max_azimuth, epsilon))
                    }
                };
                excluded[i] = excluded[i] || hit;
            }
        }

        excluded
    }

    /// Apply zone exclusion to polar-path gains.
    fn apply_zone_exclusion(&self, gains: &[f64], excluded: &[bool]) -> RenderResult<Vec<f64>> {
        if excluded.iter().all(|&e| e) {
            return Err(RenderError::AllSpeakersExcluded);
        }

        let downmix = self.zone_downmix.downmix_for_excluded(excluded);

        Ok((0..gains.len())
            .map(|j| {
                (0..gains.len())
                    .map(|i| gains[i] * gains[i] * downmix[[i, j]])
                    .sum::<f64>()
                    .sqrt()
            })
            .collect())
    }

    /// Replace the gains with a one-hot to the locked channel, if any
    /// candidate is within range.
    ///
    /// Candidates are ranked by distance; ties break by increasing channel
    /// index.
    fn apply_channel_lock(
        gains: &mut [f64],
        channel_positions: &[Vec3],
        distance_weights: Option<[f64; 3]>,
        excluded: Option<&[bool]>,
        position: Vec3,
        lock: &ChannelLock,
    ) {
        let tol = 1e-5;

        let distance = |p: Vec3| -> f64 {
            let d = position - p;
            match distance_weights {
                Some([wx, wy, wz]) => (wx * d.x * d.x + wy * d.y * d.y + wz * d.z * d.z).sqrt(),
                None => d.norm(),
            }
        };

        let mut best: Option<(usize, f64)> = None;
        for (i, &p) in channel_positions.iter().enumerate() {
            if excluded.is_some_and(|e| e[i]) {
                continue;
            }

            let d = distance(p);
            if let Some(max_distance) = lock.max_distance {
                if d >= max_distance + tol {
                    continue;
                }
            }

            // strictly closer wins; a tie keeps the lower channel index
            match best {
                Some((_, best_d)) if d >= best_d - tol => {}
                _ => best = Some((i, d)),
            }
        }

        if let Some((index, _)) = best {
            for (i, g) in gains.iter_mut().enumerate() {
                *g = if i == index { 1.0 } else { 0.0 };
            }
        }
    }

    /// Compute the direct and diffuse gain vectors for one metadata block.
    pub fn render(
        &self,
        meta: &ObjectTypeMetadata,
        warnings: &mut Warnings,
    ) -> RenderResult<DirectDiffuseGains> {
        let block = &meta.block_format;
        let cartesian = block.cartesian;

        let mut position = coord_trans(&block.position);

        // headLocked content bypasses all screen-related transforms
        if !block.head_locked {
            position = self.screen_scale.handle(
                position,
                block.screen_ref,
                meta.extra_data.reference_screen.as_ref(),
                cartesian,
            )?;
            position = self.screen_edge_lock.handle_vector(
                position,
                block.position.screen_edge_lock(),
                cartesian,
            );
        }

        let (diverged_gains, diverged_positions) = diverge(
            position,
            block.object_divergence.as_ref(),
            cartesian,
            warnings,
        );

        let zone_excluded = self.excluded_by_zones(&block.zone_exclusion);

        let n = self.ego_positions.len();
        let mut gains = vec![0.0; n];

        if cartesian {
            let excluded = allocentric::get_excluded(&self.allo_positions, &zone_excluded);

            let active: Vec<Vec3> = self
                .allo_positions
                .iter()
                .zip(&excluded)
                .filter(|(_, &e)| !e)
                .map(|(&p, _)| p)
                .collect();
            let active_indices: Vec<usize> =
                (0..n).filter(|&i| !excluded[i]).collect();

            for (&dg, &dp) in diverged_gains.iter().zip(&diverged_positions) {
                let pv = allocentric_extent_pan(
                    &active,
                    dp,
                    block.width,
                    block.height,
                    block.depth,
                );
                for (&idx, &g) in active_indices.iter().zip(&pv) {
                    gains[idx] += dg * g * g;
                }
            }
            for g in &mut gains {
                *g = g.sqrt();
            }

            if let Some(lock) = &block.channel_lock {
                Self::apply_channel_lock(
                    &mut gains,
                    &self.allo_positions,
                    Some([1.0 / 16.0, 4.0, 32.0]),
                    Some(&excluded),
                    position,
                    lock,
                );
            }
        } else {
            for (&dg, &dp) in diverged_gains.iter().zip(&diverged_positions) {
                let pv = PolarExtentHandler::handle(
                    &self.polar_extent,
                    &self.psp,
                    dp,
                    block.width,
                    block.height,
                    block.depth,
                )?;
                for (o, &g) in gains.iter_mut().zip(&pv) {
                    *o += dg * g * g;
                }
            }
            for g in &mut gains {
                *g = g.sqrt();
            }

            gains = self.apply_zone_exclusion(&gains, &zone_excluded)?;

            if let Some(lock) = &block.channel_lock {
                Self::apply_channel_lock(
                    &mut gains,
                    &self.ego_positions,
                    None,
                    None,
                    position,
                    lock,
                );
            }
        }

        for g in &mut gains {
            if !g.is_finite() {
                *g = 0.0;
            }
            *g *= block.gain;
        }

        // scatter over the full channel list, leaving LFE channels silent
        let mut gains_full = vec![0.0; self.is_lfe.len()];
        let mut it = gains.into_iter();
        for (out, &lfe) in gains_full.iter_mut().zip(&self.is_lfe) {
            if !lfe {
                *out = it.next().expect("one gain per non-LFE channel");
            }
        }

        Ok(direct_diffuse_split(&gains_full, block.diffuse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admr_core::bs2051;
    use admr_model::blocks::{CartesianZone, ObjectsBlock, PolarZone};
    use admr_model::items::ExtraData;

    fn calc() -> (Layout, GainCalc) {
        let layout = bs2051::get_layout("0+5+0").unwrap();
        let calc = GainCalc::new(&layout).unwrap();
        (layout, calc)
    }

    fn meta(block: ObjectsBlock) -> ObjectTypeMetadata {
        ObjectTypeMetadata {
            block_format: block,
            extra_data: ExtraData::default(),
        }
    }

    fn render(calc: &GainCalc, block: ObjectsBlock) -> DirectDiffuseGains {
        let mut warnings = Warnings::new();
        calc.render(&meta(block), &mut warnings).unwrap()
    }

    #[test]
    fn test_front_centre_splits_between_pair() {
        // scenario: source at the front with no M+000... use 0+2+0 to check
        // the equal split
        let layout = bs2051::get_layout("0+2+0").unwrap();
        let calc = GainCalc::new(&layout).unwrap();

        let block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(0.0, 0.0, 1.0));
        let gains = render(&calc, block);

        let expected = 0.5_f64.sqrt();
        assert!((gains.direct[0] - expected).abs() < 1e-6);
        assert!((gains.direct[1] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_source_at_speaker() {
        let (layout, calc) = calc();
        let block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(30.0, 0.0, 1.0));
        let gains = render(&calc, block);

        let i = layout.channel_index("M+030").unwrap();
        assert!((gains.direct[i] - 1.0).abs() < 1e-6);
        let total: f64 = gains.direct.iter().map(|g| g * g).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_lfe_channels_are_silent() {
        let (layout, calc) = calc();
        let block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(0.0, 0.0, 1.0));
        let gains = render(&calc, block);

        let lfe = layout.channel_index("LFE1").unwrap();
        assert_eq!(gains.direct[lfe], 0.0);
        assert_eq!(gains.diffuse[lfe], 0.0);
    }

    #[test]
    fn test_block_gain_applied() {
        let (layout, calc) = calc();
        let mut block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(30.0, 0.0, 1.0));
        block.gain = 0.5;
        let gains = render(&calc, block);

        let i = layout.channel_index("M+030").unwrap();
        assert!((gains.direct[i] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_diffuse_split() {
        let (layout, calc) = calc();
        let mut block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(30.0, 0.0, 1.0));
        block.diffuse = 0.5;
        let gains = render(&calc, block);

        let i = layout.channel_index("M+030").unwrap();
        assert!((gains.direct[i] - 0.5_f64.sqrt()).abs() < 1e-6);
        assert!((gains.diffuse[i] - 0.5_f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_channel_lock_snaps() {
        // scenario D: channelLock with maxDistance 0.5 at azimuth 25 snaps
        // to M+030
        let (layout, calc) = calc();
        let mut block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(25.0, 0.0, 1.0));
        block.channel_lock = Some(ChannelLock { max_distance: Some(0.5) });
        let gains = render(&calc, block);

        let i = layout.channel_index("M+030").unwrap();
        for (j, &g) in gains.direct.iter().enumerate() {
            let expected = if j == i { 1.0 } else { 0.0 };
            assert!((g - expected).abs() < 1e-10, "channel {}: {}", j, g);
        }
    }

    #[test]
    fn test_channel_lock_out_of_range() {
        // too far from any speaker: gains unchanged
        let (_, calc) = calc();
        let mut block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(60.0, 0.0, 1.0));
        block.channel_lock = Some(ChannelLock { max_distance: Some(0.01) });
        let locked = render(&calc, block);

        let block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(60.0, 0.0, 1.0));
        let unlocked = render(&calc, block);

        assert_eq!(locked.direct, unlocked.direct);
    }

    #[test]
    fn test_channel_lock_tie_breaks_by_index() {
        // a source exactly between the stereo pair locks to the earlier
        // channel in the layout
        let layout = bs2051::get_layout("0+2+0").unwrap();
        let calc = GainCalc::new(&layout).unwrap();

        let mut block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(0.0, 0.0, 1.0));
        block.channel_lock = Some(ChannelLock { max_distance: None });
        let gains = render(&calc, block);

        let m030 = layout.channel_index("M+030").unwrap();
        let m_minus_030 = layout.channel_index("M-030").unwrap();
        assert_eq!(gains.direct[m030], 1.0);
        assert_eq!(gains.direct[m_minus_030], 0.0);
    }

    #[test]
    fn test_zone_exclusion_preserves_energy() {
        let (layout, calc) = calc();
        let mut block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(0.0, 0.0, 1.0));
        block.zone_exclusion = vec![Zone::Polar(PolarZone {
            min_azimuth: -10.0,
            max_azimuth: 10.0,
            min_elevation: -90.0,
            max_elevation: 90.0,
        })];
        let gains = render(&calc, block);

        // no energy on the excluded centre speaker
        let centre = layout.channel_index("M+000").unwrap();
        assert_eq!(gains.direct[centre], 0.0);

        // energy is preserved within 0.05 dB
        let total: f64 = gains.direct.iter().map(|g| g * g).sum();
        assert!((10.0 * total.log10()).abs() < 0.05, "total {}", total);
    }

    #[test]
    fn test_all_speakers_excluded_fails() {
        let (_, calc) = calc();
        let mut block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(0.0, 0.0, 1.0));
        block.zone_exclusion = vec![Zone::Polar(PolarZone {
            min_azimuth: -180.0,
            max_azimuth: 180.0,
            min_elevation: -90.0,
            max_elevation: 90.0,
        })];

        let mut warnings = Warnings::new();
        let result = calc.render(&meta(block), &mut warnings);
        assert!(matches!(result, Err(RenderError::AllSpeakersExcluded)));
    }

    #[test]
    fn test_divergence_three_sources() {
        let (layout, calc) = calc();
        let mut block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(0.0, 0.0, 1.0));
        block.object_divergence = Some(ObjectDivergence {
            value: 1.0,
            azimuth_range: Some(30.0),
            position_range: None,
        });
        let gains = render(&calc, block);

        // full divergence: energy at the range edges, none in the centre
        let left = layout.channel_index("M+030").unwrap();
        let right = layout.channel_index("M-030").unwrap();
        let centre = layout.channel_index("M+000").unwrap();
        assert!(gains.direct[left] > 0.5);
        assert!(gains.direct[right] > 0.5);
        assert!(gains.direct[centre] < 1e-6);
    }

    #[test]
    fn test_cartesian_position() {
        let (layout, calc) = calc();
        let mut block =
            ObjectsBlock::with_position("AB_1", ObjectPosition::cartesian(-1.0, 1.0, 0.0));
        block.cartesian = true;
        let gains = render(&calc, block);

        // front-left cube corner is M+030's allocentric position
        let i = layout.channel_index("M+030").unwrap();
        assert!((gains.direct[i] - 1.0).abs() < 1e-6, "{:?}", gains.direct);
    }

    #[test]
    fn test_cartesian_zone_exclusion() {
        let (layout, calc) = calc();
        let mut block =
            ObjectsBlock::with_position("AB_1", ObjectPosition::cartesian(0.0, 1.0, 0.0));
        block.cartesian = true;
        // exclude the centre column
        block.zone_exclusion = vec![Zone::Cartesian(CartesianZone {
            min_x: -0.1,
            max_x: 0.1,
            min_y: -1.0,
            max_y: 1.0,
            min_z: -1.0,
            max_z: 1.0,
        })];
        let gains = render(&calc, block);

        let centre = layout.channel_index("M+000").unwrap();
        assert_eq!(gains.direct[centre], 0.0);
        let total: f64 = gains.direct.iter().map(|g| g * g).sum();
        assert!(total > 0.5);
    }
}
