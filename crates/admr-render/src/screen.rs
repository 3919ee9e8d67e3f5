//! Screen scaling and screen edge locking
//!
//! Both are position transforms between a reference screen (from the
//! programme) and the reproduction screen (from the layout). Scaling warps
//! azimuth and elevation between the screen edges; edge locking snaps a
//! coordinate to an edge.

use admr_core::geom::{azimuth, cart, distance, elevation, interp, local_coordinate_system};
use admr_core::layout::Layout;
use admr_core::{Screen, Vec3};

use admr_model::blocks::{HorizontalEdge, ScreenEdgeLock, VerticalEdge};

use crate::conversion::{point_cart_to_polar, point_polar_to_cart};
use crate::error::{RenderError, RenderResult};

/// Azimuths of the left/right edges and elevations of the top/bottom edges
/// of a screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarEdges {
    pub left_azimuth: f64,
    pub right_azimuth: f64,
    pub bottom_elevation: f64,
    pub top_elevation: f64,
}

impl PolarEdges {
    /// Compute the edges of a screen.
    ///
    /// The screen surface is centre + x * x_vec + z * z_vec for x, z in
    /// [-1, 1]; the edge positions determine the azimuths and elevations.
    pub fn from_screen(screen: &Screen) -> RenderResult<Self> {
        let (centre, x_vec, z_vec) = match screen {
            Screen::Polar(s) => {
                let width =
                    s.centre_position.distance * (s.width_azimuth / 2.0).to_radians().tan();
                let height = width / s.aspect_ratio;

                let axes = local_coordinate_system(
                    s.centre_position.azimuth,
                    s.centre_position.elevation,
                );

                (s.centre_position.as_cartesian(), axes[0] * width, axes[2] * height)
            }
            Screen::Cart(s) => {
                let width = s.width_x / 2.0;
                let height = width / s.aspect_ratio;

                (
                    s.centre_position.as_cartesian(),
                    Vec3::new(width, 0.0, 0.0),
                    Vec3::new(0.0, 0.0, height),
                )
            }
        };

        let left_azimuth = azimuth(centre - x_vec);
        let right_azimuth = azimuth(centre + x_vec);
        if right_azimuth > left_azimuth {
            return Err(RenderError::InvalidScreen(
                "screen must not extend past -y".into(),
            ));
        }

        if azimuth(centre - z_vec) - azimuth(centre + z_vec) > 1e-3 {
            return Err(RenderError::InvalidScreen(
                "screen must not extend past +z or -z".into(),
            ));
        }

        Ok(Self {
            left_azimuth,
            right_azimuth,
            bottom_elevation: elevation(centre - z_vec),
            top_elevation: elevation(centre + z_vec),
        })
    }
}

/// Modify az and el so that vertical panning in allocentric coordinates
/// produces vertical source positions in the given layout.
pub fn compensate_position(az: f64, el: f64, layout: &Layout) -> (f64, f64) {
    if layout.channel_index("U+045").is_some() {
        compensate_az(az, el)
    } else {
        (az, el)
    }
}

/// Warp positions of screen-related content from the reference screen to the
/// reproduction screen.
pub struct ScreenScaleHandler {
    reproduction_edges: Option<PolarEdges>,
    layout_has_u045: bool,
}

impl ScreenScaleHandler {
    pub fn new(reproduction_screen: Option<&Screen>, layout: &Layout) -> RenderResult<Self> {
        Ok(Self {
            reproduction_edges: reproduction_screen
                .map(PolarEdges::from_screen)
                .transpose()?,
            layout_has_u045: layout.channel_index("U+045").is_some(),
        })
    }

    fn scale_az_el(
        ref_edges: &PolarEdges,
        rep_edges: &PolarEdges,
        az: f64,
        el: f64,
    ) -> (f64, f64) {
        let new_az = interp(
            az,
            &[-180.0, ref_edges.right_azimuth, ref_edges.left_azimuth, 180.0],
            &[-180.0, rep_edges.right_azimuth, rep_edges.left_azimuth, 180.0],
        );
        let new_el = interp(
            el,
            &[-90.0, ref_edges.bottom_elevation, ref_edges.top_elevation, 90.0],
            &[-90.0, rep_edges.bottom_elevation, rep_edges.top_elevation, 90.0],
        );
        (new_az, new_el)
    }

    /// Apply screen scaling to a position if the block is screen-related.
    ///
    /// Scaling a polar position at a pole is undefined and fails.
    pub fn handle(
        &self,
        position: Vec3,
        screen_ref: bool,
        reference_screen: Option<&Screen>,
        cartesian: bool,
    ) -> RenderResult<Vec3> {
        let (Some(rep_edges), Some(reference_screen), true) =
            (&self.reproduction_edges, reference_screen, screen_ref)
        else {
            return Ok(position);
        };

        let ref_edges = PolarEdges::from_screen(reference_screen)?;

        if cartesian {
            let (az, el, dist) = point_cart_to_polar(position.x, position.y, position.z);
            let (az, el) = Self::scale_az_el(&ref_edges, rep_edges, az, el);
            let (az, el) = if self.layout_has_u045 {
                compensate_az(az, el)
            } else {
                (az, el)
            };
            Ok(point_polar_to_cart(az, el, dist))
        } else {
            let el = elevation(position);
            if el.abs() > 90.0 - 1e-6 {
                return Err(RenderError::UndefinedScreenScale(position.as_array()));
            }

            let (az, dist) = (azimuth(position), distance(position));
            let (az, el) = Self::scale_az_el(&ref_edges, rep_edges, az, el);
            Ok(cart(az, el, dist))
        }
    }
}

fn compensate_az(az: f64, el: f64) -> (f64, f64) {
    let right_az = interp(el, &[0.0, 30.0, 90.0], &[30.0, 30.0 * (30.0 / 45.0), 30.0]);
    let new_az = interp(
        az,
        &[-180.0, -30.0, 30.0, 180.0],
        &[-180.0, -right_az, right_az, 180.0],
    );
    (new_az, el)
}

/// Snap positions to the edges of the reproduction screen.
pub struct ScreenEdgeLockHandler {
    rep_screen_edges: Option<PolarEdges>,
    layout_has_u045: bool,
}

impl ScreenEdgeLockHandler {
    pub fn new(reproduction_screen: Option<&Screen>, layout: &Layout) -> RenderResult<Self> {
        Ok(Self {
            rep_screen_edges: reproduction_screen
                .map(PolarEdges::from_screen)
                .transpose()?,
            layout_has_u045: layout.channel_index("U+045").is_some(),
        })
    }

    fn lock_to_screen_edge(
        edges: &PolarEdges,
        mut az: f64,
        mut el: f64,
        lock: ScreenEdgeLock,
    ) -> (f64, f64) {
        match lock.horizontal {
            Some(HorizontalEdge::Left) => az = edges.left_azimuth,
            Some(HorizontalEdge::Right) => az = edges.right_azimuth,
            None => {}
        }
        match lock.vertical {
            Some(VerticalEdge::Top) => el = edges.top_elevation,
            Some(VerticalEdge::Bottom) => el = edges.bottom_elevation,
            None => {}
        }
        (az, el)
    }

    fn active(&self, lock: ScreenEdgeLock) -> Option<&PolarEdges> {
        match &self.rep_screen_edges {
            Some(edges) if lock.is_set() => Some(edges),
            _ => None,
        }
    }

    /// Apply edge locking to a Cartesian position vector.
    pub fn handle_vector(
        &self,
        position: Vec3,
        lock: ScreenEdgeLock,
        cartesian: bool,
    ) -> Vec3 {
        let Some(edges) = self.active(lock) else {
            return position;
        };

        if cartesian {
            let (az, el, dist) = point_cart_to_polar(position.x, position.y, position.z);
            let (az, el) = Self::lock_to_screen_edge(edges, az, el, lock);
            let (az, el) = if self.layout_has_u045 {
                compensate_az(az, el)
            } else {
                (az, el)
            };
            point_polar_to_cart(az, el, dist)
        } else {
            let (az, el, dist) = (azimuth(position), elevation(position), distance(position));
            let (az, el) = Self::lock_to_screen_edge(edges, az, el, lock);
            cart(az, el, dist)
        }
    }

    /// Apply edge locking to polar coordinates.
    pub fn handle_az_el(&self, az: f64, el: f64, lock: ScreenEdgeLock) -> (f64, f64) {
        match self.active(lock) {
            Some(edges) => Self::lock_to_screen_edge(edges, az, el, lock),
            None => (az, el),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admr_core::bs2051;
    use admr_core::position::{PolarPosition, PolarScreen};

    fn default_edges() -> PolarEdges {
        PolarEdges::from_screen(&Screen::default_screen()).unwrap()
    }

    #[test]
    fn test_default_screen_edges() {
        let edges = default_edges();
        assert!((edges.left_azimuth - 29.0).abs() < 1.0);
        assert!((edges.right_azimuth + 29.0).abs() < 1.0);
        assert!((edges.top_elevation + edges.bottom_elevation).abs() < 1e-10);
        assert!(edges.top_elevation > 0.0);
    }

    #[test]
    fn test_invalid_screen_rejected() {
        // a screen wrapped past the back of the listener
        let screen = Screen::Polar(PolarScreen {
            aspect_ratio: 1.78,
            centre_position: PolarPosition::new(180.0, 0.0, 1.0),
            width_azimuth: 60.0,
        });
        assert!(PolarEdges::from_screen(&screen).is_err());
    }

    #[test]
    fn test_scale_identity_with_same_screen() {
        let layout = bs2051::get_layout("0+5+0").unwrap().without_lfe();
        let screen = Screen::default_screen();
        let handler = ScreenScaleHandler::new(Some(&screen), &layout).unwrap();

        let pos = cart(10.0, 5.0, 1.0);
        let out = handler.handle(pos, true, Some(&screen), false).unwrap();
        assert!((out - pos).norm() < 1e-10);
    }

    #[test]
    fn test_scale_moves_towards_wider_screen() {
        let layout = bs2051::get_layout("0+5+0").unwrap().without_lfe();
        let wide = Screen::Polar(PolarScreen {
            aspect_ratio: 1.78,
            centre_position: PolarPosition::new(0.0, 0.0, 1.0),
            width_azimuth: 90.0,
        });
        let handler = ScreenScaleHandler::new(Some(&wide), &layout).unwrap();

        // a source at the right edge of the reference screen moves to the
        // right edge of the reproduction screen
        let ref_edges = default_edges();
        let pos = cart(ref_edges.right_azimuth, 0.0, 1.0);
        let out = handler
            .handle(pos, true, Some(&Screen::default_screen()), false)
            .unwrap();
        let wide_edges = PolarEdges::from_screen(&wide).unwrap();
        assert!((azimuth(out) - wide_edges.right_azimuth).abs() < 1e-10);
    }

    #[test]
    fn test_scale_at_pole_fails() {
        let layout = bs2051::get_layout("0+5+0").unwrap().without_lfe();
        let screen = Screen::default_screen();
        let handler = ScreenScaleHandler::new(Some(&screen), &layout).unwrap();

        let result = handler.handle(Vec3::new(0.0, 0.0, 1.0), true, Some(&screen), false);
        assert!(matches!(result, Err(RenderError::UndefinedScreenScale(_))));
    }

    #[test]
    fn test_no_screen_is_identity() {
        let layout = bs2051::get_layout("0+5+0").unwrap().without_lfe();
        let handler = ScreenScaleHandler::new(None, &layout).unwrap();
        let pos = cart(45.0, 20.0, 1.0);
        let out = handler
            .handle(pos, true, Some(&Screen::default_screen()), false)
            .unwrap();
        assert_eq!(out, pos);
    }

    #[test]
    fn test_edge_lock() {
        let layout = bs2051::get_layout("0+5+0").unwrap().without_lfe();
        let handler =
            ScreenEdgeLockHandler::new(Some(&Screen::default_screen()), &layout).unwrap();
        let edges = default_edges();

        let lock = ScreenEdgeLock {
            horizontal: Some(HorizontalEdge::Left),
            vertical: Some(VerticalEdge::Top),
        };
        let (az, el) = handler.handle_az_el(0.0, 0.0, lock);
        assert!((az - edges.left_azimuth).abs() < 1e-10);
        assert!((el - edges.top_elevation).abs() < 1e-10);

        // no lock set: unchanged
        let (az, el) = handler.handle_az_el(10.0, 5.0, ScreenEdgeLock::default());
        assert_eq!((az, el), (10.0, 5.0));
    }

    #[test]
    fn test_compensate_position_only_with_u045() {
        let with = bs2051::get_layout("4+9+0").unwrap().without_lfe();
        let without = bs2051::get_layout("0+5+0").unwrap().without_lfe();

        let (az, _) = compensate_position(30.0, 30.0, &with);
        assert!(az < 30.0);

        let (az, _) = compensate_position(30.0, 30.0, &without);
        assert_eq!(az, 30.0);
    }
}
