//! Conversion between polar and Cartesian Objects coordinates
//!
//! Implements the position and extent conversions of BS.2127 section 10. The
//! azimuth mapping runs through five sectors anchored at the nominal
//! front/side/rear loudspeaker positions; elevation maps through a piecewise
//! linear warp anchored at 30/45 degrees. Position conversion is invertible;
//! extent conversion is not.

use admr_core::geom::{azimuth, inside_angle_range, local_coordinate_system, relative_angle};
use admr_core::Vec3;

use admr_model::blocks::{
    ObjectCartesianPosition, ObjectPolarPosition, ObjectPosition, ObjectsBlock,
};

const EL_TOP: f64 = 30.0;
const EL_TOP_TILDE: f64 = 45.0;

/// Sector anchors: (azimuth, Cartesian corner), ordered clockwise.
const MAPPING: [(f64, [f64; 3]); 5] = [
    (0.0, [0.0, 1.0, 0.0]),
    (-30.0, [1.0, 1.0, 0.0]),
    (-110.0, [1.0, -1.0, 0.0]),
    (110.0, [-1.0, -1.0, 0.0]),
    (30.0, [-1.0, 1.0, 0.0]),
];

fn find_sector(az: f64) -> ((f64, Vec3), (f64, Vec3)) {
    for i in 0..MAPPING.len() {
        let j = (i + 1) % MAPPING.len();
        if inside_angle_range(az, MAPPING[j].0, MAPPING[i].0, 0.0) {
            return (
                (MAPPING[i].0, Vec3::from_array(MAPPING[i].1)),
                (MAPPING[j].0, Vec3::from_array(MAPPING[j].1)),
            );
        }
    }
    unreachable!("sectors cover the full circle");
}

fn find_cart_sector(az: f64) -> ((f64, Vec3), (f64, Vec3)) {
    for i in 0..MAPPING.len() {
        let j = (i + 1) % MAPPING.len();
        let az_i = azimuth(Vec3::from_array(MAPPING[i].1));
        let az_j = azimuth(Vec3::from_array(MAPPING[j].1));
        if inside_angle_range(az, az_j, az_i, 0.0) {
            return (
                (MAPPING[i].0, Vec3::from_array(MAPPING[i].1)),
                (MAPPING[j].0, Vec3::from_array(MAPPING[j].1)),
            );
        }
    }
    unreachable!("sectors cover the full circle");
}

fn map_az_to_linear(left_az: f64, right_az: f64, az: f64) -> f64 {
    let mid_az = (left_az + right_az) / 2.0;
    let az_range = right_az - mid_az;

    let rel_az = az - mid_az;
    let gain_r = 0.5 + 0.5 * rel_az.to_radians().tan() / az_range.to_radians().tan();

    gain_r.atan2(1.0 - gain_r) * (2.0 / std::f64::consts::PI)
}

fn map_linear_to_az(left_az: f64, right_az: f64, x: f64) -> f64 {
    let mid_az = (left_az + right_az) / 2.0;
    let az_range = right_az - mid_az;

    let (gain_l, gain_r) = {
        let t = x * std::f64::consts::FRAC_PI_2;
        (t.cos(), t.sin())
    };
    let gain_r = gain_r / (gain_l + gain_r);

    let rel_az = (2.0 * (gain_r - 0.5) * az_range.to_radians().tan())
        .atan()
        .to_degrees();

    mid_az + rel_az
}

/// Convert a polar position to Cartesian according to BS.2127 section 10.
pub fn point_polar_to_cart(az: f64, el: f64, d: f64) -> Vec3 {
    let (z, r_xy) = if el.abs() > EL_TOP {
        let el_tilde = EL_TOP_TILDE + (90.0 - EL_TOP_TILDE) * (el.abs() - EL_TOP) / (90.0 - EL_TOP);
        (d * el.signum(), d * (90.0 - el_tilde).to_radians().tan())
    } else {
        let el_tilde = EL_TOP_TILDE * el / EL_TOP;
        (el_tilde.to_radians().tan() * d, d)
    };

    let ((left_az, left_pos), (right_az, right_pos)) = find_sector(az);

    let rel_az = relative_angle(right_az, az);
    let rel_left_az = relative_angle(right_az, left_az);
    let p = map_az_to_linear(rel_left_az, right_az, rel_az);

    let xy = left_pos + (right_pos - left_pos) * p;

    Vec3::new(r_xy * xy.x, r_xy * xy.y, z)
}

/// Convert a Cartesian position to polar according to BS.2127 section 10.
pub fn point_cart_to_polar(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let eps = 1e-10;

    if x.abs() < eps && y.abs() < eps {
        return if z.abs() < eps {
            (0.0, 0.0, 0.0)
        } else {
            (0.0, z.signum() * 90.0, z.abs())
        };
    }

    let ((left_az, left_pos), (right_az, right_pos)) =
        find_cart_sector(azimuth(Vec3::new(x, y, 0.0)));

    // solve g_l * left + g_r * right = (x, y) in the horizontal plane
    let det = left_pos.x * right_pos.y - right_pos.x * left_pos.y;
    let g_l = (x * right_pos.y - right_pos.x * y) / det;
    let g_r = (left_pos.x * y - x * left_pos.y) / det;
    let r_xy = g_l + g_r;

    let rel_left_az = relative_angle(right_az, left_az);
    let az = map_linear_to_az(rel_left_az, right_az, g_r / r_xy);
    let az = relative_angle(-180.0, az);

    let el_tilde = (z / r_xy).atan().to_degrees();

    let (el, d) = if el_tilde.abs() > EL_TOP_TILDE {
        let abs_el = EL_TOP + (90.0 - EL_TOP) * (el_tilde.abs() - EL_TOP_TILDE) / (90.0 - EL_TOP_TILDE);
        (el_tilde.signum() * abs_el, z.abs())
    } else {
        (EL_TOP * el_tilde / EL_TOP_TILDE, r_xy)
    };

    (az, el, d)
}

fn whd2xyz(width: f64, height: f64, depth: f64) -> (f64, f64, f64) {
    let x_size_width = if width < 180.0 { (width / 2.0).to_radians().sin() } else { 1.0 };
    let y_size_width = (1.0 - (width / 2.0).to_radians().cos()) / 2.0;

    let z_size_height = if height < 180.0 { (height / 2.0).to_radians().sin() } else { 1.0 };
    let y_size_height = (1.0 - (height / 2.0).to_radians().cos()) / 2.0;

    let y_size_depth = depth;

    (
        x_size_width,
        y_size_width.max(y_size_height).max(y_size_depth),
        z_size_height,
    )
}

fn xyz2whd(s_x: f64, s_y: f64, s_z: f64) -> (f64, f64, f64) {
    let width_from_sx = 2.0 * s_x.asin().to_degrees();
    let width_from_sy = 2.0 * (1.0 - 2.0 * s_y).acos().to_degrees();
    let width = width_from_sx + s_x * (width_from_sy - width_from_sx).max(0.0);

    let height_from_sz = 2.0 * s_z.asin().to_degrees();
    let height_from_sy = 2.0 * (1.0 - 2.0 * s_y).acos().to_degrees();
    let height = height_from_sz + s_z * (height_from_sy - height_from_sz).max(0.0);

    // depth is the y size not accounted for by the calculated width and
    // height
    let equiv_y = whd2xyz(width, height, 0.0).1;
    let depth = (s_y - equiv_y).max(0.0);

    (width, height, depth)
}

/// Column norms of the local coordinate system at (az, el) with rows scaled
/// by (sx, sy, sz).
fn scaled_axis_norms(axes: [Vec3; 3], scale: [f64; 3]) -> (f64, f64, f64) {
    let col = |f: fn(Vec3) -> f64| {
        (0..3)
            .map(|i| (f(axes[i]) * scale[i]).powi(2))
            .sum::<f64>()
            .sqrt()
    };
    (col(|v| v.x), col(|v| v.y), col(|v| v.z))
}

/// Convert a position and extent from polar to Cartesian; returns
/// (position, x size, y size, z size).
pub fn extent_polar_to_cart(
    az: f64,
    el: f64,
    dist: f64,
    width: f64,
    height: f64,
    depth: f64,
) -> (Vec3, f64, f64, f64) {
    let position = point_polar_to_cart(az, el, dist);

    let (front_xs, front_ys, front_zs) = whd2xyz(width, height, depth);
    let (xs, ys, zs) = scaled_axis_norms(
        local_coordinate_system(az, el),
        [front_xs, front_ys, front_zs],
    );

    (position, xs, ys, zs)
}

/// Convert a position and extent from Cartesian to polar; returns
/// (azimuth, elevation, distance, width, height, depth).
pub fn extent_cart_to_polar(
    x: f64,
    y: f64,
    z: f64,
    xs: f64,
    ys: f64,
    zs: f64,
) -> (f64, f64, f64, f64, f64, f64) {
    let (az, el, dist) = point_cart_to_polar(x, y, z);

    // transpose: project the world-axis sizes back onto the local axes
    let axes = local_coordinate_system(az, el);
    let transposed = [
        Vec3::new(axes[0].x, axes[1].x, axes[2].x),
        Vec3::new(axes[0].y, axes[1].y, axes[2].y),
        Vec3::new(axes[0].z, axes[1].z, axes[2].z),
    ];
    let (sx, sy, sz) = scaled_axis_norms(transposed, [xs, ys, zs]);
    let (width, height, depth) = xyz2whd(sx, sy, sz);

    (az, el, dist, width, height, depth)
}

/// Convert a block format to polar coordinates; Cartesian blocks have their
/// position and extent converted and the cartesian flag cleared.
pub fn to_polar(block: &ObjectsBlock) -> ObjectsBlock {
    let ObjectPosition::Cartesian(position) = block.position else {
        let mut out = block.clone();
        out.cartesian = false;
        return out;
    };

    let (az, el, dist, width, height, depth) = extent_cart_to_polar(
        position.x,
        position.y,
        position.z,
        block.width,
        block.depth,
        block.height,
    );

    let mut out = block.clone();
    out.position = ObjectPosition::Polar(ObjectPolarPosition {
        azimuth: az,
        elevation: el,
        distance: dist,
        screen_edge_lock: position.screen_edge_lock,
    });
    out.width = width;
    out.height = height;
    out.depth = depth;
    out.cartesian = false;
    out
}

/// Convert a block format to Cartesian coordinates; polar blocks have their
/// position and extent converted and the cartesian flag set.
pub fn to_cartesian(block: &ObjectsBlock) -> ObjectsBlock {
    let ObjectPosition::Polar(position) = block.position else {
        let mut out = block.clone();
        out.cartesian = true;
        return out;
    };

    let (pos, xs, ys, zs) = extent_polar_to_cart(
        position.azimuth,
        position.elevation,
        position.distance,
        block.width,
        block.height,
        block.depth,
    );

    let mut out = block.clone();
    out.position = ObjectPosition::Cartesian(ObjectCartesianPosition {
        x: pos.x,
        y: pos.y,
        z: pos.z,
        screen_edge_lock: position.screen_edge_lock,
    });
    out.width = xs;
    out.depth = ys;
    out.height = zs;
    out.cartesian = true;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corners_map_to_cube() {
        let cases = [
            (0.0, [0.0, 1.0, 0.0]),
            (30.0, [-1.0, 1.0, 0.0]),
            (-30.0, [1.0, 1.0, 0.0]),
            (110.0, [-1.0, -1.0, 0.0]),
            (-110.0, [1.0, -1.0, 0.0]),
        ];
        for (az, expected) in cases {
            let p = point_polar_to_cart(az, 0.0, 1.0);
            assert!(
                (p - Vec3::from_array(expected)).norm() < 1e-10,
                "az {}: {:?}",
                az,
                p
            );
        }
    }

    #[test]
    fn test_elevation_mapping() {
        // elevation 30 maps to the top of the cube
        let p = point_polar_to_cart(0.0, 30.0, 1.0);
        assert!((p - Vec3::new(0.0, 1.0, 1.0)).norm() < 1e-10);

        // straight up maps to the centre of the top face
        let p = point_polar_to_cart(0.0, 90.0, 1.0);
        assert!((p - Vec3::new(0.0, 0.0, 1.0)).norm() < 1e-10);
    }

    #[test]
    fn test_round_trip() {
        for &az in &[-150.0, -110.0, -70.0, -30.0, 0.0, 15.0, 30.0, 90.0, 180.0] {
            for &el in &[-60.0, -30.0, -10.0, 0.0, 10.0, 30.0, 60.0] {
                for &d in &[0.5, 1.0] {
                    let p = point_polar_to_cart(az, el, d);
                    let (az2, el2, d2) = point_cart_to_polar(p.x, p.y, p.z);
                    let az_err = (relative_angle(az - 180.0, az2) - az).abs();
                    assert!(
                        az_err < 1e-10 && (el2 - el).abs() < 1e-10 && (d2 - d).abs() < 1e-10,
                        "({}, {}, {}) -> {:?} -> ({}, {}, {})",
                        az, el, d, p, az2, el2, d2
                    );
                }
            }
        }
    }

    #[test]
    fn test_degenerate_positions() {
        assert_eq!(point_cart_to_polar(0.0, 0.0, 0.0), (0.0, 0.0, 0.0));
        let (az, el, d) = point_cart_to_polar(0.0, 0.0, 0.5);
        assert_eq!((az, el, d), (0.0, 90.0, 0.5));
    }

    #[test]
    fn test_block_conversion_round_trip_flags() {
        let block = ObjectsBlock::with_position("AB_1", ObjectPosition::polar(10.0, 5.0, 1.0));
        let cart_block = to_cartesian(&block);
        assert!(cart_block.cartesian);
        let polar_block = to_polar(&cart_block);
        assert!(!polar_block.cartesian);

        let ObjectPosition::Polar(p) = polar_block.position else { panic!() };
        assert!((p.azimuth - 10.0).abs() < 1e-10);
        assert!((p.elevation - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_extent_conversion_width() {
        // a 90 degree wide flat source at the front
        let (pos, xs, ys, zs) = extent_polar_to_cart(0.0, 0.0, 1.0, 90.0, 0.0, 0.0);
        assert!((pos - Vec3::new(0.0, 1.0, 0.0)).norm() < 1e-10);
        assert!(xs > 0.5 && xs < 1.0);
        assert!(ys < xs);
        assert!(zs.abs() < 1e-10);
    }
}
