//! Geometry in the ADM coordinate convention
//!
//! Azimuth is measured anticlockwise from the front in degrees, elevation
//! upwards from the equator. +X is right, +Y is forward, +Z is up, so a
//! source at azimuth 90 lies on -X.

use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// A 3D vector / Cartesian position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Normalise to a unit vector; positions closer than 1e-10 to the origin
    /// keep their direction ill-defined, so fall back to straight ahead.
    pub fn safe_norm(self) -> Self {
        let n = self.norm();
        if n < 1e-10 {
            Vec3::new(0.0, 1.0, 0.0)
        } else {
            self * (1.0 / n)
        }
    }

    pub fn distance_to(self, other: Self) -> f64 {
        (self - other).norm()
    }

    pub fn as_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn from_array(a: [f64; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }

    /// Component-wise clamp.
    pub fn clamp(self, min: f64, max: f64) -> Self {
        Self::new(
            self.x.clamp(min, max),
            self.y.clamp(min, max),
            self.z.clamp(min, max),
        )
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

/// Convert ADM-format polar coordinates to Cartesian.
pub fn cart(azimuth: f64, elevation: f64, distance: f64) -> Vec3 {
    let az = -azimuth.to_radians();
    let el = elevation.to_radians();
    Vec3::new(
        az.sin() * el.cos() * distance,
        az.cos() * el.cos() * distance,
        el.sin() * distance,
    )
}

/// Anticlockwise azimuth in degrees of a Cartesian position.
pub fn azimuth(position: Vec3) -> f64 {
    -position.x.atan2(position.y).to_degrees()
}

/// Elevation in degrees of a Cartesian position.
pub fn elevation(position: Vec3) -> f64 {
    let radius = position.x.hypot(position.y);
    position.z.atan2(radius).to_degrees()
}

/// Distance of a Cartesian position from the origin.
pub fn distance(position: Vec3) -> f64 {
    position.norm()
}

/// Assuming y is clockwise from x, shift y by multiples of 360 until it
/// represents the same angle but is not less than x.
pub fn relative_angle(x: f64, mut y: f64) -> f64 {
    while y - 360.0 >= x {
        y -= 360.0;
    }
    while y < x {
        y += 360.0;
    }
    y
}

/// Assuming end is anticlockwise from start, is the angle x inside
/// [start, end] within some tolerance?
///
/// A range spanning a full revolution (e.g. (-180, 180)) matches any angle,
/// while a zero-size range matches a single angle.
pub fn inside_angle_range(mut x: f64, start: f64, mut end: f64, tol: f64) -> bool {
    while end - 360.0 > start {
        end -= 360.0;
    }
    while end < start {
        end += 360.0;
    }

    let start_tol = start - tol;
    while x - 360.0 >= start_tol {
        x -= 360.0;
    }
    while x < start_tol {
        x += 360.0;
    }

    x <= end + tol
}

/// Piecewise-linear interpolation through sorted breakpoints, clamping
/// outside the range.
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    debug_assert!(xs.windows(2).all(|w| w[0] <= w[1]), "breakpoints not sorted");

    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }

    for i in 0..xs.len() - 1 {
        if x <= xs[i + 1] {
            if xs[i] == xs[i + 1] {
                return ys[i + 1];
            }
            let t = (x - xs[i]) / (xs[i + 1] - xs[i]);
            return ys[i] + t * (ys[i + 1] - ys[i]);
        }
    }
    ys[ys.len() - 1]
}

/// Basis vectors pointing along x, y and z, rotated so that +y points at
/// `cart(az, el, 1)`.
pub fn local_coordinate_system(az: f64, el: f64) -> [Vec3; 3] {
    [
        cart(az - 90.0, 0.0, 1.0),
        cart(az, el, 1.0),
        cart(az, el + 90.0, 1.0),
    ]
}

/// Order the vertices of a convex, approximately planar polygon.
///
/// Returns indices into `vertices` such that walking them in order traces the
/// polygon edge; behaves like an argsort by angle around the centroid.
pub fn ngon_vertex_order(vertices: &[Vec3]) -> Vec<usize> {
    let n = vertices.len() as f64;
    let centre = vertices
        .iter()
        .fold(Vec3::ZERO, |acc, &v| acc + v) * (1.0 / n);

    // pick two vertices to span a plane; the second minimises colinearity
    // with the first
    let a = vertices[0] - centre;
    let b = vertices[1..]
        .iter()
        .map(|&v| v - centre)
        .min_by(|u, v| {
            u.dot(a)
                .abs()
                .partial_cmp(&v.dot(a).abs())
                .expect("non-finite vertex")
        })
        .expect("polygon needs at least two vertices");

    let mut angles: Vec<(usize, f64)> = vertices
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let rel = v - centre;
            (i, rel.dot(a).atan2(rel.dot(b)))
        })
        .collect();

    angles.sort_by(|x, y| x.1.partial_cmp(&y.1).expect("non-finite angle"));
    angles.into_iter().map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).norm() < 1e-10, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_cart() {
        assert_close(cart(0.0, 0.0, 1.0), Vec3::new(0.0, 1.0, 0.0));
        assert_close(cart(90.0, 0.0, 1.0), Vec3::new(-1.0, 0.0, 0.0));
        assert_close(cart(-90.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 0.0));
        assert_close(cart(0.0, 90.0, 1.0), Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_azimuth_elevation_round_trip() {
        for &az in &[-170.0, -90.0, -30.0, 0.0, 45.0, 135.0] {
            for &el in &[-80.0, -30.0, 0.0, 30.0, 80.0] {
                let pos = cart(az, el, 1.0);
                assert!((azimuth(pos) - az).abs() < 1e-10);
                assert!((elevation(pos) - el).abs() < 1e-10);
                assert!((distance(pos) - 1.0).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_inside_angle_range() {
        assert!(inside_angle_range(0.0, -180.0, 180.0, 0.0));
        assert!(inside_angle_range(180.0, -180.0, 180.0, 0.0));
        assert!(inside_angle_range(0.0, 0.0, 0.0, 0.0));
        assert!(!inside_angle_range(10.0, 0.0, 0.0, 0.0));
        assert!(inside_angle_range(10.0, 0.0, 0.0, 10.0));
        // range wrapping through the back
        assert!(inside_angle_range(180.0, 170.0, -170.0, 0.0));
        assert!(!inside_angle_range(0.0, 170.0, -170.0, 0.0));
    }

    #[test]
    fn test_relative_angle() {
        assert_eq!(relative_angle(0.0, -30.0), 330.0);
        assert_eq!(relative_angle(0.0, 30.0), 30.0);
        assert_eq!(relative_angle(-180.0, 190.0), -170.0);
    }

    #[test]
    fn test_ngon_vertex_order() {
        let verts = [
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(1.1, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
        ];
        let order = ngon_vertex_order(&verts);

        // adjacent entries in the result must share an edge of the quad;
        // opposite corners (0,3) and (1,2) must not be adjacent
        for i in 0..4 {
            let a = order[i];
            let b = order[(i + 1) % 4];
            assert!(!matches!((a.min(b), a.max(b)), (0, 3) | (1, 2)));
        }
    }

    #[test]
    fn test_interp() {
        assert_eq!(interp(-1.0, &[0.0, 1.0], &[10.0, 20.0]), 10.0);
        assert_eq!(interp(0.5, &[0.0, 1.0], &[10.0, 20.0]), 15.0);
        assert_eq!(interp(2.0, &[0.0, 1.0], &[10.0, 20.0]), 20.0);
        assert_eq!(interp(1.5, &[0.0, 1.0, 2.0], &[0.0, 10.0, 30.0]), 20.0);
    }

    #[test]
    fn test_local_coordinate_system_identity() {
        let [x, y, z] = local_coordinate_system(0.0, 0.0);
        assert_close(x, Vec3::new(1.0, 0.0, 0.0));
        assert_close(y, Vec3::new(0.0, 1.0, 0.0));
        assert_close(z, Vec3::new(0.0, 0.0, 1.0));
    }
}
