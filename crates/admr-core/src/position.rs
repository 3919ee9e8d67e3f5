//! Polar and Cartesian position and screen types

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::geom::{self, Vec3};

/// A 3D position in ADM-format polar coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarPosition {
    /// Anticlockwise azimuth in degrees, measured from the front
    pub azimuth: f64,
    /// Elevation in degrees, measured upwards from the equator
    pub elevation: f64,
    /// Distance relative to the reference radius
    pub distance: f64,
}

impl PolarPosition {
    pub fn new(azimuth: f64, elevation: f64, distance: f64) -> Self {
        Self { azimuth, elevation, distance }
    }

    /// Validate the coordinate ranges of an ADM position element.
    pub fn validate(&self) -> CoreResult<()> {
        if !(-180.0..=180.0).contains(&self.azimuth) {
            return Err(CoreError::ValueOutOfRange {
                value: self.azimuth,
                min: -180.0,
                max: 180.0,
            });
        }
        if !(-90.0..=90.0).contains(&self.elevation) {
            return Err(CoreError::ValueOutOfRange {
                value: self.elevation,
                min: -90.0,
                max: 90.0,
            });
        }
        if self.distance < 0.0 {
            return Err(CoreError::ValueOutOfRange {
                value: self.distance,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        Ok(())
    }

    pub fn as_cartesian(&self) -> Vec3 {
        geom::cart(self.azimuth, self.elevation, self.distance)
    }

    /// The same direction projected onto the unit sphere.
    pub fn norm_position(&self) -> Vec3 {
        geom::cart(self.azimuth, self.elevation, 1.0)
    }
}

/// A 3D position in ADM-format Cartesian coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CartesianPosition {
    /// Left-to-right position, from -1 to 1
    #[serde(rename = "X")]
    pub x: f64,
    /// Back-to-front position, from -1 to 1
    #[serde(rename = "Y")]
    pub y: f64,
    /// Bottom-to-top position, from -1 to 1
    #[serde(rename = "Z")]
    pub z: f64,
}

impl CartesianPosition {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn as_cartesian(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

/// A position in either coordinate convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Position {
    Polar(PolarPosition),
    Cartesian(CartesianPosition),
}

impl Position {
    pub fn as_cartesian(&self) -> Vec3 {
        match self {
            Position::Polar(p) => p.as_cartesian(),
            Position::Cartesian(c) => c.as_cartesian(),
        }
    }
}

/// Screen representation using polar coordinates.
///
/// Used for both the audioProgrammeReferenceScreen and the screen position in
/// the reproduction room.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarScreen {
    pub aspect_ratio: f64,
    pub centre_position: PolarPosition,
    pub width_azimuth: f64,
}

/// Screen representation using Cartesian coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CartesianScreen {
    pub aspect_ratio: f64,
    pub centre_position: CartesianPosition,
    pub width_x: f64,
}

/// A screen in either coordinate convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Screen {
    Polar(PolarScreen),
    Cart(CartesianScreen),
}

impl Screen {
    /// The default screen position, size and shape.
    pub fn default_screen() -> Self {
        Screen::Polar(PolarScreen {
            aspect_ratio: 1.78,
            centre_position: PolarPosition::new(0.0, 0.0, 1.0),
            width_azimuth: 58.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polar_validate() {
        assert!(PolarPosition::new(30.0, 0.0, 1.0).validate().is_ok());
        assert!(PolarPosition::new(190.0, 0.0, 1.0).validate().is_err());
        assert!(PolarPosition::new(0.0, 95.0, 1.0).validate().is_err());
        assert!(PolarPosition::new(0.0, 0.0, -1.0).validate().is_err());
    }

    #[test]
    fn test_position_as_cartesian() {
        let p = Position::Polar(PolarPosition::new(0.0, 0.0, 1.0));
        assert!((p.as_cartesian() - Vec3::new(0.0, 1.0, 0.0)).norm() < 1e-10);

        let c = Position::Cartesian(CartesianPosition::new(0.5, -0.5, 0.0));
        assert_eq!(c.as_cartesian(), Vec3::new(0.5, -0.5, 0.0));
    }

    #[test]
    fn test_default_screen() {
        match Screen::default_screen() {
            Screen::Polar(s) => {
                assert_eq!(s.width_azimuth, 58.0);
                assert_eq!(s.aspect_ratio, 1.78);
            }
            _ => panic!("default screen should be polar"),
        }
    }
}
