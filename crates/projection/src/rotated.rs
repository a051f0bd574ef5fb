//! Rotated latitude/longitude grids.
//!
//! A rotated grid is a regular latitude/longitude grid on a sphere whose
//! south pole was moved to (`south_pole_lat`, `south_pole_lon`) and then
//! turned by `rotation_angle` about the new polar axis. Going back to true
//! coordinates is a rotation of the sphere about the same axes in reverse.

use nwp_common::{normalize_longitude, GridProjection, MICRODEGREES};

/// Inverse rotation from rotated grid coordinates to true coordinates.
///
/// All angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedPole {
    sin_pole_lat: f64,
    cos_pole_lat: f64,
    /// Longitude of the rotated north pole, radians
    pole_lon: f64,
    /// Rotation about the new polar axis, radians
    angle: f64,
}

impl RotatedPole {
    /// Rotation whose southern pole lies at (`south_pole_lat`,
    /// `south_pole_lon`), turned by `rotation_angle` degrees.
    pub fn new(south_pole_lat: f64, south_pole_lon: f64, rotation_angle: f64) -> Self {
        // Work with the northern pole of the rotated sphere
        let pole_lat = (-south_pole_lat).to_radians();
        let pole_lon = (south_pole_lon + 180.0).to_radians();
        let (sin_pole_lat, cos_pole_lat) = pole_lat.sin_cos();
        Self {
            sin_pole_lat,
            cos_pole_lat,
            pole_lon,
            angle: rotation_angle.to_radians(),
        }
    }

    /// Rotation of a grid projection, `None` unless it is rotated.
    pub fn from_projection(projection: &GridProjection) -> Option<Self> {
        match projection {
            GridProjection::RotatedLatLon {
                south_pole_lat,
                south_pole_lon,
                rotation_angle,
            } => Some(Self::new(
                *south_pole_lat as f64 / MICRODEGREES,
                *south_pole_lon as f64 / MICRODEGREES,
                *rotation_angle as f64 / MICRODEGREES,
            )),
            _ => None,
        }
    }

    /// True (latitude, longitude) of a point given in rotated coordinates.
    /// The longitude is normalized to [-180, 180).
    pub fn unrotate(&self, rotated_lat: f64, rotated_lon: f64) -> (f64, f64) {
        let lat_r = rotated_lat.to_radians();
        let lon_r = rotated_lon.to_radians() - self.angle;

        let (sin_lat_r, cos_lat_r) = lat_r.sin_cos();
        let (sin_lon_r, cos_lon_r) = lon_r.sin_cos();

        let sin_lat = self.sin_pole_lat * sin_lat_r + self.cos_pole_lat * cos_lat_r * cos_lon_r;
        let lat = sin_lat.clamp(-1.0, 1.0).asin();

        let y = cos_lat_r * sin_lon_r;
        let x = self.cos_pole_lat * sin_lat_r - self.sin_pole_lat * cos_lat_r * cos_lon_r;
        let lon = self.pole_lon - y.atan2(x);

        (lat.to_degrees(), normalize_longitude(lon.to_degrees()))
    }
}
