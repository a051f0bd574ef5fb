//! Test data generators for grids and synthetic weather-like fields.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

use nwp_common::{GridDefinition, GridProjection, ScanMode, MICRODEGREES};

/// A latitude/longitude grid, possibly rotated, in degrees.
///
/// Angles should be whole millidegrees so that GRIB1 (millidegree) and GRIB2
/// (microdegree) encodings of the same grid decode to equal definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct TestGrid {
    pub ni: usize,
    pub nj: usize,
    pub first_lat: f64,
    pub first_lon: f64,
    pub di: f64,
    pub dj: f64,
    /// GRIB scanning mode flag byte
    pub scan_mode: u8,
    /// (latitude, longitude, rotation angle) of the southern pole
    pub south_pole: Option<(f64, f64, f64)>,
}

impl TestGrid {
    /// Regular grid scanned west to east, north to south.
    pub fn latlon(ni: usize, nj: usize, first_lat: f64, first_lon: f64, di: f64, dj: f64) -> Self {
        Self {
            ni,
            nj,
            first_lat,
            first_lon,
            di,
            dj,
            scan_mode: 0x00,
            south_pole: None,
        }
    }

    /// Rotated grid scanned west to east, south to north.
    pub fn rotated(
        ni: usize,
        nj: usize,
        first_lat: f64,
        first_lon: f64,
        increment: f64,
        south_pole_lat: f64,
        south_pole_lon: f64,
    ) -> Self {
        Self {
            ni,
            nj,
            first_lat,
            first_lon,
            di: increment,
            dj: increment,
            scan_mode: 0x40,
            south_pole: Some((south_pole_lat, south_pole_lon, 0.0)),
        }
    }

    /// Small rotated grid shaped like a HARMONIE domain over the Netherlands.
    pub fn harmonie() -> Self {
        Self::rotated(6, 4, -1.5, -2.5, 0.5, -40.0, 10.0)
    }

    pub fn with_scan_mode(mut self, flag: u8) -> Self {
        self.scan_mode = flag;
        self
    }

    pub fn num_points(&self) -> usize {
        self.ni * self.nj
    }

    pub fn last_lat(&self) -> f64 {
        let sign = if self.scan_mode & 0x40 != 0 { 1.0 } else { -1.0 };
        self.first_lat + sign * self.dj * (self.nj as f64 - 1.0)
    }

    pub fn last_lon(&self) -> f64 {
        let sign = if self.scan_mode & 0x80 != 0 { -1.0 } else { 1.0 };
        self.first_lon + sign * self.di * (self.ni as f64 - 1.0)
    }

    /// The definition a decoder is expected to produce for this grid.
    pub fn definition(&self) -> GridDefinition {
        let micro = |deg: f64| (deg * MICRODEGREES).round() as i64;
        GridDefinition {
            ni: self.ni,
            nj: self.nj,
            first_lat: micro(self.first_lat),
            first_lon: micro(self.first_lon),
            last_lat: micro(self.last_lat()),
            last_lon: micro(self.last_lon()),
            di: micro(self.di),
            dj: micro(self.dj),
            scan_mode: ScanMode::from_grib_flag(self.scan_mode),
            projection: match self.south_pole {
                None => GridProjection::LatLon,
                Some((lat, lon, angle)) => GridProjection::RotatedLatLon {
                    south_pole_lat: micro(lat),
                    south_pole_lon: micro(lon),
                    rotation_angle: micro(angle),
                },
            },
        }
    }
}

/// Creates a test field with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`, row-major.
///
/// ```
/// use test_utils::create_test_field;
///
/// let field = create_test_field(10, 5);
/// assert_eq!(field.len(), 50);
/// assert_eq!(field[1], 1000.0);  // col=1, row=0
/// assert_eq!(field[10], 1.0);    // col=0, row=1
/// ```
pub fn create_test_field(width: usize, height: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f64);
        }
    }
    data
}

/// Creates a temperature-like field in Kelvin.
///
/// A gradient from `base` in the first cell rising by 0.5 K per column and
/// 0.25 K per row. Values are exact in two decimals so they survive simple
/// packing at decimal scale 2 unchanged.
pub fn create_temperature_field(grid: &TestGrid, base: f64) -> Vec<f64> {
    let mut data = Vec::with_capacity(grid.num_points());
    for row in 0..grid.nj {
        for col in 0..grid.ni {
            data.push(base + col as f64 * 0.5 + row as f64 * 0.25);
        }
    }
    data
}

/// Replace every `nth` value with NaN (starting at index `offset`).
pub fn with_missing(mut values: Vec<f64>, nth: usize, offset: usize) -> Vec<f64> {
    for value in values.iter_mut().skip(offset).step_by(nth.max(1)) {
        *value = f64::NAN;
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_corners_follow_scan_mode() {
        let grid = TestGrid::harmonie();
        assert_eq!(grid.last_lat(), 0.0);
        assert_eq!(grid.last_lon(), 0.0);

        let north_first = TestGrid::latlon(3, 3, 55.0, 3.0, 1.0, 1.0);
        assert_eq!(north_first.last_lat(), 53.0);
        assert_eq!(north_first.last_lon(), 5.0);
    }

    #[test]
    fn test_definition_in_microdegrees() {
        let def = TestGrid::harmonie().definition();
        assert_eq!(def.first_lat, -1_500_000);
        assert_eq!(def.di, 500_000);
        assert!(matches!(def.projection, GridProjection::RotatedLatLon { .. }));
    }

    #[test]
    fn test_with_missing() {
        let values = with_missing(vec![1.0; 6], 3, 1);
        assert!(values[1].is_nan());
        assert!(values[4].is_nan());
        assert_eq!(values.iter().filter(|v| v.is_nan()).count(), 2);
    }
}
