//! Grid definitions and projected coordinates.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Number of microdegrees per degree. Grid angles are stored as integer
/// microdegrees so that definitions compare and hash exactly.
pub const MICRODEGREES: f64 = 1_000_000.0;

/// Scan mode flags for grid data ordering.
///
/// Based on GRIB2 scanning mode (Flag Table 3.4); GRIB1 uses the same
/// leading bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanMode {
    /// +i direction: false = +x (east), true = -x (west)
    pub i_negative: bool,
    /// +j direction: false = -y (south), true = +y (north)
    pub j_positive: bool,
    /// Adjacent points: false = i direction, true = j direction
    pub j_consecutive: bool,
    /// Row scan direction alternates
    pub alternating_rows: bool,
}

impl ScanMode {
    /// Rows go west to east, starting in the north.
    pub fn standard() -> Self {
        Self {
            i_negative: false,
            j_positive: false,
            j_consecutive: false,
            alternating_rows: false,
        }
    }

    /// Create from GRIB flag byte.
    pub fn from_grib_flag(flag: u8) -> Self {
        Self {
            i_negative: (flag & 0x80) != 0,
            j_positive: (flag & 0x40) != 0,
            j_consecutive: (flag & 0x20) != 0,
            alternating_rows: (flag & 0x10) != 0,
        }
    }

    pub fn to_grib_flag(&self) -> u8 {
        let mut flag = 0u8;
        if self.i_negative {
            flag |= 0x80;
        }
        if self.j_positive {
            flag |= 0x40;
        }
        if self.j_consecutive {
            flag |= 0x20;
        }
        if self.alternating_rows {
            flag |= 0x10;
        }
        flag
    }
}

impl Default for ScanMode {
    fn default() -> Self {
        Self::standard()
    }
}

/// Map projection of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GridProjection {
    /// Regular latitude/longitude grid.
    LatLon,
    /// Latitude/longitude grid on a sphere whose south pole was moved to
    /// (`south_pole_lat`, `south_pole_lon`) and then rotated by
    /// `rotation_angle` about the new polar axis. Microdegrees.
    RotatedLatLon {
        south_pole_lat: i64,
        south_pole_lon: i64,
        rotation_angle: i64,
    },
    /// Any other grid template; records on it can be indexed and decoded but
    /// not projected.
    Unsupported { template: u16 },
}

impl GridProjection {
    /// Position of the rotated grid's north pole in true coordinates,
    /// in degrees (latitude, longitude).
    pub fn north_pole(&self) -> Option<(f64, f64)> {
        match self {
            Self::LatLon => Some((90.0, 0.0)),
            Self::RotatedLatLon {
                south_pole_lat,
                south_pole_lon,
                ..
            } => {
                let lat = -(*south_pole_lat as f64) / MICRODEGREES;
                let lon = normalize_longitude(*south_pole_lon as f64 / MICRODEGREES - 180.0);
                Some((lat, lon))
            }
            Self::Unsupported { .. } => None,
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Self::LatLon => "regular_ll",
            Self::RotatedLatLon { .. } => "rotated_ll",
            Self::Unsupported { .. } => "unsupported",
        }
    }
}

/// Wrap a longitude into [-180, 180).
pub fn normalize_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped >= 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Definition of a (possibly rotated) latitude/longitude grid.
///
/// Angles are microdegrees in the grid's own coordinate system. Increments
/// are magnitudes; their direction comes from the scan mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridDefinition {
    /// Number of points along a row (columns)
    pub ni: usize,
    /// Number of rows
    pub nj: usize,
    pub first_lat: i64,
    pub first_lon: i64,
    pub last_lat: i64,
    pub last_lon: i64,
    /// i direction increment
    pub di: i64,
    /// j direction increment
    pub dj: i64,
    pub scan_mode: ScanMode,
    pub projection: GridProjection,
}

impl GridDefinition {
    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.nj, self.ni)
    }

    pub fn num_points(&self) -> usize {
        self.ni * self.nj
    }

    /// Signed column increment in degrees.
    pub fn column_step(&self) -> f64 {
        let step = self.di as f64 / MICRODEGREES;
        if self.scan_mode.i_negative {
            -step
        } else {
            step
        }
    }

    /// Signed row increment in degrees.
    pub fn row_step(&self) -> f64 {
        let step = self.dj as f64 / MICRODEGREES;
        if self.scan_mode.j_positive {
            step
        } else {
            -step
        }
    }

    /// Grid-native longitude of column `i`, in degrees.
    pub fn native_longitude(&self, i: usize) -> f64 {
        self.first_lon as f64 / MICRODEGREES + i as f64 * self.column_step()
    }

    /// Grid-native latitude of row `j`, in degrees.
    pub fn native_latitude(&self, j: usize) -> f64 {
        self.first_lat as f64 / MICRODEGREES + j as f64 * self.row_step()
    }
}

/// True geographic coordinates of every cell of one grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCoordinates {
    /// Grid-native latitude per row (degrees)
    pub native_latitudes: Vec<f64>,
    /// Grid-native longitude per column (degrees)
    pub native_longitudes: Vec<f64>,
    /// True latitude, shape (rows, columns)
    pub latitude: Array2<f64>,
    /// True longitude in [-180, 180), shape (rows, columns)
    pub longitude: Array2<f64>,
}

impl GridCoordinates {
    pub fn shape(&self) -> (usize, usize) {
        self.latitude.dim()
    }
}
