//! Dataset shared by the writer round-trip tests.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use ndarray::{Array2, Array4};
use nwp_common::{
    AggregatedDataset, ForecastStep, GridCoordinates, GridDefinition, GridProjection, LevelType,
    ParameterCode, ParameterDescription, ParameterId, ScanMode,
};

/// 2 steps x 2 levels on a 4 x 5 rotated grid.
/// Value at (step, level, row, col) = step * 1000 + level * 100 + row * 10 + col
pub fn create_dataset() -> AggregatedDataset {
    let (nj, ni) = (4, 5);
    let grid = GridDefinition {
        ni,
        nj,
        first_lat: -1_500_000,
        first_lon: -2_500_000,
        last_lat: 0,
        last_lon: -500_000,
        di: 500_000,
        dj: 500_000,
        scan_mode: ScanMode::from_grib_flag(0x40),
        projection: GridProjection::RotatedLatLon {
            south_pole_lat: -40_000_000,
            south_pole_lon: 10_000_000,
            rotation_angle: 0,
        },
    };
    let coordinates = GridCoordinates {
        native_latitudes: (0..nj).map(|j| -1.5 + j as f64 * 0.5).collect(),
        native_longitudes: (0..ni).map(|i| -2.5 + i as f64 * 0.5).collect(),
        latitude: Array2::from_shape_fn((nj, ni), |(j, i)| 48.5 + j as f64 * 0.5 - i as f64 * 0.01),
        longitude: Array2::from_shape_fn((nj, ni), |(j, i)| 6.0 + i as f64 * 0.8 + j as f64 * 0.02),
    };
    let mut values = Array4::from_shape_fn((2, 2, nj, ni), |(s, l, j, i)| {
        (s * 1000 + l * 100 + j * 10 + i) as f64
    });
    // One unobserved (step, level) combination
    values
        .slice_mut(ndarray::s![1, 0, .., ..])
        .fill(f64::NAN);

    AggregatedDataset {
        parameter: ParameterId::new("t", ParameterCode::grib1(253, 11)),
        description: ParameterDescription {
            long_name: Some("Temperature".to_string()),
            units: Some("K".to_string()),
            standard_name: Some("air_temperature".to_string()),
        },
        level_type: LevelType::HeightAboveGround,
        reference_time: Utc.with_ymd_and_hms(2024, 2, 24, 16, 0, 0).unwrap(),
        steps: vec![ForecastStep::ZERO, ForecastStep::from_hours(3)],
        levels: vec![2.0, 50.0],
        values,
        grid: Arc::new(grid),
        coordinates: Arc::new(coordinates),
        missing_value: f64::NAN,
        records_merged: 3,
    }
}
