//! The aggregated multi-dimensional dataset.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ndarray::{Array4, ArrayView2};

use crate::grid::{GridCoordinates, GridDefinition};
use crate::level::LevelType;
use crate::parameter::{ParameterDescription, ParameterId};
use crate::time::ForecastStep;

/// One parameter on one level type, merged across steps and levels.
///
/// `values` is indexed (step, level, row, column). `steps` and `levels` are
/// strictly ascending and match the first two axes. Combinations that were
/// not present in the input hold `missing_value`.
#[derive(Debug, Clone)]
pub struct AggregatedDataset {
    pub parameter: ParameterId,
    pub description: ParameterDescription,
    pub level_type: LevelType,
    pub reference_time: DateTime<Utc>,
    pub steps: Vec<ForecastStep>,
    pub levels: Vec<f64>,
    pub values: Array4<f64>,
    pub grid: Arc<GridDefinition>,
    pub coordinates: Arc<GridCoordinates>,
    pub missing_value: f64,
    /// Number of records written into `values`
    pub records_merged: usize,
}

impl AggregatedDataset {
    /// (steps, levels, rows, columns)
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        self.values.dim()
    }

    /// Values of one (step, level) combination, shape (rows, columns).
    pub fn slice(&self, step_index: usize, level_index: usize) -> ArrayView2<'_, f64> {
        self.values
            .slice(ndarray::s![step_index, level_index, .., ..])
    }

    pub fn step_index(&self, step: ForecastStep) -> Option<usize> {
        self.steps.binary_search(&step).ok()
    }

    pub fn level_index(&self, level: f64) -> Option<usize> {
        self.levels.iter().position(|l| *l == level)
    }

    /// Valid time of every step.
    pub fn valid_times(&self) -> Vec<DateTime<Utc>> {
        self.steps
            .iter()
            .map(|s| s.valid_time(self.reference_time))
            .collect()
    }

    pub fn is_missing(&self, value: f64) -> bool {
        if self.missing_value.is_nan() {
            value.is_nan()
        } else {
            value == self.missing_value
        }
    }

    /// True when every cell of the (step, level) slice is missing.
    pub fn slice_is_missing(&self, step_index: usize, level_index: usize) -> bool {
        self.slice(step_index, level_index)
            .iter()
            .all(|v| self.is_missing(*v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridProjection, ScanMode};
    use crate::parameter::ParameterCode;
    use chrono::TimeZone;
    use ndarray::Array2;

    fn dataset() -> AggregatedDataset {
        let grid = GridDefinition {
            ni: 3,
            nj: 2,
            first_lat: 0,
            first_lon: 0,
            last_lat: 1_000_000,
            last_lon: 2_000_000,
            di: 1_000_000,
            dj: 1_000_000,
            scan_mode: ScanMode::from_grib_flag(0x40),
            projection: GridProjection::LatLon,
        };
        let coordinates = GridCoordinates {
            native_latitudes: vec![0.0, 1.0],
            native_longitudes: vec![0.0, 1.0, 2.0],
            latitude: Array2::zeros((2, 3)),
            longitude: Array2::zeros((2, 3)),
        };
        let mut values = Array4::from_elem((2, 2, 2, 3), f64::NAN);
        values
            .slice_mut(ndarray::s![0, 1, .., ..])
            .fill(280.0);

        AggregatedDataset {
            parameter: ParameterId::new("t", ParameterCode::grib1(253, 11)),
            description: ParameterDescription::default(),
            level_type: LevelType::HeightAboveGround,
            reference_time: Utc.with_ymd_and_hms(2024, 2, 24, 0, 0, 0).unwrap(),
            steps: vec![ForecastStep::ZERO, ForecastStep::from_hours(1)],
            levels: vec![2.0, 50.0],
            values,
            grid: Arc::new(grid),
            coordinates: Arc::new(coordinates),
            missing_value: f64::NAN,
            records_merged: 1,
        }
    }

    #[test]
    fn test_lookup_indices() {
        let ds = dataset();
        assert_eq!(ds.step_index(ForecastStep::from_hours(1)), Some(1));
        assert_eq!(ds.step_index(ForecastStep::from_hours(2)), None);
        assert_eq!(ds.level_index(50.0), Some(1));
    }

    #[test]
    fn test_missing_slices() {
        let ds = dataset();
        assert!(!ds.slice_is_missing(0, 1));
        assert!(ds.slice_is_missing(0, 0));
        assert!(ds.slice_is_missing(1, 1));
        assert_eq!(ds.slice(0, 1)[[1, 2]], 280.0);
    }

    #[test]
    fn test_valid_times() {
        let ds = dataset();
        let times = ds.valid_times();
        assert_eq!(times[1], Utc.with_ymd_and_hms(2024, 2, 24, 1, 0, 0).unwrap());
    }
}
