//! On-disk fixtures: synthetic model output written to temporary files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::generators::TestGrid;
use crate::grib1::Grib1Builder;
use crate::grib2::Grib2Builder;

/// Levels (metres above ground) of the standard scenario.
pub const SCENARIO_LEVELS: [u16; 2] = [2, 50];

/// Forecast steps (hours) of the standard scenario.
pub const SCENARIO_STEPS: [u16; 3] = [0, 1, 2];

/// Write concatenated messages to `dir/name` and return the file path.
pub fn write_grib_file(dir: &Path, name: &str, messages: &[Vec<u8>]) -> PathBuf {
    let path = dir.join(name);
    let bytes: Vec<u8> = messages.iter().flatten().copied().collect();
    fs::write(&path, bytes).expect("write GRIB fixture");
    path
}

/// Value of the standard scenario at one cell.
///
/// Distinct for every (step, level, row, column) and exact at two decimals.
pub fn scenario_value(step: u16, level: u16, row: usize, column: usize) -> f64 {
    250.0 + step as f64 * 10.0 + level as f64 * 0.5 + row as f64 + column as f64 * 0.25
}

/// Row-major scenario field for one (step, level).
pub fn scenario_field(grid: &TestGrid, step: u16, level: u16) -> Vec<f64> {
    let mut values = Vec::with_capacity(grid.num_points());
    for row in 0..grid.nj {
        for column in 0..grid.ni {
            values.push(scenario_value(step, level, row, column));
        }
    }
    values
}

/// GRIB1 messages of temperature on `grid` at every scenario level for one step.
pub fn scenario_grib1_messages(grid: &TestGrid, step: u16) -> Vec<Vec<u8>> {
    SCENARIO_LEVELS
        .iter()
        .map(|&level| {
            Grib1Builder::new(grid.clone())
                .level(105, level)
                .forecast_hours(step)
                .values(scenario_field(grid, step, level))
                .build()
        })
        .collect()
}

/// GRIB2 messages of temperature on `grid` at every scenario level for one step.
pub fn scenario_grib2_messages(grid: &TestGrid, step: u16) -> Vec<Vec<u8>> {
    SCENARIO_LEVELS
        .iter()
        .map(|&level| {
            Grib2Builder::new(grid.clone())
                .level(103, level as u32)
                .forecast_hours(step as u32)
                .values(scenario_field(grid, step, level))
                .build()
        })
        .collect()
}

/// Write the standard GRIB1 scenario, one file per step, the way HARMONIE
/// lays out its output (`fc2024022416+000grib_fp` and so on).
pub fn write_grib1_scenario(dir: &Path, grid: &TestGrid) -> Vec<PathBuf> {
    SCENARIO_STEPS
        .iter()
        .map(|&step| {
            let name = format!("fc2024022416+{:03}grib_fp", step);
            write_grib_file(dir, &name, &scenario_grib1_messages(grid, step))
        })
        .collect()
}

/// Write the standard GRIB2 scenario, one file per step.
pub fn write_grib2_scenario(dir: &Path, grid: &TestGrid) -> Vec<PathBuf> {
    SCENARIO_STEPS
        .iter()
        .map(|&step| {
            let name = format!("fc2024022416+{:03}.grib2", step);
            write_grib_file(dir, &name, &scenario_grib2_messages(grid, step))
        })
        .collect()
}
