//! End-to-end ingestion of synthetic model output.

use std::path::PathBuf;
use std::sync::Arc;

use ingestion::{Diagnostic, IngestConfig, Ingester, IngestionError, Selector};
use nwp_common::{ForecastStep, LevelType};
use projection::RotatedPole;
use test_utils::{
    assert_approx_eq, scenario_grib1_messages, scenario_grib2_messages, scenario_value,
    write_grib1_scenario, write_grib2_scenario, write_grib_file, Grib1Builder, TestGrid,
    SCENARIO_LEVELS, SCENARIO_STEPS,
};
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

fn ingester() -> Ingester {
    Ingester::new(IngestConfig {
        workers: 2,
        ..Default::default()
    })
    .expect("Failed to create ingester")
}

fn temperature_2m_and_50m() -> Selector {
    Selector::parse("t", "height-above-ground").unwrap()
}

#[test]
fn test_grib1_scenario_axes_and_values() {
    let dir = tempfile::tempdir().unwrap();
    let grid = TestGrid::harmonie();
    let files = write_grib1_scenario(dir.path(), &grid);

    let ingester = ingester();
    let index = ingester.index(&files).unwrap();
    let aggregation = ingester.aggregate(&index, &temperature_2m_and_50m()).unwrap();
    let dataset = &aggregation.dataset;

    assert_eq!(dataset.levels, vec![2.0, 50.0]);
    assert_eq!(
        dataset.steps,
        vec![
            ForecastStep::ZERO,
            ForecastStep::from_hours(1),
            ForecastStep::from_hours(2)
        ]
    );
    assert_eq!(dataset.shape(), (3, 2, grid.nj, grid.ni));
    assert_eq!(dataset.records_merged, 6);
    assert_eq!(dataset.parameter.short_name, "t");
    assert_eq!(dataset.description.units.as_deref(), Some("K"));
    assert!(aggregation.diagnostics.is_empty());

    for (si, step) in SCENARIO_STEPS.iter().enumerate() {
        for (li, level) in SCENARIO_LEVELS.iter().enumerate() {
            for row in 0..grid.nj {
                for col in 0..grid.ni {
                    assert_approx_eq!(
                        dataset.values[[si, li, row, col]],
                        scenario_value(*step, *level, row, col),
                        0.006
                    );
                }
            }
        }
    }
}

#[test]
fn test_coordinates_match_rotated_pole() {
    let dir = tempfile::tempdir().unwrap();
    let grid = TestGrid::harmonie();
    let files = write_grib2_scenario(dir.path(), &grid);

    let ingester = ingester();
    let index = ingester.index(&files).unwrap();
    let dataset = ingester
        .aggregate(&index, &temperature_2m_and_50m())
        .unwrap()
        .dataset;

    let pole = RotatedPole::new(-40.0, 10.0, 0.0);
    for row in 0..grid.nj {
        for col in 0..grid.ni {
            let rotated_lat = grid.first_lat + row as f64 * grid.dj;
            let rotated_lon = grid.first_lon + col as f64 * grid.di;
            let (lat, lon) = pole.unrotate(rotated_lat, rotated_lon);
            assert_approx_eq!(dataset.coordinates.latitude[[row, col]], lat, 1e-9);
            assert_approx_eq!(dataset.coordinates.longitude[[row, col]], lon, 1e-9);
        }
    }

    // A second query on the same grid reuses the coordinate arrays
    let again = ingester
        .aggregate(&index, &temperature_2m_and_50m())
        .unwrap()
        .dataset;
    assert!(Arc::ptr_eq(&dataset.coordinates, &again.coordinates));
}

#[test]
fn test_input_order_does_not_matter() {
    let dir = tempfile::tempdir().unwrap();
    let grid = TestGrid::harmonie();
    let files = write_grib1_scenario(dir.path(), &grid);

    // Same records, with levels reversed inside each file
    let reversed: Vec<PathBuf> = SCENARIO_STEPS
        .iter()
        .rev()
        .map(|&step| {
            let mut messages = scenario_grib1_messages(&grid, step);
            messages.reverse();
            write_grib_file(dir.path(), &format!("reversed+{:03}", step), &messages)
        })
        .collect();

    let ingester = ingester();
    let forward = ingester
        .aggregate(&ingester.index(&files).unwrap(), &temperature_2m_and_50m())
        .unwrap()
        .dataset;
    let backward = ingester
        .aggregate(&ingester.index(&reversed).unwrap(), &temperature_2m_and_50m())
        .unwrap()
        .dataset;

    assert_eq!(forward.steps, backward.steps);
    assert_eq!(forward.levels, backward.levels);
    assert_eq!(forward.values, backward.values);
}

#[test]
fn test_grib1_and_grib2_inputs_merge() {
    let dir = tempfile::tempdir().unwrap();
    let grid = TestGrid::harmonie();
    let step0 = write_grib_file(dir.path(), "step0.grib1", &scenario_grib1_messages(&grid, 0));
    let step1 = write_grib_file(dir.path(), "step1.grib2", &scenario_grib2_messages(&grid, 1));

    let ingester = ingester();
    let index = ingester.index(&[step0, step1]).unwrap();
    let dataset = ingester
        .aggregate(&index, &temperature_2m_and_50m())
        .unwrap()
        .dataset;
    assert_eq!(dataset.shape(), (2, 2, grid.nj, grid.ni));
    assert_approx_eq!(dataset.values[[1, 1, 2, 3]], scenario_value(1, 50, 2, 3), 0.006);
}

#[test]
fn test_corrupt_record_is_skipped_with_one_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let grid = TestGrid::harmonie();
    let mut messages = scenario_grib1_messages(&grid, 0);
    // Break the end marker of the first message
    let first = messages[0].len();
    messages[0][first - 1] = b'8';
    messages.push(Grib1Builder::new(grid.clone()).level(105, 10).build());
    let file = write_grib_file(dir.path(), "broken", &messages);

    let output = dir.path().join("out.zarr");
    let report = ingester()
        .convert(&[file], &temperature_2m_and_50m(), &output)
        .unwrap();

    assert_eq!(report.records_merged, 2);
    assert_eq!(report.output.shape.1, 2);
    let skipped: Vec<&Diagnostic> = report
        .diagnostics
        .iter()
        .filter(|d| d.is_skipped_record())
        .collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(report.diagnostics.len(), 1);
}

#[test]
fn test_no_match_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_grib1_scenario(dir.path(), &TestGrid::harmonie());
    let output = dir.path().join("wind.zarr");

    let selector = Selector::parse("u", "height-above-ground").unwrap();
    match ingester().convert(&files, &selector, &output) {
        Err(IngestionError::NoMatch { query, available }) => {
            assert_eq!(query, "u on height-above-ground");
            assert_eq!(available.len(), 1);
            assert!(available[0].starts_with("t (253.11) on height-above-ground"));
        }
        other => panic!("expected NoMatch, got {:?}", other.map(|r| r.records_merged)),
    }
    assert!(!output.exists());

    let hybrid = Selector::short_name("t", LevelType::HybridLevel);
    assert!(matches!(
        ingester().convert(&files, &hybrid, &output),
        Err(IngestionError::NoMatch { .. })
    ));
    assert!(!output.exists());
}

#[test]
fn test_duplicate_on_other_grid_is_inconsistent() {
    let dir = tempfile::tempdir().unwrap();
    let grid = TestGrid::harmonie();
    let files = write_grib1_scenario(dir.path(), &grid);
    let shifted = TestGrid::rotated(6, 4, -1.0, -2.5, 0.5, -40.0, 10.0);
    let mut inputs = files.clone();
    inputs.push(write_grib_file(
        dir.path(),
        "shifted",
        &scenario_grib1_messages(&shifted, 1),
    ));
    let output = dir.path().join("t.zarr");

    let result = ingester().convert(&inputs, &temperature_2m_and_50m(), &output);
    assert!(matches!(result, Err(IngestionError::InconsistentGrid { .. })));
    assert!(!output.exists());
}

#[test]
fn test_duplicate_on_same_grid_last_wins() {
    let dir = tempfile::tempdir().unwrap();
    let grid = TestGrid::harmonie();
    let mut inputs = write_grib1_scenario(dir.path(), &grid);
    let rerun_values = vec![300.0; grid.num_points()];
    inputs.push(write_grib_file(
        dir.path(),
        "rerun",
        &[Grib1Builder::new(grid.clone())
            .level(105, 50)
            .forecast_hours(1)
            .values(rerun_values)
            .build()],
    ));

    let ingester = ingester();
    let aggregation = ingester
        .aggregate(&ingester.index(&inputs).unwrap(), &temperature_2m_and_50m())
        .unwrap();
    let dataset = &aggregation.dataset;

    assert_eq!(dataset.shape(), (3, 2, grid.nj, grid.ni));
    assert!(dataset.slice(1, 1).iter().all(|v| *v == 300.0));
    assert_eq!(aggregation.diagnostics.len(), 1);
    match &aggregation.diagnostics[0] {
        Diagnostic::DuplicateSlot {
            step,
            level,
            kept,
            replaced,
        } => {
            assert_eq!(*step, ForecastStep::from_hours(1));
            assert_eq!(*level, 50.0);
            assert_eq!(kept.path, inputs[3]);
            assert_eq!(replaced.path, inputs[1]);
        }
        other => panic!("unexpected diagnostic {}", other),
    }
}

#[test]
fn test_convert_directory_to_zarr() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("harmonie");
    std::fs::create_dir(&input_dir).unwrap();
    let grid = TestGrid::harmonie();
    write_grib1_scenario(&input_dir, &grid);
    let output = dir.path().join("t_height.zarr");

    let config = IngestConfig {
        extensions: vec!["grib_fp".to_string()],
        ..Default::default()
    };
    let report = Ingester::new(config)
        .unwrap()
        .convert(&[input_dir], &temperature_2m_and_50m(), &output)
        .unwrap();
    assert_eq!(report.records_indexed, 6);
    assert_eq!(report.records_selected, 6);

    let store = Arc::new(FilesystemStore::new(&output).unwrap());
    let array = Array::open(store.clone(), "/t").unwrap();
    assert_eq!(array.shape(), &[3, 2, grid.nj as u64, grid.ni as u64]);
    let values: Vec<f64> = array
        .retrieve_array_subset_elements(&ArraySubset::new_with_shape(array.shape().to_vec()))
        .unwrap();
    // Last cell: step 2, level 50, last row and column
    assert_approx_eq!(
        values[values.len() - 1],
        scenario_value(2, 50, grid.nj - 1, grid.ni - 1),
        0.006
    );

    let level = Array::open(store, "/level").unwrap();
    let levels: Vec<f64> = level
        .retrieve_array_subset_elements(&ArraySubset::new_with_shape(vec![2]))
        .unwrap();
    assert_eq!(levels, vec![2.0, 50.0]);
}
