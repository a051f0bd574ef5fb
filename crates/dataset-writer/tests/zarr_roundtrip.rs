//! Integration test: write an aggregated dataset to Zarr and read it back.

mod common;

use std::sync::Arc;

use common::create_dataset;
use dataset_writer::{create_writer, OutputFormat, WriterConfig, ZarrCompression};
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs::group::Group;
use zarrs_filesystem::FilesystemStore;

fn read_f64(store: &Arc<FilesystemStore>, path: &str) -> (Vec<u64>, Vec<f64>) {
    let array = Array::open(store.clone(), path).expect("Failed to open array");
    let shape = array.shape().to_vec();
    let subset = ArraySubset::new_with_shape(shape.clone());
    let values = array
        .retrieve_array_subset_elements::<f64>(&subset)
        .expect("Failed to read array");
    (shape, values)
}

fn write_dataset(config: WriterConfig) -> (tempfile::TempDir, std::path::PathBuf) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let zarr_path = temp_dir.path().join("t_2m.zarr");
    let writer = create_writer(OutputFormat::Zarr, config).expect("Failed to create writer");
    let summary = writer
        .write(&create_dataset(), &zarr_path)
        .expect("Failed to write");
    assert_eq!(summary.shape, (2, 2, 4, 5));
    assert_eq!(summary.variables.last().map(String::as_str), Some("t"));
    (temp_dir, zarr_path)
}

#[test]
fn test_zarr_roundtrip_values_and_axes() {
    let (_dir, zarr_path) = write_dataset(WriterConfig {
        chunk_size: 3,
        ..Default::default()
    });
    let store = Arc::new(FilesystemStore::new(&zarr_path).expect("Failed to open store"));

    let (shape, values) = read_f64(&store, "/t");
    assert_eq!(shape, vec![2, 2, 4, 5]);
    let expected = create_dataset();
    for (got, want) in values.iter().zip(expected.values.iter()) {
        if want.is_nan() {
            assert!(got.is_nan());
        } else {
            assert_eq!(got, want);
        }
    }

    let (_, steps) = read_f64(&store, "/step");
    assert_eq!(steps, vec![0.0, 3.0]);
    let (_, levels) = read_f64(&store, "/level");
    assert_eq!(levels, vec![2.0, 50.0]);
    let (shape, latitude) = read_f64(&store, "/latitude");
    assert_eq!(shape, vec![4, 5]);
    assert_eq!(latitude[5], expected.coordinates.latitude[[1, 0]]);

    let valid_time = Array::open(store.clone(), "/valid_time").unwrap();
    let times: Vec<i64> = valid_time
        .retrieve_array_subset_elements(&ArraySubset::new_with_shape(vec![2]))
        .unwrap();
    assert_eq!(times[1] - times[0], 3 * 3600);
    assert_eq!(times[0], expected.reference_time.timestamp());
}

#[test]
fn test_zarr_cf_attributes() {
    let (_dir, zarr_path) = write_dataset(WriterConfig {
        compression: ZarrCompression::None,
        ..Default::default()
    });
    let store = Arc::new(FilesystemStore::new(&zarr_path).unwrap());

    let group = Group::open(store.clone(), "/").expect("Failed to open group");
    let attrs = group.attributes();
    assert_eq!(attrs["Conventions"], "CF-1.8");
    assert_eq!(attrs["parameter"], "t");
    assert_eq!(attrs["level_type"], "height-above-ground");
    assert_eq!(attrs["reference_time"], "2024-02-24T16:00:00+00:00");
    assert_eq!(
        attrs["rotated_pole"]["grid_mapping_name"],
        "rotated_latitude_longitude"
    );
    assert_eq!(attrs["rotated_pole"]["grid_north_pole_latitude"], 40.0);

    let data = Array::open(store.clone(), "/t").unwrap();
    let attrs = data.attributes();
    assert_eq!(attrs["units"], "K");
    assert_eq!(attrs["standard_name"], "air_temperature");
    assert_eq!(attrs["grid_mapping"], "rotated_pole");
    assert_eq!(attrs["coordinates"], "latitude longitude");

    let level = Array::open(store.clone(), "/level").unwrap();
    assert_eq!(level.attributes()["units"], "m");
    assert_eq!(level.attributes()["positive"], "up");

    let y = Array::open(store, "/y").unwrap();
    assert_eq!(y.attributes()["standard_name"], "grid_latitude");
}

#[test]
fn test_overwrite_replaces_destination() {
    let (_dir, zarr_path) = write_dataset(WriterConfig::default());

    let refusing = create_writer(OutputFormat::Zarr, WriterConfig::default()).unwrap();
    assert!(refusing.write(&create_dataset(), &zarr_path).is_err());

    let overwriting = create_writer(
        OutputFormat::Zarr,
        WriterConfig {
            overwrite: true,
            ..Default::default()
        },
    )
    .unwrap();
    overwriting
        .write(&create_dataset(), &zarr_path)
        .expect("Overwrite failed");
}

#[test]
fn test_invalid_config_rejected() {
    let config = WriterConfig {
        compression_level: 0,
        ..Default::default()
    };
    assert!(create_writer(OutputFormat::Zarr, config).is_err());
}
