//! Scanning concatenated GRIB streams.

use std::fs::File;
use std::io::Cursor;

use grib_parser::{DecodeError, DecoderConfig, RecordDecoder};
use nwp_common::ForecastStep;
use test_utils::{
    assert_approx_eq, scenario_grib1_messages, scenario_value, write_grib1_scenario,
    write_grib_file, Grib1Builder, Grib2Builder, TestGrid,
};

fn concat(messages: &[Vec<u8>]) -> Vec<u8> {
    messages.iter().flatten().copied().collect()
}

#[test]
fn test_scan_mixed_editions() {
    let grid = TestGrid::harmonie();
    let stream = concat(&[
        Grib1Builder::new(grid.clone()).forecast_hours(1).build(),
        Grib2Builder::new(grid.clone()).forecast_hours(2).build(),
        Grib1Builder::new(grid).forecast_hours(3).build(),
    ]);

    let decoder = RecordDecoder::default();
    let records: Vec<_> = decoder
        .scan(Cursor::new(stream), "mixed.grib")
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(records.len(), 3);
    let steps: Vec<_> = records.iter().map(|r| r.metadata.step).collect();
    assert_eq!(
        steps,
        [1, 2, 3].map(ForecastStep::from_hours).to_vec()
    );
    assert_eq!(records[0].locator.offset, 0);
    assert_eq!(records[1].locator.offset, records[0].locator.length);
}

#[test]
fn test_scan_skips_padding_between_messages() {
    let grid = TestGrid::harmonie();
    let first = Grib1Builder::new(grid.clone()).build();
    let second = Grib1Builder::new(grid).level(105, 50).build();
    let stream = concat(&[vec![0u8; 100], first.clone(), vec![0xAB; 37], second]);

    let records: Vec<_> = RecordDecoder::default()
        .scan(Cursor::new(stream), "padded.grib")
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].locator.offset, 100);
    assert_eq!(records[1].locator.offset, 100 + first.len() as u64 + 37);
    assert_eq!(records[1].metadata.level, 50.0);
}

#[test]
fn test_scan_reports_bad_length_and_continues() {
    let grid = TestGrid::harmonie();
    let mut broken = Grib1Builder::new(grid.clone()).build();
    // Declared length one byte short of the end marker
    let length = broken.len() - 1;
    broken[4..7].copy_from_slice(&[(length >> 16) as u8, (length >> 8) as u8, length as u8]);
    let stream = concat(&[
        Grib1Builder::new(grid.clone()).build(),
        broken,
        Grib1Builder::new(grid).level(105, 50).build(),
    ]);

    let results: Vec<_> = RecordDecoder::default()
        .scan(Cursor::new(stream), "broken.grib")
        .unwrap()
        .collect();

    let errors: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    let records: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0].error, DecodeError::CorruptRecord { .. }));
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].metadata.level, 50.0);
}

#[test]
fn test_scan_reports_unsupported_message_and_continues() {
    let grid = TestGrid::harmonie();
    let stream = concat(&[
        Grib1Builder::new(grid.clone()).time_range(51).build(),
        Grib1Builder::new(grid).build(),
    ]);

    let results: Vec<_> = RecordDecoder::default()
        .scan(Cursor::new(stream), "unsupported.grib")
        .unwrap()
        .collect();

    assert_eq!(results.len(), 2);
    let error = results[0].as_ref().unwrap_err();
    assert_eq!(error.offset, 0);
    assert!(matches!(error.error, DecodeError::UnsupportedEncoding { .. }));
    assert!(results[1].is_ok());
}

#[test]
fn test_scan_truncated_tail() {
    let grid = TestGrid::harmonie();
    let mut last = Grib2Builder::new(grid.clone()).build();
    last.truncate(40);
    let stream = concat(&[Grib2Builder::new(grid).build(), last]);

    let results: Vec<_> = RecordDecoder::default()
        .scan(Cursor::new(stream), "truncated.grib2")
        .unwrap()
        .collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
}

#[test]
fn test_multi_field_message_yields_one_record_per_field() {
    let grid = TestGrid::harmonie();
    let message = Grib2Builder::build_message(&[
        Grib2Builder::new(grid.clone()).level(103, 2),
        Grib2Builder::new(grid).level(103, 50),
    ]);

    let records: Vec<_> = RecordDecoder::default()
        .scan(Cursor::new(message.clone()), "multi.grib2")
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].locator.offset, records[1].locator.offset);
    assert_eq!(records[0].locator.length, message.len() as u64);
    assert_eq!(records[1].locator.field, 1);
    assert_eq!(records[1].metadata.level, 50.0);
}

#[test]
fn test_decode_at_locator_from_scan() {
    let dir = tempfile::tempdir().unwrap();
    let grid = TestGrid::harmonie();
    let files = write_grib1_scenario(dir.path(), &grid);

    let decoder = RecordDecoder::default();
    let records: Vec<_> = decoder
        .scan_file(&files[2])
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 2);

    let mut file = File::open(&files[2]).unwrap();
    for indexed in &records {
        let record = decoder.decode_at(&mut file, &indexed.locator).unwrap();
        assert_eq!(record.metadata, indexed.metadata);
        let level = record.metadata.level as u16;
        assert_approx_eq!(record.value(3, 5), scenario_value(2, level, 3, 5), 1e-3);
    }
}

#[test]
fn test_scan_starting_at_offset() {
    let dir = tempfile::tempdir().unwrap();
    let grid = TestGrid::harmonie();
    let messages = scenario_grib1_messages(&grid, 0);
    let path = write_grib_file(dir.path(), "fc.grib", &messages);

    let records: Vec<_> = RecordDecoder::default()
        .scan_file(&path)
        .unwrap()
        .starting_at(messages[0].len() as u64)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].metadata.level, 50.0);
}

#[test]
fn test_scan_empty_stream() {
    let results: Vec<_> = RecordDecoder::default()
        .scan(Cursor::new(Vec::new()), "empty.grib")
        .unwrap()
        .collect();
    assert!(results.is_empty());
}

#[test]
fn test_scan_huge_declared_length_is_one_error() {
    let grid = TestGrid::harmonie();
    let mut huge = b"GRIB\0\0\0\x02".to_vec();
    huge.extend_from_slice(&u64::MAX.to_be_bytes());
    let stream = concat(&[
        Grib1Builder::new(grid.clone()).build(),
        huge,
        Grib1Builder::new(grid).level(105, 50).build(),
    ]);

    let results: Vec<_> = RecordDecoder::default()
        .scan(Cursor::new(stream), "huge.grib")
        .unwrap()
        .collect();

    let errors: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    let records: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0].error, DecodeError::CorruptRecord { .. }));
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].metadata.level, 50.0);
}

#[test]
fn test_scan_skips_grids_above_point_limit() {
    let small = TestGrid::harmonie();
    let large = TestGrid::rotated(12, 8, -1.0, -2.5, 0.5, -40.0, 10.0);
    let stream = concat(&[
        Grib2Builder::new(large.clone()).build(),
        Grib2Builder::new(small.clone()).build(),
    ]);
    let decoder = RecordDecoder::new(DecoderConfig {
        max_points: small.num_points(),
        ..DecoderConfig::default()
    });

    let results: Vec<_> = decoder
        .scan(Cursor::new(stream), "large.grib2")
        .unwrap()
        .collect();

    assert_eq!(results.len(), 2);
    let error = results[0].as_ref().unwrap_err();
    assert_eq!(error.field, Some(0));
    assert!(matches!(error.error, DecodeError::UnsupportedEncoding { .. }));
    assert_eq!(results[1].as_ref().unwrap().metadata.grid.ni, small.ni);
}
