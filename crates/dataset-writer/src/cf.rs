//! CF-convention layout of an aggregated dataset.
//!
//! Both writers serialize the same [`DatasetLayout`]: one data variable
//! indexed (step, level, y, x), its coordinate variables, and the attributes
//! that make the result self-describing to CF-aware readers.

use std::borrow::Cow;

use nwp_common::{AggregatedDataset, GridProjection};
use serde_json::{json, Map, Value};

use crate::error::{Result, WriterError};

pub const CONVENTIONS: &str = "CF-1.8";
pub const GRID_MAPPING: &str = "rotated_pole";

/// Names the data variable may not take.
const RESERVED_NAMES: &[&str] = &[
    "step",
    "valid_time",
    "level",
    "y",
    "x",
    "latitude",
    "longitude",
    GRID_MAPPING,
];

/// Values of one variable, row-major over its dimensions.
#[derive(Debug, Clone)]
pub enum VariableData<'a> {
    Float64(Cow<'a, [f64]>),
    Int64(Vec<i64>),
}

impl VariableData<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Float64(values) => values.len(),
            Self::Int64(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per element.
    pub fn element_size(&self) -> usize {
        8
    }
}

/// One variable of the output.
#[derive(Debug, Clone)]
pub struct Variable<'a> {
    pub name: String,
    pub dimensions: Vec<&'static str>,
    pub shape: Vec<usize>,
    pub attributes: Map<String, Value>,
    pub data: VariableData<'a>,
}

/// Everything a writer needs to emit.
#[derive(Debug, Clone)]
pub struct DatasetLayout<'a> {
    pub global_attributes: Map<String, Value>,
    /// Attributes of the grid mapping, for rotated grids
    pub grid_mapping: Option<Map<String, Value>>,
    /// Coordinate variables, written before the data variable
    pub coordinates: Vec<Variable<'a>>,
    pub data: Variable<'a>,
    pub missing_value: f64,
}

impl<'a> DatasetLayout<'a> {
    /// Dimension names with their lengths, in first-use order.
    pub fn dimensions(&self) -> Vec<(&'static str, usize)> {
        let mut dims: Vec<(&'static str, usize)> = Vec::new();
        for var in self.coordinates.iter().chain(std::iter::once(&self.data)) {
            for (name, len) in var.dimensions.iter().zip(&var.shape) {
                if !dims.iter().any(|(n, _)| n == name) {
                    dims.push((*name, *len));
                }
            }
        }
        dims
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.coordinates
            .iter()
            .map(|v| v.name.clone())
            .chain(std::iter::once(self.data.name.clone()))
            .collect()
    }

    /// Build the layout of `dataset`, checking that its axes and arrays agree.
    pub fn build(dataset: &'a AggregatedDataset) -> Result<Self> {
        let (n_steps, n_levels, nj, ni) = dataset.shape();
        if n_steps != dataset.steps.len() || n_levels != dataset.levels.len() {
            return Err(WriterError::invalid_dataset(format!(
                "array shape {:?} does not match {} steps and {} levels",
                dataset.shape(),
                dataset.steps.len(),
                dataset.levels.len()
            )));
        }
        if dataset.coordinates.shape() != (nj, ni) || dataset.grid.shape() != (nj, ni) {
            return Err(WriterError::invalid_dataset(format!(
                "coordinates {:?} and grid {:?} do not match array rows/columns ({}, {})",
                dataset.coordinates.shape(),
                dataset.grid.shape(),
                nj,
                ni
            )));
        }
        if n_steps == 0 || n_levels == 0 || nj == 0 || ni == 0 {
            return Err(WriterError::invalid_dataset("dataset is empty"));
        }

        let name = dataset.parameter.short_name.clone();
        if name.is_empty() || RESERVED_NAMES.contains(&name.as_str()) {
            return Err(WriterError::invalid_dataset(format!(
                "parameter name {:?} clashes with a coordinate variable",
                name
            )));
        }

        let rotated = matches!(dataset.grid.projection, GridProjection::RotatedLatLon { .. });
        let grid_mapping = grid_mapping_attributes(&dataset.grid.projection);

        let coordinates = vec![
            Variable {
                name: "step".to_string(),
                dimensions: vec!["step"],
                shape: vec![n_steps],
                attributes: attrs([
                    ("units", json!("hours")),
                    ("long_name", json!("time since forecast reference time")),
                    ("standard_name", json!("forecast_period")),
                ]),
                data: VariableData::Float64(Cow::Owned(
                    dataset.steps.iter().map(|s| s.hours()).collect(),
                )),
            },
            Variable {
                name: "valid_time".to_string(),
                dimensions: vec!["step"],
                shape: vec![n_steps],
                attributes: attrs([
                    ("units", json!("seconds since 1970-01-01T00:00:00Z")),
                    ("long_name", json!("time")),
                    ("standard_name", json!("time")),
                    ("calendar", json!("proleptic_gregorian")),
                ]),
                data: VariableData::Int64(
                    dataset.valid_times().iter().map(|t| t.timestamp()).collect(),
                ),
            },
            Variable {
                name: "level".to_string(),
                dimensions: vec!["level"],
                shape: vec![n_levels],
                attributes: {
                    let mut a = attrs([
                        ("units", json!(dataset.level_type.units())),
                        ("long_name", json!(dataset.level_type.long_name())),
                        ("axis", json!("Z")),
                    ]);
                    if let Some(positive) = dataset.level_type.positive() {
                        a.insert("positive".to_string(), json!(positive));
                    }
                    a
                },
                data: VariableData::Float64(Cow::Borrowed(&dataset.levels)),
            },
            Variable {
                name: "y".to_string(),
                dimensions: vec!["y"],
                shape: vec![nj],
                attributes: if rotated {
                    attrs([
                        ("units", json!("degrees")),
                        ("long_name", json!("latitude in rotated pole grid")),
                        ("standard_name", json!("grid_latitude")),
                        ("axis", json!("Y")),
                    ])
                } else {
                    attrs([
                        ("units", json!("degrees_north")),
                        ("long_name", json!("latitude")),
                        ("standard_name", json!("latitude")),
                        ("axis", json!("Y")),
                    ])
                },
                data: VariableData::Float64(Cow::Borrowed(
                    &dataset.coordinates.native_latitudes,
                )),
            },
            Variable {
                name: "x".to_string(),
                dimensions: vec!["x"],
                shape: vec![ni],
                attributes: if rotated {
                    attrs([
                        ("units", json!("degrees")),
                        ("long_name", json!("longitude in rotated pole grid")),
                        ("standard_name", json!("grid_longitude")),
                        ("axis", json!("X")),
                    ])
                } else {
                    attrs([
                        ("units", json!("degrees_east")),
                        ("long_name", json!("longitude")),
                        ("standard_name", json!("longitude")),
                        ("axis", json!("X")),
                    ])
                },
                data: VariableData::Float64(Cow::Borrowed(
                    &dataset.coordinates.native_longitudes,
                )),
            },
            Variable {
                name: "latitude".to_string(),
                dimensions: vec!["y", "x"],
                shape: vec![nj, ni],
                attributes: attrs([
                    ("units", json!("degrees_north")),
                    ("long_name", json!("latitude")),
                    ("standard_name", json!("latitude")),
                ]),
                data: VariableData::Float64(array_values(&dataset.coordinates.latitude)),
            },
            Variable {
                name: "longitude".to_string(),
                dimensions: vec!["y", "x"],
                shape: vec![nj, ni],
                attributes: attrs([
                    ("units", json!("degrees_east")),
                    ("long_name", json!("longitude")),
                    ("standard_name", json!("longitude")),
                ]),
                data: VariableData::Float64(array_values(&dataset.coordinates.longitude)),
            },
        ];

        let description = &dataset.description;
        let mut data_attributes = attrs([
            ("units", json!(description.units_or_unknown())),
            (
                "long_name",
                json!(description.long_name.clone().unwrap_or_else(|| name.clone())),
            ),
            ("_FillValue", float_attribute(dataset.missing_value)),
            ("missing_value", float_attribute(dataset.missing_value)),
            ("coordinates", json!("latitude longitude")),
            ("grib_code", json!(dataset.parameter.code.to_string())),
            ("level_type", json!(dataset.level_type.to_string())),
        ]);
        if let Some(standard_name) = description.standard_name.as_deref().filter(|s| !s.is_empty()) {
            data_attributes.insert("standard_name".to_string(), json!(standard_name));
        }
        if grid_mapping.is_some() {
            data_attributes.insert("grid_mapping".to_string(), json!(GRID_MAPPING));
        }

        let data = Variable {
            name: name.clone(),
            dimensions: vec!["step", "level", "y", "x"],
            shape: vec![n_steps, n_levels, nj, ni],
            attributes: data_attributes,
            data: VariableData::Float64(array_values(&dataset.values)),
        };

        let global_attributes = attrs([
            ("Conventions", json!(CONVENTIONS)),
            ("title", json!(format!("{} on {}", name, dataset.level_type.long_name()))),
            ("reference_time", json!(dataset.reference_time.to_rfc3339())),
            ("parameter", json!(name)),
            ("parameter_code", json!(dataset.parameter.code.to_string())),
            ("level_type", json!(dataset.level_type.to_string())),
            ("grid_type", json!(dataset.grid.projection.short_name())),
            ("records_merged", json!(dataset.records_merged)),
            ("source", json!(concat!("nwp-ingest ", env!("CARGO_PKG_VERSION")))),
        ]);

        Ok(Self {
            global_attributes,
            grid_mapping,
            coordinates,
            data,
            missing_value: dataset.missing_value,
        })
    }
}

/// CF `rotated_latitude_longitude` grid mapping, `None` for other grids.
pub fn grid_mapping_attributes(projection: &GridProjection) -> Option<Map<String, Value>> {
    match projection {
        GridProjection::RotatedLatLon { rotation_angle, .. } => {
            let (lat, lon) = projection.north_pole()?;
            Some(attrs([
                ("grid_mapping_name", json!("rotated_latitude_longitude")),
                ("grid_north_pole_latitude", json!(lat)),
                ("grid_north_pole_longitude", json!(lon)),
                (
                    "north_pole_grid_longitude",
                    json!(*rotation_angle as f64 / nwp_common::MICRODEGREES),
                ),
            ]))
        }
        _ => None,
    }
}

/// Float attribute; JSON has no NaN, so it is spelled as the Zarr string form.
pub fn float_attribute(value: f64) -> Value {
    if value.is_nan() {
        json!("NaN")
    } else {
        json!(value)
    }
}

fn attrs<const N: usize>(entries: [(&str, Value); N]) -> Map<String, Value> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn array_values<D: ndarray::Dimension>(array: &ndarray::Array<f64, D>) -> Cow<'_, [f64]> {
    match array.as_slice() {
        Some(values) => Cow::Borrowed(values),
        None => Cow::Owned(array.iter().copied().collect()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use ndarray::{Array2, Array4};
    use nwp_common::{
        ForecastStep, GridCoordinates, GridDefinition, LevelType, ParameterCode,
        ParameterDescription, ParameterId, ScanMode,
    };

    /// Small rotated dataset: 3 steps, 2 levels, 2 x 3 cells.
    pub(crate) fn sample_dataset() -> AggregatedDataset {
        let grid = GridDefinition {
            ni: 3,
            nj: 2,
            first_lat: -1_000_000,
            first_lon: -2_000_000,
            last_lat: 0,
            last_lon: 0,
            di: 1_000_000,
            dj: 1_000_000,
            scan_mode: ScanMode::from_grib_flag(0x40),
            projection: GridProjection::RotatedLatLon {
                south_pole_lat: -40_000_000,
                south_pole_lon: 10_000_000,
                rotation_angle: 0,
            },
        };
        let coordinates = GridCoordinates {
            native_latitudes: vec![-1.0, 0.0],
            native_longitudes: vec![-2.0, -1.0, 0.0],
            latitude: Array2::from_shape_fn((2, 3), |(j, i)| 49.0 + j as f64 - i as f64 * 0.01),
            longitude: Array2::from_shape_fn((2, 3), |(j, i)| 8.5 + i as f64 * 0.7 + j as f64 * 0.01),
        };
        let mut values = Array4::from_shape_fn((3, 2, 2, 3), |(s, l, j, i)| {
            (s * 1000 + l * 100 + j * 10 + i) as f64
        });
        values[[2, 1, 0, 0]] = f64::NAN;

        AggregatedDataset {
            parameter: ParameterId::new("t", ParameterCode::grib1(253, 11)),
            description: ParameterDescription {
                long_name: Some("Temperature".to_string()),
                units: Some("K".to_string()),
                standard_name: Some("air_temperature".to_string()),
            },
            level_type: LevelType::HeightAboveGround,
            reference_time: Utc.with_ymd_and_hms(2024, 2, 24, 16, 0, 0).unwrap(),
            steps: vec![ForecastStep::ZERO, ForecastStep::from_hours(1), ForecastStep::from_hours(2)],
            levels: vec![2.0, 50.0],
            values,
            grid: Arc::new(grid),
            coordinates: Arc::new(coordinates),
            missing_value: f64::NAN,
            records_merged: 6,
        }
    }

    #[test]
    fn test_layout_dimensions_and_names() {
        let dataset = sample_dataset();
        let layout = DatasetLayout::build(&dataset).unwrap();
        assert_eq!(
            layout.dimensions(),
            vec![("step", 3), ("level", 2), ("y", 2), ("x", 3)]
        );
        assert_eq!(
            layout.variable_names(),
            ["step", "valid_time", "level", "y", "x", "latitude", "longitude", "t"]
        );
        assert_eq!(layout.data.data.len(), 36);
    }

    #[test]
    fn test_data_attributes() {
        let dataset = sample_dataset();
        let layout = DatasetLayout::build(&dataset).unwrap();
        let a = &layout.data.attributes;
        assert_eq!(a["units"], "K");
        assert_eq!(a["standard_name"], "air_temperature");
        assert_eq!(a["_FillValue"], "NaN");
        assert_eq!(a["grid_mapping"], GRID_MAPPING);
        assert_eq!(a["grib_code"], "253.11");

        let mapping = layout.grid_mapping.unwrap();
        assert_eq!(mapping["grid_north_pole_latitude"], 40.0);
        assert_eq!(mapping["grid_north_pole_longitude"], -170.0);
    }

    #[test]
    fn test_valid_times_are_epoch_seconds() {
        let dataset = sample_dataset();
        let layout = DatasetLayout::build(&dataset).unwrap();
        let valid_time = &layout.coordinates[1];
        match &valid_time.data {
            VariableData::Int64(values) => {
                let reference = dataset.reference_time.timestamp();
                assert_eq!(values, &vec![reference, reference + 3600, reference + 7200]);
            }
            other => panic!("unexpected data {:?}", other),
        }
    }

    #[test]
    fn test_latlon_grid_has_no_grid_mapping() {
        let mut dataset = sample_dataset();
        let mut grid = (*dataset.grid).clone();
        grid.projection = GridProjection::LatLon;
        dataset.grid = Arc::new(grid);
        let layout = DatasetLayout::build(&dataset).unwrap();
        assert!(layout.grid_mapping.is_none());
        assert!(!layout.data.attributes.contains_key("grid_mapping"));
        assert_eq!(layout.coordinates[3].attributes["standard_name"], "latitude");
    }

    #[test]
    fn test_mismatched_axes_rejected() {
        let mut dataset = sample_dataset();
        dataset.levels.push(100.0);
        assert!(matches!(
            DatasetLayout::build(&dataset),
            Err(WriterError::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_reserved_parameter_name_rejected() {
        let mut dataset = sample_dataset();
        dataset.parameter.short_name = "level".to_string();
        assert!(DatasetLayout::build(&dataset).is_err());
    }
}
