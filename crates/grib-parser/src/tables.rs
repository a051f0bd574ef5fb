//! Parameter lookup tables.
//!
//! Translates numeric GRIB parameter codes into short names and descriptive
//! attributes. A built-in table covers the common WMO parameters with
//! ecCodes-style short names; producers with local tables (HARMONIE, for
//! instance) can extend or override it from a YAML file:
//!
//! ```yaml
//! parameters:
//!   - code: "253.11"
//!     short_name: t
//!     long_name: Temperature
//!     units: K
//!     standard_name: air_temperature
//!   - code: "0.2.22"
//!     short_name: fg10
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use nwp_common::{ParameterCode, ParameterDescription, ParameterId};
use serde::Deserialize;
use tracing::debug;

use crate::error::TableError;

/// GRIB1 table version used as a wildcard: entries registered under it
/// match any table version without an exact entry.
pub const ANY_TABLE_VERSION: u8 = 0;

/// One row of a parameter table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParameterEntry {
    pub code: String,
    pub short_name: String,
    #[serde(default)]
    pub long_name: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub standard_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableFile {
    #[serde(default)]
    parameters: Vec<ParameterEntry>,
}

#[derive(Debug, Clone)]
struct TableRow {
    short_name: String,
    description: ParameterDescription,
}

/// Parameter table keyed by numeric code.
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    parameters: HashMap<ParameterCode, TableRow>,
}

impl ParameterTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table preloaded with common WMO parameters.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        for (code, short_name, long_name, units, standard_name) in GRIB1_DEFAULTS {
            table.add_parameter(
                ParameterCode::grib1(ANY_TABLE_VERSION, *code),
                *short_name,
                describe(long_name, units, standard_name),
            );
        }
        for ((discipline, category, number), short_name, long_name, units, standard_name) in
            GRIB2_DEFAULTS
        {
            table.add_parameter(
                ParameterCode::grib2(*discipline, *category, *number),
                *short_name,
                describe(long_name, units, standard_name),
            );
        }
        table
    }

    /// Parse a YAML table.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, TableError> {
        let file: TableFile = serde_yaml::from_str(yaml)
            .map_err(|e| TableError::Invalid(e.to_string()))?;
        let mut table = Self::new();
        for entry in file.parameters {
            table.add_entry(entry)?;
        }
        Ok(table)
    }

    /// Load a YAML table from disk.
    pub fn from_yaml_file(path: &Path) -> Result<Self, TableError> {
        let yaml = fs::read_to_string(path)?;
        let table = Self::from_yaml_str(&yaml)?;
        debug!(
            path = %path.display(),
            parameters = table.parameter_count(),
            "Loaded parameter table"
        );
        Ok(table)
    }

    /// Add a parameter mapping, replacing any previous one for the code.
    pub fn add_parameter(
        &mut self,
        code: ParameterCode,
        short_name: impl Into<String>,
        description: ParameterDescription,
    ) {
        self.parameters.insert(
            code,
            TableRow {
                short_name: short_name.into(),
                description,
            },
        );
    }

    pub fn add_entry(&mut self, entry: ParameterEntry) -> Result<(), TableError> {
        let code: ParameterCode = entry
            .code
            .parse::<ParameterCode>()
            .map_err(|e| TableError::Invalid(e.to_string()))?;
        self.add_parameter(
            code,
            entry.short_name,
            ParameterDescription {
                long_name: entry.long_name,
                units: entry.units,
                standard_name: entry.standard_name,
            },
        );
        Ok(())
    }

    /// Entries of `other` override entries of `self`.
    pub fn merge(mut self, other: ParameterTable) -> Self {
        self.parameters.extend(other.parameters);
        self
    }

    fn row(&self, code: &ParameterCode) -> Option<&TableRow> {
        self.parameters.get(code).or_else(|| match code {
            ParameterCode::Grib1 { indicator, .. } => self
                .parameters
                .get(&ParameterCode::grib1(ANY_TABLE_VERSION, *indicator)),
            ParameterCode::Grib2 { .. } => None,
        })
    }

    /// Resolve a code to its identity and description.
    ///
    /// Unknown codes get [`ParameterCode::fallback_name`] and an empty
    /// description.
    pub fn lookup(&self, code: ParameterCode) -> (ParameterId, ParameterDescription) {
        match self.row(&code) {
            Some(row) => (
                ParameterId::new(row.short_name.clone(), code),
                row.description.clone(),
            ),
            None => (
                ParameterId::new(code.fallback_name(), code),
                ParameterDescription::default(),
            ),
        }
    }

    /// Look up a parameter short name.
    pub fn get_parameter_name(&self, code: &ParameterCode) -> String {
        self.row(code)
            .map(|row| row.short_name.clone())
            .unwrap_or_else(|| code.fallback_name())
    }

    /// Codes whose short name is `short_name`.
    pub fn codes_for(&self, short_name: &str) -> Vec<ParameterCode> {
        let mut codes: Vec<ParameterCode> = self
            .parameters
            .iter()
            .filter(|(_, row)| row.short_name == short_name)
            .map(|(code, _)| *code)
            .collect();
        codes.sort();
        codes
    }

    /// Get the number of parameters in the table
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

fn describe(long_name: &str, units: &str, standard_name: &str) -> ParameterDescription {
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    ParameterDescription {
        long_name: non_empty(long_name),
        units: non_empty(units),
        standard_name: non_empty(standard_name),
    }
}

type Row<K> = (K, &'static str, &'static str, &'static str, &'static str);

/// WMO Code Table 2 (GRIB1)
const GRIB1_DEFAULTS: &[Row<u8>] = &[
    (1, "pres", "Pressure", "Pa", "air_pressure"),
    (2, "msl", "Mean sea level pressure", "Pa", "air_pressure_at_mean_sea_level"),
    (6, "z", "Geopotential", "m2 s-2", "geopotential"),
    (7, "gh", "Geopotential height", "gpm", "geopotential_height"),
    (11, "t", "Temperature", "K", "air_temperature"),
    (15, "tmax", "Maximum temperature", "K", "air_temperature"),
    (16, "tmin", "Minimum temperature", "K", "air_temperature"),
    (17, "td", "Dew point temperature", "K", "dew_point_temperature"),
    (20, "vis", "Visibility", "m", "visibility_in_air"),
    (33, "u", "U component of wind", "m s-1", "eastward_wind"),
    (34, "v", "V component of wind", "m s-1", "northward_wind"),
    (39, "w", "Vertical velocity", "Pa s-1", "lagrangian_tendency_of_air_pressure"),
    (51, "q", "Specific humidity", "kg kg-1", "specific_humidity"),
    (52, "r", "Relative humidity", "%", "relative_humidity"),
    (61, "tp", "Total precipitation", "kg m-2", "precipitation_amount"),
    (65, "sd", "Water equivalent of accumulated snow depth", "kg m-2", "surface_snow_amount"),
    (71, "tcc", "Total cloud cover", "%", "cloud_area_fraction"),
    (81, "lsm", "Land-sea mask", "1", "land_binary_mask"),
    (84, "al", "Albedo", "%", "surface_albedo"),
    (85, "st", "Soil temperature", "K", "soil_temperature"),
    (111, "nswrs", "Net short-wave radiation flux (surface)", "W m-2", ""),
    (112, "nlwrs", "Net long-wave radiation flux (surface)", "W m-2", ""),
    (121, "lhtfl", "Latent heat net flux", "W m-2", "surface_upward_latent_heat_flux"),
    (122, "shtfl", "Sensible heat net flux", "W m-2", "surface_upward_sensible_heat_flux"),
];

/// WMO Code Table 4.2 (GRIB2)
const GRIB2_DEFAULTS: &[Row<(u8, u8, u8)>] = &[
    ((0, 0, 0), "t", "Temperature", "K", "air_temperature"),
    ((0, 0, 4), "tmax", "Maximum temperature", "K", "air_temperature"),
    ((0, 0, 5), "tmin", "Minimum temperature", "K", "air_temperature"),
    ((0, 0, 6), "td", "Dew point temperature", "K", "dew_point_temperature"),
    ((0, 1, 0), "q", "Specific humidity", "kg kg-1", "specific_humidity"),
    ((0, 1, 1), "r", "Relative humidity", "%", "relative_humidity"),
    ((0, 1, 8), "tp", "Total precipitation", "kg m-2", "precipitation_amount"),
    ((0, 2, 2), "u", "U component of wind", "m s-1", "eastward_wind"),
    ((0, 2, 3), "v", "V component of wind", "m s-1", "northward_wind"),
    ((0, 2, 8), "w", "Vertical velocity", "Pa s-1", "lagrangian_tendency_of_air_pressure"),
    ((0, 2, 22), "gust", "Wind speed (gust)", "m s-1", "wind_speed_of_gust"),
    ((0, 3, 0), "pres", "Pressure", "Pa", "air_pressure"),
    ((0, 3, 1), "prmsl", "Pressure reduced to MSL", "Pa", "air_pressure_at_mean_sea_level"),
    ((0, 3, 4), "z", "Geopotential", "m2 s-2", "geopotential"),
    ((0, 3, 5), "gh", "Geopotential height", "gpm", "geopotential_height"),
    ((0, 6, 1), "tcc", "Total cloud cover", "%", "cloud_area_fraction"),
    ((0, 19, 0), "vis", "Visibility", "m", "visibility_in_air"),
    ((2, 0, 0), "lsm", "Land cover (1 = land, 0 = sea)", "1", "land_binary_mask"),
];
