//! Ingestion configuration.
//!
//! Loaded from YAML, then overridden by environment variables. The decoder
//! never reads the environment itself; everything it needs is handed over
//! through [`IngestConfig::decoder_config`].

use std::path::{Path, PathBuf};

use dataset_writer::{OutputFormat, WriterConfig};
use grib_parser::{DecoderConfig, DEFAULT_MAX_POINTS};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{IngestionError, Result};
use crate::index::IndexOptions;

/// Top-level ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Worker threads for scanning and decoding (0 = one per CPU)
    pub workers: usize,

    /// Optional YAML parameter table merged over the built-in one
    pub parameter_table: Option<PathBuf>,

    /// Value for grid points without data. NaN unless configured.
    pub missing_value: f64,

    /// Largest grid (ni * nj) a record may declare; larger records are skipped
    pub max_points: usize,

    /// File extensions kept when expanding input directories (empty = all)
    pub extensions: Vec<String>,

    /// Output format; inferred from the destination when unset
    pub format: Option<OutputFormat>,

    /// Chunking, compression and overwrite settings for the writer
    pub writer: WriterConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            parameter_table: None,
            missing_value: f64::NAN,
            max_points: DEFAULT_MAX_POINTS,
            extensions: Vec::new(),
            format: None,
            writer: WriterConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from a YAML file. Missing keys take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            IngestionError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), "Loaded ingestion configuration");
        Ok(config)
    }

    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `NWP_*` and `ZARR_*` environment variables that
    /// are set.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("NWP_WORKERS") {
            if let Ok(workers) = val.parse() {
                self.workers = workers;
            }
        }
        if let Ok(val) = std::env::var("NWP_PARAMETER_TABLE") {
            self.parameter_table = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }
        if let Ok(val) = std::env::var("NWP_MISSING_VALUE") {
            if let Ok(missing) = val.parse() {
                self.missing_value = missing;
            }
        }
        if let Ok(val) = std::env::var("NWP_MAX_POINTS") {
            if let Ok(max_points) = val.parse() {
                self.max_points = max_points;
            }
        }
        self.writer.apply_env();
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.missing_value.is_infinite() {
            return Err(IngestionError::InvalidConfig(
                "missing_value must be finite or NaN".to_string(),
            ));
        }
        if self.max_points == 0 {
            return Err(IngestionError::InvalidConfig(
                "max_points must be greater than 0".to_string(),
            ));
        }
        if let Some(table) = &self.parameter_table {
            if !table.is_file() {
                return Err(IngestionError::InvalidConfig(format!(
                    "parameter table {} does not exist",
                    table.display()
                )));
            }
        }
        self.writer
            .validate()
            .map_err(IngestionError::InvalidConfig)
    }

    /// Decoder settings: built-in tables plus the configured table.
    pub fn decoder_config(&self) -> Result<DecoderConfig> {
        let config =
            DecoderConfig::with_parameter_table(self.parameter_table.as_deref(), self.missing_value)
                .map_err(|e| IngestionError::InvalidConfig(e.to_string()))?;
        Ok(DecoderConfig {
            max_points: self.max_points,
            ..config
        })
    }

    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            extensions: self.extensions.clone(),
        }
    }

    /// Dedicated pool bounded to `workers` threads.
    pub fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("ingest-{}", i))
            .build()
            .map_err(|e| IngestionError::InvalidConfig(format!("thread pool: {}", e)))
    }

    /// Output format for `destination`.
    pub fn output_format(&self, destination: &Path) -> OutputFormat {
        self.format
            .unwrap_or_else(|| OutputFormat::from_destination(destination))
    }
}
