//! End-to-end pipeline: index, select, aggregate, project, write.

use std::path::{Path, PathBuf};

use dataset_writer::{create_writer, WriteSummary};
use grib_parser::RecordDecoder;
use projection::GridProjector;
use serde::Serialize;
use tracing::info;

use crate::aggregator::{Aggregation, Aggregator};
use crate::config::IngestConfig;
use crate::diagnostics::Diagnostic;
use crate::error::Result;
use crate::index::{IndexEntry, RecordIndex};
use crate::selector::Selector;

/// Outcome of one [`Ingester::convert`] call.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub query: String,
    pub records_indexed: usize,
    pub records_selected: usize,
    pub records_merged: usize,
    pub output: WriteSummary,
    /// Scan diagnostics first, then aggregation diagnostics
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs queries against local GRIB files.
///
/// Holds the decoder, the projection cache and a worker pool sized by
/// [`IngestConfig::workers`]. Several queries over the same inputs can share
/// one [`RecordIndex`] through [`Ingester::index`] and [`Ingester::aggregate`].
pub struct Ingester {
    config: IngestConfig,
    decoder: RecordDecoder,
    projector: GridProjector,
    pool: rayon::ThreadPool,
}

impl Ingester {
    /// Validate `config` and set up the decoder and worker pool.
    pub fn new(config: IngestConfig) -> Result<Self> {
        config.validate()?;
        let decoder = RecordDecoder::new(config.decoder_config()?);
        let pool = config.thread_pool()?;
        info!(
            workers = pool.current_num_threads(),
            parameters = decoder.config().tables.parameter_count(),
            "Ingester ready"
        );
        Ok(Self {
            config,
            decoder,
            projector: GridProjector::new(),
            pool,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn decoder(&self) -> &RecordDecoder {
        &self.decoder
    }

    pub fn projector(&self) -> &GridProjector {
        &self.projector
    }

    /// Index the records in `inputs` (files or directories).
    pub fn index(&self, inputs: &[PathBuf]) -> Result<RecordIndex> {
        let options = self.config.index_options();
        self.pool
            .install(|| RecordIndex::build(inputs, &self.decoder, &options))
    }

    /// Select and merge the records of one query.
    pub fn aggregate(&self, index: &RecordIndex, selector: &Selector) -> Result<Aggregation> {
        let selected = selector.select(index)?;
        self.merge(selector, &selected)
    }

    fn merge(&self, selector: &Selector, selected: &[&IndexEntry]) -> Result<Aggregation> {
        let query = selector.to_string();
        let aggregator = Aggregator::new(&self.decoder, &self.projector);
        self.pool
            .install(|| aggregator.aggregate(&query, selected))
    }

    /// Run one query and write the result to `destination`.
    ///
    /// Nothing is written unless the query produced a dataset.
    pub fn convert(
        &self,
        inputs: &[PathBuf],
        selector: &Selector,
        destination: &Path,
    ) -> Result<IngestReport> {
        let index = self.index(inputs)?;
        let selected = selector.select(&index)?;
        let Aggregation {
            dataset,
            diagnostics: merge_diagnostics,
        } = self.merge(selector, &selected)?;

        let format = self.config.output_format(destination);
        let writer = create_writer(format, self.config.writer.clone())?;
        let output = writer.write(&dataset, destination)?;

        let mut diagnostics = index.diagnostics().to_vec();
        diagnostics.extend(merge_diagnostics);

        info!(
            query = %selector,
            destination = %destination.display(),
            format = %format,
            records_merged = dataset.records_merged,
            diagnostics = diagnostics.len(),
            "Conversion complete"
        );

        Ok(IngestReport {
            query: selector.to_string(),
            records_indexed: index.len(),
            records_selected: selected.len(),
            records_merged: dataset.records_merged,
            output,
            diagnostics,
        })
    }
}
