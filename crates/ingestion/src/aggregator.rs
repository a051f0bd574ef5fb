//! Assembly of selected records into one 4-D dataset.
//!
//! The grid is checked on index metadata before anything is decoded. Records
//! are then decoded in parallel, one worker per file, and merged into a slot
//! table keyed by (step, level). The table is the only shared mutable state.
//! When two records claim the same slot the one later in index order wins,
//! whatever order the workers finish in.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use grib_parser::RecordDecoder;
use ndarray::Array4;
use nwp_common::{AggregatedDataset, ForecastStep, GridDefinition, RecordLocator};
use projection::GridProjector;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::diagnostics::Diagnostic;
use crate::error::{IngestionError, Result};
use crate::index::IndexEntry;

/// A dataset and everything worked around while building it.
#[derive(Debug)]
pub struct Aggregation {
    pub dataset: AggregatedDataset,
    pub diagnostics: Vec<Diagnostic>,
}

/// Slot table key. Levels are compared by bit pattern.
type SlotKey = (ForecastStep, u64);

/// Values of one (step, level) combination.
struct Slot {
    /// Position in the selection; larger wins
    order: usize,
    locator: RecordLocator,
    reference_time: DateTime<Utc>,
    values: Vec<f64>,
    /// Records this slot displaced or rejected, with their positions
    displaced: Vec<(usize, RecordLocator)>,
}

/// Decoded record on its way into the slot table.
struct Decoded {
    order: usize,
    locator: RecordLocator,
    step: ForecastStep,
    level: f64,
    reference_time: DateTime<Utc>,
    values: Vec<f64>,
}

#[derive(Default)]
struct SlotTable {
    slots: HashMap<SlotKey, Slot>,
    levels: HashMap<u64, f64>,
}

impl SlotTable {
    fn merge(&mut self, record: Decoded) {
        let key = (record.step, record.level.to_bits());
        self.levels.insert(key.1, record.level);

        match self.slots.get_mut(&key) {
            None => {
                self.slots.insert(
                    key,
                    Slot {
                        order: record.order,
                        locator: record.locator,
                        reference_time: record.reference_time,
                        values: record.values,
                        displaced: Vec::new(),
                    },
                );
            }
            Some(slot) if record.order > slot.order => {
                let previous = std::mem::replace(&mut slot.locator, record.locator);
                slot.displaced.push((slot.order, previous));
                slot.order = record.order;
                slot.reference_time = record.reference_time;
                slot.values = record.values;
            }
            Some(slot) => slot.displaced.push((record.order, record.locator)),
        }
    }
}

/// Builds [`AggregatedDataset`]s from index entries.
pub struct Aggregator<'a> {
    decoder: &'a RecordDecoder,
    projector: &'a GridProjector,
}

impl<'a> Aggregator<'a> {
    pub fn new(decoder: &'a RecordDecoder, projector: &'a GridProjector) -> Self {
        Self { decoder, projector }
    }

    /// Merge `selected` (in index order) into one dataset.
    ///
    /// `query` only labels errors. Runs on the current rayon pool.
    pub fn aggregate(&self, query: &str, selected: &[&IndexEntry]) -> Result<Aggregation> {
        let grid = check_grid(selected)?;
        let grid = Arc::new(grid);

        let table = Mutex::new(SlotTable::default());
        let failures = Mutex::new(Vec::new());

        let mut by_file: BTreeMap<usize, Vec<(usize, &IndexEntry)>> = BTreeMap::new();
        for (order, entry) in selected.iter().enumerate() {
            by_file.entry(entry.input).or_default().push((order, entry));
        }
        let files: Vec<Vec<(usize, &IndexEntry)>> = by_file.into_values().collect();

        info!(
            query = query,
            records = selected.len(),
            files = files.len(),
            "Decoding selected records"
        );

        files.par_iter().try_for_each(|entries| -> Result<()> {
            let Some((_, first)) = entries.first() else {
                return Ok(());
            };
            let mut reader = BufReader::new(open(&first.locator.path)?);
            for (order, entry) in entries {
                match self.decoder.decode_at(&mut reader, &entry.locator) {
                    Ok(record) => {
                        let meta = record.metadata;
                        let decoded = Decoded {
                            order: *order,
                            locator: entry.locator.clone(),
                            step: meta.step,
                            level: meta.level,
                            reference_time: meta.reference_time,
                            values: record.values,
                        };
                        table
                            .lock()
                            .unwrap_or_else(|p| p.into_inner())
                            .merge(decoded);
                    }
                    Err(error) => {
                        let diagnostic = Diagnostic::from_decode_error(&entry.locator, &error);
                        diagnostic.log();
                        failures
                            .lock()
                            .unwrap_or_else(|p| p.into_inner())
                            .push((*order, diagnostic));
                    }
                }
            }
            Ok(())
        })?;

        let table = table.into_inner().unwrap_or_else(|p| p.into_inner());
        let mut failures = failures.into_inner().unwrap_or_else(|p| p.into_inner());
        failures.sort_by_key(|(order, _)| *order);
        let mut diagnostics: Vec<Diagnostic> = failures.into_iter().map(|(_, d)| d).collect();

        if table.slots.is_empty() {
            return Err(IngestionError::EmptyDataset {
                query: query.to_string(),
                selected: selected.len(),
            });
        }

        let mut steps: Vec<ForecastStep> = table.slots.keys().map(|(step, _)| *step).collect();
        steps.sort();
        steps.dedup();
        let mut levels: Vec<f64> = table.levels.values().copied().collect();
        levels.sort_by(f64::total_cmp);

        let step_index: HashMap<ForecastStep, usize> =
            steps.iter().enumerate().map(|(i, s)| (*s, i)).collect();
        let level_index: HashMap<u64, usize> = levels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.to_bits(), i))
            .collect();

        let reference_time = table
            .slots
            .values()
            .map(|slot| slot.reference_time)
            .min()
            .unwrap_or_else(|| selected[0].metadata.reference_time);

        let missing_value = self.decoder.config().missing_value;
        let (nj, ni) = grid.shape();
        let mut values = Array4::from_elem((steps.len(), levels.len(), nj, ni), missing_value);

        // Deterministic diagnostic order: by winning record position
        let mut slots: Vec<(&SlotKey, &Slot)> = table.slots.iter().collect();
        slots.sort_by_key(|(_, slot)| slot.order);

        for ((step, level_bits), slot) in slots {
            let (si, li) = (step_index[step], level_index[level_bits]);
            let mut target = values.slice_mut(ndarray::s![si, li, .., ..]);
            for (dst, src) in target.iter_mut().zip(slot.values.iter()) {
                *dst = *src;
            }

            let mut displaced = slot.displaced.clone();
            displaced.sort_by_key(|(order, _)| *order);
            for (_, replaced) in displaced {
                let diagnostic = Diagnostic::DuplicateSlot {
                    step: *step,
                    level: levels[li],
                    kept: slot.locator.clone(),
                    replaced,
                };
                diagnostic.log();
                diagnostics.push(diagnostic);
            }

            if slot.reference_time != reference_time {
                let diagnostic = Diagnostic::ReferenceTimeMismatch {
                    locator: slot.locator.clone(),
                    expected: reference_time,
                    found: slot.reference_time,
                };
                diagnostic.log();
                diagnostics.push(diagnostic);
            }
        }

        let coordinates = self.projector.project(&grid)?;
        let first = &selected[0].metadata;
        let records_merged = table.slots.len();

        info!(
            query = query,
            steps = steps.len(),
            levels = levels.len(),
            rows = nj,
            columns = ni,
            records_merged = records_merged,
            diagnostics = diagnostics.len(),
            "Aggregated dataset"
        );

        Ok(Aggregation {
            dataset: AggregatedDataset {
                parameter: first.parameter.clone(),
                description: first.description.clone(),
                level_type: first.level_type,
                reference_time,
                steps,
                levels,
                values,
                grid,
                coordinates,
                missing_value,
                records_merged,
            },
            diagnostics,
        })
    }
}

/// The grid every selected record must share, taken from the first one.
fn check_grid(selected: &[&IndexEntry]) -> Result<GridDefinition> {
    let Some(first) = selected.first() else {
        return Err(IngestionError::EmptyDataset {
            query: String::new(),
            selected: 0,
        });
    };
    for entry in &selected[1..] {
        if entry.metadata.grid != first.metadata.grid {
            return Err(IngestionError::InconsistentGrid {
                expected: Box::new(first.metadata.grid.clone()),
                found: Box::new(entry.metadata.grid.clone()),
                first: first.locator.clone(),
                conflicting: entry.locator.clone(),
            });
        }
    }
    debug!(
        projection = first.metadata.grid.projection.short_name(),
        rows = first.metadata.grid.nj,
        columns = first.metadata.grid.ni,
        "Grid consistent across selection"
    );
    Ok(first.metadata.grid.clone())
}

fn open(path: &Path) -> Result<File> {
    Ok(File::open(path)?)
}
