//! Index of every record in a set of input files.
//!
//! Building the index reads message headers only. Files are scanned in
//! parallel on the current rayon pool, each one opened, read and closed by a
//! single worker, and the entries are ordered by (input position, offset,
//! field) so the result does not depend on scheduling.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use grib_parser::RecordDecoder;
use nwp_common::{LevelType, ParameterId, RecordLocator, RecordMetadata};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::diagnostics::Diagnostic;
use crate::error::Result;

/// How input paths are expanded.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// File name endings kept when walking directories ("grib2",
    /// "grib_fp"); empty keeps every file. Files named explicitly are
    /// always kept.
    pub extensions: Vec<String>,
}

impl IndexOptions {
    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let name = name.to_lowercase();
        self.extensions
            .iter()
            .any(|ext| name.ends_with(&ext.trim_start_matches('.').to_lowercase()))
    }
}

/// One indexed field.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Position of the file among the expanded inputs
    pub input: usize,
    pub locator: RecordLocator,
    pub metadata: RecordMetadata,
}

/// Records found in the inputs, in input order.
#[derive(Debug, Clone, Default)]
pub struct RecordIndex {
    files: Vec<PathBuf>,
    entries: Vec<IndexEntry>,
    diagnostics: Vec<Diagnostic>,
}

impl RecordIndex {
    /// Scan `paths`, expanding directories recursively.
    ///
    /// Records that cannot be read are left out and reported as
    /// [`Diagnostic::SkippedRecord`]. A path that does not exist or a file
    /// that cannot be opened fails the whole build.
    pub fn build(paths: &[PathBuf], decoder: &RecordDecoder, options: &IndexOptions) -> Result<Self> {
        let files = expand_inputs(paths, options)?;
        info!(files = files.len(), "Indexing input files");

        let scanned = files
            .par_iter()
            .enumerate()
            .map(|(input, path)| scan_file(input, path, decoder))
            .collect::<Result<Vec<_>>>()?;

        let mut entries = Vec::new();
        let mut diagnostics = Vec::new();
        for (file_entries, file_diagnostics) in scanned {
            entries.extend(file_entries);
            diagnostics.extend(file_diagnostics);
        }
        entries.sort_by(|a, b| {
            (a.input, a.locator.offset, a.locator.field).cmp(&(
                b.input,
                b.locator.offset,
                b.locator.field,
            ))
        });

        info!(
            files = files.len(),
            records = entries.len(),
            skipped = diagnostics.len(),
            "Index built"
        );

        Ok(Self {
            files,
            entries,
            diagnostics,
        })
    }

    /// Expanded input files, in input order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Records skipped while scanning.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct (parameter, level type) pairs with record counts.
    pub fn summary(&self) -> Vec<InventoryEntry> {
        let mut groups: BTreeMap<(String, String, String), InventoryEntry> = BTreeMap::new();
        for entry in &self.entries {
            let meta = &entry.metadata;
            let key = (
                meta.parameter.short_name.clone(),
                meta.parameter.code.to_string(),
                meta.level_type.to_string(),
            );
            let group = groups.entry(key).or_insert_with(|| InventoryEntry {
                parameter: meta.parameter.clone(),
                level_type: meta.level_type,
                records: 0,
                steps: Vec::new(),
                levels: Vec::new(),
            });
            group.records += 1;
            let hours = meta.step.hours();
            if !group.steps.contains(&hours) {
                group.steps.push(hours);
            }
            if !group.levels.contains(&meta.level) {
                group.levels.push(meta.level);
            }
        }

        groups
            .into_values()
            .map(|mut group| {
                group.steps.sort_by(f64::total_cmp);
                group.levels.sort_by(f64::total_cmp);
                group
            })
            .collect()
    }
}

/// Records of one parameter on one level type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryEntry {
    pub parameter: ParameterId,
    pub level_type: LevelType,
    pub records: usize,
    /// Distinct steps in hours, ascending
    pub steps: Vec<f64>,
    /// Distinct level values, ascending
    pub levels: Vec<f64>,
}

impl fmt::Display for InventoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {}: {} records, steps {:?}, levels {:?}",
            self.parameter, self.level_type, self.records, self.steps, self.levels
        )
    }
}

/// Expand directories to the files beneath them, sorted by path.
fn expand_inputs(paths: &[PathBuf], options: &IndexOptions) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for path in paths {
        let metadata = std::fs::metadata(path)?;
        if metadata.is_dir() {
            let mut found = Vec::new();
            for entry in WalkDir::new(path).follow_links(true) {
                let entry = entry.map_err(|e| {
                    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
                })?;
                if entry.file_type().is_file() && options.accepts(entry.path()) {
                    found.push(entry.into_path());
                }
            }
            found.sort();
            debug!(directory = %path.display(), files = found.len(), "Expanded input directory");
            for file in found {
                if seen.insert(file.clone()) {
                    files.push(file);
                }
            }
        } else if seen.insert(path.clone()) {
            files.push(path.clone());
        }
    }

    Ok(files)
}

fn scan_file(
    input: usize,
    path: &Path,
    decoder: &RecordDecoder,
) -> Result<(Vec<IndexEntry>, Vec<Diagnostic>)> {
    let mut entries = Vec::new();
    let mut diagnostics = Vec::new();

    let scanner = decoder.scan_file(path).map_err(|e| match e {
        grib_parser::DecodeError::Io(io) => io,
        other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
    })?;

    for item in scanner {
        match item {
            Ok(indexed) => {
                debug!(
                    locator = %indexed.locator,
                    parameter = %indexed.metadata.parameter,
                    level_type = %indexed.metadata.level_type,
                    level = indexed.metadata.level,
                    step = %indexed.metadata.step,
                    "Indexed record"
                );
                entries.push(IndexEntry {
                    input,
                    locator: indexed.locator,
                    metadata: indexed.metadata,
                });
            }
            Err(skipped) => {
                let diagnostic = Diagnostic::from_scan_error(&skipped);
                diagnostic.log();
                diagnostics.push(diagnostic);
            }
        }
    }

    Ok((entries, diagnostics))
}
