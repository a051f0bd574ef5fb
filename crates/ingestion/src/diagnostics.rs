//! Non-fatal findings reported alongside a result.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use grib_parser::{DecodeError, ScanError};
use nwp_common::{ForecastStep, RecordLocator};
use serde::Serialize;
use tracing::warn;

/// Something the pipeline worked around without failing the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "diagnostic", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A record that could not be indexed or decoded and was left out.
    SkippedRecord {
        path: PathBuf,
        offset: u64,
        field: Option<u16>,
        kind: &'static str,
        error: String,
    },
    /// Two records mapped to the same (step, level); `kept` is the one
    /// later in index order.
    DuplicateSlot {
        step: ForecastStep,
        level: f64,
        kept: RecordLocator,
        replaced: RecordLocator,
    },
    /// A merged record's reference time differs from the dataset's.
    ReferenceTimeMismatch {
        locator: RecordLocator,
        expected: DateTime<Utc>,
        found: DateTime<Utc>,
    },
}

impl Diagnostic {
    /// Record skipped while scanning.
    pub fn from_scan_error(error: &ScanError) -> Self {
        Self::SkippedRecord {
            path: error.path.clone(),
            offset: error.offset,
            field: error.field,
            kind: error.error.kind(),
            error: error.error.to_string(),
        }
    }

    /// Indexed record that failed to decode.
    pub fn from_decode_error(locator: &RecordLocator, error: &DecodeError) -> Self {
        Self::SkippedRecord {
            path: locator.path.clone(),
            offset: locator.offset,
            field: Some(locator.field),
            kind: error.kind(),
            error: error.to_string(),
        }
    }

    /// Emit this diagnostic as a `tracing` warning.
    pub fn log(&self) {
        match self {
            Self::SkippedRecord {
                path,
                offset,
                field,
                kind,
                error,
            } => warn!(
                path = %path.display(),
                offset = offset,
                field = ?field,
                kind = kind,
                error = %error,
                "Skipped record"
            ),
            Self::DuplicateSlot {
                step,
                level,
                kept,
                replaced,
            } => warn!(
                step = %step,
                level = level,
                kept = %kept,
                replaced = %replaced,
                "Duplicate record for step and level, keeping the later one"
            ),
            Self::ReferenceTimeMismatch {
                locator,
                expected,
                found,
            } => warn!(
                locator = %locator,
                expected = %expected,
                found = %found,
                "Record has a different reference time"
            ),
        }
    }

    pub fn is_skipped_record(&self) -> bool {
        matches!(self, Self::SkippedRecord { .. })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkippedRecord {
                path,
                offset,
                field,
                error,
                ..
            } => {
                write!(f, "skipped {}@{}", path.display(), offset)?;
                if let Some(field) = field {
                    write!(f, "#{}", field)?;
                }
                write!(f, ": {}", error)
            }
            Self::DuplicateSlot {
                step,
                level,
                kept,
                replaced,
            } => write!(
                f,
                "duplicate step {} level {}: kept {}, replaced {}",
                step, level, kept, replaced
            ),
            Self::ReferenceTimeMismatch {
                locator,
                expected,
                found,
            } => write!(
                f,
                "{} has reference time {}, dataset uses {}",
                locator, found, expected
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_record_from_decode_error() {
        let locator = RecordLocator::new(PathBuf::from("fc+003grib"), 128, 400, 0);
        let diagnostic =
            Diagnostic::from_decode_error(&locator, &DecodeError::corrupt("missing end marker"));

        assert!(diagnostic.is_skipped_record());
        assert_eq!(
            diagnostic.to_string(),
            "skipped fc+003grib@128#0: Corrupt record: missing end marker"
        );
    }

    #[test]
    fn test_serializes_with_tag() {
        let locator = RecordLocator::new(PathBuf::from("a"), 0, 10, 0);
        let diagnostic = Diagnostic::DuplicateSlot {
            step: ForecastStep::from_hours(1),
            level: 2.0,
            kept: locator.clone(),
            replaced: locator,
        };
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["diagnostic"], "duplicate_slot");
        assert_eq!(json["level"], 2.0);
    }
}
