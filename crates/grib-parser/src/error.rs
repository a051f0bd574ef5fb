//! Error types for GRIB decoding.

use thiserror::Error;

/// Errors raised while locating or decoding a single GRIB record.
///
/// `CorruptRecord` and `UnsupportedEncoding` are scoped to one record: the
/// caller skips it and keeps going. `Io` means the source itself failed.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Corrupt record: {reason}")]
    CorruptRecord { reason: String },

    #[error("Unsupported encoding: {what}")]
    UnsupportedEncoding { what: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            reason: reason.into(),
        }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::UnsupportedEncoding { what: what.into() }
    }

    /// Error confined to one section of a message.
    pub fn invalid_section(section: u8, reason: impl std::fmt::Display) -> Self {
        Self::corrupt(format!("section {}: {}", section, reason))
    }

    /// True when only the offending record is affected.
    pub fn is_record_scoped(&self) -> bool {
        !matches!(self, Self::Io(_))
    }

    /// Short machine-readable kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CorruptRecord { .. } => "corrupt_record",
            Self::UnsupportedEncoding { .. } => "unsupported_encoding",
            Self::Io(_) => "io",
        }
    }
}

/// Map a short read inside a message to a corrupt record rather than an I/O
/// failure of the whole source.
pub(crate) fn truncated(err: std::io::Error, what: &str) -> DecodeError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        DecodeError::corrupt(format!("truncated {}", what))
    } else {
        DecodeError::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Errors loading a parameter table.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Failed to read parameter table: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter table: {0}")]
    Invalid(String),
}
