//! GRIB decoder for editions 1 and 2 (WMO FM 92).
//!
//! Decodes simple-packed latitude/longitude and rotated latitude/longitude
//! fields into [`Record`]s, and scans GRIB streams for field metadata
//! without unpacking values.
//!
//! ```no_run
//! use grib_parser::{RecordDecoder, DecoderConfig};
//! use std::path::Path;
//!
//! let decoder = RecordDecoder::new(DecoderConfig::default());
//! for item in decoder.scan_file(Path::new("fc2024022416+003grib")).unwrap() {
//!     match item {
//!         Ok(indexed) => println!("{} {}", indexed.locator, indexed.metadata.parameter),
//!         Err(skipped) => eprintln!("skipped {}", skipped),
//!     }
//! }
//! ```

pub mod decoder;
pub mod error;
pub mod scanner;
pub mod sections;
pub mod tables;
pub mod unpacking;

pub use decoder::{DecoderConfig, IndexedRecord, Record, RecordDecoder, DEFAULT_MAX_POINTS};
pub use error::{DecodeError, Result, TableError};
pub use scanner::{RecordScanner, ScanError};
pub use sections::{decode_grib2_signed, encode_grib2_signed};
pub use tables::{ParameterEntry, ParameterTable};
pub use unpacking::{pack_simple, unpack_simple, SimplePacking};
