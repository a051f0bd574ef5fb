//! Lazy record scanner over a GRIB stream.
//!
//! [`RecordScanner`] walks a seekable source message by message and yields
//! the metadata of every field, reading section headers only. Bitmap and
//! data sections are skipped with `seek`, so scanning a file costs a few
//! hundred bytes per message regardless of grid size.
//!
//! Messages are found by searching for the "GRIB" magic, which skips padding
//! between concatenated messages. A message whose declared length does not
//! land on "7777" yields one error and scanning resumes at the next magic
//! after its header; a message with sound boundaries but bad contents yields
//! one error and scanning resumes right after it.

use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use nwp_common::{RecordLocator, RecordMetadata};
use tracing::debug;

use crate::decoder::{IndexedRecord, MessageSections, RecordDecoder};
use crate::error::{DecodeError, Result};
use crate::sections::{parse_indicator, read_at, END_MARKER, MAGIC};

const SEARCH_CHUNK: usize = 64 * 1024;

/// A record the scanner had to skip.
#[derive(Debug)]
pub struct ScanError {
    pub path: PathBuf,
    /// Offset of the message the error belongs to
    pub offset: u64,
    /// Field within the message, when only one field was affected
    pub field: Option<u16>,
    pub error: DecodeError,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path.display(), self.offset)?;
        if let Some(field) = self.field {
            write!(f, "#{}", field)?;
        }
        write!(f, ": {}", self.error)
    }
}

impl std::error::Error for ScanError {}

type FieldMetadata = Result<RecordMetadata>;

/// Failure reading one message, with the position to resume from.
struct MessageFailure {
    error: DecodeError,
    resume_at: u64,
}

/// Iterator over the fields of every message in a stream.
pub struct RecordScanner<R> {
    reader: R,
    path: PathBuf,
    decoder: RecordDecoder,
    position: u64,
    end: u64,
    pending: VecDeque<std::result::Result<IndexedRecord, ScanError>>,
    finished: bool,
}

impl RecordScanner<BufReader<File>> {
    /// Scan a file on disk.
    pub fn open(path: &Path, decoder: RecordDecoder) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file), path, decoder)
    }
}

impl<R: Read + Seek> RecordScanner<R> {
    /// `path` only labels the locators and errors this scanner produces.
    pub fn new(mut reader: R, path: impl Into<PathBuf>, decoder: RecordDecoder) -> Result<Self> {
        let end = reader.seek(SeekFrom::End(0))?;
        Ok(Self {
            reader,
            path: path.into(),
            decoder,
            position: 0,
            end,
            pending: VecDeque::new(),
            finished: false,
        })
    }

    /// Start (or restart) scanning at `offset`.
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.position = offset;
        self.pending.clear();
        self.finished = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next "GRIB" magic at or after `from`.
    fn find_magic(&mut self, from: u64) -> Result<Option<u64>> {
        let mut buf = vec![0u8; SEARCH_CHUNK];
        let mut position = from;

        while position + MAGIC.len() as u64 <= self.end {
            let want = (self.end - position).min(SEARCH_CHUNK as u64) as usize;
            self.reader.seek(SeekFrom::Start(position))?;
            self.reader.read_exact(&mut buf[..want])?;

            if let Some(i) = buf[..want].windows(MAGIC.len()).position(|w| w == MAGIC) {
                return Ok(Some(position + i as u64));
            }
            if position + want as u64 >= self.end {
                break;
            }
            // Keep an overlap so a magic split across chunks is still found
            position += (want - (MAGIC.len() - 1)) as u64;
        }
        Ok(None)
    }

    /// Read the message at `offset`: its length and the metadata of each field.
    fn read_message(
        &mut self,
        offset: u64,
    ) -> std::result::Result<(u64, Vec<FieldMetadata>), MessageFailure> {
        let resync = |error: DecodeError| MessageFailure {
            error,
            resume_at: offset + MAGIC.len() as u64,
        };

        let probe = (self.end - offset).min(16) as usize;
        let head = read_at(&mut self.reader, offset, probe).map_err(resync)?;
        let indicator = parse_indicator(&head).map_err(resync)?;

        let length = indicator.message_length;
        if length < indicator.section_length() as u64 + 4 || length > self.end - offset {
            return Err(resync(DecodeError::corrupt(format!(
                "declared length {} exceeds the {} bytes left in the file",
                length,
                self.end - offset
            ))));
        }
        let marker = read_at(&mut self.reader, offset + length - 4, 4).map_err(resync)?;
        if marker != END_MARKER {
            return Err(resync(DecodeError::corrupt(format!(
                "declared length {} does not end on 7777",
                length
            ))));
        }

        // Boundaries are sound from here on
        let skip = |error: DecodeError| MessageFailure {
            error,
            resume_at: offset + length,
        };
        let sections =
            MessageSections::read_headers(&mut self.reader, offset, indicator).map_err(skip)?;
        let fields = (0..sections.field_count())
            .map(|field| self.decoder.field_metadata(&sections, field))
            .collect();
        Ok((length, fields))
    }

    fn fail(&self, offset: u64, field: Option<u16>, error: DecodeError) -> ScanError {
        ScanError {
            path: self.path.clone(),
            offset,
            field,
            error,
        }
    }
}

impl<R: Read + Seek> Iterator for RecordScanner<R> {
    type Item = std::result::Result<IndexedRecord, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.finished {
                return None;
            }

            let offset = match self.find_magic(self.position) {
                Ok(Some(offset)) => offset,
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(error) => {
                    self.finished = true;
                    return Some(Err(self.fail(self.position, None, error)));
                }
            };
            if offset > self.position {
                debug!(
                    path = %self.path.display(),
                    skipped = offset - self.position,
                    "Skipped bytes between messages"
                );
            }

            match self.read_message(offset) {
                Ok((length, fields)) => {
                    self.position = offset + length;
                    debug!(
                        path = %self.path.display(),
                        offset,
                        length,
                        fields = fields.len(),
                        "Indexed message"
                    );
                    for (field, metadata) in fields.into_iter().enumerate() {
                        let field = field as u16;
                        let item = match metadata {
                            Ok(metadata) => Ok(IndexedRecord {
                                locator: RecordLocator::new(
                                    self.path.clone(),
                                    offset,
                                    length,
                                    field,
                                ),
                                metadata,
                            }),
                            Err(error) => Err(self.fail(offset, Some(field), error)),
                        };
                        self.pending.push_back(item);
                    }
                }
                Err(MessageFailure { error, resume_at }) => {
                    self.position = resume_at;
                    if !error.is_record_scoped() {
                        self.finished = true;
                    }
                    self.pending.push_back(Err(self.fail(offset, None, error)));
                }
            }
        }
    }
}

impl RecordDecoder {
    /// Scan a seekable source. See [`RecordScanner`].
    pub fn scan<R: Read + Seek>(&self, reader: R, path: impl Into<PathBuf>) -> Result<RecordScanner<R>> {
        RecordScanner::new(reader, path, self.clone())
    }

    /// Scan a file on disk.
    pub fn scan_file(&self, path: &Path) -> Result<RecordScanner<BufReader<File>>> {
        RecordScanner::open(path, self.clone())
    }
}
