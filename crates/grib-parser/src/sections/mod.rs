//! GRIB section parsing.
//!
//! A GRIB message is a sequence of sections. Both editions open with an
//! indicator section that starts with "GRIB" and carries the edition and the
//! total message length, and close with "7777". Everything in between is
//! edition specific and lives in [`grib1`] and [`grib2`].
//!
//! Octet positions in this module are 1-based and relative to the start of
//! the section, the same numbering the WMO manual uses.

pub mod grib1;
pub mod grib2;

use std::io::{Read, Seek, SeekFrom};

use bytes::Bytes;
use nwp_common::{Edition, GridDefinition, GridProjection, ScanMode};

use crate::error::{truncated, DecodeError, Result};

/// Start of every GRIB message.
pub const MAGIC: &[u8; 4] = b"GRIB";
/// End of every GRIB message.
pub const END_MARKER: &[u8; 4] = b"7777";

/// Section 0: Indicator Section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator {
    pub edition: Edition,
    /// GRIB2 discipline; zero for GRIB1
    pub discipline: u8,
    pub message_length: u64,
}

impl Indicator {
    /// Size of the indicator section for this edition.
    pub fn section_length(&self) -> usize {
        match self.edition {
            Edition::Grib1 => 8,
            Edition::Grib2 => 16,
        }
    }
}

/// Smallest number of bytes that identify the edition of a message.
pub const INDICATOR_PROBE: usize = 8;

/// Parse Section 0 (Indicator) from the start of a message.
///
/// Needs 8 bytes for GRIB1 and 16 for GRIB2.
pub fn parse_indicator(data: &[u8]) -> Result<Indicator> {
    if data.len() < INDICATOR_PROBE {
        return Err(DecodeError::corrupt("not enough data for indicator section"));
    }
    if &data[0..4] != MAGIC {
        return Err(DecodeError::corrupt("invalid GRIB magic bytes"));
    }

    // Octet 8 holds the edition in both editions
    match data[7] {
        1 => {
            // Octets 5-7: total length
            let message_length = read_u24(&data[4..7]) as u64;
            Ok(Indicator {
                edition: Edition::Grib1,
                discipline: 0,
                message_length,
            })
        }
        2 => {
            if data.len() < 16 {
                return Err(DecodeError::corrupt("not enough data for indicator section"));
            }
            // Octet 7: discipline, octets 9-16: total length
            let mut length = [0u8; 8];
            length.copy_from_slice(&data[8..16]);
            Ok(Indicator {
                edition: Edition::Grib2,
                discipline: data[6],
                message_length: u64::from_be_bytes(length),
            })
        }
        other => Err(DecodeError::unsupported(format!("GRIB edition {}", other))),
    }
}

/// Verify that `message` is exactly one complete message: its declared
/// length matches and it ends with "7777".
pub fn check_message_bounds(indicator: &Indicator, message: &[u8]) -> Result<()> {
    if indicator.message_length != message.len() as u64 {
        return Err(DecodeError::corrupt(format!(
            "declared length {} does not match {} available bytes",
            indicator.message_length,
            message.len()
        )));
    }
    if message.len() < indicator.section_length() + 4 || !message.ends_with(END_MARKER) {
        return Err(DecodeError::corrupt("missing end marker 7777"));
    }
    Ok(())
}

/// Position of one section inside a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionEntry {
    pub number: u8,
    /// Offset from the start of the message
    pub offset: u64,
    pub length: u64,
}

/// One section with (some of) its bytes, header included.
///
/// While scanning, bulky sections (bitmap, data) are read only as far as the
/// metadata needs, so `data` may be shorter than `length`.
#[derive(Debug, Clone)]
pub struct RawSection {
    pub number: u8,
    pub offset: u64,
    pub length: u64,
    pub data: Bytes,
}

impl RawSection {
    pub fn is_complete(&self) -> bool {
        self.data.len() as u64 == self.length
    }

    pub(crate) fn octets(&self) -> Octets<'_> {
        Octets::new(&self.data, self.number)
    }
}

/// Borrow every located section from an in-memory message.
pub(crate) fn slice_sections(message: &Bytes, entries: &[SectionEntry]) -> Vec<RawSection> {
    entries
        .iter()
        .map(|e| RawSection {
            number: e.number,
            offset: e.offset,
            length: e.length,
            data: message.slice(e.offset as usize..(e.offset + e.length) as usize),
        })
        .collect()
}

/// Read located sections from a stream. `prefix` caps how many bytes of a
/// given section number are read; `None` reads the whole section.
pub(crate) fn read_sections<R: Read + Seek>(
    reader: &mut R,
    message_offset: u64,
    entries: &[SectionEntry],
    prefix: impl Fn(u8) -> Option<u64>,
) -> Result<Vec<RawSection>> {
    let mut sections = Vec::with_capacity(entries.len());
    for e in entries {
        let wanted = prefix(e.number).map_or(e.length, |p| p.min(e.length));
        let mut buf = vec![0u8; wanted as usize];
        reader.seek(SeekFrom::Start(message_offset + e.offset))?;
        reader
            .read_exact(&mut buf)
            .map_err(|err| truncated(err, "section"))?;
        sections.push(RawSection {
            number: e.number,
            offset: e.offset,
            length: e.length,
            data: Bytes::from(buf),
        });
    }
    Ok(sections)
}

/// Read `n` bytes at an absolute position.
pub(crate) fn read_at<R: Read + Seek>(reader: &mut R, position: u64, n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    reader.seek(SeekFrom::Start(position))?;
    reader
        .read_exact(&mut buf)
        .map_err(|err| truncated(err, "section header"))?;
    Ok(buf)
}

/// Grid of a template this crate does not decode. Records on it still index
/// and unpack (as one row), but cannot be projected.
pub(crate) fn unsupported_grid(template: u16, num_points: usize) -> GridDefinition {
    GridDefinition {
        ni: num_points,
        nj: 1,
        first_lat: 0,
        first_lon: 0,
        last_lat: 0,
        last_lon: 0,
        di: 0,
        dj: 0,
        scan_mode: ScanMode::standard(),
        projection: GridProjection::Unsupported { template },
    }
}

const FULL_CIRCLE: i64 = 360_000_000;

/// Column increment implied by the first and last longitude (microdegrees),
/// for grids that leave it out. Longitudes wrap at 360 degrees.
pub(crate) fn derive_longitude_increment(first: i64, last: i64, ni: usize, scan_mode: ScanMode) -> i64 {
    if ni < 2 {
        return 0;
    }
    let span = if scan_mode.i_negative {
        first - last
    } else {
        last - first
    };
    span.rem_euclid(FULL_CIRCLE) / (ni as i64 - 1)
}

/// Row increment implied by the first and last latitude (microdegrees).
pub(crate) fn derive_latitude_increment(first: i64, last: i64, nj: usize) -> i64 {
    if nj < 2 {
        return 0;
    }
    (last - first).abs() / (nj as i64 - 1)
}

/// Bounds-checked big-endian reader over one section.
///
/// Every read names the section it came from, so a short section surfaces as
/// a `CorruptRecord` that says where the message broke.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Octets<'a> {
    data: &'a [u8],
    section: u8,
}

impl<'a> Octets<'a> {
    pub(crate) fn new(data: &'a [u8], section: u8) -> Self {
        Self { data, section }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    /// Bytes from octet `from` (1-based) to octet `to` inclusive.
    pub(crate) fn range(&self, from: usize, to: usize) -> Result<&'a [u8]> {
        if from == 0 || to < from || to > self.data.len() {
            return Err(DecodeError::invalid_section(
                self.section,
                format!(
                    "octets {}-{} out of range, section has {}",
                    from,
                    to,
                    self.data.len()
                ),
            ));
        }
        Ok(&self.data[from - 1..to])
    }

    /// Bytes from octet `from` to the end of the section.
    pub(crate) fn tail(&self, from: usize) -> Result<&'a [u8]> {
        if from == 0 || from > self.data.len() + 1 {
            return Err(DecodeError::invalid_section(
                self.section,
                format!("octet {} out of range", from),
            ));
        }
        Ok(&self.data[from - 1..])
    }

    pub(crate) fn u8(&self, at: usize) -> Result<u8> {
        Ok(self.range(at, at)?[0])
    }

    pub(crate) fn u16(&self, at: usize) -> Result<u16> {
        let b = self.range(at, at + 1)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u24(&self, at: usize) -> Result<u32> {
        Ok(read_u24(self.range(at, at + 2)?))
    }

    pub(crate) fn u32(&self, at: usize) -> Result<u32> {
        let b = self.range(at, at + 3)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Sign-magnitude 16-bit integer.
    pub(crate) fn i16(&self, at: usize) -> Result<i16> {
        let raw = self.u16(at)?;
        let magnitude = (raw & 0x7FFF) as i16;
        Ok(if raw & 0x8000 != 0 { -magnitude } else { magnitude })
    }

    /// Sign-magnitude 24-bit integer.
    pub(crate) fn i24(&self, at: usize) -> Result<i32> {
        let raw = self.u24(at)?;
        let magnitude = (raw & 0x7F_FFFF) as i32;
        Ok(if raw & 0x80_0000 != 0 { -magnitude } else { magnitude })
    }

    /// Sign-magnitude 32-bit integer.
    pub(crate) fn i32(&self, at: usize) -> Result<i32> {
        Ok(decode_grib2_signed(self.range(at, at + 3)?))
    }

    /// Sign-magnitude 8-bit integer.
    pub(crate) fn i8(&self, at: usize) -> Result<i8> {
        let raw = self.u8(at)?;
        let magnitude = (raw & 0x7F) as i8;
        Ok(if raw & 0x80 != 0 { -magnitude } else { magnitude })
    }

    /// IEEE 754 single precision float.
    pub(crate) fn f32(&self, at: usize) -> Result<f32> {
        Ok(f32::from_bits(self.u32(at)?))
    }

    /// IBM System/360 single precision float.
    pub(crate) fn ibm_f32(&self, at: usize) -> Result<f64> {
        Ok(ibm_to_f64(self.u32(at)?))
    }
}

pub(crate) fn read_u24(b: &[u8]) -> u32 {
    ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32
}

/// Decode a 4-byte GRIB2 signed integer.
///
/// GRIB uses sign-magnitude encoding, not two's complement: the most
/// significant bit is the sign and the remaining 31 bits are the magnitude.
/// Anything other than exactly four bytes decodes to 0.
pub fn decode_grib2_signed(bytes: &[u8]) -> i32 {
    if bytes.len() != 4 {
        return 0;
    }
    let raw = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magnitude = (raw & 0x7FFF_FFFF) as i32;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Encode a value as a 4-byte GRIB2 signed integer.
pub fn encode_grib2_signed(value: i32) -> [u8; 4] {
    let magnitude = value.unsigned_abs() & 0x7FFF_FFFF;
    let raw = if value < 0 {
        magnitude | 0x8000_0000
    } else {
        magnitude
    };
    raw.to_be_bytes()
}

/// Convert an IBM single precision float (GRIB1 reference values).
///
/// Layout: sign bit, 7-bit base-16 exponent biased by 64, 24-bit fraction.
pub fn ibm_to_f64(bits: u32) -> f64 {
    let fraction = (bits & 0x00FF_FFFF) as f64;
    if fraction == 0.0 {
        return 0.0;
    }
    let exponent = ((bits >> 24) & 0x7F) as i32 - 64;
    let value = fraction / 16_777_216.0 * 16f64.powi(exponent);
    if bits & 0x8000_0000 != 0 {
        -value
    } else {
        value
    }
}

/// Encode `value` as an IBM float no greater than `value`.
///
/// Rounding toward negative infinity keeps a packing reference value at or
/// below the field minimum, so every packed integer stays non-negative.
pub fn f64_to_ibm_floor(value: f64) -> u32 {
    if value == 0.0 || !value.is_finite() {
        return 0;
    }
    let negative = value < 0.0;
    let mut magnitude = value.abs();
    let mut exponent: i32 = 0;
    while magnitude >= 1.0 {
        magnitude /= 16.0;
        exponent += 1;
    }
    while magnitude < 1.0 / 16.0 {
        magnitude *= 16.0;
        exponent -= 1;
    }

    let scaled = magnitude * 16_777_216.0;
    // Positive values truncate, negative values round away from zero
    let mut fraction = if negative {
        scaled.ceil() as u64
    } else {
        scaled.floor() as u64
    };
    if fraction >= 1 << 24 {
        fraction >>= 4;
        exponent += 1;
    }

    let biased = (exponent + 64).clamp(0, 127) as u32;
    let sign = if negative { 0x8000_0000 } else { 0 };
    sign | (biased << 24) | fraction as u32
}

/// Largest IEEE single precision float no greater than `value`.
pub fn f64_to_f32_floor(value: f64) -> f32 {
    let candidate = value as f32;
    if (candidate as f64) <= value {
        return candidate;
    }
    let bits = candidate.to_bits();
    if candidate > 0.0 {
        f32::from_bits(bits - 1)
    } else if candidate < 0.0 {
        f32::from_bits(bits + 1)
    } else {
        -f32::from_bits(1)
    }
}
