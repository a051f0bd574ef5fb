//! GRIB1 sections (WMO FM 92 GRIB Edition 1).
//!
//! A GRIB1 message is the 8-byte indicator section, a product definition
//! section (PDS), an optional grid description section (GDS), an optional
//! bit map section (BMS), a binary data section (BDS) and "7777". Section
//! lengths are 3-byte integers; the PDS flag octet says whether the GDS and
//! BMS are present. Each message holds exactly one field.

use std::io::{Read, Seek};

use chrono::{DateTime, NaiveDate, Utc};
use nwp_common::{
    Edition, ForecastStep, GridDefinition, GridProjection, LevelType, ParameterCode,
    RecordMetadata, ScanMode, MICRODEGREES,
};

use super::{
    derive_latitude_increment, derive_longitude_increment, read_at, read_u24, unsupported_grid,
    RawSection, SectionEntry,
};
use crate::error::{DecodeError, Result};
use crate::tables::ParameterTable;
use crate::unpacking::{apply_bitmap, count_present, unpack_simple, SimplePacking};

/// Length of the GRIB1 indicator section.
pub const INDICATOR_LENGTH: u64 = 8;

/// Section numbers used for GRIB1 sections in [`SectionEntry`].
pub mod section {
    pub const PDS: u8 = 1;
    pub const GDS: u8 = 2;
    pub const BMS: u8 = 3;
    pub const BDS: u8 = 4;
}

/// Bytes of the BDS that hold its packing parameters.
pub const BDS_HEADER_LENGTH: u64 = 11;

/// Level types whose octets 11 and 12 hold the top and bottom of a layer
/// rather than one 16-bit value (Table 3).
const LAYER_LEVEL_TYPES: &[u8] = &[101, 104, 106, 108, 110, 112, 114, 116, 120, 121, 128, 141];

/// Product Definition Section
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub table_version: u8,
    pub center: u8,
    pub generating_process: u8,
    pub grid_id: u8,
    pub has_gds: bool,
    pub has_bms: bool,
    pub indicator_of_parameter: u8,
    pub level_type: u8,
    pub level_value: f64,
    pub reference_time: DateTime<Utc>,
    pub step: ForecastStep,
    pub decimal_scale_factor: i16,
}

/// Packing parameters from the head of the Binary Data Section.
#[derive(Debug, Clone, Copy)]
pub struct DataHeader {
    pub flags: u8,
    pub packing: SimplePacking,
}

impl DataHeader {
    /// Unused bits at the end of the data.
    pub fn unused_bits(&self) -> usize {
        (self.flags & 0x0F) as usize
    }
}

/// Position of each section in a GRIB1 section list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grib1Layout {
    pub pds: usize,
    pub gds: Option<usize>,
    pub bms: Option<usize>,
    pub bds: usize,
}

impl Grib1Layout {
    pub fn from_sections(sections: &[RawSection]) -> Result<Self> {
        let find = |number: u8| sections.iter().position(|s| s.number == number);
        Ok(Self {
            pds: find(section::PDS).ok_or_else(|| DecodeError::corrupt("missing PDS"))?,
            gds: find(section::GDS),
            bms: find(section::BMS),
            bds: find(section::BDS).ok_or_else(|| DecodeError::corrupt("missing BDS"))?,
        })
    }
}

/// Walk the sections of a message and record where each one is.
///
/// `message_length` must already be known to end on "7777".
pub fn locate_sections<R: Read + Seek>(
    reader: &mut R,
    message_offset: u64,
    message_length: u64,
) -> Result<Vec<SectionEntry>> {
    let body_end = message_length - 4;
    let mut entries = Vec::with_capacity(4);
    let mut position = INDICATOR_LENGTH;

    // PDS octet 8 carries the presence flags of the optional sections
    let pds_head = read_at(reader, message_offset + position, 8)?;
    let pds_length = read_u24(&pds_head[0..3]) as u64;
    let flags = pds_head[7];

    let mut push = |number: u8, length: u64, minimum: u64, position: &mut u64| -> Result<()> {
        if length < minimum || *position + length > body_end {
            return Err(DecodeError::invalid_section(
                number,
                format!("length {} overruns the message", length),
            ));
        }
        entries.push(SectionEntry {
            number,
            offset: *position,
            length,
        });
        *position += length;
        Ok(())
    };

    push(section::PDS, pds_length, 28, &mut position)?;
    if flags & 0x80 != 0 {
        let length = read_u24(&read_at(reader, message_offset + position, 3)?) as u64;
        push(section::GDS, length, 32, &mut position)?;
    }
    if flags & 0x40 != 0 {
        let length = read_u24(&read_at(reader, message_offset + position, 3)?) as u64;
        push(section::BMS, length, 6, &mut position)?;
    }
    let length = read_u24(&read_at(reader, message_offset + position, 3)?) as u64;
    push(section::BDS, length, BDS_HEADER_LENGTH, &mut position)?;

    Ok(entries)
}

/// Seconds per unit of Table 4.
fn time_unit_seconds(unit: u8) -> Result<i64> {
    match unit {
        0 => Ok(60),
        1 => Ok(3_600),
        2 => Ok(86_400),
        10 => Ok(3 * 3_600),
        11 => Ok(6 * 3_600),
        12 => Ok(12 * 3_600),
        13 => Ok(15 * 60),
        14 => Ok(30 * 60),
        254 => Ok(1),
        other => Err(DecodeError::unsupported(format!(
            "time range unit {} (GRIB1 Table 4)",
            other
        ))),
    }
}

/// Parse the Product Definition Section.
pub fn parse_product_definition(pds: &RawSection) -> Result<ProductDefinition> {
    let o = pds.octets();

    let flags = o.u8(8)?;
    let level_type = o.u8(10)?;
    let level_value = if LAYER_LEVEL_TYPES.contains(&level_type) {
        o.u8(11)? as f64
    } else {
        o.u16(11)? as f64
    };

    // Octets 13-17: year of century, month, day, hour, minute; 25: century
    let year_of_century = o.u8(13)? as i32;
    let century = o.u8(25)? as i32;
    let year = (century - 1) * 100 + year_of_century;
    let (month, day, hour, minute) = (o.u8(14)?, o.u8(15)?, o.u8(16)?, o.u8(17)?);
    let reference_time = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, 0))
        .ok_or_else(|| {
            DecodeError::invalid_section(
                section::PDS,
                format!(
                    "invalid date: {}-{:02}-{:02} {:02}:{:02}",
                    year, month, day, hour, minute
                ),
            )
        })?;

    // Octet 18: time unit, 19: P1, 20: P2, 21: time range indicator
    let unit = time_unit_seconds(o.u8(18)?)?;
    let p1 = o.u8(19)? as i64;
    let p2 = o.u8(20)? as i64;
    let periods = match o.u8(21)? {
        0 => p1,
        1 => 0,
        // Averages, accumulations and differences end at P2
        2..=4 => p2,
        // P1 occupies octets 19-20
        10 => o.u16(19)? as i64,
        other => {
            return Err(DecodeError::unsupported(format!(
                "time range indicator {}",
                other
            )))
        }
    };

    Ok(ProductDefinition {
        table_version: o.u8(4)?,
        center: o.u8(5)?,
        generating_process: o.u8(6)?,
        grid_id: o.u8(7)?,
        has_gds: flags & 0x80 != 0,
        has_bms: flags & 0x40 != 0,
        indicator_of_parameter: o.u8(9)?,
        level_type,
        level_value,
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
        step: ForecastStep::from_seconds(periods * unit),
        decimal_scale_factor: o.i16(27)?,
    })
}

/// Parse the Grid Description Section.
///
/// Data representation types 0 (latitude/longitude) and 10 (rotated
/// latitude/longitude) are decoded; other types yield a grid flagged
/// [`GridProjection::Unsupported`].
pub fn parse_grid_definition(gds: &RawSection) -> Result<GridDefinition> {
    let o = gds.octets();

    // Octet 6: data representation type, 7-8: Ni, 9-10: Nj
    let data_type = o.u8(6)?;
    let ni = o.u16(7)?;
    let nj = o.u16(9)?;
    if data_type != 0 && data_type != 10 {
        return Ok(unsupported_grid(data_type as u16, ni as usize * nj as usize));
    }
    if ni == 0xFFFF || nj == 0xFFFF {
        return Err(DecodeError::unsupported("quasi-regular grid"));
    }
    let (ni, nj) = (ni as usize, nj as usize);
    if ni == 0 || nj == 0 {
        return Err(DecodeError::invalid_section(section::GDS, "empty grid"));
    }

    // Millidegrees
    // Octets 11-13: La1, 14-16: Lo1, 17: resolution flags, 18-20: La2,
    // 21-23: Lo2, 24-25: Di, 26-27: Dj, 28: scanning mode
    let milli = |v: i32| v as i64 * 1_000;
    let first_lat = milli(o.i24(11)?);
    let first_lon = milli(o.i24(14)?);
    let flags = o.u8(17)?;
    let last_lat = milli(o.i24(18)?);
    let last_lon = milli(o.i24(21)?);
    let di_raw = o.u16(24)?;
    let dj_raw = o.u16(26)?;
    let scan_mode = ScanMode::from_grib_flag(o.u8(28)?);

    let increments_given = flags & 0x80 != 0;
    let di = if increments_given && di_raw != 0xFFFF {
        milli(di_raw as i32)
    } else {
        derive_longitude_increment(first_lon, last_lon, ni, scan_mode)
    };
    let dj = if increments_given && dj_raw != 0xFFFF {
        milli(dj_raw as i32)
    } else {
        derive_latitude_increment(first_lat, last_lat, nj)
    };

    let projection = if data_type == 10 {
        // Octets 33-35: latitude of the southern pole, 36-38: its longitude,
        // 39-42: angle of rotation (IBM float, degrees)
        GridProjection::RotatedLatLon {
            south_pole_lat: milli(o.i24(33)?),
            south_pole_lon: milli(o.i24(36)?),
            rotation_angle: (o.ibm_f32(39)? * MICRODEGREES).round() as i64,
        }
    } else {
        GridProjection::LatLon
    };

    Ok(GridDefinition {
        ni,
        nj,
        first_lat,
        first_lon,
        last_lat,
        last_lon,
        di,
        dj,
        scan_mode,
        projection,
    })
}

/// Parse the packing parameters at the head of the Binary Data Section.
pub fn parse_data_header(bds: &RawSection, decimal_scale_factor: i16) -> Result<DataHeader> {
    let o = bds.octets();

    // Octet 4: flags, 5-6: E, 7-10: R (IBM float), 11: bits per value
    let flags = o.u8(4)?;
    Ok(DataHeader {
        flags,
        packing: SimplePacking {
            reference_value: o.ibm_f32(7)?,
            binary_scale_factor: o.i16(5)?,
            decimal_scale_factor,
            bits_per_value: o.u8(11)?,
        },
    })
}

fn check_packing_flags(flags: u8) -> Result<()> {
    if flags & 0x80 != 0 {
        return Err(DecodeError::unsupported("spherical harmonic coefficients"));
    }
    if flags & 0x40 != 0 || flags & 0x10 != 0 {
        return Err(DecodeError::unsupported("GRIB1 complex packing"));
    }
    Ok(())
}

/// Identifying metadata of the message's field.
pub fn record_metadata(
    sections: &[RawSection],
    layout: &Grib1Layout,
    tables: &ParameterTable,
) -> Result<RecordMetadata> {
    let product = parse_product_definition(&sections[layout.pds])?;
    let gds = layout.gds.ok_or_else(|| {
        DecodeError::unsupported(format!("predefined grid {} without GDS", product.grid_id))
    })?;
    let grid = parse_grid_definition(&sections[gds])?;
    let header = parse_data_header(&sections[layout.bds], product.decimal_scale_factor)?;

    let code = ParameterCode::grib1(product.table_version, product.indicator_of_parameter);
    let (parameter, description) = tables.lookup(code);

    Ok(RecordMetadata {
        edition: Edition::Grib1,
        parameter,
        description,
        level_type: LevelType::from_grib1(product.level_type),
        level: product.level_value,
        reference_time: product.reference_time,
        step: product.step,
        num_points: grid.num_points(),
        grid,
        packing: (header.flags >> 4) as u16,
    })
}

/// Unpack the field in scan order, one value per grid point.
pub fn field_values(
    sections: &[RawSection],
    layout: &Grib1Layout,
    num_points: usize,
    missing_value: f64,
) -> Result<Vec<f64>> {
    let product = parse_product_definition(&sections[layout.pds])?;
    let bds = &sections[layout.bds];
    if !bds.is_complete() {
        return Err(DecodeError::invalid_section(section::BDS, "data not loaded"));
    }
    let header = parse_data_header(bds, product.decimal_scale_factor)?;
    check_packing_flags(header.flags)?;

    // BMS octets 5-6: predefined bitmap number, 7 onwards: bitmap
    let bitmap = match layout.bms.map(|i| &sections[i]) {
        None => None,
        Some(bms) => {
            let o = bms.octets();
            let predefined = o.u16(5)?;
            if predefined != 0 {
                return Err(DecodeError::unsupported(format!(
                    "predefined bitmap {}",
                    predefined
                )));
            }
            let bitmap = o.tail(7)?;
            if bitmap.len() * 8 < num_points {
                return Err(DecodeError::invalid_section(
                    section::BMS,
                    format!("bitmap covers {} of {} points", bitmap.len() * 8, num_points),
                ));
            }
            Some(bitmap)
        }
    };

    let count = match bitmap {
        Some(bitmap) => count_present(bitmap, num_points),
        None => num_points,
    };

    let packed = bds.octets().tail(12)?;
    let available = (packed.len() * 8).saturating_sub(header.unused_bits());
    let needed = count * header.packing.bits_per_value as usize;
    if needed > available {
        return Err(DecodeError::corrupt(format!(
            "BDS holds {} bits, {} values need {}",
            available, count, needed
        )));
    }

    let present = unpack_simple(packed, count, &header.packing)?;
    match bitmap {
        Some(bitmap) => apply_bitmap(&present, bitmap, num_points, missing_value),
        None => Ok(present),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn raw(number: u8, data: Vec<u8>) -> RawSection {
        RawSection {
            number,
            offset: 0,
            length: data.len() as u64,
            data: Bytes::from(data),
        }
    }

    fn pds(level_type: u8, level: u16, unit: u8, p1: u8, p2: u8, indicator: u8) -> RawSection {
        let mut b = vec![0, 0, 28, 253, 96, 1, 255, 0x80, 11, level_type];
        b.extend_from_slice(&level.to_be_bytes());
        // 24-02-24 16:00, century 21
        b.extend_from_slice(&[24, 2, 24, 16, 0, unit, p1, p2, indicator, 0, 0, 0, 21, 0]);
        b.extend_from_slice(&[0x80, 0x01]);
        raw(section::PDS, b)
    }

    #[test]
    fn test_product_definition() {
        let pd = parse_product_definition(&pds(105, 50, 1, 3, 0, 0)).unwrap();
        assert_eq!(pd.table_version, 253);
        assert_eq!(pd.indicator_of_parameter, 11);
        assert_eq!(pd.level_type, 105);
        assert_eq!(pd.level_value, 50.0);
        assert_eq!(pd.step, ForecastStep::from_hours(3));
        assert_eq!(pd.decimal_scale_factor, -1);
        assert!(pd.has_gds);
        assert!(!pd.has_bms);
        assert_eq!(pd.reference_time.to_rfc3339(), "2024-02-24T16:00:00+00:00");
    }

    #[test]
    fn test_time_range_indicators() {
        // Accumulation from P1 to P2 ends at P2
        let pd = parse_product_definition(&pds(1, 0, 1, 0, 6, 4)).unwrap();
        assert_eq!(pd.step, ForecastStep::from_hours(6));

        // Indicator 10 spreads P1 over two octets
        let pd = parse_product_definition(&pds(1, 0, 1, 1, 44, 10)).unwrap();
        assert_eq!(pd.step, ForecastStep::from_hours(300));

        // 15-minute units
        let pd = parse_product_definition(&pds(1, 0, 13, 3, 0, 0)).unwrap();
        assert_eq!(pd.step, ForecastStep::from_minutes(45));

        assert!(matches!(
            parse_product_definition(&pds(1, 0, 1, 0, 0, 113)),
            Err(DecodeError::UnsupportedEncoding { .. })
        ));
    }

    #[test]
    fn test_layer_level_uses_top_octet() {
        let pd = parse_product_definition(&pds(112, 0x0A_00, 1, 0, 0, 0)).unwrap();
        assert_eq!(pd.level_value, 10.0);
    }

    #[test]
    fn test_unsupported_grid_type() {
        let mut b = vec![0, 0, 32, 0, 255, 3];
        b.extend_from_slice(&10u16.to_be_bytes());
        b.extend_from_slice(&20u16.to_be_bytes());
        b.resize(32, 0);
        let grid = parse_grid_definition(&raw(section::GDS, b)).unwrap();
        assert_eq!(grid.projection, GridProjection::Unsupported { template: 3 });
        assert_eq!(grid.num_points(), 200);
    }

    #[test]
    fn test_complex_packing_is_unsupported() {
        assert!(check_packing_flags(0x00).is_ok());
        assert!(check_packing_flags(0x08).is_ok());
        assert!(check_packing_flags(0x40).is_err());
        assert!(check_packing_flags(0x80).is_err());
    }
}
