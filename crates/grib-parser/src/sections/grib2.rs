//! GRIB2 sections (WMO FM 92 GRIB Edition 2).
//!
//! After the 16-byte indicator, every section starts with a 4-byte length
//! and a 1-byte section number. Sections 2 to 7 may repeat, so one message
//! can carry several fields; each run that ends in a data section (7) is one
//! field.

use std::io::{Read, Seek};

use chrono::{DateTime, NaiveDate, Utc};
use nwp_common::{
    Edition, ForecastStep, GridDefinition, GridProjection, LevelType, ParameterCode,
    RecordMetadata, ScanMode, MICRODEGREES,
};

use super::{
    derive_latitude_increment, derive_longitude_increment, read_at, unsupported_grid, Indicator,
    RawSection, SectionEntry,
};
use crate::error::{DecodeError, Result};
use crate::tables::ParameterTable;
use crate::unpacking::{apply_bitmap, unpack_simple, SimplePacking};

/// Length of the GRIB2 indicator section.
pub const INDICATOR_LENGTH: u64 = 16;

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub table_version: u8,
    pub local_table_version: u8,
    pub significance_of_reference_time: u8,
    pub reference_time: DateTime<Utc>,
    pub production_status: u8,
    pub data_type: u8,
}

/// Section 4: Product Definition Section
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub level_type: u8,
    pub level_value: f64,
    /// End of the forecast or statistical processing period
    pub step: ForecastStep,
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone)]
pub struct DataRepresentation {
    /// Number of packed values (grid points not masked by the bitmap)
    pub num_data_points: usize,
    pub template: u16,
    /// Present for template 5.0
    pub packing: Option<SimplePacking>,
}

/// Sections that make up one field of a message, as indexes into the
/// section list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub identification: usize,
    pub grid: usize,
    pub product: usize,
    pub representation: usize,
    pub bitmap: Option<usize>,
    pub data: usize,
}

/// Walk the section headers of a message and record where each section is.
///
/// `message_length` must already be known to end on "7777".
pub fn locate_sections<R: Read + Seek>(
    reader: &mut R,
    message_offset: u64,
    message_length: u64,
) -> Result<Vec<SectionEntry>> {
    let body_end = message_length - 4;
    let mut entries = Vec::new();
    let mut position = INDICATOR_LENGTH;

    while position < body_end {
        if body_end - position < 5 {
            return Err(DecodeError::corrupt(format!(
                "{} stray bytes before end marker",
                body_end - position
            )));
        }
        let header = read_at(reader, message_offset + position, 5)?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let number = header[4];

        if !(1..=7).contains(&number) {
            return Err(DecodeError::corrupt(format!(
                "unexpected section number {} at offset {}",
                number, position
            )));
        }
        if length < 5 || position + length > body_end {
            return Err(DecodeError::invalid_section(
                number,
                format!("length {} overruns the message", length),
            ));
        }

        entries.push(SectionEntry {
            number,
            offset: position,
            length,
        });
        position += length;
    }

    Ok(entries)
}

/// Group sections into fields.
pub fn assemble_fields(sections: &[RawSection]) -> Result<Vec<FieldLayout>> {
    let mut identification = None;
    let mut grid = None;
    let mut product = None;
    let mut representation = None;
    let mut bitmap = None;
    let mut fields = Vec::new();

    let require = |index: Option<usize>, section: u8| {
        index.ok_or_else(|| DecodeError::invalid_section(7, format!("no section {} before data", section)))
    };

    for (i, section) in sections.iter().enumerate() {
        match section.number {
            1 => {
                if identification.is_some() {
                    return Err(DecodeError::invalid_section(1, "repeated"));
                }
                identification = Some(i);
            }
            2 => {}
            3 => grid = Some(i),
            4 => {
                product = Some(i);
                representation = None;
                bitmap = None;
            }
            5 => representation = Some(i),
            6 => bitmap = Some(i),
            7 => {
                fields.push(FieldLayout {
                    identification: require(identification, 1)?,
                    grid: require(grid, 3)?,
                    product: require(product, 4)?,
                    representation: require(representation, 5)?,
                    bitmap,
                    data: i,
                });
                product = None;
                representation = None;
                bitmap = None;
            }
            other => {
                return Err(DecodeError::corrupt(format!(
                    "unexpected section number {}",
                    other
                )))
            }
        }
    }

    if fields.is_empty() {
        return Err(DecodeError::corrupt("message has no data section"));
    }
    Ok(fields)
}

/// Parse Section 1 (Identification)
pub fn parse_identification(section: &RawSection) -> Result<Identification> {
    let o = section.octets();

    let year = o.u16(13)?;
    let month = o.u8(15)?;
    let day = o.u8(16)?;
    let hour = o.u8(17)?;
    let minute = o.u8(18)?;
    let second = o.u8(19)?;

    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| {
            DecodeError::invalid_section(
                1,
                format!(
                    "invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, minute, second
                ),
            )
        })?;

    Ok(Identification {
        center: o.u16(6)?,
        sub_center: o.u16(8)?,
        table_version: o.u8(10)?,
        local_table_version: o.u8(11)?,
        significance_of_reference_time: o.u8(12)?,
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
        production_status: o.u8(20)?,
        data_type: o.u8(21)?,
    })
}

/// Convert an angle in units of `basic / subdivisions` degrees to
/// microdegrees. A missing basic angle means the units are microdegrees.
fn angle_to_micro(value: i64, basic_angle: u32, subdivisions: u32) -> i64 {
    let missing = |v: u32| v == 0 || v == u32::MAX;
    if missing(basic_angle) || missing(subdivisions) {
        value
    } else {
        (value as f64 * basic_angle as f64 * MICRODEGREES / subdivisions as f64).round() as i64
    }
}

/// Parse Section 3 (Grid Definition)
///
/// Templates 3.0 (latitude/longitude) and 3.1 (rotated latitude/longitude)
/// are fully decoded. Any other template yields a grid flagged
/// [`GridProjection::Unsupported`] so the record can still be indexed.
pub fn parse_grid_definition(section: &RawSection) -> Result<GridDefinition> {
    let o = section.octets();

    // Octets 7-10: number of data points, 13-14: template number
    let num_points = o.u32(7)? as usize;
    let template = o.u16(13)?;
    if template != 0 && template != 1 {
        return Ok(unsupported_grid(template, num_points));
    }

    // Template 3.0
    // Octets 31-34: Ni, 35-38: Nj
    // Octets 39-42: basic angle, 43-46: subdivisions of basic angle
    // Octets 47-50: La1, 51-54: Lo1, 55: resolution and component flags
    // Octets 56-59: La2, 60-63: Lo2, 64-67: Di, 68-71: Dj, 72: scanning mode
    let ni = o.u32(31)? as usize;
    let nj = o.u32(35)? as usize;
    if ni == 0 || nj == 0 || ni.checked_mul(nj) != Some(num_points) {
        return Err(DecodeError::invalid_section(
            3,
            format!("{} x {} grid declares {} data points", ni, nj, num_points),
        ));
    }

    let basic_angle = o.u32(39)?;
    let subdivisions = o.u32(43)?;
    let angle = |v: i64| angle_to_micro(v, basic_angle, subdivisions);

    let first_lat = angle(o.i32(47)? as i64);
    let first_lon = angle(o.i32(51)? as i64);
    let flags = o.u8(55)?;
    let last_lat = angle(o.i32(56)? as i64);
    let last_lon = angle(o.i32(60)? as i64);
    let di_raw = o.u32(64)?;
    let dj_raw = o.u32(68)?;
    let scan_mode = ScanMode::from_grib_flag(o.u8(72)?);

    let di = if flags & 0x20 != 0 && di_raw != u32::MAX {
        angle(di_raw as i64)
    } else {
        derive_longitude_increment(first_lon, last_lon, ni, scan_mode)
    };
    let dj = if flags & 0x10 != 0 && dj_raw != u32::MAX {
        angle(dj_raw as i64)
    } else {
        derive_latitude_increment(first_lat, last_lat, nj)
    };

    let projection = if template == 1 {
        // Octets 73-76: latitude of the southern pole, 77-80: its longitude,
        // 81-84: angle of rotation (IEEE float, degrees)
        GridProjection::RotatedLatLon {
            south_pole_lat: angle(o.i32(73)? as i64),
            south_pole_lon: angle(o.i32(77)? as i64),
            rotation_angle: (o.f32(81)? as f64 * MICRODEGREES).round() as i64,
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

/// Seconds per unit of Code Table 4.4.
fn time_unit_seconds(unit: u8) -> Result<i64> {
    match unit {
        0 => Ok(60),
        1 => Ok(3_600),
        2 => Ok(86_400),
        10 => Ok(3 * 3_600),
        11 => Ok(6 * 3_600),
        12 => Ok(12 * 3_600),
        13 => Ok(1),
        other => Err(DecodeError::unsupported(format!(
            "time range unit {} (Code Table 4.4)",
            other
        ))),
    }
}

/// Parse Section 4 (Product Definition)
///
/// Templates 4.0 and 4.1 describe an instant; 4.8 and 4.11 describe a
/// statistically processed period whose end is taken as the step.
pub fn parse_product_definition(section: &RawSection) -> Result<ProductDefinition> {
    let o = section.octets();
    let template = o.u16(8)?;

    // Octet of the length of the (first) time range, for templates that have one
    let time_range_length_at = match template {
        0 | 1 => None,
        8 => Some(50),
        11 => Some(53),
        other => {
            return Err(DecodeError::unsupported(format!(
                "product definition template 4.{}",
                other
            )))
        }
    };

    // Octet 18: unit of time range, 19-22: forecast time
    let unit = time_unit_seconds(o.u8(18)?)?;
    let mut step_seconds = o.i32(19)? as i64 * unit;
    if let Some(at) = time_range_length_at {
        let range_unit = time_unit_seconds(o.u8(at - 1)?)?;
        step_seconds += o.u32(at)? as i64 * range_unit;
    }

    // Octet 23: type of first fixed surface, 24: scale factor, 25-28: scaled value
    let level_type = o.u8(23)?;
    let scale_raw = o.u8(24)?;
    let scaled_value = o.u32(25)?;
    let level_value = if level_type == 255 || scale_raw == 0xFF || scaled_value == u32::MAX {
        0.0
    } else {
        scaled_value as f64 / 10f64.powi(o.i8(24)? as i32)
    };

    Ok(ProductDefinition {
        template,
        parameter_category: o.u8(10)?,
        parameter_number: o.u8(11)?,
        level_type,
        level_value,
        step: ForecastStep::from_seconds(step_seconds),
    })
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(section: &RawSection) -> Result<DataRepresentation> {
    let o = section.octets();

    // Octets 6-9: number of packed values, 10-11: template number
    let num_data_points = o.u32(6)? as usize;
    let template = o.u16(10)?;

    // Template 5.0
    // Octets 12-15: R (IEEE), 16-17: E, 18-19: D, 20: bits per value
    let packing = if template == 0 {
        Some(SimplePacking {
            reference_value: o.f32(12)? as f64,
            binary_scale_factor: o.i16(16)?,
            decimal_scale_factor: o.i16(18)?,
            bits_per_value: o.u8(20)?,
        })
    } else {
        None
    };

    Ok(DataRepresentation {
        num_data_points,
        template,
        packing,
    })
}

/// Identifying metadata of one field.
pub fn field_metadata(
    indicator: &Indicator,
    sections: &[RawSection],
    layout: &FieldLayout,
    tables: &ParameterTable,
) -> Result<RecordMetadata> {
    let identification = parse_identification(&sections[layout.identification])?;
    let grid = parse_grid_definition(&sections[layout.grid])?;
    let product = parse_product_definition(&sections[layout.product])?;
    let representation = parse_data_representation(&sections[layout.representation])?;

    let code = ParameterCode::grib2(
        indicator.discipline,
        product.parameter_category,
        product.parameter_number,
    );
    let (parameter, description) = tables.lookup(code);

    Ok(RecordMetadata {
        edition: Edition::Grib2,
        parameter,
        description,
        level_type: LevelType::from_grib2(product.level_type),
        level: product.level_value,
        reference_time: identification.reference_time,
        step: product.step,
        num_points: grid.num_points(),
        grid,
        packing: representation.template,
    })
}

/// Unpack the values of one field in scan order, one per grid point.
pub fn field_values(
    sections: &[RawSection],
    layout: &FieldLayout,
    num_points: usize,
    missing_value: f64,
) -> Result<Vec<f64>> {
    let representation = parse_data_representation(&sections[layout.representation])?;
    let packing = representation.packing.ok_or_else(|| {
        DecodeError::unsupported(format!(
            "data representation template 5.{}",
            representation.template
        ))
    })?;

    let data_section = &sections[layout.data];
    if !data_section.is_complete() {
        return Err(DecodeError::invalid_section(7, "data not loaded"));
    }

    // Octet 6: bitmap indicator, 7 onwards: bitmap
    let bitmap = match layout.bitmap.map(|i| &sections[i]) {
        None => None,
        Some(section) => match section.octets().u8(6)? {
            255 => None,
            0 if section.is_complete() => Some(section.octets().tail(7)?),
            0 => return Err(DecodeError::invalid_section(6, "bitmap not loaded")),
            other => {
                return Err(DecodeError::unsupported(format!("bitmap indicator {}", other)))
            }
        },
    };

    let packed = data_section.octets().tail(6)?;
    match bitmap {
        None => {
            if representation.num_data_points != num_points {
                return Err(DecodeError::corrupt(format!(
                    "{} packed values for a grid of {} points",
                    representation.num_data_points, num_points
                )));
            }
            unpack_simple(packed, num_points, &packing)
        }
        Some(bitmap) => {
            let present = unpack_simple(packed, representation.num_data_points, &packing)?;
            apply_bitmap(&present, bitmap, num_points, missing_value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn section(number: u8, body: &[u8]) -> RawSection {
        let mut data = ((body.len() + 5) as u32).to_be_bytes().to_vec();
        data.push(number);
        data.extend_from_slice(body);
        RawSection {
            number,
            offset: 0,
            length: data.len() as u64,
            data: Bytes::from(data),
        }
    }

    fn product_body(template: u16, unit: u8, forecast: u32, level_type: u8, scale: u8, value: u32) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&0u16.to_be_bytes());
        b.extend_from_slice(&template.to_be_bytes());
        b.extend_from_slice(&[0, 0, 2, 0, 0, 0, 0, 0, unit]);
        b.extend_from_slice(&forecast.to_be_bytes());
        b.push(level_type);
        b.push(scale);
        b.extend_from_slice(&value.to_be_bytes());
        b.extend_from_slice(&[255, 0, 0, 0, 0, 0]);
        b
    }

    #[test]
    fn test_product_definition_level_and_step() {
        let s = section(4, &product_body(0, 1, 6, 103, 0, 2));
        let pd = parse_product_definition(&s).unwrap();
        assert_eq!(pd.level_type, 103);
        assert_eq!(pd.level_value, 2.0);
        assert_eq!(pd.step, ForecastStep::from_hours(6));
    }

    #[test]
    fn test_product_definition_scaled_level() {
        // 15 with scale factor 1 is 1.5
        let s = section(4, &product_body(0, 0, 90, 103, 1, 15));
        let pd = parse_product_definition(&s).unwrap();
        assert_eq!(pd.level_value, 1.5);
        assert_eq!(pd.step, ForecastStep::from_minutes(90));
    }

    #[test]
    fn test_statistical_template_step_is_end_of_period() {
        let mut body = product_body(8, 1, 0, 1, 0, 0);
        // Octets 35-41 end time, 42 ranges, 43-46 missing
        body.extend_from_slice(&[0x07, 0xE8, 2, 24, 3, 0, 0, 1, 0, 0, 0, 0]);
        // Octet 47 process, 48 increment type, 49 unit, 50-53 length
        body.extend_from_slice(&[1, 2, 1]);
        body.extend_from_slice(&3u32.to_be_bytes());
        body.extend_from_slice(&[255, 0, 0, 0, 0]);
        let pd = parse_product_definition(&section(4, &body)).unwrap();
        assert_eq!(pd.step, ForecastStep::from_hours(3));
    }

    #[test]
    fn test_unsupported_product_template() {
        let s = section(4, &product_body(40, 1, 0, 1, 0, 0));
        assert!(matches!(
            parse_product_definition(&s),
            Err(DecodeError::UnsupportedEncoding { .. })
        ));
    }

    #[test]
    fn test_unsupported_time_unit() {
        // Unit 3 is months
        let s = section(4, &product_body(0, 3, 1, 103, 0, 2));
        assert!(matches!(
            parse_product_definition(&s),
            Err(DecodeError::UnsupportedEncoding { .. })
        ));
    }

    #[test]
    fn test_angle_units() {
        assert_eq!(angle_to_micro(45_000_000, 0, u32::MAX), 45_000_000);
        // Millidegree units expressed through the basic angle
        assert_eq!(angle_to_micro(45_000, 1, 1_000), 45_000_000);
    }

    #[test]
    fn test_assemble_multi_field_message() {
        let sections = vec![
            section(1, &[0; 16]),
            section(3, &[0; 9]),
            section(4, &[0; 4]),
            section(5, &[0; 6]),
            section(6, &[255]),
            section(7, &[]),
            section(4, &[0; 4]),
            section(5, &[0; 6]),
            section(6, &[255]),
            section(7, &[]),
        ];
        let fields = assemble_fields(&sections).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].grid, 1);
        assert_eq!(fields[1].grid, 1);
        assert_eq!(fields[1].product, 6);
        assert_eq!(fields[1].data, 9);
    }

    #[test]
    fn test_assemble_requires_data_section() {
        let sections = vec![section(1, &[0; 16]), section(3, &[0; 9])];
        assert!(assemble_fields(&sections).is_err());

        let sections = vec![section(1, &[0; 16]), section(4, &[0; 4]), section(7, &[])];
        assert!(assemble_fields(&sections).is_err());
    }
}
