//! GRIB2 test message builder.
//!
//! Assembles complete GRIB2 messages with template 3.0/3.1 grids, product
//! template 4.0 or 4.8 and simple packing (template 5.0), with a bitmap when
//! the values contain NaN.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use grib_parser::sections::{encode_grib2_signed, f64_to_f32_floor};
use grib_parser::unpacking::{bitmap_from_values, pack_simple, SimplePacking};

use crate::generators::{create_temperature_field, TestGrid};
use crate::sign_magnitude_16;

/// Builder for one GRIB2 field. Several builders sharing a grid can be
/// combined into one multi-field message with [`Grib2Builder::build_message`].
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    category: u8,
    number: u8,
    reference_time: DateTime<Utc>,
    grid: TestGrid,
    level_type: u8,
    level_scale: i8,
    level_value: u32,
    time_unit: u8,
    forecast_time: u32,
    /// Length of the statistical processing period (template 4.8)
    period: Option<u32>,
    decimal_scale: i16,
    bits_per_value: u8,
    values: Vec<f64>,
}

impl Grib2Builder {
    /// Temperature at 2 m on `grid`, analysis time 2024-02-24 16 UTC.
    pub fn new(grid: TestGrid) -> Self {
        let values = create_temperature_field(&grid, 270.0);
        Self {
            discipline: 0,
            category: 0,
            number: 0,
            reference_time: Utc.with_ymd_and_hms(2024, 2, 24, 16, 0, 0).unwrap(),
            grid,
            level_type: 103,
            level_scale: 0,
            level_value: 2,
            time_unit: 1,
            forecast_time: 0,
            period: None,
            decimal_scale: 2,
            bits_per_value: 16,
            values,
        }
    }

    pub fn parameter(mut self, discipline: u8, category: u8, number: u8) -> Self {
        self.discipline = discipline;
        self.category = category;
        self.number = number;
        self
    }

    pub fn reference_time(mut self, time: DateTime<Utc>) -> Self {
        self.reference_time = time;
        self
    }

    pub fn level(mut self, level_type: u8, value: u32) -> Self {
        self.level_type = level_type;
        self.level_scale = 0;
        self.level_value = value;
        self
    }

    /// Level given as `value / 10^scale`.
    pub fn scaled_level(mut self, level_type: u8, scale: i8, value: u32) -> Self {
        self.level_type = level_type;
        self.level_scale = scale;
        self.level_value = value;
        self
    }

    pub fn forecast_hours(mut self, hours: u32) -> Self {
        self.time_unit = 1;
        self.forecast_time = hours;
        self.period = None;
        self
    }

    pub fn forecast_minutes(mut self, minutes: u32) -> Self {
        self.time_unit = 0;
        self.forecast_time = minutes;
        self.period = None;
        self
    }

    /// Statistically processed field over `[start, start + length]` hours.
    pub fn accumulated_hours(mut self, start: u32, length: u32) -> Self {
        self.time_unit = 1;
        self.forecast_time = start;
        self.period = Some(length);
        self
    }

    /// Unit code from Code Table 4.4, for exercising unsupported units.
    pub fn time_unit(mut self, unit: u8) -> Self {
        self.time_unit = unit;
        self
    }

    pub fn packing(mut self, decimal_scale: i16, bits_per_value: u8) -> Self {
        self.decimal_scale = decimal_scale;
        self.bits_per_value = bits_per_value;
        self
    }

    /// Row-major values; NaN marks a missing point.
    pub fn values(mut self, values: Vec<f64>) -> Self {
        assert_eq!(values.len(), self.grid.num_points(), "value count must match grid");
        self.values = values;
        self
    }

    pub fn grid(&self) -> &TestGrid {
        &self.grid
    }

    /// Packing parameters the builder will use for the present values.
    pub fn simple_packing(&self) -> SimplePacking {
        let present: Vec<f64> = self.values.iter().copied().filter(|v| v.is_finite()).collect();
        SimplePacking::fit(&present, self.decimal_scale, self.bits_per_value, |m| {
            f64_to_f32_floor(m) as f64
        })
    }

    /// Build a single-field message.
    pub fn build(&self) -> Vec<u8> {
        Self::build_message(std::slice::from_ref(self))
    }

    /// Build one message holding every field. Sections 1 and 3 come from the
    /// first builder.
    pub fn build_message(fields: &[Grib2Builder]) -> Vec<u8> {
        let first = &fields[0];
        let mut body = Vec::new();
        body.extend(first.build_section1());
        body.extend(first.build_section3());
        for field in fields {
            body.extend(field.build_section4());
            body.extend(field.build_section5());
            body.extend(field.build_section6());
            body.extend(field.build_section7());
        }

        let total_length = (16 + body.len() + 4) as u64;
        let mut message = Vec::with_capacity(total_length as usize);
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]);
        message.push(first.discipline);
        message.push(2);
        message.extend_from_slice(&total_length.to_be_bytes());
        message.extend(body);
        message.extend_from_slice(b"7777");
        message
    }

    /// Values in the order the grid's scanning mode stores them.
    fn scan_ordered_values(&self) -> Vec<f64> {
        if self.grid.scan_mode & 0x20 == 0 {
            return self.values.clone();
        }
        let (ni, nj) = (self.grid.ni, self.grid.nj);
        let mut ordered = Vec::with_capacity(self.values.len());
        for i in 0..ni {
            for j in 0..nj {
                ordered.push(self.values[j * ni + i]);
            }
        }
        ordered
    }

    fn has_missing(&self) -> bool {
        self.values.iter().any(|v| !v.is_finite())
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(1);
        section.extend_from_slice(&96u16.to_be_bytes()); // Originating centre
        section.extend_from_slice(&0u16.to_be_bytes()); // Sub-centre
        section.push(2); // Master tables version
        section.push(0); // Local tables version
        section.push(1); // Significance of reference time (start of forecast)

        let t = self.reference_time;
        section.extend_from_slice(&(t.year() as u16).to_be_bytes());
        section.push(t.month() as u8);
        section.push(t.day() as u8);
        section.push(t.hour() as u8);
        section.push(t.minute() as u8);
        section.push(t.second() as u8);

        section.push(0); // Production status (operational)
        section.push(1); // Type of data (forecast)
        section
    }

    fn build_section3(&self) -> Vec<u8> {
        let g = &self.grid;
        let micro = |deg: f64| (deg * 1_000_000.0).round() as i32;
        let template: u16 = if g.south_pole.is_some() { 1 } else { 0 };
        let length: u32 = if template == 1 { 84 } else { 72 };

        let mut section = Vec::new();
        section.extend_from_slice(&length.to_be_bytes());
        section.push(3);
        section.push(0); // Source of grid definition
        section.extend_from_slice(&(g.num_points() as u32).to_be_bytes());
        section.push(0); // Number of octets for optional list
        section.push(0); // Interpretation of optional list
        section.extend_from_slice(&template.to_be_bytes());

        section.push(6); // Shape of the Earth (sphere, 6371229 m)
        section.extend_from_slice(&[0; 15]); // Radius and axes
        section.extend_from_slice(&(g.ni as u32).to_be_bytes());
        section.extend_from_slice(&(g.nj as u32).to_be_bytes());
        section.extend_from_slice(&0u32.to_be_bytes()); // Basic angle
        section.extend_from_slice(&u32::MAX.to_be_bytes()); // Subdivisions
        section.extend_from_slice(&encode_grib2_signed(micro(g.first_lat)));
        section.extend_from_slice(&encode_grib2_signed(micro(g.first_lon)));
        section.push(0x30); // Both increments given
        section.extend_from_slice(&encode_grib2_signed(micro(g.last_lat())));
        section.extend_from_slice(&encode_grib2_signed(micro(g.last_lon())));
        section.extend_from_slice(&(micro(g.di) as u32).to_be_bytes());
        section.extend_from_slice(&(micro(g.dj) as u32).to_be_bytes());
        section.push(g.scan_mode);

        if let Some((lat, lon, angle)) = g.south_pole {
            section.extend_from_slice(&encode_grib2_signed(micro(lat)));
            section.extend_from_slice(&encode_grib2_signed(micro(lon)));
            section.extend_from_slice(&(angle as f32).to_be_bytes());
        }
        section
    }

    fn build_section4(&self) -> Vec<u8> {
        let template: u16 = if self.period.is_some() { 8 } else { 0 };
        let length: u32 = if template == 8 { 58 } else { 34 };

        let mut section = Vec::new();
        section.extend_from_slice(&length.to_be_bytes());
        section.push(4);
        section.extend_from_slice(&0u16.to_be_bytes()); // Number of coordinate values
        section.extend_from_slice(&template.to_be_bytes());

        section.push(self.category);
        section.push(self.number);
        section.push(2); // Type of generating process (forecast)
        section.push(0); // Background generating process
        section.push(0); // Analysis or forecast process
        section.extend_from_slice(&0u16.to_be_bytes()); // Hours of cutoff
        section.push(0); // Minutes of cutoff
        section.push(self.time_unit);
        section.extend_from_slice(&self.forecast_time.to_be_bytes());

        section.push(self.level_type);
        let scale = self.level_scale.unsigned_abs() | if self.level_scale < 0 { 0x80 } else { 0 };
        section.push(scale);
        section.extend_from_slice(&self.level_value.to_be_bytes());
        section.push(255); // No second fixed surface
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());

        if let Some(period) = self.period {
            let end = self.reference_time
                + Duration::hours((self.forecast_time + period) as i64);
            section.extend_from_slice(&(end.year() as u16).to_be_bytes());
            section.push(end.month() as u8);
            section.push(end.day() as u8);
            section.push(end.hour() as u8);
            section.push(end.minute() as u8);
            section.push(end.second() as u8);
            section.push(1); // One time range
            section.extend_from_slice(&0u32.to_be_bytes()); // Missing values
            section.push(1); // Accumulation
            section.push(2); // Successive forecast times
            section.push(self.time_unit);
            section.extend_from_slice(&period.to_be_bytes());
            section.push(self.time_unit);
            section.extend_from_slice(&0u32.to_be_bytes());
        }
        section
    }

    fn build_section5(&self) -> Vec<u8> {
        let packing = self.simple_packing();
        let present = self.values.iter().filter(|v| v.is_finite()).count() as u32;

        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(5);
        section.extend_from_slice(&present.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 5.0
        section.extend_from_slice(&(packing.reference_value as f32).to_be_bytes());
        section.extend_from_slice(&sign_magnitude_16(packing.binary_scale_factor));
        section.extend_from_slice(&sign_magnitude_16(packing.decimal_scale_factor));
        section.push(packing.bits_per_value);
        section.push(0); // Original values were floating point
        section
    }

    fn build_section6(&self) -> Vec<u8> {
        let bitmap = if self.has_missing() {
            bitmap_from_values(&self.scan_ordered_values())
        } else {
            Vec::new()
        };

        let mut section = Vec::new();
        section.extend_from_slice(&((6 + bitmap.len()) as u32).to_be_bytes());
        section.push(6);
        section.push(if bitmap.is_empty() { 255 } else { 0 });
        section.extend(bitmap);
        section
    }

    fn build_section7(&self) -> Vec<u8> {
        let present: Vec<f64> = self
            .scan_ordered_values()
            .into_iter()
            .filter(|v| v.is_finite())
            .collect();
        let packed = pack_simple(&present, &self.simple_packing());

        let mut section = Vec::new();
        section.extend_from_slice(&((5 + packed.len()) as u32).to_be_bytes());
        section.push(7);
        section.extend(packed);
        section
    }
}
