//! GRIB1 test message builder.
//!
//! Assembles complete GRIB1 messages (IS, PDS, GDS type 0 or 10, optional
//! BMS, BDS with simple packing and an IBM reference value).

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use grib_parser::sections::{f64_to_ibm_floor, ibm_to_f64};
use grib_parser::unpacking::{bitmap_from_values, pack_simple, SimplePacking};

use crate::generators::{create_temperature_field, TestGrid};
use crate::{sign_magnitude_16, sign_magnitude_24, u24};

/// Builder for one GRIB1 message.
#[derive(Debug, Clone)]
pub struct Grib1Builder {
    table_version: u8,
    indicator: u8,
    center: u8,
    level_type: u8,
    level_value: u16,
    reference_time: DateTime<Utc>,
    time_unit: u8,
    p1: u8,
    p2: u8,
    time_range: u8,
    grid: TestGrid,
    include_gds: bool,
    decimal_scale: i16,
    bits_per_value: u8,
    values: Vec<f64>,
}

impl Grib1Builder {
    /// HARMONIE-style temperature (table 253, parameter 11) at 2 m above
    /// ground on `grid`, analysis time 2024-02-24 16 UTC.
    pub fn new(grid: TestGrid) -> Self {
        let values = create_temperature_field(&grid, 270.0);
        Self {
            table_version: 253,
            indicator: 11,
            center: 96,
            level_type: 105,
            level_value: 2,
            reference_time: Utc.with_ymd_and_hms(2024, 2, 24, 16, 0, 0).unwrap(),
            time_unit: 1,
            p1: 0,
            p2: 0,
            time_range: 0,
            grid,
            include_gds: true,
            decimal_scale: 2,
            bits_per_value: 16,
            values,
        }
    }

    pub fn parameter(mut self, table_version: u8, indicator: u8) -> Self {
        self.table_version = table_version;
        self.indicator = indicator;
        self
    }

    pub fn level(mut self, level_type: u8, value: u16) -> Self {
        self.level_type = level_type;
        self.level_value = value;
        self
    }

    pub fn reference_time(mut self, time: DateTime<Utc>) -> Self {
        self.reference_time = time;
        self
    }

    /// Forecast step in hours; steps beyond 255 use time range indicator 10.
    pub fn forecast_hours(mut self, hours: u16) -> Self {
        self.time_unit = 1;
        if hours > 255 {
            self.time_range = 10;
            self.p1 = (hours >> 8) as u8;
            self.p2 = hours as u8;
        } else {
            self.time_range = 0;
            self.p1 = hours as u8;
            self.p2 = 0;
        }
        self
    }

    /// Accumulation from `start` to `end` hours (time range indicator 4).
    pub fn accumulated_hours(mut self, start: u8, end: u8) -> Self {
        self.time_unit = 1;
        self.time_range = 4;
        self.p1 = start;
        self.p2 = end;
        self
    }

    /// Raw time range indicator, for exercising unsupported ones.
    pub fn time_range(mut self, indicator: u8) -> Self {
        self.time_range = indicator;
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

    /// Leave out the GDS, as messages on predefined grids do.
    pub fn without_gds(mut self) -> Self {
        self.include_gds = false;
        self
    }

    /// Packing parameters the builder will use for the present values.
    pub fn simple_packing(&self) -> SimplePacking {
        let present: Vec<f64> = self.values.iter().copied().filter(|v| v.is_finite()).collect();
        SimplePacking::fit(&present, self.decimal_scale, self.bits_per_value, |m| {
            ibm_to_f64(f64_to_ibm_floor(m))
        })
    }

    pub fn build(&self) -> Vec<u8> {
        let has_bitmap = self.values.iter().any(|v| !v.is_finite());

        let mut body = Vec::new();
        body.extend(self.build_pds(has_bitmap));
        if self.include_gds {
            body.extend(self.build_gds());
        }
        if has_bitmap {
            body.extend(self.build_bms());
        }
        body.extend(self.build_bds());

        let total_length = 8 + body.len() + 4;
        let mut message = Vec::with_capacity(total_length);
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&u24(total_length));
        message.push(1);
        message.extend(body);
        message.extend_from_slice(b"7777");
        message
    }

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

    fn build_pds(&self, has_bitmap: bool) -> Vec<u8> {
        let t = self.reference_time;
        let year = t.year();
        let century = ((year - 1) / 100 + 1) as u8;
        let year_of_century = ((year - 1) % 100 + 1) as u8;

        let mut flags = 0u8;
        if self.include_gds {
            flags |= 0x80;
        }
        if has_bitmap {
            flags |= 0x40;
        }

        let mut section = Vec::with_capacity(28);
        section.extend_from_slice(&u24(28));
        section.push(self.table_version);
        section.push(self.center);
        section.push(1); // Generating process
        section.push(255); // Grid defined by the GDS
        section.push(flags);
        section.push(self.indicator);
        section.push(self.level_type);
        section.extend_from_slice(&self.level_value.to_be_bytes());
        section.push(year_of_century);
        section.push(t.month() as u8);
        section.push(t.day() as u8);
        section.push(t.hour() as u8);
        section.push(t.minute() as u8);
        section.push(self.time_unit);
        section.push(self.p1);
        section.push(self.p2);
        section.push(self.time_range);
        section.extend_from_slice(&[0, 0]); // Number in average
        section.push(0); // Number missing
        section.push(century);
        section.push(0); // Sub-centre
        section.extend_from_slice(&sign_magnitude_16(self.decimal_scale));
        section
    }

    fn build_gds(&self) -> Vec<u8> {
        let g = &self.grid;
        let milli = |deg: f64| (deg * 1_000.0).round() as i32;
        let rotated = g.south_pole.is_some();

        let mut section = Vec::with_capacity(42);
        section.extend_from_slice(&u24(if rotated { 42 } else { 32 }));
        section.push(0); // NV
        section.push(255); // PV/PL
        section.push(if rotated { 10 } else { 0 });
        section.extend_from_slice(&(g.ni as u16).to_be_bytes());
        section.extend_from_slice(&(g.nj as u16).to_be_bytes());
        section.extend_from_slice(&sign_magnitude_24(milli(g.first_lat)));
        section.extend_from_slice(&sign_magnitude_24(milli(g.first_lon)));
        section.push(0x80); // Increments given
        section.extend_from_slice(&sign_magnitude_24(milli(g.last_lat())));
        section.extend_from_slice(&sign_magnitude_24(milli(g.last_lon())));
        section.extend_from_slice(&(milli(g.di) as u16).to_be_bytes());
        section.extend_from_slice(&(milli(g.dj) as u16).to_be_bytes());
        section.push(g.scan_mode);
        section.extend_from_slice(&[0; 4]);

        if let Some((lat, lon, angle)) = g.south_pole {
            section.extend_from_slice(&sign_magnitude_24(milli(lat)));
            section.extend_from_slice(&sign_magnitude_24(milli(lon)));
            section.extend_from_slice(&f64_to_ibm_floor(angle).to_be_bytes());
        }
        section
    }

    fn build_bms(&self) -> Vec<u8> {
        let bitmap = bitmap_from_values(&self.scan_ordered_values());
        let unused = bitmap.len() * 8 - self.grid.num_points();

        let mut section = Vec::new();
        section.extend_from_slice(&u24(6 + bitmap.len()));
        section.push(unused as u8);
        section.extend_from_slice(&[0, 0]); // Bitmap follows
        section.extend(bitmap);
        section
    }

    fn build_bds(&self) -> Vec<u8> {
        let packing = self.simple_packing();
        let present: Vec<f64> = self
            .scan_ordered_values()
            .into_iter()
            .filter(|v| v.is_finite())
            .collect();
        let packed = pack_simple(&present, &packing);
        let unused = packed.len() * 8 - present.len() * packing.bits_per_value as usize;

        let mut section = Vec::new();
        section.extend_from_slice(&u24(11 + packed.len()));
        section.push(unused as u8 & 0x0F); // Grid point, simple packing, float
        section.extend_from_slice(&sign_magnitude_16(packing.binary_scale_factor));
        section.extend_from_slice(&f64_to_ibm_floor(packing.reference_value).to_be_bytes());
        section.push(packing.bits_per_value);
        section.extend(packed);
        section
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_message_layout() {
        let message = Grib1Builder::new(TestGrid::harmonie()).build();
        assert_eq!(&message[0..4], b"GRIB");
        assert_eq!(message[7], 1);
        let length = ((message[4] as usize) << 16) | ((message[5] as usize) << 8) | message[6] as usize;
        assert_eq!(length, message.len());
        assert_eq!(&message[message.len() - 4..], b"7777");
    }

    #[test]
    fn test_year_2000_uses_previous_century() {
        let builder = Grib1Builder::new(TestGrid::harmonie())
            .reference_time(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap());
        let pds = builder.build_pds(false);
        assert_eq!(pds[12], 100);
        assert_eq!(pds[24], 20);
    }
}
