//! Simple packing.
//!
//! A simple-packed value is stored as an unsigned integer X of a fixed bit
//! width. The original value is recovered as
//!
//! ```text
//! Y = (R + X * 2^E) / 10^D
//! ```
//!
//! with reference value R, binary scale factor E and decimal scale factor D.
//! Both editions share the formula; only the representation of R differs
//! (IEEE in GRIB2, IBM in GRIB1). Everything here works in f64 so decoding
//! adds no error beyond the packing itself.

use crate::error::{DecodeError, Result};

/// Parameters of a simple-packed field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplePacking {
    pub reference_value: f64,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
}

impl SimplePacking {
    /// Decoded value of one packed integer.
    pub fn unpack_value(&self, packed: u32) -> f64 {
        let (binary, decimal) = self.factors();
        (self.reference_value + packed as f64 * binary) / decimal
    }

    /// Packed integer closest to `value`, clamped to the bit width.
    pub fn pack_value(&self, value: f64) -> u32 {
        let (binary, decimal) = self.factors();
        let packed = ((value * decimal - self.reference_value) / binary).round();
        packed.clamp(0.0, self.max_packed() as f64) as u32
    }

    /// Distance between two adjacent representable values.
    pub fn precision(&self) -> f64 {
        let (binary, decimal) = self.factors();
        binary / decimal
    }

    fn max_packed(&self) -> u32 {
        match self.bits_per_value {
            0 => 0,
            32.. => u32::MAX,
            n => (1u32 << n) - 1,
        }
    }

    fn factors(&self) -> (f64, f64) {
        (
            2f64.powi(self.binary_scale_factor as i32),
            10f64.powi(self.decimal_scale_factor as i32),
        )
    }

    /// Choose packing parameters for `values` at the given decimal scale and
    /// bit width.
    ///
    /// `representable` maps the exact scaled minimum to the reference value
    /// the target edition can store; it must not round up.
    pub fn fit(
        values: &[f64],
        decimal_scale_factor: i16,
        bits_per_value: u8,
        representable: impl Fn(f64) -> f64,
    ) -> Self {
        let decimal = 10f64.powi(decimal_scale_factor as i32);
        let (min, max) = values
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        if !min.is_finite() {
            return Self {
                reference_value: 0.0,
                binary_scale_factor: 0,
                decimal_scale_factor,
                bits_per_value: 0,
            };
        }

        let reference_value = representable(min * decimal);
        let range = max * decimal - reference_value;
        if range <= 0.0 || bits_per_value == 0 {
            return Self {
                reference_value,
                binary_scale_factor: 0,
                decimal_scale_factor,
                bits_per_value: 0,
            };
        }

        let max_packed = if bits_per_value >= 32 {
            u32::MAX as f64
        } else {
            ((1u64 << bits_per_value) - 1) as f64
        };
        let mut binary_scale_factor = (range / max_packed).log2().ceil() as i16;
        // log2 rounding can land one step short
        while range / 2f64.powi(binary_scale_factor as i32) > max_packed {
            binary_scale_factor += 1;
        }

        Self {
            reference_value,
            binary_scale_factor,
            decimal_scale_factor,
            bits_per_value,
        }
    }
}

/// Sequential reader of fixed-width big-endian bit fields.
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_position: 0,
        }
    }

    /// Read the next `num_bits` (1 to 32) as an unsigned integer.
    pub fn read(&mut self, num_bits: usize) -> Option<u32> {
        let value = extract_bits(self.data, self.bit_position, num_bits).ok()?;
        self.bit_position += num_bits;
        Some(value)
    }
}

/// Extract bits from a byte array, most significant bit first.
/// Returns the bits as a 32-bit unsigned integer.
pub fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> std::result::Result<u32, String> {
    if num_bits > 32 || num_bits == 0 {
        return Err(format!("Invalid number of bits: {}", num_bits));
    }
    let end_bit = start_bit + num_bits;
    if end_bit > data.len() * 8 {
        return Err("Not enough data to extract bits".to_string());
    }

    let first_byte = start_bit / 8;
    let last_byte = (end_bit - 1) / 8;
    let mut acc: u64 = 0;
    for byte in &data[first_byte..=last_byte] {
        acc = (acc << 8) | *byte as u64;
    }
    let spare = (last_byte + 1) * 8 - end_bit;
    let mask = if num_bits == 32 {
        u32::MAX as u64
    } else {
        (1u64 << num_bits) - 1
    };
    Ok(((acc >> spare) & mask) as u32)
}

/// Unpack `count` simple-packed values.
pub fn unpack_simple(packed_data: &[u8], count: usize, packing: &SimplePacking) -> Result<Vec<f64>> {
    let bits = packing.bits_per_value as usize;
    if bits > 32 {
        return Err(DecodeError::unsupported(format!(
            "{} bits per value",
            packing.bits_per_value
        )));
    }
    if bits == 0 {
        // Constant field
        return Ok(vec![packing.unpack_value(0); count]);
    }

    let needed = count
        .checked_mul(bits)
        .ok_or_else(|| DecodeError::corrupt("packed value count overflows"))?;
    if needed > packed_data.len() * 8 {
        return Err(DecodeError::corrupt(format!(
            "data section holds {} bits, {} values of {} bits need {}",
            packed_data.len() * 8,
            count,
            bits,
            needed
        )));
    }

    let (binary, decimal) = packing.factors();
    let mut reader = BitReader::new(packed_data);
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let packed = reader
            .read(bits)
            .ok_or_else(|| DecodeError::corrupt("data section ended early"))?;
        values.push((packing.reference_value + packed as f64 * binary) / decimal);
    }
    Ok(values)
}

/// Pack values with `packing`. The output is padded to a whole byte.
pub fn pack_simple(values: &[f64], packing: &SimplePacking) -> Vec<u8> {
    let bits = packing.bits_per_value as usize;
    if bits == 0 {
        return Vec::new();
    }

    let total_bits = values.len() * bits;
    let mut out = vec![0u8; total_bits.div_ceil(8)];
    let mut bit_position = 0usize;
    for value in values {
        let packed = packing.pack_value(*value) as u64;
        for k in (0..bits).rev() {
            if (packed >> k) & 1 == 1 {
                out[bit_position / 8] |= 0x80 >> (bit_position % 8);
            }
            bit_position += 1;
        }
    }
    out
}

/// Number of set bits among the first `num_points` of a bitmap.
pub fn count_present(bitmap: &[u8], num_points: usize) -> usize {
    (0..num_points)
        .filter(|i| bitmap_bit(bitmap, *i))
        .count()
}

fn bitmap_bit(bitmap: &[u8], index: usize) -> bool {
    (bitmap[index / 8] >> (7 - index % 8)) & 1 == 1
}

/// Spread `present` values over a grid of `num_points` following `bitmap`
/// (1 = value present). Absent points get `missing_value`.
pub fn apply_bitmap(
    present: &[f64],
    bitmap: &[u8],
    num_points: usize,
    missing_value: f64,
) -> Result<Vec<f64>> {
    if bitmap.len() * 8 < num_points {
        return Err(DecodeError::corrupt(format!(
            "bitmap covers {} points, grid has {}",
            bitmap.len() * 8,
            num_points
        )));
    }

    let mut values = Vec::with_capacity(num_points);
    let mut next = present.iter();
    for i in 0..num_points {
        if bitmap_bit(bitmap, i) {
            let value = next
                .next()
                .ok_or_else(|| DecodeError::corrupt("bitmap marks more points than were packed"))?;
            values.push(*value);
        } else {
            values.push(missing_value);
        }
    }
    if next.next().is_some() {
        return Err(DecodeError::corrupt("more packed values than bitmap points"));
    }
    Ok(values)
}

/// Build a bitmap marking finite values as present.
pub fn bitmap_from_values(values: &[f64]) -> Vec<u8> {
    let mut bitmap = vec![0u8; values.len().div_ceil(8)];
    for (i, value) in values.iter().enumerate() {
        if value.is_finite() {
            bitmap[i / 8] |= 0x80 >> (i % 8);
        }
    }
    bitmap
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(v: f64) -> f64 {
        v
    }

    #[test]
    fn test_extract_bits() {
        // Test with simple byte: 0b10110101
        let data = vec![0b10110101];

        // Extract first 2 bits (should be 0b10 = 2)
        assert_eq!(extract_bits(&data, 0, 2).unwrap(), 0b10);
        // Extract bits 2-4 (should be 0b11 = 3)
        assert_eq!(extract_bits(&data, 2, 2).unwrap(), 0b11);
        // Extract all 8 bits
        assert_eq!(extract_bits(&data, 0, 8).unwrap(), 0b10110101);
    }

    #[test]
    fn test_extract_bits_across_bytes() {
        let data = [0xFF, 0x00, 0xAB, 0xCD, 0xEF];
        assert_eq!(extract_bits(&data, 4, 8).unwrap(), 0xF0);
        assert_eq!(extract_bits(&data, 16, 24).unwrap(), 0xABCDEF);
        assert_eq!(extract_bits(&data, 4, 32).unwrap(), 0xF00ABCDE);
        assert!(extract_bits(&data, 36, 8).is_err());
        assert!(extract_bits(&data, 0, 33).is_err());
    }

    #[test]
    fn test_simple_unpacking() {
        // 2 data points, 8 bits per value
        let packing = SimplePacking {
            reference_value: 0.0,
            binary_scale_factor: 0,
            decimal_scale_factor: 0,
            bits_per_value: 8,
        };
        let values = unpack_simple(&[100, 200], 2, &packing).unwrap();
        assert_eq!(values, vec![100.0, 200.0]);
    }

    #[test]
    fn test_unpacking_applies_all_scale_factors() {
        // (R + X * 2^E) / 10^D with R = 2700, E = -1, D = 1
        let packing = SimplePacking {
            reference_value: 2700.0,
            binary_scale_factor: -1,
            decimal_scale_factor: 1,
            bits_per_value: 8,
        };
        let values = unpack_simple(&[0, 10], 2, &packing).unwrap();
        assert_eq!(values, vec![270.0, 270.5]);
    }

    #[test]
    fn test_zero_bits_gives_constant_field() {
        let packing = SimplePacking {
            reference_value: 2881.5,
            binary_scale_factor: 3,
            decimal_scale_factor: 1,
            bits_per_value: 0,
        };
        let values = unpack_simple(&[], 4, &packing).unwrap();
        assert_eq!(values, vec![288.15; 4]);
    }

    #[test]
    fn test_short_data_is_corrupt() {
        let packing = SimplePacking {
            reference_value: 0.0,
            binary_scale_factor: 0,
            decimal_scale_factor: 0,
            bits_per_value: 12,
        };
        assert!(matches!(
            unpack_simple(&[0, 0], 2, &packing),
            Err(DecodeError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn test_pack_unpack_within_half_precision() {
        let values: Vec<f64> = (0..50).map(|i| 250.0 + i as f64 * 0.37).collect();
        let packing = SimplePacking::fit(&values, 2, 16, exact);
        let packed = pack_simple(&values, &packing);
        let decoded = unpack_simple(&packed, values.len(), &packing).unwrap();

        let tolerance = packing.precision() / 2.0 + 1e-9;
        for (original, decoded) in values.iter().zip(&decoded) {
            assert!((original - decoded).abs() <= tolerance);
        }
        // Re-encoding decoded values reproduces the same integers
        assert_eq!(pack_simple(&decoded, &packing), packed);
    }

    #[test]
    fn test_fit_constant_field() {
        let packing = SimplePacking::fit(&[5.0, 5.0, 5.0], 0, 16, exact);
        assert_eq!(packing.bits_per_value, 0);
        assert_eq!(packing.unpack_value(0), 5.0);
    }

    #[test]
    fn test_bitmap_expansion() {
        let bitmap = [0b1010_0000];
        let values = apply_bitmap(&[1.0, 2.0], &bitmap, 4, f64::NAN).unwrap();
        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 2.0);
        assert!(values[3].is_nan());
        assert_eq!(count_present(&bitmap, 4), 2);
    }

    #[test]
    fn test_bitmap_count_mismatch_is_corrupt() {
        let bitmap = [0b1110_0000];
        assert!(apply_bitmap(&[1.0, 2.0], &bitmap, 4, f64::NAN).is_err());
        assert!(apply_bitmap(&[1.0, 2.0, 3.0, 4.0], &bitmap, 4, f64::NAN).is_err());
        assert!(apply_bitmap(&[], &[], 4, f64::NAN).is_err());
    }

    #[test]
    fn test_bitmap_from_values() {
        let bitmap = bitmap_from_values(&[1.0, f64::NAN, 2.0]);
        assert_eq!(bitmap, vec![0b1010_0000]);
    }
}
