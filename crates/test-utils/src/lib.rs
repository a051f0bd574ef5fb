//! Shared test utilities for the nwp-ingest workspace.
//!
//! This crate provides common testing infrastructure including:
//! - GRIB1 and GRIB2 message builders (simple packing)
//! - Grid and field generators
//! - Fixtures that write synthetic model output to disk
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{Grib2Builder, TestGrid};
//! ```

pub mod fixtures;
pub mod generators;
pub mod grib1;
pub mod grib2;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use grib1::Grib1Builder;
pub use grib2::Grib2Builder;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Macro for approximate equality of (latitude, longitude) pairs.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_coords_approx_eq;
///
/// assert_coords_approx_eq!((52.1, 5.18), (52.1000001, 5.18), 1e-6);
/// ```
#[macro_export]
macro_rules! assert_coords_approx_eq {
    (($x1:expr, $y1:expr), ($x2:expr, $y2:expr), $epsilon:expr) => {{
        $crate::assert_approx_eq!($x1, $x2, $epsilon);
        $crate::assert_approx_eq!($y1, $y2, $epsilon);
    }};
}

/// Encode a sign-magnitude 16-bit integer.
pub(crate) fn sign_magnitude_16(value: i16) -> [u8; 2] {
    let magnitude = value.unsigned_abs() & 0x7FFF;
    let raw = if value < 0 { magnitude | 0x8000 } else { magnitude };
    raw.to_be_bytes()
}

/// Encode a sign-magnitude 24-bit integer.
pub(crate) fn sign_magnitude_24(value: i32) -> [u8; 3] {
    let magnitude = value.unsigned_abs() & 0x7F_FFFF;
    let raw = if value < 0 { magnitude | 0x80_0000 } else { magnitude };
    [(raw >> 16) as u8, (raw >> 8) as u8, raw as u8]
}

/// Encode a 24-bit unsigned integer.
pub(crate) fn u24(value: usize) -> [u8; 3] {
    [(value >> 16) as u8, (value >> 8) as u8, value as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(0.0, 0.0, 0.0001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[test]
    fn test_sign_magnitude_encoders() {
        assert_eq!(sign_magnitude_16(-1), [0x80, 0x01]);
        assert_eq!(sign_magnitude_16(300), [0x01, 0x2C]);
        assert_eq!(sign_magnitude_24(-42), [0x80, 0x00, 0x2A]);
        assert_eq!(u24(256), [0, 1, 0]);
    }
}
