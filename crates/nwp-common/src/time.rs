//! Forecast step handling.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Forecast lead time, in whole seconds since model initialization.
///
/// Steps from producers that encode minutes, hours or days all normalize to
/// seconds so that they order and compare consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForecastStep(i64);

impl ForecastStep {
    pub const ZERO: ForecastStep = ForecastStep(0);

    pub fn from_seconds(seconds: i64) -> Self {
        Self(seconds)
    }

    pub fn from_minutes(minutes: i64) -> Self {
        Self(minutes * 60)
    }

    pub fn from_hours(hours: i64) -> Self {
        Self(hours * 3600)
    }

    pub fn seconds(&self) -> i64 {
        self.0
    }

    /// Step in (possibly fractional) hours.
    pub fn hours(&self) -> f64 {
        self.0 as f64 / 3600.0
    }

    /// Reference time plus this step.
    pub fn valid_time(&self, reference_time: DateTime<Utc>) -> DateTime<Utc> {
        reference_time + Duration::seconds(self.0)
    }
}

impl fmt::Display for ForecastStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 3600 == 0 {
            write!(f, "{}h", self.0 / 3600)
        } else if self.0 % 60 == 0 {
            write!(f, "{}min", self.0 / 60)
        } else {
            write!(f, "{}s", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_step_ordering_across_units() {
        let a = ForecastStep::from_minutes(90);
        let b = ForecastStep::from_hours(1);
        let c = ForecastStep::from_seconds(7200);
        let mut steps = vec![c, a, b];
        steps.sort();
        assert_eq!(steps, vec![b, a, c]);
    }

    #[test]
    fn test_valid_time() {
        let reference = Utc.with_ymd_and_hms(2024, 2, 24, 16, 0, 0).unwrap();
        let step = ForecastStep::from_hours(6);
        assert_eq!(
            step.valid_time(reference),
            Utc.with_ymd_and_hms(2024, 2, 24, 22, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ForecastStep::from_hours(3).to_string(), "3h");
        assert_eq!(ForecastStep::from_minutes(15).to_string(), "15min");
        assert_eq!(ForecastStep::from_seconds(30).to_string(), "30s");
        assert_eq!(ForecastStep::from_hours(1).hours(), 1.0);
    }
}
