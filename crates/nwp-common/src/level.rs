//! Vertical level types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

/// GRIB1 level type codes (Table 3).
pub mod grib1_codes {
    pub const HEIGHT_ABOVE_SEA: u8 = 103;
    pub const HEIGHT_ABOVE_GROUND: u8 = 105;
    pub const HYBRID: u8 = 109;
}

/// GRIB2 level type codes (Code Table 4.5).
pub mod grib2_codes {
    pub const HEIGHT_ABOVE_SEA: u8 = 102;
    pub const HEIGHT_ABOVE_GROUND: u8 = 103;
    pub const HYBRID: u8 = 105;
}

/// Vertical reference frame of a record.
///
/// Codes without a named variant keep the edition they came from, because
/// the same number means different surfaces in GRIB1 and GRIB2 (105 is
/// height above ground in one and hybrid level in the other).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LevelType {
    HeightAboveGround,
    HeightAboveSea,
    HybridLevel,
    Other { edition: u8, code: u8 },
}

impl LevelType {
    pub fn from_grib1(code: u8) -> Self {
        match code {
            grib1_codes::HEIGHT_ABOVE_GROUND => Self::HeightAboveGround,
            grib1_codes::HEIGHT_ABOVE_SEA => Self::HeightAboveSea,
            grib1_codes::HYBRID => Self::HybridLevel,
            _ => Self::Other { edition: 1, code },
        }
    }

    pub fn from_grib2(code: u8) -> Self {
        match code {
            grib2_codes::HEIGHT_ABOVE_GROUND => Self::HeightAboveGround,
            grib2_codes::HEIGHT_ABOVE_SEA => Self::HeightAboveSea,
            grib2_codes::HYBRID => Self::HybridLevel,
            _ => Self::Other { edition: 2, code },
        }
    }

    /// Unit of the level value for this level type.
    pub fn units(&self) -> &'static str {
        match self {
            Self::HeightAboveGround | Self::HeightAboveSea => "m",
            Self::HybridLevel => "1",
            Self::Other { .. } => "unknown",
        }
    }

    /// CF `positive` attribute for the level coordinate, when it is defined.
    pub fn positive(&self) -> Option<&'static str> {
        match self {
            Self::HeightAboveGround | Self::HeightAboveSea => Some("up"),
            Self::HybridLevel => Some("down"),
            Self::Other { .. } => None,
        }
    }

    /// Long name for the level coordinate.
    pub fn long_name(&self) -> String {
        match self {
            Self::HeightAboveGround => "height above ground".to_string(),
            Self::HeightAboveSea => "height above mean sea level".to_string(),
            Self::HybridLevel => "hybrid model level".to_string(),
            Self::Other { edition, code } => format!("GRIB{} level type {}", edition, code),
        }
    }
}

impl fmt::Display for LevelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeightAboveGround => write!(f, "height-above-ground"),
            Self::HeightAboveSea => write!(f, "height-above-sea"),
            Self::HybridLevel => write!(f, "hybrid-level"),
            Self::Other { edition, code } => write!(f, "other:{}:{}", edition, code),
        }
    }
}

/// Accepts the kebab-case names printed by `Display`, the ecCodes
/// `typeOfLevel` spellings, and `other:<edition>:<code>`.
impl FromStr for LevelType {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "height-above-ground" | "heightaboveground" | "height_above_ground" => {
                return Ok(Self::HeightAboveGround)
            }
            "height-above-sea" | "heightabovesea" | "height_above_sea" => {
                return Ok(Self::HeightAboveSea)
            }
            "hybrid-level" | "hybrid" | "hybrid_level" => return Ok(Self::HybridLevel),
            _ => {}
        }

        let parts: Vec<&str> = normalized.split(':').collect();
        if let ["other", edition, code] = parts.as_slice() {
            let edition: u8 = edition
                .parse()
                .map_err(|_| CommonError::UnknownLevelType(s.to_string()))?;
            let code: u8 = code
                .parse()
                .map_err(|_| CommonError::UnknownLevelType(s.to_string()))?;
            return match edition {
                1 => Ok(Self::from_grib1(code)),
                2 => Ok(Self::from_grib2(code)),
                _ => Err(CommonError::UnknownLevelType(s.to_string())),
            };
        }

        Err(CommonError::UnknownLevelType(s.to_string()))
    }
}
