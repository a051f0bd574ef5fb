//! Record selection by parameter and level type.

use std::fmt;

use nwp_common::{LevelType, ParameterCode, RecordMetadata};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{IngestionError, Result};
use crate::index::{IndexEntry, RecordIndex};

/// How a query names its parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSelector {
    /// Short name from the parameter table, e.g. "t"
    ShortName(String),
    /// Edition-specific numeric code
    Code(ParameterCode),
}

impl fmt::Display for ParameterSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortName(name) => write!(f, "{}", name),
            Self::Code(code) => write!(f, "{}", code),
        }
    }
}

/// One parameter on one level type. Every level value of that type matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub parameter: ParameterSelector,
    pub level_type: LevelType,
}

impl Selector {
    pub fn new(parameter: ParameterSelector, level_type: LevelType) -> Self {
        Self {
            parameter,
            level_type,
        }
    }

    pub fn short_name(name: impl Into<String>, level_type: LevelType) -> Self {
        Self::new(ParameterSelector::ShortName(name.into()), level_type)
    }

    /// Build from text. A parameter made of dot-separated numbers ("253.11",
    /// "0.0.0") selects by code; anything else is a short name.
    pub fn parse(parameter: &str, level_type: &str) -> Result<Self> {
        let parameter = parameter.trim();
        if parameter.is_empty() {
            return Err(IngestionError::InvalidConfig(
                "parameter must not be empty".to_string(),
            ));
        }
        let level_type: LevelType = level_type
            .parse()
            .map_err(|e: nwp_common::CommonError| IngestionError::InvalidConfig(e.to_string()))?;

        let numeric = parameter.chars().all(|c| c.is_ascii_digit() || c == '.');
        let parameter = if numeric {
            let code = parameter
                .parse()
                .map_err(|e: nwp_common::CommonError| IngestionError::InvalidConfig(e.to_string()))?;
            ParameterSelector::Code(code)
        } else {
            ParameterSelector::ShortName(parameter.to_string())
        };

        Ok(Self::new(parameter, level_type))
    }

    pub fn matches(&self, metadata: &RecordMetadata) -> bool {
        if metadata.level_type != self.level_type {
            return false;
        }
        match &self.parameter {
            ParameterSelector::ShortName(name) => metadata.parameter.short_name == *name,
            ParameterSelector::Code(code) => metadata.parameter.code == *code,
        }
    }

    /// Matching entries in index order.
    pub fn select<'a>(&self, index: &'a RecordIndex) -> Result<Vec<&'a IndexEntry>> {
        let selected: Vec<&IndexEntry> = index
            .entries()
            .iter()
            .filter(|entry| self.matches(&entry.metadata))
            .collect();

        if selected.is_empty() {
            let available: Vec<String> = index.summary().iter().map(|s| s.to_string()).collect();
            warn!(
                query = %self,
                indexed = index.len(),
                available = ?available,
                "No records match query"
            );
            return Err(IngestionError::NoMatch {
                query: self.to_string(),
                available,
            });
        }

        info!(
            query = %self,
            selected = selected.len(),
            indexed = index.len(),
            "Selected records"
        );
        Ok(selected)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.parameter, self.level_type)
    }
}
