//! Basic types for the allocation module

use serde::{Deserialize, Serialize};

/// How a trial-balance account is mapped onto the standard chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingType {
    /// Whole balance goes to one standard account
    Direct,
    /// Balance split by fixed percentages
    Split,
    /// Balance split by basis metrics or presets
    Dynamic,
    /// Balance excluded from the mapped total
    Exclude,
}

impl Default for MappingType {
    fn default() -> Self {
        MappingType::Direct
    }
}

impl std::fmt::Display for MappingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingType::Direct => write!(f, "direct"),
            MappingType::Split => write!(f, "split"),
            MappingType::Dynamic => write!(f, "dynamic"),
            MappingType::Exclude => write!(f, "exclude"),
        }
    }
}

/// Where an exclusion ratio came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOrigin {
    /// Read from a persisted allocation result for the period
    Persisted,
    /// Recomputed from current basis values
    Live,
}

impl std::fmt::Display for ResultOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultOrigin::Persisted => write!(f, "persisted"),
            ResultOrigin::Live => write!(f, "live"),
        }
    }
}
