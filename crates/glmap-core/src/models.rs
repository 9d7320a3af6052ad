//! Core data models for allocations

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::allocation::AllocateOutcome;
use crate::error::{CoreError, CoreResult};
use crate::types::MappingType;

/// A driver metric (miles, headcount, square footage) used as a weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasisEntity {
    /// Unique identifier
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Value used when no period-specific value is recorded
    #[serde(default)]
    pub default_value: Decimal,
    /// Values keyed by period identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_by_period: Option<BTreeMap<String, Decimal>>,
}

impl BasisEntity {
    pub fn new(id: &str, default_value: Decimal) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            default_value,
            values_by_period: None,
        }
    }

    /// Record a value for one period
    pub fn with_period_value(mut self, period_id: &str, value: Decimal) -> Self {
        self.values_by_period
            .get_or_insert_with(BTreeMap::new)
            .insert(period_id.to_string(), value);
        self
    }
}

/// A trial-balance account whose balance is being distributed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAccount {
    /// Unique identifier
    pub id: String,
    /// Account name as it appears in the trial balance
    #[serde(default)]
    pub name: String,
    /// How the account is mapped
    #[serde(default)]
    pub mapping_type: MappingType,
    /// Balance used when no period-specific balance is recorded
    #[serde(default)]
    pub default_value: Decimal,
    /// Balances keyed by period identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_by_period: Option<BTreeMap<String, Decimal>>,
}

impl SourceAccount {
    pub fn new(id: &str, mapping_type: MappingType, balance: Decimal) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            mapping_type,
            default_value: balance,
            values_by_period: None,
        }
    }

    /// Record a balance for one period
    pub fn with_period_value(mut self, period_id: &str, value: Decimal) -> Self {
        self.values_by_period
            .get_or_insert_with(BTreeMap::new)
            .insert(period_id.to_string(), value);
        self
    }
}

/// What a target draws its weight from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetKind {
    /// One basis entity feeding one standard account
    Metric {
        basis_entity_id: String,
        target_account_id: String,
    },
    /// A shared preset of basis-to-account rows
    Preset { preset_id: String },
}

/// One destination of an allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationTarget {
    /// Unique identifier within the allocation
    pub id: String,
    #[serde(flatten)]
    pub kind: TargetKind,
    /// Share still counts toward ratios but is removed from the mapped total
    #[serde(default)]
    pub is_exclusion: bool,
}

impl AllocationTarget {
    pub fn metric(id: &str, basis_entity_id: &str, target_account_id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: TargetKind::Metric {
                basis_entity_id: basis_entity_id.to_string(),
                target_account_id: target_account_id.to_string(),
            },
            is_exclusion: false,
        }
    }

    pub fn preset(id: &str, preset_id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: TargetKind::Preset {
                preset_id: preset_id.to_string(),
            },
            is_exclusion: false,
        }
    }

    pub fn excluded(mut self) -> Self {
        self.is_exclusion = true;
        self
    }
}

/// Dynamic mapping configured for one source account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub id: String,
    pub source_account_id: String,
    #[serde(default)]
    pub targets: Vec<AllocationTarget>,
}

impl Allocation {
    /// Check if any target is flagged for exclusion
    pub fn has_exclusion(&self) -> bool {
        self.targets.iter().any(|t| t.is_exclusion)
    }
}

/// One row of a preset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetRow {
    pub basis_entity_id: String,
    pub target_id: String,
}

/// A named, reusable group of basis-to-account rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rows: Vec<PresetRow>,
}

/// One target's line in a persisted result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub target_id: String,
    /// Rounded share before any rounding adjustment
    pub value: Decimal,
    pub percentage: Decimal,
    #[serde(default)]
    pub is_exclusion: bool,
}

/// Correction applied to absorb the cumulative rounding difference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundingAdjustment {
    pub target_id: String,
    pub amount: Decimal,
}

/// Immutable snapshot of one allocation run for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub allocation_id: String,
    #[serde(default)]
    pub period_id: Option<String>,
    pub source_value: Decimal,
    pub entries: Vec<ResultEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<RoundingAdjustment>,
}

impl AllocationResult {
    /// Build a snapshot from an engine outcome.
    ///
    /// `outcome` and `percentages` must line up index-for-index with the
    /// allocation's targets. The adjustment is stored separately, so each
    /// entry keeps its pre-adjustment rounded value.
    pub fn from_outcome(
        allocation: &Allocation,
        period_id: Option<&str>,
        source_value: Decimal,
        outcome: &AllocateOutcome,
        percentages: &[Decimal],
    ) -> CoreResult<Self> {
        let targets = allocation.targets.len();
        if outcome.allocations.len() != targets || percentages.len() != targets {
            return Err(CoreError::ValidationError {
                message: format!(
                    "allocation {} has {} targets but the outcome has {} shares and {} percentages",
                    allocation.id,
                    targets,
                    outcome.allocations.len(),
                    percentages.len()
                ),
            });
        }

        let adjustment = outcome.adjustment_index.map(|index| RoundingAdjustment {
            target_id: allocation.targets[index].id.clone(),
            amount: outcome.adjustment_amount,
        });

        let entries = allocation
            .targets
            .iter()
            .zip(outcome.allocations.iter().zip(percentages))
            .enumerate()
            .map(|(index, (target, (value, percentage)))| {
                let value = if outcome.adjustment_index == Some(index) {
                    *value - outcome.adjustment_amount
                } else {
                    *value
                };
                ResultEntry {
                    target_id: target.id.clone(),
                    value,
                    percentage: *percentage,
                    is_exclusion: target.is_exclusion,
                }
            })
            .collect();

        Ok(Self {
            allocation_id: allocation.id.clone(),
            period_id: period_id.map(str::to_string),
            source_value,
            entries,
            adjustment,
        })
    }

    /// Check if this result belongs to the given allocation and period
    pub fn matches(&self, allocation_id: &str, period_id: Option<&str>) -> bool {
        self.allocation_id == allocation_id && self.period_id.as_deref() == period_id
    }

    /// Sum of all entries plus the rounding adjustment
    pub fn total(&self) -> Decimal {
        let entries: Decimal = self.entries.iter().map(|e| e.value).sum();
        entries + self.adjustment.as_ref().map_or(Decimal::ZERO, |a| a.amount)
    }

    /// Amount attributed to exclusion-flagged entries, adjustment included
    /// when it landed on one of them
    pub fn excluded_total(&self) -> Decimal {
        let excluded: Decimal = self
            .entries
            .iter()
            .filter(|e| e.is_exclusion)
            .map(|e| e.value)
            .sum();

        let adjustment = self
            .adjustment
            .as_ref()
            .filter(|a| {
                self.entries
                    .iter()
                    .any(|e| e.is_exclusion && e.target_id == a.target_id)
            })
            .map_or(Decimal::ZERO, |a| a.amount);

        excluded + adjustment
    }
}
