//! Two-level preset allocation
//!
//! The source amount is split across presets and non-preset weights
//! against the grand basis total. Each preset's subtotal is then split
//! across its own rows with a per-preset rounding correction, and a final
//! global correction runs over every row so the grand total still matches.
//! When the global correction lands on a preset row, that preset's
//! subtotal absorbs it too, keeping rows and subtotal consistent.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::allocation::{AllocateOutcome, AllocationEngine};
use crate::error::{CoreError, CoreResult};
use crate::rounding::{checked_total, raw_share};

/// One preset row with its resolved basis value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetRowInput {
    pub preset_id: String,
    #[serde(default)]
    pub preset_name: String,
    pub target_id: String,
    pub basis_value: Decimal,
}

/// A weight allocated directly against the grand total
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightInput {
    pub target_id: String,
    pub basis_value: Decimal,
}

/// One row of the flattened result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatAllocation {
    pub target_id: String,
    /// Owning preset, `None` for non-preset rows
    pub preset_id: Option<String>,
    pub basis_value: Decimal,
    pub value: Decimal,
    /// Share of the grand total
    pub percentage: Decimal,
}

/// One row inside a preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetRowAllocation {
    pub target_id: String,
    pub basis_value: Decimal,
    pub value: Decimal,
    /// Share of the preset's own total
    pub percentage: Decimal,
}

/// A preset's subtotal and its rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetAllocation {
    pub preset_id: String,
    pub preset_name: String,
    pub total_basis: Decimal,
    /// Subtotal; always equal to the sum of `rows`
    pub amount: Decimal,
    pub rows: Vec<PresetRowAllocation>,
    /// Row that absorbed the per-preset rounding difference
    pub adjustment_index: Option<usize>,
    pub adjustment_amount: Decimal,
}

/// Result of [`AllocationEngine::allocate_with_presets`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetAllocateOutcome {
    /// Preset rows (presets in first-appearance order), then non-preset rows
    pub allocations: Vec<FlatAllocation>,
    /// Flattened row that absorbed the global rounding difference
    pub adjustment_index: Option<usize>,
    pub adjustment_amount: Decimal,
    pub preset_allocations: Vec<PresetAllocation>,
}

impl PresetAllocateOutcome {
    pub fn empty() -> Self {
        Self {
            allocations: vec![],
            adjustment_index: None,
            adjustment_amount: Decimal::ZERO,
            preset_allocations: vec![],
        }
    }

    /// Sum of every flattened row
    pub fn total(&self) -> Decimal {
        self.allocations.iter().map(|a| a.value).sum()
    }
}

struct PresetGroup<'a> {
    id: &'a str,
    name: &'a str,
    rows: Vec<&'a PresetRowInput>,
}

impl PresetGroup<'_> {
    fn weights(&self) -> Vec<Decimal> {
        self.rows.iter().map(|r| r.basis_value).collect()
    }
}

/// Group rows by preset id, keeping first-appearance order
fn group_rows(rows: &[PresetRowInput]) -> Vec<PresetGroup<'_>> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<PresetGroup<'_>> = Vec::new();

    for row in rows {
        let index = *positions.entry(row.preset_id.as_str()).or_insert_with(|| {
            groups.push(PresetGroup {
                id: &row.preset_id,
                name: &row.preset_name,
                rows: vec![],
            });
            groups.len() - 1
        });
        groups[index].rows.push(row);
    }

    groups
}

impl AllocationEngine {
    /// Split `source_amount` across presets and non-preset weights.
    ///
    /// Fails with `InvalidBasis` when the grand total (all preset rows plus
    /// all non-preset weights) is zero or less. A preset whose own total is
    /// zero contributes zero-valued rows.
    pub fn allocate_with_presets(
        &self,
        source_amount: Decimal,
        preset_rows: &[PresetRowInput],
        non_preset_weights: &[WeightInput],
    ) -> CoreResult<PresetAllocateOutcome> {
        if preset_rows.is_empty() && non_preset_weights.is_empty() {
            return Ok(PresetAllocateOutcome::empty());
        }

        let groups = group_rows(preset_rows);
        let preset_totals = groups
            .iter()
            .map(|g| checked_total(&g.weights()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| CoreError::overflow("preset basis total"))?;
        let direct: Vec<Decimal> = non_preset_weights.iter().map(|w| w.basis_value).collect();

        let grand_total = checked_total(&preset_totals)
            .zip(checked_total(&direct))
            .and_then(|(presets, direct)| presets.checked_add(direct))
            .ok_or_else(|| CoreError::overflow("grand basis total"))?;
        if grand_total <= Decimal::ZERO {
            return Err(CoreError::InvalidBasis { total: grand_total });
        }

        let mut preset_allocations = Vec::with_capacity(groups.len());
        let row_count = preset_rows.len() + non_preset_weights.len();
        let mut flat: Vec<FlatAllocation> = Vec::with_capacity(row_count);
        let mut raw: Vec<Decimal> = Vec::with_capacity(row_count);
        let mut owners: Vec<Option<(usize, usize)>> = Vec::with_capacity(row_count);

        for (group_index, (group, total)) in groups.iter().zip(&preset_totals).enumerate() {
            let amount = self.policy().round_amount(raw_share(*total, grand_total, source_amount)?);
            let weights = group.weights();
            let inner = if total.is_zero() {
                AllocateOutcome {
                    allocations: vec![Decimal::ZERO; weights.len()],
                    adjustment_index: None,
                    adjustment_amount: Decimal::ZERO,
                }
            } else {
                self.allocate(amount, &weights)?
            };
            let percentages = self.normalize_percentages(&weights);

            let mut rows = Vec::with_capacity(group.rows.len());
            for (row_index, row) in group.rows.iter().enumerate() {
                let value = inner.allocations[row_index];
                rows.push(PresetRowAllocation {
                    target_id: row.target_id.clone(),
                    basis_value: row.basis_value,
                    value,
                    percentage: percentages[row_index],
                });
                raw.push(raw_share(row.basis_value, grand_total, source_amount)?);
                owners.push(Some((group_index, row_index)));
                flat.push(FlatAllocation {
                    target_id: row.target_id.clone(),
                    preset_id: Some(group.id.to_string()),
                    basis_value: row.basis_value,
                    value,
                    percentage: Decimal::ZERO,
                });
            }

            log::debug!(
                "preset {} receives {} of {} (basis {} / {})",
                group.id,
                amount,
                source_amount,
                total,
                grand_total
            );

            preset_allocations.push(PresetAllocation {
                preset_id: group.id.to_string(),
                preset_name: group.name.to_string(),
                total_basis: *total,
                amount,
                rows,
                adjustment_index: inner.adjustment_index,
                adjustment_amount: inner.adjustment_amount,
            });
        }

        for weight in non_preset_weights {
            let share = raw_share(weight.basis_value, grand_total, source_amount)?;
            raw.push(share);
            owners.push(None);
            flat.push(FlatAllocation {
                target_id: weight.target_id.clone(),
                preset_id: None,
                basis_value: weight.basis_value,
                value: self.policy().round_amount(share),
                percentage: Decimal::ZERO,
            });
        }

        let mut values: Vec<Decimal> = flat.iter().map(|row| row.value).collect();
        let (adjustment_index, adjustment_amount) = self.reconcile(source_amount, &raw, &mut values)?;
        if let Some(index) = adjustment_index {
            flat[index].value = values[index];
            if let Some((group_index, row_index)) = owners[index] {
                let preset = &mut preset_allocations[group_index];
                preset.amount += adjustment_amount;
                preset.rows[row_index].value += adjustment_amount;
            }
        }

        let weights: Vec<Decimal> = flat.iter().map(|row| row.basis_value).collect();
        for (row, percentage) in flat.iter_mut().zip(self.normalize_percentages(&weights)) {
            row.percentage = percentage;
        }

        Ok(PresetAllocateOutcome {
            allocations: flat,
            adjustment_index,
            adjustment_amount,
            preset_allocations,
        })
    }
}
