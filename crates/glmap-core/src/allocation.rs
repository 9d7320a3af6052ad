//! Flat ratio allocation
//!
//! Splits one monetary amount across a list of basis weights. Shares are
//! rounded to the amount scale and the cumulative rounding difference is
//! pushed onto the share with the largest raw value, so the shares always
//! sum to the source amount.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::basis::BasisLookup;
use crate::error::{CoreError, CoreResult};
use crate::models::{Allocation, AllocationResult};
use crate::rounding::{checked_total, largest_abs_index, raw_share, RoundingPolicy};

/// Shares produced by [`AllocationEngine::allocate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocateOutcome {
    /// Rounded shares, adjustment included, in basis order
    pub allocations: Vec<Decimal>,
    /// Index that absorbed the rounding difference
    pub adjustment_index: Option<usize>,
    /// Difference added at `adjustment_index` (zero when none)
    pub adjustment_amount: Decimal,
}

impl AllocateOutcome {
    pub fn empty() -> Self {
        Self {
            allocations: vec![],
            adjustment_index: None,
            adjustment_amount: Decimal::ZERO,
        }
    }

    /// Sum of all shares
    pub fn total(&self) -> Decimal {
        self.allocations.iter().sum()
    }
}

/// Entry point for all allocation computations
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocationEngine {
    policy: RoundingPolicy,
}

impl AllocationEngine {
    pub fn new(policy: RoundingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RoundingPolicy {
        &self.policy
    }

    /// Split `source_amount` proportionally to `basis_values`.
    ///
    /// An empty basis list is not an error and yields an empty outcome. A
    /// basis total of zero or less is rejected with `InvalidBasis`.
    pub fn allocate(&self, source_amount: Decimal, basis_values: &[Decimal]) -> CoreResult<AllocateOutcome> {
        if basis_values.is_empty() {
            return Ok(AllocateOutcome::empty());
        }

        let total = checked_total(basis_values).ok_or_else(|| CoreError::overflow("basis total"))?;
        if total <= Decimal::ZERO {
            return Err(CoreError::InvalidBasis { total });
        }

        let raw = basis_values
            .iter()
            .map(|value| raw_share(*value, total, source_amount))
            .collect::<CoreResult<Vec<_>>>()?;

        let mut allocations: Vec<Decimal> = raw.iter().map(|share| self.policy.round_amount(*share)).collect();
        let (adjustment_index, adjustment_amount) = self.reconcile(source_amount, &raw, &mut allocations)?;

        log::debug!(
            "allocated {} across {} weights (total {}), adjustment {:?} {}",
            source_amount,
            basis_values.len(),
            total,
            adjustment_index,
            adjustment_amount
        );

        Ok(AllocateOutcome {
            allocations,
            adjustment_index,
            adjustment_amount,
        })
    }

    /// Percentages summing to exactly 100
    pub fn normalize_percentages(&self, ratios: &[Decimal]) -> Vec<Decimal> {
        self.policy.normalize_percentages(ratios)
    }

    /// Run an allocation for one period and capture it as a persisted
    /// result snapshot.
    pub fn snapshot(
        &self,
        allocation: &Allocation,
        lookup: &BasisLookup<'_>,
        period_id: Option<&str>,
        source_value: Decimal,
    ) -> CoreResult<AllocationResult> {
        let weights = lookup
            .allocation_weights(allocation, period_id)
            .ok_or_else(|| CoreError::overflow("preset basis total"))?;
        let outcome = self.allocate(source_value, &weights)?;
        let percentages = self.normalize_percentages(&weights);

        AllocationResult::from_outcome(allocation, period_id, source_value, &outcome, &percentages)
    }

    /// Push the rounding difference onto the largest raw share.
    ///
    /// Returns the adjusted index and amount; `(None, 0)` when the rounded
    /// shares already sum to `target`.
    pub(crate) fn reconcile(
        &self,
        target: Decimal,
        raw: &[Decimal],
        rounded: &mut [Decimal],
    ) -> CoreResult<(Option<usize>, Decimal)> {
        let allocated = checked_total(rounded).ok_or_else(|| CoreError::overflow("allocated total"))?;
        let difference = target
            .checked_sub(allocated)
            .map(|d| self.policy.round_amount(d))
            .ok_or_else(|| CoreError::overflow("rounding difference"))?;

        if difference.is_zero() {
            return Ok((None, Decimal::ZERO));
        }

        let Some(index) = largest_abs_index(raw) else {
            return Ok((None, Decimal::ZERO));
        };
        rounded[index] += difference;

        Ok((Some(index), difference))
    }
}
