//! Decimal rounding and largest-remainder helpers
//!
//! Every share the engine reports is rounded half away from zero to a
//! fixed number of decimal places. The leftover produced by independent
//! rounding is pushed onto a single entry, chosen as the first index whose
//! raw (unrounded) value has the largest magnitude.

use glmap_config::{RoundingConfig, MAX_DECIMAL_PLACES};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Decimal places used for amounts and percentages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundingPolicy {
    pub amount_scale: u32,
    pub percent_scale: u32,
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        Self {
            amount_scale: 2,
            percent_scale: 2,
        }
    }
}

impl RoundingPolicy {
    pub fn new(amount_scale: u32, percent_scale: u32) -> CoreResult<Self> {
        for scale in [amount_scale, percent_scale] {
            if scale > MAX_DECIMAL_PLACES {
                return Err(CoreError::InvalidRounding { scale });
            }
        }
        Ok(Self {
            amount_scale,
            percent_scale,
        })
    }

    /// Round a monetary amount (half away from zero)
    pub fn round_amount(&self, value: Decimal) -> Decimal {
        round_half_away(value, self.amount_scale)
    }

    /// Round a percentage (half away from zero)
    pub fn round_percent(&self, value: Decimal) -> Decimal {
        round_half_away(value, self.percent_scale)
    }

    /// Convert raw ratios into percentages that sum to exactly 100.
    ///
    /// Ratios need not sum to 1. A zero (or non-positive) total yields all
    /// zeros rather than an error, since callers use this for display only.
    pub fn normalize_percentages(&self, ratios: &[Decimal]) -> Vec<Decimal> {
        let total = match checked_total(ratios) {
            Some(total) if total > Decimal::ZERO => total,
            Some(_) => return vec![Decimal::ZERO; ratios.len()],
            None => {
                log::warn!("ratio total overflowed; reporting zero percentages");
                return vec![Decimal::ZERO; ratios.len()];
            }
        };

        let raw: Option<Vec<Decimal>> = ratios
            .iter()
            .map(|r| r.checked_div(total).and_then(|share| share.checked_mul(Decimal::ONE_HUNDRED)))
            .collect();
        let Some(raw) = raw else {
            log::warn!("percentage computation overflowed; reporting zero percentages");
            return vec![Decimal::ZERO; ratios.len()];
        };

        let mut percentages: Vec<Decimal> = raw.iter().map(|p| self.round_percent(*p)).collect();
        let rounded_total: Decimal = percentages.iter().copied().sum();
        let difference = self.round_percent(Decimal::ONE_HUNDRED - rounded_total);

        if !difference.is_zero() {
            if let Some(index) = largest_abs_index(&raw) {
                percentages[index] += difference;
            }
        }

        percentages
    }
}

impl TryFrom<&RoundingConfig> for RoundingPolicy {
    type Error = CoreError;

    fn try_from(config: &RoundingConfig) -> Result<Self, Self::Error> {
        RoundingPolicy::new(config.amount_decimal_places, config.percent_decimal_places)
    }
}

pub fn round_half_away(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Sum of the values, or `None` on overflow
pub(crate) fn checked_total(values: &[Decimal]) -> Option<Decimal> {
    values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
}

/// `(value / total) * amount` with overflow reported as an error
pub(crate) fn raw_share(value: Decimal, total: Decimal, amount: Decimal) -> CoreResult<Decimal> {
    value
        .checked_div(total)
        .and_then(|ratio| ratio.checked_mul(amount))
        .ok_or_else(|| CoreError::overflow("raw share"))
}

/// First index attaining the largest absolute value.
///
/// The scan only replaces the current best on a strictly greater
/// magnitude, which pins ties to the earliest index.
pub(crate) fn largest_abs_index(values: &[Decimal]) -> Option<usize> {
    let mut best: Option<(usize, Decimal)> = None;
    for (index, value) in values.iter().enumerate() {
        let magnitude = value.abs();
        match best {
            Some((_, current)) if magnitude <= current => {}
            _ => best = Some((index, magnitude)),
        }
    }
    best.map(|(index, _)| index)
}
