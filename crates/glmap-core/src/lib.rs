//! Allocation logic for general-ledger account mapping
//!
//! Splits trial-balance amounts across weighted basis targets so that
//! every share is expressed to the cent, shares sum exactly to the source
//! amount, and percentage shares sum exactly to 100.

pub mod allocation;
pub mod basis;
pub mod error;
pub mod exclusion;
pub mod models;
pub mod presets;
pub mod rounding;
pub mod types;

use rust_decimal::Decimal;

pub use allocation::{AllocateOutcome, AllocationEngine};
pub use basis::{resolve_basis_value, BasisLookup, PeriodValued};
pub use error::{CoreError, CoreResult, ErrorCode, ErrorSeverity};
pub use exclusion::{compute_exclusion_summaries, ExclusionSummary, ExclusionSummaryComputer};
pub use models::{
    Allocation, AllocationResult, AllocationTarget, BasisEntity, Preset, PresetRow, ResultEntry,
    RoundingAdjustment, SourceAccount, TargetKind,
};
pub use presets::{
    FlatAllocation, PresetAllocateOutcome, PresetAllocation, PresetRowAllocation, PresetRowInput,
    WeightInput,
};
pub use rounding::RoundingPolicy;
pub use types::{MappingType, ResultOrigin};

/// Split `source_amount` across `basis_values` to the cent
pub fn allocate(source_amount: Decimal, basis_values: &[Decimal]) -> CoreResult<AllocateOutcome> {
    AllocationEngine::default().allocate(source_amount, basis_values)
}

/// Split `source_amount` across presets and non-preset weights to the cent
pub fn allocate_with_presets(
    source_amount: Decimal,
    preset_rows: &[PresetRowInput],
    non_preset_weights: &[WeightInput],
) -> CoreResult<PresetAllocateOutcome> {
    AllocationEngine::default().allocate_with_presets(source_amount, preset_rows, non_preset_weights)
}

/// Percentages (two decimal places) summing to exactly 100
pub fn normalize_percentages(ratios: &[Decimal]) -> Vec<Decimal> {
    RoundingPolicy::default().normalize_percentages(ratios)
}
