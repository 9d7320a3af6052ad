//! Exclusion summaries for dynamically mapped accounts
//!
//! For every dynamic account whose allocation flags at least one target as
//! an exclusion, reports how much of the account's balance those targets
//! absorb. A persisted result for the requested period is authoritative;
//! without one the split is recomputed from current basis values.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::allocation::AllocationEngine;
use crate::basis::{resolve_basis_value, BasisLookup};
use crate::error::{CoreError, DefaultErrorLogger, ErrorContext, ErrorLogger};
use crate::models::{Allocation, AllocationResult, BasisEntity, Preset, SourceAccount};
use crate::types::{MappingType, ResultOrigin};

/// Portion of one account's balance attributed to excluded targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionSummary {
    /// Excluded amount, signed like the account balance
    pub amount: Decimal,
    /// Excluded share of the balance, in `[0, 1]`
    pub ratio: Decimal,
    /// `ratio` expressed as a percentage
    pub percentage: Decimal,
    pub origin: ResultOrigin,
}

/// Computes exclusion summaries, reporting unresolvable accounts to `L`
pub struct ExclusionSummaryComputer<L: ErrorLogger = DefaultErrorLogger> {
    engine: AllocationEngine,
    logger: L,
}

impl ExclusionSummaryComputer<DefaultErrorLogger> {
    pub fn new(engine: AllocationEngine) -> Self {
        Self {
            engine,
            logger: DefaultErrorLogger,
        }
    }
}

impl<L: ErrorLogger> ExclusionSummaryComputer<L> {
    pub fn with_logger(engine: AllocationEngine, logger: L) -> Self {
        Self { engine, logger }
    }

    /// Summaries keyed by account id.
    ///
    /// Accounts that are not dynamically mapped, have no allocation, have no
    /// exclusion target, or whose ratio cannot be resolved get no entry.
    pub fn compute(
        &self,
        accounts: &[SourceAccount],
        allocations: &[Allocation],
        basis_entities: &[BasisEntity],
        presets: &[Preset],
        period_id: Option<&str>,
        persisted_results: &[AllocationResult],
    ) -> BTreeMap<String, ExclusionSummary> {
        let lookup = BasisLookup::new(basis_entities, presets);
        let by_account: HashMap<&str, &Allocation> = allocations
            .iter()
            .map(|a| (a.source_account_id.as_str(), a))
            .collect();

        let mut summaries = BTreeMap::new();
        for account in accounts.iter().filter(|a| a.mapping_type == MappingType::Dynamic) {
            let Some(allocation) = by_account.get(account.id.as_str()) else {
                continue;
            };
            if !allocation.has_exclusion() {
                continue;
            }

            let context = ErrorContext::new("exclusion_summary")
                .with_account(&account.id)
                .with_period(period_id)
                .with_data("allocation_id", serde_json::json!(allocation.id))
                .with_data("target_count", serde_json::json!(allocation.targets.len()));
            let source_amount = resolve_basis_value(Some(account), period_id);

            let resolved = match persisted_results
                .iter()
                .find(|r| r.matches(&allocation.id, period_id))
            {
                Some(result) => {
                    if result.source_value != source_amount {
                        self.logger.log_warning(
                            &format!(
                                "persisted result was computed from {}, applying its ratio to {}",
                                result.source_value, source_amount
                            ),
                            &context,
                        );
                    }
                    persisted_ratio(result).map(|ratio| (ratio, ResultOrigin::Persisted))
                }
                None => self
                    .live_ratio(allocation, &lookup, period_id, source_amount, &context)
                    .map(|ratio| (ratio, ResultOrigin::Live)),
            };

            let Some((ratio, origin)) = resolved else {
                self.logger.log_debug("no exclusion ratio could be resolved", &context);
                continue;
            };

            let policy = self.engine.policy();
            let summary = ExclusionSummary {
                amount: policy.round_amount(ratio * source_amount),
                ratio,
                percentage: policy.round_percent(ratio * Decimal::ONE_HUNDRED),
                origin,
            };
            log::debug!(
                "account {} excludes {} ({}%) from {} result",
                account.id,
                summary.amount,
                summary.percentage,
                origin
            );
            summaries.insert(account.id.clone(), summary);
        }

        summaries
    }

    /// Recompute the split over `|source_amount|` from current basis values
    fn live_ratio(
        &self,
        allocation: &Allocation,
        lookup: &BasisLookup<'_>,
        period_id: Option<&str>,
        source_amount: Decimal,
        context: &ErrorContext,
    ) -> Option<Decimal> {
        let magnitude = source_amount.abs();
        if magnitude.is_zero() {
            return None;
        }

        let Some(weights) = lookup.allocation_weights(allocation, period_id) else {
            self.logger
                .log_error(&CoreError::overflow("preset basis total"), context);
            return None;
        };

        let outcome = match self.engine.allocate(magnitude, &weights) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.logger.log_error(&err, context);
                return None;
            }
        };

        // Shares already carry the rounding adjustment.
        let excluded: Decimal = allocation
            .targets
            .iter()
            .zip(&outcome.allocations)
            .filter(|(target, _)| target.is_exclusion)
            .map(|(_, share)| *share)
            .sum();

        capped_ratio(excluded, magnitude)
    }
}

fn persisted_ratio(result: &AllocationResult) -> Option<Decimal> {
    let magnitude = result.source_value.abs();
    if magnitude.is_zero() {
        return None;
    }
    capped_ratio(result.excluded_total().abs(), magnitude)
}

fn capped_ratio(excluded: Decimal, magnitude: Decimal) -> Option<Decimal> {
    excluded
        .checked_div(magnitude)
        .map(|ratio| ratio.min(Decimal::ONE).max(Decimal::ZERO))
}

/// Summaries using the default rounding policy and logger
pub fn compute_exclusion_summaries(
    accounts: &[SourceAccount],
    allocations: &[Allocation],
    basis_entities: &[BasisEntity],
    presets: &[Preset],
    period_id: Option<&str>,
    persisted_results: &[AllocationResult],
) -> BTreeMap<String, ExclusionSummary> {
    ExclusionSummaryComputer::new(AllocationEngine::default()).compute(
        accounts,
        allocations,
        basis_entities,
        presets,
        period_id,
        persisted_results,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AllocationTarget, PresetRow, ResultEntry, RoundingAdjustment};
    use rust_decimal_macros::dec;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingLogger {
        errors: RefCell<Vec<String>>,
        warnings: RefCell<Vec<String>>,
        debug_data: RefCell<Vec<serde_json::Value>>,
    }

    impl ErrorLogger for RecordingLogger {
        fn log_error(&self, error: &CoreError, context: &ErrorContext) {
            self.errors
                .borrow_mut()
                .push(format!("{}:{}", context.account_id.clone().unwrap_or_default(), error.code()));
        }

        fn log_warning(&self, message: &str, context: &ErrorContext) {
            self.warnings
                .borrow_mut()
                .push(format!("{}:{}", context.account_id.clone().unwrap_or_default(), message));
        }

        fn log_debug(&self, _message: &str, context: &ErrorContext) {
            self.debug_data.borrow_mut().push(context.data.clone());
        }
    }

    fn entities() -> Vec<BasisEntity> {
        vec![
            BasisEntity::new("east", dec!(1)),
            BasisEntity::new("west", dec!(1)),
            BasisEntity::new("north", dec!(2)).with_period_value("2024-02", dec!(0)),
        ]
    }

    fn allocation(account: &str) -> Allocation {
        Allocation {
            id: format!("alloc-{}", account),
            source_account_id: account.to_string(),
            targets: vec![
                AllocationTarget::metric("t1", "east", "7000"),
                AllocationTarget::metric("t2", "west", "7100"),
                AllocationTarget::metric("t3", "north", "7200").excluded(),
            ],
        }
    }

    #[test]
    fn test_live_exclusion_summary() {
        let accounts = vec![SourceAccount::new("6100", MappingType::Dynamic, dec!(1000))];
        let summaries =
            compute_exclusion_summaries(&accounts, &[allocation("6100")], &entities(), &[], None, &[]);

        let summary = &summaries["6100"];
        assert_eq!(summary.origin, ResultOrigin::Live);
        assert_eq!(summary.ratio, dec!(0.5));
        assert_eq!(summary.amount, dec!(500));
        assert_eq!(summary.percentage, dec!(50));
    }

    #[test]
    fn test_negative_balance_gives_negative_amount() {
        let accounts = vec![SourceAccount::new("6100", MappingType::Dynamic, dec!(-1000))];
        let summaries =
            compute_exclusion_summaries(&accounts, &[allocation("6100")], &entities(), &[], None, &[]);

        let summary = &summaries["6100"];
        assert_eq!(summary.amount, dec!(-500));
        assert_eq!(summary.ratio, dec!(0.5));
    }

    #[test]
    fn test_persisted_result_takes_precedence() {
        let accounts = vec![SourceAccount::new("6100", MappingType::Dynamic, dec!(200))];
        let persisted = vec![AllocationResult {
            allocation_id: "alloc-6100".to_string(),
            period_id: Some("2024-01".to_string()),
            source_value: dec!(200),
            entries: vec![
                ResultEntry {
                    target_id: "t1".to_string(),
                    value: dec!(150),
                    percentage: dec!(75),
                    is_exclusion: false,
                },
                ResultEntry {
                    target_id: "t3".to_string(),
                    value: dec!(49.99),
                    percentage: dec!(25),
                    is_exclusion: true,
                },
            ],
            adjustment: Some(RoundingAdjustment {
                target_id: "t3".to_string(),
                amount: dec!(0.01),
            }),
        }];

        let summaries = compute_exclusion_summaries(
            &accounts,
            &[allocation("6100")],
            &entities(),
            &[],
            Some("2024-01"),
            &persisted,
        );
        let summary = &summaries["6100"];
        assert_eq!(summary.origin, ResultOrigin::Persisted);
        assert_eq!(summary.ratio, dec!(0.25));
        assert_eq!(summary.amount, dec!(50));

        // A result for another period is ignored.
        let summaries = compute_exclusion_summaries(
            &accounts,
            &[allocation("6100")],
            &entities(),
            &[],
            Some("2024-03"),
            &persisted,
        );
        assert_eq!(summaries["6100"].origin, ResultOrigin::Live);
    }

    #[test]
    fn test_ratio_is_capped_at_one() {
        let accounts = vec![SourceAccount::new("6100", MappingType::Dynamic, dec!(100))];
        let persisted = vec![AllocationResult {
            allocation_id: "alloc-6100".to_string(),
            period_id: None,
            source_value: dec!(100),
            entries: vec![ResultEntry {
                target_id: "t3".to_string(),
                value: dec!(140),
                percentage: dec!(100),
                is_exclusion: true,
            }],
            adjustment: None,
        }];

        let summaries =
            compute_exclusion_summaries(&accounts, &[allocation("6100")], &entities(), &[], None, &persisted);
        assert_eq!(summaries["6100"].ratio, dec!(1));
        assert_eq!(summaries["6100"].amount, dec!(100));
    }

    #[test]
    fn test_accounts_without_exclusion_are_skipped() {
        let mut plain = allocation("6200");
        for target in &mut plain.targets {
            target.is_exclusion = false;
        }
        let accounts = vec![
            SourceAccount::new("6100", MappingType::Direct, dec!(100)),
            SourceAccount::new("6200", MappingType::Dynamic, dec!(100)),
            SourceAccount::new("6300", MappingType::Dynamic, dec!(100)),
        ];

        let summaries = compute_exclusion_summaries(
            &accounts,
            &[allocation("6100"), plain],
            &entities(),
            &[],
            None,
            &[],
        );
        assert!(summaries.is_empty());
    }

    #[test]
    fn test_unresolvable_ratio_is_absent_and_logged() {
        let accounts = vec![
            SourceAccount::new("6100", MappingType::Dynamic, dec!(100)),
            SourceAccount::new("6400", MappingType::Dynamic, dec!(0)),
        ];
        let all_zero = vec![
            BasisEntity::new("east", dec!(0)),
            BasisEntity::new("west", dec!(0)),
            BasisEntity::new("north", dec!(0)),
        ];
        let logger = RecordingLogger::default();
        let computer = ExclusionSummaryComputer::with_logger(AllocationEngine::default(), logger);

        let summaries = computer.compute(
            &accounts,
            &[allocation("6100"), allocation("6400")],
            &all_zero,
            &[],
            None,
            &[],
        );

        assert!(summaries.is_empty());
        assert_eq!(*computer.logger.errors.borrow(), vec!["6100:INVALID_BASIS".to_string()]);
        let debug_data = computer.logger.debug_data.borrow();
        assert_eq!(debug_data.len(), 2);
        assert_eq!(debug_data[0]["allocation_id"], "alloc-6100");
        assert_eq!(debug_data[0]["target_count"], 3);
    }

    #[test]
    fn test_stale_persisted_balance_is_warned() {
        let accounts = vec![SourceAccount::new("6100", MappingType::Dynamic, dec!(300))];
        let persisted = vec![AllocationResult {
            allocation_id: "alloc-6100".to_string(),
            period_id: None,
            source_value: dec!(200),
            entries: vec![ResultEntry {
                target_id: "t3".to_string(),
                value: dec!(50),
                percentage: dec!(25),
                is_exclusion: true,
            }],
            adjustment: None,
        }];
        let computer = ExclusionSummaryComputer::with_logger(AllocationEngine::default(), RecordingLogger::default());

        let summaries = computer.compute(&accounts, &[allocation("6100")], &entities(), &[], None, &persisted);

        assert_eq!(summaries["6100"].ratio, dec!(0.25));
        assert_eq!(summaries["6100"].amount, dec!(75));
        let warnings = computer.logger.warnings.borrow();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("6100:persisted result was computed from 200"));

        // Matching balances stay quiet.
        let computer = ExclusionSummaryComputer::with_logger(AllocationEngine::default(), RecordingLogger::default());
        let accounts = vec![SourceAccount::new("6100", MappingType::Dynamic, dec!(200))];
        computer.compute(&accounts, &[allocation("6100")], &entities(), &[], None, &persisted);
        assert!(computer.logger.warnings.borrow().is_empty());
    }

    #[test]
    fn test_rounding_cent_on_excluded_target() {
        let equal = vec![
            BasisEntity::new("east", dec!(1)),
            BasisEntity::new("west", dec!(1)),
            BasisEntity::new("north", dec!(1)),
        ];
        let allocation = Allocation {
            id: "alloc-6100".to_string(),
            source_account_id: "6100".to_string(),
            targets: vec![
                AllocationTarget::metric("t1", "east", "7000").excluded(),
                AllocationTarget::metric("t2", "west", "7100"),
                AllocationTarget::metric("t3", "north", "7200"),
            ],
        };
        let account = SourceAccount::new("6100", MappingType::Dynamic, dec!(-100));
        let accounts = vec![account.clone()];

        // The extra cent lands on t1, which is excluded.
        let live = compute_exclusion_summaries(&accounts, &[allocation.clone()], &equal, &[], None, &[]);
        let live = &live["6100"];
        assert_eq!(live.origin, ResultOrigin::Live);
        assert_eq!(live.amount, dec!(-33.34));
        assert_eq!(live.ratio, dec!(0.3334));
        assert_eq!(live.percentage, dec!(33.34));

        let lookup = BasisLookup::new(&equal, &[]);
        let snapshot = AllocationEngine::default()
            .snapshot(&allocation, &lookup, None, resolve_basis_value(Some(&account), None))
            .unwrap();
        assert_eq!(snapshot.excluded_total(), dec!(-33.34));

        let persisted =
            compute_exclusion_summaries(&accounts, &[allocation], &equal, &[], None, &[snapshot]);
        let persisted = &persisted["6100"];
        assert_eq!(persisted.origin, ResultOrigin::Persisted);
        assert_eq!(persisted.amount, live.amount);
        assert_eq!(persisted.ratio, live.ratio);
        assert_eq!(persisted.percentage, live.percentage);
    }

    #[test]
    fn test_period_values_drive_live_ratio() {
        let accounts = vec![
            SourceAccount::new("6100", MappingType::Dynamic, dec!(1000)).with_period_value("2024-02", dec!(300))
        ];
        let summaries = compute_exclusion_summaries(
            &accounts,
            &[allocation("6100")],
            &entities(),
            &[],
            Some("2024-02"),
            &[],
        );

        // north weighs zero in 2024-02, so nothing is excluded
        let summary = &summaries["6100"];
        assert_eq!(summary.ratio, dec!(0));
        assert_eq!(summary.amount, dec!(0));
    }

    #[test]
    fn test_preset_exclusion_target() {
        let presets = vec![Preset {
            id: "shared".to_string(),
            name: "Shared services".to_string(),
            rows: vec![
                PresetRow {
                    basis_entity_id: "east".to_string(),
                    target_id: "7300".to_string(),
                },
                PresetRow {
                    basis_entity_id: "west".to_string(),
                    target_id: "7400".to_string(),
                },
            ],
        }];
        let allocation = Allocation {
            id: "alloc-6100".to_string(),
            source_account_id: "6100".to_string(),
            targets: vec![
                AllocationTarget::metric("t1", "north", "7000"),
                AllocationTarget::preset("t2", "shared").excluded(),
            ],
        };
        let accounts = vec![SourceAccount::new("6100", MappingType::Dynamic, dec!(90))];

        let summaries = compute_exclusion_summaries(&accounts, &[allocation], &entities(), &presets, None, &[]);
        assert_eq!(summaries["6100"].ratio, dec!(0.5));
        assert_eq!(summaries["6100"].amount, dec!(45));
    }
}
