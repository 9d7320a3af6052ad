//! Basis value resolution
//!
//! Turns stored entities into the plain decimal weights the engines
//! consume. This is the only place that interprets per-period values.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use crate::models::{Allocation, AllocationTarget, BasisEntity, Preset, SourceAccount, TargetKind};
use crate::rounding::checked_total;

/// Anything carrying a default value and optional per-period values
pub trait PeriodValued {
    fn default_value(&self) -> Decimal;
    fn values_by_period(&self) -> Option<&BTreeMap<String, Decimal>>;
}

impl PeriodValued for BasisEntity {
    fn default_value(&self) -> Decimal {
        self.default_value
    }

    fn values_by_period(&self) -> Option<&BTreeMap<String, Decimal>> {
        self.values_by_period.as_ref()
    }
}

impl PeriodValued for SourceAccount {
    fn default_value(&self) -> Decimal {
        self.default_value
    }

    fn values_by_period(&self) -> Option<&BTreeMap<String, Decimal>> {
        self.values_by_period.as_ref()
    }
}

/// Value for `period_id` if recorded, else the default; an absent entity is 0.
///
/// There is no cross-period fallback: an unmatched period resolves to the
/// default so entities without period detail still participate.
pub fn resolve_basis_value<E: PeriodValued + ?Sized>(entity: Option<&E>, period_id: Option<&str>) -> Decimal {
    let Some(entity) = entity else {
        return Decimal::ZERO;
    };

    period_id
        .and_then(|period| entity.values_by_period().and_then(|values| values.get(period)))
        .copied()
        .unwrap_or_else(|| entity.default_value())
}

/// Id-indexed view over the caller's basis entities and presets
pub struct BasisLookup<'a> {
    entities: HashMap<&'a str, &'a BasisEntity>,
    presets: HashMap<&'a str, &'a Preset>,
}

impl<'a> BasisLookup<'a> {
    pub fn new(entities: &'a [BasisEntity], presets: &'a [Preset]) -> Self {
        Self {
            entities: entities.iter().map(|e| (e.id.as_str(), e)).collect(),
            presets: presets.iter().map(|p| (p.id.as_str(), p)).collect(),
        }
    }

    pub fn entity(&self, id: &str) -> Option<&'a BasisEntity> {
        self.entities.get(id).copied()
    }

    pub fn preset(&self, id: &str) -> Option<&'a Preset> {
        self.presets.get(id).copied()
    }

    /// Resolved value of one basis entity
    pub fn value(&self, basis_entity_id: &str, period_id: Option<&str>) -> Decimal {
        resolve_basis_value(self.entity(basis_entity_id), period_id)
    }

    /// Weight of one target: the metric's value, or the sum of a preset's
    /// row values. Missing or empty presets weigh zero.
    pub fn target_weight(&self, target: &AllocationTarget, period_id: Option<&str>) -> Option<Decimal> {
        match &target.kind {
            TargetKind::Metric { basis_entity_id, .. } => Some(self.value(basis_entity_id, period_id)),
            TargetKind::Preset { preset_id } => {
                let Some(preset) = self.preset(preset_id) else {
                    log::debug!("preset {} not found; weighing target {} as zero", preset_id, target.id);
                    return Some(Decimal::ZERO);
                };
                let values: Vec<Decimal> = preset
                    .rows
                    .iter()
                    .map(|row| self.value(&row.basis_entity_id, period_id))
                    .collect();
                checked_total(&values)
            }
        }
    }

    /// Weights for every target of an allocation, in target order.
    /// `None` when a preset total overflows.
    pub fn allocation_weights(&self, allocation: &Allocation, period_id: Option<&str>) -> Option<Vec<Decimal>> {
        allocation
            .targets
            .iter()
            .map(|target| self.target_weight(target, period_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PresetRow;
    use crate::types::MappingType;
    use rust_decimal_macros::dec;

    #[test]
    fn test_resolve_period_value() {
        let entity = BasisEntity::new("miles", dec!(100)).with_period_value("2024-01", dec!(40));

        assert_eq!(resolve_basis_value(Some(&entity), Some("2024-01")), dec!(40));
        assert_eq!(resolve_basis_value(Some(&entity), None), dec!(100));
    }

    #[test]
    fn test_unmatched_period_falls_back_to_default() {
        let entity = BasisEntity::new("miles", dec!(100)).with_period_value("2024-01", dec!(40));
        assert_eq!(resolve_basis_value(Some(&entity), Some("2024-02")), dec!(100));

        let flat = BasisEntity::new("headcount", dec!(12));
        assert_eq!(resolve_basis_value(Some(&flat), Some("2024-02")), dec!(12));
    }

    #[test]
    fn test_absent_entity_is_zero() {
        assert_eq!(resolve_basis_value::<BasisEntity>(None, Some("2024-01")), dec!(0));
    }

    #[test]
    fn test_source_account_resolves_balance() {
        let account = SourceAccount::new("6100", MappingType::Dynamic, dec!(-250))
            .with_period_value("2024-06", dec!(-75.5));
        assert_eq!(resolve_basis_value(Some(&account), Some("2024-06")), dec!(-75.5));
        assert_eq!(resolve_basis_value(Some(&account), Some("2024-07")), dec!(-250));
    }

    #[test]
    fn test_target_weights() {
        let entities = vec![
            BasisEntity::new("east", dec!(10)),
            BasisEntity::new("west", dec!(30)).with_period_value("q1", dec!(5)),
        ];
        let presets = vec![
            Preset {
                id: "both".to_string(),
                name: "Both regions".to_string(),
                rows: vec![
                    PresetRow {
                        basis_entity_id: "east".to_string(),
                        target_id: "7000".to_string(),
                    },
                    PresetRow {
                        basis_entity_id: "west".to_string(),
                        target_id: "7100".to_string(),
                    },
                ],
            },
            Preset {
                id: "empty".to_string(),
                name: String::new(),
                rows: vec![],
            },
        ];
        let lookup = BasisLookup::new(&entities, &presets);
        let allocation = Allocation {
            id: "a".to_string(),
            source_account_id: "6100".to_string(),
            targets: vec![
                AllocationTarget::metric("t1", "east", "7000"),
                AllocationTarget::preset("t2", "both"),
                AllocationTarget::preset("t3", "empty"),
                AllocationTarget::preset("t4", "missing"),
                AllocationTarget::metric("t5", "unknown", "7200"),
            ],
        };

        assert_eq!(
            lookup.allocation_weights(&allocation, Some("q1")).unwrap(),
            vec![dec!(10), dec!(15), dec!(0), dec!(0), dec!(0)]
        );
        assert_eq!(
            lookup.allocation_weights(&allocation, None).unwrap(),
            vec![dec!(10), dec!(40), dec!(0), dec!(0), dec!(0)]
        );
    }
}
