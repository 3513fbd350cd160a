use std::collections::BTreeMap;

use pubsubgen_core::Schema;
use tracing::debug;

use crate::errors::{PlanError, Result};
use crate::model::{EqualityTarget, FieldTarget, Plan};

const PERCENT_EPSILON: f64 = 1e-9;

/// `round_half_up(percentage * base / 100)`, the single rounding policy used
/// for every percentage-to-count conversion.
pub fn percent_of(percentage: f64, base: u64) -> u64 {
    let exact = percentage * base as f64 / 100.0;
    (exact + 0.5 + PERCENT_EPSILON).floor() as u64
}

/// Turns requested percentages into an exact, feasibility-checked [`Plan`].
#[derive(Debug, Clone, Copy)]
pub struct FrequencyPlanner<'a> {
    schema: &'a Schema,
}

impl<'a> FrequencyPlanner<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Resolve occurrence and equality percentages for `records` records.
    ///
    /// `occurrence` maps field name to the share of records that must carry
    /// the field; `equality` maps field name to the share of that field's own
    /// occurrences that must use `=`. Missing entries are unconstrained.
    pub fn plan(
        &self,
        records: u64,
        occurrence: &BTreeMap<String, f64>,
        equality: &BTreeMap<String, f64>,
    ) -> Result<Plan> {
        if records == 0 {
            return Err(PlanError::Configuration(
                "record count must be at least 1".to_string(),
            ));
        }
        check_percentages(self.schema, occurrence, "occurrence")?;
        check_percentages(self.schema, equality, "equality")?;

        let mut targets: Vec<Option<u64>> = self
            .schema
            .names()
            .map(|name| occurrence.get(name).map(|pct| percent_of(*pct, records)))
            .collect();

        let requested: f64 = occurrence.values().sum();
        if (requested - 100.0).abs() < PERCENT_EPSILON {
            reconcile_remainder(&mut targets, records);
        }

        let fields: Vec<FieldTarget> = self
            .schema
            .names()
            .zip(&targets)
            .map(|(name, target)| {
                let equality = match (target, equality.get(name)) {
                    (Some(count), Some(pct)) => EqualityTarget::Fixed(percent_of(*pct, *count)),
                    (None, Some(pct)) => EqualityTarget::Live(*pct),
                    (_, None) => EqualityTarget::None,
                };
                FieldTarget {
                    field: name.to_string(),
                    occurrence: *target,
                    equality,
                }
            })
            .collect();

        let plan = Plan::new(records, fields);
        plan.check_feasible()?;

        debug!(
            records,
            all_constrained = plan.all_constrained(),
            total_field_budget = plan.total_field_budget(),
            "frequency plan resolved"
        );

        Ok(plan)
    }
}

fn check_percentages(
    schema: &Schema,
    percentages: &BTreeMap<String, f64>,
    kind: &str,
) -> Result<()> {
    for (name, pct) in percentages {
        if schema.position(name).is_none() {
            return Err(PlanError::Configuration(format!(
                "{kind} percentage given for unknown field '{name}'"
            )));
        }
        if !pct.is_finite() || !(0.0..=100.0).contains(pct) {
            return Err(PlanError::Configuration(format!(
                "{kind} percentage for '{name}' must be within 0..=100, got {pct}"
            )));
        }
    }
    Ok(())
}

/// Percentages summing to exactly 100 must account for exactly `records`
/// slots; rounding drift is settled one unit at a time in schema order.
fn reconcile_remainder(targets: &mut [Option<u64>], records: u64) {
    let mut total: u64 = targets.iter().flatten().sum();

    while total < records {
        let before = total;
        for target in targets.iter_mut().flatten() {
            if total == records {
                break;
            }
            if *target < records {
                *target += 1;
                total += 1;
            }
        }
        if total == before {
            break;
        }
    }

    while total > records {
        let before = total;
        for target in targets.iter_mut().flatten() {
            if total == records {
                break;
            }
            if *target > 0 {
                *target -= 1;
                total -= 1;
            }
        }
        if total == before {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use pubsubgen_core::{DomainSpec, FieldSpec};

    use super::*;

    fn schema(names: &[&str]) -> Schema {
        Schema::new(
            names
                .iter()
                .map(|name| FieldSpec::new(*name, DomainSpec::IntRange { min: 0, max: 9 }))
                .collect(),
        )
    }

    fn pcts(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries
            .iter()
            .map(|(name, pct)| (name.to_string(), *pct))
            .collect()
    }

    #[test]
    fn rounds_half_up() {
        assert_eq!(percent_of(50.0, 3), 2);
        assert_eq!(percent_of(70.0, 10), 7);
        assert_eq!(percent_of(14.0, 10), 1);
        assert_eq!(percent_of(100.0, 7), 7);
        assert_eq!(percent_of(0.0, 7), 0);
    }

    #[test]
    fn resolves_city_and_wind_targets() {
        let schema = schema(&["city", "wind"]);
        let plan = FrequencyPlanner::new(&schema)
            .plan(10, &pcts(&[("city", 70.0), ("wind", 30.0)]), &BTreeMap::new())
            .expect("feasible plan");

        assert_eq!(plan.fields()[0].occurrence, Some(7));
        assert_eq!(plan.fields()[1].occurrence, Some(3));
        assert!(plan.all_constrained());
        assert_eq!(plan.total_field_budget(), 10);
    }

    #[test]
    fn rejects_budget_below_record_count() {
        let schema = schema(&["a", "b"]);
        let err = FrequencyPlanner::new(&schema)
            .plan(10, &pcts(&[("a", 50.0), ("b", 30.0)]), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, PlanError::Configuration(_)));
    }

    #[test]
    fn reconciles_rounding_when_percentages_sum_to_100() {
        let schema = schema(&["a", "b", "c"]);
        let planner = FrequencyPlanner::new(&schema);

        let under = planner
            .plan(
                10,
                &pcts(&[("a", 33.3), ("b", 33.3), ("c", 33.4)]),
                &BTreeMap::new(),
            )
            .expect("plan");
        let targets: Vec<_> = under.fields().iter().map(|f| f.occurrence).collect();
        assert_eq!(targets, [Some(4), Some(3), Some(3)]);

        let over = planner
            .plan(3, &pcts(&[("a", 50.0), ("b", 50.0)]), &BTreeMap::new())
            .expect("plan");
        let targets: Vec<_> = over.fields().iter().map(|f| f.occurrence).collect();
        assert_eq!(targets, [Some(1), Some(2), None]);
    }

    #[test]
    fn equality_targets_are_relative_to_occurrences() {
        let schema = schema(&["a", "b"]);
        let plan = FrequencyPlanner::new(&schema)
            .plan(
                10,
                &pcts(&[("a", 80.0)]),
                &pcts(&[("a", 50.0), ("b", 25.0)]),
            )
            .expect("plan");

        assert_eq!(plan.fields()[0].equality, EqualityTarget::Fixed(4));
        assert_eq!(plan.fields()[1].equality, EqualityTarget::Live(25.0));
        assert!(!plan.all_constrained());
    }

    #[test]
    fn rejects_unknown_fields_and_out_of_range_values() {
        let schema = schema(&["a"]);
        let planner = FrequencyPlanner::new(&schema);
        assert!(
            planner
                .plan(10, &pcts(&[("zzz", 10.0)]), &BTreeMap::new())
                .is_err()
        );
        assert!(
            planner
                .plan(10, &pcts(&[("a", 120.0)]), &BTreeMap::new())
                .is_err()
        );
        assert!(
            planner
                .plan(10, &BTreeMap::new(), &pcts(&[("a", -1.0)]))
                .is_err()
        );
        assert!(planner.plan(0, &BTreeMap::new(), &BTreeMap::new()).is_err());
    }

    #[test]
    fn planning_is_pure() {
        let schema = Schema::weather();
        let occurrence = pcts(&[("city", 70.0), ("wind", 30.0), ("temp", 50.0)]);
        let equality = pcts(&[("city", 50.0), ("date", 20.0)]);
        let planner = FrequencyPlanner::new(&schema);
        assert_eq!(
            planner.plan(1000, &occurrence, &equality).unwrap(),
            planner.plan(1000, &occurrence, &equality).unwrap()
        );
    }
}
