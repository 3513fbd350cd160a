use pubsubgen_core::Schema;
use serde::Serialize;

use crate::errors::{PlanError, Result};

/// Equality-operator requirement for one field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EqualityTarget {
    /// No requirement; operators are drawn uniformly.
    None,
    /// Exact number of occurrences that must use `=`.
    Fixed(u64),
    /// Percentage applied to the field's occurrences so far
    /// (the field has no occurrence target to derive a fixed count from).
    Live(f64),
}

/// Resolved targets for one schema field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldTarget {
    pub field: String,
    /// Required number of records carrying the field; `None` = unconstrained.
    pub occurrence: Option<u64>,
    pub equality: EqualityTarget,
}

impl FieldTarget {
    pub fn unconstrained(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            occurrence: None,
            equality: EqualityTarget::None,
        }
    }

    pub fn constrained(field: impl Into<String>, occurrence: u64) -> Self {
        Self {
            field: field.into(),
            occurrence: Some(occurrence),
            equality: EqualityTarget::None,
        }
    }

    pub fn with_equality(mut self, equality: EqualityTarget) -> Self {
        self.equality = equality;
        self
    }

    pub fn fixed_equality(&self) -> Option<u64> {
        match self.equality {
            EqualityTarget::Fixed(count) => Some(count),
            _ => None,
        }
    }
}

/// Immutable numeric targets for generating `records` subscriptions.
///
/// Field targets are index-aligned with the schema they were planned for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    records: u64,
    fields: Vec<FieldTarget>,
    all_constrained: bool,
    total_field_budget: u64,
}

impl Plan {
    /// Build a plan from explicit targets. Derived flags are computed here;
    /// feasibility is checked separately by [`Plan::check_feasible`].
    pub fn new(records: u64, fields: Vec<FieldTarget>) -> Self {
        let all_constrained = fields.iter().all(|field| field.occurrence.is_some());
        let total_field_budget = fields.iter().filter_map(|field| field.occurrence).sum();
        Self {
            records,
            fields,
            all_constrained,
            total_field_budget,
        }
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn fields(&self) -> &[FieldTarget] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&FieldTarget> {
        self.fields.get(index)
    }

    /// True when every field has an occurrence target.
    pub fn all_constrained(&self) -> bool {
        self.all_constrained
    }

    /// Sum of all occurrence targets.
    pub fn total_field_budget(&self) -> u64 {
        self.total_field_budget
    }

    /// Reject plans whose targets cannot be met without an empty record.
    pub fn check_feasible(&self) -> Result<()> {
        for target in &self.fields {
            let Some(occurrence) = target.occurrence else {
                if target.fixed_equality().is_some() {
                    return Err(PlanError::Configuration(format!(
                        "field '{}' has a fixed equality target but no occurrence target",
                        target.field
                    )));
                }
                continue;
            };
            if occurrence > self.records {
                return Err(PlanError::Configuration(format!(
                    "field '{}' needs {occurrence} occurrences in {} records",
                    target.field, self.records
                )));
            }
            if let Some(equality) = target.fixed_equality()
                && equality > occurrence
            {
                return Err(PlanError::Configuration(format!(
                    "field '{}' needs {equality} equality operators but only {occurrence} occurrences",
                    target.field
                )));
            }
        }

        if self.all_constrained && self.total_field_budget < self.records {
            return Err(PlanError::Configuration(format!(
                "occurrence targets provide {} field slots for {} records; every record needs at least one",
                self.total_field_budget, self.records
            )));
        }

        Ok(())
    }

    /// Ensure the plan was built for this schema (same fields, same order).
    pub fn check_schema(&self, schema: &Schema) -> Result<()> {
        let aligned = self.fields.len() == schema.len()
            && self
                .fields
                .iter()
                .zip(schema.names())
                .all(|(target, name)| target.field == name);
        if aligned {
            Ok(())
        } else {
            Err(PlanError::Configuration(
                "plan fields do not match the schema field order".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_budget_and_constraint_flag() {
        let plan = Plan::new(
            10,
            vec![
                FieldTarget::constrained("city", 7),
                FieldTarget::constrained("wind", 3),
            ],
        );
        assert!(plan.all_constrained());
        assert_eq!(plan.total_field_budget(), 10);
        assert!(plan.check_feasible().is_ok());

        let partial = Plan::new(
            10,
            vec![
                FieldTarget::constrained("city", 7),
                FieldTarget::unconstrained("wind"),
            ],
        );
        assert!(!partial.all_constrained());
        assert_eq!(partial.total_field_budget(), 7);
    }

    #[test]
    fn rejects_hand_built_infeasible_plans() {
        let short = Plan::new(
            10,
            vec![
                FieldTarget::constrained("a", 5),
                FieldTarget::constrained("b", 3),
            ],
        );
        assert!(matches!(
            short.check_feasible(),
            Err(PlanError::Configuration(_))
        ));

        let overfull = Plan::new(2, vec![FieldTarget::constrained("a", 3)]);
        assert!(overfull.check_feasible().is_err());

        let equality = Plan::new(
            4,
            vec![FieldTarget::constrained("a", 4).with_equality(EqualityTarget::Fixed(5))],
        );
        assert!(equality.check_feasible().is_err());

        let orphan = Plan::new(
            4,
            vec![FieldTarget::unconstrained("a").with_equality(EqualityTarget::Fixed(1))],
        );
        assert!(orphan.check_feasible().is_err());
    }
}
