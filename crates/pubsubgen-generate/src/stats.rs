use pubsubgen_plan::Plan;
use serde::Serialize;

/// Achieved counts for one field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldStatistics {
    pub field: String,
    pub occurrences: u64,
    pub equalities: u64,
    pub averages: u64,
}

/// Counters for one generator run, or several merged together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    pub records: u64,
    pub fields: Vec<FieldStatistics>,
    pub sink_failures: u64,
    pub duration_ms: u64,
}

/// A counter that differs from its planned target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deviation {
    pub field: Option<String>,
    pub metric: &'static str,
    pub expected: u64,
    pub actual: u64,
}

impl RunStatistics {
    pub fn for_fields<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            fields: names
                .into_iter()
                .map(|name| FieldStatistics {
                    field: name.to_string(),
                    ..FieldStatistics::default()
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldStatistics> {
        self.fields.iter().find(|field| field.field == name)
    }

    /// Add another run's counters. Durations overlap, so the longest wins.
    pub fn merge(&mut self, other: &RunStatistics) {
        self.records += other.records;
        self.sink_failures += other.sink_failures;
        self.duration_ms = self.duration_ms.max(other.duration_ms);

        for theirs in &other.fields {
            match self.fields.iter_mut().find(|ours| ours.field == theirs.field) {
                Some(ours) => {
                    ours.occurrences += theirs.occurrences;
                    ours.equalities += theirs.equalities;
                    ours.averages += theirs.averages;
                }
                None => self.fields.push(theirs.clone()),
            }
        }
    }

    /// List every fixed target of `plan` that these counters miss.
    pub fn verify(&self, plan: &Plan) -> Vec<Deviation> {
        let mut deviations = Vec::new();

        if self.records != plan.records() {
            deviations.push(Deviation {
                field: None,
                metric: "records",
                expected: plan.records(),
                actual: self.records,
            });
        }

        for target in plan.fields() {
            let achieved = self.field(&target.field);
            let occurrences = achieved.map_or(0, |field| field.occurrences);
            let equalities = achieved.map_or(0, |field| field.equalities);

            if let Some(expected) = target.occurrence
                && expected != occurrences
            {
                deviations.push(Deviation {
                    field: Some(target.field.clone()),
                    metric: "occurrences",
                    expected,
                    actual: occurrences,
                });
            }
            if let Some(expected) = target.fixed_equality()
                && expected != equalities
            {
                deviations.push(Deviation {
                    field: Some(target.field.clone()),
                    metric: "equalities",
                    expected,
                    actual: equalities,
                });
            }
        }

        deviations
    }
}

#[cfg(test)]
mod tests {
    use pubsubgen_plan::{EqualityTarget, FieldTarget};

    use super::*;

    fn stats(records: u64, counts: &[(&str, u64, u64)]) -> RunStatistics {
        RunStatistics {
            records,
            fields: counts
                .iter()
                .map(|(field, occurrences, equalities)| FieldStatistics {
                    field: field.to_string(),
                    occurrences: *occurrences,
                    equalities: *equalities,
                    averages: 0,
                })
                .collect(),
            sink_failures: 0,
            duration_ms: 5,
        }
    }

    #[test]
    fn merge_sums_counters() {
        let mut total = stats(4, &[("city", 3, 1), ("wind", 1, 0)]);
        let mut other = stats(3, &[("city", 2, 2), ("wind", 1, 1)]);
        other.duration_ms = 9;
        total.merge(&other);

        assert_eq!(total.records, 7);
        assert_eq!(total.field("city").unwrap().occurrences, 5);
        assert_eq!(total.field("city").unwrap().equalities, 3);
        assert_eq!(total.duration_ms, 9);
    }

    #[test]
    fn verify_reports_missed_targets() {
        let plan = Plan::new(
            10,
            vec![
                FieldTarget::constrained("city", 7).with_equality(EqualityTarget::Fixed(3)),
                FieldTarget::constrained("wind", 3),
            ],
        );

        assert!(stats(10, &[("city", 7, 3), ("wind", 3, 0)]).verify(&plan).is_empty());

        let deviations = stats(9, &[("city", 6, 3), ("wind", 3, 1)]).verify(&plan);
        let metrics: Vec<_> = deviations.iter().map(|d| d.metric).collect();
        assert_eq!(metrics, ["records", "occurrences"]);
    }
}
