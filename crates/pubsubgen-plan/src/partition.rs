use serde::Serialize;
use tracing::debug;

use crate::errors::{PlanError, Result};
use crate::model::{EqualityTarget, FieldTarget, Plan};

/// Split `total` into `parts` shares differing by at most one; the first
/// `total % parts` shares receive the extra unit.
pub fn split_evenly(total: u64, parts: usize) -> Vec<u64> {
    if parts == 0 {
        return Vec::new();
    }
    let parts_u64 = parts as u64;
    let chunk = total / parts_u64;
    let remainder = total % parts_u64;
    (0..parts_u64)
        .map(|index| chunk + u64::from(index < remainder))
        .collect()
}

/// Worker-local plans derived from one global plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionPlan {
    quotas: Vec<u64>,
    workers: Vec<Plan>,
}

impl PartitionPlan {
    pub fn quotas(&self) -> &[u64] {
        &self.quotas
    }

    pub fn workers(&self) -> &[Plan] {
        &self.workers
    }

    pub fn into_workers(self) -> Vec<Plan> {
        self.workers
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

/// Splits a plan across a fixed number of workers.
#[derive(Debug, Clone, Copy)]
pub struct PartitionPlanner {
    workers: usize,
}

impl PartitionPlanner {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(PlanError::Configuration(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(Self { workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fan `plan` out into independent worker plans whose union reproduces
    /// the global occurrence and equality targets.
    pub fn partition(&self, plan: &Plan) -> Result<PartitionPlan> {
        let quotas = split_evenly(plan.records(), self.workers);

        // targets[worker][field]
        let mut targets: Vec<Vec<Option<u64>>> = vec![Vec::new(); self.workers];
        for field in plan.fields() {
            match field.occurrence {
                Some(total) => {
                    for (worker, share) in split_evenly(total, self.workers).into_iter().enumerate()
                    {
                        targets[worker].push(Some(share));
                    }
                }
                None => targets.iter_mut().for_each(|row| row.push(None)),
            }
        }

        if plan.all_constrained() {
            redistribute(&quotas, &mut targets)?;
        }

        let equality = split_equality(plan, &targets)?;

        let workers = (0..self.workers)
            .map(|worker| {
                let fields = plan
                    .fields()
                    .iter()
                    .enumerate()
                    .map(|(index, global)| FieldTarget {
                        field: global.field.clone(),
                        occurrence: targets[worker][index],
                        equality: equality[worker][index],
                    })
                    .collect();
                Plan::new(quotas[worker], fields)
            })
            .collect();

        Ok(PartitionPlan { quotas, workers })
    }
}

fn field_sum(row: &[Option<u64>]) -> u64 {
    row.iter().flatten().sum()
}

/// Move field slots from workers holding more than their quota to workers
/// holding less, until every worker can fill each of its records.
fn redistribute(quotas: &[u64], targets: &mut [Vec<Option<u64>>]) -> Result<()> {
    let mut sums: Vec<u64> = targets.iter().map(|row| field_sum(row)).collect();

    let needy: Vec<usize> = (0..quotas.len()).filter(|&i| sums[i] < quotas[i]).collect();
    let donors: Vec<usize> = (0..quotas.len()).filter(|&i| sums[i] > quotas[i]).collect();

    for &recipient in &needy {
        let mut needed = quotas[recipient] - sums[recipient];

        for &donor in &donors {
            if needed == 0 {
                break;
            }
            let mut excess = sums[donor].saturating_sub(quotas[donor]);
            if excess == 0 {
                continue;
            }

            for field in 0..targets[donor].len() {
                let Some(count) = targets[donor][field] else {
                    continue;
                };
                if count == 0 {
                    continue;
                }

                let moved = count.min(excess).min(needed);
                targets[donor][field] = Some(count - moved);
                let slot = &mut targets[recipient][field];
                *slot = Some(slot.unwrap_or(0) + moved);

                sums[donor] -= moved;
                sums[recipient] += moved;
                needed -= moved;
                excess -= moved;

                debug!(donor, recipient, field, moved, "field slots redistributed");

                if needed == 0 || excess == 0 {
                    break;
                }
            }
        }

        if needed > 0 {
            return Err(PlanError::Distribution {
                worker: recipient,
                missing: needed,
            });
        }
    }

    Ok(())
}

/// Deal each fixed equality target out in rounds of `ceil(remaining / W)`,
/// never giving a worker more than its own occurrence target.
fn split_equality(plan: &Plan, targets: &[Vec<Option<u64>>]) -> Result<Vec<Vec<EqualityTarget>>> {
    let workers = targets.len();
    let mut equality = vec![Vec::with_capacity(plan.fields().len()); workers];

    for (index, field) in plan.fields().iter().enumerate() {
        let total = match field.equality {
            EqualityTarget::Fixed(total) => total,
            other => {
                equality.iter_mut().for_each(|row| row.push(other));
                continue;
            }
        };

        let mut assigned = vec![0_u64; workers];
        let mut remaining = total;
        while remaining > 0 {
            let round = remaining.div_ceil(workers as u64);
            let before = remaining;
            for worker in 0..workers {
                let capacity = targets[worker][index]
                    .unwrap_or(0)
                    .saturating_sub(assigned[worker]);
                let share = round.min(capacity).min(remaining);
                assigned[worker] += share;
                remaining -= share;
            }
            if remaining == before {
                return Err(PlanError::EqualitySplit {
                    field: field.field.clone(),
                    missing: remaining,
                });
            }
        }

        for (worker, count) in assigned.into_iter().enumerate() {
            equality[worker].push(EqualityTarget::Fixed(count));
        }
    }

    Ok(equality)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(records: u64, targets: &[(&str, Option<u64>)]) -> Plan {
        Plan::new(
            records,
            targets
                .iter()
                .map(|(name, occurrence)| FieldTarget {
                    field: name.to_string(),
                    occurrence: *occurrence,
                    equality: EqualityTarget::None,
                })
                .collect(),
        )
    }

    fn occurrences(plan: &Plan) -> Vec<Option<u64>> {
        plan.fields().iter().map(|field| field.occurrence).collect()
    }

    #[test]
    fn splits_quotas_with_leading_remainder() {
        assert_eq!(split_evenly(10, 3), [4, 3, 3]);
        assert_eq!(split_evenly(7, 3), [3, 2, 2]);
        assert_eq!(split_evenly(2, 4), [1, 1, 0, 0]);
        assert!(split_evenly(5, 0).is_empty());
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(matches!(
            PartitionPlanner::new(0),
            Err(PlanError::Configuration(_))
        ));
    }

    #[test]
    fn aligned_split_needs_no_redistribution() {
        let global = plan(10, &[("city", Some(7)), ("wind", Some(3))]);
        let partition = PartitionPlanner::new(3).unwrap().partition(&global).unwrap();

        assert_eq!(partition.quotas(), [4, 3, 3]);
        assert_eq!(occurrences(&partition.workers()[0]), [Some(3), Some(1)]);
        assert_eq!(occurrences(&partition.workers()[1]), [Some(2), Some(1)]);
        assert_eq!(occurrences(&partition.workers()[2]), [Some(2), Some(1)]);
    }

    #[test]
    fn redistribution_closes_remainder_misalignment() {
        // a: 2/2/1, b: 2/2/1 -> sums 4/4/2 against quotas 4/3/3
        let global = plan(10, &[("a", Some(5)), ("b", Some(5))]);
        let partition = PartitionPlanner::new(3).unwrap().partition(&global).unwrap();

        for (worker, quota) in partition.workers().iter().zip(partition.quotas()) {
            assert!(worker.total_field_budget() >= *quota);
            assert!(worker.check_feasible().is_ok());
        }
        assert_eq!(occurrences(&partition.workers()[1]), [Some(1), Some(2)]);
        assert_eq!(occurrences(&partition.workers()[2]), [Some(2), Some(1)]);

        for field in 0..2 {
            let total: u64 = partition
                .workers()
                .iter()
                .filter_map(|worker| worker.fields()[field].occurrence)
                .sum();
            assert_eq!(total, 5);
        }
    }

    #[test]
    fn unclosable_deficit_is_a_distribution_error() {
        let global = plan(10, &[("a", Some(4)), ("b", Some(4))]);
        let err = PartitionPlanner::new(2).unwrap().partition(&global).unwrap_err();
        assert!(matches!(
            err,
            PlanError::Distribution {
                worker: 0,
                missing: 1
            }
        ));
    }

    #[test]
    fn unconstrained_plans_skip_redistribution() {
        let global = plan(10, &[("a", Some(5)), ("b", None)]);
        let partition = PartitionPlanner::new(3).unwrap().partition(&global).unwrap();
        assert!(!partition.workers()[2].all_constrained());
        assert_eq!(occurrences(&partition.workers()[2]), [Some(1), None]);
    }

    #[test]
    fn equality_never_exceeds_worker_occurrences() {
        let global = Plan::new(
            10,
            vec![
                FieldTarget::constrained("a", 7).with_equality(EqualityTarget::Fixed(6)),
                FieldTarget::constrained("b", 5).with_equality(EqualityTarget::Live(40.0)),
            ],
        );
        let partition = PartitionPlanner::new(3).unwrap().partition(&global).unwrap();

        let mut total = 0;
        for worker in partition.workers() {
            let field = &worker.fields()[0];
            let equality = field.fixed_equality().expect("fixed equality");
            assert!(equality <= field.occurrence.unwrap());
            total += equality;
            assert_eq!(worker.fields()[1].equality, EqualityTarget::Live(40.0));
        }
        assert_eq!(total, 6);
    }

    #[test]
    fn more_workers_than_records_yields_empty_workers() {
        let global = plan(2, &[("a", Some(2))]);
        let partition = PartitionPlanner::new(4).unwrap().partition(&global).unwrap();
        assert_eq!(partition.quotas(), [1, 1, 0, 0]);
        assert_eq!(occurrences(&partition.workers()[3]), [Some(0)]);
    }
}
