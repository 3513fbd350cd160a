use std::sync::Arc;
use std::time::Instant;

use pubsubgen_core::{Condition, Record, Schema, Subscription};
use pubsubgen_plan::Plan;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{CancelReason, GenerationError, Result};
use crate::generators::{FieldGenerator, FieldGenerators};
use crate::operators::{FieldProgress, choose_operator};
use crate::output::RecordSink;
use crate::stats::{FieldStatistics, RunStatistics};

/// What a sequential run does when the sink rejects a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SinkErrorPolicy {
    /// Stop the run and return the sink error.
    #[default]
    Abort,
    /// Log a warning, count the failure, and keep generating.
    LogAndContinue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscriptionOptions {
    /// Probability that a numeric condition carries `is_average`.
    pub average_rate: f64,
    pub sink_errors: SinkErrorPolicy,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            average_rate: 0.0,
            sink_errors: SinkErrorPolicy::Abort,
        }
    }
}

/// Counters owned by one generator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationState {
    pub occurrences: Vec<u64>,
    pub equalities: Vec<u64>,
    pub averages: Vec<u64>,
    /// Conditions emitted across all records.
    pub fields_assigned: u64,
    pub emitted: u64,
}

impl GenerationState {
    fn new(fields: usize) -> Self {
        Self {
            occurrences: vec![0; fields],
            equalities: vec![0; fields],
            averages: vec![0; fields],
            fields_assigned: 0,
            emitted: 0,
        }
    }
}

/// Sequential solver producing exactly `plan.records()` subscriptions whose
/// field and equality counts match the plan's targets.
#[derive(Debug)]
pub struct SubscriptionGenerator {
    plan: Plan,
    generators: Arc<FieldGenerators>,
    options: SubscriptionOptions,
    rng: ChaCha8Rng,
    state: GenerationState,
    worker: usize,
}

impl SubscriptionGenerator {
    pub fn new(schema: &Schema, plan: Plan, seed: u64, options: SubscriptionOptions) -> Result<Self> {
        let generators = Arc::new(FieldGenerators::from_schema(schema)?);
        Self::with_generators(generators, plan, seed, options)
    }

    /// Build a generator over prebuilt field generators. The plan must be
    /// index-aligned with them and feasible.
    pub fn with_generators(
        generators: Arc<FieldGenerators>,
        plan: Plan,
        seed: u64,
        options: SubscriptionOptions,
    ) -> Result<Self> {
        let aligned = plan.fields().len() == generators.len()
            && plan
                .fields()
                .iter()
                .zip(generators.names())
                .all(|(target, name)| target.field == name);
        if !aligned {
            return Err(GenerationError::configuration(
                "plan fields do not match the schema field order",
            ));
        }
        plan.check_feasible()?;
        if !(0.0..=1.0).contains(&options.average_rate) {
            return Err(GenerationError::configuration(format!(
                "average_rate must be within 0..=1, got {}",
                options.average_rate
            )));
        }

        let state = GenerationState::new(generators.len());
        Ok(Self {
            plan,
            generators,
            options,
            rng: ChaCha8Rng::seed_from_u64(seed),
            state,
            worker: 0,
        })
    }

    /// Tag log events with a worker index.
    pub fn with_worker(mut self, worker: usize) -> Self {
        self.worker = worker;
        self
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    pub fn remaining(&self) -> u64 {
        self.plan.records() - self.state.emitted
    }

    /// Produce the next subscription, or `None` once the plan is exhausted.
    pub fn next_subscription(&mut self) -> Option<Subscription> {
        if self.state.emitted >= self.plan.records() {
            return None;
        }

        let chosen = loop {
            let chosen = self.choose_fields();
            if !chosen.is_empty() {
                break chosen;
            }
        };

        let generators = Arc::clone(&self.generators);
        let mut subscription = Subscription::new();
        for index in chosen {
            if let Some(field) = generators.get(index) {
                subscription.push(self.condition(index, field));
            }
        }
        self.state.fields_assigned += subscription.len() as u64;
        self.state.emitted += 1;
        Some(subscription)
    }

    /// Decide which fields the next record carries, in schema order.
    fn choose_fields(&mut self) -> Vec<usize> {
        let remaining = self.remaining();
        let deficits: Vec<Option<i128>> = self
            .plan
            .fields()
            .iter()
            .zip(&self.state.occurrences)
            .map(|(target, current)| {
                target
                    .occurrence
                    .map(|occurrence| i128::from(occurrence) - i128::from(*current))
            })
            .collect();

        let mut include = vec![false; deficits.len()];
        let mut count = 0_usize;
        for (index, deficit) in deficits.iter().enumerate() {
            if *deficit == Some(i128::from(remaining)) {
                include[index] = true;
                count += 1;
            }
        }

        // With every field constrained, a record may only spend budget that
        // the later records do not need.
        let cap = if self.plan.all_constrained() {
            let total: i128 = deficits.iter().flatten().map(|d| (*d).max(0)).sum();
            let slack = total - i128::from(remaining);
            usize::try_from(slack + 1).unwrap_or(usize::MAX)
        } else {
            usize::MAX
        };

        for (index, deficit) in deficits.iter().enumerate() {
            if count >= cap {
                break;
            }
            if include[index] {
                continue;
            }
            let eligible = match deficit {
                None => true,
                Some(deficit) => *deficit > 0,
            };
            if eligible && self.rng.random_bool(0.5) {
                include[index] = true;
                count += 1;
            }
        }

        include
            .iter()
            .enumerate()
            .filter_map(|(index, included)| included.then_some(index))
            .collect()
    }

    fn condition(&mut self, index: usize, field: &FieldGenerator) -> Condition {
        let value = field.generator.generate(&mut self.rng);

        let progress = FieldProgress {
            occurrences: self.state.occurrences[index],
            equalities: self.state.equalities[index],
        };
        let operator = choose_operator(&self.plan.fields()[index], progress, &mut self.rng);
        let is_average = field.numeric
            && self.options.average_rate > 0.0
            && self.rng.random_bool(self.options.average_rate);

        self.state.occurrences[index] += 1;
        if operator.is_equality() {
            self.state.equalities[index] += 1;
        }
        if is_average {
            self.state.averages[index] += 1;
        }

        Condition {
            field: field.name.clone(),
            operator,
            value,
            is_average,
        }
    }

    /// Stream every remaining subscription into `sink`.
    ///
    /// The token is checked between records. The sink is not closed.
    pub fn run(&mut self, sink: &dyn RecordSink, cancel: &CancellationToken) -> Result<RunStatistics> {
        let started = Instant::now();
        let mut sink_failures = 0_u64;

        info!(
            worker = self.worker,
            records = self.plan.records(),
            all_constrained = self.plan.all_constrained(),
            "subscription generation started"
        );

        while self.state.emitted < self.plan.records() {
            if cancel.is_cancelled() {
                warn!(
                    worker = self.worker,
                    emitted = self.state.emitted,
                    "subscription generation cancelled"
                );
                return Err(GenerationError::Cancelled(CancelReason::Requested));
            }
            let Some(subscription) = self.next_subscription() else {
                break;
            };
            if let Err(err) = sink.append(&Record::Subscription(subscription)) {
                match self.options.sink_errors {
                    SinkErrorPolicy::Abort => return Err(err.into()),
                    SinkErrorPolicy::LogAndContinue => {
                        sink_failures += 1;
                        warn!(
                            worker = self.worker,
                            record = self.state.emitted,
                            error = %err,
                            "sink rejected subscription"
                        );
                    }
                }
            }
        }

        let mut stats = self.statistics();
        stats.sink_failures = sink_failures;
        stats.duration_ms = started.elapsed().as_millis() as u64;

        debug!(
            worker = self.worker,
            fields_assigned = self.state.fields_assigned,
            "subscription counters settled"
        );
        info!(
            worker = self.worker,
            records = stats.records,
            sink_failures,
            duration_ms = stats.duration_ms,
            "subscription generation finished"
        );

        Ok(stats)
    }

    /// Snapshot of the counters as run statistics.
    pub fn statistics(&self) -> RunStatistics {
        RunStatistics {
            records: self.state.emitted,
            fields: self
                .generators
                .names()
                .enumerate()
                .map(|(index, name)| FieldStatistics {
                    field: name.to_string(),
                    occurrences: self.state.occurrences[index],
                    equalities: self.state.equalities[index],
                    averages: self.state.averages[index],
                })
                .collect(),
            sink_failures: 0,
            duration_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use pubsubgen_plan::{EqualityTarget, FieldTarget};

    use super::*;
    use crate::output::MemorySink;

    fn two_field_schema() -> Schema {
        let mut schema = Schema::weather();
        schema
            .fields
            .retain(|field| field.name == "city" || field.name == "wind");
        schema
    }

    #[test]
    fn meets_exact_budget_without_empty_records() {
        let schema = two_field_schema();
        let plan = Plan::new(
            10,
            vec![
                FieldTarget::constrained("city", 7),
                FieldTarget::constrained("wind", 3),
            ],
        );
        for seed in 0..50 {
            let mut generator =
                SubscriptionGenerator::new(&schema, plan.clone(), seed, SubscriptionOptions::default())
                    .unwrap();
            let mut records = Vec::new();
            while let Some(subscription) = generator.next_subscription() {
                records.push(subscription);
            }
            assert_eq!(records.len(), 10);
            assert!(records.iter().all(|record| record.len() == 1));
            assert!(generator.statistics().verify(&plan).is_empty());
        }
    }

    #[test]
    fn rejects_infeasible_hand_built_plan() {
        let schema = two_field_schema();
        let plan = Plan::new(
            10,
            vec![
                FieldTarget::constrained("city", 5),
                FieldTarget::constrained("wind", 3),
            ],
        );
        let err = SubscriptionGenerator::new(&schema, plan, 1, SubscriptionOptions::default())
            .unwrap_err();
        assert!(matches!(err, GenerationError::Plan(_)));
    }

    #[test]
    fn rejects_misaligned_plan() {
        let schema = two_field_schema();
        let plan = Plan::new(
            10,
            vec![
                FieldTarget::constrained("wind", 3),
                FieldTarget::constrained("city", 7),
            ],
        );
        assert!(SubscriptionGenerator::new(&schema, plan, 1, SubscriptionOptions::default()).is_err());
    }

    #[test]
    fn average_flag_only_on_numeric_fields() {
        let schema = two_field_schema();
        let plan = Plan::new(
            50,
            vec![
                FieldTarget::constrained("city", 50),
                FieldTarget::constrained("wind", 50),
            ],
        );
        let options = SubscriptionOptions {
            average_rate: 1.0,
            ..SubscriptionOptions::default()
        };
        let mut generator = SubscriptionGenerator::new(&schema, plan, 3, options).unwrap();
        while let Some(subscription) = generator.next_subscription() {
            assert!(!subscription.condition("city").unwrap().is_average);
            assert!(subscription.condition("wind").unwrap().is_average);
        }
    }

    #[test]
    fn full_equality_share_uses_only_equal() {
        let schema = two_field_schema();
        let plan = Plan::new(
            10,
            vec![
                FieldTarget::constrained("city", 10).with_equality(EqualityTarget::Fixed(10)),
                FieldTarget::unconstrained("wind"),
            ],
        );
        let mut generator =
            SubscriptionGenerator::new(&schema, plan, 4, SubscriptionOptions::default()).unwrap();
        while let Some(subscription) = generator.next_subscription() {
            assert!(subscription.condition("city").unwrap().operator.is_equality());
        }
        assert_eq!(generator.state().equalities[0], 10);
    }

    #[test]
    fn log_and_continue_counts_sink_failures() {
        let schema = two_field_schema();
        let plan = Plan::new(
            5,
            vec![FieldTarget::constrained("city", 5), FieldTarget::unconstrained("wind")],
        );
        let sink = MemorySink::new();
        sink.close().unwrap();

        let options = SubscriptionOptions {
            sink_errors: SinkErrorPolicy::LogAndContinue,
            ..SubscriptionOptions::default()
        };
        let mut generator = SubscriptionGenerator::new(&schema, plan.clone(), 5, options).unwrap();
        let stats = generator.run(&sink, &CancellationToken::new()).unwrap();
        assert_eq!(stats.records, 5);
        assert_eq!(stats.sink_failures, 5);

        let mut aborting =
            SubscriptionGenerator::new(&schema, plan, 5, SubscriptionOptions::default()).unwrap();
        let err = aborting.run(&sink, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, GenerationError::Sink(_)));
    }

    #[test]
    fn stops_between_records_when_cancelled() {
        let schema = two_field_schema();
        let plan = Plan::new(
            5,
            vec![FieldTarget::unconstrained("city"), FieldTarget::unconstrained("wind")],
        );
        let token = CancellationToken::new();
        token.cancel();
        let sink = MemorySink::new();
        let mut generator =
            SubscriptionGenerator::new(&schema, plan, 6, SubscriptionOptions::default()).unwrap();
        let err = generator.run(&sink, &token).unwrap_err();
        assert!(err.is_cancelled());
        assert!(sink.is_empty());
    }
}
