use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pubsubgen_core::Schema;
use pubsubgen_plan::{PartitionPlanner, Plan, split_evenly};
use serde::Serialize;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{CancelReason, GenerationError, Result};
use crate::generators::FieldGenerators;
use crate::output::RecordSink;
use crate::publications::PublicationGenerator;
use crate::stats::RunStatistics;
use crate::subscriptions::{SinkErrorPolicy, SubscriptionGenerator, SubscriptionOptions};

/// A generator the coordinator can run on a blocking worker thread.
pub trait RecordProducer: Send + 'static {
    fn produce(
        &mut self,
        sink: &dyn RecordSink,
        cancel: &CancellationToken,
    ) -> Result<RunStatistics>;
}

impl RecordProducer for SubscriptionGenerator {
    fn produce(
        &mut self,
        sink: &dyn RecordSink,
        cancel: &CancellationToken,
    ) -> Result<RunStatistics> {
        self.run(sink, cancel)
    }
}

impl RecordProducer for PublicationGenerator {
    fn produce(
        &mut self,
        sink: &dyn RecordSink,
        cancel: &CancellationToken,
    ) -> Result<RunStatistics> {
        self.run(sink, cancel)
    }
}

/// Per-worker and merged statistics of a parallel run.
#[derive(Debug, Clone, Serialize)]
pub struct ParallelReport {
    pub base_seed: u64,
    pub workers: Vec<RunStatistics>,
    pub total: RunStatistics,
}

/// Derive a distinct seed for each worker from one base seed.
pub fn derive_seed(base: u64, worker: usize) -> u64 {
    // splitmix64 finalizer over an odd-stride offset; injective in `worker`.
    let stride = (worker as u64).wrapping_add(1);
    let mut z = base.wrapping_add(stride.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Runs a fixed pool of generators against one shared sink.
///
/// Workers share a cancellation token that is checked between records. The
/// first worker failure or the timeout cancels the whole pool; the sink is
/// closed exactly once after every worker has stopped.
#[derive(Debug, Clone)]
pub struct ParallelCoordinator {
    workers: usize,
    timeout: Duration,
    base_seed: u64,
}

impl ParallelCoordinator {
    pub fn new(workers: usize, timeout: Duration, seed: Option<u64>) -> Result<Self> {
        if workers == 0 {
            return Err(GenerationError::configuration(
                "worker count must be at least 1",
            ));
        }
        let base_seed = match seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random();
                info!(base_seed = seed, "no seed given; drew a random base seed");
                seed
            }
        };
        Ok(Self {
            workers,
            timeout,
            base_seed,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    pub fn worker_seed(&self, worker: usize) -> u64 {
        derive_seed(self.base_seed, worker)
    }

    /// Partition `plan`, build one subscription generator per worker, and run
    /// them. Planning or construction errors abort before any worker starts.
    ///
    /// Workers always abort on sink errors; `options.sink_errors` only applies
    /// to sequential runs.
    pub async fn run_subscriptions(
        &self,
        schema: &Schema,
        plan: &Plan,
        options: SubscriptionOptions,
        sink: Arc<dyn RecordSink>,
    ) -> Result<ParallelReport> {
        let producers = match self.subscription_workers(schema, plan, options) {
            Ok(producers) => producers,
            Err(err) => return Err(close_unstarted(sink.as_ref(), err)),
        };
        self.run(producers, sink).await
    }

    fn subscription_workers(
        &self,
        schema: &Schema,
        plan: &Plan,
        options: SubscriptionOptions,
    ) -> Result<Vec<SubscriptionGenerator>> {
        let partition = PartitionPlanner::new(self.workers)?.partition(plan)?;
        let generators = Arc::new(FieldGenerators::from_schema(schema)?);
        let options = SubscriptionOptions {
            sink_errors: SinkErrorPolicy::Abort,
            ..options
        };
        partition
            .into_workers()
            .into_iter()
            .enumerate()
            .map(|(worker, local)| {
                SubscriptionGenerator::with_generators(
                    Arc::clone(&generators),
                    local,
                    self.worker_seed(worker),
                    options,
                )
                .map(|generator| generator.with_worker(worker))
            })
            .collect()
    }

    /// Split `count` publications across the pool and run it.
    pub async fn run_publications(
        &self,
        schema: &Schema,
        count: u64,
        sink: Arc<dyn RecordSink>,
    ) -> Result<ParallelReport> {
        let generators = match FieldGenerators::from_schema(schema) {
            Ok(generators) => Arc::new(generators),
            Err(err) => return Err(close_unstarted(sink.as_ref(), err)),
        };
        let producers: Vec<PublicationGenerator> = split_evenly(count, self.workers)
            .into_iter()
            .enumerate()
            .map(|(worker, quota)| {
                PublicationGenerator::with_generators(
                    Arc::clone(&generators),
                    quota,
                    self.worker_seed(worker),
                )
                .with_worker(worker)
            })
            .collect();
        self.run(producers, sink).await
    }

    /// Run prebuilt producers, one blocking task each.
    pub async fn run<P: RecordProducer>(
        &self,
        producers: Vec<P>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<ParallelReport> {
        let started = Instant::now();
        let token = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut indices = HashMap::new();
        let count = producers.len();

        for (worker, mut producer) in producers.into_iter().enumerate() {
            let sink = Arc::clone(&sink);
            let token = token.clone();
            let handle = tasks.spawn_blocking(move || producer.produce(sink.as_ref(), &token));
            indices.insert(handle.id(), worker);
        }

        info!(
            workers = count,
            base_seed = self.base_seed,
            timeout_ms = self.timeout.as_millis() as u64,
            "parallel run started"
        );

        let mut pool = Pool {
            tasks,
            indices,
            token,
            results: vec![None; count],
            failure: None,
        };

        if tokio::time::timeout(self.timeout, pool.collect()).await.is_err() {
            warn!(
                timeout_ms = self.timeout.as_millis() as u64,
                "parallel run timed out; cancelling workers"
            );
            if pool.failure.is_none() {
                pool.failure = Some(CancelReason::Timeout(self.timeout));
            }
            pool.token.cancel();
            pool.collect().await;
        }

        let closed = sink.close();

        if let Some(reason) = pool.failure {
            if let Err(err) = closed {
                warn!(error = %err, "sink close failed after cancellation");
            }
            warn!(reason = %reason, "parallel run cancelled");
            return Err(GenerationError::Cancelled(reason));
        }
        closed?;

        let workers: Vec<RunStatistics> = pool.results.into_iter().flatten().collect();
        let mut total = RunStatistics::default();
        for stats in &workers {
            total.merge(stats);
        }
        total.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            workers = count,
            records = total.records,
            duration_ms = total.duration_ms,
            "parallel run finished"
        );

        Ok(ParallelReport {
            base_seed: self.base_seed,
            workers,
            total,
        })
    }
}

struct Pool {
    tasks: JoinSet<Result<RunStatistics>>,
    indices: HashMap<Id, usize>,
    token: CancellationToken,
    results: Vec<Option<RunStatistics>>,
    failure: Option<CancelReason>,
}

/// Worker index reported when a joined task id is not in the pool.
const UNKNOWN_WORKER: usize = usize::MAX;

impl Pool {
    /// Join workers until none is left. Cancel-safe: a timed-out call can be
    /// resumed by calling it again.
    async fn collect(&mut self) {
        while let Some(joined) = self.tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, Ok(stats))) => (id, Ok(stats)),
                Ok((id, Err(err))) => (id, Err((false, err.to_string()))),
                Err(err) if err.is_panic() => {
                    (err.id(), Err((true, "worker panicked".to_string())))
                }
                Err(err) => (err.id(), Err((false, err.to_string()))),
            };
            let worker = self.indices.get(&id).copied();

            match outcome {
                Ok(stats) => match worker {
                    Some(index) if index < self.results.len() => {
                        debug!(worker = index, records = stats.records, "worker finished");
                        self.results[index] = Some(stats);
                    }
                    _ => warn!(task = %id, "result from an unknown task dropped"),
                },
                Err((panicked, reason)) => {
                    let worker = worker.unwrap_or(UNKNOWN_WORKER);
                    if panicked {
                        warn!(worker, cancelled = self.token.is_cancelled(), "worker panicked");
                    } else if self.token.is_cancelled() {
                        debug!(worker, reason = %reason, "worker stopped after cancellation");
                        continue;
                    } else {
                        warn!(worker, reason = %reason, "worker failed; cancelling pool");
                    }
                    if self.failure.is_none() {
                        self.failure = Some(CancelReason::WorkerFailed { worker, reason });
                    }
                    self.token.cancel();
                }
            }
        }
    }
}

fn close_unstarted(sink: &dyn RecordSink, err: GenerationError) -> GenerationError {
    if let Err(close_err) = sink.close() {
        warn!(error = %close_err, "sink close failed after setup error");
    }
    err
}
