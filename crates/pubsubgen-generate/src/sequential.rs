//! Single-generator runs without partitioning.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::coordinator::RecordProducer;
use crate::errors::{CancelReason, GenerationError, Result};
use crate::output::RecordSink;
use crate::stats::RunStatistics;

/// Run `producer` to completion on the calling thread, then close `sink`.
///
/// The sink is closed exactly once whether or not the run succeeded; a close
/// failure after a failed run is logged and the run error is returned.
pub fn run_sequential<P: RecordProducer + ?Sized>(
    producer: &mut P,
    sink: &dyn RecordSink,
    cancel: &CancellationToken,
) -> Result<RunStatistics> {
    let outcome = producer.produce(sink, cancel);
    let closed = sink.close();
    match outcome {
        Ok(stats) => {
            closed?;
            Ok(stats)
        }
        Err(err) => {
            if let Err(close_err) = closed {
                warn!(error = %close_err, "sink close failed after sequential run error");
            }
            Err(err)
        }
    }
}

/// Runs one generator on a blocking thread under a timeout.
#[derive(Debug, Clone, Copy)]
pub struct SequentialRunner {
    timeout: Duration,
}

impl SequentialRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run<P: RecordProducer>(
        &self,
        mut producer: P,
        sink: Arc<dyn RecordSink>,
    ) -> Result<RunStatistics> {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let mut handle = tokio::task::spawn_blocking(move || {
            run_sequential(&mut producer, sink.as_ref(), &worker_token)
        });

        info!(
            timeout_ms = self.timeout.as_millis() as u64,
            "sequential run started"
        );

        let joined = match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "sequential run timed out; cancelling"
                );
                token.cancel();
                if let Err(err) = handle.await {
                    warn!(error = %err, "sequential worker did not stop cleanly");
                }
                return Err(GenerationError::Cancelled(CancelReason::Timeout(
                    self.timeout,
                )));
            }
        };

        let stats = joined.map_err(|err| {
            let reason = if err.is_panic() {
                "worker panicked".to_string()
            } else {
                err.to_string()
            };
            warn!(reason = %reason, "sequential worker failed");
            GenerationError::Cancelled(CancelReason::WorkerFailed { worker: 0, reason })
        })??;

        info!(
            records = stats.records,
            sink_failures = stats.sink_failures,
            duration_ms = stats.duration_ms,
            "sequential run finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use pubsubgen_core::{Record, Schema};
    use pubsubgen_plan::{FieldTarget, Plan};

    use super::*;
    use crate::errors::SinkError;
    use crate::output::MemorySink;
    use crate::publications::PublicationGenerator;
    use crate::subscriptions::{SinkErrorPolicy, SubscriptionGenerator, SubscriptionOptions};

    /// Rejects every third append.
    #[derive(Default)]
    struct FlakySink {
        inner: MemorySink,
        calls: AtomicU64,
    }

    impl RecordSink for FlakySink {
        fn append(&self, record: &Record) -> std::result::Result<(), SinkError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 3 == 2 {
                return Err(SinkError::Io(std::io::Error::other("short write")));
            }
            self.inner.append(record)
        }

        fn close(&self) -> std::result::Result<(), SinkError> {
            self.inner.close()
        }
    }

    fn city_wind() -> (Schema, Plan) {
        let schema = Schema::weather();
        let plan = Plan::new(
            10,
            schema
                .names()
                .map(|name| match name {
                    "city" => FieldTarget::constrained(name, 7),
                    "wind" => FieldTarget::constrained(name, 3),
                    other => FieldTarget::unconstrained(other),
                })
                .collect(),
        );
        (schema, plan)
    }

    #[test]
    fn closes_the_sink_once_after_success() {
        let (schema, plan) = city_wind();
        let mut generator =
            SubscriptionGenerator::new(&schema, plan, 5, SubscriptionOptions::default()).unwrap();
        let sink = MemorySink::new();

        let stats = run_sequential(&mut generator, &sink, &CancellationToken::new()).unwrap();

        assert_eq!(stats.records, 10);
        assert_eq!(sink.len(), 10);
        assert_eq!(sink.close_calls(), 1);
    }

    #[test]
    fn closes_the_sink_once_after_cancellation() {
        let (schema, plan) = city_wind();
        let mut generator =
            SubscriptionGenerator::new(&schema, plan, 5, SubscriptionOptions::default()).unwrap();
        let sink = MemorySink::new();
        let token = CancellationToken::new();
        token.cancel();

        let err = run_sequential(&mut generator, &sink, &token).unwrap_err();

        assert!(err.is_cancelled());
        assert!(sink.is_empty());
        assert_eq!(sink.close_calls(), 1);
    }

    #[tokio::test]
    async fn runner_returns_generator_statistics() {
        let (schema, plan) = city_wind();
        let generator =
            SubscriptionGenerator::new(&schema, plan.clone(), 9, SubscriptionOptions::default())
                .unwrap();
        let sink = Arc::new(MemorySink::new());

        let stats = SequentialRunner::new(Duration::from_secs(30))
            .run(generator, sink.clone())
            .await
            .unwrap();

        assert!(stats.verify(&plan).is_empty());
        assert!(sink.is_closed());
    }

    #[test]
    fn log_and_continue_counts_rejected_subscriptions() {
        let (schema, plan) = city_wind();
        let options = SubscriptionOptions {
            sink_errors: SinkErrorPolicy::LogAndContinue,
            ..SubscriptionOptions::default()
        };
        let mut generator = SubscriptionGenerator::new(&schema, plan.clone(), 3, options).unwrap();
        let sink = FlakySink::default();

        let stats = run_sequential(&mut generator, &sink, &CancellationToken::new()).unwrap();

        assert!(stats.verify(&plan).is_empty());
        assert_eq!(stats.sink_failures, 3);
        assert_eq!(sink.inner.len(), 7);
        assert_eq!(sink.inner.close_calls(), 1);
    }

    #[test]
    fn abort_stops_at_the_first_rejected_publication() {
        let mut generator = PublicationGenerator::new(&Schema::weather(), 10, 3).unwrap();
        let sink = FlakySink::default();

        let err = run_sequential(&mut generator, &sink, &CancellationToken::new()).unwrap_err();

        assert!(matches!(err, GenerationError::Sink(SinkError::Io(_))));
        assert_eq!(sink.inner.len(), 2);
        assert_eq!(sink.inner.close_calls(), 1);
    }

    #[test]
    fn log_and_continue_keeps_publishing() {
        let mut generator = PublicationGenerator::new(&Schema::weather(), 10, 3)
            .unwrap()
            .with_sink_errors(SinkErrorPolicy::LogAndContinue);
        let sink = FlakySink::default();

        let stats = run_sequential(&mut generator, &sink, &CancellationToken::new()).unwrap();

        assert_eq!(stats.records, 10);
        assert_eq!(stats.sink_failures, 3);
        assert_eq!(sink.inner.len(), 7);
    }
}
