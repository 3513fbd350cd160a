use std::sync::Arc;
use std::time::Instant;

use pubsubgen_core::{Assignment, Publication, Record, Schema};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::{CancelReason, GenerationError, Result};
use crate::generators::FieldGenerators;
use crate::output::RecordSink;
use crate::stats::RunStatistics;
use crate::subscriptions::SinkErrorPolicy;

/// Emits `count` publications, each carrying a value for every field.
#[derive(Debug)]
pub struct PublicationGenerator {
    generators: Arc<FieldGenerators>,
    count: u64,
    emitted: u64,
    rng: ChaCha8Rng,
    sink_errors: SinkErrorPolicy,
    worker: usize,
}

impl PublicationGenerator {
    pub fn new(schema: &Schema, count: u64, seed: u64) -> Result<Self> {
        let generators = Arc::new(FieldGenerators::from_schema(schema)?);
        Ok(Self::with_generators(generators, count, seed))
    }

    pub fn with_generators(generators: Arc<FieldGenerators>, count: u64, seed: u64) -> Self {
        Self {
            generators,
            count,
            emitted: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            sink_errors: SinkErrorPolicy::Abort,
            worker: 0,
        }
    }

    pub fn with_sink_errors(mut self, policy: SinkErrorPolicy) -> Self {
        self.sink_errors = policy;
        self
    }

    pub fn with_worker(mut self, worker: usize) -> Self {
        self.worker = worker;
        self
    }

    pub fn next_publication(&mut self) -> Option<Publication> {
        if self.emitted >= self.count {
            return None;
        }
        let mut publication = Publication::new();
        for field in self.generators.iter() {
            publication.push(Assignment {
                field: field.name.clone(),
                value: field.generator.generate(&mut self.rng),
            });
        }
        self.emitted += 1;
        Some(publication)
    }

    pub fn run(&mut self, sink: &dyn RecordSink, cancel: &CancellationToken) -> Result<RunStatistics> {
        let started = Instant::now();
        let mut stats = RunStatistics::for_fields(self.generators.names());

        info!(
            worker = self.worker,
            records = self.count,
            "publication generation started"
        );

        loop {
            if cancel.is_cancelled() {
                warn!(
                    worker = self.worker,
                    emitted = self.emitted,
                    "publication generation cancelled"
                );
                return Err(GenerationError::Cancelled(CancelReason::Requested));
            }
            let Some(publication) = self.next_publication() else {
                break;
            };
            if let Err(err) = sink.append(&Record::Publication(publication)) {
                match self.sink_errors {
                    SinkErrorPolicy::Abort => return Err(err.into()),
                    SinkErrorPolicy::LogAndContinue => {
                        stats.sink_failures += 1;
                        warn!(
                            worker = self.worker,
                            record = self.emitted,
                            error = %err,
                            "sink rejected publication"
                        );
                    }
                }
            }
        }

        stats.records = self.emitted;
        for field in &mut stats.fields {
            field.occurrences = self.emitted;
        }
        stats.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            worker = self.worker,
            records = stats.records,
            duration_ms = stats.duration_ms,
            "publication generation finished"
        );
        Ok(stats)
    }
}
