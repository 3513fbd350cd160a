//! Record generation for pubsubgen.
//!
//! [`SubscriptionGenerator`] is the sequential frequency solver,
//! [`PublicationGenerator`] fills every field, and [`ParallelCoordinator`]
//! fans either out across a worker pool sharing one [`RecordSink`].
//! [`SequentialRunner`] runs a single generator directly against a sink.

pub mod coordinator;
pub mod errors;
pub mod generators;
pub mod operators;
pub mod output;
pub mod publications;
pub mod sequential;
pub mod stats;
pub mod subscriptions;

pub use coordinator::{ParallelCoordinator, ParallelReport, RecordProducer, derive_seed};
pub use errors::{CancelReason, GenerationError, Result, SinkError};
pub use output::{
    JsonArraySink, JsonLinesSink, MemorySink, OutputFormat, RecordSink, TextSink,
};
pub use publications::PublicationGenerator;
pub use sequential::{SequentialRunner, run_sequential};
pub use stats::{Deviation, FieldStatistics, RunStatistics};
pub use subscriptions::{
    GenerationState, SinkErrorPolicy, SubscriptionGenerator, SubscriptionOptions,
};
