use std::time::Duration;

use pubsubgen_plan::PlanError;
use thiserror::Error;

/// Failures raised by a [`RecordSink`](crate::output::RecordSink).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink is closed")]
    Closed,
    #[error("sink lock poisoned")]
    Poisoned,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a run stopped before every record was produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelReason {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("worker {worker} failed: {reason}")]
    WorkerFailed { worker: usize, reason: String },
    #[error("cancellation requested")]
    Requested,
}

/// Errors emitted by the generators and the coordinator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("invalid domain for field '{field}': {message}")]
    InvalidDomain { field: String, message: String },
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
    #[error("generation cancelled: {0}")]
    Cancelled(CancelReason),
}

impl GenerationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        GenerationError::Plan(PlanError::Configuration(message.into()))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerationError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
