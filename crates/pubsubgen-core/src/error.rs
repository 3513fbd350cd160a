use thiserror::Error;

/// Core error type shared across pubsubgen crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The schema violates internal invariants.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// A field name does not belong to the schema.
    #[error("unknown field: {0}")]
    UnknownField(String),
    /// A requested feature is not yet supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Convenience alias for results returned by pubsubgen crates.
pub type Result<T> = std::result::Result<T, Error>;
