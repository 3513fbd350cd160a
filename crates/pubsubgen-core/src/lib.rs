//! Core contracts for pubsubgen.
//!
//! This crate defines the field schema, the publication and subscription
//! records, and the validation helpers shared by the planner, the generators,
//! and the CLI.

pub mod error;
pub mod record;
pub mod schema;
pub mod validation;

pub use error::{Error, Result};
pub use record::{Assignment, Condition, FieldValue, Operator, Publication, Record, Subscription};
pub use schema::{DEFAULT_DATE_FORMAT, DEFAULT_FLOAT_SCALE, DomainSpec, FieldSpec, Schema};
pub use validation::{parse_date_bound, validate_schema};
