//! Frequency planning for pubsubgen.
//!
//! Turns occurrence and equality percentages into an exact [`Plan`], splits a
//! plan across workers with [`PartitionPlanner`], and loads and validates the
//! run configuration.

pub mod config;
pub mod errors;
pub mod frequency;
pub mod model;
pub mod partition;
pub mod schema;
pub mod validate;

pub use config::{DEFAULT_TIMEOUT_SECS, GenerationConfig, PublicationTargets, SubscriptionTargets};
pub use errors::{IssueSeverity, PlanError, Result, ValidationIssue, ValidationReport};
pub use frequency::{FrequencyPlanner, percent_of};
pub use model::{EqualityTarget, FieldTarget, Plan};
pub use partition::{PartitionPlan, PartitionPlanner, split_evenly};
pub use schema::config_json_schema;
pub use validate::{
    ValidatedConfig, validate_config, validate_config_document, validate_config_json,
};
