use std::collections::BTreeMap;
use std::path::Path;

use pubsubgen_core::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::{PlanError, Result};
use crate::frequency::FrequencyPlanner;
use crate::model::Plan;

/// Default bound on a parallel run, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Run configuration, loadable from TOML or JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// Base seed; each worker derives its own seed from it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Worker count; defaults to the number of CPUs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Upper bound on a parallel run.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attribute schema; defaults to the weather schema.
    #[serde(default)]
    pub schema: Schema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriptions: Option<SubscriptionTargets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publications: Option<PublicationTargets>,
}

/// Subscription count and frequency targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionTargets {
    pub count: u64,
    /// Share of records (0..=100) that must carry each listed field.
    #[serde(default)]
    pub fields: BTreeMap<String, f64>,
    /// Share (0..=100) of a field's own occurrences that must use `=`.
    #[serde(default)]
    pub equality: BTreeMap<String, f64>,
    /// Probability (0..=1) that a numeric condition is flagged as an average.
    #[serde(default)]
    pub average_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PublicationTargets {
    pub count: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            workers: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            schema: Schema::weather(),
            subscriptions: None,
            publications: None,
        }
    }
}

impl GenerationConfig {
    /// Load a config file; `.json` is parsed as JSON, anything else as TOML.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_toml_str(&contents),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// The weather fixture used in documentation and tests:
    /// 10 000 subscriptions with city/wind/temp frequency targets.
    pub fn weather_example() -> Self {
        let pcts = |entries: &[(&str, f64)]| {
            entries
                .iter()
                .map(|(name, pct)| (name.to_string(), *pct))
                .collect::<BTreeMap<_, _>>()
        };
        Self {
            seed: Some(42),
            subscriptions: Some(SubscriptionTargets {
                count: 10_000,
                fields: pcts(&[("city", 90.0), ("temp", 70.0), ("wind", 30.0)]),
                equality: pcts(&[("city", 70.0)]),
                average_rate: 0.0,
            }),
            publications: Some(PublicationTargets { count: 10_000 }),
            ..Self::default()
        }
    }

    /// Resolve the global subscription plan for this config.
    pub fn plan_subscriptions(&self) -> Result<Plan> {
        let targets = self.subscriptions.as_ref().ok_or_else(|| {
            PlanError::Configuration("config has no [subscriptions] section".to_string())
        })?;
        pubsubgen_core::validate_schema(&self.schema)?;
        FrequencyPlanner::new(&self.schema).plan(targets.count, &targets.fields, &targets.equality)
    }
}
