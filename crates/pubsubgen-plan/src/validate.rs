use jsonschema::JSONSchema;
use serde_json::Value;

use crate::config::GenerationConfig;
use crate::errors::{IssueSeverity, PlanError, ValidationIssue, ValidationReport};
use crate::frequency::FrequencyPlanner;

/// Config that passed validation, with accumulated warnings.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub config: GenerationConfig,
    pub warnings: Vec<ValidationIssue>,
}

/// Validate a config JSON document against the config JSON Schema.
pub fn validate_config_json(
    config_json: &Value,
    config_schema: &Value,
) -> Result<ValidationReport, PlanError> {
    let compiled =
        JSONSchema::compile(config_schema).map_err(|err| PlanError::JsonSchema(err.to_string()))?;

    let mut report = ValidationReport::default();

    if let Err(errors) = compiled.validate(config_json) {
        for error in errors {
            let path = normalized_json_pointer(&error.instance_path.to_string());
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "schema_violation",
                path,
                error.to_string(),
                None,
            ));
        }
    }

    Ok(report)
}

/// Semantic checks on a parsed config: schema shape, counts, percentages,
/// and plan feasibility.
pub fn validate_config(config: &GenerationConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    if let Err(err) = pubsubgen_core::validate_schema(&config.schema) {
        report.push_error(ValidationIssue::new(
            IssueSeverity::Error,
            "invalid_schema",
            "/schema",
            err.to_string(),
            None,
        ));
        // Field-level checks below assume a usable schema.
        return report;
    }

    if config.workers == Some(0) {
        report.push_error(ValidationIssue::new(
            IssueSeverity::Error,
            "invalid_workers",
            "/workers",
            "worker count must be at least 1",
            Some("omit workers to use one worker per CPU".to_string()),
        ));
    }

    if config.timeout_secs == 0 {
        report.push_warning(ValidationIssue::new(
            IssueSeverity::Warning,
            "zero_timeout",
            "/timeout_secs",
            "a zero timeout cancels every parallel run immediately",
            None,
        ));
    }

    if config.subscriptions.is_none() && config.publications.is_none() {
        report.push_warning(ValidationIssue::new(
            IssueSeverity::Warning,
            "nothing_to_generate",
            "/",
            "config has neither [subscriptions] nor [publications]",
            None,
        ));
    }

    if let Some(publications) = &config.publications
        && publications.count == 0
    {
        report.push_error(ValidationIssue::new(
            IssueSeverity::Error,
            "invalid_count",
            "/publications/count",
            "publication count must be at least 1",
            None,
        ));
    }

    validate_subscriptions(config, &mut report);

    report
}

fn validate_subscriptions(config: &GenerationConfig, report: &mut ValidationReport) {
    let Some(targets) = &config.subscriptions else {
        return;
    };
    let before = report.errors.len();

    if targets.count == 0 {
        report.push_error(ValidationIssue::new(
            IssueSeverity::Error,
            "invalid_count",
            "/subscriptions/count",
            "subscription count must be at least 1",
            None,
        ));
    }

    if !(0.0..=1.0).contains(&targets.average_rate) {
        report.push_error(ValidationIssue::new(
            IssueSeverity::Error,
            "invalid_average_rate",
            "/subscriptions/average_rate",
            format!(
                "average_rate must be within 0..=1, got {}",
                targets.average_rate
            ),
            None,
        ));
    }

    for (section, percentages) in [("fields", &targets.fields), ("equality", &targets.equality)] {
        for (name, pct) in percentages {
            let path = format!("/subscriptions/{section}/{name}");
            if config.schema.position(name).is_none() {
                report.push_error(ValidationIssue::new(
                    IssueSeverity::Error,
                    "unknown_field",
                    path,
                    format!("field '{name}' is not part of the schema"),
                    Some(format!(
                        "known fields: {}",
                        config.schema.names().collect::<Vec<_>>().join(", ")
                    )),
                ));
            } else if !pct.is_finite() || !(0.0..=100.0).contains(pct) {
                report.push_error(ValidationIssue::new(
                    IssueSeverity::Error,
                    "percentage_out_of_range",
                    path,
                    format!("percentage must be within 0..=100, got {pct}"),
                    None,
                ));
            }
        }
    }

    for name in targets.equality.keys() {
        if config.schema.position(name).is_some() && !targets.fields.contains_key(name) {
            report.push_warning(ValidationIssue::new(
                IssueSeverity::Warning,
                "live_equality_target",
                format!("/subscriptions/equality/{name}"),
                format!(
                    "field '{name}' has no occurrence target; its equality share is tracked against occurrences so far"
                ),
                Some(format!("add {name} under [subscriptions.fields] for an exact count")),
            ));
        }
    }

    if report.errors.len() > before {
        return;
    }

    if let Err(err) = FrequencyPlanner::new(&config.schema).plan(
        targets.count,
        &targets.fields,
        &targets.equality,
    ) {
        report.push_error(ValidationIssue::new(
            IssueSeverity::Error,
            "infeasible_plan",
            "/subscriptions",
            err.to_string(),
            Some("every record needs at least one field; raise the occurrence percentages or leave a field unconstrained".to_string()),
        ));
    }
}

/// Validate a config document end-to-end, returning structured issues on failure.
pub fn validate_config_document(
    config_json: &Value,
    config_schema: &Value,
) -> Result<ValidatedConfig, ValidationReport> {
    let structural = match validate_config_json(config_json, config_schema) {
        Ok(report) => report,
        Err(err) => {
            let mut report = ValidationReport::default();
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "schema_validation_error",
                "/",
                err.to_string(),
                None,
            ));
            return Err(report);
        }
    };

    if !structural.is_ok() {
        return Err(structural);
    }

    let config: GenerationConfig = match serde_json::from_value(config_json.clone()) {
        Ok(config) => config,
        Err(err) => {
            let mut report = ValidationReport::default();
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "invalid_config_json",
                "/",
                err.to_string(),
                None,
            ));
            return Err(report);
        }
    };

    let semantic = validate_config(&config);
    if !semantic.is_ok() {
        return Err(semantic);
    }

    Ok(ValidatedConfig {
        config,
        warnings: semantic.warnings,
    })
}

fn normalized_json_pointer(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::SubscriptionTargets;

    fn with_targets(fields: &[(&str, f64)], equality: &[(&str, f64)]) -> GenerationConfig {
        let map = |entries: &[(&str, f64)]| {
            entries
                .iter()
                .map(|(name, pct)| (name.to_string(), *pct))
                .collect::<BTreeMap<_, _>>()
        };
        GenerationConfig {
            subscriptions: Some(SubscriptionTargets {
                count: 10,
                fields: map(fields),
                equality: map(equality),
                average_rate: 0.0,
            }),
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn example_config_is_clean() {
        let report = validate_config(&GenerationConfig::weather_example());
        assert!(report.is_ok(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn flags_unknown_fields_and_bad_percentages() {
        let report = validate_config(&with_targets(&[("humidity", 10.0), ("city", 150.0)], &[]));
        assert!(report.has_code("unknown_field"));
        assert!(report.has_code("percentage_out_of_range"));
        assert!(!report.has_code("infeasible_plan"));
    }

    #[test]
    fn flags_infeasible_all_constrained_budget() {
        let mut config = with_targets(&[("station", 50.0), ("city", 30.0)], &[]);
        config.schema.fields.retain(|field| field.name == "station" || field.name == "city");
        let report = validate_config(&config);
        assert!(report.has_code("infeasible_plan"));
    }

    #[test]
    fn warns_on_live_equality_targets() {
        let report = validate_config(&with_targets(&[("city", 50.0)], &[("wind", 20.0)]));
        assert!(report.is_ok());
        assert!(report.has_code("live_equality_target"));
    }

    #[test]
    fn flags_zero_workers_and_bad_average_rate() {
        let mut config = with_targets(&[], &[]);
        config.workers = Some(0);
        if let Some(targets) = config.subscriptions.as_mut() {
            targets.average_rate = 1.5;
        }
        let report = validate_config(&config);
        assert!(report.has_code("invalid_workers"));
        assert!(report.has_code("invalid_average_rate"));
    }
}
