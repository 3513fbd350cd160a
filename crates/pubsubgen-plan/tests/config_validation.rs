use std::path::{Path, PathBuf};

use pubsubgen_plan::{
    GenerationConfig, PlanError, config_json_schema, validate_config, validate_config_document,
    validate_config_json,
};
use serde_json::json;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../configs")
        .join(name)
}

fn config_schema() -> serde_json::Value {
    serde_json::to_value(config_json_schema()).expect("serialize config schema")
}

#[test]
fn weather_fixture_validates() {
    let config = GenerationConfig::from_path(&fixture("weather.toml")).expect("load weather.toml");
    assert_eq!(config, GenerationConfig::weather_example());

    let report = validate_config(&config);
    assert!(report.is_ok(), "unexpected errors: {:?}", report.errors);

    let document = serde_json::to_value(&config).expect("config to json");
    let validated =
        validate_config_document(&document, &config_schema()).expect("document should validate");
    assert!(validated.warnings.is_empty());
}

#[test]
fn exact_budget_fixture_plans_every_field() {
    let config =
        GenerationConfig::from_path(&fixture("exact_budget.toml")).expect("load exact_budget.toml");
    assert_eq!(config.workers, Some(3));

    let plan = config.plan_subscriptions().expect("plan");
    assert!(plan.all_constrained());
    assert_eq!(plan.total_field_budget(), 10);
    assert_eq!(plan.fields()[0].fixed_equality(), Some(7));
}

#[test]
fn structural_errors_carry_json_pointers() {
    let document = json!({
        "workers": "four",
        "subscriptions": { "count": 10 }
    });
    let report = validate_config_json(&document, &config_schema()).expect("compile schema");
    assert!(!report.is_ok());
    assert!(
        report
            .errors
            .iter()
            .any(|issue| issue.code == "schema_violation" && issue.path == "/workers")
    );
}

#[test]
fn document_with_infeasible_targets_is_rejected() {
    let document = json!({
        "schema": { "fields": [
            { "name": "a", "domain": { "type": "int_range", "min": 0, "max": 9 } },
            { "name": "b", "domain": { "type": "int_range", "min": 0, "max": 9 } }
        ]},
        "subscriptions": { "count": 10, "fields": { "a": 50.0, "b": 30.0 } }
    });
    let report = validate_config_document(&document, &config_schema()).unwrap_err();
    assert!(report.has_code("infeasible_plan"));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = GenerationConfig::from_path(&fixture("does-not-exist.toml")).unwrap_err();
    assert!(matches!(err, PlanError::Io(_)));
}
