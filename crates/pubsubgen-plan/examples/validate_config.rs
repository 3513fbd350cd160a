use std::env;
use std::path::PathBuf;

use pubsubgen_plan::{GenerationConfig, ValidationReport, validate_config};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let config_path = args.next().map(PathBuf::from).ok_or("missing config path")?;
    if args.next().is_some() {
        return Err("unexpected argument".into());
    }

    let config = GenerationConfig::from_path(&config_path)?;
    let report = validate_config(&config);

    if !report.is_ok() {
        eprintln!("config validation failed");
        print_report(&report);
        std::process::exit(1);
    }

    if report.warnings.is_empty() {
        println!("config validated successfully");
    } else {
        eprintln!("config validated with warnings:");
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &ValidationReport) {
    for issue in &report.errors {
        eprintln!("error {} {}: {}", issue.code, issue.path, issue.message);
        if let Some(hint) = &issue.hint {
            eprintln!("  hint: {hint}");
        }
    }
    for issue in &report.warnings {
        eprintln!("warning {} {}: {}", issue.code, issue.path, issue.message);
        if let Some(hint) = &issue.hint {
            eprintln!("  hint: {hint}");
        }
    }
}
