use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pubsubgen_generate::{JsonLinesSink, ParallelCoordinator, SubscriptionOptions};
use pubsubgen_plan::GenerationConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let mut config_path: Option<PathBuf> = None;
    let mut out_path: Option<PathBuf> = None;
    let mut workers = 4;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out" => out_path = args.next().map(PathBuf::from),
            "--workers" => {
                workers = args.next().ok_or("missing --workers value")?.parse()?;
            }
            _ => {
                if config_path.is_none() {
                    config_path = Some(PathBuf::from(arg));
                } else {
                    return Err("unexpected argument".into());
                }
            }
        }
    }

    let config = match config_path {
        Some(path) => GenerationConfig::from_path(&path)?,
        None => GenerationConfig::weather_example(),
    };
    let out_path = out_path.unwrap_or_else(|| PathBuf::from("subscriptions.ndjson"));

    let plan = config.plan_subscriptions()?;
    let options = SubscriptionOptions {
        average_rate: config
            .subscriptions
            .as_ref()
            .map_or(0.0, |targets| targets.average_rate),
        ..SubscriptionOptions::default()
    };

    let coordinator = ParallelCoordinator::new(
        workers,
        Duration::from_secs(config.timeout_secs),
        config.seed,
    )?;
    let sink = Arc::new(JsonLinesSink::create(&out_path)?);
    let report = coordinator
        .run_subscriptions(&config.schema, &plan, options, sink)
        .await?;

    println!("{}", serde_json::to_string_pretty(&report.total)?);
    Ok(())
}
