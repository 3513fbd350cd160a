mod registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use pubsubgen_generate::{
    GenerationError, OutputFormat, ParallelCoordinator, ParallelReport, PublicationGenerator,
    RecordSink, RunStatistics, SequentialRunner, SinkError, SinkErrorPolicy,
    SubscriptionGenerator, SubscriptionOptions,
};
use pubsubgen_plan::{
    GenerationConfig, PartitionPlan, PartitionPlanner, Plan, PlanError, PublicationTargets,
    SubscriptionTargets, ValidationIssue, config_json_schema, validate_config,
};
use registry::{
    RunContext, RunMode, RunPaths, RunSummary, SequentialSummary, init_run_logging, init_stderr_logging,
    start_run, write_summary,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("verification failed: {0} target(s) missed")]
    Verification(usize),
}

#[derive(Parser, Debug)]
#[command(name = "pubsubgen", version, about = "Publish/subscribe fixture generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate subscriptions that meet the configured frequency targets.
    Subscriptions(GenerateArgs),
    /// Generate publications with a value for every field.
    Publications(GenerateArgs),
    /// Print the resolved subscription plan without generating anything.
    Plan(PlanArgs),
    /// Print the JSON Schema of the configuration file.
    ConfigSchema,
    /// Print OS, architecture, and core counts.
    System,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Configuration file (TOML, or JSON with a .json extension).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of records; overrides the config.
    #[arg(long)]
    count: Option<u64>,
    /// Worker count; defaults to the config, then the number of CPUs.
    #[arg(long)]
    workers: Option<usize>,
    /// Base seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,
    /// Abort the run after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Output encoding.
    #[arg(long, value_enum, default_value_t = FormatArg::JsonLines)]
    format: FormatArg,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
    /// Fail when the achieved counts differ from the plan.
    #[arg(long, default_value_t = false)]
    verify: bool,
    /// Run one generator directly instead of the worker pool.
    #[arg(long, default_value_t = false, conflicts_with = "compare")]
    sequential: bool,
    /// Run sequentially, then in parallel, and report both timings.
    #[arg(long, default_value_t = false)]
    compare: bool,
    /// What a sequential run does when the output rejects a record.
    #[arg(long, value_enum, default_value_t = SinkErrorsArg::Abort)]
    sink_errors: SinkErrorsArg,
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// Configuration file (TOML, or JSON with a .json extension).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of subscriptions; overrides the config.
    #[arg(long)]
    count: Option<u64>,
    /// Also print the per-worker partition for this many workers.
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    JsonLines,
    JsonArray,
    Text,
}

impl FormatArg {
    fn name(self) -> &'static str {
        match self {
            FormatArg::JsonLines => "json-lines",
            FormatArg::JsonArray => "json-array",
            FormatArg::Text => "text",
        }
    }
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::JsonLines => OutputFormat::JsonLines,
            FormatArg::JsonArray => OutputFormat::JsonArray,
            FormatArg::Text => OutputFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkErrorsArg {
    Abort,
    LogAndContinue,
}

impl From<SinkErrorsArg> for SinkErrorPolicy {
    fn from(value: SinkErrorsArg) -> Self {
        match value {
            SinkErrorsArg::Abort => SinkErrorPolicy::Abort,
            SinkErrorsArg::LogAndContinue => SinkErrorPolicy::LogAndContinue,
        }
    }
}

#[derive(Debug, Serialize)]
struct PlanOutput {
    plan: Plan,
    #[serde(skip_serializing_if = "Option::is_none")]
    partition: Option<PartitionPlan>,
}

#[derive(Debug, Serialize)]
struct SystemInfo {
    os: &'static str,
    arch: &'static str,
    family: &'static str,
    logical_cores: usize,
    physical_cores: usize,
    version: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordKind {
    Subscriptions,
    Publications,
}

impl RecordKind {
    fn name(self) -> &'static str {
        match self {
            RecordKind::Subscriptions => "subscriptions",
            RecordKind::Publications => "publications",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Subscriptions(args) => run_generate(RecordKind::Subscriptions, args).await,
        Command::Publications(args) => run_generate(RecordKind::Publications, args).await,
        Command::Plan(args) => run_plan(args),
        Command::ConfigSchema => {
            println!("{}", serde_json::to_string_pretty(&config_json_schema())?);
            Ok(())
        }
        Command::System => {
            println!("{}", serde_json::to_string_pretty(&system_info())?);
            Ok(())
        }
    }
}

async fn run_generate(kind: RecordKind, args: GenerateArgs) -> Result<(), CliError> {
    let started = Instant::now();
    let mode = run_mode(&args);
    let config = resolve_config(kind, &args)?;
    let warnings = check_config(&config)?;
    let plan = match kind {
        RecordKind::Subscriptions => config.plan_subscriptions()?,
        RecordKind::Publications => Plan::new(publication_count(&config), Vec::new()),
    };

    let workers = config.workers.unwrap_or_else(num_cpus::get);
    let output_format = OutputFormat::from(args.format);
    let ctx = RunContext {
        run_id: Uuid::new_v4().to_string(),
        started_at: chrono::Utc::now(),
        kind: kind.name(),
        mode,
        run_dir: args.run_dir.clone(),
        format: args.format.name().to_string(),
        extension: output_format.extension(),
        workers,
        seed: config.seed,
    };

    let paths = start_run(&ctx, &config)?;
    init_run_logging(&paths.logs_path)?;

    tracing::info!(
        event = "run_started",
        run_id = %ctx.run_id,
        kind = ctx.kind,
        mode = ctx.mode.name(),
        records = plan.records(),
        workers,
        format = %ctx.format,
        run_dir = %paths.root.display()
    );
    for issue in &warnings {
        tracing::warn!(
            event = "config_warning",
            code = %issue.code,
            path = %issue.path,
            message = %issue.message
        );
    }

    let timeout = Duration::from_secs(config.timeout_secs);
    let coordinator = ParallelCoordinator::new(workers, timeout, config.seed)?;
    let base_seed = coordinator.base_seed();
    let options = SubscriptionOptions {
        average_rate: config
            .subscriptions
            .as_ref()
            .map_or(0.0, |targets| targets.average_rate),
        sink_errors: args.sink_errors.into(),
    };
    let mut sequential = None;
    if mode != RunMode::Parallel {
        let output = match mode {
            RunMode::Sequential => paths.output_path.clone(),
            _ => paths
                .root
                .join(format!("{}_sequential.{}", ctx.kind, ctx.extension)),
        };
        let pass_started = Instant::now();
        let outcome = run_direct(
            kind,
            &config,
            &plan,
            coordinator.worker_seed(0),
            options,
            output_format,
            &output,
        )
        .await;
        match outcome {
            Ok(stats) => {
                tracing::info!(
                    event = "sequential_finished",
                    records = stats.records,
                    sink_failures = stats.sink_failures,
                    duration_ms = stats.duration_ms
                );
                sequential = Some(SequentialSummary {
                    output_bytes: output_bytes(&output),
                    output,
                    elapsed_ms: pass_started.elapsed().as_millis() as u64,
                    stats,
                });
            }
            Err(err) => {
                return finish_run(
                    &ctx,
                    &paths,
                    base_seed,
                    &plan,
                    Err(err),
                    None,
                    args.verify,
                    started,
                );
            }
        }
    }

    let outcome = match (mode, &sequential) {
        (RunMode::Sequential, Some(direct)) => Ok(ParallelReport {
            base_seed,
            workers: Vec::new(),
            total: direct.stats.clone(),
        }),
        _ => run_pooled(kind, &coordinator, &config, &plan, options, output_format, &paths).await,
    };

    finish_run(
        &ctx,
        &paths,
        base_seed,
        &plan,
        outcome,
        sequential,
        args.verify,
        started,
    )
}

fn run_mode(args: &GenerateArgs) -> RunMode {
    if args.compare {
        RunMode::Compare
    } else if args.sequential {
        RunMode::Sequential
    } else {
        RunMode::Parallel
    }
}

/// Run one generator directly against a fresh sink at `output`.
async fn run_direct(
    kind: RecordKind,
    config: &GenerationConfig,
    plan: &Plan,
    seed: u64,
    options: SubscriptionOptions,
    format: OutputFormat,
    output: &Path,
) -> Result<RunStatistics, GenerationError> {
    let runner = SequentialRunner::new(Duration::from_secs(config.timeout_secs));
    match kind {
        RecordKind::Subscriptions => {
            let generator =
                SubscriptionGenerator::new(&config.schema, plan.clone(), seed, options)?;
            let sink: Arc<dyn RecordSink> = Arc::from(format.create_sink(output)?);
            runner.run(generator, sink).await
        }
        RecordKind::Publications => {
            let generator = PublicationGenerator::new(&config.schema, plan.records(), seed)?
                .with_sink_errors(options.sink_errors);
            let sink: Arc<dyn RecordSink> = Arc::from(format.create_sink(output)?);
            runner.run(generator, sink).await
        }
    }
}

async fn run_pooled(
    kind: RecordKind,
    coordinator: &ParallelCoordinator,
    config: &GenerationConfig,
    plan: &Plan,
    options: SubscriptionOptions,
    format: OutputFormat,
    paths: &RunPaths,
) -> Result<ParallelReport, GenerationError> {
    let sink: Arc<dyn RecordSink> = Arc::from(format.create_sink(&paths.output_path)?);
    match kind {
        RecordKind::Subscriptions => {
            coordinator
                .run_subscriptions(&config.schema, plan, options, sink)
                .await
        }
        RecordKind::Publications => {
            coordinator
                .run_publications(&config.schema, plan.records(), sink)
                .await
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn finish_run(
    ctx: &RunContext,
    paths: &RunPaths,
    base_seed: u64,
    plan: &Plan,
    outcome: Result<ParallelReport, GenerationError>,
    sequential: Option<SequentialSummary>,
    verify: bool,
    started: Instant,
) -> Result<(), CliError> {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let output_bytes = output_bytes(&paths.output_path);

    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            tracing::error!(
                event = "run_failed",
                run_id = %ctx.run_id,
                error = %err,
                elapsed_ms
            );
            let summary = RunSummary {
                run_id: ctx.run_id.clone(),
                kind: ctx.kind,
                mode: ctx.mode.name(),
                status: "failed",
                error: Some(err.to_string()),
                base_seed: Some(base_seed),
                output: paths.output_path.clone(),
                output_bytes,
                total: None,
                workers: Vec::new(),
                sequential,
                deviations: Vec::new(),
                elapsed_ms,
            };
            write_summary(paths, &summary)?;
            return Err(err.into());
        }
    };

    let mut deviations = Vec::new();
    if verify {
        deviations.extend(report.total.verify(plan));
        if ctx.mode == RunMode::Compare
            && let Some(direct) = &sequential
        {
            deviations.extend(direct.stats.verify(plan));
        }
    }
    for deviation in &deviations {
        tracing::warn!(
            event = "target_missed",
            field = deviation.field.as_deref().unwrap_or("*"),
            metric = deviation.metric,
            expected = deviation.expected,
            actual = deviation.actual
        );
    }

    let status = if deviations.is_empty() {
        "succeeded"
    } else {
        "deviated"
    };
    tracing::info!(
        event = "run_finished",
        run_id = %ctx.run_id,
        status,
        records = report.total.records,
        elapsed_ms
    );

    println!("run_dir={}", paths.root.display());
    if let Some(direct) = &sequential {
        println!(
            "sequential records={} sink_failures={} duration_ms={}",
            direct.stats.records, direct.stats.sink_failures, direct.elapsed_ms
        );
    }
    if ctx.mode != RunMode::Sequential {
        println!(
            "parallel records={} workers={} duration_ms={}",
            report.total.records,
            report.workers.len(),
            report.total.duration_ms
        );
        for (worker, stats) in report.workers.iter().enumerate() {
            println!(
                "worker={worker} records={} duration_ms={}",
                stats.records, stats.duration_ms
            );
        }
    }
    println!("base_seed={} elapsed_ms={elapsed_ms}", report.base_seed);

    let missed = deviations.len();
    let summary = RunSummary {
        run_id: ctx.run_id.clone(),
        kind: ctx.kind,
        mode: ctx.mode.name(),
        status,
        error: None,
        base_seed: Some(report.base_seed),
        output: paths.output_path.clone(),
        output_bytes,
        total: Some(report.total),
        workers: report.workers,
        sequential,
        deviations,
        elapsed_ms,
    };
    write_summary(paths, &summary)?;

    if missed > 0 {
        return Err(CliError::Verification(missed));
    }
    Ok(())
}

fn output_bytes(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|meta| meta.len())
}

fn run_plan(args: PlanArgs) -> Result<(), CliError> {
    init_stderr_logging()?;

    let mut config = load_config(args.config.as_deref())?;
    if let Some(count) = args.count {
        set_subscription_count(&mut config, count);
    }
    check_config(&config)?;

    let plan = config.plan_subscriptions()?;
    let partition = match args.workers.or(config.workers) {
        Some(workers) => Some(PartitionPlanner::new(workers)?.partition(&plan)?),
        None => None,
    };

    let output = PlanOutput { plan, partition };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Load the config and apply command-line overrides. Only the section for
/// `kind` is kept so the recorded config describes exactly this run.
fn resolve_config(kind: RecordKind, args: &GenerateArgs) -> Result<GenerationConfig, CliError> {
    let mut config = load_config(args.config.as_deref())?;

    match kind {
        RecordKind::Subscriptions => {
            config.publications = None;
            if let Some(count) = args.count {
                set_subscription_count(&mut config, count);
            }
            if config.subscriptions.is_none() {
                return Err(CliError::InvalidConfig(
                    "no [subscriptions] section and no --count given".to_string(),
                ));
            }
        }
        RecordKind::Publications => {
            config.subscriptions = None;
            if let Some(count) = args.count {
                config.publications = Some(PublicationTargets { count });
            }
            if config.publications.is_none() {
                return Err(CliError::InvalidConfig(
                    "no [publications] section and no --count given".to_string(),
                ));
            }
        }
    }

    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.timeout_secs = timeout_secs;
    }
    Ok(config)
}

fn load_config(path: Option<&Path>) -> Result<GenerationConfig, CliError> {
    match path {
        Some(path) => Ok(GenerationConfig::from_path(path)?),
        None => Ok(GenerationConfig::weather_example()),
    }
}

fn set_subscription_count(config: &mut GenerationConfig, count: u64) {
    match config.subscriptions.as_mut() {
        Some(targets) => targets.count = count,
        None => {
            config.subscriptions = Some(SubscriptionTargets {
                count,
                fields: Default::default(),
                equality: Default::default(),
                average_rate: 0.0,
            })
        }
    }
}

fn publication_count(config: &GenerationConfig) -> u64 {
    config
        .publications
        .as_ref()
        .map_or(0, |targets| targets.count)
}

/// Reject configs with validation errors; hand back the warnings.
fn check_config(config: &GenerationConfig) -> Result<Vec<ValidationIssue>, CliError> {
    let report = validate_config(config);
    if report.is_ok() {
        return Ok(report.warnings);
    }
    let message = report
        .errors
        .iter()
        .map(|issue| match &issue.hint {
            Some(hint) => format!("{} at {}: {} ({hint})", issue.code, issue.path, issue.message),
            None => format!("{} at {}: {}", issue.code, issue.path, issue.message),
        })
        .collect::<Vec<_>>()
        .join("; ");
    Err(CliError::InvalidConfig(message))
}

fn system_info() -> SystemInfo {
    SystemInfo {
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        family: std::env::consts::FAMILY,
        logical_cores: num_cpus::get(),
        physical_cores: num_cpus::get_physical(),
        version: env!("CARGO_PKG_VERSION"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_args(argv: &[&str]) -> GenerateArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Subscriptions(args) | Command::Publications(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_subscription_flags() {
        let args = generate_args(&[
            "pubsubgen",
            "subscriptions",
            "--count",
            "10",
            "--workers",
            "3",
            "--seed",
            "7",
            "--format",
            "json-array",
            "--verify",
        ]);
        assert_eq!(args.count, Some(10));
        assert_eq!(args.workers, Some(3));
        assert_eq!(args.format, FormatArg::JsonArray);
        assert!(args.verify);
        assert_eq!(args.run_dir, PathBuf::from("runs"));
    }

    #[test]
    fn overrides_replace_config_values() {
        let args = generate_args(&[
            "pubsubgen",
            "subscriptions",
            "--count",
            "50",
            "--seed",
            "3",
            "--timeout-secs",
            "5",
        ]);
        let config = resolve_config(RecordKind::Subscriptions, &args).unwrap();

        assert_eq!(config.subscriptions.as_ref().unwrap().count, 50);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.timeout_secs, 5);
        assert!(config.publications.is_none());
        assert_eq!(config.plan_subscriptions().unwrap().records(), 50);
    }

    #[test]
    fn publications_keep_only_their_section() {
        let args = generate_args(&["pubsubgen", "publications", "--count", "12"]);
        let config = resolve_config(RecordKind::Publications, &args).unwrap();

        assert!(config.subscriptions.is_none());
        assert_eq!(publication_count(&config), 12);
    }

    #[test]
    fn infeasible_targets_are_rejected_before_a_run() {
        let mut config = GenerationConfig::weather_example();
        let targets = config.subscriptions.as_mut().unwrap();
        targets.fields.insert("city".to_string(), 140.0);

        let err = check_config(&config).unwrap_err();
        assert!(matches!(err, CliError::InvalidConfig(message) if message.contains("percentage_out_of_range")));
    }

    #[test]
    fn sequential_flags_select_the_mode() {
        let args = generate_args(&[
            "pubsubgen",
            "publications",
            "--sequential",
            "--sink-errors",
            "log-and-continue",
        ]);
        assert_eq!(run_mode(&args), RunMode::Sequential);
        assert_eq!(
            SinkErrorPolicy::from(args.sink_errors),
            SinkErrorPolicy::LogAndContinue
        );

        let args = generate_args(&["pubsubgen", "subscriptions", "--compare"]);
        assert_eq!(run_mode(&args), RunMode::Compare);
        assert_eq!(SinkErrorPolicy::from(args.sink_errors), SinkErrorPolicy::Abort);

        assert!(
            Cli::try_parse_from(["pubsubgen", "subscriptions", "--sequential", "--compare"])
                .is_err()
        );
    }

    #[tokio::test]
    async fn direct_run_writes_every_record() {
        let args = generate_args(&["pubsubgen", "subscriptions", "--count", "40", "--seed", "5"]);
        let config = resolve_config(RecordKind::Subscriptions, &args).unwrap();
        let plan = config.plan_subscriptions().unwrap();
        let output =
            std::env::temp_dir().join(format!("pubsubgen-direct-{}.ndjson", Uuid::new_v4()));

        let stats = run_direct(
            RecordKind::Subscriptions,
            &config,
            &plan,
            5,
            SubscriptionOptions {
                sink_errors: SinkErrorPolicy::LogAndContinue,
                ..SubscriptionOptions::default()
            },
            OutputFormat::JsonLines,
            &output,
        )
        .await
        .unwrap();

        assert!(stats.verify(&plan).is_empty());
        assert_eq!(stats.sink_failures, 0);
        let contents = std::fs::read_to_string(&output).unwrap();
        assert_eq!(contents.lines().count(), 40);
        std::fs::remove_file(output).unwrap();
    }

    #[test]
    fn format_names_match_flags() {
        for format in [FormatArg::JsonLines, FormatArg::JsonArray, FormatArg::Text] {
            let parsed = FormatArg::from_str(format.name(), false).unwrap();
            assert_eq!(parsed, format);
        }
        assert_eq!(OutputFormat::from(FormatArg::Text).extension(), "txt");
    }
}
