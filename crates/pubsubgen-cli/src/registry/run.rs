use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::Serialize;

use pubsubgen_generate::{Deviation, RunStatistics};
use pubsubgen_plan::GenerationConfig;

use super::{RegistryError, RegistryResult};

/// How a generating run drives its generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Partition across the worker pool.
    Parallel,
    /// One generator writing directly to the output.
    Sequential,
    /// A sequential pass followed by a parallel pass, timed side by side.
    Compare,
}

impl RunMode {
    pub fn name(self) -> &'static str {
        match self {
            RunMode::Parallel => "parallel",
            RunMode::Sequential => "sequential",
            RunMode::Compare => "compare",
        }
    }
}

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub kind: &'static str,
    pub mode: RunMode,
    pub run_dir: PathBuf,
    pub format: String,
    pub extension: &'static str,
    pub workers: usize,
    pub seed: Option<u64>,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
pub struct RunConfig<'a> {
    pub run_id: &'a str,
    pub started_at: String,
    pub kind: &'a str,
    pub mode: &'a str,
    pub format: &'a str,
    pub workers: usize,
    pub seed: Option<u64>,
    pub config: &'a GenerationConfig,
    pub git: GitInfo,
}

/// Git metadata for reproducibility.
#[derive(Debug, Serialize)]
pub struct GitInfo {
    pub commit: Option<String>,
    pub dirty: Option<bool>,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub output_path: PathBuf,
    pub logs_path: PathBuf,
    pub stats_path: PathBuf,
}

/// The direct, single-generator pass of a run.
#[derive(Debug, Serialize)]
pub struct SequentialSummary {
    pub output: PathBuf,
    pub output_bytes: Option<u64>,
    pub stats: RunStatistics,
    pub elapsed_ms: u64,
}

/// Outcome of a generating run, written as `stats.json`.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub kind: &'static str,
    pub mode: &'static str,
    pub status: &'static str,
    pub error: Option<String>,
    pub base_seed: Option<u64>,
    pub output: PathBuf,
    pub output_bytes: Option<u64>,
    pub total: Option<RunStatistics>,
    pub workers: Vec<RunStatistics>,
    pub sequential: Option<SequentialSummary>,
    pub deviations: Vec<Deviation>,
    pub elapsed_ms: u64,
}

pub fn start_run(ctx: &RunContext, config: &GenerationConfig) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id));

    create_dir_all(&root)?;

    let output_path = root.join(format!("{}.{}", ctx.kind, ctx.extension));
    let config_path = root.join("config.json");
    let logs_path = root.join("logs.ndjson");
    let stats_path = root.join("stats.json");

    let run_config = RunConfig {
        run_id: &ctx.run_id,
        started_at: ctx.started_at.to_rfc3339(),
        kind: ctx.kind,
        mode: ctx.mode.name(),
        format: &ctx.format,
        workers: ctx.workers,
        seed: ctx.seed,
        config,
        git: collect_git_info(),
    };

    write_json(&config_path, &run_config)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&logs_path)?;

    Ok(RunPaths {
        root,
        output_path,
        logs_path,
        stats_path,
    })
}

pub fn write_summary(paths: &RunPaths, summary: &RunSummary) -> RegistryResult<()> {
    write_json(&paths.stats_path, summary)
}

pub fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            } else {
                None
            }
        })
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}
