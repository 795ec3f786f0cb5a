use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use flowstat::config::Config;
use flowstat::heap::MemHeap;
use flowstat::{ingest, output};

/// Group, merge and rank network flow records in memory.
#[derive(Parser)]
#[command(name = "flowstat", about, args_conflicts_with_subcommands = true)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    /// Overrides the config file.
    #[arg(long)]
    log_level: Option<String>,

    /// Line-delimited JSON flow files. Reads stdin when none are given.
    inputs: Vec<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info.
mod version {
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Version) = &cli.command {
        println!("flowstat {}", version::full());
        return Ok(());
    }

    let config_path = cli
        .config
        .as_deref()
        .context("--config is required (use --help for usage)")?;

    let cfg = Config::load(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    // Results go to stdout, so logs go to stderr.
    let level = cli.log_level.as_deref().unwrap_or(&cfg.log_level);
    let filter =
        EnvFilter::try_new(level).with_context(|| format!("invalid log level: {level}"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting flowstat",
    );

    run(&cfg, &cli.inputs)
}

fn run(cfg: &Config, inputs: &[PathBuf]) -> Result<()> {
    let mut heap = MemHeap::new(cfg.shards);
    cfg.apply(&mut heap)?;

    let started = Instant::now();
    let summary = if inputs.is_empty() {
        ingest::ingest_reader(&heap, io::stdin().lock(), "stdin")?
    } else {
        ingest::ingest_files(&heap, inputs, cfg.workers)?
    };

    tracing::info!(
        files = summary.files,
        lines = summary.lines,
        records = summary.records,
        skipped = summary.skipped,
        groups = heap.group_count(),
        elapsed = ?started.elapsed(),
        "ingestion complete",
    );

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let rows = output::write_results(&heap, cfg.output, cfg.limit, &mut out)?;
    out.flush().context("flushing output")?;

    let stats = heap.stats();
    tracing::info!(
        rows,
        records_written = stats.records_written,
        write_errors = stats.write_errors,
        groups_created = stats.groups_created,
        groups_merged = stats.groups_merged,
        pairs_skipped = stats.pairs_skipped,
        sort_rebuilds = stats.sort_rebuilds,
        "flowstat finished",
    );

    Ok(())
}
