//! Binary entry point for the batchfmt CLI.
//!
//! Loads a formatter configuration, builds one formatter per entry and runs
//! them over the paths given on the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Format two files with every formatter that wants them
//! batchfmt --config batchfmt.toml src/main.go flake.nix
//!
//! # Give up on any formatter still running after 30 seconds
//! batchfmt --timeout 30 $(git ls-files)
//! ```
//!
//! ## Exit codes
//!
//! - `0`: every formatter succeeded or had nothing to do
//! - `1`: one or more formatters failed
//! - `2`: configuration or formatter construction error
//! - `130`: interrupted, by ctrl-c or by the `--timeout` deadline

use std::collections::BTreeMap;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use batchfmt_core::{Config, ConfigError, Formatter, FormatterError, Interrupt, RunContext};
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

/// Run configured code formatters over a list of paths.
#[derive(Parser, Debug)]
#[command(name = "batchfmt", version, about = "Run configured code formatters over a list of paths")]
struct Cli {
    /// Configuration file.
    #[arg(long, short, default_value = "batchfmt.toml")]
    config: PathBuf,

    /// Cancel formatters still running after this many seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Skip formatters whose command is not installed instead of failing.
    #[arg(long)]
    allow_missing_formatter: bool,

    /// Log level for tracing output.
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Paths to format, relative to the tree root with `/` separators.
    paths: Vec<PathBuf>,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Why a run stopped short of full success.
#[derive(Debug)]
enum RunError {
    Config(ConfigError),
    Formatter(FormatterError),
    Failed { failures: usize },
    Interrupted(Interrupt),
}

impl RunError {
    fn code(&self) -> u8 {
        match self {
            RunError::Failed { .. } => 1,
            RunError::Config(_) | RunError::Formatter(_) => 2,
            RunError::Interrupted(_) => 130,
        }
    }

    fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

impl From<ConfigError> for RunError {
    fn from(e: ConfigError) -> Self {
        RunError::Config(e)
    }
}

impl From<FormatterError> for RunError {
    fn from(e: FormatterError) -> Self {
        RunError::Formatter(e)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level, cli.log_format);

    let ctx = match cli.timeout {
        Some(secs) => RunContext::new().with_timeout(Duration::from_secs(secs)),
        None => RunContext::new(),
    };

    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling formatters");
            interrupt.cancel();
        }
    });

    match run(&cli, &ctx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match &e {
                RunError::Config(e) => error!("{}", e),
                RunError::Formatter(e) => error!("{}", e),
                RunError::Failed { failures } => error!("{} formatter(s) failed", failures),
                RunError::Interrupted(Interrupt::Cancelled) => error!("run cancelled"),
                RunError::Interrupted(Interrupt::DeadlineExceeded) => {
                    error!("run timed out after {}s", cli.timeout.unwrap_or_default())
                }
            }
            e.exit_code()
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Build the formatters and apply them to the command-line paths.
async fn run(cli: &Cli, ctx: &RunContext) -> Result<(), RunError> {
    let config = Config::load(&cli.config)?;
    let formatters = build_formatters(&config, cli.allow_missing_formatter)?;
    let stages = group_stages(&formatters);

    let mut failures = 0;
    for stage in stages {
        if let Err(e) = run_stage(ctx, &stage, &cli.paths).await {
            if let Some(interrupt) = e.interrupt() {
                return Err(RunError::Interrupted(interrupt));
            }
            error!("{}", e);
            failures += 1;
        }
    }

    if failures > 0 {
        return Err(RunError::Failed { failures });
    }
    Ok(())
}

/// One formatter per config entry, in name order.
fn build_formatters(config: &Config, allow_missing: bool) -> Result<Vec<Formatter>, RunError> {
    let global_excludes = config.global_excludes()?;
    let mut formatters = Vec::with_capacity(config.formatter.len());

    for (name, formatter_config) in &config.formatter {
        match Formatter::new(name.as_str(), formatter_config, &global_excludes) {
            Ok(formatter) => formatters.push(formatter),
            Err(e) if allow_missing && e.is_command_not_found() => {
                warn!("{}, skipping", e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!("{} formatter(s) ready", formatters.len());
    Ok(formatters)
}

/// A unit of work: a standalone formatter or a named pipeline.
enum Stage<'a> {
    Standalone(&'a Formatter),
    Pipeline {
        name: &'a str,
        members: Vec<&'a Formatter>,
    },
}

/// Group formatters into stages. Pipeline members keep name order.
fn group_stages(formatters: &[Formatter]) -> Vec<Stage<'_>> {
    let mut stages = Vec::new();
    let mut pipelines: BTreeMap<&str, Vec<&Formatter>> = BTreeMap::new();

    for formatter in formatters {
        match formatter.pipeline() {
            Some(pipeline) => pipelines.entry(pipeline).or_default().push(formatter),
            None => stages.push(Stage::Standalone(formatter)),
        }
    }

    stages.extend(
        pipelines
            .into_iter()
            .map(|(name, members)| Stage::Pipeline { name, members }),
    );
    stages
}

async fn run_stage(
    ctx: &RunContext,
    stage: &Stage<'_>,
    paths: &[PathBuf],
) -> Result<(), batchfmt_core::ExecutionError> {
    match stage {
        Stage::Standalone(formatter) => {
            let wanted: Vec<&PathBuf> = paths.iter().filter(|p| formatter.wants(p)).collect();
            formatter.apply(ctx, &wanted, false).await?;
        }
        Stage::Pipeline { name, members } => {
            info!(pipeline = %name, members = members.len(), "running pipeline");
            for formatter in members {
                formatter.apply(ctx, paths, true).await?;
            }
        }
    }
    Ok(())
}
