//! A single configured formatting tool.
//!
//! A [`Formatter`] owns the resolved executable, the compiled include and
//! exclude patterns, and a tracing span identifying it in logs. It decides
//! which paths it wants and runs the tool over a batch of them.
//!
//! ## Matching
//!
//! A path is wanted when it matches an include pattern and no exclude
//! pattern. Excludes always win; global excludes are appended to the
//! formatter's own and behave the same way.
//!
//! ## Apply modes
//!
//! - `filter = true`: pipeline mode. Each formatter in a pipeline sees the
//!   same candidate list and keeps only the paths it wants.
//! - `filter = false`: the caller already filtered; paths are passed as given.
//!
//! Either way an empty batch is a successful no-op and nothing is launched.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info, info_span, Span};

use crate::config::FormatterConfig;
use crate::context::RunContext;
use crate::error::{ExecutionError, FormatterError, PatternList};
use crate::matcher::{compile_patterns, PatternSet};

/// Result of a successful [`Formatter::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Nothing to process; the tool was not launched.
    Skipped,
    /// The tool ran to success over `batch`.
    Processed {
        /// Paths passed to the tool, in input order.
        batch: Vec<PathBuf>,
        /// Wall-clock time from launch to exit.
        elapsed: Duration,
    },
}

impl ApplyOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, ApplyOutcome::Skipped)
    }

    /// Paths passed to the tool. Empty when skipped.
    pub fn batch(&self) -> &[PathBuf] {
        match self {
            ApplyOutcome::Skipped => &[],
            ApplyOutcome::Processed { batch, .. } => batch,
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            ApplyOutcome::Skipped => None,
            ApplyOutcome::Processed { elapsed, .. } => Some(*elapsed),
        }
    }
}

/// A configured external formatter.
///
/// Immutable after construction; `apply` takes `&self`, so one instance can
/// serve overlapping calls.
#[derive(Debug)]
pub struct Formatter {
    name: String,
    config: FormatterConfig,
    executable: PathBuf,
    includes: PatternSet,
    excludes: PatternSet,
    span: Span,
}

impl Formatter {
    /// Build a formatter named `name` from `config`.
    ///
    /// The command is resolved on `PATH` immediately; an absent tool yields
    /// [`FormatterError::CommandNotFound`]. `global_excludes` are appended
    /// after the formatter's own excludes.
    pub fn new(
        name: impl Into<String>,
        config: &FormatterConfig,
        global_excludes: &PatternSet,
    ) -> Result<Self, FormatterError> {
        let name = name.into();

        let executable = resolve_command(&name, &config.command)?;

        let span = info_span!(
            "format",
            formatter = %name,
            pipeline = tracing::field::Empty
        );
        if let Some(pipeline) = config.pipeline_name() {
            span.record("pipeline", tracing::field::display(pipeline));
        }

        let includes =
            compile_patterns(&config.includes).map_err(|source| FormatterError::Pattern {
                name: name.clone(),
                list: PatternList::Includes,
                source,
            })?;

        let excludes = compile_patterns(&config.excludes)
            .and_then(|local| local.chain(global_excludes))
            .map_err(|source| FormatterError::Pattern {
                name: name.clone(),
                list: PatternList::Excludes,
                source,
            })?;

        debug!(
            parent: &span,
            executable = %executable.display(),
            includes = includes.len(),
            excludes = excludes.len(),
            "formatter ready"
        );

        Ok(Formatter {
            name,
            config: config.clone(),
            executable,
            includes,
            excludes,
            span,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pipeline this formatter belongs to, if any.
    pub fn pipeline(&self) -> Option<&str> {
        self.config.pipeline_name()
    }

    /// Resolved path of the configured command.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn config(&self) -> &FormatterConfig {
        &self.config
    }

    pub fn includes(&self) -> &PatternSet {
        &self.includes
    }

    /// Local excludes followed by global excludes.
    pub fn excludes(&self) -> &PatternSet {
        &self.excludes
    }

    /// Span carrying this formatter's log identity.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Returns true if this formatter should be applied to `path`.
    pub fn wants(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let wanted = !self.excludes.is_match(path) && self.includes.is_match(path);
        if wanted {
            debug!(parent: &self.span, "match: {}", path.display());
        }
        wanted
    }

    /// Run the tool over `paths`.
    ///
    /// With `filter` set, only the paths this formatter [`wants`](Self::wants)
    /// are passed; otherwise `paths` are passed unchanged. Arguments are the
    /// configured options followed by the batch in input order.
    ///
    /// The subprocess is killed if `ctx` is cancelled or its deadline passes
    /// before it exits.
    pub async fn apply<P: AsRef<Path>>(
        &self,
        ctx: &RunContext,
        paths: &[P],
        filter: bool,
    ) -> Result<ApplyOutcome, ExecutionError> {
        let batch: Vec<&Path> = if filter {
            paths
                .iter()
                .map(AsRef::<Path>::as_ref)
                .filter(|path| self.wants(path))
                .collect()
        } else {
            paths.iter().map(AsRef::<Path>::as_ref).collect()
        };

        if batch.is_empty() {
            debug!(parent: &self.span, filter, "no files to process");
            return Ok(ApplyOutcome::Skipped);
        }

        if let Some(interrupt) = ctx.interrupted() {
            return Err(ExecutionError::Interrupted {
                formatter: self.name.clone(),
                interrupt,
                output: String::new(),
            });
        }

        let start = Instant::now();
        self.run(ctx, &batch).await?;
        let elapsed = start.elapsed();

        // Counts the paths given to apply, not the filtered batch.
        info!(
            parent: &self.span,
            files = paths.len(),
            batch = batch.len(),
            "{} files processed in {:.2?}",
            paths.len(),
            elapsed
        );

        Ok(ApplyOutcome::Processed {
            batch: batch.into_iter().map(Path::to_path_buf).collect(),
            elapsed,
        })
    }

    /// Launch the tool over `batch` and wait for it, honoring `ctx`.
    async fn run(&self, ctx: &RunContext, batch: &[&Path]) -> Result<(), ExecutionError> {
        let mut cmd = Command::new(&self.executable);
        cmd.args(&self.config.options)
            .args(batch)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so cancellation reaches tools that fork helpers.
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(
            parent: &self.span,
            executable = %self.executable.display(),
            options = ?self.config.options,
            files = batch.len(),
            "executing"
        );

        let mut child = cmd.spawn().map_err(|source| {
            debug!(parent: &self.span, error = %source, "failed to launch formatter");
            ExecutionError::Spawn {
                formatter: self.name.clone(),
                source,
            }
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut output = Vec::new();

        let finished = tokio::select! {
            result = wait_with_output(&mut child, stdout, stderr, &mut output) => Ok(result),
            interrupt = ctx.done() => Err(interrupt),
        };

        match finished {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => {
                let output = String::from_utf8_lossy(&output).into_owned();
                debug!(parent: &self.span, "\n{}", output);
                Err(ExecutionError::Failed {
                    formatter: self.name.clone(),
                    status,
                    output,
                })
            }
            Ok(Err(source)) => {
                terminate(&mut child, &self.span).await;
                let output = String::from_utf8_lossy(&output).into_owned();
                debug!(parent: &self.span, "\n{}", output);
                Err(ExecutionError::Io {
                    formatter: self.name.clone(),
                    output,
                    source,
                })
            }
            Err(interrupt) => {
                terminate(&mut child, &self.span).await;
                let output = String::from_utf8_lossy(&output).into_owned();
                debug!(parent: &self.span, %interrupt, "\n{}", output);
                Err(ExecutionError::Interrupted {
                    formatter: self.name.clone(),
                    interrupt,
                    output,
                })
            }
        }
    }
}

/// Resolve `command` on `PATH`, separating "not installed" from other failures.
fn resolve_command(name: &str, command: &str) -> Result<PathBuf, FormatterError> {
    which::which(command).map_err(|source| lookup_error(name, command, source))
}

/// An absent command or an empty search path means the tool is not installed.
fn lookup_error(name: &str, command: &str, source: which::Error) -> FormatterError {
    match source {
        which::Error::CannotFindBinaryPath | which::Error::CannotGetCurrentDirAndPathListEmpty => {
            FormatterError::CommandNotFound {
                name: name.to_string(),
                command: command.to_string(),
            }
        }
        source => FormatterError::Resolve {
            name: name.to_string(),
            command: command.to_string(),
            source,
        },
    }
}

/// Collect stdout and stderr into `output`, then reap the child.
async fn wait_with_output(
    child: &mut Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    output: &mut Vec<u8>,
) -> io::Result<ExitStatus> {
    read_combined(stdout, stderr, output).await?;
    child.wait().await
}

enum Chunk {
    Stdout(usize),
    Stderr(usize),
}

/// Read both streams to EOF, appending chunks in arrival order.
async fn read_combined(
    mut stdout: Option<ChildStdout>,
    mut stderr: Option<ChildStderr>,
    output: &mut Vec<u8>,
) -> io::Result<()> {
    let mut out_buf = [0u8; 8192];
    let mut err_buf = [0u8; 8192];

    while stdout.is_some() || stderr.is_some() {
        let chunk = tokio::select! {
            read = read_chunk(stdout.as_mut(), &mut out_buf) => Chunk::Stdout(read?),
            read = read_chunk(stderr.as_mut(), &mut err_buf) => Chunk::Stderr(read?),
        };

        match chunk {
            Chunk::Stdout(0) => stdout = None,
            Chunk::Stdout(n) => output.extend_from_slice(&out_buf[..n]),
            Chunk::Stderr(0) => stderr = None,
            Chunk::Stderr(n) => output.extend_from_slice(&err_buf[..n]),
        }
    }

    Ok(())
}

/// Read once from `reader`; a closed stream never resolves.
async fn read_chunk<R: AsyncRead + Unpin>(
    reader: Option<&mut R>,
    buf: &mut [u8],
) -> io::Result<usize> {
    match reader {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Kill the child's process group and reap the child.
async fn terminate(child: &mut Child, span: &Span) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) {
            // SAFETY: kill(2) with a negative pid signals the group created at spawn.
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
    }

    if let Err(e) = child.kill().await {
        debug!(parent: span, "failed to kill formatter process: {}", e);
    }
}
