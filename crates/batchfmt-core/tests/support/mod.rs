//! Shared test support utilities.
//!
//! Helpers for integration tests: formatters that record the arguments they
//! were invoked with, and a tracing subscriber that captures log output.

#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use batchfmt_core::{compile_patterns, Formatter, FormatterConfig};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Shell script that writes each argument on its own line to the file named by `$0`.
pub const RECORD_ARGS: &str = r#"printf '%s\n' "$@" > "$0""#;

/// A formatter backed by `sh` that records its arguments to `args_file`.
pub struct Recorder {
    pub formatter: Formatter,
    pub args_file: PathBuf,
}

impl Recorder {
    /// Arguments of the last invocation, or `None` if the tool never ran.
    pub fn recorded(&self) -> Option<Vec<String>> {
        match fs::read_to_string(&self.args_file) {
            Ok(text) => Some(text.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => panic!("failed to read {}: {}", self.args_file.display(), e),
        }
    }
}

/// Options and patterns for a recording formatter.
#[derive(Default)]
pub struct RecorderSpec<'a> {
    pub name: &'a str,
    pub options: &'a [&'a str],
    pub includes: &'a [&'a str],
    pub excludes: &'a [&'a str],
    pub global_excludes: &'a [&'a str],
    pub pipeline: Option<&'a str>,
}

/// Build a recording formatter whose argument log lives in `dir`.
pub fn recorder(dir: &Path, spec: RecorderSpec<'_>) -> Recorder {
    let args_file = dir.join(format!("{}.args", spec.name));

    let mut options = vec![
        "-c".to_string(),
        RECORD_ARGS.to_string(),
        args_file.display().to_string(),
    ];
    options.extend(spec.options.iter().map(|s| s.to_string()));

    let mut config = FormatterConfig::new("sh")
        .with_options(options)
        .with_includes(spec.includes.iter().copied())
        .with_excludes(spec.excludes.iter().copied());
    if let Some(pipeline) = spec.pipeline {
        config = config.in_pipeline(pipeline);
    }

    let global = compile_patterns(spec.global_excludes).expect("valid global excludes");
    let formatter = Formatter::new(spec.name, &config, &global).expect("sh is on PATH");

    Recorder {
        formatter,
        args_file,
    }
}

/// A formatter that runs `script` under `sh -c`, with paths as `$1..`.
pub fn shell_formatter(name: &str, script: &str, includes: &[&str]) -> Formatter {
    let config = FormatterConfig::new("sh")
        .with_options(["-c", script, name])
        .with_includes(includes.iter().copied());
    let global = compile_patterns::<&str>(&[]).expect("empty set");
    Formatter::new(name, &config, &global).expect("sh is on PATH")
}

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        let buf = self.0.lock().expect("log buffer poisoned");
        String::from_utf8_lossy(&buf).into_owned()
    }
}

pub struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("log buffer poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter(Arc::clone(&self.0))
    }
}

/// Install a thread-local subscriber at `level` that writes into the returned buffer.
pub fn capture_logs(level: tracing::Level) -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(level)
        .with_ansi(false)
        .without_time()
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
