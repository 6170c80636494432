//! Error types for formatter construction and execution.
//!
//! Two phases, two types:
//! - [`FormatterError`]: building a [`Formatter`](crate::Formatter) failed; no instance exists.
//! - [`ExecutionError`]: one [`apply`](crate::Formatter::apply) call failed.
//!
//! Nothing in this crate retries. Callers decide whether an error aborts the
//! run or is only recorded.

use std::fmt;
use std::io;
use std::process::ExitStatus;

use thiserror::Error;

use crate::context::Interrupt;
use crate::matcher::PatternError;

/// Which pattern list of a formatter failed to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternList {
    Includes,
    Excludes,
}

impl fmt::Display for PatternList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternList::Includes => write!(f, "includes"),
            PatternList::Excludes => write!(f, "excludes"),
        }
    }
}

/// Error returned when a formatter cannot be constructed.
#[derive(Debug, Error)]
pub enum FormatterError {
    /// The configured command is not on the search path.
    #[error("formatter '{name}': command '{command}' not found in PATH")]
    CommandNotFound { name: String, command: String },

    /// Resolving the command failed for a reason other than absence.
    #[error("formatter '{name}': failed to resolve command '{command}': {source}")]
    Resolve {
        name: String,
        command: String,
        #[source]
        source: which::Error,
    },

    /// An include or exclude pattern is not a valid glob.
    #[error("formatter '{name}' {list}: {source}")]
    Pattern {
        name: String,
        list: PatternList,
        #[source]
        source: PatternError,
    },
}

impl FormatterError {
    /// Returns true if the tool is simply not installed.
    pub fn is_command_not_found(&self) -> bool {
        matches!(self, FormatterError::CommandNotFound { .. })
    }
}

/// Error returned by a failed [`apply`](crate::Formatter::apply).
///
/// Every variant names the formatter and carries whatever combined
/// stdout/stderr was captured before the failure.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The subprocess could not be started.
    #[error("formatter '{formatter}': failed to launch: {source}")]
    Spawn {
        formatter: String,
        #[source]
        source: io::Error,
    },

    /// Reading output from or waiting on the subprocess failed.
    #[error("formatter '{formatter}': {source}")]
    Io {
        formatter: String,
        output: String,
        #[source]
        source: io::Error,
    },

    /// The subprocess exited unsuccessfully.
    #[error("formatter '{formatter}': {status}")]
    Failed {
        formatter: String,
        status: ExitStatus,
        output: String,
    },

    /// The context was cancelled or its deadline passed; the subprocess was killed.
    #[error("formatter '{formatter}': {interrupt}")]
    Interrupted {
        formatter: String,
        #[source]
        interrupt: Interrupt,
        output: String,
    },
}

impl ExecutionError {
    /// Name of the formatter that failed.
    pub fn formatter(&self) -> &str {
        match self {
            ExecutionError::Spawn { formatter, .. }
            | ExecutionError::Io { formatter, .. }
            | ExecutionError::Failed { formatter, .. }
            | ExecutionError::Interrupted { formatter, .. } => formatter,
        }
    }

    /// Combined output captured before the failure. Empty if the process never ran.
    pub fn output(&self) -> &str {
        match self {
            ExecutionError::Spawn { .. } => "",
            ExecutionError::Io { output, .. }
            | ExecutionError::Failed { output, .. }
            | ExecutionError::Interrupted { output, .. } => output,
        }
    }

    /// Exit code of the subprocess, if it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecutionError::Failed { status, .. } => status.code(),
            _ => None,
        }
    }

    /// The interrupt, if this error is cancellation or a deadline.
    pub fn interrupt(&self) -> Option<Interrupt> {
        match self {
            ExecutionError::Interrupted { interrupt, .. } => Some(*interrupt),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.interrupt().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::compile_patterns;

    #[test]
    fn test_pattern_error_names_formatter_and_list() {
        let source = compile_patterns(&["[bad"]).unwrap_err();
        let err = FormatterError::Pattern {
            name: "gofmt".to_string(),
            list: PatternList::Excludes,
            source,
        };
        let message = err.to_string();
        assert!(message.contains("gofmt"), "{message}");
        assert!(message.contains("excludes"), "{message}");
        assert!(message.contains("[bad"), "{message}");
        assert!(!err.is_command_not_found());
    }

    #[test]
    fn test_command_not_found_message() {
        let err = FormatterError::CommandNotFound {
            name: "go".to_string(),
            command: "gofmt".to_string(),
        };
        assert!(err.is_command_not_found());
        assert_eq!(
            err.to_string(),
            "formatter 'go': command 'gofmt' not found in PATH"
        );
    }

    #[test]
    fn test_interrupted_accessors() {
        let err = ExecutionError::Interrupted {
            formatter: "slow".to_string(),
            interrupt: Interrupt::DeadlineExceeded,
            output: "partial".to_string(),
        };
        assert_eq!(err.formatter(), "slow");
        assert_eq!(err.output(), "partial");
        assert_eq!(err.exit_code(), None);
        assert!(err.is_cancelled());
        assert_eq!(
            err.to_string(),
            "formatter 'slow': context deadline exceeded"
        );
    }

    #[test]
    fn test_spawn_has_no_output() {
        let err = ExecutionError::Spawn {
            formatter: "x".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.output(), "");
        assert!(!err.is_cancelled());
        assert!(std::error::Error::source(&err).is_some());
    }
}
