//! Core of batchfmt.
//!
//! This crate provides one formatter unit and what it needs:
//! - Glob pattern compilation and path matching
//! - Formatter construction, path selection and subprocess execution
//! - Cancellable run context
//! - Configuration records
//! - Error types

pub mod config;
pub mod context;
pub mod error;
pub mod formatter;
pub mod matcher;

pub use config::{Config, ConfigError, FormatterConfig, GlobalConfig};
pub use context::{Interrupt, RunContext};
pub use error::{ExecutionError, FormatterError, PatternList};
pub use formatter::{ApplyOutcome, Formatter};
pub use matcher::{compile_patterns, path_matches, PatternError, PatternSet};
