//! Formatter configuration records.
//!
//! A configuration file is TOML with one optional `[global]` table and one
//! `[formatter.<name>]` table per tool:
//!
//! ```toml
//! [global]
//! excludes = ["generated/**"]
//!
//! [formatter.gofmt]
//! command = "gofmt"
//! options = ["-w"]
//! includes = ["*.go"]
//! excludes = ["vendor/**"]
//!
//! [formatter.deadnix]
//! command = "deadnix"
//! options = ["--edit"]
//! includes = ["*.nix"]
//! pipeline = "nix"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matcher::{compile_patterns, PatternError, PatternSet};

/// Error type for loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML or does not fit the schema.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A global exclude pattern failed to compile.
    #[error("global excludes: {0}")]
    GlobalExcludes(#[source] PatternError),
}

/// Configuration of one formatter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatterConfig {
    /// Executable name or path.
    pub command: String,
    /// Arguments placed before the file paths on every invocation.
    #[serde(default)]
    pub options: Vec<String>,
    /// Glob patterns of paths this formatter wants.
    #[serde(default)]
    pub includes: Vec<String>,
    /// Glob patterns of paths this formatter never touches.
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Pipeline this formatter belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
}

impl FormatterConfig {
    /// Create a config for `command` with no options or patterns.
    pub fn new(command: impl Into<String>) -> Self {
        FormatterConfig {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_options<S: Into<String>>(mut self, options: impl IntoIterator<Item = S>) -> Self {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_includes<S: Into<String>>(mut self, includes: impl IntoIterator<Item = S>) -> Self {
        self.includes = includes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_excludes<S: Into<String>>(mut self, excludes: impl IntoIterator<Item = S>) -> Self {
        self.excludes = excludes.into_iter().map(Into::into).collect();
        self
    }

    pub fn in_pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = Some(pipeline.into());
        self
    }

    /// The pipeline name, treating an empty string as none.
    pub fn pipeline_name(&self) -> Option<&str> {
        self.pipeline.as_deref().filter(|p| !p.is_empty())
    }
}

/// Settings that apply to every formatter in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Exclude patterns appended to every formatter's own excludes.
    #[serde(default)]
    pub excludes: Vec<String>,
}

/// A whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    /// Formatters keyed by name.
    #[serde(default)]
    pub formatter: BTreeMap<String, FormatterConfig>,
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Compile the global exclude patterns.
    pub fn global_excludes(&self) -> Result<PatternSet, ConfigError> {
        compile_patterns(&self.global.excludes).map_err(ConfigError::GlobalExcludes)
    }
}
