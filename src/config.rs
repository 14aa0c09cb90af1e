//! Layered TOML configuration.
//!
//! Defaults are overridden by `~/.patchq.toml`, which is overridden by
//! `.patchq.toml` in the repository. The queue-branch pattern and the
//! path-exclude regex are validated at load time so a bad value fails
//! the invocation up front rather than mid-operation.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::queue::{QueueError, QueuePattern, DEFAULT_QUEUE_PATTERN};

pub const CONFIG_FILE_NAME: &str = ".patchq.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml_edit::de::Error,
    },

    #[error(transparent)]
    Pattern(#[from] QueueError),

    #[error("invalid path-exclude pattern: {0}")]
    Exclude(regex::Error),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Queue-branch naming pattern; must contain `{branch}`.
    pub pq_branch: String,
    /// Directory the patches and series listing are exported to.
    pub patch_dir: PathBuf,
    /// Prefix patch files with a running ordinal.
    pub patch_numbers: bool,
    /// Exclude paths matching this pattern from exported patches.
    pub path_exclude: Option<String>,
    /// Default number of time-machine attempts for import.
    pub time_machine: usize,
    /// Commit the patch directory after export.
    pub commit: bool,
    /// Drop the queue branch after export.
    pub drop: bool,
    /// Spec document to keep in sync on export.
    pub spec_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pq_branch: DEFAULT_QUEUE_PATTERN.to_string(),
            patch_dir: PathBuf::from("patches"),
            patch_numbers: true,
            path_exclude: None,
            time_machine: 1,
            commit: false,
            drop: false,
            spec_file: None,
        }
    }
}

/// On-disk shape: every key optional so layers merge cleanly.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ConfigFile {
    pq_branch: Option<String>,
    patch_dir: Option<PathBuf>,
    patch_numbers: Option<bool>,
    path_exclude: Option<String>,
    time_machine: Option<usize>,
    commit: Option<bool>,
    drop: Option<bool>,
    spec_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration for a repository at `repo_dir`.
    pub fn load(repo_dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        let mut layers = Vec::new();
        if let Some(user_home) = home::home_dir() {
            layers.push(user_home.join(CONFIG_FILE_NAME));
        }
        layers.push(repo_dir.join(CONFIG_FILE_NAME));

        for path in layers {
            if !path.exists() {
                continue;
            }
            debug!("loading config from {}", path.display());
            let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let layer: ConfigFile =
                toml_edit::de::from_str(&content).map_err(|source| ConfigError::Toml {
                    path: path.clone(),
                    source,
                })?;
            config.merge(layer);
        }

        config.validate()?;
        Ok(config)
    }

    fn merge(&mut self, layer: ConfigFile) {
        if let Some(value) = layer.pq_branch {
            self.pq_branch = value;
        }
        if let Some(value) = layer.patch_dir {
            self.patch_dir = value;
        }
        if let Some(value) = layer.patch_numbers {
            self.patch_numbers = value;
        }
        if let Some(value) = layer.path_exclude {
            self.path_exclude = Some(value);
        }
        if let Some(value) = layer.time_machine {
            self.time_machine = value;
        }
        if let Some(value) = layer.commit {
            self.commit = value;
        }
        if let Some(value) = layer.drop {
            self.drop = value;
        }
        if let Some(value) = layer.spec_file {
            self.spec_file = Some(value);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        QueuePattern::new(&self.pq_branch)?;
        if let Some(pattern) = &self.path_exclude {
            Regex::new(pattern).map_err(ConfigError::Exclude)?;
        }
        Ok(())
    }

    /// The validated queue-branch pattern.
    pub fn queue_pattern(&self) -> QueuePattern {
        QueuePattern::new(&self.pq_branch).expect("pattern validated at load")
    }

    /// The validated path-exclude regex, if configured.
    pub fn exclude_regex(&self) -> Option<Regex> {
        self.path_exclude
            .as_deref()
            .map(|p| Regex::new(p).expect("exclude validated at load"))
    }
}
