//! Pipeline configuration loading.
//!
//! # Responsibility
//! - Load `configs/memo.yaml` (YAML, JSON accepted) over built-in defaults.
//! - Validate policy values before any pipeline step consumes them.
//!
//! # Invariants
//! - A missing or empty config file yields the defaults.
//! - Missing keys fall back to defaults per section.
//! - Invalid values are rejected, never clamped.

use crate::logging::default_log_level;
use crate::model::category::Category;
use crate::workspace::{write_atomic, Workspace};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::PathBuf;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, message: String },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to access config `{}`: {source}", path.display())
            }
            Self::Parse { path, message } => {
                write!(f, "failed to parse config `{}`: {message}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    pub core_categories: Vec<Category>,
    /// Lift `#hashtags` from raw content into entry tags.
    pub allow_custom_tags: bool,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            core_categories: Category::ALL.to_vec(),
            allow_custom_tags: true,
        }
    }
}

/// How the batch-size trigger turns into summary artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// One digest artifact for the whole batch.
    Digest,
    /// Every ready note in the batch gets its own summary.
    PerNote,
}

impl BatchPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Digest => "digest",
            Self::PerNote => "per_note",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    pub enabled: bool,
    pub min_words: usize,
    pub batch_trigger_count: usize,
    pub redundancy_similarity_threshold: f64,
    pub batch_policy: BatchPolicy,
    /// Record summary artifacts in `entries.jsonl` next to their entries.
    pub index_summaries: bool,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_words: 180,
            batch_trigger_count: 5,
            redundancy_similarity_threshold: 0.85,
            batch_policy: BatchPolicy::Digest,
            index_summaries: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub default_branch: String,
    pub commit_prefix: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
            commit_prefix: "memo:".to_string(),
            author_name: None,
            author_email: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rolling log files; logging stays off when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub taxonomy: TaxonomyConfig,
    pub summarization: SummarizationConfig,
    pub git: GitConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Rejects values no pipeline step can honor.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.taxonomy.core_categories.is_empty() {
            return Err(ConfigError::Invalid(
                "taxonomy.core_categories cannot be empty".to_string(),
            ));
        }
        let summarization = &self.summarization;
        if summarization.min_words == 0 {
            return Err(ConfigError::Invalid(
                "summarization.min_words must be positive".to_string(),
            ));
        }
        if summarization.batch_trigger_count == 0 {
            return Err(ConfigError::Invalid(
                "summarization.batch_trigger_count must be positive".to_string(),
            ));
        }
        let threshold = summarization.redundancy_similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "summarization.redundancy_similarity_threshold must be within [0, 1], got {threshold}"
            )));
        }
        if self.git.commit_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "git.commit_prefix cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads workspace config, falling back to defaults when the file is absent.
pub fn load_config(workspace: &Workspace) -> ConfigResult<AppConfig> {
    let path = workspace.config_path();
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            info!("event=config_load module=config status=ok source=defaults");
            return Ok(AppConfig::default());
        }
        Err(source) => return Err(ConfigError::Io { path, source }),
    };

    let config = if content.trim().is_empty() {
        warn!("event=config_load module=config status=ok source=empty_file");
        AppConfig::default()
    } else {
        serde_yaml::from_str::<AppConfig>(&content).map_err(|err| ConfigError::Parse {
            path: path.clone(),
            message: err.to_string(),
        })?
    };

    config.validate()?;
    info!("event=config_load module=config status=ok source=file");
    Ok(config)
}

/// Writes the default config as pretty JSON and returns its path.
pub fn init_default_config(workspace: &Workspace) -> ConfigResult<PathBuf> {
    let path = workspace.config_path();
    let mut rendered = serde_json::to_string_pretty(&AppConfig::default())
        .map_err(|err| ConfigError::Invalid(err.to_string()))?;
    rendered.push('\n');
    write_atomic(&path, rendered.as_bytes()).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
