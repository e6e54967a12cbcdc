use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};

/// Settings filename looked up in the working directory.
const CONFIG_FILE: &str = "catx.toml";
/// Meetings per section before their extraction is forked.
const DEFAULT_FORK_THRESHOLD: usize = 4;

/// Engine configuration resolved from an optional settings file.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path the settings were (or would have been) read from.
    pub config_path: PathBuf,
    /// Settings loaded from the file, or defaults.
    pub settings: Settings,
}

/// User-configurable settings from catx.toml.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Scheduling configuration.
    pub engine: EngineSettings,
    /// Output configuration.
    pub output: OutputSettings,
    /// Log configuration.
    pub logging: LoggingSettings,
}

/// How failures inside a batch are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicyKind {
    /// Log each failure, finish every task, then report.
    #[default]
    Continue,
    /// Cancel tasks that have not started after the first failure.
    FailFast,
    /// Record failures without logging or re-raising them.
    Suppress,
}

/// Scheduling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Worker threads; 0 means one per CPU.
    pub workers: usize,
    /// Minimum meeting count before a section's meetings are forked.
    pub fork_threshold: usize,
    /// Failure policy for the course batch.
    pub failure_policy: FailurePolicyKind,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            workers: 0,
            fork_threshold: DEFAULT_FORK_THRESHOLD,
            failure_policy: FailurePolicyKind::Continue,
        }
    }
}

/// Output-related settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Pretty-print JSON results.
    pub pretty: bool,
}

/// Log settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

impl Config {
    /// Load settings from `path`, or from `catx.toml` in the working
    /// directory when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::current_dir()
                .map_err(|e| ExtractError::Config(format!("cannot get cwd: {e}")))?
                .join(CONFIG_FILE),
        };
        Ok(Self::new(config_path))
    }

    /// Create config for a settings path. A missing or invalid file yields
    /// the defaults.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        let settings = Self::load_settings(&config_path).unwrap_or_default();
        Self {
            config_path,
            settings,
        }
    }

    fn load_settings(config_path: &Path) -> Option<Settings> {
        if !config_path.exists() {
            return None;
        }
        let content = std::fs::read_to_string(config_path).ok()?;
        match toml::from_str(&content) {
            Ok(settings) => Some(settings),
            Err(e) => {
                tracing::warn!(path = %config_path.display(), error = %e, "invalid settings, using defaults");
                None
            }
        }
    }

    /// Save current settings.
    pub fn save_settings(&self) -> Result<()> {
        let content = toml::to_string_pretty(&self.settings)
            .map_err(|e| ExtractError::Config(format!("failed to serialize settings: {e}")))?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }
}
