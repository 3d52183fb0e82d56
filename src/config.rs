//! Workflow configuration: defaults, an optional TOML file, then `APPROVALS_*` overrides
use super::error::ValidationError;
use super::money::Money;
use super::threshold::ThresholdPolicy;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub thresholds: ThresholdConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThresholdConfig {
    pub tier2_threshold: Money,
    pub tier3_threshold: Money,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid amount for `{key}`: {source}")]
    InvalidAmount {
        key: String,
        source: ValidationError,
    },
    #[error("configuration validation failed: {0}")]
    Validation(String),
    #[error("could not install log subscriber: {0}")]
    Logging(String),
}

// Everything optional so a file only needs to name what it changes.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    thresholds: Option<ThresholdPatch>,
    storage: Option<StoragePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ThresholdPatch {
    tier2: Option<String>,
    tier3: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoragePatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig {
                tier2_threshold: Money::whole(5_000),
                tier3_threshold: Money::whole(25_000),
            },
            storage: StorageConfig {
                path: PathBuf::from("approvals.db"),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Compact,
            },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl WorkflowConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = resolve_config_path(options.config_path.as_deref()) {
            let raw = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
                path: path.clone(),
                source,
            })?;
            let patch = toml::from_str::<ConfigPatch>(&raw)
                .map_err(|source| ConfigError::ParseFile { path, source })?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options
                .config_path
                .unwrap_or_else(|| PathBuf::from("approvals.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Defaults patched by a TOML document, without consulting the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let patch = toml::from_str::<ConfigPatch>(raw).map_err(|source| ConfigError::ParseFile {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        let mut config = Self::default();
        config.apply_patch(patch)?;
        config.validate()?;
        Ok(config)
    }

    pub fn threshold_policy(&self) -> Result<ThresholdPolicy, ConfigError> {
        ThresholdPolicy::from_config(&self.thresholds)
            .map_err(|error| ConfigError::Validation(error.to_string()))
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(thresholds) = patch.thresholds {
            if let Some(tier2) = thresholds.tier2 {
                self.thresholds.tier2_threshold = parse_amount("thresholds.tier2", &tier2)?;
            }
            if let Some(tier3) = thresholds.tier3 {
                self.thresholds.tier3_threshold = parse_amount("thresholds.tier3", &tier3)?;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(path) = storage.path {
                self.storage.path = path;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    /// Apply `APPROVALS_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("APPROVALS_TIER2_THRESHOLD") {
            self.thresholds.tier2_threshold = parse_amount("APPROVALS_TIER2_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("APPROVALS_TIER3_THRESHOLD") {
            self.thresholds.tier3_threshold = parse_amount("APPROVALS_TIER3_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("APPROVALS_STORAGE_PATH") {
            self.storage.path = PathBuf::from(value);
        }
        if let Some(value) = lookup("APPROVALS_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = lookup("APPROVALS_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.threshold_policy()?;

        if self.storage.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "storage.path must not be empty".to_string(),
            ));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Validation(format!(
                "unsupported log level `{}` (expected trace|debug|info|warn|error)",
                self.logging.level
            )));
        }

        Ok(())
    }
}

fn parse_amount(key: &str, value: &str) -> Result<Money, ConfigError> {
    Money::parse(value).map_err(|source| ConfigError::InvalidAmount {
        key: key.to_string(),
        source,
    })
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [
        PathBuf::from("approvals.toml"),
        PathBuf::from("config/approvals.toml"),
    ]
    .into_iter()
    .find(|path| path.exists())
}
