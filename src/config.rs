use std::collections::BTreeMap;
use std::path::PathBuf;

use docrel_core::{ConfigurationError, SyncSpec};
use serde::Serialize;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "DOCREL_CONFIG";

/// Connection settings that may be overridden from the environment.
const OVERRIDES: &[(&str, &str)] = &[
    ("source.host", "DOCREL_SOURCE_HOST"),
    ("source.port", "DOCREL_SOURCE_PORT"),
    ("source.user", "DOCREL_SOURCE_USER"),
    ("source.password", "DOCREL_SOURCE_PASSWORD"),
    ("source.database", "DOCREL_SOURCE_DATABASE"),
    ("target.url", "DOCREL_TARGET_URL"),
    ("target.schema", "DOCREL_TARGET_SCHEMA"),
];

/// Source of a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Loaded and validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Config file the mapping was read from
    pub config_file: PathBuf,
    pub spec: SyncSpec,
    sources: BTreeMap<&'static str, ConfigSource>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with(config_path, |name| std::env::var(name).ok())
    }

    /// Like [`Config::load`], reading environment variables through `env`.
    pub fn load_with<F>(config_path: Option<PathBuf>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = config_path
            .or_else(|| env(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(Self::default_config_path);
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

        let contents =
            std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError(path.clone(), e))?;
        let raw: serde_yaml::Value = serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

        let mut sources = BTreeMap::new();
        for (key, _) in OVERRIDES {
            let source = if lookup(&raw, key).is_some() {
                ConfigSource::File
            } else {
                ConfigSource::Default
            };
            sources.insert(*key, source);
        }

        let mut spec: SyncSpec =
            serde_yaml::from_value(raw).map_err(|e| ConfigError::ParseError(path.clone(), e))?;

        // Apply environment variable overrides
        for (key, variable) in OVERRIDES {
            if let Some(value) = env(variable) {
                apply_override(&mut spec, key, *variable, value)?;
                sources.insert(*key, ConfigSource::Environment);
            }
        }

        spec.validate().map_err(ConfigError::Invalid)?;

        Ok(Self {
            config_file: path,
            spec,
            sources,
        })
    }

    /// Default config file path: ./config/mapping.yaml
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("config").join("mapping.yaml")
    }

    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.sources
            .get(key)
            .copied()
            .unwrap_or(ConfigSource::Default)
    }

    /// Connection settings with their sources. Passwords are masked.
    pub fn connection_settings(&self) -> Vec<(&'static str, ConfigValue<String>)> {
        let source = &self.spec.source;
        let target = &self.spec.target;
        let values = [
            source.host.clone(),
            source.port.to_string(),
            source.user.clone(),
            mask(&source.password),
            source.database.clone(),
            target.url.clone(),
            target.schema.clone().unwrap_or_default(),
        ];

        OVERRIDES
            .iter()
            .zip(values)
            .map(|((key, _), value)| (*key, ConfigValue::new(value, self.source_of(key))))
            .collect()
    }
}

fn lookup<'a>(raw: &'a serde_yaml::Value, dotted: &str) -> Option<&'a serde_yaml::Value> {
    dotted
        .split('.')
        .try_fold(raw, |value, segment| value.get(segment))
        .filter(|value| !value.is_null())
}

fn apply_override(
    spec: &mut SyncSpec,
    key: &str,
    variable: &'static str,
    value: String,
) -> Result<(), ConfigError> {
    match key {
        "source.host" => spec.source.host = value,
        "source.port" => {
            spec.source.port = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { variable, value })?
        }
        "source.user" => spec.source.user = value,
        "source.password" => spec.source.password = value,
        "source.database" => spec.source.database = value,
        "target.url" => spec.target.url = value,
        "target.schema" => spec.target.schema = Some(value).filter(|s| !s.trim().is_empty()),
        _ => {}
    }
    Ok(())
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    NotFound(PathBuf),
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue {
        variable: &'static str,
        value: String,
    },
    Invalid(ConfigurationError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(path) => {
                write!(f, "Config file '{}' not found", path.display())
            }
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue { variable, value } => {
                write!(f, "Invalid value '{}' for {}", value, variable)
            }
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError(_, e) => Some(e),
            ConfigError::ParseError(_, e) => Some(e),
            ConfigError::Invalid(e) => Some(e),
            _ => None,
        }
    }
}
