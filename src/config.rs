use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::runtime::DEFAULT_MAX_DEPTH;

pub const MAX_OPTIMIZATION_LEVEL: u8 = 3;
pub const STACK_DEPTH_LIMIT: usize = 100_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: impl fmt::Display, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// Walk the syntax tree.
    #[default]
    Interpreted,
    /// Build IR, optimize, emit bytecode and run it on the VM.
    Compiled,
}

impl FromStr for RuntimeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "interpreted" => Ok(RuntimeMode::Interpreted),
            "compiled" => Ok(RuntimeMode::Compiled),
            _ => Err(ConfigError::invalid(
                "runtime_mode",
                s,
                "expected 'interpreted' or 'compiled'",
            )),
        }
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuntimeMode::Interpreted => "interpreted",
            RuntimeMode::Compiled => "compiled",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive for `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(ConfigError::invalid(
                "log_level",
                s,
                "expected DEBUG, INFO, WARN or ERROR",
            )),
        }
    }
}

/// Settings for one session. Loaded from defaults, then an optional JSON
/// file, then `HELIX_*` environment variables; the CLI applies its flags
/// last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub debug_mode: bool,
    pub optimization_level: u8,
    pub runtime_mode: RuntimeMode,
    pub max_stack_depth: usize,
    pub log_level: LogLevel,
    pub stdlib_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug_mode: false,
            optimization_level: 2,
            runtime_mode: RuntimeMode::default(),
            max_stack_depth: DEFAULT_MAX_DEPTH,
            log_level: LogLevel::default(),
            stdlib_path: None,
        }
    }
}

impl Config {
    /// Defaults, overlaid by `path` when given, then by the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env(std::env::vars())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|error| match error {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `HELIX_*` overrides from `vars`. Unrelated variables are
    /// ignored.
    pub fn with_env<I, K, V>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                "HELIX_DEBUG_MODE" => self.debug_mode = parse_bool("debug_mode", value)?,
                "HELIX_OPT_LEVEL" => {
                    self.optimization_level = value.parse().map_err(|_| {
                        ConfigError::invalid("optimization_level", value, "expected an integer")
                    })?
                }
                "HELIX_RUNTIME_MODE" => self.runtime_mode = value.parse()?,
                "HELIX_MAX_STACK_DEPTH" => {
                    self.max_stack_depth = value.parse().map_err(|_| {
                        ConfigError::invalid("max_stack_depth", value, "expected an integer")
                    })?
                }
                "HELIX_LOG_LEVEL" => self.log_level = value.parse()?,
                "HELIX_STDLIB_PATH" => self.stdlib_path = Some(PathBuf::from(value)),
                _ => continue,
            }
            debug!(key = key.as_ref(), value, "config override from environment");
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.optimization_level > MAX_OPTIMIZATION_LEVEL {
            return Err(ConfigError::invalid(
                "optimization_level",
                self.optimization_level,
                format!("must be between 0 and {MAX_OPTIMIZATION_LEVEL}"),
            ));
        }
        if !(1..=STACK_DEPTH_LIMIT).contains(&self.max_stack_depth) {
            return Err(ConfigError::invalid(
                "max_stack_depth",
                self.max_stack_depth,
                format!("must be between 1 and {STACK_DEPTH_LIMIT}"),
            ));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "expected true or false")),
    }
}
