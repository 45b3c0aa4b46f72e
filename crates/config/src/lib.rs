//! Configuration loading, validation, and management for Tandem.
//!
//! Loads configuration from `~/.tandem/config.toml` with environment
//! variable overrides. Validates all settings at load time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod logging;

/// Iteration ceiling a `LoopAgent` uses when none is configured.
pub const DEFAULT_LOOP_MAX_ITERATIONS: i64 = 10;

/// Fan-in channel slots reserved per child of a `ParallelAgent`.
pub const DEFAULT_PARALLEL_BUFFER_PER_CHILD: usize = 8;

/// Delegation rounds a `SupervisorAgent` runs when none is configured.
pub const DEFAULT_SUPERVISOR_MAX_ROUNDS: i64 = 1;

/// The root configuration structure.
///
/// Maps directly to `~/.tandem/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TandemConfig {
    /// Loop agent defaults
    #[serde(default)]
    pub loop_agent: LoopConfig,

    /// Parallel agent defaults
    #[serde(default)]
    pub parallel: ParallelConfig,

    /// Supervisor agent defaults
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Logging setup
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: i64,
}

fn default_max_iterations() -> i64 {
    DEFAULT_LOOP_MAX_ITERATIONS
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Streaming fan-in capacity is `buffer_per_child * children`.
    #[serde(default = "default_buffer_per_child")]
    pub buffer_per_child: usize,
}

fn default_buffer_per_child() -> usize {
    DEFAULT_PARALLEL_BUFFER_PER_CHILD
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            buffer_per_child: default_buffer_per_child(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: i64,
}

fn default_max_rounds() -> i64 {
    DEFAULT_SUPERVISOR_MAX_ROUNDS
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "tandem_agent=debug". `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub with_target: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            with_target: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::ValidationError(format!(
                "unknown log format '{other}' (expected 'pretty' or 'json')"
            ))),
        }
    }
}

impl TandemConfig {
    /// Load configuration from the default path (~/.tandem/config.toml).
    ///
    /// Environment variables override file values:
    /// - `TANDEM_LOOP_MAX_ITERATIONS`
    /// - `TANDEM_PARALLEL_BUFFER`
    /// - `TANDEM_SUPERVISOR_MAX_ROUNDS`
    /// - `TANDEM_LOG_LEVEL`
    /// - `TANDEM_LOG_FORMAT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tandem")
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = lookup("TANDEM_LOOP_MAX_ITERATIONS") {
            self.loop_agent.max_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "TANDEM_LOOP_MAX_ITERATIONS must be an integer, got '{raw}'"
                ))
            })?;
        }

        if let Some(raw) = lookup("TANDEM_PARALLEL_BUFFER") {
            self.parallel.buffer_per_child = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "TANDEM_PARALLEL_BUFFER must be a positive integer, got '{raw}'"
                ))
            })?;
        }

        if let Some(raw) = lookup("TANDEM_SUPERVISOR_MAX_ROUNDS") {
            self.supervisor.max_rounds = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "TANDEM_SUPERVISOR_MAX_ROUNDS must be an integer, got '{raw}'"
                ))
            })?;
        }

        if let Some(level) = lookup("TANDEM_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("TANDEM_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }

        Ok(())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.loop_agent.max_iterations <= 0 {
            return Err(ConfigError::ValidationError(
                "loop_agent.max_iterations must be > 0".into(),
            ));
        }

        if self.parallel.buffer_per_child == 0 {
            return Err(ConfigError::ValidationError(
                "parallel.buffer_per_child must be > 0".into(),
            ));
        }

        if self.supervisor.max_rounds <= 0 {
            return Err(ConfigError::ValidationError(
                "supervisor.max_rounds must be > 0".into(),
            ));
        }

        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "logging.level '{}' is not a valid filter directive",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = TandemConfig::default();
        assert_eq!(config.loop_agent.max_iterations, 10);
        assert_eq!(config.parallel.buffer_per_child, 8);
        assert_eq!(config.supervisor.max_rounds, 1);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let toml_str = TandemConfig::default_toml();
        let parsed: TandemConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.loop_agent.max_iterations, DEFAULT_LOOP_MAX_ITERATIONS);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = TandemConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.parallel.buffer_per_child, DEFAULT_PARALLEL_BUFFER_PER_CHILD);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[loop_agent]
max_iterations = 3

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = TandemConfig::load_from(file.path()).unwrap();
        assert_eq!(config.loop_agent.max_iterations, 3);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.parallel.buffer_per_child, 8);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn non_positive_iterations_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[loop_agent]\nmax_iterations = 0").unwrap();
        let err = TandemConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn unknown_format_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nformat = \"xml\"").unwrap();
        let err = TandemConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn zero_buffer_rejected() {
        let config = TandemConfig {
            parallel: ParallelConfig { buffer_per_child: 0 },
            ..TandemConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_rounds_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[supervisor]\nmax_rounds = -1").unwrap();
        let err = TandemConfig::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("supervisor.max_rounds"));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TANDEM_LOOP_MAX_ITERATIONS", "4"),
            ("TANDEM_PARALLEL_BUFFER", "2"),
            ("TANDEM_SUPERVISOR_MAX_ROUNDS", "3"),
            ("TANDEM_LOG_LEVEL", "tandem_agent=debug"),
            ("TANDEM_LOG_FORMAT", "JSON"),
        ]);
        let mut config = TandemConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.loop_agent.max_iterations, 4);
        assert_eq!(config.parallel.buffer_per_child, 2);
        assert_eq!(config.supervisor.max_rounds, 3);
        assert_eq!(config.logging.level, "tandem_agent=debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_env_override_rejected() {
        let mut config = TandemConfig::default();
        let err = config
            .apply_overrides(|k| (k == "TANDEM_LOOP_MAX_ITERATIONS").then(|| "ten".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("ten"));
    }
}
