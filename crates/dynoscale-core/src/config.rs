//! dynoscale.toml configuration parser.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{RatioTable, ScalingPolicy};

const DEFAULT_INTERVAL: &str = "10s";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PASSWORD_ENV: &str = "RABBITMQ_PASSWORD";
const DEFAULT_API_KEY_ENV: &str = "HEROKU_API_KEY";

/// Errors raised while loading or validating a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("interval must be greater than zero")]
    ZeroInterval,

    #[error("no targets configured")]
    NoTargets,

    #[error("target #{index}: {field} must not be empty")]
    EmptyField { index: usize, field: &'static str },

    #[error("target for queue {queue:?}: threshold key {key:?} is not a non-negative integer")]
    InvalidThreshold { queue: String, key: String },

    #[error("target for queue {queue:?}: more than one threshold for a backlog of {backlog}")]
    DuplicateThreshold { queue: String, backlog: u64 },

    #[error("target for queue {queue:?}: worker counts must not decrease as the backlog grows")]
    NonMonotonicThresholds { queue: String },

    #[error("process type {0:?} is controlled by more than one target")]
    DuplicateProcessType(String),

    #[error("{what} not set: provide it in the config or via ${var}")]
    MissingSecret { what: &'static str, var: String },
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynoscaleConfig {
    /// Time between the end of one tick and the start of the next.
    #[serde(default = "default_interval")]
    pub interval: String,
    pub rabbitmq: RabbitMqConfig,
    pub heroku: HerokuConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RabbitMqConfig {
    /// Base URL of the management API, e.g. `https://host`.
    pub url: String,
    pub username: String,
    pub password: Option<String>,
    /// Environment variable holding the password when `password` is unset.
    pub password_env: Option<String>,
    /// Restrict the queue listing to a single vhost.
    pub vhost: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HerokuConfig {
    /// App name or id.
    pub app: String,
    pub api_key: Option<String>,
    /// Environment variable holding the API key when `api_key` is unset.
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub queue: String,
    pub process_type: String,
    /// Backlog floor → worker count. TOML keys are strings, so they are
    /// parsed into integers during validation.
    #[serde(default)]
    pub thresholds: BTreeMap<String, u32>,
}

fn default_interval() -> String {
    DEFAULT_INTERVAL.to_string()
}

impl DynoscaleConfig {
    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: DynoscaleConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without touching the network
    /// or the environment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval()?.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        self.rabbitmq.timeout()?;
        self.heroku.timeout()?;

        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        let mut seen = HashSet::new();
        for (index, target) in self.targets.iter().enumerate() {
            if target.queue.trim().is_empty() {
                return Err(ConfigError::EmptyField { index, field: "queue" });
            }
            if target.process_type.trim().is_empty() {
                return Err(ConfigError::EmptyField {
                    index,
                    field: "process_type",
                });
            }
            // Two targets fighting over one process type would flap it.
            if !seen.insert(target.process_type.as_str()) {
                return Err(ConfigError::DuplicateProcessType(
                    target.process_type.clone(),
                ));
            }
            target.ratio_table()?;
        }

        Ok(())
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.interval)
    }

    /// Scaling policies in configured order.
    pub fn policies(&self) -> Result<Vec<ScalingPolicy>, ConfigError> {
        self.targets.iter().map(TargetConfig::to_policy).collect()
    }
}

impl RabbitMqConfig {
    pub fn password(&self) -> Result<String, ConfigError> {
        resolve_secret(
            self.password.as_deref(),
            self.password_env.as_deref().unwrap_or(DEFAULT_PASSWORD_ENV),
            "RabbitMQ password",
        )
    }

    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        optional_duration(self.timeout.as_deref())
    }
}

impl HerokuConfig {
    pub fn api_key(&self) -> Result<String, ConfigError> {
        resolve_secret(
            self.api_key.as_deref(),
            self.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV),
            "Heroku API key",
        )
    }

    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        optional_duration(self.timeout.as_deref())
    }
}

impl TargetConfig {
    /// Parse the threshold keys into a [`RatioTable`].
    pub fn ratio_table(&self) -> Result<RatioTable, ConfigError> {
        let mut table = RatioTable::new();
        for (key, workers) in &self.thresholds {
            let backlog = key
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidThreshold {
                    queue: self.queue.clone(),
                    key: key.clone(),
                })?;
            // "1" and "01" are distinct TOML keys but the same threshold.
            if table.insert(backlog, *workers).is_some() {
                return Err(ConfigError::DuplicateThreshold {
                    queue: self.queue.clone(),
                    backlog,
                });
            }
        }

        let counts: Vec<u32> = table.iter().map(|(_, w)| w).collect();
        if counts.windows(2).any(|w| w[1] < w[0]) {
            return Err(ConfigError::NonMonotonicThresholds {
                queue: self.queue.clone(),
            });
        }

        Ok(table)
    }

    pub fn to_policy(&self) -> Result<ScalingPolicy, ConfigError> {
        Ok(ScalingPolicy::new(
            self.queue.clone(),
            self.process_type.clone(),
            self.ratio_table()?,
        ))
    }
}

fn resolve_secret(
    inline: Option<&str>,
    var: &str,
    what: &'static str,
) -> Result<String, ConfigError> {
    if let Some(value) = inline {
        return Ok(value.to_string());
    }
    std::env::var(var).map_err(|_| ConfigError::MissingSecret {
        what,
        var: var.to_string(),
    })
}

fn optional_duration(s: Option<&str>) -> Result<Duration, ConfigError> {
    match s {
        Some(s) => parse_duration(s),
        None => Ok(DEFAULT_TIMEOUT),
    }
}

/// Parse a duration string like `"500ms"`, `"10s"`, `"5m"`.
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::InvalidDuration(s.to_string());

    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    } else {
        s.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
interval = "15s"

[rabbitmq]
url = "https://baboon.rmq.cloudamqp.com"
username = "user"
password = "secret"
vhost = "/"

[heroku]
app = "my-app"
api_key = "key"
timeout = "5s"

[[targets]]
queue = "foo"
process_type = "fooworker"
thresholds = { 1 = 1 }

[[targets]]
queue = "bar"
process_type = "mainworker"
thresholds = { 30 = 5, 1 = 1, 10 = 2 }
"#;

    fn example_with(replace: &str, with: &str) -> String {
        EXAMPLE.replace(replace, with)
    }

    #[test]
    fn test_parse_example() {
        let config = DynoscaleConfig::from_toml_str(EXAMPLE).unwrap();
        assert_eq!(config.interval().unwrap(), Duration::from_secs(15));
        assert_eq!(config.rabbitmq.password().unwrap(), "secret");
        assert_eq!(config.heroku.api_key().unwrap(), "key");
        assert_eq!(config.heroku.timeout().unwrap(), Duration::from_secs(5));
        assert_eq!(config.rabbitmq.timeout().unwrap(), DEFAULT_TIMEOUT);

        let policies = config.policies().unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].queue_name, "foo");
        assert_eq!(policies[0].process_type, "fooworker");
        assert_eq!(policies[1].process_type, "mainworker");
        assert_eq!(policies[1].thresholds.to_string(), "{1: 1, 10: 2, 30: 5}");
        assert_eq!(policies[1].thresholds.desired(12), 2);
    }

    #[test]
    fn test_interval_defaults_to_ten_seconds() {
        let config = DynoscaleConfig::from_toml_str(&example_with("interval = \"15s\"", "")).unwrap();
        assert_eq!(config.interval().unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = DynoscaleConfig::from_toml_str(&example_with("15s", "0s")).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroInterval));
    }

    #[test]
    fn test_rejects_non_integer_threshold() {
        let err =
            DynoscaleConfig::from_toml_str(&example_with("{ 1 = 1 }", "{ many = 1 }")).unwrap_err();
        match err {
            ConfigError::InvalidThreshold { queue, key } => {
                assert_eq!(queue, "foo");
                assert_eq!(key, "many");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_decreasing_worker_counts() {
        let err = DynoscaleConfig::from_toml_str(&example_with("{ 1 = 1 }", "{ 1 = 3, 5 = 2 }"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NonMonotonicThresholds { .. }));
    }

    #[test]
    fn test_rejects_keys_naming_the_same_threshold() {
        for keys in [r#"{ 1 = 1, "01" = 3 }"#, r#"{ 1 = 1, " 1" = 1 }"#] {
            let err = DynoscaleConfig::from_toml_str(&example_with("{ 1 = 1 }", keys)).unwrap_err();
            match err {
                ConfigError::DuplicateThreshold { queue, backlog } => {
                    assert_eq!(queue, "foo");
                    assert_eq!(backlog, 1);
                }
                other => panic!("unexpected error for {keys}: {other}"),
            }
        }
    }

    #[test]
    fn test_rejects_duplicate_process_type() {
        let err = DynoscaleConfig::from_toml_str(&example_with("mainworker", "fooworker")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateProcessType(p) if p == "fooworker"));
    }

    #[test]
    fn test_rejects_missing_targets() {
        let toml_str = EXAMPLE.split("[[targets]]").next().unwrap();
        let err = DynoscaleConfig::from_toml_str(toml_str).unwrap_err();
        assert!(matches!(err, ConfigError::NoTargets));
    }

    #[test]
    fn test_rejects_empty_queue_name() {
        let err = DynoscaleConfig::from_toml_str(&example_with("queue = \"foo\"", "queue = \" \""))
            .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyField { index: 0, field: "queue" }));
    }

    #[test]
    fn test_empty_thresholds_are_allowed() {
        let config =
            DynoscaleConfig::from_toml_str(&example_with("thresholds = { 1 = 1 }\n", "")).unwrap();
        let policies = config.policies().unwrap();
        assert!(policies[0].thresholds.is_empty());
    }

    #[test]
    fn test_missing_secret_names_the_variable() {
        let toml_str = example_with(
            "api_key = \"key\"",
            "api_key_env = \"DYNOSCALE_TEST_UNSET_API_KEY\"",
        );
        let config = DynoscaleConfig::from_toml_str(&toml_str).unwrap();
        match config.heroku.api_key().unwrap_err() {
            ConfigError::MissingSecret { var, .. } => {
                assert_eq!(var, "DYNOSCALE_TEST_UNSET_API_KEY")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dynoscale.toml");
        std::fs::write(&path, EXAMPLE).unwrap();

        let config = DynoscaleConfig::from_file(&path).unwrap();
        assert_eq!(config.targets.len(), 2);

        let err = DynoscaleConfig::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("-1s").is_err());
    }
}
