//! Resolved client configuration with provenance
//!
//! The result of merging every layer. Built once in `main` and passed by
//! value or reference to everything that needs it; nothing reads ambient
//! global state.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::credentials;
use super::defaults::BuiltinDefaults;
use super::merge::{env_layer, merge_layers};
use crate::host::RetryPolicy;
use crate::timeout::TailTimeouts;

/// Origin of a configuration layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Env,
    Cli,
}

/// A contributing layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,
    /// File path (file layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// How results are printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Text, spinners and prompts
    #[default]
    Human,
    /// Machine-readable JSON only; never prompts
    Json,
}

/// Build-log polling settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    pub poll_interval_ms: u64,
    pub deadline_seconds: u64,
}

impl PollSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_seconds)
    }
}

/// Flags given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub json: bool,
    pub verbose: bool,
}

impl CliOverrides {
    fn to_value(&self) -> Value {
        let mut layer = Map::new();
        if let Some(host) = self.host.as_ref().filter(|h| !h.is_empty()) {
            layer.insert("host".to_string(), Value::String(host.clone()));
        }
        if self.json {
            layer.insert("output".to_string(), Value::String("json".to_string()));
        }
        if self.verbose {
            layer.insert("verbose".to_string(), Value::Bool(true));
        }
        Value::Object(layer)
    }
}

/// Fully resolved client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub host: String,
    #[serde(default)]
    pub api_token: Option<String>,
    pub output: OutputMode,
    pub verbose: bool,
    pub request_timeout_seconds: u64,
    pub retry_delays_ms: Vec<u64>,
    pub tail: PollSettings,
    pub login: PollSettings,
    /// Layers that contributed, lowest precedence first
    #[serde(default, skip_deserializing)]
    pub sources: Vec<ConfigSource>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            host: defaults.host,
            api_token: None,
            output: OutputMode::Human,
            verbose: false,
            request_timeout_seconds: defaults.request_timeout_seconds,
            retry_delays_ms: defaults.retry_delays_ms,
            tail: PollSettings {
                poll_interval_ms: defaults.tail_poll_interval_ms,
                deadline_seconds: defaults.tail_deadline_seconds,
            },
            login: PollSettings {
                poll_interval_ms: defaults.login_poll_interval_ms,
                deadline_seconds: defaults.login_deadline_seconds,
            },
            sources: vec![ConfigSource {
                origin: ConfigOrigin::Builtin,
                path: None,
            }],
        }
    }
}

impl ClientConfig {
    /// Resolve from the default config file, the process environment and
    /// CLI flags
    pub fn load(cli: &CliOverrides) -> Result<Self, ConfigError> {
        let path = credentials::default_config_path()?;
        Self::build(Some(&path), |name| std::env::var(name).ok(), cli)
    }

    /// Resolve from explicit layers
    pub fn build<F>(
        config_file: Option<&Path>,
        env: F,
        cli: &CliOverrides,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
        }];

        if let Some(path) = config_file {
            layers.push(credentials::load_layer(path)?);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
            });
        }

        layers.push(env_layer(env));
        sources.push(ConfigSource {
            origin: ConfigOrigin::Env,
            path: None,
        });

        layers.push(cli.to_value());
        sources.push(ConfigSource {
            origin: ConfigOrigin::Cli,
            path: None,
        });

        let merged = merge_layers(layers);
        let mut config: ClientConfig = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ParseError(format!("invalid configuration: {}", e)))?;
        config.api_token = config.api_token.filter(|t| !t.is_empty());
        config.host = config.host.trim_end_matches('/').to_string();
        config.sources = sources;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.host.starts_with("http://") || self.host.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "host must be an http(s) URL, got {:?}",
                self.host
            )));
        }
        if self.request_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_seconds must be positive".to_string(),
            ));
        }
        self.tail_timeouts()
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("tail: {}", e)))?;
        self.login_timeouts()
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("login: {}", e)))?;
        Ok(())
    }

    pub fn is_json(&self) -> bool {
        self.output == OutputMode::Json
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        )
    }

    pub fn tail_timeouts(&self) -> TailTimeouts {
        TailTimeouts::new(self.tail.poll_interval(), self.tail.deadline())
    }

    pub fn login_timeouts(&self) -> TailTimeouts {
        TailTimeouts::new(self.login.poll_interval(), self.login.deadline())
    }

    /// Serialized view with the token masked, for diagnostics
    pub fn redacted(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(token) = value.get_mut("api_token") {
            if !token.is_null() {
                *token = Value::String("[REDACTED]".to_string());
            }
        }
        value
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_build_with_defaults_only() {
        let config = ClientConfig::build(None, no_env, &CliOverrides::default()).unwrap();

        assert_eq!(config.host, "https://kyper.shop");
        assert_eq!(config.output, OutputMode::Human);
        assert!(config.api_token.is_none());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.tail.deadline(), Duration::from_secs(1800));
    }

    #[test]
    fn test_precedence_file_env_cli() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "api_token = \"file_tok\"\nhost = \"https://file.example\"\n[tail]\ndeadline_seconds = 60\n",
        )
        .unwrap();

        let env = |name: &str| match name {
            "KYPER_HOST" => Some("https://env.example".to_string()),
            _ => None,
        };
        let cli = CliOverrides {
            host: Some("http://localhost:3000/".to_string()),
            json: true,
            verbose: false,
        };

        let config = ClientConfig::build(Some(&path), env, &cli).unwrap();
        assert_eq!(config.host, "http://localhost:3000");
        assert_eq!(config.api_token.as_deref(), Some("file_tok"));
        assert!(config.is_json());
        assert_eq!(config.tail.deadline_seconds, 60);
        assert_eq!(config.tail.poll_interval_ms, 2000);
        assert_eq!(config.sources.len(), 4);
    }

    #[test]
    fn test_env_token_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "api_token = \"file_tok\"\n").unwrap();

        let env = |name: &str| (name == "KYPER_TOKEN").then(|| "env_tok".to_string());
        let config = ClientConfig::build(Some(&path), env, &CliOverrides::default()).unwrap();
        assert_eq!(config.api_token.as_deref(), Some("env_tok"));
    }

    #[test]
    fn test_invalid_host_rejected() {
        let cli = CliOverrides {
            host: Some("kyper.shop".to_string()),
            ..Default::default()
        };
        let result = ClientConfig::build(None, no_env, &cli);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[tail]\ndeadline_seconds = 0\n").unwrap();

        let result = ClientConfig::build(Some(&path), no_env, &CliOverrides::default());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[tail]\npoll_interval_ms = 0\n").unwrap();

        let result = ClientConfig::build(Some(&path), no_env, &CliOverrides::default());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_login_timeouts_validated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        fs::write(&path, "[login]\npoll_interval_ms = 0\n").unwrap();
        let result = ClientConfig::build(Some(&path), no_env, &CliOverrides::default());
        match result {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.starts_with("login:")),
            other => panic!("expected login validation error, got {:?}", other),
        }

        fs::write(&path, "[login]\ndeadline_seconds = 0\n").unwrap();
        let result = ClientConfig::build(Some(&path), no_env, &CliOverrides::default());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_redacted_masks_token() {
        let env = |name: &str| (name == "KYPER_TOKEN").then(|| "secret".to_string());
        let config = ClientConfig::build(None, env, &CliOverrides::default()).unwrap();

        let redacted = config.redacted();
        assert_eq!(redacted["api_token"], "[REDACTED]");
        assert!(!redacted.to_string().contains("secret"));
    }
}
