//! Configuration module for the Switchboard server.
//!
//! Settings are layered, lowest precedence first: built-in defaults, an optional
//! TOML file, `SWITCHBOARD_*` environment variables (`__` separates sections, e.g.
//! `SWITCHBOARD_BACKEND__BASE_URL`), then command-line overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_abstraction::KeepAlive;
use switchboard_orchestrator::TaskDispatcherConfig;

use crate::error::ConfigError;

/// File read when no explicit path is given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "switchboard.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SWITCHBOARD";

/// HTTP intake configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Model-serving backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the Ollama server.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds. Loads of large models can be slow.
    /// Also bounds generation: a generate call running past it is recorded as failed.
    /// Zero disables the timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Keep-alive sent with load requests; negative keeps the model resident.
    #[serde(default = "default_keep_alive")]
    pub load_keep_alive_secs: i64,
}

fn default_base_url() -> String {
    switchboard_models::ollama::DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    300
}

fn default_keep_alive() -> i64 {
    -1
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            load_keep_alive_secs: default_keep_alive(),
        }
    }
}

impl BackendConfig {
    /// Keep-alive hint for load requests.
    pub fn keep_alive(&self) -> KeepAlive {
        KeepAlive::from_secs(self.load_keep_alive_secs)
    }

    /// Request timeout, or `None` when set to 0.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Dispatcher loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Seconds a model may sit unused before the sweep unloads it.
    /// Zero unloads every model that is not serving the current task.
    #[serde(default)]
    pub idle_timeout_secs: u64,
    /// Upper bound on how long the loop waits for a task before sweeping again.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    1000
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { idle_timeout_secs: 0, poll_interval_ms: default_poll_interval() }
    }
}

/// Outcome log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// CSV file truncated at startup and appended to per task.
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

fn default_log_file() -> String {
    "llm_metrics.csv".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { log_file: default_log_file() }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "switchboard=debug,info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: default_filter(), json: false }
    }
}

/// Values supplied on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub idle_timeout_secs: Option<u64>,
}

/// Root configuration for Switchboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from defaults, the config file and the environment.
    ///
    /// With `path` set the file must exist; otherwise [`DEFAULT_CONFIG_FILE`] is read
    /// if present.
    ///
    /// # Errors
    ///
    /// Returns an error if a layer cannot be read or the result fails validation.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let env = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true);
        Self::build(path, env, overrides)
    }

    fn build(
        path: Option<&Path>,
        env: config::Environment,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).format(config::FileFormat::Toml).required(true),
            None => config::File::new(DEFAULT_CONFIG_FILE, config::FileFormat::Toml).required(false),
        };

        let config: Self = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(file)
            .add_source(env)
            .set_override_option("server.port", overrides.port)?
            .set_override_option("dispatcher.idle_timeout_secs", overrides.idle_timeout_secs)?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".to_string()));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.base_url must not be empty".to_string()));
        }
        if self.backend.load_keep_alive_secs == 0 {
            // keep_alive 0 is how Ollama is told to unload.
            return Err(ConfigError::Invalid(
                "backend.load_keep_alive_secs must be negative or positive, not 0".to_string(),
            ));
        }
        if self.dispatcher.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Dispatcher settings in the orchestrator's terms.
    pub fn to_dispatcher_config(&self) -> TaskDispatcherConfig {
        TaskDispatcherConfig {
            poll_interval: Duration::from_millis(self.dispatcher.poll_interval_ms),
            idle_timeout: Duration::from_secs(self.dispatcher.idle_timeout_secs),
        }
    }
}
