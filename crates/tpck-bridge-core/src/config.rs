//! Configuration types for the TPCK serial bridge.
//!
//! Configuration is loaded from YAML files and validated before use. Every
//! field has a default, so an empty document is a valid configuration apart
//! from the serial port path, which the command line may supply instead.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Environment variable naming the default listen host.
pub const HOST_ENV: &str = "TRPC_HOST";

/// Environment variable naming the default listen port.
pub const PORT_ENV: &str = "TRPC_PORT";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 55444;

/// Root configuration for the bridge.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Serial transport configuration.
    #[serde(default)]
    pub serial: SerialConfig,

    /// TCP listener configuration.
    #[serde(default)]
    pub listen: ListenConfig,

    /// Bridge loop timing and sizes.
    #[serde(default)]
    pub bridge: LoopConfig,

    /// Prometheus metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Device path, e.g. "/dev/ttyACM0". `${VAR}` references are expanded.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Most bytes read from the port per bridge iteration.
    #[serde(default = "default_read_size")]
    pub read_size: usize,

    /// How long one serial read may wait for data.
    #[serde(default = "default_short_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// TCP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    /// Address to bind to, "host:port". `${VAR}` references are expanded.
    #[serde(default = "default_listen_address")]
    pub address: String,
}

/// Bridge loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoopConfig {
    /// Bound on the client readiness check each iteration.
    #[serde(default = "default_short_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Most bytes received from one client per iteration.
    #[serde(default = "default_recv_size")]
    pub recv_size: usize,

    /// Bound on sending the outbound buffer to one client.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Whether to enable the metrics endpoint.
    #[serde(default)]
    pub enabled: bool,

    /// Address for the metrics HTTP server.
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Expand environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable `VAR_NAME`.
/// If the variable is not set, replaces with an empty string.
fn expand_env_vars(s: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex");
    re.replace_all(s, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .to_string()
}

/// Default listen host and port from the environment.
///
/// An unset or unparsable port falls back to [`DEFAULT_PORT`].
#[must_use]
pub fn host_defaults() -> (String, u16) {
    let host = std::env::var(HOST_ENV)
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = std::env::var(PORT_ENV)
        .ok()
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT);
    (host, port)
}

// Default value functions

fn default_baud_rate() -> u32 {
    9600
}

fn default_read_size() -> usize {
    100
}

fn default_short_timeout_ms() -> u64 {
    100
}

fn default_recv_size() -> usize {
    1024
}

fn default_write_timeout_ms() -> u64 {
    1000
}

fn default_listen_address() -> String {
    let (host, port) = host_defaults();
    format!("{host}:{port}")
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: None,
            baud_rate: default_baud_rate(),
            read_size: default_read_size(),
            read_timeout_ms: default_short_timeout_ms(),
        }
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_short_timeout_ms(),
            recv_size: default_recv_size(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl SerialConfig {
    /// The device path with environment references expanded.
    #[must_use]
    pub fn resolved_path(&self) -> Option<String> {
        self.path
            .as_deref()
            .map(expand_env_vars)
            .filter(|p| !p.is_empty())
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl ListenConfig {
    /// The listen address with environment references expanded.
    #[must_use]
    pub fn resolved_address(&self) -> String {
        expand_env_vars(&self.address)
    }

    /// Split the address into host and port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not `host:port`.
    pub fn parse_address(&self) -> ConfigResult<(String, u16)> {
        let addr = self.resolved_address();
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::InvalidAddress(addr.clone()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(addr.clone()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(ConfigError::InvalidAddress(addr.clone()));
        }
        Ok((host.to_string(), port))
    }
}

impl LoopConfig {
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

// Configuration loading and validation

impl BridgeConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&content)
    }

    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        // An empty document deserializes to unit, not an empty map.
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a size or timeout is zero or the listen address
    /// is not `host:port`.
    pub fn validate(&self) -> ConfigResult<()> {
        let non_zero = [
            ("serial.read_size", self.serial.read_size as u64),
            ("serial.read_timeout_ms", self.serial.read_timeout_ms),
            ("serial.baud_rate", u64::from(self.serial.baud_rate)),
            ("bridge.poll_timeout_ms", self.bridge.poll_timeout_ms),
            ("bridge.recv_size", self.bridge.recv_size as u64),
            ("bridge.write_timeout_ms", self.bridge.write_timeout_ms),
        ];
        if let Some((field, _)) = non_zero.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::InvalidValue {
                field: *field,
                reason: "must be greater than zero".to_string(),
            });
        }

        self.listen.parse_address()?;
        Ok(())
    }
}
