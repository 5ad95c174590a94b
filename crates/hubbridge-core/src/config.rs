/*!
 * Configuration management for hubbridge.
 *
 * This module loads, validates, and exposes the settings for the bridge and
 * for each configured coordinator host.
 */
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::Metadata;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Timing shared by every host task
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Coordinator hosts to manage
    #[serde(default)]
    pub gateways: Vec<GatewayConfig>,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name, also used as the MQTT client id prefix
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Application environment (development, production, etc.)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (trace, debug, info, warn, error or a full directive)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to include the event target in log lines
    #[serde(default = "default_true")]
    pub with_target: bool,
}

/// Backoffs and timeouts used by the provisioning and transport loops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Wait between control port probes while the host is unreachable
    #[serde(default = "default_probe_backoff")]
    pub probe_backoff_secs: u64,

    /// Wait between failed provisioning or broker connection attempts
    #[serde(default = "default_transport_backoff")]
    pub transport_backoff_secs: u64,

    /// TCP connect timeout for probes and sessions
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Timeout for each step of the shell login handshake
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,

    /// Timeout for a single shell command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// MQTT keep-alive interval
    #[serde(default = "default_keep_alive")]
    pub mqtt_keep_alive_secs: u64,
}

/// Per-host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address of the coordinator
    pub host: String,

    /// Declared model string, used to pick the shell profile
    #[serde(default)]
    pub model: String,

    /// Shell password; `None` logs in without one
    #[serde(default)]
    pub password: Option<String>,

    /// Remote shell control port
    #[serde(default = "default_shell_port")]
    pub shell_port: u16,

    /// Port of the broker running on the coordinator
    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    /// Ignore offline notifications from child devices
    #[serde(default)]
    pub ignore_offline: bool,

    /// Decode messages from the debug channel as well
    #[serde(default)]
    pub debug_channel: bool,

    /// Forward coordinator statistics to its subscribers
    #[serde(default)]
    pub stats: bool,

    /// Where to fetch the broker binary when it is missing or corrupt
    #[serde(default)]
    pub broker_download_url: Option<String>,

    /// Known locations of the topology files
    #[serde(default)]
    pub topology: TopologyPaths,

    /// Per-device overrides keyed by MAC address or device id
    #[serde(default)]
    pub devices: HashMap<String, Metadata>,
}

/// Candidate locations for the coordinator and child device descriptions,
/// tried in order after the property pointers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyPaths {
    /// Coordinator identity files
    #[serde(default = "default_coordinator_info")]
    pub coordinator_info: Vec<String>,

    /// Child device list files
    #[serde(default = "default_device_info")]
    pub device_info: Vec<String>,

    /// miio configuration holding `did=` and `model=` lines
    #[serde(default = "default_device_conf")]
    pub device_conf: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            environment: default_environment(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: true,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            probe_backoff_secs: default_probe_backoff(),
            transport_backoff_secs: default_transport_backoff(),
            connect_timeout_secs: default_connect_timeout(),
            login_timeout_secs: default_login_timeout(),
            command_timeout_secs: default_command_timeout(),
            mqtt_keep_alive_secs: default_keep_alive(),
        }
    }
}

impl Default for TopologyPaths {
    fn default() -> Self {
        Self {
            coordinator_info: default_coordinator_info(),
            device_info: default_device_info(),
            device_conf: default_device_conf(),
        }
    }
}

impl BridgeConfig {
    /// Port probe backoff
    pub fn probe_backoff(&self) -> Duration {
        Duration::from_secs(self.probe_backoff_secs)
    }

    /// Provisioning/transport backoff
    pub fn transport_backoff(&self) -> Duration {
        Duration::from_secs(self.transport_backoff_secs)
    }

    /// Connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Login step timeout
    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    /// Command timeout
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl GatewayConfig {
    /// Create a host configuration with default settings
    pub fn new<S: Into<String>>(host: S) -> Self {
        Self {
            host: host.into(),
            model: String::new(),
            password: None,
            shell_port: default_shell_port(),
            mqtt_port: default_mqtt_port(),
            ignore_offline: false,
            debug_channel: false,
            stats: false,
            broker_download_url: None,
            topology: TopologyPaths::default(),
            devices: HashMap::new(),
        }
    }

    /// Set the declared model
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }
}

impl Config {
    /// Check the configuration for values the bridge cannot work with
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for gateway in &self.gateways {
            if gateway.host.trim().is_empty() {
                return Err(Error::config("gateway host must not be empty"));
            }
            if !seen.insert(gateway.host.as_str()) {
                return Err(Error::config(format!(
                    "gateway host {} configured more than once",
                    gateway.host
                )));
            }
        }
        if self.bridge.command_timeout_secs == 0 || self.bridge.connect_timeout_secs == 0 {
            return Err(Error::config("timeouts must be greater than zero"));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::serialization(e.to_string()))
    }
}

fn default_app_name() -> String {
    "hubbridge".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_probe_backoff() -> u64 {
    30
}

fn default_transport_backoff() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_login_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    30
}

fn default_keep_alive() -> u64 {
    60
}

fn default_shell_port() -> u16 {
    23
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_coordinator_info() -> Vec<String> {
    vec![
        "/data/zigbee/coordinator.info".to_string(),
        "/mnt/config/zigbee/coordinator.info".to_string(),
    ]
}

fn default_device_info() -> Vec<String> {
    vec![
        "/data/zigbee/device.info".to_string(),
        "/mnt/config/zigbee/device.info".to_string(),
    ]
}

fn default_device_conf() -> String {
    "/mnt/config/miio/device.conf".to_string()
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
    override_with: Option<Config>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Override with an existing config
    pub fn override_with(mut self, config: Config) -> Self {
        self.override_with = Some(config);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        if let Some(config) = self.override_with {
            config.validate()?;
            return Ok(config);
        }

        let default_config = Config::default();
        let mut config_builder = ConfigLib::builder().add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        config.validate()?;
        info!("Configuration loaded with {} gateway(s)", config.gateways.len());
        Ok(config)
    }
}

/// A thread-safe reference to a configuration
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new SharedConfig
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the config
    pub fn get(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.app_name, "hubbridge");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.bridge.probe_backoff_secs, 30);
        assert_eq!(config.bridge.transport_backoff_secs, 60);
        assert!(config.gateways.is_empty());
    }

    #[test]
    fn test_gateway_defaults() {
        let gateway = GatewayConfig::new("192.168.1.10");
        assert_eq!(gateway.shell_port, 23);
        assert_eq!(gateway.mqtt_port, 1883);
        assert!(!gateway.ignore_offline);
        assert_eq!(gateway.topology.coordinator_info.len(), 2);
    }

    #[test]
    fn test_config_builder_with_file() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("hubbridge.toml");

        {
            let mut file = File::create(&file_path)?;
            file.write_all(
                br#"
                [logging]
                level = "debug"

                [bridge]
                probe_backoff_secs = 5

                [[gateways]]
                host = "192.168.1.10"
                model = "lumi.gateway.acn01"
                ignore_offline = true

                [gateways.devices."0x158d0001"]
                name = "Hall sensor"
            "#,
            )?;
        }

        let config = ConfigBuilder::new().with_config_file(file_path).build()?;

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.bridge.probe_backoff_secs, 5);
        assert_eq!(config.bridge.transport_backoff_secs, 60);
        assert_eq!(config.gateways.len(), 1);
        let gateway = &config.gateways[0];
        assert_eq!(gateway.model, "lumi.gateway.acn01");
        assert!(gateway.ignore_offline);
        assert_eq!(gateway.shell_port, 23);
        assert!(gateway.devices.contains_key("0x158d0001"));

        Ok(())
    }

    #[test]
    fn test_config_builder_with_env() -> Result<()> {
        env::set_var("HUBBRIDGE__LOGGING__LEVEL", "trace");

        let config = ConfigBuilder::new()
            .with_environment_prefix("hubbridge")
            .build()?;

        assert_eq!(config.logging.level, "trace");

        env::remove_var("HUBBRIDGE__LOGGING__LEVEL");
        Ok(())
    }

    #[test]
    fn test_validate_rejects_duplicate_hosts() {
        let config = Config {
            gateways: vec![GatewayConfig::new("10.0.0.2"), GatewayConfig::new("10.0.0.2")],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_to_toml() -> Result<()> {
        let config = Config {
            gateways: vec![GatewayConfig::new("10.0.0.2")],
            ..Config::default()
        };
        let rendered = config.to_toml()?;
        assert!(rendered.contains("10.0.0.2"));
        Ok(())
    }

    #[test]
    fn test_shared_config() {
        let shared = SharedConfig::new(Config::default());
        let shared2 = shared.clone();
        assert_eq!(shared2.get().general.app_name, "hubbridge");
    }
}
