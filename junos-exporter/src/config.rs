//! Configuration for the Junos exporter.
//!
//! A config file holds named device profiles (`configs`) plus a `global`
//! section whose allowed targets, timeout and key lists apply to every
//! profile that does not set its own.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use junos_common::LoggingConfig;

use crate::collector;

/// Default NETCONF-over-SSH port.
pub const NETCONF_PORT: u16 = 830;

/// Session timeout when neither the profile nor the global section sets one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] junos_common::Error),
    #[error("{0}")]
    Validation(String),
}

/// Rejected scrape request. The message is returned verbatim to the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RequestError(pub String);

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// HTTP endpoint settings.
    #[serde(default)]
    pub web: WebConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Fallback settings shared by all profiles.
    #[serde(default)]
    pub global: GlobalConfig,

    /// Named device profiles, selected with the `config` query parameter.
    #[serde(default)]
    pub configs: HashMap<String, ProfileConfig>,
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Address to listen on (default: "0.0.0.0:9347").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:9347".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// Global fallback section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub allowed_targets: Vec<String>,

    /// Session timeout in seconds (0 = unset).
    #[serde(default)]
    pub timeout: u64,

    #[serde(default)]
    pub interface_description_keys: Vec<String>,

    #[serde(default)]
    pub interface_metric_keys: Vec<String>,

    #[serde(default)]
    pub bgp_peer_type_keys: Vec<String>,
}

/// One named device profile.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Path to a private key; takes precedence over `password`.
    #[serde(default)]
    pub ssh_key: Option<PathBuf>,

    /// Session timeout in seconds (0 = use global).
    #[serde(default)]
    pub timeout: u64,

    #[serde(default)]
    pub allowed_targets: Vec<String>,

    /// Collectors to run, in order.
    #[serde(default)]
    pub enabled_collectors: Vec<String>,

    #[serde(default)]
    pub interface_description_keys: Vec<String>,

    #[serde(default)]
    pub interface_metric_keys: Vec<String>,

    #[serde(default)]
    pub bgp_peer_type_keys: Vec<String>,
}

impl fmt::Debug for ProfileConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ssh_key", &self.ssh_key)
            .field("timeout", &self.timeout)
            .field("allowed_targets", &self.allowed_targets)
            .field("enabled_collectors", &self.enabled_collectors)
            .finish_non_exhaustive()
    }
}

/// How a session authenticates against the device.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Password(String),
    Key(PathBuf),
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Password(_) => f.write_str("Password(<redacted>)"),
            Auth::Key(path) => f.debug_tuple("Key").field(path).finish(),
        }
    }
}

/// Everything one scrape needs to know about its device.
///
/// Built per request from a profile and the requested target; never mutated
/// while the scrape runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Profile name the target was resolved against.
    pub profile: String,
    /// Target exactly as requested.
    pub target: String,
    /// `host:port` to dial.
    pub address: String,
    pub username: String,
    pub auth: Auth,
    /// Bounds session establishment.
    pub timeout: Duration,
    /// Enabled collector names, in configured order.
    pub collectors: Vec<String>,
    pub interface_description_keys: Vec<String>,
    pub interface_metric_keys: Vec<String>,
    pub bgp_peer_type_keys: Vec<String>,
}

impl TargetConfig {
    /// Minimal target for a device reachable with a password.
    pub fn new(target: impl Into<String>, collectors: &[&str]) -> Self {
        let target = target.into();
        Self {
            profile: String::new(),
            address: with_default_port(&target),
            target,
            username: String::new(),
            auth: Auth::Password(String::new()),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            collectors: collectors.iter().map(|c| c.to_string()).collect(),
            interface_description_keys: Vec::new(),
            interface_metric_keys: Vec::new(),
            bgp_peer_type_keys: Vec::new(),
        }
    }
}

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<String>,
    pub path: Option<String>,
    pub log_level: Option<String>,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_overrides(path, Overrides::default())
    }

    /// Load configuration from a JSON5 file, applying `overrides` before
    /// validation so a bad file value can be replaced on the command line.
    pub fn load_with_overrides<P: AsRef<Path>>(
        path: P,
        overrides: Overrides,
    ) -> Result<Self, ConfigError> {
        let mut config: ExporterConfig = junos_common::load_config(path)?;
        if let Some(listen) = overrides.listen {
            config.web.listen = listen;
        }
        if let Some(path) = overrides.path {
            config.web.path = path;
        }
        if let Some(level) = overrides.log_level {
            config.logging.level = level;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = junos_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.web.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.web.listen
            )));
        }

        if !self.web.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        let mut names: Vec<&String> = self.configs.keys().collect();
        names.sort();

        for name in names {
            self.configs[name].validate(name)?;
        }

        Ok(())
    }

    /// Resolve the `config` and `target` query parameters into a scrape target.
    pub fn resolve(&self, config: &str, target: &str) -> Result<TargetConfig, RequestError> {
        if config.is_empty() {
            return Err(RequestError(
                "'config' parameter must be specified".to_string(),
            ));
        }

        let Some(profile) = self.configs.get(config) else {
            return Err(RequestError(format!(
                "could not find {config:?} config in configuration file"
            )));
        };

        if target.is_empty() {
            return Err(RequestError(
                "'target' parameter must be specified".to_string(),
            ));
        }

        if !profile.allowed_targets.is_empty() {
            if !profile.allowed_targets.iter().any(|t| t == target) {
                return Err(RequestError(format!(
                    "allowed_targets is defined under {config:?} configuration but {target:?} is not listed"
                )));
            }
        } else if !self.global.allowed_targets.is_empty()
            && !self.global.allowed_targets.iter().any(|t| t == target)
        {
            return Err(RequestError(format!(
                "allowed_targets is defined under global configuration but {target:?} is not listed"
            )));
        }

        let timeout = [profile.timeout, self.global.timeout]
            .into_iter()
            .find(|t| *t != 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let auth = match &profile.ssh_key {
            Some(path) => Auth::Key(path.clone()),
            None => Auth::Password(profile.password.clone()),
        };

        Ok(TargetConfig {
            profile: config.to_string(),
            target: target.to_string(),
            address: with_default_port(target),
            username: profile.username.clone(),
            auth,
            timeout: Duration::from_secs(timeout),
            collectors: profile.enabled_collectors.clone(),
            interface_description_keys: or_global(
                &profile.interface_description_keys,
                &self.global.interface_description_keys,
            ),
            interface_metric_keys: or_global(
                &profile.interface_metric_keys,
                &self.global.interface_metric_keys,
            ),
            bgp_peer_type_keys: or_global(
                &profile.bgp_peer_type_keys,
                &self.global.bgp_peer_type_keys,
            ),
        })
    }
}

impl ProfileConfig {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.username.is_empty() {
            return Err(ConfigError::Validation(format!(
                "missing username in {name:?} configuration"
            )));
        }

        if self.password.is_empty() && self.ssh_key.is_none() {
            return Err(ConfigError::Validation(format!(
                "missing password or ssh_key in {name:?} configuration"
            )));
        }

        if self.enabled_collectors.is_empty() {
            return Err(ConfigError::Validation(format!(
                "no collectors enabled in {name:?} configuration"
            )));
        }

        if let Some(key) = &self.ssh_key {
            std::fs::metadata(key).map_err(|e| {
                ConfigError::Validation(format!(
                    "could not open ssh_key {:?} in {name:?} configuration: {e}",
                    key.display().to_string()
                ))
            })?;
            russh::keys::load_secret_key(key, None).map_err(|e| {
                ConfigError::Validation(format!(
                    "invalid ssh_key {:?} in {name:?} configuration: {e}",
                    key.display().to_string()
                ))
            })?;
        }

        if let Some(unknown) = self
            .enabled_collectors
            .iter()
            .find(|c| !collector::is_known(c))
        {
            return Err(ConfigError::Validation(format!(
                "invalid collector {unknown:?} in {name:?} configuration"
            )));
        }

        Ok(())
    }
}

fn or_global(profile: &[String], global: &[String]) -> Vec<String> {
    if profile.is_empty() {
        global.to_vec()
    } else {
        profile.to_vec()
    }
}

/// Append the NETCONF port to a target that does not carry one.
pub fn with_default_port(target: &str) -> String {
    if target.parse::<std::net::SocketAddr>().is_ok() {
        return target.to_string();
    }
    if target.starts_with('[') {
        return if target.contains("]:") {
            target.to_string()
        } else {
            format!("{target}:{NETCONF_PORT}")
        };
    }
    match target.matches(':').count() {
        0 => format!("{target}:{NETCONF_PORT}"),
        1 => target.to_string(),
        // bare IPv6 literal
        _ => format!("[{target}]:{NETCONF_PORT}"),
    }
}
