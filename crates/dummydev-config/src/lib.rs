//! Layered configuration for the dummy device plugin.
//!
//! Values are merged by `ortho_config` from, in increasing precedence,
//! built-in defaults, a TOML file named with `--config-path`, `DUMMYDEV_*`
//! environment variables and command-line flags. The resolved [`Config`] is
//! validated once at startup; every field has a usable default so an empty
//! environment yields a plugin that talks to a stock kubelet.

mod defaults;
mod endpoint;
mod logging;

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_ALLOCATION_ENV, DEFAULT_DIAL_TIMEOUT_SECS, DEFAULT_ENDPOINT,
    DEFAULT_HEALTH_INTERVAL_SECS, DEFAULT_HOST_SOCKET, DEFAULT_INVENTORY_PATH,
    DEFAULT_LOG_FILTER, DEFAULT_PLUGIN_DIR, DEFAULT_REGISTRATION_ATTEMPTS,
    DEFAULT_REGISTRATION_BACKOFF_MAX_MS, DEFAULT_REGISTRATION_BACKOFF_MS, DEFAULT_RESOURCE_NAME,
    default_log_filter, default_log_format, default_plugin_dir,
};
pub use endpoint::{PluginDirError, PluginPaths};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved plugin configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(prefix = "DUMMYDEV")]
pub struct Config {
    /// Namespaced resource advertised to the node agent, e.g. `vendor/resource`.
    pub resource_name: String,
    /// Directory shared with the node agent for plugin sockets.
    pub plugin_dir: Utf8PathBuf,
    /// Socket file name inside `plugin_dir`; never a path.
    pub endpoint: String,
    /// Node agent registration socket, relative to `plugin_dir` unless absolute.
    pub host_socket: Utf8PathBuf,
    /// JSON inventory listing the devices to advertise.
    pub inventory_path: Utf8PathBuf,
    /// Environment variable listing allocated device ids.
    pub allocation_env: String,
    /// Seconds between health sweeps.
    pub health_interval_secs: u64,
    /// Bound on socket dials (self-check and registration), in seconds.
    pub dial_timeout_secs: u64,
    /// Registration attempts before startup fails.
    pub registration_attempts: u32,
    /// First backoff between registration attempts, in milliseconds.
    pub registration_backoff_ms: u64,
    /// Maximum backoff between registration attempts, in milliseconds.
    pub registration_backoff_max_ms: u64,
    /// `tracing` filter directive.
    pub log_filter: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resource_name: DEFAULT_RESOURCE_NAME.to_owned(),
            plugin_dir: default_plugin_dir(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            host_socket: Utf8PathBuf::from(DEFAULT_HOST_SOCKET),
            inventory_path: Utf8PathBuf::from(DEFAULT_INVENTORY_PATH),
            allocation_env: DEFAULT_ALLOCATION_ENV.to_owned(),
            health_interval_secs: DEFAULT_HEALTH_INTERVAL_SECS,
            dial_timeout_secs: DEFAULT_DIAL_TIMEOUT_SECS,
            registration_attempts: DEFAULT_REGISTRATION_ATTEMPTS,
            registration_backoff_ms: DEFAULT_REGISTRATION_BACKOFF_MS,
            registration_backoff_max_ms: DEFAULT_REGISTRATION_BACKOFF_MAX_MS,
            log_filter: default_log_filter().to_owned(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Checks invariants the loaders cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some((vendor, resource)) = self.resource_name.split_once('/') else {
            return Err(ConfigError::ResourceName {
                name: self.resource_name.clone(),
            });
        };
        if vendor.is_empty() || resource.is_empty() || resource.contains('/') {
            return Err(ConfigError::ResourceName {
                name: self.resource_name.clone(),
            });
        }

        if self.endpoint.is_empty()
            || self.endpoint.contains('/')
            || self.endpoint == "."
            || self.endpoint == ".."
        {
            return Err(ConfigError::Endpoint {
                endpoint: self.endpoint.clone(),
            });
        }

        if self.allocation_env.is_empty() {
            return Err(ConfigError::AllocationEnv);
        }

        for (field, value) in [
            ("health_interval_secs", self.health_interval_secs),
            ("dial_timeout_secs", self.dial_timeout_secs),
            ("registration_attempts", u64::from(self.registration_attempts)),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }

        if self.registration_backoff_max_ms < self.registration_backoff_ms {
            return Err(ConfigError::Backoff {
                initial_ms: self.registration_backoff_ms,
                max_ms: self.registration_backoff_max_ms,
            });
        }

        Ok(())
    }

    /// Socket locations derived from `plugin_dir`, `endpoint` and `host_socket`.
    #[must_use]
    pub fn paths(&self) -> PluginPaths {
        PluginPaths::new(&self.plugin_dir, &self.endpoint, &self.host_socket)
    }

    /// Interval between health sweeps.
    #[must_use]
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    /// Bound applied to socket dials.
    #[must_use]
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    /// First registration backoff.
    #[must_use]
    pub fn registration_backoff(&self) -> Duration {
        Duration::from_millis(self.registration_backoff_ms)
    }

    /// Registration backoff ceiling.
    #[must_use]
    pub fn registration_backoff_max(&self) -> Duration {
        Duration::from_millis(self.registration_backoff_max_ms)
    }

    /// Accessor for the configured log filter.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Accessor for the configured log format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The resource name is not of the form `vendor/resource`.
    #[error("resource name '{name}' must look like 'vendor/resource'")]
    ResourceName { name: String },
    /// The endpoint is not a bare socket file name.
    #[error("endpoint '{endpoint}' must be a socket file name, not a path")]
    Endpoint { endpoint: String },
    /// No environment variable name was given for allocations.
    #[error("allocation environment variable name must not be empty")]
    AllocationEnv,
    /// A field that drives a timer or a loop was zero.
    #[error("'{field}' must be greater than zero")]
    Zero { field: &'static str },
    /// The backoff ceiling is below the initial backoff.
    #[error("registration backoff ceiling {max_ms}ms is below the initial {initial_ms}ms")]
    Backoff { initial_ms: u64, max_ms: u64 },
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_target_a_stock_kubelet() {
        let config = Config::default();
        config.validate().expect("defaults must validate");
        let paths = config.paths();
        assert_eq!(
            paths.endpoint_path(),
            Utf8Path::new("/var/lib/kubelet/device-plugins/dummy.sock")
        );
        assert_eq!(
            paths.host_socket_path(),
            Utf8Path::new("/var/lib/kubelet/device-plugins/kubelet.sock")
        );
        assert_eq!(config.health_interval(), Duration::from_secs(30));
        assert_eq!(config.dial_timeout(), Duration::from_secs(5));
    }

    #[rstest]
    #[case("dummyDev")]
    #[case("/dummyDev")]
    #[case("dummy/")]
    #[case("a/b/c")]
    fn rejects_unqualified_resource_names(#[case] name: &str) {
        let config = Config {
            resource_name: name.to_owned(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ResourceName { .. })
        ));
    }

    #[rstest]
    #[case("")]
    #[case("sockets/dummy.sock")]
    #[case("..")]
    fn rejects_endpoints_that_are_not_file_names(#[case] endpoint: &str) {
        let config = Config {
            endpoint: endpoint.to_owned(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Endpoint { .. })
        ));
    }

    #[test]
    fn rejects_zero_registration_attempts() {
        let config = Config {
            registration_attempts: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "registration_attempts"
            })
        ));
    }

    #[test]
    fn rejects_inverted_backoff() {
        let config = Config {
            registration_backoff_ms: 1_000,
            registration_backoff_max_ms: 10,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Backoff { .. })));
    }

    #[test]
    fn log_format_parses_case_insensitively() {
        let format: LogFormat = "COMPACT".parse().expect("parse log format");
        assert_eq!(format, LogFormat::Compact);
        assert_eq!(LogFormat::Json.to_string(), "json");
    }
}
