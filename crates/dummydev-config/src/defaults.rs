//! Default values shared by the configuration layers.

use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Resource name advertised to the node agent when none is configured.
pub const DEFAULT_RESOURCE_NAME: &str = "dummy/dummyDev";

/// Directory where the node agent looks for plugin sockets.
pub const DEFAULT_PLUGIN_DIR: &str = "/var/lib/kubelet/device-plugins/";

/// Socket file name the plugin listens on inside the plugin directory.
pub const DEFAULT_ENDPOINT: &str = "dummy.sock";

/// Registration socket exposed by the node agent.
pub const DEFAULT_HOST_SOCKET: &str = "kubelet.sock";

/// Static inventory consulted at startup.
pub const DEFAULT_INVENTORY_PATH: &str = "./dummyResources.json";

/// Environment variable handed to workloads listing their devices.
pub const DEFAULT_ALLOCATION_ENV: &str = "DUMMY_DEVICES";

/// Seconds between health sweeps.
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 30;

/// Upper bound for dialling a local socket, in seconds.
pub const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 5;

/// Registration attempts before giving up.
pub const DEFAULT_REGISTRATION_ATTEMPTS: u32 = 5;

/// First delay between registration attempts, in milliseconds.
pub const DEFAULT_REGISTRATION_BACKOFF_MS: u64 = 500;

/// Ceiling for the registration backoff, in milliseconds.
pub const DEFAULT_REGISTRATION_BACKOFF_MAX_MS: u64 = 8_000;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the daemon.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the daemon.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default directory holding plugin sockets.
#[must_use]
pub fn default_plugin_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_PLUGIN_DIR)
}
