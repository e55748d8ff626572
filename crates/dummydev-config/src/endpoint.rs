//! Resolves the socket paths shared by the plugin and the node agent.
//!
//! The node agent owns a single base directory. The plugin binds its own
//! socket inside it and only ever tells the agent the bare file name; the
//! agent reconstructs the full path on its side.

use std::fs::DirBuilder;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Socket locations derived from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginPaths {
    plugin_dir: Utf8PathBuf,
    endpoint: String,
    endpoint_path: Utf8PathBuf,
    host_socket_path: Utf8PathBuf,
}

impl PluginPaths {
    /// Resolves the plugin endpoint and host socket against `plugin_dir`.
    ///
    /// A relative `host_socket` lives inside `plugin_dir`; an absolute one is
    /// used verbatim.
    #[must_use]
    pub fn new(plugin_dir: &Utf8Path, endpoint: &str, host_socket: &Utf8Path) -> Self {
        let host_socket_path = if host_socket.is_absolute() {
            host_socket.to_path_buf()
        } else {
            plugin_dir.join(host_socket)
        };
        Self {
            plugin_dir: plugin_dir.to_path_buf(),
            endpoint: endpoint.to_owned(),
            endpoint_path: plugin_dir.join(endpoint),
            host_socket_path,
        }
    }

    /// Directory shared with the node agent.
    #[must_use]
    pub fn plugin_dir(&self) -> &Utf8Path {
        &self.plugin_dir
    }

    /// Socket file name announced during registration.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Full path the plugin binds.
    #[must_use]
    pub fn endpoint_path(&self) -> &Utf8Path {
        &self.endpoint_path
    }

    /// Full path of the node agent's registration socket.
    #[must_use]
    pub fn host_socket_path(&self) -> &Utf8Path {
        &self.host_socket_path
    }

    /// Ensures the plugin directory exists with restrictive permissions.
    pub fn prepare_filesystem(&self) -> Result<(), PluginDirError> {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        if let Err(source) = builder.create(self.plugin_dir.as_std_path())
            && source.kind() != std::io::ErrorKind::AlreadyExists
        {
            return Err(PluginDirError::CreateDirectory {
                path: self.plugin_dir.clone(),
                source,
            });
        }

        Ok(())
    }
}

/// Errors raised when preparing the plugin directory.
#[derive(Debug, Error)]
pub enum PluginDirError {
    /// Failed to create the directory holding the sockets.
    #[error("failed to create plugin directory '{path}': {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_host_socket_lives_in_plugin_dir() {
        let paths = PluginPaths::new(
            Utf8Path::new("/var/lib/kubelet/device-plugins"),
            "dummy.sock",
            Utf8Path::new("kubelet.sock"),
        );
        assert_eq!(
            paths.endpoint_path(),
            Utf8Path::new("/var/lib/kubelet/device-plugins/dummy.sock")
        );
        assert_eq!(
            paths.host_socket_path(),
            Utf8Path::new("/var/lib/kubelet/device-plugins/kubelet.sock")
        );
    }

    #[test]
    fn absolute_host_socket_is_kept() {
        let paths = PluginPaths::new(
            Utf8Path::new("/plugins"),
            "dummy.sock",
            Utf8Path::new("/run/agent/registration.sock"),
        );
        assert_eq!(
            paths.host_socket_path(),
            Utf8Path::new("/run/agent/registration.sock")
        );
        assert_eq!(paths.endpoint(), "dummy.sock");
    }

    #[test]
    fn prepare_filesystem_creates_nested_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        let nested = root.join("a").join("b");
        let paths = PluginPaths::new(&nested, "dummy.sock", Utf8Path::new("kubelet.sock"));

        paths.prepare_filesystem().expect("create plugin dir");
        paths.prepare_filesystem().expect("second call is harmless");
        assert!(nested.is_dir());
    }
}
