//! Error types for the plugin socket lifecycle.

use std::io;
use std::time::Duration;

use camino::Utf8PathBuf;
use thiserror::Error;

use dummydev_config::PluginDirError;

/// Errors surfaced while dialling a unix socket.
#[derive(Debug, Error)]
pub enum DialError {
    /// The gRPC connection could not be established.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: Utf8PathBuf,
        #[source]
        source: tonic::transport::Error,
    },
    /// No connection within the dial budget.
    #[error("timed out after {}ms connecting to {path}", timeout.as_millis())]
    Timeout { path: Utf8PathBuf, timeout: Duration },
}

/// Errors surfaced while starting, verifying or stopping the plugin socket.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error(transparent)]
    Directory(#[from] PluginDirError),
    #[error("failed to read metadata for unix socket {path}: {source}")]
    UnixMetadata {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("endpoint path {path} is a directory")]
    UnixNotSocket { path: Utf8PathBuf },
    #[error("existing unix socket {path} is already in use")]
    UnixInUse { path: Utf8PathBuf },
    #[error("failed to connect to existing unix socket {path}: {source}")]
    UnixConnect {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove unix socket {path}: {source}")]
    UnixCleanup {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind unix listener at {path}: {source}")]
    BindUnix {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("plugin socket failed its startup check: {source}")]
    Verify {
        #[source]
        source: DialError,
    },
    #[error("plugin server failed: {source}")]
    Serve {
        #[source]
        source: tonic::transport::Error,
    },
    #[error("plugin server task panicked")]
    TaskPanic,
}
