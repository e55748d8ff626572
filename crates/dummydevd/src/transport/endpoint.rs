//! Binds, serves and tears down the plugin's unix socket.

use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use camino::Utf8Path;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing::{debug, info, warn};

use dummydev_api::v1beta1::device_plugin_server::DevicePluginServer;
use dummydev_config::PluginPaths;

use crate::process::shutdown_requested;
use crate::service::PluginService;

use super::{ListenerError, TRANSPORT_TARGET, connect_unix};

/// Upper bound on a graceful server stop before the task is aborted.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

type ServerTask = JoinHandle<Result<(), tonic::transport::Error>>;

/// The plugin's gRPC endpoint on a unix socket.
#[derive(Debug)]
pub struct PluginEndpoint {
    paths: PluginPaths,
    dial_timeout: Duration,
    shutdown: watch::Sender<bool>,
    server: Option<ServerTask>,
}

impl PluginEndpoint {
    /// Creates a stopped endpoint.
    #[must_use]
    pub fn new(paths: PluginPaths, dial_timeout: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            paths,
            dial_timeout,
            shutdown,
            server: None,
        }
    }

    /// Receiver that flips to `true` when the endpoint stops.
    ///
    /// Long-lived work tied to the server, such as inventory streams and the
    /// health monitor, watches it so [`Self::stop`] never waits on them.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Full path of the socket file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        self.paths.endpoint_path()
    }

    /// Returns `true` while the server task is running.
    #[must_use]
    pub fn is_serving(&self) -> bool {
        self.server.is_some()
    }

    /// Removes any stale socket, binds, serves `service` and confirms the
    /// socket accepts gRPC connections.
    ///
    /// On a failed check the server is stopped and the socket removed before
    /// the error is returned.
    pub async fn start(&mut self, service: PluginService) -> Result<(), ListenerError> {
        if self.server.is_some() {
            return Ok(());
        }
        self.paths.prepare_filesystem()?;
        let path = self.paths.endpoint_path().to_path_buf();
        remove_stale_socket(&path)?;

        let listener = UnixListener::bind(path.as_std_path()).map_err(|source| {
            ListenerError::BindUnix {
                path: path.clone(),
                source,
            }
        })?;

        self.shutdown.send_replace(false);
        let mut shutdown = self.shutdown.subscribe();
        let incoming = UnixListenerStream::new(listener);
        self.server = Some(tokio::spawn(async move {
            Server::builder()
                .add_service(DevicePluginServer::new(service))
                .serve_with_incoming_shutdown(incoming, async move {
                    shutdown_requested(&mut shutdown).await;
                })
                .await
        }));

        match connect_unix(&path, self.dial_timeout).await {
            Ok(channel) => drop(channel),
            Err(source) => {
                if let Err(error) = self.stop().await {
                    warn!(
                        target: TRANSPORT_TARGET,
                        error = %error,
                        "failed to tear down unverified endpoint"
                    );
                }
                return Err(ListenerError::Verify { source });
            }
        }

        info!(
            target: TRANSPORT_TARGET,
            path = %path,
            "plugin endpoint serving"
        );
        Ok(())
    }

    /// Stops serving and removes the socket file. Calling it on a stopped
    /// endpoint does nothing.
    pub async fn stop(&mut self) -> Result<(), ListenerError> {
        let Some(mut server) = self.server.take() else {
            return Ok(());
        };
        self.shutdown.send_replace(true);

        let outcome = match tokio::time::timeout(STOP_TIMEOUT, &mut server).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(source))) => Err(ListenerError::Serve { source }),
            Ok(Err(_)) => Err(ListenerError::TaskPanic),
            Err(_) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    timeout_ms = STOP_TIMEOUT.as_millis(),
                    "plugin server did not stop in time; aborting"
                );
                server.abort();
                Ok(())
            }
        };

        remove_socket(self.paths.endpoint_path())?;
        info!(
            target: TRANSPORT_TARGET,
            path = %self.paths.endpoint_path(),
            "plugin endpoint stopped"
        );
        outcome
    }
}

/// Clears whatever occupies `path` unless a live server answers on it.
fn remove_stale_socket(path: &Utf8Path) -> Result<(), ListenerError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(ListenerError::UnixMetadata {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if metadata.is_dir() {
        return Err(ListenerError::UnixNotSocket {
            path: path.to_path_buf(),
        });
    }

    if metadata.file_type().is_socket() {
        match UnixStream::connect(path) {
            Ok(_stream) => {
                return Err(ListenerError::UnixInUse {
                    path: path.to_path_buf(),
                });
            }
            Err(error)
                if error.kind() == io::ErrorKind::ConnectionRefused
                    || error.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ListenerError::UnixConnect {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }

    debug!(target: TRANSPORT_TARGET, path = %path, "removing stale endpoint");
    remove_socket(path)
}

fn remove_socket(path: &Utf8Path) -> Result<(), ListenerError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ListenerError::UnixCleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}
