use std::io;

use parking_lot::Mutex;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

use super::PROCESS_TARGET;

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Starts listening. Notifications arriving between this call and
    /// [`Self::wait`] are not lost.
    fn install(&self) -> Result<(), ShutdownError> {
        Ok(())
    }

    /// Blocks until shutdown should proceed.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Shutdown listener that waits for termination signals.
#[derive(Default)]
pub struct SystemShutdownSignal {
    signals: Mutex<Option<Signals>>,
}

impl SystemShutdownSignal {
    /// Builds a listener; handlers are registered by [`ShutdownSignal::install`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn install(&self) -> Result<(), ShutdownError> {
        let mut slot = self.signals.lock();
        if slot.is_none() {
            let signals = Signals::new([SIGHUP, SIGINT, SIGTERM, SIGQUIT])
                .map_err(|source| ShutdownError::Install { source })?;
            *slot = Some(signals);
        }
        Ok(())
    }

    fn wait(&self) -> Result<(), ShutdownError> {
        self.install()?;
        let mut slot = self.signals.lock();
        if let Some(signal) = slot.as_mut().and_then(|signals| signals.forever().next()) {
            info!(
                target: PROCESS_TARGET,
                signal,
                "shutdown signal received"
            );
        }
        Ok(())
    }
}

/// Resolves once `shutdown` holds `true` or its sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
