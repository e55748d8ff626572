//! Shutdown signal triggered from test code instead of the OS.

use std::sync::mpsc;

use parking_lot::Mutex;

use crate::process::{ShutdownError, ShutdownSignal};

/// Blocks in `wait` until the paired [`ShutdownTrigger`] fires or is dropped.
pub struct ManualShutdown {
    receiver: Mutex<mpsc::Receiver<()>>,
}

/// Fires a [`ManualShutdown`].
#[derive(Clone)]
pub struct ShutdownTrigger {
    sender: mpsc::Sender<()>,
}

impl ShutdownTrigger {
    pub fn fire(&self) {
        self.sender.send(()).unwrap_or(());
    }
}

/// Creates a connected shutdown signal and trigger.
pub fn manual_shutdown() -> (ManualShutdown, ShutdownTrigger) {
    let (sender, receiver) = mpsc::channel();
    (
        ManualShutdown {
            receiver: Mutex::new(receiver),
        },
        ShutdownTrigger { sender },
    )
}

impl ShutdownSignal for ManualShutdown {
    fn wait(&self) -> Result<(), ShutdownError> {
        self.receiver.lock().recv().unwrap_or(());
        Ok(())
    }
}
