//! Test double for [`LifecycleReporter`] that records events for assertions.

use parking_lot::Mutex;

use dummydev_config::Config;

use crate::lifecycle::LifecycleReporter;
use crate::process::LaunchError;

/// Lifecycle milestones tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    StartupStarting,
    InventoryLoaded(usize),
    EndpointReady,
    Registered(u32),
    StartupFailed(String),
    ShutdownStarting,
    ShutdownCompleted,
}

/// Records lifecycle events in order.
#[derive(Debug, Default)]
pub struct RecordingLifecycleReporter {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingLifecycleReporter {
    /// Copy of the recorded events.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    fn record(&self, event: LifecycleEvent) {
        self.events.lock().push(event);
    }
}

impl LifecycleReporter for RecordingLifecycleReporter {
    fn startup_starting(&self, _config: &Config) {
        self.record(LifecycleEvent::StartupStarting);
    }

    fn inventory_loaded(&self, devices: usize) {
        self.record(LifecycleEvent::InventoryLoaded(devices));
    }

    fn endpoint_ready(&self, _config: &Config) {
        self.record(LifecycleEvent::EndpointReady);
    }

    fn registered(&self, attempts: u32) {
        self.record(LifecycleEvent::Registered(attempts));
    }

    fn startup_failed(&self, error: &LaunchError) {
        self.record(LifecycleEvent::StartupFailed(error.to_string()));
    }

    fn shutdown_starting(&self) {
        self.record(LifecycleEvent::ShutdownStarting);
    }

    fn shutdown_completed(&self) {
        self.record(LifecycleEvent::ShutdownCompleted);
    }
}
