//! Periodic device health checks and change notification.
//!
//! A [`HealthMonitor`] probes each device, records transitions in the
//! registry and fans them out to every open inventory stream over a
//! broadcast channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::inventory::{Device, DeviceRegistry, Health};
use crate::process::shutdown_requested;

pub(crate) const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Buffered events per subscriber before it is reported as lagging.
const EVENT_CAPACITY: usize = 64;

/// A device whose health just changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthEvent {
    /// The device in its new state.
    pub device: Device,
}

/// Decides the health of a device.
pub trait HealthProbe: Send + Sync {
    /// Inspects `device` and returns its current health.
    fn probe(&self, device: &Device) -> Health;
}

impl<T> HealthProbe for Arc<T>
where
    T: HealthProbe + ?Sized,
{
    fn probe(&self, device: &Device) -> Health {
        (**self).probe(device)
    }
}

/// Probe for devices with nothing to inspect.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysHealthy;

impl HealthProbe for AlwaysHealthy {
    fn probe(&self, _device: &Device) -> Health {
        Health::Healthy
    }
}

/// Applies probe results to the registry and publishes transitions.
#[derive(Clone)]
pub struct HealthMonitor {
    registry: Arc<DeviceRegistry>,
    probe: Arc<dyn HealthProbe>,
    events: broadcast::Sender<HealthEvent>,
}

impl HealthMonitor {
    /// Builds a monitor over `registry`.
    #[must_use]
    pub fn new(registry: Arc<DeviceRegistry>, probe: Arc<dyn HealthProbe>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry,
            probe,
            events,
        }
    }

    /// Opens a new subscription to health transitions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.events.subscribe()
    }

    /// Registry the monitor writes into.
    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Probes every device once and publishes one event per transition.
    ///
    /// Returns the devices whose health changed.
    pub fn sweep(&self) -> Vec<Device> {
        let mut changed = Vec::new();
        for device in self.registry.snapshot() {
            let health = self.probe.probe(&device);
            if let Some(updated) = self.registry.set_health(device.id(), health) {
                self.publish(&updated);
                changed.push(updated);
            }
        }
        debug!(
            target: HEALTH_TARGET,
            devices = self.registry.len(),
            changed = changed.len(),
            "health sweep complete"
        );
        changed
    }

    /// Records `health` for `id` directly, bypassing the probe.
    ///
    /// Returns the updated device when the state changed.
    pub fn report(&self, id: &str, health: Health) -> Option<Device> {
        let updated = self.registry.set_health(id, health)?;
        self.publish(&updated);
        Some(updated)
    }

    fn publish(&self, device: &Device) {
        match device.health() {
            Health::Healthy => info!(
                target: HEALTH_TARGET,
                device = device.id(),
                "device recovered"
            ),
            Health::Unhealthy => warn!(
                target: HEALTH_TARGET,
                device = device.id(),
                "device became unhealthy"
            ),
        }
        let event = HealthEvent {
            device: device.clone(),
        };
        if self.events.send(event).is_err() {
            debug!(
                target: HEALTH_TARGET,
                device = device.id(),
                "no active streams for health event"
            );
        }
    }

    /// Runs [`Self::sweep`] every `interval` until `shutdown` flips or the
    /// returned handle is stopped.
    #[must_use]
    pub fn spawn(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> MonitorHandle {
        let (stop, mut stopped) = watch::channel(false);
        let monitor = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                target: HEALTH_TARGET,
                interval_ms = interval.as_millis(),
                "health monitor started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        monitor.sweep();
                    }
                    () = shutdown_requested(&mut shutdown) => break,
                    () = shutdown_requested(&mut stopped) => break,
                }
            }
            info!(target: HEALTH_TARGET, "health monitor stopped");
        });
        MonitorHandle { stop, task }
    }
}

/// Handle to the background sweep task.
#[derive(Debug)]
pub struct MonitorHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stops the sweep loop and waits for it to exit.
    pub async fn stop(self) {
        self.stop.send_replace(true);
        if let Err(error) = self.task.await {
            warn!(
                target: HEALTH_TARGET,
                error = %error,
                "health monitor task ended abnormally"
            );
        }
    }
}
