//! Structured reporting for plugin lifecycle milestones.

use std::sync::Arc;

use dummydev_config::Config;

use crate::process::LaunchError;

const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait LifecycleReporter: Send + Sync {
    /// Invoked once configuration and telemetry are in place.
    fn startup_starting(&self, config: &Config);

    /// Invoked after the inventory is loaded.
    fn inventory_loaded(&self, devices: usize);

    /// Invoked once the endpoint is serving.
    fn endpoint_ready(&self, config: &Config);

    /// Invoked after the node agent accepted the registration.
    fn registered(&self, attempts: u32);

    /// Invoked when startup fails.
    fn startup_failed(&self, error: &LaunchError);

    /// Invoked when shutdown begins.
    fn shutdown_starting(&self);

    /// Invoked after every component has stopped.
    fn shutdown_completed(&self);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn startup_starting(&self, config: &Config) {
        (**self).startup_starting(config);
    }

    fn inventory_loaded(&self, devices: usize) {
        (**self).inventory_loaded(devices);
    }

    fn endpoint_ready(&self, config: &Config) {
        (**self).endpoint_ready(config);
    }

    fn registered(&self, attempts: u32) {
        (**self).registered(attempts);
    }

    fn startup_failed(&self, error: &LaunchError) {
        (**self).startup_failed(error);
    }

    fn shutdown_starting(&self) {
        (**self).shutdown_starting();
    }

    fn shutdown_completed(&self) {
        (**self).shutdown_completed();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn startup_starting(&self, config: &Config) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "startup_starting",
            resource = %config.resource_name,
            inventory = %config.inventory_path,
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "starting device plugin"
        );
    }

    fn inventory_loaded(&self, devices: usize) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "inventory_loaded",
            devices,
            "devices discovered"
        );
    }

    fn endpoint_ready(&self, config: &Config) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "endpoint_ready",
            endpoint = %config.paths().endpoint_path(),
            "serving device plugin"
        );
    }

    fn registered(&self, attempts: u32) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "registered",
            attempts,
            "device plugin registered"
        );
    }

    fn startup_failed(&self, error: &LaunchError) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "startup_failed",
            error = %error,
            "device plugin failed to start"
        );
    }

    fn shutdown_starting(&self) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "shutdown_starting",
            "stopping device plugin"
        );
    }

    fn shutdown_completed(&self) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "shutdown_completed",
            "device plugin stopped"
        );
    }
}
