//! Dummy device plugin daemon.
//!
//! The plugin advertises a fixed pool of devices, read from a JSON inventory,
//! to the node agent over the `v1beta1` device plugin gRPC API on a unix
//! socket. Startup runs in a fixed order: configuration, telemetry, signal
//! handlers, inventory, endpoint, health monitor and finally registration with
//! the node agent. A failure at any step stops whatever already started and
//! ends the process with an error.
//!
//! Once registered, the node agent opens `ListAndWatch` to learn the device
//! list and its health, and calls `Allocate` when a workload is scheduled
//! onto some of the devices. Health transitions found by the monitor are
//! pushed to every open stream as a fresh full snapshot.

mod bootstrap;
pub mod health;
pub mod inventory;
mod lifecycle;
mod process;
pub mod registration;
pub mod service;
mod telemetry;
pub mod transport;

pub use bootstrap::{ConfigLoader, StaticConfigLoader, SystemConfigLoader};
pub use lifecycle::{LifecycleReporter, StructuredLifecycleReporter};
pub use process::{
    LaunchError, LaunchPlan, ShutdownError, ShutdownSignal, SystemShutdownSignal,
    report_launch_failure, run_plugin, run_plugin_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
