//! Supervises plugin startup sequencing and shutdown.

use std::sync::Arc;

use tokio::runtime::Runtime;
use tracing::{error, info, warn};

use dummydev_config::Config;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader};
use crate::health::{AlwaysHealthy, HealthMonitor, HealthProbe, MonitorHandle};
use crate::inventory::DeviceRegistry;
use crate::lifecycle::{LifecycleReporter, StructuredLifecycleReporter};
use crate::registration::Registrar;
use crate::service::PluginService;
use crate::telemetry;
use crate::transport::PluginEndpoint;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to run the plugin.
pub struct LaunchPlan<L, S> {
    /// Source of the plugin configuration.
    pub loader: L,
    /// Receives lifecycle milestones.
    pub reporter: Arc<dyn LifecycleReporter>,
    /// Decides device health on every sweep.
    pub probe: Arc<dyn HealthProbe>,
    /// Blocks until the plugin should stop.
    pub shutdown: S,
}

/// Runs the plugin using the production collaborators.
pub fn run_plugin() -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredLifecycleReporter::new()),
        probe: Arc::new(AlwaysHealthy),
        shutdown: SystemShutdownSignal::new(),
    };
    run_plugin_with(plan)
}

/// Runs the plugin with injected collaborators.
///
/// Blocks the calling thread until `shutdown` fires, then stops the health
/// monitor and the endpoint.
pub fn run_plugin_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        probe,
        shutdown,
    } = plan;

    let config = loader.load()?;
    config.validate()?;
    telemetry::initialise(&config)?;
    shutdown.install()?;
    reporter.startup_starting(&config);

    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            reporter.startup_failed(&error);
            return Err(error);
        }
    };

    let plugin = match runtime.block_on(RunningPlugin::start(&config, probe, reporter.as_ref())) {
        Ok(plugin) => plugin,
        Err(error) => {
            reporter.startup_failed(&error);
            return Err(error);
        }
    };

    let waited = shutdown.wait();
    reporter.shutdown_starting();
    let stopped = runtime.block_on(plugin.stop());
    reporter.shutdown_completed();
    info!(
        target: PROCESS_TARGET,
        "shutdown sequence completed"
    );
    waited?;
    stopped
}

/// Logs a launch failure, installing default telemetry when the configured
/// one never came up.
pub fn report_launch_failure(failure: &LaunchError) {
    if telemetry::initialise(&Config::default()).is_err() {
        return;
    }
    error!(
        target: PROCESS_TARGET,
        error = %failure,
        "device plugin exited with an error"
    );
}

fn build_runtime() -> Result<Runtime, LaunchError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name(concat!(env!("CARGO_PKG_NAME"), "-worker"))
        .build()
        .map_err(|source| LaunchError::Runtime { source })
}

/// Components alive between startup and shutdown.
struct RunningPlugin {
    endpoint: PluginEndpoint,
    monitor: MonitorHandle,
}

impl RunningPlugin {
    /// Loads the inventory, serves the endpoint, starts health sweeps and
    /// registers. Anything already started is stopped again on failure.
    async fn start(
        config: &Config,
        probe: Arc<dyn HealthProbe>,
        reporter: &dyn LifecycleReporter,
    ) -> Result<Self, LaunchError> {
        let registry = Arc::new(DeviceRegistry::load(&config.inventory_path)?);
        reporter.inventory_loaded(registry.len());

        let health = HealthMonitor::new(registry, probe);
        let mut endpoint = PluginEndpoint::new(config.paths(), config.dial_timeout());
        let service =
            PluginService::new(health.clone(), &config.allocation_env, endpoint.shutdown_signal());
        endpoint.start(service).await?;
        reporter.endpoint_ready(config);

        let monitor = health.spawn(config.health_interval(), endpoint.shutdown_signal());
        let plugin = Self { endpoint, monitor };

        match Registrar::from_config(config).register().await {
            Ok(attempts) => {
                reporter.registered(attempts);
                Ok(plugin)
            }
            Err(source) => {
                if let Err(stop_error) = plugin.stop().await {
                    warn!(
                        target: PROCESS_TARGET,
                        error = %stop_error,
                        "failed to stop plugin after registration failure"
                    );
                }
                Err(LaunchError::Registration { source })
            }
        }
    }

    async fn stop(self) -> Result<(), LaunchError> {
        let Self {
            mut endpoint,
            monitor,
        } = self;
        monitor.stop().await;
        endpoint.stop().await?;
        Ok(())
    }
}
