//! gRPC implementation of the `v1beta1.DevicePlugin` service.

mod allocation;
mod stream;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use dummydev_api::v1beta1::device_plugin_server::DevicePlugin;
use dummydev_api::v1beta1::{
    AllocateRequest, AllocateResponse, ContainerAllocateResponse,
    ContainerPreferredAllocationResponse, DevicePluginOptions, Empty, ListAndWatchResponse,
    PreStartContainerRequest, PreStartContainerResponse, PreferredAllocationRequest,
    PreferredAllocationResponse,
};

use crate::health::HealthMonitor;
use crate::inventory::DeviceRegistry;

pub use self::allocation::{AllocationPlan, PreferenceError, preferred_devices};
pub use self::stream::{StreamEnd, StreamPhase};
use self::stream::{STREAM_BUFFER, StreamSession};

pub(crate) const SERVICE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// Options advertised at registration and through `GetDevicePluginOptions`.
#[must_use]
pub fn plugin_options() -> DevicePluginOptions {
    DevicePluginOptions {
        pre_start_required: false,
        get_preferred_allocation_available: true,
    }
}

/// Device plugin service answering the node agent.
#[derive(Clone)]
pub struct PluginService {
    registry: Arc<DeviceRegistry>,
    monitor: HealthMonitor,
    allocation_env: Arc<str>,
    shutdown: watch::Receiver<bool>,
    next_stream: Arc<AtomicU64>,
}

impl PluginService {
    /// Builds a service over the monitor's registry.
    ///
    /// Open streams end once `shutdown` flips to `true`.
    #[must_use]
    pub fn new(
        monitor: HealthMonitor,
        allocation_env: &str,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry: Arc::clone(monitor.registry()),
            monitor,
            allocation_env: Arc::from(allocation_env),
            shutdown,
            next_stream: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Plans every container request, failing on the first unknown id set.
    pub(crate) fn plan_allocation(
        &self,
        request: &AllocateRequest,
    ) -> Result<AllocateResponse, Status> {
        let plans: Vec<AllocationPlan> = request
            .container_requests
            .iter()
            .map(|container| AllocationPlan::new(&self.registry, &container.devices_ids))
            .collect();

        let unknown: Vec<&str> = plans
            .iter()
            .flat_map(AllocationPlan::unknown)
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            warn!(
                target: SERVICE_TARGET,
                unknown = ?unknown,
                "allocation rejected"
            );
            return Err(Status::not_found(format!(
                "unknown device ids: {}",
                unknown.join(", ")
            )));
        }

        let container_responses = plans
            .iter()
            .map(|plan| {
                for id in plan.granted() {
                    info!(target: SERVICE_TARGET, device = %id, "allocated device");
                }
                ContainerAllocateResponse {
                    envs: plan.environment(&self.allocation_env),
                    ..ContainerAllocateResponse::default()
                }
            })
            .collect();
        Ok(AllocateResponse {
            container_responses,
        })
    }
}

#[tonic::async_trait]
impl DevicePlugin for PluginService {
    async fn get_device_plugin_options(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<DevicePluginOptions>, Status> {
        Ok(Response::new(plugin_options()))
    }

    type ListAndWatchStream = ReceiverStream<Result<ListAndWatchResponse, Status>>;

    async fn list_and_watch(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListAndWatchStream>, Status> {
        let stream_id = self.next_stream.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        // Subscribe before the first snapshot is taken so no transition
        // falls between the two.
        let session = StreamSession::new(
            stream_id,
            Arc::clone(&self.registry),
            self.monitor.subscribe(),
            self.shutdown.clone(),
            tx,
        );
        tokio::spawn(session.run());
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn get_preferred_allocation(
        &self,
        request: Request<PreferredAllocationRequest>,
    ) -> Result<Response<PreferredAllocationResponse>, Status> {
        let request = request.into_inner();
        let mut container_responses = Vec::with_capacity(request.container_requests.len());
        for container in &request.container_requests {
            let device_i_ds = preferred_devices(
                &self.registry,
                &container.available_device_i_ds,
                &container.must_include_device_i_ds,
                container.allocation_size,
            )
            .map_err(|error| Status::invalid_argument(error.to_string()))?;
            debug!(
                target: SERVICE_TARGET,
                preferred = ?device_i_ds,
                size = container.allocation_size,
                "preferred allocation computed"
            );
            container_responses.push(ContainerPreferredAllocationResponse { device_i_ds });
        }
        Ok(Response::new(PreferredAllocationResponse {
            container_responses,
        }))
    }

    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> Result<Response<AllocateResponse>, Status> {
        let request = request.into_inner();
        debug!(
            target: SERVICE_TARGET,
            containers = request.container_requests.len(),
            "allocate requested"
        );
        self.plan_allocation(&request).map(Response::new)
    }

    async fn pre_start_container(
        &self,
        request: Request<PreStartContainerRequest>,
    ) -> Result<Response<PreStartContainerResponse>, Status> {
        debug!(
            target: SERVICE_TARGET,
            devices = ?request.get_ref().devices_ids,
            "pre-start requested"
        );
        Ok(Response::new(PreStartContainerResponse {}))
    }
}
