//! Wire types for the device plugin API spoken with the node agent.
//!
//! The protobuf messages and the tonic client/server stubs are generated from
//! `proto/deviceplugin/v1beta1/api.proto`. The generated file is checked in so
//! ordinary builds do not need `protoc`; enable the `regenerate` feature after
//! editing the `.proto` to refresh it.

/// Generated `v1beta1` messages and services.
#[allow(
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::use_self,
    missing_docs,
    reason = "generated by tonic-build"
)]
pub mod v1beta1 {
    include!("proto/v1beta1.rs");
}

/// API version advertised during registration.
pub const VERSION: &str = "v1beta1";

/// Health value reported for a usable device.
pub const HEALTHY: &str = "Healthy";

/// Health value reported for a device that must not be scheduled.
pub const UNHEALTHY: &str = "Unhealthy";
