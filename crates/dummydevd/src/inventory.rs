//! Device registry built from the static inventory file.
//!
//! The registry is populated once at startup and never gains or loses
//! devices afterwards; only the health of an existing device changes. Reads
//! clone under a shared lock so streams and allocation never observe a device
//! half-updated.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use dummydev_api::{HEALTHY, UNHEALTHY, v1beta1};

const INVENTORY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::inventory");

/// Health of a single device as advertised to the node agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Health {
    /// The device may be scheduled.
    Healthy,
    /// The device must not be scheduled.
    Unhealthy,
}

impl Health {
    /// Wire representation used by the device plugin API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => HEALTHY,
            Self::Unhealthy => UNHEALTHY,
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A schedulable unit tracked by the plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    id: String,
    health: Health,
}

impl Device {
    /// Builds a device in the given health state.
    #[must_use]
    pub fn new(id: impl Into<String>, health: Health) -> Self {
        Self {
            id: id.into(),
            health,
        }
    }

    /// Identifier unique within the registry.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current health.
    #[must_use]
    pub const fn health(&self) -> Health {
        self.health
    }
}

impl From<&Device> for v1beta1::Device {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id.clone(),
            health: device.health.as_str().to_owned(),
            topology: None,
        }
    }
}

/// One entry of the inventory file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InventoryRecord {
    /// Device identifier; older inventories spell the field `id`.
    #[serde(alias = "id")]
    pub name: String,
}

/// Errors raised while building the registry.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The inventory file could not be read.
    #[error("failed to read inventory '{path}': {source}")]
    Read {
        /// Inventory path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The inventory was not a JSON array of device records.
    #[error("failed to parse inventory: {source}")]
    Parse {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A record carried an empty identifier.
    #[error("inventory record {index} has an empty device id")]
    EmptyId {
        /// Zero-based position of the record.
        index: usize,
    },
    /// Two records share an identifier.
    #[error("device id '{id}' appears more than once in the inventory")]
    DuplicateId {
        /// Repeated identifier.
        id: String,
    },
}

/// Thread-safe map of device id to [`Device`].
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<BTreeMap<String, Device>>,
}

impl DeviceRegistry {
    /// Reads and parses the inventory file at `path`.
    pub fn load(path: &Utf8Path) -> Result<Self, InventoryError> {
        let raw = fs::read_to_string(path).map_err(|source| InventoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_json(&raw)?;
        info!(
            target: INVENTORY_TARGET,
            path = %path,
            devices = registry.len(),
            "inventory loaded"
        );
        Ok(registry)
    }

    /// Parses an inventory document.
    pub fn from_json(raw: &str) -> Result<Self, InventoryError> {
        let records: Vec<InventoryRecord> =
            serde_json::from_str(raw).map_err(|source| InventoryError::Parse { source })?;
        Self::from_records(records)
    }

    /// Builds a registry with every record marked healthy.
    pub fn from_records(
        records: impl IntoIterator<Item = InventoryRecord>,
    ) -> Result<Self, InventoryError> {
        let mut devices = BTreeMap::new();
        for (index, record) in records.into_iter().enumerate() {
            if record.name.trim().is_empty() {
                return Err(InventoryError::EmptyId { index });
            }
            if devices.contains_key(&record.name) {
                return Err(InventoryError::DuplicateId { id: record.name });
            }
            let device = Device::new(record.name.clone(), Health::Healthy);
            devices.insert(record.name, device);
        }
        Ok(Self {
            devices: RwLock::new(devices),
        })
    }

    /// Looks up a device by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Device> {
        self.devices.read().get(id).cloned()
    }

    /// Returns `true` when `id` names a known device.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.devices.read().contains_key(id)
    }

    /// Copies every device, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Device> {
        self.devices.read().values().cloned().collect()
    }

    /// Number of devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Returns `true` for an empty inventory.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Records a new health state.
    ///
    /// Returns the updated device only when the state actually changed, so
    /// callers publish one event per transition. Unknown ids are ignored.
    pub fn set_health(&self, id: &str, health: Health) -> Option<Device> {
        let mut devices = self.devices.write();
        let device = devices.get_mut(id)?;
        if device.health == health {
            return None;
        }
        device.health = health;
        Some(device.clone())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn every_device_starts_healthy() {
        let registry = DeviceRegistry::from_json(r#"[{"name":"b"},{"name":"a"},{"name":"c"}]"#)
            .expect("parse inventory");

        assert_eq!(registry.len(), 3);
        let snapshot = registry.snapshot();
        let ids: Vec<&str> = snapshot.iter().map(Device::id).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert!(snapshot.iter().all(|device| device.health() == Health::Healthy));
    }

    #[test]
    fn accepts_id_alias_and_ignores_extra_fields() {
        let registry = DeviceRegistry::from_json(r#"[{"id":"dev-0","vendor":"acme"}]"#)
            .expect("parse inventory");
        assert!(registry.contains("dev-0"));
    }

    #[rstest]
    #[case::not_an_array(r#"{"name":"a"}"#)]
    #[case::missing_name(r#"[{"label":"a"}]"#)]
    #[case::truncated(r#"[{"name":"a"}"#)]
    fn rejects_malformed_documents(#[case] raw: &str) {
        let error = DeviceRegistry::from_json(raw).expect_err("must fail");
        assert!(matches!(error, InventoryError::Parse { .. }));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let error = DeviceRegistry::from_json(r#"[{"name":"a"},{"name":"a"}]"#)
            .expect_err("must fail");
        assert!(matches!(error, InventoryError::DuplicateId { id } if id == "a"));
    }

    #[test]
    fn rejects_blank_ids() {
        let error =
            DeviceRegistry::from_json(r#"[{"name":"a"},{"name":"  "}]"#).expect_err("must fail");
        assert!(matches!(error, InventoryError::EmptyId { index: 1 }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.json")).expect("utf8 path");
        let error = DeviceRegistry::load(&path).expect_err("must fail");
        assert!(matches!(error, InventoryError::Read { .. }));
    }

    #[test]
    fn set_health_reports_only_transitions() {
        let registry = DeviceRegistry::from_json(r#"[{"name":"a"}]"#).expect("parse inventory");

        assert_eq!(registry.set_health("a", Health::Healthy), None);
        let changed = registry.set_health("a", Health::Unhealthy);
        assert_eq!(changed, Some(Device::new("a", Health::Unhealthy)));
        assert_eq!(registry.set_health("a", Health::Unhealthy), None);
        assert_eq!(registry.set_health("missing", Health::Unhealthy), None);
    }

    #[test]
    fn wire_device_carries_health_string() {
        let wire = v1beta1::Device::from(&Device::new("a", Health::Unhealthy));
        assert_eq!(wire.id, "a");
        assert_eq!(wire.health, UNHEALTHY);
    }
}
