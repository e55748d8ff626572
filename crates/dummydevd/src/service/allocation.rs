//! Pure allocation planning shared by `Allocate` and `GetPreferredAllocation`.

use std::collections::{HashMap, HashSet};

use crate::inventory::{DeviceRegistry, Health};

/// Outcome of checking one container's requested ids against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    granted: Vec<String>,
    unknown: Vec<String>,
}

impl AllocationPlan {
    /// Partitions `requested` into known and unknown ids, keeping request order.
    ///
    /// Repeated ids are kept once, at their first position.
    #[must_use]
    pub fn new(registry: &DeviceRegistry, requested: &[String]) -> Self {
        let mut seen = HashSet::new();
        let (granted, unknown): (Vec<String>, Vec<String>) = requested
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .partition(|id| registry.contains(id));
        Self { granted, unknown }
    }

    /// Ids present in the registry.
    #[must_use]
    pub fn granted(&self) -> &[String] {
        &self.granted
    }

    /// Ids the registry has never heard of.
    #[must_use]
    pub fn unknown(&self) -> &[String] {
        &self.unknown
    }

    /// Returns `true` when every requested id is known.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unknown.is_empty()
    }

    /// Environment handed to the container: `variable` set to the granted ids
    /// joined by commas. Empty when nothing was granted.
    #[must_use]
    pub fn environment(&self, variable: &str) -> HashMap<String, String> {
        let mut envs = HashMap::new();
        if !self.granted.is_empty() {
            envs.insert(variable.to_owned(), self.granted.join(","));
        }
        envs
    }
}

/// Rejected preferred-allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PreferenceError {
    /// The node agent asked for a negative number of devices.
    #[error("allocation size {size} must not be negative")]
    NegativeSize {
        /// Requested size.
        size: i32,
    },
}

/// Chooses up to `size` devices: every known `must_include` id first, then
/// healthy `available` ids in the order offered.
pub fn preferred_devices(
    registry: &DeviceRegistry,
    available: &[String],
    must_include: &[String],
    size: i32,
) -> Result<Vec<String>, PreferenceError> {
    let target = usize::try_from(size).map_err(|_| PreferenceError::NegativeSize { size })?;
    let mut chosen = Vec::with_capacity(target);
    let mut seen = HashSet::new();

    for id in must_include {
        if registry.contains(id) && seen.insert(id.as_str()) {
            chosen.push(id.clone());
        }
    }

    for id in available {
        if chosen.len() >= target {
            break;
        }
        let healthy = registry
            .get(id)
            .is_some_and(|device| device.health() == Health::Healthy);
        if healthy && seen.insert(id.as_str()) {
            chosen.push(id.clone());
        }
    }

    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[fixture]
    fn registry() -> DeviceRegistry {
        DeviceRegistry::from_json(r#"[{"name":"a"},{"name":"b"},{"name":"c"},{"name":"d"}]"#)
            .expect("registry")
    }

    #[rstest]
    fn unknown_ids_are_partitioned_out(registry: DeviceRegistry) {
        let plan = AllocationPlan::new(&registry, &ids(&["a", "x", "b"]));
        assert_eq!(plan.granted(), ids(&["a", "b"]).as_slice());
        assert_eq!(plan.unknown(), ids(&["x"]).as_slice());
        assert!(!plan.is_complete());
    }

    #[rstest]
    fn environment_lists_ids_in_request_order(registry: DeviceRegistry) {
        let plan = AllocationPlan::new(&registry, &ids(&["c", "a"]));
        let envs = plan.environment("DUMMY_DEVICES");
        assert_eq!(envs.get("DUMMY_DEVICES").map(String::as_str), Some("c,a"));
        assert_eq!(envs.len(), 1);
    }

    #[rstest]
    fn repeated_ids_are_granted_once(registry: DeviceRegistry) {
        let plan = AllocationPlan::new(&registry, &ids(&["b", "a", "b", "x", "x"]));
        assert_eq!(plan.granted(), ids(&["b", "a"]).as_slice());
        assert_eq!(plan.unknown(), ids(&["x"]).as_slice());
        let envs = plan.environment("DUMMY_DEVICES");
        assert_eq!(envs.get("DUMMY_DEVICES").map(String::as_str), Some("b,a"));
    }

    #[rstest]
    fn empty_request_yields_empty_environment(registry: DeviceRegistry) {
        let plan = AllocationPlan::new(&registry, &[]);
        assert!(plan.is_complete());
        assert!(plan.environment("DUMMY_DEVICES").is_empty());
    }

    #[rstest]
    #[case::fills_from_available(&["a", "b", "c"], &[], 2, &["a", "b"])]
    #[case::must_include_first(&["a", "b", "c"], &["c"], 2, &["c", "a"])]
    #[case::skips_unknown(&["x", "b"], &["y"], 2, &["b"])]
    #[case::zero_size(&["a"], &[], 0, &[])]
    #[case::no_duplicates(&["a", "a", "b"], &["a"], 3, &["a", "b"])]
    fn preferred_allocation_policy(
        registry: DeviceRegistry,
        #[case] available: &[&str],
        #[case] must_include: &[&str],
        #[case] size: i32,
        #[case] expected: &[&str],
    ) {
        let chosen = preferred_devices(&registry, &ids(available), &ids(must_include), size)
            .expect("valid request");
        assert_eq!(chosen, ids(expected));
    }

    #[rstest]
    fn preferred_allocation_skips_unhealthy_devices(registry: DeviceRegistry) {
        registry.set_health("a", Health::Unhealthy);
        let chosen =
            preferred_devices(&registry, &ids(&["a", "b"]), &[], 1).expect("valid request");
        assert_eq!(chosen, ids(&["b"]));
    }

    #[rstest]
    fn negative_size_is_rejected(registry: DeviceRegistry) {
        let error = preferred_devices(&registry, &ids(&["a"]), &[], -1).expect_err("must fail");
        assert_eq!(error, PreferenceError::NegativeSize { size: -1 });
    }
}
