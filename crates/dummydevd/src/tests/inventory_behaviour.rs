//! Behavioural tests for inventory discovery.

use std::cell::RefCell;

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::inventory::{DeviceRegistry, Health, InventoryError};

use super::support::Scratch;

type StepResult = Result<(), String>;

struct InventoryWorld {
    scratch: Scratch,
    inventory: Option<Utf8PathBuf>,
    outcome: Option<Result<DeviceRegistry, InventoryError>>,
}

impl InventoryWorld {
    fn new() -> Self {
        Self {
            scratch: Scratch::new(),
            inventory: None,
            outcome: None,
        }
    }

    fn registry(&self) -> Result<&DeviceRegistry, String> {
        match self.outcome.as_ref() {
            Some(Ok(registry)) => Ok(registry),
            Some(Err(error)) => Err(format!("loading failed: {error}")),
            None => Err("the registry was not loaded".to_owned()),
        }
    }

    fn error(&self) -> Result<&InventoryError, String> {
        match self.outcome.as_ref() {
            Some(Err(error)) => Ok(error),
            Some(Ok(registry)) => Err(format!(
                "loading succeeded with {} devices",
                registry.len()
            )),
            None => Err("the registry was not loaded".to_owned()),
        }
    }
}

#[fixture]
fn world() -> RefCell<InventoryWorld> {
    RefCell::new(InventoryWorld::new())
}

#[given("an inventory listing \"{ids}\"")]
fn given_inventory(world: &RefCell<InventoryWorld>, ids: String) {
    let mut world = world.borrow_mut();
    let ids: Vec<&str> = ids.split(',').collect();
    let path = world.scratch.write_inventory(&ids);
    world.inventory = Some(path);
}

#[given("an inventory containing \"{contents}\"")]
fn given_raw_inventory(world: &RefCell<InventoryWorld>, contents: String) -> StepResult {
    let mut world = world.borrow_mut();
    let path = world.scratch.path("dummyResources.json");
    std::fs::write(&path, contents).map_err(|error| error.to_string())?;
    world.inventory = Some(path);
    Ok(())
}

#[given("no inventory file")]
fn given_no_inventory(world: &RefCell<InventoryWorld>) {
    let mut world = world.borrow_mut();
    let path = world.scratch.path("missing.json");
    world.inventory = Some(path);
}

#[when("the registry is loaded")]
fn when_loaded(world: &RefCell<InventoryWorld>) -> StepResult {
    let mut world = world.borrow_mut();
    let path = world
        .inventory
        .clone()
        .ok_or_else(|| "no inventory configured".to_owned())?;
    world.outcome = Some(DeviceRegistry::load(&path));
    Ok(())
}

#[then("the registry holds {count} devices")]
fn then_holds(world: &RefCell<InventoryWorld>, count: String) -> StepResult {
    let expected: usize = count
        .parse()
        .map_err(|error| format!("invalid count '{count}': {error}"))?;
    let world = world.borrow();
    let registry = world.registry()?;
    if registry.len() == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} devices, found {}", registry.len()))
    }
}

#[then("every device is healthy")]
fn then_all_healthy(world: &RefCell<InventoryWorld>) -> StepResult {
    let world = world.borrow();
    let snapshot = world.registry()?.snapshot();
    let unhealthy: Vec<&str> = snapshot
        .iter()
        .filter(|device| device.health() != Health::Healthy)
        .map(|device| device.id())
        .collect();
    if unhealthy.is_empty() {
        Ok(())
    } else {
        Err(format!("unexpected unhealthy devices: {unhealthy:?}"))
    }
}

#[then("loading fails because \"{id}\" is duplicated")]
fn then_duplicate(world: &RefCell<InventoryWorld>, id: String) -> StepResult {
    let world = world.borrow();
    match world.error()? {
        InventoryError::DuplicateId { id: found } if *found == id => Ok(()),
        other => Err(format!("expected duplicate '{id}', got {other}")),
    }
}

#[then("loading fails with a parse error")]
fn then_parse_error(world: &RefCell<InventoryWorld>) -> StepResult {
    let world = world.borrow();
    match world.error()? {
        InventoryError::Parse { .. } => Ok(()),
        other => Err(format!("expected a parse error, got {other}")),
    }
}

#[then("loading fails with a read error")]
fn then_read_error(world: &RefCell<InventoryWorld>) -> StepResult {
    let world = world.borrow();
    match world.error()? {
        InventoryError::Read { .. } => Ok(()),
        other => Err(format!("expected a read error, got {other}")),
    }
}

#[scenario(
    path = "tests/features/inventory.feature",
    name = "Unique records become healthy devices"
)]
fn unique_records(world: RefCell<InventoryWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/inventory.feature",
    name = "Duplicate records are rejected"
)]
fn duplicate_records(world: RefCell<InventoryWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/inventory.feature",
    name = "Malformed inventories are rejected"
)]
fn malformed_inventory(world: RefCell<InventoryWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/inventory.feature",
    name = "A missing inventory is rejected"
)]
fn missing_inventory(world: RefCell<InventoryWorld>) {
    drop(world);
}
