mod inventory_behaviour;
mod support;
