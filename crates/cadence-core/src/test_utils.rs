//! Shared test helpers for unit tests, integration tests, and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available everywhere tests run (via the `test-utils` feature).

use crate::catalog::*;
use crate::engine::ModifierEngine;
use crate::id::*;
use crate::modifier::{ModifierDef, ModifierRule, Operation, Scope, Target};
use std::collections::BTreeSet;
use std::sync::Arc;

// ===========================================================================
// Resources
// ===========================================================================

pub fn gold() -> ResourceId {
    ResourceId::from("gold")
}

pub fn gems() -> ResourceId {
    ResourceId::from("gems")
}

// ===========================================================================
// Definitions
// ===========================================================================

/// A node type that costs 10 gold (growth 1.15) per level and 100 gold for
/// automation.
pub fn node_type(
    id: &str,
    resource: &str,
    cycle_seconds: f64,
    output: f64,
    tags: &[&str],
) -> NodeTypeDef {
    NodeTypeDef {
        id: NodeTypeId::from(id),
        base_cycle_seconds: cycle_seconds,
        base_output_per_cycle: output,
        output_resource: ResourceId::from(resource),
        base_level_cost: 10.0,
        level_cost_growth: 1.15,
        cost_resource: gold(),
        automation_cost: 100.0,
        tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
    }
}

/// An unowned instance.
pub fn instance(id: &str, node_type: &str) -> NodeInstanceDef {
    NodeInstanceDef {
        id: InstanceId::from(id),
        node_type: NodeTypeId::from(node_type),
        display_name: None,
        initial: InitialNodeState::default(),
    }
}

/// An instance that starts owned at `level`.
pub fn owned_instance(id: &str, node_type: &str, level: u32) -> NodeInstanceDef {
    NodeInstanceDef {
        initial: InitialNodeState {
            enabled: true,
            level,
        },
        ..instance(id, node_type)
    }
}

pub fn modifier(id: &str, scope: Scope, operation: Operation, target: Target, value: f64) -> ModifierDef {
    ModifierDef::new(
        id,
        ModifierRule {
            scope,
            operation,
            target,
        },
        value,
    )
}

/// `multiply` on node speed.
pub fn speed_mod(id: &str, scope: Scope, value: f64) -> ModifierDef {
    modifier(id, scope, Operation::Multiply, Target::NodeSpeed, value)
}

/// `multiply` on node output (any resource).
pub fn output_mod(id: &str, scope: Scope, value: f64) -> ModifierDef {
    modifier(id, scope, Operation::Multiply, Target::NodeOutput(None), value)
}

fn refs(ids: &[&str]) -> Vec<ModifierId> {
    ids.iter().map(|id| ModifierId::from(*id)).collect()
}

/// A free upgrade. Repeatable upgrades are uncapped with no cost growth.
pub fn upgrade(id: &str, effects: &[&str], repeatable: bool) -> UpgradeDef {
    UpgradeDef {
        id: UpgradeId::from(id),
        cost: Vec::new(),
        repeatable,
        max_rank: 0,
        cost_growth: 1.0,
        effects: refs(effects),
    }
}

pub fn milestone(id: &str, effects: &[&str]) -> MilestoneDef {
    MilestoneDef {
        id: MilestoneId::from(id),
        grant_effects: refs(effects),
    }
}

pub fn buff(id: &str, duration: f64, stacking: StackingPolicy, effects: &[&str]) -> BuffDef {
    BuffDef {
        id: BuffId::from(id),
        duration_seconds: duration,
        stacking,
        effects: refs(effects),
    }
}

// ===========================================================================
// Catalogs
// ===========================================================================

/// Two unowned mines:
///
/// - `mine_a`: `gold_mine`, 2 s cycles, 10 gold per level, tags `ore`, `precious`
/// - `mine_b`: `gem_mine`, 4 s cycles, 5 gems per level, tag `ore`
pub fn two_mine_builder() -> CatalogBuilder {
    let mut builder = CatalogBuilder::new();
    builder
        .node_type(node_type("gold_mine", "gold", 2.0, 10.0, &["ore", "precious"]))
        .node_type(node_type("gem_mine", "gems", 4.0, 5.0, &["ore"]))
        .instance(instance("mine_a", "gold_mine"))
        .instance(instance("mine_b", "gem_mine"));
    builder
}

pub fn two_mine_catalog() -> Catalog {
    match two_mine_builder().build() {
        Ok(catalog) => catalog,
        Err(e) => panic!("fixture catalog is invalid: {e}"),
    }
}

/// An engine over `catalog`, not yet recomputed.
pub fn engine_for(catalog: Catalog) -> ModifierEngine {
    ModifierEngine::new(Arc::new(catalog))
}
