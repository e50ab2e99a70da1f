//! Serde data file structs for content definitions.
//!
//! Field names are camelCase on disk. Every table is optional so a content
//! file may define only the parts it needs. The loader converts these into
//! catalog definitions.

use cadence_core::catalog::StackingPolicy;
use serde::Deserialize;

// ===========================================================================
// Root
// ===========================================================================

/// The whole content file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentData {
    pub node_types: Vec<NodeTypeData>,
    pub nodes: Vec<NodeData>,
    pub modifiers: Vec<ModifierData>,
    pub upgrades: Vec<UpgradeData>,
    pub milestones: Vec<MilestoneData>,
    pub buffs: Vec<BuffData>,
}

// ===========================================================================
// Nodes
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeData {
    pub id: String,
    pub base_cycle_seconds: f64,
    pub base_output_per_cycle: f64,
    pub output_resource: String,
    #[serde(default)]
    pub base_level_cost: f64,
    #[serde(default = "default_growth")]
    pub level_cost_growth: f64,
    /// Defaults to the output resource.
    #[serde(default)]
    pub cost_resource: Option<String>,
    #[serde(default)]
    pub automation_cost: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub id: String,
    pub node_type: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub initial: InitialStateData,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitialStateData {
    pub enabled: bool,
    pub level: u32,
}

// ===========================================================================
// Modifiers
// ===========================================================================

/// A modifier entry. Scope kind, operation, and target stay strings here;
/// they are parsed (and possibly marked as skipped) when the catalog is built.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifierData {
    pub id: String,
    #[serde(default)]
    pub source: Option<String>,
    pub scope: ScopeData,
    pub operation: String,
    pub target: String,
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeData {
    pub kind: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub node_tag: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
}

impl ScopeData {
    /// The reference field matching `kind`.
    pub fn reference(&self) -> Option<&str> {
        match self.kind.as_str() {
            "node" => self.node_id.as_deref(),
            "nodeTag" => self.node_tag.as_deref(),
            "resource" => self.resource.as_deref(),
            _ => None,
        }
    }
}

// ===========================================================================
// Upgrades, milestones, buffs
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CostData {
    pub resource: String,
    pub amount: f64,
}

/// An indirect reference to a modifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectRef {
    pub modifier_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeData {
    pub id: String,
    #[serde(default)]
    pub cost: Vec<CostData>,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub max_rank: u32,
    #[serde(default = "default_growth_flat")]
    pub cost_growth: f64,
    #[serde(default)]
    pub effects: Vec<EffectRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneData {
    pub id: String,
    #[serde(default)]
    pub grant_effects: Vec<EffectRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuffData {
    pub id: String,
    pub duration_seconds: f64,
    #[serde(default)]
    pub stacking: StackingPolicy,
    #[serde(default)]
    pub effects: Vec<EffectRef>,
}

fn default_growth() -> f64 {
    1.15
}

fn default_growth_flat() -> f64 {
    1.0
}
