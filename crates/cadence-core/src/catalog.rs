//! Read-only content catalogs: node types, node instances, modifiers,
//! upgrades, milestones, and buffs.
//!
//! Built once through [`CatalogBuilder`] and frozen into an immutable
//! [`Catalog`], shared as `Arc<Catalog>` by the engine and every simulator.
//! Effect references to unknown modifier ids are not build errors; the owning
//! entry is flagged in [`Catalog::content_issues`] and treated as inert.

use crate::id::*;
use crate::modifier::ModifierDef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// One resource/amount pair of a cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostItem {
    pub resource: ResourceId,
    pub amount: f64,
}

impl CostItem {
    pub fn new(resource: impl Into<ResourceId>, amount: f64) -> Self {
        Self {
            resource: resource.into(),
            amount,
        }
    }
}

/// A static production archetype.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTypeDef {
    pub id: NodeTypeId,
    /// Seconds per cycle at speed multiplier 1.0.
    pub base_cycle_seconds: f64,
    /// Output per cycle per level at output multiplier 1.0.
    pub base_output_per_cycle: f64,
    pub output_resource: ResourceId,
    /// Cost of the first level.
    pub base_level_cost: f64,
    /// Per-level cost growth factor.
    pub level_cost_growth: f64,
    /// Currency spent on levels and automation.
    pub cost_resource: ResourceId,
    /// Fixed price of automation.
    pub automation_cost: f64,
    pub tags: BTreeSet<String>,
}

/// Initial state of a placed node instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialNodeState {
    /// Whether the instance starts owned (at least level 1).
    pub enabled: bool,
    pub level: u32,
}

/// A placed copy of a node type.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInstanceDef {
    pub id: InstanceId,
    pub node_type: NodeTypeId,
    pub display_name: Option<String>,
    pub initial: InitialNodeState,
}

/// A purchasable upgrade.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeDef {
    pub id: UpgradeId,
    pub cost: Vec<CostItem>,
    pub repeatable: bool,
    /// 0 means uncapped when repeatable.
    pub max_rank: u32,
    /// Multiplies the cost by `cost_growth^rank` for repeatable upgrades.
    pub cost_growth: f64,
    pub effects: Vec<ModifierId>,
}

impl UpgradeDef {
    /// Rank cap: 1 for one-shot upgrades, `max_rank` (or none) for repeatables.
    pub fn rank_cap(&self) -> Option<u32> {
        if !self.repeatable {
            Some(1)
        } else if self.max_rank == 0 {
            None
        } else {
            Some(self.max_rank)
        }
    }

    /// Cost of buying the next rank given the current purchase count.
    pub fn cost_at_rank(&self, rank: u32) -> Vec<CostItem> {
        let factor = if self.repeatable {
            self.cost_growth.powf(rank as f64)
        } else {
            1.0
        };
        self.cost
            .iter()
            .map(|c| CostItem {
                resource: c.resource.clone(),
                amount: c.amount * factor,
            })
            .collect()
    }
}

/// A one-time milestone.
#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneDef {
    pub id: MilestoneId,
    pub grant_effects: Vec<ModifierId>,
}

/// How repeated activations of an active buff combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackingPolicy {
    /// Reject activation while active.
    #[default]
    None,
    /// Reset the remaining time to the full duration.
    Refresh,
    /// Add the duration to the remaining time.
    Extend,
    /// Run an independent instance alongside the existing ones.
    Stack,
}

/// A temporary buff.
#[derive(Debug, Clone, PartialEq)]
pub struct BuffDef {
    pub id: BuffId,
    pub duration_seconds: f64,
    pub stacking: StackingPolicy,
    pub effects: Vec<ModifierId>,
}

// ---------------------------------------------------------------------------
// Errors and issues
// ---------------------------------------------------------------------------

/// Errors that make a catalog un-shippable.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("node instance '{instance}' references unknown node type '{node_type}'")]
    UnknownNodeType {
        instance: InstanceId,
        node_type: NodeTypeId,
    },

    #[error("buff '{0}' must have a positive, finite duration")]
    InvalidBuffDuration(BuffId),

    #[error("node type '{id}' has invalid {field}: {value}")]
    InvalidNumber {
        id: NodeTypeId,
        field: &'static str,
        value: f64,
    },

    #[error("upgrade '{0}' has a non-positive cost growth")]
    InvalidCostGrowth(UpgradeId),
}

/// Which content table an issue belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContentKind {
    Upgrade,
    Milestone,
    Buff,
}

/// A non-fatal content problem: an entry whose effect references do not all
/// resolve. The entry contributes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentIssue {
    pub kind: ContentKind,
    pub id: String,
    pub missing: Vec<ModifierId>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects definitions, then validates and freezes them with [`build`].
///
/// [`build`]: CatalogBuilder::build
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    node_types: Vec<NodeTypeDef>,
    instances: Vec<NodeInstanceDef>,
    modifiers: Vec<ModifierDef>,
    upgrades: Vec<UpgradeDef>,
    milestones: Vec<MilestoneDef>,
    buffs: Vec<BuffDef>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_type(&mut self, def: NodeTypeDef) -> &mut Self {
        self.node_types.push(def);
        self
    }

    pub fn instance(&mut self, def: NodeInstanceDef) -> &mut Self {
        self.instances.push(def);
        self
    }

    pub fn modifier(&mut self, def: ModifierDef) -> &mut Self {
        self.modifiers.push(def);
        self
    }

    pub fn upgrade(&mut self, def: UpgradeDef) -> &mut Self {
        self.upgrades.push(def);
        self
    }

    pub fn milestone(&mut self, def: MilestoneDef) -> &mut Self {
        self.milestones.push(def);
        self
    }

    pub fn buff(&mut self, def: BuffDef) -> &mut Self {
        self.buffs.push(def);
        self
    }

    /// Validate and freeze into an immutable catalog.
    pub fn build(self) -> Result<Catalog, CatalogError> {
        let node_types = index_unique(self.node_types, "node type", |d| d.id.clone())?;
        let instances = index_unique(self.instances, "node instance", |d| d.id.clone())?;
        let modifiers = index_unique(self.modifiers, "modifier", |d| d.id.clone())?;
        let upgrades = index_unique(self.upgrades, "upgrade", |d| d.id.clone())?;
        let milestones = index_unique(self.milestones, "milestone", |d| d.id.clone())?;
        let buffs = index_unique(self.buffs, "buff", |d| d.id.clone())?;

        for def in node_types.values() {
            check_positive(&def.id, "base cycle seconds", def.base_cycle_seconds)?;
            check_positive(&def.id, "level cost growth", def.level_cost_growth)?;
            check_non_negative(&def.id, "base output", def.base_output_per_cycle)?;
            check_non_negative(&def.id, "base level cost", def.base_level_cost)?;
            check_non_negative(&def.id, "automation cost", def.automation_cost)?;
        }

        let mut instances_by_type: BTreeMap<NodeTypeId, Vec<InstanceId>> = BTreeMap::new();
        for inst in instances.values() {
            if !node_types.contains_key(&inst.node_type) {
                return Err(CatalogError::UnknownNodeType {
                    instance: inst.id.clone(),
                    node_type: inst.node_type.clone(),
                });
            }
            instances_by_type
                .entry(inst.node_type.clone())
                .or_default()
                .push(inst.id.clone());
        }

        let mut types_by_tag: BTreeMap<String, BTreeSet<NodeTypeId>> = BTreeMap::new();
        for def in node_types.values() {
            for tag in &def.tags {
                types_by_tag
                    .entry(tag.clone())
                    .or_default()
                    .insert(def.id.clone());
            }
        }

        for def in buffs.values() {
            if !(def.duration_seconds.is_finite() && def.duration_seconds > 0.0) {
                return Err(CatalogError::InvalidBuffDuration(def.id.clone()));
            }
        }
        for def in upgrades.values() {
            if !(def.cost_growth.is_finite() && def.cost_growth > 0.0) {
                return Err(CatalogError::InvalidCostGrowth(def.id.clone()));
            }
        }

        let missing = |refs: &[ModifierId]| -> Vec<ModifierId> {
            refs.iter()
                .filter(|id| !modifiers.contains_key(*id))
                .cloned()
                .collect()
        };
        let mut issues = Vec::new();
        for def in upgrades.values() {
            push_issue(&mut issues, ContentKind::Upgrade, def.id.as_str(), missing(&def.effects));
        }
        for def in milestones.values() {
            push_issue(
                &mut issues,
                ContentKind::Milestone,
                def.id.as_str(),
                missing(&def.grant_effects),
            );
        }
        for def in buffs.values() {
            push_issue(&mut issues, ContentKind::Buff, def.id.as_str(), missing(&def.effects));
        }

        Ok(Catalog {
            node_types,
            instances,
            modifiers,
            upgrades,
            milestones,
            buffs,
            instances_by_type,
            types_by_tag,
            issues,
        })
    }
}

fn index_unique<K: Ord + ToString, V>(
    defs: Vec<V>,
    kind: &'static str,
    key: impl Fn(&V) -> K,
) -> Result<BTreeMap<K, V>, CatalogError> {
    let mut map = BTreeMap::new();
    for def in defs {
        let k = key(&def);
        if map.contains_key(&k) {
            return Err(CatalogError::DuplicateId {
                kind,
                id: k.to_string(),
            });
        }
        map.insert(k, def);
    }
    Ok(map)
}

fn check_positive(id: &NodeTypeId, field: &'static str, value: f64) -> Result<(), CatalogError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CatalogError::InvalidNumber {
            id: id.clone(),
            field,
            value,
        })
    }
}

fn check_non_negative(
    id: &NodeTypeId,
    field: &'static str,
    value: f64,
) -> Result<(), CatalogError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CatalogError::InvalidNumber {
            id: id.clone(),
            field,
            value,
        })
    }
}

fn push_issue(issues: &mut Vec<ContentIssue>, kind: ContentKind, id: &str, missing: Vec<ModifierId>) {
    if !missing.is_empty() {
        issues.push(ContentIssue {
            kind,
            id: id.to_string(),
            missing,
        });
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Immutable content tables. Frozen after [`CatalogBuilder::build`].
#[derive(Debug)]
pub struct Catalog {
    node_types: BTreeMap<NodeTypeId, NodeTypeDef>,
    instances: BTreeMap<InstanceId, NodeInstanceDef>,
    modifiers: BTreeMap<ModifierId, ModifierDef>,
    upgrades: BTreeMap<UpgradeId, UpgradeDef>,
    milestones: BTreeMap<MilestoneId, MilestoneDef>,
    buffs: BTreeMap<BuffId, BuffDef>,
    instances_by_type: BTreeMap<NodeTypeId, Vec<InstanceId>>,
    types_by_tag: BTreeMap<String, BTreeSet<NodeTypeId>>,
    issues: Vec<ContentIssue>,
}

impl Catalog {
    pub fn node_type(&self, id: &NodeTypeId) -> Option<&NodeTypeDef> {
        self.node_types.get(id)
    }

    pub fn instance(&self, id: &InstanceId) -> Option<&NodeInstanceDef> {
        self.instances.get(id)
    }

    /// The node type of an instance.
    pub fn instance_node_type(&self, id: &InstanceId) -> Option<&NodeTypeDef> {
        self.instances
            .get(id)
            .and_then(|inst| self.node_types.get(&inst.node_type))
    }

    pub fn modifier(&self, id: &ModifierId) -> Option<&ModifierDef> {
        self.modifiers.get(id)
    }

    pub fn upgrade(&self, id: &UpgradeId) -> Option<&UpgradeDef> {
        self.upgrades.get(id)
    }

    pub fn milestone(&self, id: &MilestoneId) -> Option<&MilestoneDef> {
        self.milestones.get(id)
    }

    pub fn buff(&self, id: &BuffId) -> Option<&BuffDef> {
        self.buffs.get(id)
    }

    /// All instance ids in ascending order.
    pub fn instance_ids(&self) -> impl Iterator<Item = &InstanceId> {
        self.instances.keys()
    }

    pub fn instances(&self) -> impl Iterator<Item = &NodeInstanceDef> {
        self.instances.values()
    }

    pub fn upgrades(&self) -> impl Iterator<Item = &UpgradeDef> {
        self.upgrades.values()
    }

    /// Instances of a node type, ascending.
    pub fn instances_of_type(&self, id: &NodeTypeId) -> &[InstanceId] {
        self.instances_by_type
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Node types carrying a tag, or `None` if no type declares the tag.
    pub fn node_types_with_tag(&self, tag: &str) -> Option<&BTreeSet<NodeTypeId>> {
        self.types_by_tag.get(tag)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Entries whose effect references do not all resolve.
    pub fn content_issues(&self) -> &[ContentIssue] {
        &self.issues
    }

    pub fn is_upgrade_valid(&self, id: &UpgradeId) -> bool {
        self.upgrades.contains_key(id) && !self.has_issue(ContentKind::Upgrade, id.as_str())
    }

    pub fn is_milestone_valid(&self, id: &MilestoneId) -> bool {
        self.milestones.contains_key(id) && !self.has_issue(ContentKind::Milestone, id.as_str())
    }

    fn has_issue(&self, kind: ContentKind, id: &str) -> bool {
        self.issues.iter().any(|i| i.kind == kind && i.id == id)
    }
}
