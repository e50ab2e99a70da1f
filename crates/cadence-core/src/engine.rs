//! Modifier resolution engine.
//!
//! Turns the ledger (purchased upgrades, fired milestones) plus the active
//! buff sources into concrete per-key multipliers and automation flags.
//!
//! # Recompute pipeline
//!
//! 1. **Active set** -- purchased upgrades (ascending id, with purchase
//!    count), then buff sources (ascending key), then fired milestones
//!    (ascending id). An upgrade or milestone with any unresolved effect
//!    reference contributes nothing.
//! 2. **Scope resolution** -- each modifier's scope expands to instance keys
//!    or a resource key. Unknown node / tag references abort the recompute.
//! 3. **Accumulation** -- one [`Accumulator`] per key; `multiply` compounds
//!    (`value^count` for repeatable upgrades), `set` overrides, conflicting
//!    `set` values resolve last-applied-wins.
//! 4. **Publish** -- the [`ResolvedModifiers`] snapshot is replaced
//!    wholesale and `Changed` is emitted once.
//!
//! Unsupported combinations are skipped and reported once through
//! [`Diagnostics`].

use crate::catalog::Catalog;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::id::*;
use crate::ledger::ProgressionLedger;
use crate::modifier::{
    Accumulator, Applied, FlagAccumulator, ModifierDef, Operation, Scope, SkipReason, Target,
};
use crate::signal::{Signal, SubscriptionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Configuration errors raised by the engine. Skip conditions are never
/// errors; see [`Diagnostics`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("modifier '{modifier}' references unknown node '{node}'")]
    UnknownNodeRef { modifier: ModifierId, node: String },

    #[error("modifier '{modifier}' references unknown node tag '{tag}'")]
    UnknownNodeTag { modifier: ModifierId, tag: String },

    #[error("buff source '{source_key}' references unknown modifier '{modifier}'")]
    UnknownModifier {
        source_key: String,
        modifier: ModifierId,
    },
}

// ---------------------------------------------------------------------------
// Resolved maps
// ---------------------------------------------------------------------------

/// Engine output. Rebuilt wholesale on every recompute, read-only between
/// rebuilds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedModifiers {
    pub node_speed: BTreeMap<InstanceId, f64>,
    pub node_output: BTreeMap<InstanceId, f64>,
    /// Resource-scoped output multipliers. Override `node_output` for the
    /// matching resource.
    pub node_output_by_resource: BTreeMap<(InstanceId, ResourceId), f64>,
    pub resource_gain: BTreeMap<ResourceId, f64>,
    pub automation: BTreeMap<InstanceId, bool>,
}

impl ResolvedModifiers {
    /// Speed multiplier of an instance (1.0 when unmodified).
    pub fn node_speed_multiplier(&self, instance: &InstanceId) -> f64 {
        self.node_speed.get(instance).copied().unwrap_or(1.0)
    }

    /// Output multiplier of an instance. A resource-scoped entry wins over
    /// the instance-only entry, which wins over 1.0.
    pub fn node_output_multiplier(
        &self,
        instance: &InstanceId,
        resource: Option<&ResourceId>,
    ) -> f64 {
        if let Some(resource) = resource
            && let Some(v) = self
                .node_output_by_resource
                .get(&(instance.clone(), resource.clone()))
        {
            return *v;
        }
        self.node_output.get(instance).copied().unwrap_or(1.0)
    }

    pub fn resource_gain_multiplier(&self, resource: &ResourceId) -> f64 {
        self.resource_gain.get(resource).copied().unwrap_or(1.0)
    }

    pub fn is_node_automation_enabled(&self, instance: &InstanceId) -> bool {
        self.automation.get(instance).copied().unwrap_or(false)
    }
}

/// Payload of the `Changed` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifiersChanged {
    /// Incremented by one per successful recompute.
    pub revision: u64,
    pub active_modifiers: usize,
}

// ---------------------------------------------------------------------------
// Active set
// ---------------------------------------------------------------------------

/// One entry of the active set.
#[derive(Debug, Clone, Copy)]
struct ActiveModifier<'c> {
    def: &'c ModifierDef,
    /// Purchase count for repeatable upgrades, 1 otherwise.
    stacks: u32,
}

/// Per-key accumulators for one recompute.
#[derive(Default)]
struct MapBuilder {
    node_speed: BTreeMap<InstanceId, Accumulator>,
    node_output: BTreeMap<InstanceId, Accumulator>,
    node_output_by_resource: BTreeMap<(InstanceId, ResourceId), Accumulator>,
    resource_gain: BTreeMap<ResourceId, Accumulator>,
    automation: BTreeMap<InstanceId, FlagAccumulator>,
}

impl MapBuilder {
    fn finish(self) -> ResolvedModifiers {
        ResolvedModifiers {
            node_speed: resolve_all(self.node_speed),
            node_output: resolve_all(self.node_output),
            node_output_by_resource: resolve_all(self.node_output_by_resource),
            resource_gain: resolve_all(self.resource_gain),
            automation: self
                .automation
                .into_iter()
                .filter_map(|(k, acc)| acc.resolve().map(|v| (k, v)))
                .collect(),
        }
    }
}

fn resolve_all<K: Ord>(map: BTreeMap<K, Accumulator>) -> BTreeMap<K, f64> {
    map.into_iter().map(|(k, acc)| (k, acc.resolve())).collect()
}

// ---------------------------------------------------------------------------
// ModifierEngine
// ---------------------------------------------------------------------------

/// Owns the buff-source registry, the current resolved snapshot, and the
/// `Changed` notification.
pub struct ModifierEngine {
    catalog: Arc<Catalog>,
    buff_sources: BTreeMap<String, Vec<ModifierId>>,
    resolved: Arc<ResolvedModifiers>,
    revision: u64,
    dirty: bool,
    diagnostics: Diagnostics,
    changed: Signal<ModifiersChanged>,
}

impl std::fmt::Debug for ModifierEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModifierEngine")
            .field("buff_sources", &self.buff_sources)
            .field("revision", &self.revision)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl ModifierEngine {
    /// Create an engine with identity maps. Starts dirty so the first
    /// recompute always runs.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            buff_sources: BTreeMap::new(),
            resolved: Arc::new(ResolvedModifiers::default()),
            revision: 0,
            dirty: true,
            diagnostics: Diagnostics::new(),
            changed: Signal::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    // -- Buff sources --

    /// Register (or replace) the modifier list of a buff source. Every
    /// reference is validated now; an unknown id fails the activation.
    pub fn set_buff_modifier_source(
        &mut self,
        key: impl Into<String>,
        modifiers: Vec<ModifierId>,
    ) -> Result<(), EngineError> {
        let key = key.into();
        if let Some(missing) = modifiers
            .iter()
            .find(|id| self.catalog.modifier(id).is_none())
        {
            return Err(EngineError::UnknownModifier {
                source_key: key,
                modifier: missing.clone(),
            });
        }
        log::debug!("buff source '{key}' set ({} modifiers)", modifiers.len());
        self.buff_sources.insert(key, modifiers);
        self.dirty = true;
        Ok(())
    }

    /// Remove a buff source. Returns `false` if it was not registered.
    pub fn remove_buff_modifier_source(&mut self, key: &str) -> bool {
        let removed = self.buff_sources.remove(key).is_some();
        if removed {
            log::debug!("buff source '{key}' removed");
            self.dirty = true;
        }
        removed
    }

    /// Registered buff source keys, ascending.
    pub fn buff_source_keys(&self) -> impl Iterator<Item = &str> {
        self.buff_sources.keys().map(String::as_str)
    }

    // -- Recompute --

    /// Flag that the ledger changed and the next flush must recompute.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Rebuild every map from scratch and emit `Changed` once.
    ///
    /// On a configuration error the previous snapshot stays in place, the
    /// engine stays dirty, and no notification is sent.
    pub fn recompute(
        &mut self,
        ledger: &ProgressionLedger,
    ) -> Result<Arc<ResolvedModifiers>, EngineError> {
        let catalog = Arc::clone(&self.catalog);
        let active = self.collect_active(&catalog, ledger);

        let mut maps = MapBuilder::default();
        for entry in &active {
            self.accumulate(&catalog, entry, &mut maps)?;
        }

        self.resolved = Arc::new(maps.finish());
        self.revision += 1;
        self.dirty = false;

        let notice = ModifiersChanged {
            revision: self.revision,
            active_modifiers: active.len(),
        };
        log::debug!(
            "modifiers recomputed: revision {} with {} active modifiers",
            notice.revision,
            notice.active_modifiers
        );
        self.changed.emit(&notice);
        Ok(Arc::clone(&self.resolved))
    }

    /// Recompute only if something changed since the last recompute.
    /// Returns whether a recompute happened.
    pub fn flush(&mut self, ledger: &ProgressionLedger) -> Result<bool, EngineError> {
        if !self.dirty {
            return Ok(false);
        }
        self.recompute(ledger)?;
        Ok(true)
    }

    fn collect_active<'c>(
        &mut self,
        catalog: &'c Catalog,
        ledger: &ProgressionLedger,
    ) -> Vec<ActiveModifier<'c>> {
        let mut active = Vec::new();

        for (id, &count) in ledger.purchased() {
            if count == 0 {
                continue;
            }
            let Some(upgrade) = catalog.upgrade(id) else {
                self.diagnostics.warn_once(
                    DiagnosticKind::UnknownLedgerEntry,
                    format!("ledger-upgrade:{id}"),
                    || format!("purchased upgrade '{id}' is not in the catalog"),
                );
                continue;
            };
            let Some(defs) = resolve_refs(catalog, &upgrade.effects) else {
                self.diagnostics.warn_once(
                    DiagnosticKind::InvalidUpgrade,
                    format!("invalid-upgrade:{id}"),
                    || format!("upgrade '{id}' references unknown modifiers; it contributes nothing"),
                );
                continue;
            };
            let stacks = upgrade.rank_cap().map_or(count, |cap| count.min(cap));
            active.extend(defs.into_iter().map(|def| ActiveModifier { def, stacks }));
        }

        for ids in self.buff_sources.values() {
            // References were validated at registration.
            active.extend(
                ids.iter()
                    .filter_map(|id| catalog.modifier(id))
                    .map(|def| ActiveModifier { def, stacks: 1 }),
            );
        }

        for id in ledger.fired_milestones() {
            let Some(milestone) = catalog.milestone(id) else {
                self.diagnostics.warn_once(
                    DiagnosticKind::UnknownLedgerEntry,
                    format!("ledger-milestone:{id}"),
                    || format!("fired milestone '{id}' is not in the catalog"),
                );
                continue;
            };
            let Some(defs) = resolve_refs(catalog, &milestone.grant_effects) else {
                self.diagnostics.warn_once(
                    DiagnosticKind::InvalidMilestone,
                    format!("invalid-milestone:{id}"),
                    || format!("milestone '{id}' references unknown modifiers; it contributes nothing"),
                );
                continue;
            };
            active.extend(defs.into_iter().map(|def| ActiveModifier { def, stacks: 1 }));
        }

        active
    }

    fn accumulate(
        &mut self,
        catalog: &Catalog,
        entry: &ActiveModifier<'_>,
        maps: &mut MapBuilder,
    ) -> Result<(), EngineError> {
        let def = entry.def;
        let rule = match &def.rule {
            Ok(rule) => rule,
            Err(reason) => {
                self.skip(def, reason);
                return Ok(());
            }
        };
        let op = rule.operation;
        let multiplier_op = op.as_multiplier_op();

        match &rule.target {
            Target::NodeSpeed => {
                let Some(instances) = scope_instances(catalog, def, &rule.scope)? else {
                    self.skip(def, &SkipReason::unsupported_scope(&rule.scope, &rule.target));
                    return Ok(());
                };
                let Some(op) = multiplier_op else {
                    self.skip(def, &SkipReason::AddNotExecuted);
                    return Ok(());
                };
                for inst in instances {
                    let applied = maps
                        .node_speed
                        .entry(inst.clone())
                        .or_default()
                        .apply(op, def.value, entry.stacks);
                    self.note(def, applied, || format!("nodeSpeed:{inst}"));
                }
            }

            Target::NodeOutput(target_resource) => {
                let (instances, resource) = match &rule.scope {
                    Scope::Resource(scope_resource) => {
                        let resource = match pick_resource(target_resource, Some(scope_resource)) {
                            Ok(r) => r,
                            Err(reason) => {
                                self.skip(def, &reason);
                                return Ok(());
                            }
                        };
                        let all: Vec<InstanceId> = catalog.instance_ids().cloned().collect();
                        (all, Some(resource))
                    }
                    scope => {
                        let instances = scope_instances(catalog, def, scope)?.unwrap_or_default();
                        (instances, target_resource.clone())
                    }
                };
                let Some(op) = multiplier_op else {
                    self.skip(def, &SkipReason::AddNotExecuted);
                    return Ok(());
                };
                for inst in instances {
                    let applied = match &resource {
                        Some(r) => maps
                            .node_output_by_resource
                            .entry((inst.clone(), r.clone()))
                            .or_default()
                            .apply(op, def.value, entry.stacks),
                        None => maps
                            .node_output
                            .entry(inst.clone())
                            .or_default()
                            .apply(op, def.value, entry.stacks),
                    };
                    self.note(def, applied, || match &resource {
                        Some(r) => format!("nodeOutput:{inst}:{r}"),
                        None => format!("nodeOutput:{inst}"),
                    });
                }
            }

            Target::ResourceGain(target_resource) => {
                let resolved = match &rule.scope {
                    Scope::Global => pick_resource(target_resource, None),
                    Scope::Resource(r) => pick_resource(target_resource, Some(r)),
                    scope => Err(SkipReason::unsupported_scope(scope, &rule.target)),
                };
                let resource = match resolved {
                    Ok(r) => r,
                    Err(reason) => {
                        self.skip(def, &reason);
                        return Ok(());
                    }
                };
                let Some(op) = multiplier_op else {
                    self.skip(def, &SkipReason::AddNotExecuted);
                    return Ok(());
                };
                let applied = maps
                    .resource_gain
                    .entry(resource.clone())
                    .or_default()
                    .apply(op, def.value, entry.stacks);
                self.note(def, applied, || format!("resourceGain:{resource}"));
            }

            Target::AutomationPolicy => {
                let Some(instances) = scope_instances(catalog, def, &rule.scope)? else {
                    self.skip(def, &SkipReason::unsupported_scope(&rule.scope, &rule.target));
                    return Ok(());
                };
                if op == Operation::Multiply {
                    self.skip(
                        def,
                        &SkipReason::UnsupportedOperation {
                            operation: op,
                            target: rule.target.label(),
                        },
                    );
                    return Ok(());
                }
                for inst in instances {
                    let applied = maps
                        .automation
                        .entry(inst.clone())
                        .or_default()
                        .apply(def.value);
                    self.note(def, applied, || format!("automation:{inst}"));
                }
            }
        }
        Ok(())
    }

    fn skip(&mut self, def: &ModifierDef, reason: &SkipReason) {
        let id = &def.id;
        self.diagnostics.warn_once(
            DiagnosticKind::SkippedModifier,
            format!("skip:{id}:{}", reason.code()),
            || format!("modifier '{id}' skipped: {reason}"),
        );
    }

    fn note(&mut self, def: &ModifierDef, applied: Applied, key: impl FnOnce() -> String) {
        match applied {
            Applied::Accumulated => {}
            Applied::SetConflict { previous } => {
                let key = key();
                let id = &def.id;
                let value = def.value;
                self.diagnostics.warn_once(
                    DiagnosticKind::SetConflict,
                    format!("set-conflict:{key}"),
                    || {
                        format!(
                            "conflicting set values on {key}: {previous} overridden by {value} from '{id}'"
                        )
                    },
                );
            }
        }
    }

    // -- Queries --

    /// The current snapshot.
    pub fn resolved(&self) -> &ResolvedModifiers {
        &self.resolved
    }

    /// A shared handle to the current snapshot.
    pub fn snapshot(&self) -> Arc<ResolvedModifiers> {
        Arc::clone(&self.resolved)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn node_speed_multiplier(&self, instance: &InstanceId) -> f64 {
        self.resolved.node_speed_multiplier(instance)
    }

    pub fn node_output_multiplier(
        &self,
        instance: &InstanceId,
        resource: Option<&ResourceId>,
    ) -> f64 {
        self.resolved.node_output_multiplier(instance, resource)
    }

    pub fn resource_gain_multiplier(&self, resource: &ResourceId) -> f64 {
        self.resolved.resource_gain_multiplier(resource)
    }

    pub fn is_node_automation_enabled(&self, instance: &InstanceId) -> bool {
        self.resolved.is_node_automation_enabled(instance)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    // -- Notifications --

    /// Subscribe to `Changed`. Called once per successful recompute.
    pub fn subscribe_changed(
        &mut self,
        listener: impl FnMut(&ModifiersChanged) + 'static,
    ) -> SubscriptionId {
        self.changed.subscribe(listener)
    }

    pub fn unsubscribe_changed(&mut self, id: SubscriptionId) -> bool {
        self.changed.unsubscribe(id)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve every reference, or `None` if any is missing.
fn resolve_refs<'c>(catalog: &'c Catalog, refs: &[ModifierId]) -> Option<Vec<&'c ModifierDef>> {
    refs.iter().map(|id| catalog.modifier(id)).collect()
}

/// Expand a node-class scope to instance ids. `Ok(None)` for scopes that do
/// not name nodes (resource scope).
fn scope_instances(
    catalog: &Catalog,
    def: &ModifierDef,
    scope: &Scope,
) -> Result<Option<Vec<InstanceId>>, EngineError> {
    match scope {
        Scope::Global => Ok(Some(catalog.instance_ids().cloned().collect())),
        Scope::Node(node) => {
            let instance = InstanceId::new(node.as_str());
            if catalog.instance(&instance).is_some() {
                return Ok(Some(vec![instance]));
            }
            let node_type = NodeTypeId::new(node.as_str());
            if catalog.node_type(&node_type).is_some() {
                return Ok(Some(catalog.instances_of_type(&node_type).to_vec()));
            }
            Err(EngineError::UnknownNodeRef {
                modifier: def.id.clone(),
                node: node.clone(),
            })
        }
        Scope::NodeTag(tag) => {
            let types = catalog
                .node_types_with_tag(tag)
                .ok_or_else(|| EngineError::UnknownNodeTag {
                    modifier: def.id.clone(),
                    tag: tag.clone(),
                })?;
            Ok(Some(
                types
                    .iter()
                    .flat_map(|t| catalog.instances_of_type(t).iter().cloned())
                    .collect(),
            ))
        }
        Scope::Resource(_) => Ok(None),
    }
}

/// Combine a target's bracket resource with a resource scope.
fn pick_resource(
    target: &Option<ResourceId>,
    scope: Option<&ResourceId>,
) -> Result<ResourceId, SkipReason> {
    match (target, scope) {
        (Some(t), Some(s)) if t != s => Err(SkipReason::ResourceMismatch {
            target: t.clone(),
            scope: s.clone(),
        }),
        (Some(t), _) => Ok(t.clone()),
        (None, Some(s)) => Ok(s.clone()),
        (None, None) => Err(SkipReason::MissingResource),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
