//! The closed modifier language: scopes, operations, targets, and the
//! per-key accumulators the engine folds them into.
//!
//! Target strings are parsed once when a modifier is loaded. A modifier whose
//! target, scope kind, or operation cannot be parsed is still registered (so
//! upgrades referencing it resolve) but carries a [`SkipReason`]; the engine
//! reports it once and excludes it from accumulation.

use crate::id::{ModifierId, ResourceId};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// The set of entities a modifier applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// Every node instance (multiplier targets) or the target's own resource
    /// key (resource-gain targets).
    Global,
    /// A single instance id, or every instance of a node type id.
    Node(String),
    /// Every instance whose node type carries the tag.
    NodeTag(String),
    /// A resource key.
    Resource(ResourceId),
}

impl Scope {
    /// Build a scope from its schema fields. `reference` is the node id, tag,
    /// or resource id matching `kind`.
    pub fn parse(kind: &str, reference: Option<&str>) -> Result<Scope, SkipReason> {
        let require = |what: &'static str| {
            reference
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .ok_or(SkipReason::MissingScopeReference(what))
        };
        match kind {
            "global" => Ok(Scope::Global),
            "node" => Ok(Scope::Node(require("nodeId")?)),
            "nodeTag" => Ok(Scope::NodeTag(require("nodeTag")?)),
            "resource" => Ok(Scope::Resource(ResourceId(require("resource")?))),
            other => Err(SkipReason::UnknownScopeKind(other.to_string())),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Node(_) => "node",
            Scope::NodeTag(_) => "nodeTag",
            Scope::Resource(_) => "resource",
        }
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// How a modifier's value combines with others at the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Multiply,
    Add,
    Set,
}

impl Operation {
    pub fn parse(s: &str) -> Result<Operation, SkipReason> {
        match s {
            "multiply" => Ok(Operation::Multiply),
            "add" => Ok(Operation::Add),
            "set" => Ok(Operation::Set),
            other => Err(SkipReason::UnknownOperation(other.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Multiply => "multiply",
            Operation::Add => "add",
            Operation::Set => "set",
        })
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// The quantity a modifier affects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// Cycle speed multiplier of a node instance.
    NodeSpeed,
    /// Output multiplier of a node instance, optionally only for one resource.
    NodeOutput(Option<ResourceId>),
    /// Gain multiplier applied to every payout of a resource. The resource
    /// may instead come from a `resource` scope.
    ResourceGain(Option<ResourceId>),
    /// Automation on/off for a node instance.
    AutomationPolicy,
}

impl Target {
    /// Parse a target string. Accepts both the bracket form
    /// (`resourceGain[gold]`) and the dotted form
    /// (`node.outputMultiplier.gold`).
    pub fn parse(raw: &str) -> Result<Target, SkipReason> {
        let raw = raw.trim();
        let unknown = || SkipReason::UnknownTarget(raw.to_string());

        let (head, resource) = split_resource(raw).ok_or_else(unknown)?;
        match head {
            "nodeSpeed" | "node.speedMultiplier" | "node.speed" => match resource {
                None => Ok(Target::NodeSpeed),
                Some(_) => Err(unknown()),
            },
            "nodeOutput" | "node.outputMultiplier" | "node.output" => {
                Ok(Target::NodeOutput(resource))
            }
            "resourceGain" | "resource.gainMultiplier" | "resource.gain" => {
                Ok(Target::ResourceGain(resource))
            }
            "automation"
            | "automationPolicy"
            | "automation.policy"
            | "automation.autoCollect"
            | "automation.autoRestart" => match resource {
                None => Ok(Target::AutomationPolicy),
                Some(_) => Err(unknown()),
            },
            _ => Err(unknown()),
        }
    }

    /// Short label used in diagnostics keys.
    pub fn label(&self) -> &'static str {
        match self {
            Target::NodeSpeed => "nodeSpeed",
            Target::NodeOutput(_) => "nodeOutput",
            Target::ResourceGain(_) => "resourceGain",
            Target::AutomationPolicy => "automationPolicy",
        }
    }
}

/// Split `head[res]` or `head.res` (for the dotted multiplier forms) into the
/// head and the optional resource. Returns `None` for malformed brackets.
fn split_resource(raw: &str) -> Option<(&str, Option<ResourceId>)> {
    if let Some(open) = raw.find('[') {
        let inner = raw[open + 1..].strip_suffix(']')?;
        if inner.is_empty() || inner.contains(['[', ']']) {
            return None;
        }
        return Some((&raw[..open], Some(ResourceId::new(inner))));
    }
    if raw.contains(']') {
        return None;
    }
    for head in [
        "node.outputMultiplier",
        "node.output",
        "resource.gainMultiplier",
        "resource.gain",
    ] {
        if let Some(rest) = raw.strip_prefix(head).and_then(|r| r.strip_prefix('.')) {
            if rest.is_empty() {
                return None;
            }
            return Some((head, Some(ResourceId::new(rest))));
        }
    }
    Some((raw, None))
}

// ---------------------------------------------------------------------------
// Skip reasons
// ---------------------------------------------------------------------------

/// Why a modifier is excluded from accumulation. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SkipReason {
    UnknownTarget(String),
    UnknownScopeKind(String),
    UnknownOperation(String),
    MissingScopeReference(&'static str),
    /// `add` is accepted by validation but not executed for this target.
    AddNotExecuted,
    UnsupportedOperation { operation: Operation, target: &'static str },
    UnsupportedScope { scope: &'static str, target: &'static str },
    /// Resource-gain target with neither a bracket resource nor a resource scope.
    MissingResource,
    /// Target resource and resource scope name different resources.
    ResourceMismatch { target: ResourceId, scope: ResourceId },
    /// A value that is NaN or infinite.
    NonFiniteValue,
}

impl SkipReason {
    /// Stable short code used to deduplicate diagnostics.
    pub fn code(&self) -> String {
        match self {
            SkipReason::UnknownTarget(t) => format!("unknown-target:{t}"),
            SkipReason::UnknownScopeKind(k) => format!("unknown-scope:{k}"),
            SkipReason::UnknownOperation(o) => format!("unknown-operation:{o}"),
            SkipReason::MissingScopeReference(f) => format!("missing-scope-ref:{f}"),
            SkipReason::AddNotExecuted => "add-not-executed".to_string(),
            SkipReason::UnsupportedOperation { operation, target } => {
                format!("unsupported-operation:{operation}:{target}")
            }
            SkipReason::UnsupportedScope { scope, target } => {
                format!("unsupported-scope:{scope}:{target}")
            }
            SkipReason::MissingResource => "missing-resource".to_string(),
            SkipReason::ResourceMismatch { target, scope } => {
                format!("resource-mismatch:{target}:{scope}")
            }
            SkipReason::NonFiniteValue => "non-finite-value".to_string(),
        }
    }

    pub(crate) fn unsupported_scope(scope: &Scope, target: &Target) -> Self {
        SkipReason::UnsupportedScope {
            scope: scope.label(),
            target: target.label(),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnknownTarget(t) => write!(f, "unknown target '{t}'"),
            SkipReason::UnknownScopeKind(k) => write!(f, "unknown scope kind '{k}'"),
            SkipReason::UnknownOperation(o) => write!(f, "unknown operation '{o}'"),
            SkipReason::MissingScopeReference(field) => {
                write!(f, "scope is missing its '{field}' reference")
            }
            SkipReason::AddNotExecuted => {
                write!(f, "'add' on a multiplier target is not executed")
            }
            SkipReason::UnsupportedOperation { operation, target } => {
                write!(f, "operation '{operation}' is not supported on {target}")
            }
            SkipReason::UnsupportedScope { scope, target } => {
                write!(f, "scope '{scope}' is not allowed on {target}")
            }
            SkipReason::MissingResource => write!(f, "resource-gain target names no resource"),
            SkipReason::ResourceMismatch { target, scope } => {
                write!(f, "target resource '{target}' does not match scope resource '{scope}'")
            }
            SkipReason::NonFiniteValue => write!(f, "value is not finite"),
        }
    }
}

// ---------------------------------------------------------------------------
// Modifier definition
// ---------------------------------------------------------------------------

/// A fully parsed modifier rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifierRule {
    pub scope: Scope,
    pub operation: Operation,
    pub target: Target,
}

/// A modifier entry. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifierDef {
    pub id: ModifierId,
    /// Domain-prefixed origin (`upgrade.*`, `milestone.*`, `buff.*`).
    pub source: Option<String>,
    pub value: f64,
    /// The parsed rule, or why it could not be parsed.
    pub rule: Result<ModifierRule, SkipReason>,
}

impl ModifierDef {
    /// Parse the string-encoded schema fields into a modifier. Never fails:
    /// unparseable parts become the modifier's skip reason.
    pub fn parse(
        id: impl Into<ModifierId>,
        source: Option<String>,
        scope_kind: &str,
        scope_ref: Option<&str>,
        operation: &str,
        target: &str,
        value: f64,
    ) -> Self {
        let rule = (|| {
            let target = Target::parse(target)?;
            let scope = Scope::parse(scope_kind, scope_ref)?;
            let operation = Operation::parse(operation)?;
            if !value.is_finite() {
                return Err(SkipReason::NonFiniteValue);
            }
            Ok(ModifierRule {
                scope,
                operation,
                target,
            })
        })();
        Self {
            id: id.into(),
            source,
            value,
            rule,
        }
    }

    /// Construct directly from an already parsed rule.
    pub fn new(id: impl Into<ModifierId>, rule: ModifierRule, value: f64) -> Self {
        Self {
            id: id.into(),
            source: None,
            value,
            rule: Ok(rule),
        }
    }
}

// ---------------------------------------------------------------------------
// Accumulators
// ---------------------------------------------------------------------------

/// Outcome of applying one operation to an accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Applied {
    Accumulated,
    /// A different `set` value was already present and has been overwritten.
    SetConflict { previous: f64 },
}

/// The operations a multiplier accumulator executes. `add` has no
/// counterpart and is skipped before accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplierOp {
    Multiply,
    Set,
}

impl Operation {
    /// The executable form on multiplier targets, or `None` for `add`.
    pub fn as_multiplier_op(self) -> Option<MultiplierOp> {
        match self {
            Operation::Multiply => Some(MultiplierOp::Multiply),
            Operation::Set => Some(MultiplierOp::Set),
            Operation::Add => None,
        }
    }
}

/// Per-key multiplier accumulator: identity 1.0, optional set override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accumulator {
    multiply: f64,
    set: Option<f64>,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Accumulator {
    pub const IDENTITY: Accumulator = Accumulator {
        multiply: 1.0,
        set: None,
    };

    /// Apply an operation. `stacks` is the purchase count of the contributing
    /// upgrade; `multiply` compounds as `value^stacks`.
    pub fn apply(&mut self, operation: MultiplierOp, value: f64, stacks: u32) -> Applied {
        match operation {
            MultiplierOp::Multiply => {
                self.multiply *= compound(value, stacks);
                Applied::Accumulated
            }
            MultiplierOp::Set => {
                let previous = self.set.replace(value);
                match previous {
                    Some(prev) if prev != value => Applied::SetConflict { previous: prev },
                    _ => Applied::Accumulated,
                }
            }
        }
    }

    pub fn has_set(&self) -> bool {
        self.set.is_some()
    }

    /// The set value when present, otherwise the multiply product.
    pub fn resolve(&self) -> f64 {
        self.set.unwrap_or(self.multiply)
    }
}

/// `value^stacks`, using integer powers while the count fits.
fn compound(value: f64, stacks: u32) -> f64 {
    match i32::try_from(stacks) {
        Ok(n) => value.powi(n),
        Err(_) => value.powf(stacks as f64),
    }
}

/// Per-key boolean accumulator for automation-policy targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagAccumulator {
    value: Option<bool>,
}

impl FlagAccumulator {
    /// Apply an `add` or `set` as a boolean (`value > 0`). Overwrites any
    /// previous value; reports a conflict if it differed.
    pub fn apply(&mut self, value: f64) -> Applied {
        let flag = value > 0.0;
        match self.value.replace(flag) {
            Some(prev) if prev != flag => Applied::SetConflict {
                previous: if prev { 1.0 } else { 0.0 },
            },
            _ => Applied::Accumulated,
        }
    }

    pub fn resolve(&self) -> Option<bool> {
        self.value
    }
}
