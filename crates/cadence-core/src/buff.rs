//! Buff lifecycle: stacking policies, countdown, and expiry.
//!
//! Each active buff instance is registered with the engine as a buff source
//! under its own key. Registration validates the buff's modifier references
//! eagerly, so a broken buff fails at activation rather than silently doing
//! nothing.

use crate::catalog::StackingPolicy;
use crate::engine::{EngineError, ModifierEngine};
use crate::id::BuffId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Remaining time at or below this counts as expired. Subtracting 0.1 a
/// hundred times from 10.0 leaves a small positive remainder, not zero.
pub const EXPIRY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuffError {
    #[error("unknown buff '{0}'")]
    UnknownBuff(BuffId),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Result of an activation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// A new instance was registered under `source_key`.
    Started { source_key: String },
    /// The existing instance's timer was reset to the full duration.
    Refreshed { source_key: String },
    /// The existing instance's timer was extended by the duration.
    Extended { source_key: String },
    /// Non-stacking buff already active.
    Rejected,
}

/// One running buff instance. Also the persisted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveBuff {
    pub buff: BuffId,
    pub source_key: String,
    pub remaining: f64,
}

#[derive(Debug, Default)]
pub struct BuffTracker {
    active: BTreeMap<String, ActiveBuff>,
    stack_counters: BTreeMap<BuffId, u64>,
}

impl BuffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate a buff according to its stacking policy.
    pub fn activate(
        &mut self,
        engine: &mut ModifierEngine,
        id: &BuffId,
    ) -> Result<Activation, BuffError> {
        let catalog = Arc::clone(engine.catalog());
        let def = catalog
            .buff(id)
            .ok_or_else(|| BuffError::UnknownBuff(id.clone()))?;
        let key = source_key(id);

        let activation = match def.stacking {
            StackingPolicy::None if self.active.contains_key(&key) => Activation::Rejected,
            StackingPolicy::Refresh if self.active.contains_key(&key) => {
                if let Some(buff) = self.active.get_mut(&key) {
                    buff.remaining = def.duration_seconds;
                }
                Activation::Refreshed { source_key: key }
            }
            StackingPolicy::Extend if self.active.contains_key(&key) => {
                if let Some(buff) = self.active.get_mut(&key) {
                    buff.remaining += def.duration_seconds;
                }
                Activation::Extended { source_key: key }
            }
            StackingPolicy::Stack => {
                let n = self.stack_counters.entry(id.clone()).or_insert(0);
                *n += 1;
                let key = format!("{key}#{n}");
                self.register(engine, id, key, def.duration_seconds, &def.effects)?
            }
            _ => self.register(engine, id, key, def.duration_seconds, &def.effects)?,
        };
        log::debug!("buff '{id}' activation: {activation:?}");
        Ok(activation)
    }

    fn register(
        &mut self,
        engine: &mut ModifierEngine,
        id: &BuffId,
        key: String,
        duration: f64,
        effects: &[crate::id::ModifierId],
    ) -> Result<Activation, BuffError> {
        engine.set_buff_modifier_source(key.clone(), effects.to_vec())?;
        self.active.insert(
            key.clone(),
            ActiveBuff {
                buff: id.clone(),
                source_key: key.clone(),
                remaining: duration,
            },
        );
        Ok(Activation::Started { source_key: key })
    }

    /// Count down every instance by `dt`. Expired instances are removed from
    /// the engine; their source keys are returned in ascending order.
    pub fn advance(&mut self, dt: f64, engine: &mut ModifierEngine) -> Vec<String> {
        if !(dt.is_finite() && dt > 0.0) {
            return Vec::new();
        }
        let mut expired = Vec::new();
        for (key, buff) in &mut self.active {
            buff.remaining -= dt;
            if buff.remaining <= EXPIRY_EPSILON {
                expired.push(key.clone());
            }
        }
        for key in &expired {
            self.active.remove(key);
            engine.remove_buff_modifier_source(key);
            log::debug!("buff source '{key}' expired");
        }
        expired
    }

    /// Remove one instance and its engine source without expiring it.
    pub fn cancel(&mut self, source_key: &str, engine: &mut ModifierEngine) -> bool {
        if self.active.remove(source_key).is_none() {
            return false;
        }
        engine.remove_buff_modifier_source(source_key);
        log::debug!("buff source '{source_key}' cancelled");
        true
    }

    /// Seconds until the next instance expires.
    pub fn next_expiry(&self) -> Option<f64> {
        self.active
            .values()
            .map(|b| b.remaining)
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn is_active(&self, id: &BuffId) -> bool {
        self.active.values().any(|b| &b.buff == id)
    }

    /// Longest remaining time across instances of a buff.
    pub fn remaining(&self, id: &BuffId) -> Option<f64> {
        self.active
            .values()
            .filter(|b| &b.buff == id)
            .map(|b| b.remaining)
            .max_by(|a, b| a.total_cmp(b))
    }

    /// Active instances in ascending source-key order.
    pub fn active(&self) -> impl Iterator<Item = &ActiveBuff> {
        self.active.values()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Re-register persisted instances. Instances of buffs no longer in the
    /// catalog are dropped with a warning.
    pub fn restore(
        &mut self,
        saved: Vec<ActiveBuff>,
        engine: &mut ModifierEngine,
    ) -> Result<(), BuffError> {
        let catalog = Arc::clone(engine.catalog());
        for buff in saved {
            let Some(def) = catalog.buff(&buff.buff) else {
                log::warn!("dropping saved buff '{}': not in the catalog", buff.buff);
                continue;
            };
            if !(buff.remaining.is_finite() && buff.remaining > 0.0) {
                continue;
            }
            if let Some(n) = stack_index(&buff.source_key) {
                let counter = self.stack_counters.entry(buff.buff.clone()).or_insert(0);
                *counter = (*counter).max(n);
            }
            engine.set_buff_modifier_source(buff.source_key.clone(), def.effects.clone())?;
            self.active.insert(buff.source_key.clone(), buff);
        }
        Ok(())
    }
}

/// Engine source key of a non-stacked buff instance.
pub fn source_key(id: &BuffId) -> String {
    if id.as_str().starts_with("buff.") {
        id.as_str().to_string()
    } else {
        format!("buff.{id}")
    }
}

fn stack_index(key: &str) -> Option<u64> {
    key.rsplit_once('#').and_then(|(_, n)| n.parse().ok())
}
