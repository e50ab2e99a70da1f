//! Progression ledger: purchased upgrade counts and fired milestones.
//!
//! The ledger only records facts. It does not know what the facts do; the
//! modifier engine reads it on every recompute. Every mutation raises the
//! `changed` flag, which the composition root turns into an engine recompute.

use crate::id::{MilestoneId, UpgradeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionLedger {
    purchased: BTreeMap<UpgradeId, u32>,
    milestones: BTreeSet<MilestoneId>,
    #[serde(skip)]
    changed: bool,
}

impl ProgressionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more purchase of an upgrade. Returns the new count.
    pub fn record_purchase(&mut self, id: UpgradeId) -> u32 {
        let count = self.purchased.entry(id).or_insert(0);
        *count += 1;
        self.changed = true;
        *count
    }

    /// Overwrite the purchase count of an upgrade (used when loading).
    /// A count of zero removes the entry.
    pub fn set_purchase_count(&mut self, id: UpgradeId, count: u32) {
        if count == 0 {
            self.purchased.remove(&id);
        } else {
            self.purchased.insert(id, count);
        }
        self.changed = true;
    }

    pub fn purchase_count(&self, id: &UpgradeId) -> u32 {
        self.purchased.get(id).copied().unwrap_or(0)
    }

    /// Purchased counts in ascending upgrade id order.
    pub fn purchased(&self) -> &BTreeMap<UpgradeId, u32> {
        &self.purchased
    }

    /// Record a milestone. Returns `false` if it had already fired.
    pub fn fire_milestone(&mut self, id: MilestoneId) -> bool {
        let inserted = self.milestones.insert(id);
        if inserted {
            self.changed = true;
        }
        inserted
    }

    /// Un-fire a milestone. Only used to roll back a failed recompute.
    pub fn revoke_milestone(&mut self, id: &MilestoneId) -> bool {
        let removed = self.milestones.remove(id);
        if removed {
            self.changed = true;
        }
        removed
    }

    pub fn has_fired(&self, id: &MilestoneId) -> bool {
        self.milestones.contains(id)
    }

    /// Fired milestones in ascending id order.
    pub fn fired_milestones(&self) -> &BTreeSet<MilestoneId> {
        &self.milestones
    }

    /// Whether anything changed since the last [`take_changed`](Self::take_changed).
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Read and clear the changed flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}
