//! Currency balances consumed as a black box by the simulators.

use crate::catalog::CostItem;
use crate::id::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Balance storage. Implementations must make [`try_spend`](Wallet::try_spend)
/// all-or-nothing.
pub trait Wallet {
    fn balance(&self, resource: &ResourceId) -> f64;

    /// Spend every item, or nothing if any balance is short at this instant.
    fn try_spend(&mut self, cost: &[CostItem]) -> bool;

    /// Credit an amount without applying any multiplier.
    fn add_raw(&mut self, resource: &ResourceId, amount: f64);
}

/// In-memory wallet keyed by resource id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryWallet {
    balances: BTreeMap<ResourceId, f64>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given balances.
    pub fn with_balances<I, R>(balances: I) -> Self
    where
        I: IntoIterator<Item = (R, f64)>,
        R: Into<ResourceId>,
    {
        Self {
            balances: balances.into_iter().map(|(r, v)| (r.into(), v)).collect(),
        }
    }

    pub fn balances(&self) -> &BTreeMap<ResourceId, f64> {
        &self.balances
    }
}

impl Wallet for MemoryWallet {
    fn balance(&self, resource: &ResourceId) -> f64 {
        self.balances.get(resource).copied().unwrap_or(0.0)
    }

    fn try_spend(&mut self, cost: &[CostItem]) -> bool {
        // Sum per resource first so repeated entries are checked together.
        let mut totals: BTreeMap<&ResourceId, f64> = BTreeMap::new();
        for item in cost {
            *totals.entry(&item.resource).or_insert(0.0) += item.amount;
        }
        if totals
            .iter()
            .any(|(r, amount)| !amount.is_finite() || *amount < 0.0 || self.balance(r) < *amount)
        {
            return false;
        }
        for (r, amount) in totals {
            *self.balances.entry(r.clone()).or_insert(0.0) -= amount;
        }
        true
    }

    fn add_raw(&mut self, resource: &ResourceId, amount: f64) {
        *self.balances.entry(resource.clone()).or_insert(0.0) += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spend_is_all_or_nothing() {
        let mut wallet = MemoryWallet::with_balances([("gold", 100.0), ("gems", 1.0)]);
        let cost = [CostItem::new("gold", 50.0), CostItem::new("gems", 2.0)];
        assert!(!wallet.try_spend(&cost));
        assert_eq!(wallet.balance(&ResourceId::from("gold")), 100.0);

        wallet.add_raw(&ResourceId::from("gems"), 1.0);
        assert!(wallet.try_spend(&cost));
        assert_eq!(wallet.balance(&ResourceId::from("gold")), 50.0);
        assert_eq!(wallet.balance(&ResourceId::from("gems")), 0.0);
    }

    #[test]
    fn duplicate_cost_entries_are_summed() {
        let mut wallet = MemoryWallet::with_balances([("gold", 15.0)]);
        let cost = [CostItem::new("gold", 10.0), CostItem::new("gold", 10.0)];
        assert!(!wallet.try_spend(&cost));
        assert_eq!(wallet.balance(&ResourceId::from("gold")), 15.0);
    }

    #[test]
    fn empty_cost_always_succeeds() {
        let mut wallet = MemoryWallet::new();
        assert!(wallet.try_spend(&[]));
    }

    #[test]
    fn unknown_resource_has_zero_balance() {
        let wallet = MemoryWallet::new();
        assert_eq!(wallet.balance(&ResourceId::from("mana")), 0.0);
    }
}
