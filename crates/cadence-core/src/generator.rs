//! Per-generator production state machine.
//!
//! ```text
//!   Unowned --buy level--> Running --cycle done--> Idle --start_run--> Running
//!                             ^                     |
//!                             +----- automation ----+--> Automated (continuous)
//! ```
//!
//! Each [`ProductionSim`] exclusively owns one generator's runtime state. It
//! reads the engine's [`ResolvedModifiers`] snapshot on every tick and pays
//! completed cycles into a [`Wallet`].

use crate::catalog::{CostItem, NodeInstanceDef, NodeTypeDef};
use crate::engine::ResolvedModifiers;
use crate::id::{InstanceId, ResourceId};
use crate::signal::Observable;
use crate::wallet::Wallet;
use serde::{Deserialize, Serialize};

/// Lower bound for the cycle interval so catch-up loops always terminate.
pub const MIN_INTERVAL: f64 = 1e-6;

/// Most events one simulator queues between drains. Cycles past the cap
/// still pay out; their events are only counted in
/// [`ProductionSim::dropped_events`].
pub const MAX_QUEUED_EVENTS: usize = 4096;

// ---------------------------------------------------------------------------
// State types
// ---------------------------------------------------------------------------

/// Observable state of a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorMode {
    Unowned,
    /// Owned, not accruing progress.
    Idle,
    /// Owned, running a single manual cycle.
    Running,
    /// Owned, completing cycles continuously.
    Automated,
}

/// Persisted facts of a generator. Progress is derived and never saved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorFacts {
    pub level: u32,
    pub owned: bool,
    pub automation_purchased: bool,
}

/// Full runtime state. Mutated only by its own simulator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratorState {
    pub level: u32,
    pub owned: bool,
    pub automation_purchased: bool,
    /// Seconds into the current cycle.
    pub elapsed: f64,
    pub pending_payout: f64,
    pub has_pending_payout: bool,
    /// Manual cycle in progress.
    pub running: bool,
}

/// Something a generator did during a tick or command.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorEvent {
    /// One cycle completed. `amount` is that cycle's queued payout after
    /// every multiplier; a catch-up tick queues one event per cycle.
    CycleCompleted {
        instance: InstanceId,
        resource: ResourceId,
        amount: f64,
    },
    /// A pending payout moved into the wallet.
    Collected {
        instance: InstanceId,
        resource: ResourceId,
        amount: f64,
    },
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickReport {
    pub cycles: u64,
    /// Payout queued this tick.
    pub produced: f64,
    /// Payout deposited this tick by auto-collect.
    pub collected: f64,
}

/// Observable cells exposed to presentation layers.
#[derive(Debug)]
pub struct GeneratorCells {
    pub level: Observable<u32>,
    pub owned: Observable<bool>,
    pub running: Observable<bool>,
    pub automated: Observable<bool>,
    /// Fraction of the current cycle completed, in `[0, 1]`.
    pub progress: Observable<f64>,
    /// Current cycle interval in seconds.
    pub cycle_duration: Observable<f64>,
}

// ---------------------------------------------------------------------------
// ProductionSim
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ProductionSim {
    instance: InstanceId,
    node_type: NodeTypeDef,
    state: GeneratorState,
    interval: f64,
    /// Automation granted by a modifier (as opposed to purchased).
    automation_modifier: bool,
    auto_collect: bool,
    cells: GeneratorCells,
    events: Vec<GeneratorEvent>,
    dropped_events: u64,
}

impl ProductionSim {
    /// Create a simulator in the instance's initial state. An enabled
    /// instance starts owned at level `max(1, level)` with a cycle running.
    pub fn new(instance: &NodeInstanceDef, node_type: &NodeTypeDef, auto_collect: bool) -> Self {
        let interval = node_type.base_cycle_seconds.max(MIN_INTERVAL);
        let mut sim = Self {
            instance: instance.id.clone(),
            node_type: node_type.clone(),
            state: GeneratorState::default(),
            interval,
            automation_modifier: false,
            auto_collect,
            cells: GeneratorCells {
                level: Observable::new(0),
                owned: Observable::new(false),
                running: Observable::new(false),
                automated: Observable::new(false),
                progress: Observable::new(0.0),
                cycle_duration: Observable::new(interval),
            },
            events: Vec::new(),
            dropped_events: 0,
        };
        if instance.initial.enabled {
            sim.restore(GeneratorFacts {
                level: instance.initial.level.max(1),
                owned: true,
                automation_purchased: false,
            });
        }
        sim
    }

    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    pub fn node_type(&self) -> &NodeTypeDef {
        &self.node_type
    }

    pub fn output_resource(&self) -> &ResourceId {
        &self.node_type.output_resource
    }

    pub fn state(&self) -> &GeneratorState {
        &self.state
    }

    pub fn level(&self) -> u32 {
        self.state.level
    }

    pub fn is_owned(&self) -> bool {
        self.state.owned
    }

    pub fn is_automated(&self) -> bool {
        self.state.owned && (self.state.automation_purchased || self.automation_modifier)
    }

    pub fn mode(&self) -> GeneratorMode {
        if !self.state.owned {
            GeneratorMode::Unowned
        } else if self.is_automated() {
            GeneratorMode::Automated
        } else if self.state.running {
            GeneratorMode::Running
        } else {
            GeneratorMode::Idle
        }
    }

    /// Current cycle interval in seconds.
    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn elapsed(&self) -> f64 {
        self.state.elapsed
    }

    pub fn progress(&self) -> f64 {
        (self.state.elapsed / self.interval).clamp(0.0, 1.0)
    }

    pub fn pending_payout(&self) -> Option<f64> {
        self.state
            .has_pending_payout
            .then_some(self.state.pending_payout)
    }

    pub fn cells(&self) -> &GeneratorCells {
        &self.cells
    }

    /// Mutable access for subscribing to cells.
    pub fn cells_mut(&mut self) -> &mut GeneratorCells {
        &mut self.cells
    }

    // -- Modifiers --

    /// Re-read this generator's speed and automation flag from a snapshot.
    ///
    /// A speed change preserves the elapsed fraction of the current cycle.
    pub fn refresh_modifiers(&mut self, modifiers: &ResolvedModifiers) {
        let speed = sanitize_speed(modifiers.node_speed_multiplier(&self.instance));
        let interval = (self.node_type.base_cycle_seconds / speed).max(MIN_INTERVAL);
        if interval != self.interval {
            let fraction = self.state.elapsed / self.interval;
            self.interval = interval;
            self.state.elapsed = fraction * interval;
        }

        let automation = modifiers.is_node_automation_enabled(&self.instance);
        if automation != self.automation_modifier {
            let was_automated = self.is_automated();
            self.automation_modifier = automation;
            if was_automated && !self.is_automated() {
                // Let the cycle in progress finish as a manual one.
                self.state.running = self.state.owned && !self.state.has_pending_payout;
            }
            log::debug!(
                "generator '{}': automation modifier {}",
                self.instance,
                if automation { "on" } else { "off" }
            );
        }
        self.publish();
    }

    /// Output of one completed cycle after every multiplier.
    pub fn payout_per_cycle(&self, modifiers: &ResolvedModifiers) -> f64 {
        let resource = &self.node_type.output_resource;
        self.node_type.base_output_per_cycle
            * self.state.level as f64
            * modifiers.node_output_multiplier(&self.instance, Some(resource))
            * modifiers.resource_gain_multiplier(resource)
    }

    // -- Tick --

    /// Advance by `dt` seconds.
    pub fn tick(
        &mut self,
        dt: f64,
        modifiers: &ResolvedModifiers,
        wallet: &mut dyn Wallet,
    ) -> TickReport {
        self.refresh_modifiers(modifiers);
        let mut report = TickReport::default();

        if !self.state.owned {
            self.state.elapsed = 0.0;
            self.state.running = false;
            self.publish();
            return report;
        }
        if !(dt.is_finite() && dt > 0.0) {
            return report;
        }

        if self.is_automated() {
            self.state.elapsed += dt;
            let cycles = self.drain_cycles();
            if cycles > 0 {
                report.cycles = cycles;
                report.produced = self.queue_payout(cycles, modifiers);
                if self.auto_collect {
                    report.collected = self.collect(wallet);
                }
            }
        } else if self.state.running {
            self.state.elapsed += dt;
            if self.state.elapsed >= self.interval {
                self.state.elapsed = 0.0;
                self.state.running = false;
                report.cycles = 1;
                report.produced = self.queue_payout(1, modifiers);
            }
        }

        self.publish();
        report
    }

    /// Remove every whole interval from `elapsed`. Equivalent to the
    /// `while elapsed >= interval` loop but bounded for huge `dt`.
    fn drain_cycles(&mut self) -> u64 {
        if self.state.elapsed < self.interval {
            return 0;
        }
        let mut cycles = (self.state.elapsed / self.interval).floor();
        let mut rest = self.state.elapsed - cycles * self.interval;
        // Correct rounding at exact multiples.
        if rest < 0.0 {
            cycles -= 1.0;
            rest += self.interval;
        } else if rest >= self.interval {
            cycles += 1.0;
            rest -= self.interval;
        }
        self.state.elapsed = rest.max(0.0);
        cycles as u64
    }

    /// Queue the payout of `cycles` completed cycles and one
    /// `CycleCompleted` per cycle. Returns the total queued.
    fn queue_payout(&mut self, cycles: u64, modifiers: &ResolvedModifiers) -> f64 {
        let per_cycle = self.payout_per_cycle(modifiers);
        let total = per_cycle * cycles as f64;
        self.state.pending_payout += total;
        self.state.has_pending_payout = true;

        let room = MAX_QUEUED_EVENTS.saturating_sub(self.events.len()) as u64;
        let queued = cycles.min(room);
        for _ in 0..queued {
            self.events.push(GeneratorEvent::CycleCompleted {
                instance: self.instance.clone(),
                resource: self.node_type.output_resource.clone(),
                amount: per_cycle,
            });
        }
        let dropped = cycles - queued;
        if dropped > 0 {
            if self.dropped_events == 0 {
                log::warn!(
                    "generator '{}': event queue full, dropping cycle events",
                    self.instance
                );
            }
            self.dropped_events += dropped;
        }
        total
    }

    // -- Commands --

    /// Cost of the next level: `base` for the first level, then
    /// `base * growth^(level - 1)`.
    ///
    /// Growth starts at the third level, so buying from level 0 and from
    /// level 1 both cost `base`. With `base = 10` and `growth = 1.15`:
    ///
    /// | level | next cost |
    /// |-------|-----------|
    /// | 0     | 10.0      |
    /// | 1     | 10.0      |
    /// | 2     | 11.5      |
    /// | 3     | 13.225    |
    pub fn next_level_cost(&self) -> f64 {
        let base = self.node_type.base_level_cost;
        match self.state.level {
            0 => base,
            level => base * self.node_type.level_cost_growth.powf(f64::from(level - 1)),
        }
    }

    pub fn automation_cost(&self) -> f64 {
        self.node_type.automation_cost
    }

    /// Buy one level. The first level also takes ownership and starts a cycle.
    pub fn try_buy_level(&mut self, wallet: &mut dyn Wallet) -> bool {
        let cost = CostItem {
            resource: self.node_type.cost_resource.clone(),
            amount: self.next_level_cost(),
        };
        if !wallet.try_spend(std::slice::from_ref(&cost)) {
            return false;
        }
        self.state.level += 1;
        if !self.state.owned {
            self.state.owned = true;
            self.state.running = true;
            self.state.elapsed = 0.0;
        }
        log::debug!(
            "generator '{}' bought level {} for {} {}",
            self.instance,
            self.state.level,
            cost.amount,
            cost.resource
        );
        self.publish();
        true
    }

    /// Buy automation. Requires ownership; a second purchase is rejected.
    pub fn try_buy_automation(&mut self, wallet: &mut dyn Wallet) -> bool {
        if !self.state.owned || self.state.automation_purchased {
            return false;
        }
        let cost = CostItem {
            resource: self.node_type.cost_resource.clone(),
            amount: self.node_type.automation_cost,
        };
        if !wallet.try_spend(std::slice::from_ref(&cost)) {
            return false;
        }
        self.state.automation_purchased = true;
        log::debug!("generator '{}' automated", self.instance);
        self.publish();
        true
    }

    /// Start a manual cycle. No-op when unowned, automated, already running,
    /// or holding an uncollected payout.
    pub fn start_run(&mut self) -> bool {
        if !self.state.owned
            || self.is_automated()
            || self.state.running
            || self.state.has_pending_payout
        {
            return false;
        }
        self.state.running = true;
        self.publish();
        true
    }

    /// Move the pending payout into the wallet. Returns the amount; zero and
    /// no event when nothing is pending.
    pub fn collect(&mut self, wallet: &mut dyn Wallet) -> f64 {
        if !self.state.has_pending_payout {
            return 0.0;
        }
        let amount = self.state.pending_payout;
        wallet.add_raw(&self.node_type.output_resource, amount);
        self.state.pending_payout = 0.0;
        self.state.has_pending_payout = false;
        self.events.push(GeneratorEvent::Collected {
            instance: self.instance.clone(),
            resource: self.node_type.output_resource.clone(),
            amount,
        });
        amount
    }

    /// Drop ownership and zero the cycle state.
    pub fn force_unowned(&mut self) {
        log::warn!("generator '{}' lost ownership", self.instance);
        self.state.owned = false;
        self.state.running = false;
        self.state.elapsed = 0.0;
        self.state.pending_payout = 0.0;
        self.state.has_pending_payout = false;
        self.publish();
    }

    // -- Persistence --

    pub fn facts(&self) -> GeneratorFacts {
        GeneratorFacts {
            level: self.state.level,
            owned: self.state.owned,
            automation_purchased: self.state.automation_purchased,
        }
    }

    /// Replace the facts and reset derived progress. An owned generator
    /// restarts its cycle from zero.
    pub fn restore(&mut self, facts: GeneratorFacts) {
        self.state = GeneratorState {
            level: facts.level,
            owned: facts.owned,
            automation_purchased: facts.owned && facts.automation_purchased,
            elapsed: 0.0,
            pending_payout: 0.0,
            has_pending_payout: false,
            running: facts.owned,
        };
        self.publish();
    }

    // -- Events --

    /// Take all queued events, oldest first.
    pub fn drain_events(&mut self) -> Vec<GeneratorEvent> {
        std::mem::take(&mut self.events)
    }

    /// Cycle events discarded because the queue was at
    /// [`MAX_QUEUED_EVENTS`].
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    fn publish(&mut self) {
        let automated = self.is_automated();
        let running = self.state.owned && (automated || self.state.running);
        let progress = self.progress();
        self.cells.level.set(self.state.level);
        self.cells.owned.set(self.state.owned);
        self.cells.running.set(running);
        self.cells.automated.set(automated);
        self.cells.progress.set(progress);
        self.cells.cycle_duration.set(self.interval);
    }
}

/// NaN, infinite, zero, or negative speeds fall back to 1.0.
fn sanitize_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InitialNodeState;
    use crate::test_utils::*;
    use crate::wallet::MemoryWallet;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn mine_def() -> (NodeInstanceDef, NodeTypeDef) {
        (instance("mine_a", "gold_mine"), node_type("gold_mine", "gold", 2.0, 10.0, &["ore"]))
    }

    fn owned_sim(level: u32) -> ProductionSim {
        let (mut inst, ty) = mine_def();
        inst.initial = InitialNodeState {
            enabled: true,
            level,
        };
        ProductionSim::new(&inst, &ty, true)
    }

    fn speed(instance: &str, v: f64) -> ResolvedModifiers {
        let mut m = ResolvedModifiers::default();
        m.node_speed.insert(InstanceId::from(instance), v);
        m
    }

    fn automation_on(instance: &str) -> ResolvedModifiers {
        let mut m = ResolvedModifiers::default();
        m.automation.insert(InstanceId::from(instance), true);
        m
    }

    #[test]
    fn starts_unowned_and_first_level_starts_cycle() {
        let (inst, ty) = mine_def();
        let mut sim = ProductionSim::new(&inst, &ty, true);
        assert_eq!(sim.mode(), GeneratorMode::Unowned);

        let mut wallet = MemoryWallet::with_balances([("gold", 10.0)]);
        assert!(sim.try_buy_level(&mut wallet));
        assert_eq!(sim.mode(), GeneratorMode::Running);
        assert_eq!(sim.level(), 1);
        assert_eq!(wallet.balance(&gold()), 0.0);
    }

    #[test]
    fn unowned_tick_zeroes_progress() {
        let (inst, ty) = mine_def();
        let mut sim = ProductionSim::new(&inst, &ty, true);
        let mut wallet = MemoryWallet::new();
        let report = sim.tick(5.0, &ResolvedModifiers::default(), &mut wallet);
        assert_eq!(report, TickReport::default());
        assert_eq!(sim.elapsed(), 0.0);
    }

    #[test]
    fn level_cost_growth() {
        let mut sim = owned_sim(1);
        // node_type fixture: base 10, growth 1.15
        assert_eq!(sim.next_level_cost(), 10.0);
        let mut wallet = MemoryWallet::with_balances([("gold", 1000.0)]);
        assert!(sim.try_buy_level(&mut wallet));
        assert!((sim.next_level_cost() - 11.5).abs() < 1e-12);
        assert!(sim.try_buy_level(&mut wallet));
        assert!((sim.next_level_cost() - 10.0 * 1.15f64.powi(2)).abs() < 1e-12);
    }

    #[test]
    fn first_two_levels_both_cost_base() {
        let (inst, ty) = mine_def();
        let mut sim = ProductionSim::new(&inst, &ty, true);
        assert!(!sim.is_owned());
        assert_eq!(sim.next_level_cost(), 10.0);

        let mut wallet = MemoryWallet::with_balances([("gold", 20.0)]);
        assert!(sim.try_buy_level(&mut wallet));
        assert_eq!(sim.next_level_cost(), 10.0);
        assert!(sim.try_buy_level(&mut wallet));
        assert_eq!(wallet.balance(&gold()), 0.0);
        assert!((sim.next_level_cost() - 11.5).abs() < 1e-12);
    }

    #[test]
    fn failed_spend_leaves_state_unchanged() {
        let mut sim = owned_sim(1);
        let mut wallet = MemoryWallet::with_balances([("gold", 5.0)]);
        assert!(!sim.try_buy_level(&mut wallet));
        assert!(!sim.try_buy_automation(&mut wallet));
        assert_eq!(sim.level(), 1);
        assert_eq!(wallet.balance(&gold()), 5.0);
    }

    #[test]
    fn automated_catch_up_runs_every_whole_cycle() {
        let mut sim = owned_sim(1);
        let mut wallet = MemoryWallet::with_balances([("gold", 100.0)]);
        assert!(sim.try_buy_automation(&mut wallet));
        assert_eq!(sim.mode(), GeneratorMode::Automated);

        let interval = sim.interval();
        let report = sim.tick(3.5 * interval, &ResolvedModifiers::default(), &mut wallet);

        assert_eq!(report.cycles, 3);
        assert!((sim.elapsed() - 0.5 * interval).abs() < 1e-9);
        assert_eq!(report.produced, 30.0);
        assert_eq!(report.collected, 30.0);
        assert_eq!(wallet.balance(&gold()), 30.0);
        assert_eq!(sim.pending_payout(), None);
    }

    #[test]
    fn catch_up_emits_one_event_per_cycle() {
        let mut sim = owned_sim(1);
        let mut wallet = MemoryWallet::with_balances([("gold", 100.0)]);
        assert!(sim.try_buy_automation(&mut wallet));
        sim.drain_events();

        let report = sim.tick(7.0, &ResolvedModifiers::default(), &mut wallet);
        assert_eq!(report.cycles, 3);

        let events = sim.drain_events();
        let completed: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                GeneratorEvent::CycleCompleted { amount, .. } => Some(*amount),
                GeneratorEvent::Collected { .. } => None,
            })
            .collect();
        assert_eq!(completed.len() as u64, report.cycles);
        assert!(completed.iter().all(|&amount| amount == 10.0));
        assert!(matches!(
            events.last(),
            Some(GeneratorEvent::Collected { amount, .. }) if *amount == 30.0
        ));
        assert_eq!(sim.dropped_events(), 0);
    }

    #[test]
    fn cycle_events_past_the_queue_cap_are_counted() {
        let mut sim = owned_sim(1);
        let mut wallet = MemoryWallet::new();
        let modifiers = automation_on("mine_a");
        let cycles = MAX_QUEUED_EVENTS as u64 + 10;

        let report = sim.tick(2.0 * cycles as f64 + 1.0, &modifiers, &mut wallet);
        assert_eq!(report.cycles, cycles);
        assert_eq!(report.produced, 10.0 * cycles as f64);

        let completed = sim
            .drain_events()
            .iter()
            .filter(|e| matches!(e, GeneratorEvent::CycleCompleted { .. }))
            .count();
        assert_eq!(completed, MAX_QUEUED_EVENTS);
        assert_eq!(sim.dropped_events(), 10);
    }

    #[test]
    fn automated_without_auto_collect_accumulates_pending() {
        let (mut inst, ty) = mine_def();
        inst.initial = InitialNodeState {
            enabled: true,
            level: 2,
        };
        let mut sim = ProductionSim::new(&inst, &ty, false);
        let mut wallet = MemoryWallet::new();
        let modifiers = automation_on("mine_a");
        sim.tick(4.0, &modifiers, &mut wallet);
        sim.tick(2.0, &modifiers, &mut wallet);

        assert_eq!(sim.pending_payout(), Some(60.0));
        assert_eq!(sim.collect(&mut wallet), 60.0);
        assert_eq!(wallet.balance(&gold()), 60.0);
    }

    #[test]
    fn manual_completes_one_cycle_and_stops() {
        let mut sim = owned_sim(1);
        let mut wallet = MemoryWallet::new();
        let report = sim.tick(10.0, &ResolvedModifiers::default(), &mut wallet);

        assert_eq!(report.cycles, 1);
        assert_eq!(sim.mode(), GeneratorMode::Idle);
        assert_eq!(sim.pending_payout(), Some(10.0));
        assert_eq!(wallet.balance(&gold()), 0.0);

        // No progress while idle.
        let report = sim.tick(10.0, &ResolvedModifiers::default(), &mut wallet);
        assert_eq!(report.cycles, 0);
        assert_eq!(sim.pending_payout(), Some(10.0));

        // Start is refused until collected.
        assert!(!sim.start_run());
        assert_eq!(sim.collect(&mut wallet), 10.0);
        assert!(sim.start_run());
        assert_eq!(sim.mode(), GeneratorMode::Running);
    }

    #[test]
    fn speed_change_preserves_elapsed_fraction() {
        let mut sim = owned_sim(1);
        let mut wallet = MemoryWallet::new();
        sim.tick(0.8, &ResolvedModifiers::default(), &mut wallet);
        assert!((sim.progress() - 0.4).abs() < 1e-12);

        sim.refresh_modifiers(&speed("mine_a", 2.0));
        assert!((sim.interval() - 1.0).abs() < 1e-12);
        assert!((sim.progress() - 0.4).abs() < 1e-12);
        assert!((sim.elapsed() - 0.4).abs() < 1e-12);
        assert_eq!(sim.mode(), GeneratorMode::Running);
    }

    #[test]
    fn invalid_speed_falls_back_to_base_interval() {
        let mut sim = owned_sim(1);
        for bad in [f64::NAN, f64::INFINITY, 0.0, -3.0] {
            sim.refresh_modifiers(&speed("mine_a", bad));
            assert_eq!(sim.interval(), 2.0);
        }
    }

    #[test]
    fn collect_without_pending_is_noop() {
        let mut sim = owned_sim(1);
        let mut wallet = MemoryWallet::with_balances([("gold", 7.0)]);
        assert_eq!(sim.collect(&mut wallet), 0.0);
        assert_eq!(wallet.balance(&gold()), 7.0);
        assert!(sim.drain_events().is_empty());
    }

    #[test]
    fn payout_applies_multipliers_when_queued() {
        let mut sim = owned_sim(3);
        let mut wallet = MemoryWallet::new();
        let mut modifiers = ResolvedModifiers::default();
        modifiers.node_output.insert(InstanceId::from("mine_a"), 2.0);
        modifiers.resource_gain.insert(gold(), 1.5);
        sim.tick(2.0, &modifiers, &mut wallet);
        assert_eq!(sim.pending_payout(), Some(90.0));

        // Gain changes after queueing do not touch the pending payout.
        modifiers.resource_gain.insert(gold(), 10.0);
        sim.tick(0.1, &modifiers, &mut wallet);
        assert_eq!(sim.collect(&mut wallet), 90.0);
    }

    #[test]
    fn resource_scoped_output_takes_precedence() {
        let sim = owned_sim(1);
        let mut modifiers = ResolvedModifiers::default();
        modifiers.node_output.insert(InstanceId::from("mine_a"), 2.0);
        modifiers
            .node_output_by_resource
            .insert((InstanceId::from("mine_a"), gold()), 5.0);
        assert_eq!(sim.payout_per_cycle(&modifiers), 50.0);
    }

    #[test]
    fn automation_modifier_enables_and_disables() {
        let mut sim = owned_sim(1);
        let mut wallet = MemoryWallet::new();
        sim.refresh_modifiers(&automation_on("mine_a"));
        assert_eq!(sim.mode(), GeneratorMode::Automated);
        assert!(!sim.start_run());

        sim.tick(1.0, &automation_on("mine_a"), &mut wallet);
        sim.refresh_modifiers(&ResolvedModifiers::default());
        assert_eq!(sim.mode(), GeneratorMode::Running);
        assert!((sim.elapsed() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn events_queue_cycles_and_collections() {
        let mut sim = owned_sim(1);
        let mut wallet = MemoryWallet::new();
        sim.tick(2.0, &ResolvedModifiers::default(), &mut wallet);
        sim.collect(&mut wallet);

        let events = sim.drain_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            GeneratorEvent::CycleCompleted { amount, .. } if amount == 10.0
        ));
        assert!(matches!(events[1], GeneratorEvent::Collected { amount, .. } if amount == 10.0));
        assert!(sim.drain_events().is_empty());
    }

    #[test]
    fn cells_notify_on_change() {
        let (inst, ty) = mine_def();
        let mut sim = ProductionSim::new(&inst, &ty, true);
        let levels = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&levels);
        sim.cells_mut()
            .level
            .subscribe(move |v| l.borrow_mut().push(*v));

        let mut wallet = MemoryWallet::with_balances([("gold", 100.0)]);
        sim.try_buy_level(&mut wallet);
        sim.try_buy_level(&mut wallet);
        sim.tick(0.5, &ResolvedModifiers::default(), &mut wallet);

        assert_eq!(*levels.borrow(), vec![1, 2]);
        assert!(sim.cells().owned.get());
        assert_eq!(sim.cells().progress.get(), 0.25);
    }

    #[test]
    fn facts_restore_resets_progress() {
        let mut sim = owned_sim(4);
        let mut wallet = MemoryWallet::new();
        sim.tick(1.0, &ResolvedModifiers::default(), &mut wallet);
        let facts = sim.facts();

        let (inst, ty) = mine_def();
        let mut restored = ProductionSim::new(&inst, &ty, true);
        restored.restore(facts);
        assert_eq!(restored.facts(), facts);
        assert_eq!(restored.elapsed(), 0.0);
        assert_eq!(restored.mode(), GeneratorMode::Running);
    }

    #[test]
    fn force_unowned_zeroes_cycle_state() {
        let mut sim = owned_sim(1);
        let mut wallet = MemoryWallet::new();
        sim.tick(2.0, &ResolvedModifiers::default(), &mut wallet);
        sim.force_unowned();
        assert_eq!(sim.mode(), GeneratorMode::Unowned);
        assert_eq!(sim.pending_payout(), None);
        assert!(!sim.try_buy_automation(&mut wallet));
    }
}
