//! Composition root: catalog -> ledger -> engine -> simulators.
//!
//! [`Game`] owns every piece of mutable state and runs the step pipeline:
//!
//! 1. **Flush** -- if the ledger or a buff source changed, recompute the
//!    modifier maps, publish `Changed`, and refresh every simulator.
//! 2. **Tick** -- advance every simulator in ascending instance order against
//!    the freshly published snapshot.
//! 3. **Buffs** -- count active buffs down; expiries flush again so the next
//!    step no longer sees them.

use crate::buff::{Activation, BuffError, BuffTracker};
use crate::catalog::Catalog;
use crate::clock::{ClockMode, SimClock};
use crate::diagnostics::Diagnostics;
use crate::engine::{EngineError, ModifierEngine, ModifiersChanged, ResolvedModifiers};
use crate::generator::{GeneratorEvent, ProductionSim};
use crate::id::*;
use crate::ledger::ProgressionLedger;
use crate::signal::SubscriptionId;
use crate::snapshot::SnapshotError;
use crate::wallet::{MemoryWallet, Wallet};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::BTreeMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Runtime tuning. Every field has a default, so partial config files work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Fixed step size in seconds.
    pub tick_seconds: f64,
    pub clock: ClockMode,
    /// Automated generators deposit each completed cycle immediately.
    pub auto_collect: bool,
    /// Cap for offline catch-up.
    pub max_offline_seconds: f64,
    /// Cap on fixed steps per `advance`.
    pub max_catch_up_steps: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 0.1,
            clock: ClockMode::Fixed,
            auto_collect: true,
            max_offline_seconds: 8.0 * 60.0 * 60.0,
            max_catch_up_steps: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Buff(#[from] BuffError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("unknown upgrade '{0}'")]
    UnknownUpgrade(UpgradeId),

    #[error("unknown milestone '{0}'")]
    UnknownMilestone(MilestoneId),

    #[error("unknown node instance '{0}'")]
    UnknownInstance(InstanceId),
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What a `step` or `advance` call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub steps: u64,
    /// Fixed steps dropped by the catch-up cap.
    pub dropped_steps: u64,
    pub cycles: u64,
    /// Payout queued per resource.
    pub produced: BTreeMap<ResourceId, f64>,
    /// Buff source keys that expired.
    pub expired_buffs: Vec<String>,
}

impl StepReport {
    fn merge(&mut self, other: StepReport) {
        self.steps += other.steps;
        self.dropped_steps += other.dropped_steps;
        self.cycles += other.cycles;
        for (resource, amount) in other.produced {
            *self.produced.entry(resource).or_insert(0.0) += amount;
        }
        self.expired_buffs.extend(other.expired_buffs);
    }
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

pub struct Game<W: Wallet = MemoryWallet> {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) config: GameConfig,
    pub(crate) ledger: ProgressionLedger,
    pub(crate) engine: ModifierEngine,
    pub(crate) buffs: BuffTracker,
    pub(crate) sims: SlotMap<GeneratorKey, ProductionSim>,
    pub(crate) index: BTreeMap<InstanceId, GeneratorKey>,
    pub(crate) clock: SimClock,
    pub(crate) wallet: W,
    events: Vec<GeneratorEvent>,
}

impl<W: Wallet> std::fmt::Debug for Game<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("config", &self.config)
            .field("ledger", &self.ledger)
            .field("engine", &self.engine)
            .field("generators", &self.index.len())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<W: Wallet> Game<W> {
    /// Build every collaborator in dependency order and run the first
    /// recompute.
    pub fn new(catalog: Arc<Catalog>, config: GameConfig, wallet: W) -> Result<Self, GameError> {
        let mut sims = SlotMap::with_key();
        let mut index = BTreeMap::new();
        for inst in catalog.instances() {
            // Instance types are validated by the catalog builder.
            let Some(node_type) = catalog.node_type(&inst.node_type) else {
                continue;
            };
            let key = sims.insert(ProductionSim::new(inst, node_type, config.auto_collect));
            index.insert(inst.id.clone(), key);
        }

        let mut game = Self {
            engine: ModifierEngine::new(Arc::clone(&catalog)),
            clock: SimClock::new(config.clock, config.tick_seconds),
            catalog,
            config,
            ledger: ProgressionLedger::new(),
            buffs: BuffTracker::new(),
            sims,
            index,
            wallet,
            events: Vec::new(),
        };
        for issue in game.catalog.content_issues() {
            log::warn!(
                "{:?} '{}' references unknown modifiers {:?}; it is inert",
                issue.kind,
                issue.id,
                issue.missing
            );
        }
        game.flush()?;
        log::info!("game started with {} generators", game.index.len());
        Ok(game)
    }

    // -- Accessors --

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ProgressionLedger {
        &self.ledger
    }

    pub fn engine(&self) -> &ModifierEngine {
        &self.engine
    }

    pub fn modifiers(&self) -> &ResolvedModifiers {
        self.engine.resolved()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        self.engine.diagnostics()
    }

    pub fn buffs(&self) -> &BuffTracker {
        &self.buffs
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    pub fn wallet_mut(&mut self) -> &mut W {
        &mut self.wallet
    }

    pub fn generator_key(&self, instance: &InstanceId) -> Option<GeneratorKey> {
        self.index.get(instance).copied()
    }

    pub fn generator(&self, instance: &InstanceId) -> Option<&ProductionSim> {
        self.index.get(instance).and_then(|k| self.sims.get(*k))
    }

    /// Mutable access, for subscribing to a generator's cells.
    pub fn generator_mut(&mut self, instance: &InstanceId) -> Option<&mut ProductionSim> {
        self.index.get(instance).and_then(|k| self.sims.get_mut(*k))
    }

    /// Generators in ascending instance order.
    pub fn generators(&self) -> impl Iterator<Item = &ProductionSim> {
        self.index.values().filter_map(|k| self.sims.get(*k))
    }

    fn sim_mut(&mut self, instance: &InstanceId) -> Result<&mut ProductionSim, GameError> {
        self.index
            .get(instance)
            .and_then(|k| self.sims.get_mut(*k))
            .ok_or_else(|| GameError::UnknownInstance(instance.clone()))
    }

    // -- Generator commands --

    pub fn buy_level(&mut self, instance: &InstanceId) -> Result<bool, GameError> {
        let (sims, index, wallet) = (&mut self.sims, &self.index, &mut self.wallet);
        let sim = index
            .get(instance)
            .and_then(|k| sims.get_mut(*k))
            .ok_or_else(|| GameError::UnknownInstance(instance.clone()))?;
        let bought = sim.try_buy_level(wallet);
        self.events.extend(sim.drain_events());
        Ok(bought)
    }

    pub fn buy_automation(&mut self, instance: &InstanceId) -> Result<bool, GameError> {
        let (sims, index, wallet) = (&mut self.sims, &self.index, &mut self.wallet);
        let sim = index
            .get(instance)
            .and_then(|k| sims.get_mut(*k))
            .ok_or_else(|| GameError::UnknownInstance(instance.clone()))?;
        Ok(sim.try_buy_automation(wallet))
    }

    pub fn start_run(&mut self, instance: &InstanceId) -> Result<bool, GameError> {
        Ok(self.sim_mut(instance)?.start_run())
    }

    /// Collect a generator's pending payout. Returns the amount deposited.
    pub fn collect(&mut self, instance: &InstanceId) -> Result<f64, GameError> {
        let (sims, index, wallet) = (&mut self.sims, &self.index, &mut self.wallet);
        let sim = index
            .get(instance)
            .and_then(|k| sims.get_mut(*k))
            .ok_or_else(|| GameError::UnknownInstance(instance.clone()))?;
        let amount = sim.collect(wallet);
        self.events.extend(sim.drain_events());
        Ok(amount)
    }

    /// Collect every generator. Returns the total per resource.
    pub fn collect_all(&mut self) -> BTreeMap<ResourceId, f64> {
        let mut totals = BTreeMap::new();
        for key in self.index.values() {
            if let Some(sim) = self.sims.get_mut(*key) {
                let amount = sim.collect(&mut self.wallet);
                if amount > 0.0 {
                    *totals.entry(sim.output_resource().clone()).or_insert(0.0) += amount;
                }
                self.events.extend(sim.drain_events());
            }
        }
        totals
    }

    // -- Progression --

    /// Buy the next rank of an upgrade. Returns `false` for inert or capped
    /// upgrades and when the wallet cannot pay.
    pub fn try_purchase_upgrade(&mut self, id: &UpgradeId) -> Result<bool, GameError> {
        let catalog = Arc::clone(&self.catalog);
        let upgrade = catalog
            .upgrade(id)
            .ok_or_else(|| GameError::UnknownUpgrade(id.clone()))?;
        if !catalog.is_upgrade_valid(id) {
            log::warn!("upgrade '{id}' is inert and cannot be purchased");
            return Ok(false);
        }
        let rank = self.ledger.purchase_count(id);
        if upgrade.rank_cap().is_some_and(|cap| rank >= cap) {
            return Ok(false);
        }
        let cost = upgrade.cost_at_rank(rank);
        if !self.wallet.try_spend(&cost) {
            return Ok(false);
        }
        let count = self.ledger.record_purchase(id.clone());
        if let Err(err) = self.flush() {
            self.ledger.set_purchase_count(id.clone(), rank);
            for item in &cost {
                self.wallet.add_raw(&item.resource, item.amount);
            }
            return Err(self.rolled_back(err));
        }
        log::info!("purchased upgrade '{id}' (rank {count})");
        Ok(true)
    }

    /// Fire a milestone. Returns `false` if it had already fired.
    pub fn fire_milestone(&mut self, id: &MilestoneId) -> Result<bool, GameError> {
        if self.catalog.milestone(id).is_none() {
            return Err(GameError::UnknownMilestone(id.clone()));
        }
        if !self.ledger.fire_milestone(id.clone()) {
            return Ok(false);
        }
        if let Err(err) = self.flush() {
            self.ledger.revoke_milestone(id);
            return Err(self.rolled_back(err));
        }
        log::info!("milestone '{id}' fired");
        Ok(true)
    }

    /// Activate a buff under its stacking policy.
    pub fn activate_buff(&mut self, id: &BuffId) -> Result<Activation, GameError> {
        let activation = self.buffs.activate(&mut self.engine, id)?;
        if let Err(err) = self.flush() {
            if let Activation::Started { source_key } = &activation {
                self.buffs.cancel(source_key, &mut self.engine);
            }
            return Err(self.rolled_back(err));
        }
        Ok(activation)
    }

    /// Recompute after a command undid its own change, so the engine does
    /// not stay dirty on a configuration error. Returns the original error.
    fn rolled_back(&mut self, err: GameError) -> GameError {
        log::warn!("rolled back after failed recompute: {err}");
        if let Err(again) = self.flush() {
            log::warn!("recompute after rollback failed: {again}");
        }
        err
    }

    // -- Pipeline --

    /// Recompute if anything changed and push the new snapshot to every
    /// simulator. Returns whether a recompute happened.
    pub fn flush(&mut self) -> Result<bool, GameError> {
        if self.ledger.take_changed() {
            self.engine.mark_dirty();
        }
        if !self.engine.flush(&self.ledger)? {
            return Ok(false);
        }
        let modifiers = self.engine.snapshot();
        for key in self.index.values() {
            if let Some(sim) = self.sims.get_mut(*key) {
                sim.refresh_modifiers(&modifiers);
            }
        }
        Ok(true)
    }

    /// Feed real elapsed time through the clock and run the planned steps.
    pub fn advance(&mut self, dt: f64) -> Result<StepReport, GameError> {
        let plan = self.clock.advance(dt, self.config.max_catch_up_steps);
        let mut report = StepReport {
            dropped_steps: plan.dropped,
            ..StepReport::default()
        };
        for _ in 0..plan.steps {
            report.merge(self.run_step(plan.step_seconds)?);
        }
        Ok(report)
    }

    /// Run exactly one step of `dt` seconds, bypassing the clock strategy.
    pub fn step(&mut self, dt: f64) -> Result<StepReport, GameError> {
        self.clock.record_step(dt);
        self.run_step(dt)
    }

    pub(crate) fn run_step(&mut self, dt: f64) -> Result<StepReport, GameError> {
        self.flush()?;

        let mut report = StepReport {
            steps: 1,
            ..StepReport::default()
        };
        let modifiers = self.engine.snapshot();
        for key in self.index.values() {
            let Some(sim) = self.sims.get_mut(*key) else {
                continue;
            };
            let tick = sim.tick(dt, &modifiers, &mut self.wallet);
            if tick.cycles > 0 {
                report.cycles += tick.cycles;
                *report
                    .produced
                    .entry(sim.output_resource().clone())
                    .or_insert(0.0) += tick.produced;
            }
            self.events.extend(sim.drain_events());
        }

        report.expired_buffs = self.buffs.advance(dt, &mut self.engine);
        if !report.expired_buffs.is_empty() {
            self.flush()?;
        }
        Ok(report)
    }

    // -- Notifications --

    /// Take every generator event queued since the last drain.
    pub fn drain_events(&mut self) -> Vec<GeneratorEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn subscribe_modifiers_changed(
        &mut self,
        listener: impl FnMut(&ModifiersChanged) + 'static,
    ) -> SubscriptionId {
        self.engine.subscribe_changed(listener)
    }

    pub fn unsubscribe_modifiers_changed(&mut self, id: SubscriptionId) -> bool {
        self.engine.unsubscribe_changed(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CostItem, StackingPolicy};
    use crate::generator::GeneratorMode;
    use crate::modifier::{Operation, Scope, Target};
    use crate::test_utils::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn mine_a() -> InstanceId {
        InstanceId::from("mine_a")
    }

    fn rich_wallet() -> MemoryWallet {
        MemoryWallet::with_balances([("gold", 10_000.0), ("gems", 10_000.0)])
    }

    fn game_with(configure: impl FnOnce(&mut crate::catalog::CatalogBuilder)) -> Game {
        let mut builder = two_mine_builder();
        configure(&mut builder);
        let catalog = Arc::new(builder.build().unwrap());
        Game::new(catalog, GameConfig::default(), rich_wallet()).unwrap()
    }

    #[test]
    fn new_game_builds_generators_in_instance_order() {
        let game = game_with(|_| {});
        let ids: Vec<&str> = game.generators().map(|g| g.instance().as_str()).collect();
        assert_eq!(ids, vec!["mine_a", "mine_b"]);
        assert_eq!(game.engine().revision(), 1);
        assert!(game.generator_key(&mine_a()).is_some());
    }

    #[test]
    fn upgrade_purchase_spends_and_recomputes() {
        let mut game = game_with(|b| {
            b.modifier(speed_mod("mod.speed", Scope::Node("mine_a".into()), 2.0));
            let mut up = upgrade("upgrade.speed", &["mod.speed"], true);
            up.cost = vec![CostItem::new("gold", 100.0)];
            up.cost_growth = 2.0;
            b.upgrade(up);
        });
        game.buy_level(&mine_a()).unwrap();
        let interval_before = game.generator(&mine_a()).unwrap().interval();

        assert!(game.try_purchase_upgrade(&UpgradeId::from("upgrade.speed")).unwrap());
        assert!(game.try_purchase_upgrade(&UpgradeId::from("upgrade.speed")).unwrap());
        // 10 for the level, then 100 + 200 for the ranks.
        assert_eq!(game.wallet().balance(&gold()), 10_000.0 - 10.0 - 300.0);
        assert_eq!(game.ledger().purchase_count(&UpgradeId::from("upgrade.speed")), 2);
        assert_eq!(
            game.generator(&mine_a()).unwrap().interval(),
            interval_before / 4.0
        );
    }

    #[test]
    fn one_shot_upgrade_is_capped() {
        let mut game = game_with(|b| {
            b.modifier(speed_mod("mod.speed", Scope::Global, 2.0));
            b.upgrade(upgrade("upgrade.once", &["mod.speed"], false));
        });
        let id = UpgradeId::from("upgrade.once");
        assert!(game.try_purchase_upgrade(&id).unwrap());
        assert!(!game.try_purchase_upgrade(&id).unwrap());
    }

    #[test]
    fn inert_and_unknown_upgrades() {
        let mut game = game_with(|b| {
            b.upgrade(upgrade("upgrade.broken", &["mod.ghost"], false));
        });
        assert!(!game.try_purchase_upgrade(&UpgradeId::from("upgrade.broken")).unwrap());
        assert!(matches!(
            game.try_purchase_upgrade(&UpgradeId::from("upgrade.nope")),
            Err(GameError::UnknownUpgrade(_))
        ));
    }

    #[test]
    fn unaffordable_upgrade_is_not_recorded() {
        let mut game = game_with(|b| {
            let mut up = upgrade("upgrade.pricey", &[], false);
            up.cost = vec![CostItem::new("gold", 1e9)];
            b.upgrade(up);
        });
        assert!(!game.try_purchase_upgrade(&UpgradeId::from("upgrade.pricey")).unwrap());
        assert!(game.ledger().purchased().is_empty());
    }

    #[test]
    fn milestone_fires_once() {
        let mut game = game_with(|b| {
            b.modifier(output_mod("mod.out", Scope::Global, 3.0));
            b.milestone(milestone("milestone.first", &["mod.out"]));
        });
        let id = MilestoneId::from("milestone.first");
        assert!(game.fire_milestone(&id).unwrap());
        assert!(!game.fire_milestone(&id).unwrap());
        assert_eq!(game.modifiers().node_output_multiplier(&mine_a(), None), 3.0);
        assert!(matches!(
            game.fire_milestone(&MilestoneId::from("milestone.nope")),
            Err(GameError::UnknownMilestone(_))
        ));
    }

    #[test]
    fn changed_fires_once_per_flush() {
        let mut game = game_with(|b| {
            b.modifier(speed_mod("mod.speed", Scope::Global, 2.0));
            b.upgrade(upgrade("upgrade.speed", &["mod.speed"], true));
        });
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        game.subscribe_modifiers_changed(move |_| c.set(c.get() + 1));

        game.try_purchase_upgrade(&UpgradeId::from("upgrade.speed")).unwrap();
        game.step(0.1).unwrap();
        game.step(0.1).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn buff_contributes_until_expiry() {
        let mut game = game_with(|b| {
            b.modifier(output_mod("mod.rush", Scope::Global, 2.0));
            b.buff(buff("rush", 1.0, StackingPolicy::None, &["mod.rush"]));
        });
        game.activate_buff(&BuffId::from("rush")).unwrap();
        assert_eq!(game.modifiers().node_output_multiplier(&mine_a(), None), 2.0);

        let report = game.step(1.0).unwrap();
        assert_eq!(report.expired_buffs, vec!["buff.rush".to_string()]);
        assert_eq!(game.modifiers().node_output_multiplier(&mine_a(), None), 1.0);
    }

    #[test]
    fn automation_milestone_switches_generator_immediately() {
        let mut game = game_with(|b| {
            b.modifier(modifier(
                "mod.auto",
                Scope::Node("mine_a".into()),
                Operation::Set,
                Target::AutomationPolicy,
                1.0,
            ));
            b.milestone(milestone("milestone.auto", &["mod.auto"]));
        });
        game.buy_level(&mine_a()).unwrap();
        assert_eq!(game.generator(&mine_a()).unwrap().mode(), GeneratorMode::Running);

        game.fire_milestone(&MilestoneId::from("milestone.auto")).unwrap();
        assert_eq!(game.generator(&mine_a()).unwrap().mode(), GeneratorMode::Automated);
    }

    #[test]
    fn advance_runs_fixed_steps_and_collects_automated_output() {
        let mut game = game_with(|_| {});
        game.buy_level(&mine_a()).unwrap();
        game.buy_automation(&mine_a()).unwrap();
        let before = game.wallet().balance(&gold());

        // gold_mine: 2 s cycles, 10 per cycle; 0.1 s steps.
        let report = game.advance(4.25).unwrap();
        assert_eq!(report.steps, 42);
        assert_eq!(report.cycles, 2);
        assert!((game.wallet().balance(&gold()) - before - 20.0).abs() < 1e-9);
    }

    #[test]
    fn manual_cycle_needs_collect_and_restart() {
        let mut game = game_with(|_| {});
        game.buy_level(&mine_a()).unwrap();
        game.step(2.0).unwrap();
        assert_eq!(game.generator(&mine_a()).unwrap().pending_payout(), Some(10.0));

        let before = game.wallet().balance(&gold());
        assert_eq!(game.collect(&mine_a()).unwrap(), 10.0);
        assert_eq!(game.wallet().balance(&gold()), before + 10.0);
        assert!(game.start_run(&mine_a()).unwrap());

        let events = game.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, GeneratorEvent::CycleCompleted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, GeneratorEvent::Collected { .. })));
    }

    #[test]
    fn unknown_instance_is_an_error() {
        let mut game = game_with(|_| {});
        assert!(matches!(
            game.buy_level(&InstanceId::from("nowhere")),
            Err(GameError::UnknownInstance(_))
        ));
    }

    fn game_with_stray_scope(gold: f64) -> Game {
        let mut builder = two_mine_builder();
        builder
            .modifier(speed_mod("mod.stray", Scope::Node("nowhere".into()), 2.0))
            .upgrade({
                let mut up = upgrade("upgrade.stray", &["mod.stray"], false);
                up.cost = vec![CostItem::new("gold", 50.0)];
                up
            })
            .milestone(milestone("milestone.stray", &["mod.stray"]))
            .buff(buff("buff.stray", 5.0, StackingPolicy::Stack, &["mod.stray"]));
        let catalog = Arc::new(builder.build().unwrap());
        let wallet = MemoryWallet::with_balances([("gold", gold)]);
        Game::new(catalog, GameConfig::default(), wallet).unwrap()
    }

    #[test]
    fn failed_upgrade_recompute_refunds_and_restores_rank() {
        let mut game = game_with_stray_scope(50.0);
        let id = UpgradeId::from("upgrade.stray");

        let err = game.try_purchase_upgrade(&id).unwrap_err();
        assert!(matches!(err, GameError::Engine(EngineError::UnknownNodeRef { .. })));
        assert_eq!(game.wallet().balance(&gold()), 50.0);
        assert_eq!(game.ledger().purchase_count(&id), 0);
        assert!(!game.engine().is_dirty());

        assert_eq!(game.step(2.0).unwrap().steps, 1);
        assert!(game.try_purchase_upgrade(&id).is_err());
        assert_eq!(game.wallet().balance(&gold()), 50.0);
    }

    #[test]
    fn failed_milestone_recompute_is_revoked() {
        let mut game = game_with_stray_scope(0.0);
        let id = MilestoneId::from("milestone.stray");

        assert!(game.fire_milestone(&id).is_err());
        assert!(!game.ledger().has_fired(&id));
        assert!(!game.engine().is_dirty());
        assert!(game.step(0.5).is_ok());
    }

    #[test]
    fn failed_buff_recompute_cancels_the_instance() {
        let mut game = game_with_stray_scope(0.0);

        assert!(game.activate_buff(&BuffId::from("buff.stray")).is_err());
        assert!(game.buffs().is_empty());
        assert!(!game.engine().is_dirty());
        assert!(game.step(0.5).is_ok());
    }

    #[test]
    fn ten_second_buff_expires_on_the_hundredth_step() {
        let mut game = game_with(|b| {
            b.modifier(speed_mod("mod.rush", Scope::Global, 2.0));
            b.buff(buff("buff.rush", 10.0, StackingPolicy::None, &["mod.rush"]));
        });
        game.activate_buff(&BuffId::from("buff.rush")).unwrap();

        for _ in 0..99 {
            let report = game.advance(0.1).unwrap();
            assert_eq!(report.steps, 1);
            assert!(report.expired_buffs.is_empty());
        }
        assert!(game.buffs().is_active(&BuffId::from("buff.rush")));

        let report = game.advance(0.1).unwrap();
        assert_eq!(report.expired_buffs, vec!["buff.rush".to_string()]);
        assert!(game.buffs().is_empty());
        assert_eq!(game.modifiers().node_speed_multiplier(&mine_a()), 1.0);
    }

    #[test]
    fn config_defaults() {
        let config = GameConfig::default();
        assert_eq!(config.tick_seconds, 0.1);
        assert_eq!(config.clock, ClockMode::Fixed);
        assert!(config.auto_collect);
        assert_eq!(config.max_offline_seconds, 28_800.0);
        assert_eq!(config.max_catch_up_steps, 10_000);
    }
}
