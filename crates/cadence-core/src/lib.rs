//! Cadence Core -- the progression engine for incremental games.
//!
//! Players own generators that pay out over timed cycles, level them up with
//! currency, and buy upgrades, milestones, and temporary buffs that change
//! generator behaviour through a small closed modifier language.
//!
//! # Data Flow
//!
//! ```text
//! ledger mutation -> engine recompute -> Changed -> simulators refresh -> tick
//! ```
//!
//! 1. **Catalog** -- immutable content tables, built once by
//!    [`catalog::CatalogBuilder`].
//! 2. **Ledger** -- purchased upgrade counts and fired milestones.
//! 3. **Engine** -- [`engine::ModifierEngine`] folds the ledger and the active
//!    buff sources into [`engine::ResolvedModifiers`], rebuilt wholesale on
//!    every recompute.
//! 4. **Simulators** -- one [`generator::ProductionSim`] per node instance,
//!    reading the resolved snapshot and paying into a [`wallet::Wallet`].
//!
//! [`game::Game`] is the composition root that owns all of the above and runs
//! the step pipeline, offline catch-up, and save/load.
//!
//! # Key Types
//!
//! - [`modifier::Target`], [`modifier::Scope`], [`modifier::Operation`] --
//!   the parsed modifier language.
//! - [`modifier::Accumulator`] -- per-key multiply / set accumulation.
//! - [`buff::BuffTracker`] -- stacking policies and expiry.
//! - [`clock::SimClock`] -- fixed or variable time steps.
//! - [`snapshot`] -- versioned save format via bitcode.

pub mod buff;
pub mod catalog;
pub mod clock;
pub mod diagnostics;
pub mod engine;
pub mod game;
pub mod generator;
pub mod id;
pub mod ledger;
pub mod modifier;
pub mod offline;
pub mod signal;
pub mod snapshot;
pub mod wallet;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
