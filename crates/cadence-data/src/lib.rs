//! Content loading for cadence.
//!
//! Reads `content.{ron,toml,json}` and an optional `config.{ron,toml,json}`
//! from a directory and turns them into a validated
//! [`Catalog`](cadence_core::catalog::Catalog) and a
//! [`GameConfig`](cadence_core::game::GameConfig).

pub mod loader;
pub mod schema;

pub use loader::{load_game_data, DataLoadError, GameData};
