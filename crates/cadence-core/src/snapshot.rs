//! Save snapshots via `bitcode` with a versioned header.
//!
//! Only facts are saved: purchased counts, fired milestones, active buffs,
//! generator level / ownership / automation, and the clock. Everything
//! derived (resolved modifier maps, cycle progress) is rebuilt on load.

use crate::buff::ActiveBuff;
use crate::catalog::Catalog;
use crate::clock::SimClock;
use crate::game::{Game, GameConfig, GameError};
use crate::generator::GeneratorFacts;
use crate::id::InstanceId;
use crate::ledger::ProgressionLedger;
use crate::wallet::Wallet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Magic number identifying a cadence save.
pub const SNAPSHOT_MAGIC: u32 = 0xCADE_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("save from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Simulated seconds at save time.
    pub elapsed_seconds: f64,
}

impl SnapshotHeader {
    pub fn new(elapsed_seconds: f64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            elapsed_seconds,
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(SnapshotError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// Everything a save contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    pub header: SnapshotHeader,
    pub ledger: ProgressionLedger,
    pub buffs: Vec<ActiveBuff>,
    pub generators: BTreeMap<InstanceId, GeneratorFacts>,
    pub clock: SimClock,
}

pub fn encode(data: &SaveData) -> Result<Vec<u8>, SnapshotError> {
    bitcode::serialize(data).map_err(|e| SnapshotError::Encode(e.to_string()))
}

/// Decode and validate the header.
pub fn decode(bytes: &[u8]) -> Result<SaveData, SnapshotError> {
    let data: SaveData =
        bitcode::deserialize(bytes).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    data.header.validate()?;
    Ok(data)
}

impl<W: Wallet> Game<W> {
    /// Capture the current facts.
    pub fn save_data(&self) -> SaveData {
        SaveData {
            header: SnapshotHeader::new(self.clock.elapsed()),
            ledger: self.ledger.clone(),
            buffs: self.buffs.active().cloned().collect(),
            generators: self
                .index
                .iter()
                .filter_map(|(id, key)| self.sims.get(*key).map(|s| (id.clone(), s.facts())))
                .collect(),
            clock: self.clock.clone(),
        }
    }

    pub fn save(&self) -> Result<Vec<u8>, GameError> {
        let bytes = encode(&self.save_data())?;
        log::debug!("saved {} bytes", bytes.len());
        Ok(bytes)
    }

    /// Rebuild a game from saved bytes. Generators missing from the save keep
    /// their initial state; saved generators unknown to the catalog are
    /// dropped with a warning.
    pub fn load(
        catalog: Arc<Catalog>,
        config: GameConfig,
        wallet: W,
        bytes: &[u8],
    ) -> Result<Self, GameError> {
        let data = decode(bytes)?;
        Self::from_save_data(catalog, config, wallet, data)
    }

    pub fn from_save_data(
        catalog: Arc<Catalog>,
        config: GameConfig,
        wallet: W,
        data: SaveData,
    ) -> Result<Self, GameError> {
        let mut game = Self::new(catalog, config, wallet)?;
        game.ledger = data.ledger;
        for (id, facts) in data.generators {
            match game.index.get(&id).and_then(|k| game.sims.get_mut(*k)) {
                Some(sim) => sim.restore(facts),
                None => log::warn!("dropping saved generator '{id}': not in the catalog"),
            }
        }
        game.buffs.restore(data.buffs, &mut game.engine)?;
        if game.clock.mode() == data.clock.mode() {
            game.clock = data.clock;
        }
        game.engine.mark_dirty();
        game.flush()?;
        log::info!(
            "loaded save at {:.1}s with {} purchased upgrades",
            data.header.elapsed_seconds,
            game.ledger.purchased().len()
        );
        Ok(game)
    }
}
