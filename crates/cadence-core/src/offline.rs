//! Offline catch-up: one large step per buff-expiry window.

use crate::game::{Game, GameError};
use crate::id::ResourceId;
use crate::wallet::Wallet;
use std::collections::BTreeMap;

/// Summary of an offline catch-up run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfflineReport {
    pub requested_seconds: f64,
    /// `requested_seconds` after the offline cap.
    pub simulated_seconds: f64,
    /// Steps the span was split into.
    pub chunks: u32,
    pub cycles: u64,
    /// Payout queued per resource.
    pub earnings: BTreeMap<ResourceId, f64>,
    pub expired_buffs: Vec<String>,
}

impl OfflineReport {
    pub fn was_capped(&self) -> bool {
        self.simulated_seconds < self.requested_seconds
    }
}

impl<W: Wallet> Game<W> {
    /// Simulate `seconds` of absence. The span is capped at
    /// `max_offline_seconds` and split at buff expiries so each buff stops
    /// contributing exactly when it runs out.
    pub fn simulate_offline(&mut self, seconds: f64) -> Result<OfflineReport, GameError> {
        let requested = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        let span = requested.min(self.config.max_offline_seconds.max(0.0));
        let mut report = OfflineReport {
            requested_seconds: requested,
            simulated_seconds: span,
            ..OfflineReport::default()
        };

        let mut remaining = span;
        while remaining > 0.0 {
            let chunk = match self.buffs.next_expiry() {
                Some(t) if t > 0.0 && t < remaining => t,
                _ => remaining,
            };
            self.clock.record_step(chunk);
            let step = self.run_step(chunk)?;
            report.chunks += 1;
            report.cycles += step.cycles;
            for (resource, amount) in step.produced {
                *report.earnings.entry(resource).or_insert(0.0) += amount;
            }
            report.expired_buffs.extend(step.expired_buffs);
            remaining -= chunk;
        }

        if report.was_capped() {
            log::info!(
                "offline time capped from {:.0}s to {:.0}s",
                report.requested_seconds,
                report.simulated_seconds
            );
        }
        log::info!(
            "offline catch-up: {:.0}s in {} chunks, {} cycles",
            report.simulated_seconds,
            report.chunks,
            report.cycles
        );
        Ok(report)
    }
}
