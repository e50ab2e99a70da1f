//! Deduplicated warnings for runtime skip conditions.
//!
//! Each warning has a stable key. The first time a key is reported it is
//! logged through `log::warn!` and recorded; later reports of the same key
//! are dropped, across recomputes.

use std::collections::BTreeSet;

/// Category of a recorded warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A modifier excluded from accumulation.
    SkippedModifier,
    /// An upgrade whose effect references do not all resolve.
    InvalidUpgrade,
    /// A milestone whose effect references do not all resolve.
    InvalidMilestone,
    /// Two different `set` values on the same key.
    SetConflict,
    /// A ledger entry naming content that does not exist.
    UnknownLedgerEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub key: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    seen: BTreeSet<String>,
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log a warning unless its key was already reported.
    /// Returns `true` if this call logged.
    pub fn warn_once(
        &mut self,
        kind: DiagnosticKind,
        key: impl Into<String>,
        message: impl FnOnce() -> String,
    ) -> bool {
        let key = key.into();
        if self.seen.contains(&key) {
            return false;
        }
        let message = message();
        log::warn!("{message} [{key}]");
        self.seen.insert(key.clone());
        self.entries.push(Diagnostic { kind, key, message });
        true
    }

    /// All recorded warnings, oldest first.
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Recorded warnings of one kind.
    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.seen.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_logged_once() {
        let mut diag = Diagnostics::new();
        assert!(diag.warn_once(DiagnosticKind::SetConflict, "k", || "first".into()));
        assert!(!diag.warn_once(DiagnosticKind::SetConflict, "k", || "second".into()));
        assert_eq!(diag.entries().len(), 1);
        assert_eq!(diag.entries()[0].message, "first");
    }

    #[test]
    fn distinct_keys_logged_separately() {
        let mut diag = Diagnostics::new();
        diag.warn_once(DiagnosticKind::SkippedModifier, "a", || "a".into());
        diag.warn_once(DiagnosticKind::SetConflict, "b", || "b".into());
        assert_eq!(diag.count(DiagnosticKind::SkippedModifier), 1);
        assert_eq!(diag.count(DiagnosticKind::SetConflict), 1);
        assert!(diag.contains_key("b"));
    }
}
