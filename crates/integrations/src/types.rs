//! Small shared types used by several importer modules: nothing here is
//! TestRail- or Qase-specific, the entity shapes for those live in
//! `railmigrate_core::types`.

/// Result of importing one entity: either it was newly created on the
/// target, found already present and reused, or failed outright. Mirrors
/// `core::stats::EntityCounters` so an importer can update a counter
/// directly from the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Created,
    Skipped,
    Failed,
}

impl ImportOutcome {
    pub fn record(self, counters: &railmigrate_core::stats::EntityCounters) {
        match self {
            ImportOutcome::Created => counters.record_created(),
            ImportOutcome::Skipped => counters.record_skipped(),
            ImportOutcome::Failed => counters.record_failed(),
        }
    }
}
