//! The phases a workload run consists of, and the per-phase accounting.

use std::fmt;

/// A slot in the phase sequence of a run.
///
/// Phases always execute in declaration order. Only [`Phase::Create`] and [`Phase::Delete`] issue
/// operations against the store; the remaining phases are reserved and report as unsupported
/// when enabled.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    /// Put every key of the key set, once per tick.
    Create,
    /// Delete every key of the key set, once per tick.
    Delete,
    /// Compact the store's revision history. Not implemented.
    Compaction,
    /// Defragment the store's backend. Not implemented.
    Defragmentation,
    /// Remove leftover keys. Not implemented.
    Cleanup,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 5] = [
        Phase::Create,
        Phase::Delete,
        Phase::Compaction,
        Phase::Defragmentation,
        Phase::Cleanup,
    ];

    /// Returns the lowercase name used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Create => "create",
            Phase::Delete => "delete",
            Phase::Compaction => "compaction",
            Phase::Defragmentation => "defragmentation",
            Phase::Cleanup => "cleanup",
        }
    }

    /// Returns the store operation issued per key, or `None` for reserved phases.
    pub fn operation(self) -> Option<Operation> {
        match self {
            Phase::Create => Some(Operation::Put),
            Phase::Delete => Some(Operation::Delete),
            Phase::Compaction | Phase::Defragmentation | Phase::Cleanup => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single-key operation a phase issues against the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    /// `put(key, value)`
    Put,
    /// `delete(key)`
    Delete,
}

/// Aggregate of a single tick.
///
/// Created when the tick fires, logged and folded into the [`PhaseReport`] when the last key has
/// been processed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CycleOutcome {
    /// Zero-based index of the tick within its phase.
    pub tick: usize,
    /// Number of keys an operation was issued for.
    pub attempted: u64,
    /// Number of operations that returned an error.
    pub failures: u64,
    /// Revision returned by the last successful operation of this tick.
    pub revision: Option<i64>,
    /// Number of deletes that removed exactly one record.
    pub deleted: u64,
    /// Whether the tick stopped early because the run was cancelled.
    pub interrupted: bool,
}

impl CycleOutcome {
    pub(crate) fn new(tick: usize) -> Self {
        Self {
            tick,
            ..Default::default()
        }
    }
}

/// How a phase slot ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PhaseOutcome {
    /// All configured ticks ran.
    Completed,
    /// The run was cancelled before all ticks finished.
    Cancelled,
    /// The phase is enabled but has no implementation.
    Unsupported,
}

/// Summary of one phase slot, reported when the phase ends.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseReport {
    /// The phase this report belongs to.
    pub phase: Phase,
    /// How the phase ended.
    pub outcome: PhaseOutcome,
    /// Number of ticks that fired.
    pub ticks: usize,
    /// Number of keys in the key set.
    pub key_count: usize,
    /// Configured length of the random key suffix.
    pub key_size: usize,
    /// Total operations issued across all ticks.
    pub attempted: u64,
    /// Total failed operations across all ticks.
    pub failures: u64,
    /// Revision of the most recent successful operation, `0` if there was none.
    pub revision: i64,
    /// Deletes that removed exactly one record. Always `0` outside the delete phase.
    pub deleted: u64,
}

impl PhaseReport {
    pub(crate) fn new(phase: Phase, key_count: usize, key_size: usize) -> Self {
        Self {
            phase,
            outcome: PhaseOutcome::Completed,
            ticks: 0,
            key_count,
            key_size,
            attempted: 0,
            failures: 0,
            revision: 0,
            deleted: 0,
        }
    }

    pub(crate) fn unsupported(phase: Phase, key_count: usize, key_size: usize) -> Self {
        Self {
            outcome: PhaseOutcome::Unsupported,
            ..Self::new(phase, key_count, key_size)
        }
    }

    /// Folds a finished tick into the phase totals.
    ///
    /// Later revisions overwrite earlier ones; a tick without any successful operation leaves
    /// the revision untouched.
    pub(crate) fn absorb(&mut self, cycle: &CycleOutcome) {
        self.ticks += 1;
        self.attempted += cycle.attempted;
        self.failures += cycle.failures;
        self.deleted += cycle.deleted;
        if let Some(revision) = cycle.revision {
            self.revision = revision;
        }
        if cycle.interrupted {
            self.outcome = PhaseOutcome::Cancelled;
        }
    }
}

/// Summaries of all phase slots that were enabled for a run, in execution order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunReport {
    /// One report per enabled phase.
    pub phases: Vec<PhaseReport>,
}

impl RunReport {
    /// Returns the report of the given phase, if it was enabled.
    pub fn get(&self, phase: Phase) -> Option<&PhaseReport> {
        self.phases.iter().find(|report| report.phase == phase)
    }

    /// Returns `true` if any phase was cut short by cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.phases
            .iter()
            .any(|report| report.outcome == PhaseOutcome::Cancelled)
    }
}
