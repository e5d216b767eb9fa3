//! `TaskDescription`: a pending unit of work, not yet bound to a process.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::wire::JobPayload;

/// Generates the monotonically increasing `sequence` field used to
/// tie-break pending tasks of equal priority.
///
/// One generator is shared by everything that constructs `TaskDescription`s
/// within a single scheduler process, so sequence order reflects arrival
/// order across bus frames regardless of which bin eventually handles them.
#[derive(Debug, Default)]
pub struct SequenceGenerator(AtomicU64);

impl SequenceGenerator {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Returns the next sequence number. Never reused, never reordered.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, AtomicOrdering::Relaxed)
    }
}

/// A pending unit of work.
///
/// Lower numeric `priority` means higher scheduling priority. `sequence` is
/// the tiebreaker for tasks of equal priority: earlier sequence wins.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescription {
    pub priority: i32,
    pub runtime: f64,
    /// Wall-clock timeout in seconds, as carried on the wire. The runner
    /// does not consult this value (see the CLI-configured-timeout
    /// resolution in SPEC_FULL.md §9); it is kept here only so a
    /// `TaskDescription` round-trips the wire payload shape faithfully.
    pub timeout: Option<f64>,
    pub sequence: u64,
}

impl TaskDescription {
    pub fn new(priority: i32, runtime: f64, timeout: Option<f64>, sequence: u64) -> Self {
        Self {
            priority,
            runtime,
            timeout,
            sequence,
        }
    }

    /// Builds a `TaskDescription` from a wire payload, stamping it with the
    /// scheduler's own configured timeout and the next sequence number.
    pub fn from_payload(payload: JobPayload, timeout: Option<f64>, seq: &SequenceGenerator) -> Self {
        Self {
            priority: payload.priority,
            runtime: payload.runtime,
            timeout,
            sequence: seq.next(),
        }
    }

    /// Reconstructs the bus payload shape this task would have arrived as.
    pub fn to_payload(&self) -> JobPayload {
        JobPayload {
            runtime: self.runtime,
            priority: self.priority,
        }
    }

    /// Ordering key for the pending min-heap: `(priority, sequence)`,
    /// smallest first. Opposite of the active-set eviction ordering, which
    /// is `max`-by-priority -- the two orderings are intentionally inverted,
    /// see SPEC_FULL.md §4.2.
    fn pending_key(&self) -> (i32, u64) {
        (self.priority, self.sequence)
    }
}

impl Eq for TaskDescription {}

impl PartialOrd for TaskDescription {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TaskDescription {
    fn cmp(&self, other: &Self) -> Ordering {
        self.pending_key().cmp(&other.pending_key())
    }
}
