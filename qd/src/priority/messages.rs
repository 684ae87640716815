//! Values exchanged between the dispatch task and its handles

/// Discipline counters for observability
///
/// Published by the dispatch task at the end of every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisciplineMetrics {
    pub cycles: u64,
    pub dispatched: u64,
    pub released: u64,
    pub idle_cycles: u64,
    pub recalculations: u64,
}

impl DisciplineMetrics {
    /// Items dispatched but not yet released
    pub fn in_flight(&self) -> u64 {
        self.dispatched.saturating_sub(self.released)
    }
}

/// Final result of a run: `None` on clean shutdown
pub(crate) type Outcome = Option<super::DisciplineError>;
