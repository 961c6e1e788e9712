//! Counters collected while a mill runs

use serde::{Deserialize, Serialize};

/// Statistics for one [`WaterMill::run`](super::WaterMill::run)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MillStats {
    /// Root elements pulled from the root stream
    pub roots_pulled: u64,

    /// Child elements attached through join pairs
    pub children_joined: u64,

    /// Root elements dropped because a joined stream ran ahead
    pub roots_skipped: u64,

    /// Windows handed to the processing callback
    pub windows_flushed: u64,

    /// Processing callback invocations
    pub invocations: u64,

    /// Results published downstream
    pub results_emitted: u64,

    /// Root pulls that timed out
    pub timeouts: u64,

    /// Commits issued to the input broker
    pub commits: u64,
}

impl MillStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment roots pulled
    pub fn inc_roots_pulled(&mut self) {
        self.roots_pulled += 1;
    }

    /// Add joined children
    pub fn add_children_joined(&mut self, count: u64) {
        self.children_joined += count;
    }

    /// Increment roots skipped
    pub fn inc_roots_skipped(&mut self) {
        self.roots_skipped += 1;
    }

    /// Increment windows flushed
    pub fn inc_windows_flushed(&mut self) {
        self.windows_flushed += 1;
    }

    /// Increment invocations
    pub fn inc_invocations(&mut self) {
        self.invocations += 1;
    }

    /// Add emitted results
    pub fn add_results_emitted(&mut self, count: u64) {
        self.results_emitted += count;
    }

    /// Increment timeouts
    pub fn inc_timeouts(&mut self) {
        self.timeouts += 1;
    }

    /// Increment commits
    pub fn inc_commits(&mut self) {
        self.commits += 1;
    }

    /// Root elements processed per second
    pub fn roots_per_second(&self, elapsed_seconds: f64) -> f64 {
        if elapsed_seconds > 0.0 {
            self.roots_pulled as f64 / elapsed_seconds
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut stats = MillStats::new();
        stats.inc_roots_pulled();
        stats.inc_roots_pulled();
        stats.add_children_joined(3);
        stats.inc_invocations();

        assert_eq!(stats.roots_pulled, 2);
        assert_eq!(stats.children_joined, 3);
        assert_eq!(stats.invocations, 1);
        assert_eq!(stats.roots_per_second(2.0), 1.0);
        assert_eq!(stats.roots_per_second(0.0), 0.0);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = MillStats {
            commits: 4,
            ..MillStats::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["commits"], 4);
    }
}
