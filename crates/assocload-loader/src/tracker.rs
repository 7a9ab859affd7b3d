//! Batch tracking and degraded-coalescing detection.
//!
//! A healthy traversal resolves each association in one batch per nesting
//! level. Opening a batch while the previous batch for the same key is still
//! resolving is the next nesting level (self-referential associations do this
//! at every level) and is expected. Opening one after the previous batch has
//! already resolved means requests were registered after their group was
//! forced, which is the N+1 pattern creeping back in. The tracker counts those
//! late reopenings per association and warns once the count reaches the
//! threshold.
//!
//! # Example
//!
//! ```
//! use assocload_loader::{BatchOpen, BatchTracker};
//!
//! let mut tracker = BatchTracker::new().with_threshold(2);
//! tracker.record_open("replies", "comment", BatchOpen::New);
//! tracker.record_open("replies", "comment", BatchOpen::Nested);
//! tracker.record_open("replies", "comment", BatchOpen::Nested);
//! assert_eq!(tracker.stats().potential_n1, 0);
//!
//! tracker.record_open("author", "author", BatchOpen::Late);
//! tracker.record_open("author", "author", BatchOpen::Late); // warns
//! assert_eq!(tracker.late_opens_for("author", "author"), 2);
//! assert_eq!(tracker.stats().potential_n1, 1);
//! ```

use std::collections::HashMap;

/// Tracks batch resolutions within one registry scope.
#[derive(Debug)]
pub struct BatchTracker {
    /// (association, target) -> resolved batch count
    counts: HashMap<(String, String), usize>,
    /// (association, target) -> batches opened after an earlier one resolved
    late: HashMap<(String, String), usize>,
    /// Threshold for warning (late reopenings per association)
    threshold: usize,
    /// Whether tracking is enabled
    enabled: bool,
    stats: BatchStats,
}

impl Default for BatchTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// How a batch came to be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOpen {
    /// First batch for its key
    New,
    /// The previous batch for the key was resolving: next nesting level
    Nested,
    /// The previous batch for the key had already resolved or failed
    Late,
}

/// Counters for one registry scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Batches opened (including reopened ones)
    pub batches_opened: usize,
    /// Batches whose batch function completed successfully
    pub batches_resolved: usize,
    /// Batches whose batch function failed
    pub batches_failed: usize,
    /// Distinct item keys handed to batch functions
    pub items_resolved: usize,
    /// Batches opened because the previous batch for the same key had
    /// already resolved
    pub reopened: usize,
    /// Batches opened while the previous batch for the same key was
    /// resolving
    pub nested: usize,
    /// Associations that reached the warning threshold
    pub potential_n1: usize,
}

impl BatchTracker {
    /// Create a new tracker with default threshold (3).
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            late: HashMap::new(),
            threshold: 3,
            enabled: true,
            stats: BatchStats::default(),
        }
    }

    /// Set the threshold for degraded-coalescing warnings.
    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Record that a batch was opened.
    ///
    /// When the number of late reopenings for an association reaches the
    /// threshold, a warning is emitted.
    pub fn record_open(&mut self, association: &str, target: &str, how: BatchOpen) {
        self.stats.batches_opened += 1;
        match how {
            BatchOpen::New => return,
            BatchOpen::Nested => {
                self.stats.nested += 1;
                return;
            }
            BatchOpen::Late => self.stats.reopened += 1,
        }

        if !self.enabled {
            return;
        }

        let count = self
            .late
            .entry((association.to_string(), target.to_string()))
            .or_insert(0);
        *count += 1;

        if *count == self.threshold {
            self.stats.potential_n1 += 1;
            tracing::warn!(
                target: "assocload::batch",
                association = association,
                target_kind = target,
                late_batches = *count,
                threshold = self.threshold,
                "association reopened after its batch resolved; requests are registered after their batch was forced"
            );
        }
    }

    /// Record a failed batch.
    pub fn record_failure(&mut self) {
        self.stats.batches_failed += 1;
    }

    /// Record a successful batch resolution of `items` item keys.
    pub fn record_resolution(&mut self, association: &str, target: &str, items: usize) {
        self.stats.batches_resolved += 1;
        self.stats.items_resolved += items;

        if self.enabled {
            *self
                .counts
                .entry((association.to_string(), target.to_string()))
                .or_insert(0) += 1;
        }
    }

    /// Get the number of resolutions recorded for an association.
    #[must_use]
    pub fn count_for(&self, association: &str, target: &str) -> usize {
        self.counts
            .get(&(association.to_string(), target.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Get the number of late reopenings recorded for an association.
    #[must_use]
    pub fn late_opens_for(&self, association: &str, target: &str) -> usize {
        self.late
            .get(&(association.to_string(), target.to_string()))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Reset all counts.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.late.clear();
        self.stats = BatchStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_defaults() {
        let tracker = BatchTracker::new();
        assert_eq!(tracker.threshold(), 3);
        assert!(tracker.is_enabled());
        assert_eq!(tracker.stats(), BatchStats::default());
    }

    #[test]
    fn threshold_floor_is_one() {
        assert_eq!(BatchTracker::new().with_threshold(0).threshold(), 1);
    }

    #[test]
    fn counts_per_association() {
        let mut tracker = BatchTracker::new().with_threshold(10);
        tracker.record_resolution("comments", "comment", 4);
        tracker.record_resolution("comments", "comment", 2);
        tracker.record_resolution("author", "author", 3);

        assert_eq!(tracker.count_for("comments", "comment"), 2);
        assert_eq!(tracker.count_for("author", "author"), 1);
        assert_eq!(tracker.count_for("tags", "tag"), 0);

        let stats = tracker.stats();
        assert_eq!(stats.batches_resolved, 3);
        assert_eq!(stats.items_resolved, 9);
        assert_eq!(stats.potential_n1, 0);
    }

    #[test]
    fn flags_threshold_once() {
        let mut tracker = BatchTracker::new().with_threshold(2);
        for _ in 0..5 {
            tracker.record_open("comments", "comment", BatchOpen::Late);
        }
        assert_eq!(tracker.late_opens_for("comments", "comment"), 5);
        assert_eq!(tracker.stats().potential_n1, 1);
    }

    #[test]
    fn nesting_levels_are_not_degraded() {
        let mut tracker = BatchTracker::new().with_threshold(2);
        tracker.record_open("replies", "comment", BatchOpen::New);
        for _ in 0..6 {
            tracker.record_open("replies", "comment", BatchOpen::Nested);
            tracker.record_resolution("replies", "comment", 2);
        }

        let stats = tracker.stats();
        assert_eq!(stats.nested, 6);
        assert_eq!(stats.reopened, 0);
        assert_eq!(stats.potential_n1, 0);
        assert_eq!(tracker.count_for("replies", "comment"), 6);
        assert_eq!(tracker.late_opens_for("replies", "comment"), 0);
    }

    #[test]
    fn disabled_still_counts_totals() {
        let mut tracker = BatchTracker::new().with_threshold(1);
        tracker.disable();
        tracker.record_resolution("comments", "comment", 1);
        tracker.record_open("comments", "comment", BatchOpen::Late);
        assert_eq!(tracker.count_for("comments", "comment"), 0);
        assert_eq!(tracker.late_opens_for("comments", "comment"), 0);
        assert_eq!(tracker.stats().batches_resolved, 1);
        assert_eq!(tracker.stats().reopened, 1);
        assert_eq!(tracker.stats().potential_n1, 0);
    }

    #[test]
    fn open_and_failure_counters() {
        let mut tracker = BatchTracker::new();
        tracker.record_open("comments", "comment", BatchOpen::New);
        tracker.record_open("comments", "comment", BatchOpen::Late);
        tracker.record_open("comments", "comment", BatchOpen::Nested);
        tracker.record_failure();
        let stats = tracker.stats();
        assert_eq!(stats.batches_opened, 3);
        assert_eq!(stats.reopened, 1);
        assert_eq!(stats.nested, 1);
        assert_eq!(stats.batches_failed, 1);

        tracker.reset();
        assert_eq!(tracker.stats(), BatchStats::default());
        assert_eq!(tracker.late_opens_for("comments", "comment"), 0);
    }
}
