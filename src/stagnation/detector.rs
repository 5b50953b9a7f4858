//! Windowed stagnation detection over recent summaries.
//!
//! The detector keeps the last `stagnation_runs + 1` summaries. After every
//! append it walks the adjacent pairs from newest to oldest and counts how
//! many consecutive comparisons reach the similarity threshold. The run is
//! derived from the window each time, so entries aging out can never leave
//! a stale count behind.
//!
//! ```text
//! history:  s0 ── s1 ── s2 ── s3        (capacity = runs + 1 = 4)
//! pairs:       0.2   0.9   1.0
//!                    └──────┘ trailing run = 2
//! ```

use std::collections::VecDeque;

use tracing::debug;

use crate::iteration::IterationPolicy;
use crate::stagnation::similarity::similarity;

/// Stateful detector owning the summary history.
///
/// # Example
///
/// ```
/// use bizloop::iteration::IterationPolicy;
/// use bizloop::stagnation::StagnationDetector;
///
/// let policy = IterationPolicy::new(0.5, 0.5, 0.6, 2).unwrap();
/// let mut detector = StagnationDetector::new(&policy);
///
/// assert!(!detector.observe("same idea"));
/// assert!(!detector.observe("same idea"));
/// assert!(detector.observe("same idea"));
/// assert!(!detector.observe("something else entirely"));
/// ```
#[derive(Debug, Clone)]
pub struct StagnationDetector {
    threshold: f64,
    runs: usize,
    history: VecDeque<String>,
}

impl StagnationDetector {
    /// Create an empty detector for the given policy.
    #[must_use]
    pub fn new(policy: &IterationPolicy) -> Self {
        Self {
            threshold: policy.stagnation_threshold(),
            runs: policy.stagnation_runs(),
            history: VecDeque::with_capacity(policy.history_capacity()),
        }
    }

    /// Resume from a persisted history, oldest first.
    ///
    /// Only the newest `stagnation_runs + 1` entries are kept.
    #[must_use]
    pub fn with_history<I, S>(policy: &IterationPolicy, history: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut detector = Self::new(policy);
        for summary in history {
            detector.push(summary.into());
        }
        detector
    }

    /// Record a summary and report whether the loop is stalled.
    pub fn observe(&mut self, summary: impl Into<String>) -> bool {
        self.push(summary.into());
        let run = self.trailing_run();
        let stalled = run >= self.runs;
        debug!(
            "Stagnation check: trailing run {}/{} (window {})",
            run,
            self.runs,
            self.history.len()
        );
        stalled
    }

    /// Number of consecutive trailing comparisons at or above the threshold.
    #[must_use]
    pub fn trailing_run(&self) -> usize {
        if self.history.len() < 2 {
            return 0;
        }
        let mut run = 0;
        for i in (1..self.history.len()).rev() {
            if similarity(&self.history[i - 1], &self.history[i]) >= self.threshold {
                run += 1;
            } else {
                break;
            }
        }
        run
    }

    /// Whether the current window constitutes a stall.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.trailing_run() >= self.runs
    }

    /// Retained summaries, oldest first.
    #[must_use]
    pub fn history(&self) -> &VecDeque<String> {
        &self.history
    }

    /// Up to `n` most recent summaries, oldest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<String> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Maximum number of retained summaries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.runs + 1
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    fn push(&mut self, summary: String) {
        self.history.push_back(summary);
        while self.history.len() > self.capacity() {
            self.history.pop_front();
        }
    }
}
