//! Per-iteration decision making.
//!
//! [`IterationScheduler`] is the composition root of the scheduling core:
//! it asks the balancer for a baseline mode, feeds the latest summary to
//! the stagnation detector, and overrides the baseline when the loop has
//! stalled.

use serde::Serialize;
use tracing::{debug, info};

use crate::iteration::balancer;
use crate::iteration::policy::IterationPolicy;
use crate::iteration::state::{IterationCounts, Mode};
use crate::stagnation::StagnationDetector;

/// Outcome of a single scheduling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Mode the next iteration should run in
    pub mode: Mode,
    /// What the balancer alone would have chosen
    pub baseline: Mode,
    /// Whether recent summaries were judged repetitive
    pub stalled: bool,
    /// Whether a shake-up task must be enqueued
    pub shake_up_required: bool,
}

impl Decision {
    /// True when stagnation changed the balancer's choice.
    #[must_use]
    pub fn overridden(&self) -> bool {
        self.mode != self.baseline
    }
}

/// Owns the detector state for one running loop.
///
/// Not meant to be shared: each loop constructs its own scheduler.
///
/// # Example
///
/// ```
/// use bizloop::iteration::{IterationCounts, IterationPolicy, IterationScheduler, Mode};
///
/// let policy = IterationPolicy::new(0.6, 0.4, 0.6, 1).unwrap();
/// let mut scheduler = IterationScheduler::new(policy);
///
/// let counts = IterationCounts::new(1, 0);
/// let first = scheduler.decide(&counts, Some("a b c"));
/// assert_eq!(first.mode, Mode::Deepen);
///
/// let second = scheduler.decide(&counts, Some("a b c"));
/// assert_eq!(second.mode, Mode::Explore);
/// assert!(second.shake_up_required);
/// ```
#[derive(Debug, Clone)]
pub struct IterationScheduler {
    policy: IterationPolicy,
    detector: StagnationDetector,
}

impl IterationScheduler {
    /// Create a scheduler with an empty summary history.
    #[must_use]
    pub fn new(policy: IterationPolicy) -> Self {
        let detector = StagnationDetector::new(&policy);
        Self { policy, detector }
    }

    /// Create a scheduler resuming from a persisted summary history.
    #[must_use]
    pub fn with_history<I, S>(policy: IterationPolicy, history: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let detector = StagnationDetector::with_history(&policy, history);
        Self { policy, detector }
    }

    /// Decide the next iteration's mode.
    ///
    /// `recent_summary` is the output of the previous iteration, absent on
    /// the very first one. Counts are read, never modified.
    pub fn decide(&mut self, counts: &IterationCounts, recent_summary: Option<&str>) -> Decision {
        let baseline = balancer::next_mode_for(counts, &self.policy);
        let stalled = recent_summary.is_some_and(|summary| self.detector.observe(summary));

        let decision = if stalled {
            Decision {
                mode: Mode::Explore,
                baseline,
                stalled: true,
                shake_up_required: true,
            }
        } else {
            Decision {
                mode: baseline,
                baseline,
                stalled: false,
                shake_up_required: false,
            }
        };

        if decision.stalled {
            info!(
                "Stagnation detected after {} similar iterations; forcing {} (baseline {})",
                self.policy.stagnation_runs(),
                decision.mode,
                baseline
            );
        } else {
            debug!(
                "Decided {} (explore={}, deepen={})",
                decision.mode, counts.explore_count, counts.deepen_count
            );
        }

        decision
    }

    /// Balancer recommendation without touching the detector.
    #[must_use]
    pub fn baseline(&self, counts: &IterationCounts) -> Mode {
        balancer::next_mode_for(counts, &self.policy)
    }

    /// The policy this scheduler was built with.
    #[must_use]
    pub fn policy(&self) -> &IterationPolicy {
        &self.policy
    }

    /// Read access to the detector (for persisting its history).
    #[must_use]
    pub fn detector(&self) -> &StagnationDetector {
        &self.detector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(explore: f64, threshold: f64, runs: usize) -> IterationScheduler {
        IterationScheduler::new(IterationPolicy::new(explore, 1.0 - explore, threshold, runs).unwrap())
    }

    #[test]
    fn test_first_iteration_without_summary() {
        let mut s = scheduler(0.6, 0.6, 3);
        let decision = s.decide(&IterationCounts::default(), None);
        assert_eq!(
            decision,
            Decision {
                mode: Mode::Explore,
                baseline: Mode::Explore,
                stalled: false,
                shake_up_required: false,
            }
        );
        assert!(s.detector().history().is_empty());
    }

    #[test]
    fn test_follows_balancer_when_not_stalled() {
        let mut s = scheduler(0.7, 0.6, 3);
        let decision = s.decide(&IterationCounts::new(2, 0), Some("fresh idea"));
        assert_eq!(decision.mode, Mode::Deepen);
        assert!(!decision.stalled);
        assert!(!decision.shake_up_required);
        assert!(!decision.overridden());
    }

    #[test]
    fn test_stall_overrides_deepen_baseline() {
        let mut s = scheduler(0.5, 0.6, 2);
        let counts = IterationCounts::new(5, 1);
        assert_eq!(s.baseline(&counts), Mode::Deepen);

        s.decide(&counts, Some("same summary"));
        s.decide(&counts, Some("same summary"));
        let decision = s.decide(&counts, Some("same summary"));

        assert!(decision.stalled);
        assert!(decision.shake_up_required);
        assert_eq!(decision.mode, Mode::Explore);
        assert_eq!(decision.baseline, Mode::Deepen);
        assert!(decision.overridden());
    }

    #[test]
    fn test_stall_with_explore_baseline_still_requires_shake_up() {
        let mut s = scheduler(1.0, 0.6, 1);
        s.decide(&IterationCounts::default(), Some("x"));
        let decision = s.decide(&IterationCounts::new(1, 0), Some("x"));
        assert_eq!(decision.mode, Mode::Explore);
        assert!(decision.shake_up_required);
        assert!(!decision.overridden());
    }

    #[test]
    fn test_absent_summary_does_not_touch_history() {
        let mut s = scheduler(0.5, 0.6, 1);
        s.decide(&IterationCounts::default(), Some("x"));
        let decision = s.decide(&IterationCounts::new(1, 0), None);
        assert!(!decision.stalled);
        assert_eq!(s.detector().history().len(), 1);
    }

    #[test]
    fn test_with_history_resumes_stall() {
        let policy = IterationPolicy::new(0.5, 0.5, 0.6, 2).unwrap();
        let mut s = IterationScheduler::with_history(policy, ["a b c", "a b c"]);
        let decision = s.decide(&IterationCounts::new(3, 3), Some("a b c"));
        assert!(decision.shake_up_required);
    }

    #[test]
    fn test_decision_serializes() {
        let decision = Decision {
            mode: Mode::Explore,
            baseline: Mode::Deepen,
            stalled: true,
            shake_up_required: true,
        };
        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains("\"mode\":\"explore\""));
        assert!(json.contains("\"shake_up_required\":true"));
    }
}
