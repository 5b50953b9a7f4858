//! Iteration mode and cumulative counts.
//!
//! These are the two pieces of loop state the scheduler reads on every
//! iteration. Counts are owned by the orchestrator and only ever move
//! forward by one, on the branch that actually ran.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// The work type of a single iteration.
///
/// # Example
///
/// ```
/// use bizloop::iteration::Mode;
///
/// assert_eq!(Mode::Explore.to_string(), "explore");
/// assert_eq!(Mode::Deepen.other(), Mode::Explore);
/// ```
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Breadth: new directions and fresh ideas
    Explore,
    /// Depth: critique and refinement of existing ideas
    Deepen,
}

impl Mode {
    /// The opposite mode.
    #[must_use]
    pub fn other(&self) -> Self {
        match self {
            Self::Explore => Self::Deepen,
            Self::Deepen => Self::Explore,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Explore => write!(f, "explore"),
            Mode::Deepen => write!(f, "deepen"),
        }
    }
}

/// Running tallies of executed iterations per mode.
///
/// Serialized with the short keys `explore` / `deepen` used by the
/// on-disk iteration state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationCounts {
    /// Iterations executed in explore mode
    #[serde(rename = "explore", default)]
    pub explore_count: u64,
    /// Iterations executed in deepen mode
    #[serde(rename = "deepen", default)]
    pub deepen_count: u64,
}

impl IterationCounts {
    /// Create counts from explicit tallies.
    #[must_use]
    pub fn new(explore_count: u64, deepen_count: u64) -> Self {
        Self {
            explore_count,
            deepen_count,
        }
    }

    /// Total number of executed iterations.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.explore_count.saturating_add(self.deepen_count)
    }

    /// Count for a single mode.
    #[must_use]
    pub fn get(&self, mode: Mode) -> u64 {
        match mode {
            Mode::Explore => self.explore_count,
            Mode::Deepen => self.deepen_count,
        }
    }

    /// Record one completed iteration on the branch that actually ran.
    pub fn record(&mut self, mode: Mode) {
        match mode {
            Mode::Explore => self.explore_count = self.explore_count.saturating_add(1),
            Mode::Deepen => self.deepen_count = self.deepen_count.saturating_add(1),
        }
    }

    /// Fraction of iterations spent exploring, `None` before the first one.
    #[must_use]
    pub fn explore_share(&self) -> Option<f64> {
        if self.total() == 0 {
            return None;
        }
        let total = self.explore_count as f64 + self.deepen_count as f64;
        Some(self.explore_count as f64 / total)
    }
}
