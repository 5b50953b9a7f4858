//! Explore/deepen balancing.
//!
//! The balancer compares how far each mode lags behind its target share
//! of the iterations run so far and picks the mode that lags most:
//!
//! ```text
//! n        = explore + deepen
//! deficit  = ratio * n - count          (per mode)
//! next     = argmax(deficit), ties -> Explore
//! ```
//!
//! Because both deficits always sum to zero, the rule keeps the running
//! explore share within one iteration of `explore_ratio * n`.

use crate::error::{BizloopError, Result};
use crate::iteration::policy::IterationPolicy;
use crate::iteration::state::{IterationCounts, Mode};

/// Deficits closer than this are treated as a tie.
///
/// Keeps float rounding in `ratio * n` from turning an exact tie into a
/// spurious Deepen.
pub const TIE_EPSILON: f64 = 1e-9;

/// Target-vs-actual gap for each mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deficits {
    /// `explore_ratio * n - explore_count`
    pub explore: f64,
    /// `deepening_ratio * n - deepen_count`
    pub deepen: f64,
}

/// Compute both deficits for the given counts.
#[must_use]
pub fn deficits(explore_count: u64, deepen_count: u64, policy: &IterationPolicy) -> Deficits {
    // summed as floats so extreme counts cannot overflow
    let n = explore_count as f64 + deepen_count as f64;
    Deficits {
        explore: policy.explore_ratio() * n - explore_count as f64,
        deepen: policy.deepening_ratio() * n - deepen_count as f64,
    }
}

/// Pick the mode for the next iteration.
///
/// # Example
///
/// ```
/// use bizloop::iteration::{balancer, IterationPolicy, Mode};
///
/// let policy = IterationPolicy::new(0.6, 0.4, 0.6, 3).unwrap();
/// assert_eq!(balancer::next_mode(0, 0, &policy), Mode::Explore);
/// assert_eq!(balancer::next_mode(1, 0, &policy), Mode::Deepen);
/// ```
#[must_use]
pub fn next_mode(explore_count: u64, deepen_count: u64, policy: &IterationPolicy) -> Mode {
    let d = deficits(explore_count, deepen_count, policy);
    if d.deepen > d.explore + TIE_EPSILON {
        Mode::Deepen
    } else {
        Mode::Explore
    }
}

/// [`next_mode`] over an [`IterationCounts`].
#[must_use]
pub fn next_mode_for(counts: &IterationCounts, policy: &IterationPolicy) -> Mode {
    next_mode(counts.explore_count, counts.deepen_count, policy)
}

/// Signed entry point for callers holding counts from untyped sources.
///
/// # Errors
///
/// Returns [`BizloopError::InvariantViolation`] if either count is negative.
pub fn next_mode_checked(
    explore_count: i64,
    deepen_count: i64,
    policy: &IterationPolicy,
) -> Result<Mode> {
    let explore = u64::try_from(explore_count).map_err(|_| {
        BizloopError::invariant(format!("explore_count is negative: {explore_count}"))
    })?;
    let deepen = u64::try_from(deepen_count).map_err(|_| {
        BizloopError::invariant(format!("deepen_count is negative: {deepen_count}"))
    })?;
    Ok(next_mode(explore, deepen, policy))
}
