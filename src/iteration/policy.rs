//! Validated iteration policy.
//!
//! [`IterationPolicy`] can only be obtained through [`IterationPolicy::new`]
//! (or the conversion from the raw config section), so every holder of one
//! may rely on its invariants without re-checking them per iteration.

use serde::Serialize;

use crate::config::IterationPolicyConfig;
use crate::error::{BizloopError, Result};

/// Tolerance for `explore_ratio + deepening_ratio == 1.0`.
pub const RATIO_SUM_TOLERANCE: f64 = 1e-6;

/// Default share of explore iterations.
pub const DEFAULT_EXPLORE_RATIO: f64 = 0.5;

/// Default similarity at or above which two summaries count as repetitive.
pub const DEFAULT_STAGNATION_THRESHOLD: f64 = 0.6;

/// Default number of consecutive similar comparisons that means "stalled".
pub const DEFAULT_STAGNATION_RUNS: usize = 3;

/// Immutable scheduling configuration.
///
/// # Example
///
/// ```
/// use bizloop::iteration::IterationPolicy;
///
/// let policy = IterationPolicy::new(0.6, 0.4, 0.6, 3).unwrap();
/// assert_eq!(policy.history_capacity(), 4);
///
/// assert!(IterationPolicy::new(0.6, 0.6, 0.6, 3).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IterationPolicy {
    explore_ratio: f64,
    deepening_ratio: f64,
    stagnation_threshold: f64,
    stagnation_runs: usize,
}

impl IterationPolicy {
    /// Validate and build a policy.
    ///
    /// # Errors
    ///
    /// Returns [`BizloopError::InvalidConfig`] if:
    /// - a ratio is not finite or outside [0, 1]
    /// - the ratios do not sum to 1.0 within [`RATIO_SUM_TOLERANCE`]
    /// - the threshold is not finite or outside [0, 1]
    /// - `stagnation_runs` is zero
    pub fn new(
        explore_ratio: f64,
        deepening_ratio: f64,
        stagnation_threshold: f64,
        stagnation_runs: usize,
    ) -> Result<Self> {
        check_unit_interval("explore_ratio", explore_ratio)?;
        check_unit_interval("deepening_ratio", deepening_ratio)?;

        let sum = explore_ratio + deepening_ratio;
        if (sum - 1.0).abs() > RATIO_SUM_TOLERANCE {
            return Err(BizloopError::invalid_config(
                "explore_ratio",
                format!("explore_ratio and deepening_ratio must sum to 1.0 (got {sum})"),
            ));
        }

        check_unit_interval("stagnation_threshold", stagnation_threshold)?;

        if stagnation_runs < 1 {
            return Err(BizloopError::invalid_config(
                "stagnation_runs",
                "must be at least 1",
            ));
        }

        Ok(Self {
            explore_ratio,
            deepening_ratio,
            stagnation_threshold,
            stagnation_runs,
        })
    }

    /// Share of iterations that should explore.
    #[must_use]
    pub fn explore_ratio(&self) -> f64 {
        self.explore_ratio
    }

    /// Share of iterations that should deepen.
    #[must_use]
    pub fn deepening_ratio(&self) -> f64 {
        self.deepening_ratio
    }

    /// Minimum similarity for a comparison to count toward a stall.
    #[must_use]
    pub fn stagnation_threshold(&self) -> f64 {
        self.stagnation_threshold
    }

    /// Consecutive similar comparisons needed to declare a stall.
    #[must_use]
    pub fn stagnation_runs(&self) -> usize {
        self.stagnation_runs
    }

    /// Number of summaries the detector retains: one more than the
    /// number of comparisons in a full run.
    #[must_use]
    pub fn history_capacity(&self) -> usize {
        self.stagnation_runs + 1
    }
}

impl Default for IterationPolicy {
    fn default() -> Self {
        Self {
            explore_ratio: DEFAULT_EXPLORE_RATIO,
            deepening_ratio: 1.0 - DEFAULT_EXPLORE_RATIO,
            stagnation_threshold: DEFAULT_STAGNATION_THRESHOLD,
            stagnation_runs: DEFAULT_STAGNATION_RUNS,
        }
    }
}

impl TryFrom<&IterationPolicyConfig> for IterationPolicy {
    type Error = BizloopError;

    /// Validate the raw section. All four policy fields must be present.
    fn try_from(raw: &IterationPolicyConfig) -> Result<Self> {
        let explore = required("explore_ratio", raw.explore_ratio)?;
        let deepen = required("deepening_ratio", raw.deepening_ratio)?;
        let threshold = required("stagnation_threshold", raw.stagnation_threshold)?;

        let runs = match required("stagnation_runs", raw.stagnation_runs)? {
            r if r < 1 => {
                return Err(BizloopError::invalid_config(
                    "stagnation_runs",
                    format!("must be at least 1 (got {r})"),
                ))
            }
            r => usize::try_from(r).map_err(|_| {
                BizloopError::invalid_config("stagnation_runs", format!("out of range: {r}"))
            })?,
        };

        Self::new(explore, deepen, threshold, runs)
    }
}

fn required<T>(field: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| BizloopError::invalid_config(field, "is required"))
}

fn check_unit_interval(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(BizloopError::invalid_config(field, "must be a finite number"));
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(BizloopError::invalid_config(
            field,
            format!("must be between 0.0 and 1.0 (got {value})"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: BizloopError) -> String {
        match err {
            BizloopError::InvalidConfig { field, .. } => field,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_policy() {
        let policy = IterationPolicy::new(0.7, 0.3, 0.6, 3).unwrap();
        assert!((policy.explore_ratio() - 0.7).abs() < f64::EPSILON);
        assert!((policy.deepening_ratio() - 0.3).abs() < f64::EPSILON);
        assert_eq!(policy.stagnation_runs(), 3);
        assert_eq!(policy.history_capacity(), 4);
    }

    #[test]
    fn test_ratios_must_sum_to_one() {
        let err = IterationPolicy::new(0.5, 0.4, 0.6, 3).unwrap_err();
        assert_eq!(field_of(err), "explore_ratio");

        // Within tolerance
        assert!(IterationPolicy::new(0.1 + 0.2, 0.7, 0.6, 3).is_ok());
        assert!(IterationPolicy::new(0.6 + 5e-7, 0.4, 0.6, 3).is_ok());
        assert!(IterationPolicy::new(0.6 + 5e-6, 0.4, 0.6, 3).is_err());
    }

    #[test]
    fn test_extreme_ratios_are_legal() {
        assert!(IterationPolicy::new(1.0, 0.0, 0.6, 1).is_ok());
        assert!(IterationPolicy::new(0.0, 1.0, 0.6, 1).is_ok());
    }

    #[test]
    fn test_negative_ratio_rejected() {
        let err = IterationPolicy::new(1.2, -0.2, 0.6, 3).unwrap_err();
        assert_eq!(field_of(err), "explore_ratio");

        let err = IterationPolicy::new(0.5, f64::NAN, 0.6, 3).unwrap_err();
        assert_eq!(field_of(err), "deepening_ratio");
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(IterationPolicy::new(0.5, 0.5, 0.0, 3).is_ok());
        assert!(IterationPolicy::new(0.5, 0.5, 1.0, 3).is_ok());

        let err = IterationPolicy::new(0.5, 0.5, 1.01, 3).unwrap_err();
        assert_eq!(field_of(err), "stagnation_threshold");
        let err = IterationPolicy::new(0.5, 0.5, -0.1, 3).unwrap_err();
        assert_eq!(field_of(err), "stagnation_threshold");
        let err = IterationPolicy::new(0.5, 0.5, f64::INFINITY, 3).unwrap_err();
        assert_eq!(field_of(err), "stagnation_threshold");
    }

    #[test]
    fn test_runs_must_be_positive() {
        let err = IterationPolicy::new(0.5, 0.5, 0.6, 0).unwrap_err();
        assert_eq!(field_of(err), "stagnation_runs");
        assert!(IterationPolicy::new(0.5, 0.5, 0.6, 1).is_ok());
    }

    fn complete() -> IterationPolicyConfig {
        IterationPolicyConfig {
            explore_ratio: Some(0.6),
            deepening_ratio: Some(0.4),
            stagnation_threshold: Some(0.6),
            stagnation_runs: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_config_complete() {
        let policy = IterationPolicy::try_from(&complete()).unwrap();
        assert_eq!(policy, IterationPolicy::new(0.6, 0.4, 0.6, 3).unwrap());
    }

    #[test]
    fn test_from_config_rejects_empty_section() {
        let err = IterationPolicy::try_from(&IterationPolicyConfig::default()).unwrap_err();
        assert_eq!(field_of(err), "explore_ratio");
    }

    #[test]
    fn test_from_config_rejects_each_missing_field() {
        let cases: [(&str, fn(&mut IterationPolicyConfig)); 4] = [
            ("explore_ratio", |raw| raw.explore_ratio = None),
            ("deepening_ratio", |raw| raw.deepening_ratio = None),
            ("stagnation_threshold", |raw| raw.stagnation_threshold = None),
            ("stagnation_runs", |raw| raw.stagnation_runs = None),
        ];
        for (field, clear) in cases {
            let mut raw = complete();
            clear(&mut raw);
            let err = IterationPolicy::try_from(&raw).unwrap_err();
            assert!(err.to_string().contains("is required"), "{err}");
            assert_eq!(field_of(err), field);
        }
    }

    #[test]
    fn test_from_config_single_ratio_rejected() {
        let raw = IterationPolicyConfig {
            deepening_ratio: None,
            ..complete()
        };
        assert!(IterationPolicy::try_from(&raw).is_err());
    }

    #[test]
    fn test_from_config_rejects_negative_runs() {
        let raw = IterationPolicyConfig {
            stagnation_runs: Some(-2),
            ..complete()
        };
        let err = IterationPolicy::try_from(&raw).unwrap_err();
        assert_eq!(field_of(err), "stagnation_runs");
    }

    #[test]
    fn test_from_config_rejects_bad_sum() {
        let raw = IterationPolicyConfig {
            explore_ratio: Some(0.6),
            deepening_ratio: Some(0.6),
            ..complete()
        };
        assert!(IterationPolicy::try_from(&raw).is_err());
    }
}
