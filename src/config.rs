//! Configuration loading for bizloop.
//!
//! Configuration lives in a directory (default `<base-dir>/config`) as two
//! JSON files:
//!
//! - `ip_profile.json` - the brand/IP persona ideas must fit
//! - `project_config.json` - project goals, constraints and the
//!   `iteration_policy` section consumed by the scheduler
//!
//! Both files are required. The iteration policy is validated into an
//! [`IterationPolicy`] before the loop starts; see [`validation`] for the
//! full report used by `bizloop config validate`.

pub mod validation;

pub use validation::{validate_configs, ConfigValidator, ValidationReport};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{BizloopError, Result};
use crate::iteration::IterationPolicy;

/// Filename of the IP profile inside the config directory.
pub const IP_PROFILE_FILENAME: &str = "ip_profile.json";

/// Filename of the project config inside the config directory.
pub const PROJECT_CONFIG_FILENAME: &str = "project_config.json";

/// Brand persona that every generated idea must respect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpProfile {
    pub ip_name: String,
    pub essence: String,
    pub visual_motifs: Vec<String>,
    pub core_personality: Vec<String>,
    pub taboos: Vec<String>,
    pub target_audience: String,
    pub brand_promise: String,
    pub canon_examples: Vec<String>,
}

/// Raw `iteration_policy` section as written in `project_config.json`.
///
/// Fields are optional only so that a missing one can be reported by name;
/// [`IterationPolicy::try_from`] rejects any absent field and enforces the
/// invariants. Unknown keys are preserved so they still reach the prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationPolicyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explore_ratio: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deepening_ratio: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stagnation_threshold: Option<f64>,

    /// Signed so that negative values surface as a validation error
    /// instead of a parse error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stagnation_runs: Option<i64>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IterationPolicyConfig {
    /// Names of the policy fields that are absent, in declaration order.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("explore_ratio", self.explore_ratio.is_none()),
            ("deepening_ratio", self.deepening_ratio.is_none()),
            ("stagnation_threshold", self.stagnation_threshold.is_none()),
            ("stagnation_runs", self.stagnation_runs.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, missing)| missing.then_some(field))
        .collect()
    }
}

/// Project settings loaded from `project_config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project_name: String,
    pub goal_type: String,
    #[serde(default)]
    pub constraints: BTreeMap<String, String>,
    #[serde(default)]
    pub idea_templates: Vec<String>,
    #[serde(default)]
    pub iteration_policy: IterationPolicyConfig,
}

impl ProjectConfig {
    /// Build the validated scheduling policy.
    ///
    /// # Errors
    ///
    /// Returns [`BizloopError::InvalidConfig`] if the section violates a
    /// policy invariant.
    pub fn policy(&self) -> Result<IterationPolicy> {
        IterationPolicy::try_from(&self.iteration_policy)
    }
}

/// Path of the IP profile in a config directory.
pub fn ip_profile_path(config_dir: &Path) -> PathBuf {
    config_dir.join(IP_PROFILE_FILENAME)
}

/// Path of the project config in a config directory.
pub fn project_config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(PROJECT_CONFIG_FILENAME)
}

/// Load an IP profile from a JSON file.
pub fn load_ip_profile(path: &Path) -> Result<IpProfile> {
    load_json(path)
}

/// Load a project config from a JSON file.
pub fn load_project_config(path: &Path) -> Result<ProjectConfig> {
    load_json(path)
}

/// Load both configuration files from `config_dir`.
///
/// # Errors
///
/// Returns [`BizloopError::MissingFile`] if either file is absent and
/// [`BizloopError::Config`] if one cannot be parsed.
pub fn load_configs(config_dir: &Path) -> Result<(IpProfile, ProjectConfig)> {
    let ip_path = ip_profile_path(config_dir);
    let project_path = project_config_path(config_dir);

    for path in [&ip_path, &project_path] {
        if !path.exists() {
            return Err(BizloopError::MissingFile { path: path.clone() });
        }
    }

    Ok((load_ip_profile(&ip_path)?, load_project_config(&project_path)?))
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        BizloopError::config_with_path(format!("cannot read file: {e}"), path.to_path_buf())
    })?;
    serde_json::from_str(&content).map_err(|e| {
        BizloopError::config_with_path(
            format!(
                "{} is invalid: {} (line {}, column {})",
                path.display(),
                e,
                e.line(),
                e.column()
            ),
            path.to_path_buf(),
        )
    })
}
