//! Configuration validation for bizloop.
//!
//! This module checks a config directory before the loop is allowed to
//! start: JSON syntax, required fields, and the iteration policy
//! invariants.
//!
//! # Example
//!
//! ```rust,ignore
//! use bizloop::config::ConfigValidator;
//! use std::path::Path;
//!
//! let report = ConfigValidator::new(Path::new("config")).validate()?;
//!
//! if !report.is_valid() {
//!     for error in &report.errors {
//!         eprintln!("Error: {}", error);
//!     }
//!     std::process::exit(report.exit_code());
//! }
//! ```

use std::path::{Path, PathBuf};

use super::{ip_profile_path, project_config_path, IpProfile, ProjectConfig};
use crate::error::{BizloopError, Result};

/// Result of configuration validation.
///
/// Contains all errors and warnings found during validation, along with
/// the files that were checked.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Errors that prevent the loop from starting.
    pub errors: Vec<String>,
    /// Warnings that don't prevent validity but indicate potential issues.
    pub warnings: Vec<String>,
    /// Files that were validated.
    pub files_checked: Vec<PathBuf>,
}

impl ValidationReport {
    /// Create a new empty validation report.
    ///
    /// An empty report is considered valid.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the configuration is valid (no errors).
    ///
    /// Warnings do not affect validity.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns 0 if valid, 1 if invalid.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_valid() {
            0
        } else {
            1
        }
    }

    /// Generate a human-readable summary of the validation result.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_valid() {
            if self.warnings.is_empty() {
                "Configuration is valid.".to_string()
            } else {
                format!(
                    "Configuration is valid with {} warning(s).",
                    self.warnings.len()
                )
            }
        } else {
            format!(
                "Configuration is invalid with {} error(s).",
                self.errors.len()
            )
        }
    }

    /// Generate a verbose report including all details.
    #[must_use]
    pub fn verbose_report(&self) -> String {
        let mut lines = vec![
            "Configuration Validation Report".to_string(),
            "\u{2500}".repeat(50),
        ];

        if !self.files_checked.is_empty() {
            lines.push(String::new());
            lines.push(format!("Files checked ({}):", self.files_checked.len()));
            for file in &self.files_checked {
                lines.push(format!("  - {}", file.display()));
            }
        }

        if !self.errors.is_empty() {
            lines.push(String::new());
            lines.push(format!("Errors ({}):", self.errors.len()));
            for error in &self.errors {
                lines.push(format!("  \u{2717} {}", error));
            }
        }

        if !self.warnings.is_empty() {
            lines.push(String::new());
            lines.push(format!("Warnings ({}):", self.warnings.len()));
            for warning in &self.warnings {
                lines.push(format!("  \u{26a0} {}", warning));
            }
        }

        lines.push(String::new());
        lines.push(format!("Status: {}", self.summary()));

        lines.join("\n")
    }

    fn check(&mut self, ip: &IpProfile, project: &ProjectConfig) {
        let required = [
            ("ip_profile.ip_name", ip.ip_name.as_str()),
            ("ip_profile.essence", ip.essence.as_str()),
            ("ip_profile.target_audience", ip.target_audience.as_str()),
            ("ip_profile.brand_promise", ip.brand_promise.as_str()),
            ("project_config.project_name", project.project_name.as_str()),
            ("project_config.goal_type", project.goal_type.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                self.errors.push(format!("{} must not be empty", field));
            }
        }

        if project.idea_templates.is_empty() {
            self.warnings
                .push("project_config.idea_templates is empty - ideas will be unstructured".to_string());
        }
        if ip.taboos.is_empty() {
            self.warnings
                .push("ip_profile.taboos is empty - no content restrictions".to_string());
        }

        let missing = project.iteration_policy.missing_fields();
        if !missing.is_empty() {
            for field in missing {
                self.errors
                    .push(format!("project_config.iteration_policy.{} is required", field));
            }
        } else if let Err(e) = project.policy() {
            self.errors.push(format!("iteration_policy: {}", e));
        }
    }
}

/// Validate already-loaded configuration.
///
/// # Errors
///
/// Returns the first error as [`BizloopError::InvalidConfig`] (policy
/// violations) or [`BizloopError::Config`] (required fields).
pub fn validate_configs(ip: &IpProfile, project: &ProjectConfig) -> Result<()> {
    project.policy()?;

    let mut report = ValidationReport::new();
    report.check(ip, project);
    match report.errors.into_iter().next() {
        Some(error) => Err(BizloopError::config(error)),
        None => Ok(()),
    }
}

/// Validates a configuration directory.
#[derive(Debug, Clone)]
pub struct ConfigValidator {
    config_dir: PathBuf,
}

impl ConfigValidator {
    /// Create a new validator for the given config directory.
    #[must_use]
    pub fn new(config_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
        }
    }

    /// Validate the configuration and return a detailed report.
    ///
    /// # Errors
    ///
    /// Returns an error only for unexpected I/O failures. Validation errors
    /// are reported in the `ValidationReport`.
    pub fn validate(&self) -> anyhow::Result<ValidationReport> {
        let mut report = ValidationReport::new();

        let ip = self.parse::<IpProfile>(&ip_profile_path(&self.config_dir), &mut report)?;
        let project =
            self.parse::<ProjectConfig>(&project_config_path(&self.config_dir), &mut report)?;

        if let (Some(ip), Some(project)) = (ip, project) {
            report.check(&ip, &project);
        }

        Ok(report)
    }

    fn parse<T: serde::de::DeserializeOwned>(
        &self,
        path: &Path,
        report: &mut ValidationReport,
    ) -> anyhow::Result<Option<T>> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if !path.exists() {
            report.errors.push(format!("{} not found", name));
            return Ok(None);
        }
        report.files_checked.push(path.to_path_buf());

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<T>(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                report.errors.push(format!(
                    "{} error: {} (parse failed at line {}, column {})",
                    name,
                    e,
                    e.line(),
                    e.column()
                ));
                Ok(None)
            }
        }
    }
}
