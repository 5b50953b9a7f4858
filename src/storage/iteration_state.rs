//! Iteration state persistence layer.
//!
//! Counts and the stagnation history live in memory inside the scheduler
//! and orchestrator; this file carries them across process restarts.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::iteration::IterationCounts;

/// Current schema version for iteration state.
pub const STATE_VERSION: u32 = 1;

/// Minimum supported version for backward compatibility.
pub const MIN_STATE_VERSION: u32 = 1;

/// Default filename for iteration state inside `state/`.
pub const STATE_FILENAME: &str = "iteration_state.json";

fn current_version() -> u32 {
    STATE_VERSION
}

/// Everything the loop needs to resume where it left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationState {
    /// Schema version for forward compatibility.
    #[serde(default = "current_version")]
    pub version: u32,
    /// Executed iterations per mode.
    #[serde(flatten)]
    pub counts: IterationCounts,
    /// Stagnation detector history, oldest first.
    #[serde(default)]
    pub summaries: Vec<String>,
    /// Output of the last iteration, not yet shown to the detector.
    #[serde(default)]
    pub pending_summary: Option<String>,
    /// Most recently produced idea, target of shake-up tasks.
    #[serde(default)]
    pub last_idea_id: Option<String>,
    /// When this state was last saved.
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl Default for IterationState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            counts: IterationCounts::default(),
            summaries: Vec::new(),
            pending_summary: None,
            last_idea_id: None,
            last_updated: Utc::now(),
        }
    }
}

impl IterationState {
    /// Checks if the version is compatible.
    #[must_use]
    pub fn is_compatible_version(&self) -> bool {
        self.version >= MIN_STATE_VERSION && self.version <= STATE_VERSION
    }
}

/// Reads and writes `iteration_state.json`.
#[derive(Debug, Clone)]
pub struct StatePersistence {
    state_dir: PathBuf,
}

impl StatePersistence {
    /// Creates a persistence handler for the given `state/` directory.
    #[must_use]
    pub fn new<P: AsRef<Path>>(state_dir: P) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    /// Returns the path to the state file.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILENAME)
    }

    /// Saves iteration state to disk atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, state: &IterationState) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir)?;

        let mut state = state.clone();
        state.last_updated = Utc::now();

        let temp_path = self.state_dir.join(format!("{}.tmp", STATE_FILENAME));
        let json = serde_json::to_string_pretty(&state)?;
        std::fs::write(&temp_path, json)?;
        std::fs::rename(&temp_path, self.state_path())?;

        Ok(())
    }

    /// Loads iteration state from disk.
    ///
    /// Unreadable, corrupted, or incompatible files are logged and treated
    /// as absent so the loop can start fresh.
    #[must_use]
    pub fn load(&self) -> Option<IterationState> {
        let path = self.state_path();

        if !path.exists() {
            return None;
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to read iteration state file: {}", e);
                return None;
            }
        };

        let state: IterationState = match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                warn!("Iteration state file is corrupted, starting fresh: {}", e);
                return None;
            }
        };

        if !state.is_compatible_version() {
            warn!(
                "Iteration state version {} is incompatible, starting fresh",
                state.version
            );
            return None;
        }

        Some(state)
    }

    /// Loads iteration state or returns default if not found.
    #[must_use]
    pub fn load_or_default(&self) -> IterationState {
        self.load().unwrap_or_default()
    }

    /// Checks if the state file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.state_path().exists()
    }
}
