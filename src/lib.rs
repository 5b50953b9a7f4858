//! bizloop - brand-aligned business idea loop
//!
//! Drives a local Harmony-format model through repeated iterations that
//! generate, critique and refine business ideas for one IP, balancing
//! exploration against deepening and breaking out of repetitive output.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`iteration`] - Mode balancing and the per-iteration scheduler
//! - [`stagnation`] - Similarity scoring and stall detection
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types and handling
//! - [`models`] - Ideas, tasks and iteration logs
//! - [`storage`] - Filesystem layout and persisted loop state
//! - [`queue`] - Task selection and shake-up tasks
//! - [`prompt`] - Role-based Harmony prompt assembly
//! - [`llm`] - Model client trait, Harmony backend and reply parsing
//! - [`agent`] - The orchestrator tying it all together
//!
//! # Example
//!
//! ```rust,ignore
//! use bizloop::agent::AgentLoop;
//! use bizloop::llm::HarmonyClient;
//!
//! let mut agent = AgentLoop::from_config_dir(".", "config")?;
//! agent.initialize()?;
//!
//! let client = HarmonyClient::new();
//! let outcome = agent.run_next(&client).await?;
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod iteration;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod queue;
pub mod stagnation;
pub mod storage;

// Re-export commonly used types
pub use error::{BizloopError, IntoBizloopError, Result};

// Re-export core scheduling types
pub use iteration::{Decision, IterationCounts, IterationPolicy, IterationScheduler, Mode};
pub use stagnation::{similarity, StagnationDetector};

// Re-export orchestration types
pub use agent::{AgentContext, AgentLoop, AgentStatus, IterationOutcome, IterationReport};
pub use config::{IpProfile, ProjectConfig};
pub use llm::{HarmonyClient, MockModelClient, ModelClient, ModelRequest, ModelResponse};
pub use storage::StateStore;
