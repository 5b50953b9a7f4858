//! Iteration scheduling.
//!
//! This module decides which mode each loop iteration runs in:
//!
//! - [`policy`] - Validated ratios and stagnation settings
//! - [`state`] - Modes and cumulative counts
//! - [`balancer`] - Deficit-maximizing explore/deepen balancing
//! - [`scheduler`] - Combines the balancer with stagnation detection
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐  counts   ┌─────────────┐
//! │IterationScheduler │──────────>│  balancer   │──> baseline mode
//! │                   │           └─────────────┘
//! │                   │  summary  ┌─────────────┐
//! │                   │──────────>│ Stagnation  │──> stalled?
//! └───────────────────┘           │ Detector    │
//!          │                      └─────────────┘
//!          v
//!      Decision { mode, baseline, stalled, shake_up_required }
//! ```

pub mod balancer;
pub mod policy;
pub mod scheduler;
pub mod state;

pub use policy::IterationPolicy;
pub use scheduler::{Decision, IterationScheduler};
pub use state::{IterationCounts, Mode};
