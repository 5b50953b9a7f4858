//! Prompt assembly for the idea loop.
//!
//! Every iteration sends three messages to the model. The task type picks
//! a [`Role`], and [`PromptBuilder`] renders the IP profile, project
//! settings and task context around it.
//!
//! # Example
//!
//! ```rust,ignore
//! use bizloop::prompt::PromptBuilder;
//!
//! let builder = PromptBuilder::new(ip_profile, project_config);
//! let request = builder.build(&task, &related_ideas, &recent_summaries);
//! let raw = client.run(&request).await?;
//! ```

pub mod builder;
pub mod role;

pub use builder::PromptBuilder;
pub use role::Role;
