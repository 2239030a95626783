//! # stagehand-sequence
//!
//! Named, reusable task sequences over a [`stagehand_core::Repository`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use serde_json::json;
//! use stagehand_core::Repository;
//! use stagehand_sequence::TaskSequences;
//!
//! fn plan(repo: &Repository) -> Result<(), stagehand_sequence::SequenceError> {
//!     let sequences = TaskSequences::load_file(Path::new("tasks.yaml"))?;
//!     let query = json!({"app": {"tags": ["web"]}});
//!     for command in sequences.resolve(repo, &query, "deploy_app")? {
//!         println!("{command}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod arguments;
pub mod command;
pub mod error;
pub mod sequence;
pub mod template;

pub use arguments::{ContextRow, TaskSequenceArguments, TaskSequenceQuery};
pub use command::Command;
pub use error::SequenceError;
pub use sequence::{RunSummary, SubTaskSequence, TaskSequence, TaskSequences};
pub use template::CommandTemplates;
