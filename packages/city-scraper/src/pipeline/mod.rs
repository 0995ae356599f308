//! Run pipeline.
//!
//! - `plan` - expand source templates into targets
//! - `orchestrator` - worker pool driving each target to a terminal state
//! - `run` - the `Scraper` entry point tying config, pipeline and export together

pub mod orchestrator;
pub mod plan;
pub mod run;

pub use orchestrator::{Checkpoint, Orchestrator};
pub use plan::plan_targets;
pub use run::{RunReport, Scraper};
