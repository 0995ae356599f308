//! Domain types shared by every stage of the pipeline.

pub mod config;
pub mod fetch;
pub mod record;
pub mod summary;
pub mod target;
