//! Core trait abstractions for the scraping pipeline.
//!
//! These traits are the seams where network access, parsing and
//! persistence can be swapped (real HTTP vs. scripted mocks, CSV vs. SQLite).

pub mod extractor;
pub mod sink;
pub mod transport;
