//! Resumable, batched collection of per-app data from Steam-related APIs and pages.
//!
//! The app list is walked in fixed-size batches. Every batch is appended to a CSV
//! sink in one piece and only then is the checkpoint advanced, so a run can be
//! stopped at any point and resumed from the checkpoint without gaps or duplicates.

pub mod apps;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod entity;
mod error;
pub mod logging;
mod macros;
pub mod parse;
pub mod process;
pub mod request;
pub mod sink;
pub mod sources;
pub mod strategy;

pub use error::{Error, Result};
