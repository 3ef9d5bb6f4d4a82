//! # Stagehand Common
//!
//! Types shared by every stagehand crate:
//! - The [`Error`] enum covering registration, environment, contract,
//!   initialization and teardown failures
//! - The [`Result`] alias used throughout the workspace

pub mod errors;

pub use errors::{Error, Result};
