//! gbuild - incremental local build orchestrator
//!
//! Runs named targets concurrently in dependency order and skips the ones
//! whose inputs match a previously cached build.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod fingerprint;

pub use error::{GbuildError, GbuildResult};
