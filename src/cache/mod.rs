//! Artifact cache for target outputs
//!
//! Targets declare cache rules: a list of inputs and the outputs they
//! produce. Outputs are archived after a successful build and keyed by the
//! input checksum (and, on a clean tree, by the revision that last touched
//! the inputs). A later run whose inputs match restores the outputs instead
//! of running the command.
//!
//! # Keys
//!
//! | Key | Value | Recorded when |
//! |-----|-------|---------------|
//! | input checksum | output checksum | always |
//! | revision id | output checksum | working tree has no uncommitted changes |
//!
//! The output checksum doubles as the artifact id, so outputs that are
//! already on disk are recognized without fetching anything.

pub mod archive;
pub mod factory;
pub mod http;
pub mod index;
pub mod local;
pub mod manager;
pub mod provider;
pub mod state;

pub use factory::create_provider;
pub use index::CacheIndex;
pub use manager::{CacheManager, LoadReport, PutReport, WORK_DIR};
pub use provider::CacheProvider;
pub use state::CacheState;
