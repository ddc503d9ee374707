//! Content fingerprints for incremental builds
//!
//! - [`hasher`]: concurrent per-file SHA-256 digests combined into one
//!   deterministic directory digest
//! - [`ignore`]: nested ignore-file matching
//! - [`checksum`]: checksums over a target's declared input/output lists
//! - [`git`]: revision ids used as alternate cache keys

pub mod checksum;
pub mod git;
pub mod hasher;
pub mod ignore;

pub use checksum::Fingerprinter;
pub use hasher::{builtin_ignores, digest_bytes, digest_dir, no_ignore, IgnoreFn};
pub use self::ignore::IgnoreMatcher;
