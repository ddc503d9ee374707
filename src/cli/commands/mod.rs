//! CLI command implementations

pub mod cache;
pub mod hash;
pub mod list;
pub mod run;

pub use cache::execute as cache;
pub use hash::execute as hash;
pub use list::execute as list;
pub use run::execute as run;
