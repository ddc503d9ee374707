//! Plan execution
//!
//! - [`log`]: the result log, owned by one task and reached by messages
//! - [`process`]: one attempt of a target's command plus its watcher
//! - [`scheduler`]: dependency gating, retries and fail-fast cancellation
//! - [`plan`]: cache load, scheduling and cache put for a whole plan

pub mod log;
pub mod plan;
pub mod process;
pub mod result;
pub mod scheduler;

pub use log::ResultLog;
pub use plan::{PlanReport, PlanRunner};
pub use result::{TargetError, TargetResult, TargetStatus};
pub use scheduler::Scheduler;
