//! Task registry: canonical set of tasks and their state.
//!
//! The registry is owned by the scheduler engine (single writer). Live
//! counters (queued, active) are derived from the records; terminal tallies
//! are kept alongside so they survive retention sweeps.

mod store;
mod task;

pub use store::{Accepted, Tally, TaskRegistry};
pub(crate) use store::Finish;
pub use task::{Priority, Task, TaskId, TaskInput, TaskState, TaskView};
