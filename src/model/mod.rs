//! Immutable problem inputs.
//!
//! - [`TaskGraph`]: tasks with timing parameters and precedence edges,
//!   plus optional end-to-end [`Chain`]s
//! - [`Topology`]: CPUs and their cores
//!
//! Both are built once, validated at construction, and only borrowed by
//! the optimizer afterwards.

mod chain;
mod task;
mod topology;

pub use chain::Chain;
pub use task::{Affinity, Edge, Task, TaskGraph};
pub use topology::{Core, CoreId, Cpu, Topology};
