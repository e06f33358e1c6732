//! Task-to-core mapping for real-time task graphs.
//!
//! Given a task graph (tasks with WCET, period, deadline and an optional
//! CPU or core pin; precedence edges with communication cost; optional
//! end-to-end chains with a response budget) and a CPU/core topology,
//! searches for an assignment of tasks to eligible cores that minimizes a
//! weighted cost of deadline lateness, makespan, cross-core communication
//! and chain budget overruns.
//!
//! - **Model** ([`model`]): immutable [`TaskGraph`](model::TaskGraph) and
//!   [`Topology`](model::Topology).
//! - **Parser** ([`parser`]): XML application/architecture documents.
//! - **Plan** ([`plan`]): a candidate assignment and its derived schedule.
//! - **Cost** ([`cost`]): the annealing energy.
//! - **Neighbor** ([`neighbor`]): reassign/swap move operator.
//! - **Anneal** ([`anneal`]): the Metropolis simulated-annealing loop and
//!   the [`optimize`](anneal::optimize) entry point.
//!
//! # Example
//!
//! ```
//! use task_anneal::anneal::{optimize, AnnealConfig};
//! use task_anneal::model::{Cpu, Edge, Task, TaskGraph, Topology};
//!
//! let graph = TaskGraph::new(
//!     vec![Task::new("T1", "a", 2, 10, 10), Task::new("T2", "b", 3, 10, 10)],
//!     vec![Edge::new("T1", "T2", 1)],
//! )?;
//! let topology = Topology::new(vec![Cpu::new("cpu0", ["0", "1"])])?;
//!
//! let result = optimize(&graph, &topology, &AnnealConfig::default().with_seed(1))?;
//! assert!(result.schedule.is_feasible());
//! # Ok::<(), task_anneal::SchedError>(())
//! ```

pub mod anneal;
pub mod cost;
pub mod error;
pub mod model;
pub mod neighbor;
pub mod parser;
pub mod plan;

pub use error::{ParseError, SchedError};
