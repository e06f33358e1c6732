//! Error taxonomy.
//!
//! [`ParseError`] covers malformed or incomplete input and is raised before
//! any optimization starts. [`SchedError`] covers everything the optimizer
//! itself can reject. Deadline misses are not errors: they are reported as
//! data in [`Schedule`](crate::plan::Schedule) and folded into the cost.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed or incomplete problem input.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(String),

    /// An input file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required attribute is absent.
    #[error("<{element}> is missing attribute `{attribute}`")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    /// A numeric attribute does not hold a non-negative integer.
    #[error("<{element}> attribute `{attribute}` is not a non-negative integer: {value:?}")]
    InvalidNumber {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },

    /// An edge names a task that does not exist.
    #[error("edge {from} -> {to} references unknown task `{missing}`")]
    DanglingEdge {
        from: String,
        to: String,
        missing: String,
    },

    /// Two entities of the same kind share an identifier.
    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: &'static str, id: String },

    /// A task violates a timing invariant.
    #[error("task `{id}`: {reason}")]
    InvalidTask { id: String, reason: String },

    /// A chain is empty or names an unknown task.
    #[error("chain `{name}`: {reason}")]
    InvalidChain { name: String, reason: String },

    /// Offsets, WCETs and edge costs add up beyond the `u64` time range.
    #[error("task graph timing exceeds the representable time range")]
    TimeOverflow,
}

/// Errors raised by the optimizer and its data model.
#[derive(Debug, Error)]
pub enum SchedError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Lookup of an identifier that is not part of the model.
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },

    /// A plan references a task absent from the task graph.
    #[error("unknown task `{0}`")]
    UnknownTask(String),

    /// A plan references a core absent from the topology.
    #[error("unknown core `{0}`")]
    UnknownCore(String),

    /// A plan was built without an assignment for this task.
    #[error("task `{0}` has no core assignment")]
    Unassigned(String),

    /// The task graph is not a DAG.
    #[error("task graph has a cycle through {}", .tasks.join(", "))]
    CyclicDependency {
        /// Tasks that lie on (or behind) a cycle, in ascending id order.
        tasks: Vec<String>,
    },

    /// Tasks exist but the topology has no core to run them on.
    #[error("topology has no cores")]
    EmptyTopology,

    /// A task's affinity matches no core of the topology.
    #[error("task `{0}` has no eligible core")]
    NoEligibleCore(String),

    /// A plan places a task on a core its affinity excludes.
    #[error("task `{task}` may not run on core `{core}`")]
    AffinityViolation { task: String, core: String },

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
