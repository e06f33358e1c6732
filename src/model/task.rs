//! Tasks, communication edges and the task graph.

use super::chain::Chain;
use super::topology::CoreId;
use crate::error::{ParseError, SchedError};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Cores a task may be mapped to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Affinity {
    /// Any core of any CPU.
    #[default]
    Any,
    /// Any core of the named CPU.
    Cpu(String),
    /// Exactly this core.
    Core(CoreId),
}

impl Affinity {
    /// `true` when `core` satisfies the pin.
    pub fn admits(&self, core: &CoreId) -> bool {
        match self {
            Affinity::Any => true,
            Affinity::Cpu(cpu) => core.cpu == *cpu,
            Affinity::Core(id) => core == id,
        }
    }
}

/// A periodic real-time task.
///
/// Times are integral units (the input documents use microseconds).
/// The absolute deadline of the single job considered by the optimizer is
/// `offset + deadline`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Task {
    id: String,
    name: String,
    wcet: u64,
    period: u64,
    deadline: u64,
    offset: u64,
    affinity: Affinity,
}

impl Task {
    /// Creates a task released at time 0.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        wcet: u64,
        period: u64,
        deadline: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            wcet,
            period,
            deadline,
            offset: 0,
            affinity: Affinity::Any,
        }
    }

    /// Sets the earliest activation time within the period.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Restricts the task to a CPU or a single core.
    pub fn with_affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Worst-case execution time.
    pub fn wcet(&self) -> u64 {
        self.wcet
    }

    /// Minimum inter-arrival time.
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Deadline relative to release.
    pub fn deadline(&self) -> u64 {
        self.deadline
    }

    /// Release time (earliest start).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn affinity(&self) -> &Affinity {
        &self.affinity
    }

    /// Release plus relative deadline.
    pub fn absolute_deadline(&self) -> u64 {
        // Bounded by the check in `TaskGraph::new`.
        self.offset.saturating_add(self.deadline)
    }

    fn check(&self) -> Result<(), ParseError> {
        let reason = if self.period == 0 {
            "period must be positive".to_string()
        } else if self.deadline == 0 {
            "deadline must be positive".to_string()
        } else if self.deadline < self.wcet {
            format!(
                "deadline {} is shorter than WCET {}",
                self.deadline, self.wcet
            )
        } else if self.offset.checked_add(self.deadline).is_none() {
            format!(
                "offset {} plus deadline {} overflows the time range",
                self.offset, self.deadline
            )
        } else {
            return Ok(());
        };
        Err(ParseError::InvalidTask {
            id: self.id.clone(),
            reason,
        })
    }
}

/// Directed precedence edge carrying a communication cost.
///
/// The cost is paid only when source and destination run on different cores.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Edge {
    source: String,
    dest: String,
    cost: u64,
    group: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, dest: impl Into<String>, cost: u64) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            cost,
            group: None,
        }
    }

    /// Tags the edge with the name of the task-graph group it belongs to.
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn dest(&self) -> &str {
        &self.dest
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }
}

/// Immutable task graph.
///
/// Tasks are stored in ascending id order; that order is also the
/// tie-break used by [`topological_order`](TaskGraph::topological_order).
/// Cycles are accepted at construction and reported when an ordering is
/// requested.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    /// Resolved `(source, dest)` task indices, parallel to `edges`.
    ends: Vec<(usize, usize)>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    /// Topological order, or the tasks stuck behind a cycle.
    order: Result<Vec<usize>, Vec<usize>>,
    /// Latest possible finish time of any task under any mapping.
    horizon: u64,
    chains: Vec<Chain>,
    /// Resolved task indices per chain, parallel to `chains`.
    chain_tasks: Vec<Vec<usize>>,
}

impl TaskGraph {
    /// Builds a graph from tasks and edges.
    ///
    /// # Errors
    /// Duplicate task ids, tasks violating `0 < period`, `0 < deadline`,
    /// `wcet <= deadline`, edges naming unknown tasks, and instances whose
    /// timing can exceed `u64` ([`ParseError::TimeOverflow`]).
    pub fn new(mut tasks: Vec<Task>, edges: Vec<Edge>) -> Result<Self, ParseError> {
        tasks.sort_by(|a, b| a.id.cmp(&b.id));

        let mut index = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            task.check()?;
            if index.insert(task.id.clone(), i).is_some() {
                return Err(ParseError::DuplicateId {
                    kind: "task",
                    id: task.id.clone(),
                });
            }
        }

        let mut ends = Vec::with_capacity(edges.len());
        let mut outgoing = vec![Vec::new(); tasks.len()];
        let mut incoming = vec![Vec::new(); tasks.len()];
        for (e, edge) in edges.iter().enumerate() {
            let resolve = |id: &str| {
                index.get(id).copied().ok_or_else(|| ParseError::DanglingEdge {
                    from: edge.source.clone(),
                    to: edge.dest.clone(),
                    missing: id.to_string(),
                })
            };
            let s = resolve(&edge.source)?;
            let d = resolve(&edge.dest)?;
            ends.push((s, d));
            outgoing[s].push(e);
            incoming[d].push(e);
        }

        let order = kahn_order(tasks.len(), &ends, &outgoing);
        let horizon = horizon(&tasks, &edges).ok_or(ParseError::TimeOverflow)?;

        let graph = Self {
            tasks,
            index,
            edges,
            ends,
            outgoing,
            incoming,
            order,
            horizon,
            chains: Vec::new(),
            chain_tasks: Vec::new(),
        };
        graph.check_sums()?;
        Ok(graph)
    }

    /// Attaches end-to-end chains.
    ///
    /// # Errors
    /// Duplicate chain names, empty chains, and chains naming unknown
    /// tasks.
    pub fn with_chains(mut self, chains: Vec<Chain>) -> Result<Self, ParseError> {
        let mut names = HashSet::with_capacity(chains.len());
        let mut chain_tasks = Vec::with_capacity(chains.len());
        for chain in &chains {
            if !names.insert(chain.name()) {
                return Err(ParseError::DuplicateId {
                    kind: "chain",
                    id: chain.name().to_string(),
                });
            }
            let invalid = |reason: String| ParseError::InvalidChain {
                name: chain.name().to_string(),
                reason,
            };
            if chain.runnables().is_empty() {
                return Err(invalid("chain has no runnables".into()));
            }
            let resolved = chain
                .runnables()
                .iter()
                .map(|id| {
                    self.index_of(id)
                        .ok_or_else(|| invalid(format!("unknown task `{id}`")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            chain_tasks.push(resolved);
        }
        drop(names);
        self.chains = chains;
        self.chain_tasks = chain_tasks;
        self.check_sums()?;
        Ok(self)
    }

    /// Looks up a task by id.
    pub fn task(&self, id: &str) -> Result<&Task, SchedError> {
        self.index_of(id)
            .map(|i| &self.tasks[i])
            .ok_or_else(|| SchedError::NotFound {
                kind: "task",
                id: id.to_string(),
            })
    }

    /// All tasks in ascending id order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// All task ids in ascending order.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.id.as_str())
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges leaving `id`.
    pub fn outgoing(&self, id: &str) -> Result<impl Iterator<Item = &Edge>, SchedError> {
        let i = self.require(id)?;
        Ok(self.outgoing[i].iter().map(move |&e| &self.edges[e]))
    }

    /// Edges entering `id`.
    pub fn incoming(&self, id: &str) -> Result<impl Iterator<Item = &Edge>, SchedError> {
        let i = self.require(id)?;
        Ok(self.incoming[i].iter().map(move |&e| &self.edges[e]))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_acyclic(&self) -> bool {
        self.order.is_ok()
    }

    /// Task ids in precedence order, ties broken by ascending id.
    ///
    /// # Errors
    /// [`SchedError::CyclicDependency`] listing the tasks that could not be
    /// ordered.
    pub fn topological_order(&self) -> Result<Vec<&str>, SchedError> {
        Ok(self
            .order_indices()?
            .iter()
            .map(|&i| self.tasks[i].id.as_str())
            .collect())
    }

    /// End-to-end chains in declaration order.
    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    /// Total processor utilization, `Σ wcet / period`.
    pub fn utilization(&self) -> f64 {
        self.tasks
            .iter()
            .map(|t| t.wcet as f64 / t.period as f64)
            .sum()
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn order_indices(&self) -> Result<&[usize], SchedError> {
        self.order
            .as_deref()
            .map_err(|stuck| SchedError::CyclicDependency {
                tasks: stuck.iter().map(|&i| self.tasks[i].id.clone()).collect(),
            })
    }

    /// `(source index, edge cost)` for every edge entering task `i`.
    pub(crate) fn predecessors(&self, i: usize) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.incoming[i]
            .iter()
            .map(move |&e| (self.ends[e].0, self.edges[e].cost))
    }

    /// Resolved task indices of every chain, parallel to [`chains`](Self::chains).
    pub(crate) fn chain_indices(&self) -> &[Vec<usize>] {
        &self.chain_tasks
    }

    /// Lateness and chain overruns are each summed over at most
    /// `tasks + chains` terms bounded by the horizon.
    fn check_sums(&self) -> Result<(), ParseError> {
        let terms = (self.tasks.len() + self.chains.len()).max(1) as u64;
        self.horizon
            .checked_mul(terms)
            .map(|_| ())
            .ok_or(ParseError::TimeOverflow)
    }

    fn require(&self, id: &str) -> Result<usize, SchedError> {
        self.index_of(id).ok_or_else(|| SchedError::NotFound {
            kind: "task",
            id: id.to_string(),
        })
    }
}

/// `max offset + Σ wcet + Σ edge cost`: no list schedule can finish later.
fn horizon(tasks: &[Task], edges: &[Edge]) -> Option<u64> {
    let release = tasks.iter().map(|t| t.offset).max().unwrap_or(0);
    let work = tasks
        .iter()
        .try_fold(release, |acc, t| acc.checked_add(t.wcet))?;
    edges.iter().try_fold(work, |acc, e| acc.checked_add(e.cost))
}

/// Kahn's algorithm with a min-heap ready set, so equal-rank tasks come out
/// in ascending index order.
fn kahn_order(
    n: usize,
    ends: &[(usize, usize)],
    outgoing: &[Vec<usize>],
) -> Result<Vec<usize>, Vec<usize>> {
    let mut in_degree = vec![0usize; n];
    for &(_, d) in ends {
        in_degree[d] += 1;
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);

    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &e in &outgoing[i] {
            let d = ends[e].1;
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.push(Reverse(d));
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err((0..n).filter(|&i| in_degree[i] > 0).collect())
    }
}
