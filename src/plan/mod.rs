//! Candidate task-to-core assignments.
//!
//! A [`Plan`] borrows the immutable [`TaskGraph`] and [`Topology`] it was
//! built against and owns only the assignment vector, so cloning one per
//! neighbor trial is cheap. The derived [`Schedule`] is computed on demand
//! and cached until the next reassignment; clones start with an empty
//! cache.
//!
//! Every task's [`Affinity`](crate::model::Affinity) is resolved against
//! the topology once per plan family. Constructors, [`Plan::assign`] and
//! the neighbor moves only ever place a task on one of its eligible cores.

mod schedule;

pub use schedule::{ChainOverrun, DeadlineMiss, Schedule, ScheduleEntry, TaskTiming};

use crate::error::SchedError;
use crate::model::{CoreId, TaskGraph, Topology};
use rand::Rng;
use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

/// Eligible core indices per task, shared by a plan and its clones.
#[derive(Debug)]
struct Eligibility {
    allowed: Vec<Vec<usize>>,
    /// Tasks with at least two eligible cores.
    movable: Vec<usize>,
}

impl Eligibility {
    fn resolve(graph: &TaskGraph, topology: &Topology) -> Result<Self, SchedError> {
        if topology.core_count() == 0 && !graph.is_empty() {
            return Err(SchedError::EmptyTopology);
        }
        let allowed = graph
            .tasks()
            .iter()
            .map(|task| {
                let cores = topology.eligible(task.affinity())?;
                if cores.is_empty() {
                    return Err(SchedError::NoEligibleCore(task.id().to_string()));
                }
                Ok(cores)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let movable = (0..allowed.len())
            .filter(|&t| allowed[t].len() >= 2)
            .collect();
        Ok(Self { allowed, movable })
    }

    fn admits(&self, task: usize, core: usize) -> bool {
        self.allowed[task].binary_search(&core).is_ok()
    }
}

/// Assignment of every task in a graph to exactly one core.
pub struct Plan<'a> {
    graph: &'a TaskGraph,
    topology: &'a Topology,
    eligibility: Arc<Eligibility>,
    /// Core index per task index.
    cores: Vec<usize>,
    schedule: OnceCell<Schedule<'a>>,
}

impl<'a> Plan<'a> {
    /// Assigns every task to a uniformly random eligible core.
    ///
    /// # Errors
    /// - [`SchedError::EmptyTopology`] when there are tasks but no cores
    /// - [`SchedError::NoEligibleCore`] when a task's affinity matches no core
    /// - [`SchedError::NotFound`] / [`SchedError::UnknownCore`] when an
    ///   affinity names a CPU or core outside the topology
    pub fn random<R: Rng>(
        graph: &'a TaskGraph,
        topology: &'a Topology,
        rng: &mut R,
    ) -> Result<Self, SchedError> {
        let eligibility = Eligibility::resolve(graph, topology)?;
        let cores = eligibility
            .allowed
            .iter()
            .map(|allowed| allowed[rng.random_range(0..allowed.len())])
            .collect();
        Ok(Self::with_cores(graph, topology, Arc::new(eligibility), cores))
    }

    /// Assigns every task to `core`.
    ///
    /// # Errors
    /// [`SchedError::AffinityViolation`] when some task may not run there.
    pub fn uniform(
        graph: &'a TaskGraph,
        topology: &'a Topology,
        core: &CoreId,
    ) -> Result<Self, SchedError> {
        let eligibility = Eligibility::resolve(graph, topology)?;
        let c = topology
            .index_of(core)
            .ok_or_else(|| SchedError::UnknownCore(core.to_string()))?;
        for t in 0..graph.len() {
            check_admits(graph, topology, &eligibility, t, c)?;
        }
        let cores = vec![c; graph.len()];
        Ok(Self::with_cores(graph, topology, Arc::new(eligibility), cores))
    }

    /// Builds a plan from explicit `(task, core)` pairs.
    ///
    /// Later pairs for the same task override earlier ones.
    ///
    /// # Errors
    /// [`SchedError::UnknownTask`] / [`SchedError::UnknownCore`] for ids
    /// outside the model, [`SchedError::AffinityViolation`] for a pair the
    /// task's affinity excludes, [`SchedError::Unassigned`] for the first
    /// task left without a core.
    pub fn from_assignments<I, S>(
        graph: &'a TaskGraph,
        topology: &'a Topology,
        assignments: I,
    ) -> Result<Self, SchedError>
    where
        I: IntoIterator<Item = (S, CoreId)>,
        S: AsRef<str>,
    {
        let eligibility = Eligibility::resolve(graph, topology)?;
        let mut cores: Vec<Option<usize>> = vec![None; graph.len()];
        for (task, core) in assignments {
            let t = graph
                .index_of(task.as_ref())
                .ok_or_else(|| SchedError::UnknownTask(task.as_ref().to_string()))?;
            let c = topology
                .index_of(&core)
                .ok_or_else(|| SchedError::UnknownCore(core.to_string()))?;
            check_admits(graph, topology, &eligibility, t, c)?;
            cores[t] = Some(c);
        }
        let cores = cores
            .into_iter()
            .enumerate()
            .map(|(t, c)| {
                c.ok_or_else(|| SchedError::Unassigned(graph.tasks()[t].id().to_string()))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self::with_cores(graph, topology, Arc::new(eligibility), cores))
    }

    fn with_cores(
        graph: &'a TaskGraph,
        topology: &'a Topology,
        eligibility: Arc<Eligibility>,
        cores: Vec<usize>,
    ) -> Self {
        Self {
            graph,
            topology,
            eligibility,
            cores,
            schedule: OnceCell::new(),
        }
    }

    pub fn graph(&self) -> &'a TaskGraph {
        self.graph
    }

    pub fn topology(&self) -> &'a Topology {
        self.topology
    }

    /// Number of assigned tasks.
    pub fn len(&self) -> usize {
        self.cores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    /// Reassigns `task` to `core` and drops the cached schedule.
    pub fn assign(&mut self, task: &str, core: &CoreId) -> Result<(), SchedError> {
        let t = self
            .graph
            .index_of(task)
            .ok_or_else(|| SchedError::UnknownTask(task.to_string()))?;
        let c = self
            .topology
            .index_of(core)
            .ok_or_else(|| SchedError::UnknownCore(core.to_string()))?;
        check_admits(self.graph, self.topology, &self.eligibility, t, c)?;
        self.set_core(t, c);
        Ok(())
    }

    /// Current core of `task`.
    pub fn core_of(&self, task: &str) -> Result<&'a CoreId, SchedError> {
        let t = self
            .graph
            .index_of(task)
            .ok_or_else(|| SchedError::UnknownTask(task.to_string()))?;
        Ok(self.topology.core_at(self.cores[t]))
    }

    /// `(task, core)` pairs in ascending task id order.
    pub fn assignments(&self) -> impl Iterator<Item = (&'a str, &'a CoreId)> + '_ {
        let (graph, topology) = (self.graph, self.topology);
        self.cores
            .iter()
            .enumerate()
            .map(move |(t, &c)| (graph.tasks()[t].id(), topology.core_at(c)))
    }

    /// Derives a fresh schedule, bypassing the cache.
    ///
    /// # Errors
    /// [`SchedError::CyclicDependency`] when the graph is not a DAG.
    pub fn compute_schedule(&self) -> Result<Schedule<'a>, SchedError> {
        schedule::compute(self.graph, self.topology, &self.cores)
    }

    /// Cached schedule, computed on first use after a reassignment.
    pub fn schedule(&self) -> Result<&Schedule<'a>, SchedError> {
        if let Some(cached) = self.schedule.get() {
            return Ok(cached);
        }
        let computed = self.compute_schedule()?;
        Ok(self.schedule.get_or_init(|| computed))
    }

    pub(crate) fn core_index(&self, task: usize) -> usize {
        self.cores[task]
    }

    /// Eligible core indices of `task`, ascending.
    pub(crate) fn eligible_cores(&self, task: usize) -> &[usize] {
        &self.eligibility.allowed[task]
    }

    /// Tasks that have more than one eligible core.
    pub(crate) fn movable_tasks(&self) -> &[usize] {
        &self.eligibility.movable
    }

    pub(crate) fn admits(&self, task: usize, core: usize) -> bool {
        self.eligibility.admits(task, core)
    }

    pub(crate) fn set_core(&mut self, task: usize, core: usize) {
        self.cores[task] = core;
        self.schedule.take();
    }

    pub(crate) fn swap_cores(&mut self, a: usize, b: usize) {
        self.cores.swap(a, b);
        self.schedule.take();
    }
}

fn check_admits(
    graph: &TaskGraph,
    topology: &Topology,
    eligibility: &Eligibility,
    task: usize,
    core: usize,
) -> Result<(), SchedError> {
    if eligibility.admits(task, core) {
        return Ok(());
    }
    Err(SchedError::AffinityViolation {
        task: graph.tasks()[task].id().to_string(),
        core: topology.core_at(core).to_string(),
    })
}

impl Clone for Plan<'_> {
    fn clone(&self) -> Self {
        Self::with_cores(
            self.graph,
            self.topology,
            Arc::clone(&self.eligibility),
            self.cores.clone(),
        )
    }
}

impl PartialEq for Plan<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cores == other.cores
    }
}

impl fmt::Debug for Plan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.assignments().map(|(t, c)| (t, c.to_string())))
            .finish()
    }
}
