//! Schedule derivation for a fixed task-to-core assignment.
//!
//! Tasks are list-scheduled in the graph's topological order (ties broken
//! by ascending task id). A task starts at the latest of:
//!
//! - its release offset,
//! - the moment its core becomes free,
//! - each predecessor's finish time, plus the edge's communication cost
//!   when the predecessor ran on another core.
//!
//! Because every core receives its tasks in that single global order, no
//! two tasks on the same core overlap and the derived times are monotone
//! in every WCET.
//!
//! All times stay below the graph's horizon (`max offset + Σ wcet +
//! Σ edge cost`), which `TaskGraph` guarantees fits in a `u64`.

use crate::error::SchedError;
use crate::model::{CoreId, TaskGraph, Topology};

/// Start and finish of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TaskTiming<'a> {
    pub task: &'a str,
    pub core: &'a CoreId,
    pub start: u64,
    /// Exclusive end: the task occupies `[start, finish)`.
    pub finish: u64,
}

/// A task finishing after its absolute deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeadlineMiss<'a> {
    pub task: &'a str,
    pub finish: u64,
    /// Release offset plus relative deadline.
    pub deadline: u64,
    /// `finish - deadline`, always positive.
    pub lateness: u64,
}

/// A chain whose end-to-end response exceeds its budget.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ChainOverrun<'a> {
    pub chain: &'a str,
    pub priority: u32,
    /// Release of the first runnable to finish of the last one.
    pub response: u64,
    pub budget: u64,
    /// `response - budget`, always positive.
    pub overrun: u64,
}

/// Owned, flat schedule row for reports.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScheduleEntry {
    pub task: String,
    pub cpu: String,
    pub core: String,
    pub start: u64,
    pub end: u64,
}

/// Derived timing of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Schedule<'a> {
    timings: Vec<TaskTiming<'a>>,
    makespan: u64,
    communication_cost: u64,
    deadline_misses: Vec<DeadlineMiss<'a>>,
    chain_overruns: Vec<ChainOverrun<'a>>,
}

impl<'a> Schedule<'a> {
    /// Per-task timings in ascending task id order.
    pub fn timings(&self) -> &[TaskTiming<'a>] {
        &self.timings
    }

    pub fn timing(&self, task: &str) -> Option<&TaskTiming<'a>> {
        self.timings
            .binary_search_by(|t| t.task.cmp(task))
            .ok()
            .map(|i| &self.timings[i])
    }

    /// Latest finish time over all tasks (0 for an empty graph).
    pub fn makespan(&self) -> u64 {
        self.makespan
    }

    /// Sum of edge costs whose endpoints run on different cores.
    pub fn communication_cost(&self) -> u64 {
        self.communication_cost
    }

    /// Every task that finishes after its deadline, in ascending id order.
    pub fn deadline_misses(&self) -> &[DeadlineMiss<'a>] {
        &self.deadline_misses
    }

    /// Sum of lateness over all missed deadlines.
    pub fn total_lateness(&self) -> u64 {
        self.deadline_misses.iter().map(|m| m.lateness).sum()
    }

    /// Chains over budget, in declaration order.
    pub fn chain_overruns(&self) -> &[ChainOverrun<'a>] {
        &self.chain_overruns
    }

    pub fn total_chain_overrun(&self) -> u64 {
        self.chain_overruns.iter().map(|c| c.overrun).sum()
    }

    /// `true` when no deadline is missed. Chain overruns do not count.
    pub fn is_feasible(&self) -> bool {
        self.deadline_misses.is_empty()
    }

    /// Timings of the tasks on `core`, in execution order.
    pub fn timeline(&self, core: &CoreId) -> Vec<&TaskTiming<'a>> {
        let mut on_core: Vec<_> = self.timings.iter().filter(|t| t.core == core).collect();
        on_core.sort_by_key(|t| (t.start, t.finish));
        on_core
    }

    /// Flat rows ordered by core, then start time.
    pub fn entries(&self) -> Vec<ScheduleEntry> {
        let mut rows: Vec<_> = self
            .timings
            .iter()
            .map(|t| ScheduleEntry {
                task: t.task.to_string(),
                cpu: t.core.cpu.clone(),
                core: t.core.core.clone(),
                start: t.start,
                end: t.finish,
            })
            .collect();
        rows.sort_by(|a, b| {
            (&a.cpu, &a.core, a.start, &a.task).cmp(&(&b.cpu, &b.core, b.start, &b.task))
        });
        rows
    }
}

/// Derives the schedule of `cores` (task index → core index).
pub(crate) fn compute<'a>(
    graph: &'a TaskGraph,
    topology: &'a Topology,
    cores: &[usize],
) -> Result<Schedule<'a>, SchedError> {
    let order = graph.order_indices()?;
    let tasks = graph.tasks();

    let mut start = vec![0u64; tasks.len()];
    let mut finish = vec![0u64; tasks.len()];
    let mut core_free = vec![0u64; topology.core_count()];
    let mut communication_cost = 0u64;

    for &i in order {
        let core = cores[i];
        let mut ready = tasks[i].offset().max(core_free[core]);
        for (pred, cost) in graph.predecessors(i) {
            let arrival = if cores[pred] == core {
                finish[pred]
            } else {
                communication_cost += cost;
                finish[pred] + cost
            };
            ready = ready.max(arrival);
        }
        start[i] = ready;
        finish[i] = ready + tasks[i].wcet();
        core_free[core] = finish[i];
    }

    let timings = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| TaskTiming {
            task: task.id(),
            core: topology.core_at(cores[i]),
            start: start[i],
            finish: finish[i],
        })
        .collect();

    let deadline_misses = tasks
        .iter()
        .enumerate()
        .filter(|&(i, task)| finish[i] > task.absolute_deadline())
        .map(|(i, task)| DeadlineMiss {
            task: task.id(),
            finish: finish[i],
            deadline: task.absolute_deadline(),
            lateness: finish[i] - task.absolute_deadline(),
        })
        .collect();

    let chain_overruns = graph
        .chains()
        .iter()
        .zip(graph.chain_indices())
        .filter_map(|(chain, members)| {
            let (first, last) = (*members.first()?, *members.last()?);
            let response = finish[last].saturating_sub(tasks[first].offset());
            (response > chain.budget()).then(|| ChainOverrun {
                chain: chain.name(),
                priority: chain.priority(),
                response,
                budget: chain.budget(),
                overrun: response - chain.budget(),
            })
        })
        .collect();

    Ok(Schedule {
        timings,
        makespan: finish.iter().copied().max().unwrap_or(0),
        communication_cost,
        deadline_misses,
        chain_overruns,
    })
}
