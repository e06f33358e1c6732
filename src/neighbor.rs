//! Neighborhood move operator.

use crate::plan::Plan;
use rand::Rng;

/// The perturbation applied to produce a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    /// Task `task` moved from core `from` to core `to` (indices).
    Reassign { task: usize, from: usize, to: usize },
    /// Cores of tasks `a` and `b` exchanged.
    Swap { a: usize, b: usize },
    /// Nothing could change: no legal swap and no task with a second
    /// eligible core.
    Identity,
}

/// Produces perturbed copies of a plan.
#[derive(Debug, Clone, Copy)]
pub struct NeighborGenerator {
    swap_probability: f64,
}

impl Default for NeighborGenerator {
    fn default() -> Self {
        Self {
            swap_probability: 0.5,
        }
    }
}

impl NeighborGenerator {
    /// # Errors
    /// `swap_probability` outside `[0, 1]`.
    pub fn new(swap_probability: f64) -> Result<Self, String> {
        check_swap_probability(swap_probability)?;
        Ok(Self { swap_probability })
    }

    pub fn swap_probability(&self) -> f64 {
        self.swap_probability
    }

    /// Returns a neighbor of `plan`; `plan` itself is left untouched.
    pub fn perturb<'a, R: Rng>(&self, plan: &Plan<'a>, rng: &mut R) -> Plan<'a> {
        self.perturb_with_move(plan, rng).0
    }

    /// Like [`perturb`](Self::perturb), also reporting the applied move.
    ///
    /// A swap needs two tasks and a reassignment needs a task with two
    /// eligible cores; when the drawn kind is impossible the other one is
    /// used instead. A swap that would put either task on a core outside
    /// its affinity turns into a reassignment, or into
    /// [`Move::Identity`] when no task can be reassigned.
    pub fn perturb_with_move<'a, R: Rng>(
        &self,
        plan: &Plan<'a>,
        rng: &mut R,
    ) -> (Plan<'a>, Move) {
        let mut next = plan.clone();
        let n_tasks = plan.len();

        let can_swap = n_tasks >= 2;
        let can_move = !plan.movable_tasks().is_empty();

        let want_swap = rng.random_range(0.0..1.0) < self.swap_probability;
        let mv = match (want_swap, can_swap, can_move) {
            (true, true, _) | (false, true, false) => {
                let a = rng.random_range(0..n_tasks);
                // Draw from the other n-1 tasks so a != b.
                let mut b = rng.random_range(0..n_tasks - 1);
                if b >= a {
                    b += 1;
                }
                let (core_a, core_b) = (plan.core_index(a), plan.core_index(b));
                if plan.admits(a, core_b) && plan.admits(b, core_a) {
                    next.swap_cores(a, b);
                    Move::Swap { a, b }
                } else if can_move {
                    reassign(plan, &mut next, rng)
                } else {
                    Move::Identity
                }
            }
            (_, _, true) => reassign(plan, &mut next, rng),
            _ => Move::Identity,
        };
        (next, mv)
    }
}

/// Moves one movable task to a different eligible core.
fn reassign<R: Rng>(plan: &Plan<'_>, next: &mut Plan<'_>, rng: &mut R) -> Move {
    let movable = plan.movable_tasks();
    let task = movable[rng.random_range(0..movable.len())];
    let eligible = plan.eligible_cores(task);
    let from = plan.core_index(task);
    // `from` is itself eligible; draw from the remaining ones.
    let skip = eligible.partition_point(|&c| c < from);
    let mut k = rng.random_range(0..eligible.len() - 1);
    if k >= skip {
        k += 1;
    }
    let to = eligible[k];
    next.set_core(task, to);
    Move::Reassign { task, from, to }
}

pub(crate) fn check_swap_probability(p: f64) -> Result<(), String> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(format!("swap_probability must be in [0, 1], got {p}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Affinity, CoreId, Cpu, Task, TaskGraph, Topology};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn graph(n: usize) -> TaskGraph {
        let tasks = (0..n)
            .map(|i| Task::new(format!("T{i}"), format!("t{i}"), 1, 10, 10))
            .collect();
        TaskGraph::new(tasks, vec![]).unwrap()
    }

    fn topology(cores: usize) -> Topology {
        let ids: Vec<String> = (0..cores).map(|c| c.to_string()).collect();
        Topology::new(vec![Cpu::new("cpu", ids)]).unwrap()
    }

    #[test]
    fn test_reassign_changes_exactly_one_task() {
        let (g, topo) = (graph(5), topology(3));
        let mut rng = StdRng::seed_from_u64(1);
        let plan = Plan::random(&g, &topo, &mut rng).unwrap();
        let gen = NeighborGenerator::new(0.0).unwrap();
        for _ in 0..100 {
            let (next, mv) = gen.perturb_with_move(&plan, &mut rng);
            let diffs = plan
                .assignments()
                .zip(next.assignments())
                .filter(|(a, b)| a.1 != b.1)
                .count();
            assert_eq!(diffs, 1);
            assert!(matches!(mv, Move::Reassign { from, to, .. } if from != to));
        }
    }

    #[test]
    fn test_swap_picks_distinct_tasks() {
        let (g, topo) = (graph(4), topology(2));
        let mut rng = StdRng::seed_from_u64(2);
        let plan = Plan::random(&g, &topo, &mut rng).unwrap();
        let gen = NeighborGenerator::new(1.0).unwrap();
        for _ in 0..100 {
            let (next, mv) = gen.perturb_with_move(&plan, &mut rng);
            let Move::Swap { a, b } = mv else {
                panic!("expected swap, got {mv:?}");
            };
            assert_ne!(a, b);
            assert_eq!(next.core_index(a), plan.core_index(b));
            assert_eq!(next.core_index(b), plan.core_index(a));
        }
    }

    #[test]
    fn test_single_core_falls_back_to_swap() {
        let (g, topo) = (graph(3), topology(1));
        let mut rng = StdRng::seed_from_u64(3);
        let plan = Plan::random(&g, &topo, &mut rng).unwrap();
        let (next, mv) = NeighborGenerator::new(0.0).unwrap().perturb_with_move(&plan, &mut rng);
        assert!(matches!(mv, Move::Swap { .. }));
        assert_eq!(next, plan);
    }

    #[test]
    fn test_single_task_falls_back_to_reassign() {
        let (g, topo) = (graph(1), topology(2));
        let mut rng = StdRng::seed_from_u64(4);
        let plan = Plan::random(&g, &topo, &mut rng).unwrap();
        let (next, mv) = NeighborGenerator::new(1.0).unwrap().perturb_with_move(&plan, &mut rng);
        assert!(matches!(mv, Move::Reassign { .. }));
        assert_ne!(next, plan);
    }

    #[test]
    fn test_identity_when_nothing_can_move() {
        let (g, topo) = (graph(1), topology(1));
        let mut rng = StdRng::seed_from_u64(5);
        let plan = Plan::uniform(&g, &topo, &CoreId::new("cpu", "0")).unwrap();
        let (next, mv) = NeighborGenerator::default().perturb_with_move(&plan, &mut rng);
        assert_eq!(mv, Move::Identity);
        assert_eq!(next, plan);
    }

    #[test]
    fn test_input_untouched() {
        let (g, topo) = (graph(6), topology(4));
        let mut rng = StdRng::seed_from_u64(6);
        let plan = Plan::random(&g, &topo, &mut rng).unwrap();
        let before: Vec<_> = plan.assignments().collect();
        for _ in 0..50 {
            let _ = NeighborGenerator::default().perturb(&plan, &mut rng);
        }
        let after: Vec<_> = plan.assignments().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_rejects_out_of_range_probability() {
        for p in [3.0, -1.0, f64::NAN] {
            let err = NeighborGenerator::new(p).unwrap_err();
            assert!(err.contains("swap_probability"), "{err}");
        }
        assert_eq!(NeighborGenerator::new(1.0).unwrap().swap_probability(), 1.0);
    }

    fn pinned_graph(affinities: Vec<Affinity>) -> TaskGraph {
        let tasks = affinities
            .into_iter()
            .enumerate()
            .map(|(i, a)| {
                Task::new(format!("T{i}"), format!("t{i}"), 1, 10, 10).with_affinity(a)
            })
            .collect();
        TaskGraph::new(tasks, vec![]).unwrap()
    }

    #[test]
    fn test_moves_stay_within_affinity() {
        let topo = Topology::new(vec![
            Cpu::new("a", ["0", "1"]),
            Cpu::new("b", ["0", "1", "2"]),
        ])
        .unwrap();
        let g = pinned_graph(vec![
            Affinity::Cpu("a".into()),
            Affinity::Core(CoreId::new("b", "2")),
            Affinity::Any,
            Affinity::Cpu("b".into()),
        ]);
        let mut rng = StdRng::seed_from_u64(8);
        let mut plan = Plan::random(&g, &topo, &mut rng).unwrap();
        for p in [0.0, 0.5, 1.0] {
            let gen = NeighborGenerator::new(p).unwrap();
            for _ in 0..200 {
                plan = gen.perturb(&plan, &mut rng);
                for (task, core) in plan.assignments() {
                    let affinity = g.task(task).unwrap().affinity();
                    assert!(affinity.admits(core), "{task} on {core}");
                }
            }
        }
    }

    #[test]
    fn test_fully_pinned_plan_is_identity() {
        let topo = topology(2);
        let g = pinned_graph(vec![
            Affinity::Core(CoreId::new("cpu", "0")),
            Affinity::Core(CoreId::new("cpu", "1")),
        ]);
        let mut rng = StdRng::seed_from_u64(9);
        let plan = Plan::random(&g, &topo, &mut rng).unwrap();
        for p in [0.0, 1.0] {
            let gen = NeighborGenerator::new(p).unwrap();
            let (next, mv) = gen.perturb_with_move(&plan, &mut rng);
            assert_eq!(mv, Move::Identity);
            assert_eq!(next, plan);
        }
    }

    #[test]
    fn test_illegal_swap_becomes_reassign() {
        let topo = topology(3);
        let g = pinned_graph(vec![
            Affinity::Core(CoreId::new("cpu", "0")),
            Affinity::Any,
        ]);
        let mut rng = StdRng::seed_from_u64(10);
        let plan = Plan::from_assignments(
            &g,
            &topo,
            [("T0", CoreId::new("cpu", "0")), ("T1", CoreId::new("cpu", "2"))],
        )
        .unwrap();
        let gen = NeighborGenerator::new(1.0).unwrap();
        for _ in 0..50 {
            let (next, mv) = gen.perturb_with_move(&plan, &mut rng);
            assert!(matches!(mv, Move::Reassign { task: 1, from: 2, to } if to != 2));
            assert_eq!(next.core_of("T0").unwrap(), &CoreId::new("cpu", "0"));
        }
    }
}
