//! Annealing state machine and execution loop.

use super::config::AnnealConfig;
use crate::cost::CostEvaluator;
use crate::error::SchedError;
use crate::model::{TaskGraph, Topology};
use crate::neighbor::NeighborGenerator;
use crate::plan::{Plan, Schedule};
use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// Best cost is sampled into the history every this many iterations.
const HISTORY_INTERVAL: usize = 100;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Termination {
    /// Temperature reached `termination_temperature`.
    TemperatureFloor,
    /// `max_iterations` reached.
    IterationBudget,
    /// `time_limit` elapsed.
    TimeBudget,
}

/// Result of an annealing run.
#[derive(Debug, Clone)]
pub struct AnnealResult<'a> {
    /// Lowest-cost plan seen during the run.
    pub best_plan: Plan<'a>,

    /// Cost of `best_plan`.
    pub best_cost: f64,

    /// Schedule derived from `best_plan`.
    pub schedule: Schedule<'a>,

    /// Cost of the random initial plan.
    pub initial_cost: f64,

    /// Number of neighbor evaluations.
    pub iterations: usize,

    /// Number of accepted moves (including improvements).
    pub accepted_moves: usize,

    /// Number of strictly improving moves.
    pub improving_moves: usize,

    /// Temperature when the run stopped.
    pub final_temperature: f64,

    pub termination: Termination,

    /// Best cost sampled at regular intervals.
    pub cost_history: Vec<f64>,
}

/// What a single [`AnnealingScheduler::step`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// `cost(candidate) - cost(current)`.
    pub delta: f64,
    pub accepted: bool,
    /// The candidate became the new best plan.
    pub new_best: bool,
}

/// Metropolis acceptance criterion.
///
/// Non-positive `delta` is always accepted. Otherwise the move is accepted
/// with probability `exp(-delta / temperature)`; a uniform draw in `[0, 1)`
/// is consumed only in that case.
pub fn accept<R: Rng>(delta: f64, temperature: f64, rng: &mut R) -> bool {
    if delta <= 0.0 {
        return true;
    }
    if temperature <= 0.0 {
        return false;
    }
    let probability = (-delta / temperature).exp();
    rng.random_range(0.0..1.0) < probability
}

/// Simulated-annealing search over task-to-core plans.
///
/// Owns exactly one current and one best plan; both borrow the same
/// immutable graph and topology.
pub struct AnnealingScheduler<'a> {
    config: AnnealConfig,
    evaluator: CostEvaluator,
    neighbors: NeighborGenerator,
    rng: StdRng,
    temperature: f64,
    current: Plan<'a>,
    current_cost: f64,
    best: Plan<'a>,
    best_cost: f64,
    initial_cost: f64,
    iterations: usize,
    accepted_moves: usize,
    improving_moves: usize,
    cost_history: Vec<f64>,
}

impl<'a> AnnealingScheduler<'a> {
    /// Validates inputs and draws the random initial plan.
    ///
    /// # Errors
    /// - [`SchedError::InvalidConfig`] for a rejected configuration
    /// - [`SchedError::CyclicDependency`] when the graph is not a DAG
    /// - [`SchedError::EmptyTopology`] when there is nowhere to run tasks
    /// - [`SchedError::NoEligibleCore`] when a task's affinity matches no core
    pub fn new(
        graph: &'a TaskGraph,
        topology: &'a Topology,
        config: &AnnealConfig,
    ) -> Result<Self, SchedError> {
        config.validate().map_err(SchedError::InvalidConfig)?;
        graph.order_indices()?;

        let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or_else(rand::random));
        let evaluator = CostEvaluator::new(config.weights());
        let neighbors =
            NeighborGenerator::new(config.swap_probability).map_err(SchedError::InvalidConfig)?;

        let current = Plan::random(graph, topology, &mut rng)?;
        let current_cost = evaluator.evaluate(&current)?;
        debug!(
            "initial plan over {} tasks / {} cores costs {current_cost}",
            graph.len(),
            topology.core_count()
        );

        Ok(Self {
            config: config.clone(),
            evaluator,
            neighbors,
            rng,
            temperature: config.initial_temperature,
            best: current.clone(),
            best_cost: current_cost,
            current,
            current_cost,
            initial_cost: current_cost,
            iterations: 0,
            accepted_moves: 0,
            improving_moves: 0,
            cost_history: vec![current_cost],
        })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn current(&self) -> &Plan<'a> {
        &self.current
    }

    pub fn current_cost(&self) -> f64 {
        self.current_cost
    }

    pub fn best(&self) -> &Plan<'a> {
        &self.best
    }

    pub fn best_cost(&self) -> f64 {
        self.best_cost
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Runs one transition: perturb, evaluate, accept or reject, track the
    /// best plan, cool.
    pub fn step(&mut self) -> Result<StepOutcome, SchedError> {
        let candidate = self.neighbors.perturb(&self.current, &mut self.rng);
        let candidate_cost = self.evaluator.evaluate(&candidate)?;
        let delta = candidate_cost - self.current_cost;

        let new_best = candidate_cost < self.best_cost;
        if new_best {
            self.best = candidate.clone();
            self.best_cost = candidate_cost;
            debug!(
                "iteration {}: new best {candidate_cost} at T={:.4}",
                self.iterations, self.temperature
            );
        }

        let accepted = accept(delta, self.temperature, &mut self.rng);
        if accepted {
            if delta < 0.0 {
                self.improving_moves += 1;
            }
            self.accepted_moves += 1;
            self.current = candidate;
            self.current_cost = candidate_cost;
        }
        trace!(
            "iteration {}: delta={delta} accepted={accepted} T={:.4}",
            self.iterations,
            self.temperature
        );

        self.iterations += 1;
        if self.iterations % HISTORY_INTERVAL == 0 {
            self.cost_history.push(self.best_cost);
        }

        self.temperature *= 1.0 - self.config.cooling_rate;

        Ok(StepOutcome {
            delta,
            accepted,
            new_best,
        })
    }

    /// Steps until a stopping condition holds and returns the best plan.
    pub fn run(mut self) -> Result<AnnealResult<'a>, SchedError> {
        let started = Instant::now();
        info!(
            "annealing {} tasks on {} cores: T0={} floor={} cooling={}",
            self.current.len(),
            self.current.topology().core_count(),
            self.config.initial_temperature,
            self.config.termination_temperature,
            self.config.cooling_rate
        );

        let termination = loop {
            if let Some(reason) = self.stop_reason(started) {
                break reason;
            }
            self.step()?;
        };

        if self
            .cost_history
            .last()
            .is_none_or(|&last| (last - self.best_cost).abs() > 1e-15)
        {
            self.cost_history.push(self.best_cost);
        }

        let schedule = self.best.compute_schedule()?;
        info!(
            "annealing stopped ({termination:?}) after {} iterations: \
             best cost {} (initial {}), {} deadline misses",
            self.iterations,
            self.best_cost,
            self.initial_cost,
            schedule.deadline_misses().len()
        );

        Ok(AnnealResult {
            best_plan: self.best,
            best_cost: self.best_cost,
            schedule,
            initial_cost: self.initial_cost,
            iterations: self.iterations,
            accepted_moves: self.accepted_moves,
            improving_moves: self.improving_moves,
            final_temperature: self.temperature,
            termination,
            cost_history: self.cost_history,
        })
    }

    fn stop_reason(&self, started: Instant) -> Option<Termination> {
        if self.temperature <= self.config.termination_temperature {
            return Some(Termination::TemperatureFloor);
        }
        if self.config.max_iterations > 0 && self.iterations >= self.config.max_iterations {
            return Some(Termination::IterationBudget);
        }
        if self
            .config
            .time_limit
            .is_some_and(|limit| started.elapsed() >= limit)
        {
            return Some(Termination::TimeBudget);
        }
        None
    }
}

/// Optimizes the task-to-core mapping of `graph` on `topology`.
///
/// # Errors
/// Configuration and input errors from [`AnnealingScheduler::new`]; the
/// search itself does not fail on an acyclic graph.
pub fn optimize<'a>(
    graph: &'a TaskGraph,
    topology: &'a Topology,
    config: &AnnealConfig,
) -> Result<AnnealResult<'a>, SchedError> {
    AnnealingScheduler::new(graph, topology, config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cpu, Edge, Task};

    fn fixture() -> (TaskGraph, Topology) {
        let tasks = (0..6)
            .map(|i| Task::new(format!("T{i}"), format!("t{i}"), 1 + i % 3, 40, 12))
            .collect();
        let edges = vec![
            Edge::new("T0", "T1", 2),
            Edge::new("T0", "T2", 2),
            Edge::new("T1", "T3", 1),
            Edge::new("T2", "T4", 3),
            Edge::new("T3", "T5", 1),
            Edge::new("T4", "T5", 1),
        ];
        let graph = TaskGraph::new(tasks, edges).unwrap();
        let topo = Topology::new(vec![Cpu::new("c0", ["0", "1"]), Cpu::new("c1", ["0"])]).unwrap();
        (graph, topo)
    }

    fn config() -> AnnealConfig {
        AnnealConfig::default()
            .with_initial_temperature(100.0)
            .with_cooling_rate(0.01)
            .with_seed(42)
    }

    #[test]
    fn test_accept_non_positive_delta() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(accept(0.0, 1e-9, &mut rng));
        assert!(accept(-5.0, 0.0, &mut rng));
    }

    #[test]
    fn test_accept_uphill_at_zero_temperature() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(!accept(1.0, 0.0, &mut rng));
    }

    #[test]
    fn test_accept_rate_tracks_metropolis() {
        let mut rng = StdRng::seed_from_u64(9);
        let trials = 20_000;
        let hits = (0..trials).filter(|_| accept(1.0, 1.0, &mut rng)).count();
        let rate = hits as f64 / trials as f64;
        assert!((rate - (-1.0f64).exp()).abs() < 0.02, "rate {rate}");
    }

    #[test]
    fn test_run_stops_at_temperature_floor() {
        let (g, topo) = fixture();
        let cfg = config();
        let result = optimize(&g, &topo, &cfg).unwrap();
        assert_eq!(result.termination, Termination::TemperatureFloor);
        assert_eq!(result.iterations, cfg.temperature_steps());
        assert!(result.final_temperature <= cfg.termination_temperature);
    }

    #[test]
    fn test_best_never_worse_than_initial() {
        let (g, topo) = fixture();
        let result = optimize(&g, &topo, &config()).unwrap();
        assert!(result.best_cost <= result.initial_cost);
        let eval = CostEvaluator::new(config().weights());
        assert_eq!(eval.evaluate(&result.best_plan).unwrap(), result.best_cost);
        assert_eq!(eval.score(&result.schedule), result.best_cost);
    }

    #[test]
    fn test_iteration_budget() {
        let (g, topo) = fixture();
        let cfg = config().with_max_iterations(25);
        let result = optimize(&g, &topo, &cfg).unwrap();
        assert_eq!(result.termination, Termination::IterationBudget);
        assert_eq!(result.iterations, 25);
    }

    #[test]
    fn test_time_budget() {
        let (g, topo) = fixture();
        let cfg = config()
            .with_cooling_rate(1e-9)
            .with_time_limit(std::time::Duration::ZERO);
        let result = optimize(&g, &topo, &cfg).unwrap();
        assert_eq!(result.termination, Termination::TimeBudget);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_cost_history_non_increasing() {
        let (g, topo) = fixture();
        let result = optimize(&g, &topo, &config().with_cooling_rate(0.001)).unwrap();
        assert!(result.cost_history.len() > 2);
        for window in result.cost_history.windows(2) {
            assert!(window[1] <= window[0]);
        }
        assert_eq!(result.cost_history.last().copied(), Some(result.best_cost));
    }

    #[test]
    fn test_step_tracks_best_independently() {
        let (g, topo) = fixture();
        let mut sched = AnnealingScheduler::new(&g, &topo, &config()).unwrap();
        let mut lowest = sched.best_cost();
        for _ in 0..200 {
            let before = sched.temperature();
            let outcome = sched.step().unwrap();
            assert!(sched.temperature() < before);
            if outcome.new_best {
                assert!(sched.best_cost() < lowest);
            }
            lowest = lowest.min(sched.current_cost());
            assert!(sched.best_cost() <= sched.current_cost());
            assert_eq!(sched.best_cost(), lowest);
        }
        assert_eq!(sched.iterations(), 200);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (g, topo) = fixture();
        let cfg = config().with_cooling_rate(2.0);
        assert!(matches!(
            AnnealingScheduler::new(&g, &topo, &cfg),
            Err(SchedError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_graph() {
        let g = TaskGraph::new(vec![], vec![]).unwrap();
        let topo = Topology::new(vec![Cpu::new("c", ["0"])]).unwrap();
        let result = optimize(&g, &topo, &config()).unwrap();
        assert_eq!(result.best_cost, 0.0);
        assert!(result.schedule.timings().is_empty());
    }
}
