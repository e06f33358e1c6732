//! Independent multi-start annealing.

use super::config::AnnealConfig;
use super::runner::{optimize, AnnealResult};
use crate::error::SchedError;
use crate::model::{TaskGraph, Topology};
use log::info;
use rayon::prelude::*;

/// Runs `workers` independent searches in parallel and keeps the cheapest.
///
/// Worker `i` uses seed `seed + i` (the base seed is drawn from entropy
/// when `config.seed` is `None`), so a seeded call is reproducible. Workers
/// share only the immutable inputs; ties go to the lowest worker index.
pub fn optimize_parallel<'a>(
    graph: &'a TaskGraph,
    topology: &'a Topology,
    config: &AnnealConfig,
    workers: usize,
) -> Result<AnnealResult<'a>, SchedError> {
    let base = config.seed.unwrap_or_else(rand::random);

    let results = (0..workers.max(1) as u64)
        .into_par_iter()
        .map(|w| {
            let worker_config = config.clone().with_seed(base.wrapping_add(w));
            optimize(graph, topology, &worker_config)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let costs: Vec<f64> = results.iter().map(|r| r.best_cost).collect();
    info!("multi-start finished, worker best costs: {costs:?}");

    results
        .into_iter()
        .min_by(|a, b| a.best_cost.total_cmp(&b.best_cost))
        .ok_or_else(|| SchedError::InvalidConfig("no workers ran".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cpu, Edge, Task};

    #[test]
    fn test_parallel_matches_best_single_worker() {
        let graph = TaskGraph::new(
            vec![
                Task::new("A", "a", 2, 20, 20),
                Task::new("B", "b", 4, 20, 20),
                Task::new("C", "c", 3, 20, 20),
                Task::new("D", "d", 1, 20, 20),
            ],
            vec![Edge::new("A", "B", 2), Edge::new("A", "C", 2), Edge::new("B", "D", 1)],
        )
        .unwrap();
        let topo = Topology::new(vec![Cpu::new("cpu", ["0", "1", "2"])]).unwrap();
        let config = AnnealConfig::default()
            .with_initial_temperature(50.0)
            .with_cooling_rate(0.02)
            .with_seed(11);

        let merged = optimize_parallel(&graph, &topo, &config, 4).unwrap();
        let singles: Vec<f64> = (0..4)
            .map(|w| {
                optimize(&graph, &topo, &config.clone().with_seed(11 + w))
                    .unwrap()
                    .best_cost
            })
            .collect();
        let min = singles.iter().copied().fold(f64::INFINITY, f64::min);
        assert_eq!(merged.best_cost, min);
    }
}
