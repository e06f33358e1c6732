//! Plan cost (annealing energy).
//!
//! ```text
//! cost = deadline_miss_weight  · Σ max(0, finish − deadline)
//!      + makespan_weight       · makespan
//!      + communication_weight  · cross-core communication
//!      + chain_overrun_weight  · Σ max(0, chain response − budget)
//! ```
//!
//! Lower is better. With the default weights any deadline miss or chain
//! overrun dominates the makespan and communication terms. The chain term
//! is zero for graphs without chains.

use crate::error::SchedError;
use crate::plan::{Plan, Schedule};

/// Weights of the cost terms.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CostWeights {
    /// Weight per time unit of lateness, summed over all tasks.
    pub deadline_miss: f64,
    /// Weight per time unit of makespan.
    pub makespan: f64,
    /// Weight per unit of communication cost paid across cores.
    pub communication: f64,
    /// Weight per time unit a chain exceeds its budget.
    pub chain_overrun: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            deadline_miss: 1000.0,
            makespan: 1.0,
            communication: 1.0,
            chain_overrun: 1000.0,
        }
    }
}

impl CostWeights {
    pub fn validate(&self) -> Result<(), String> {
        for (name, w) in [
            ("deadline_miss_weight", self.deadline_miss),
            ("makespan_weight", self.makespan),
            ("communication_weight", self.communication),
            ("chain_overrun_weight", self.chain_overrun),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(format!("{name} must be finite and non-negative, got {w}"));
            }
        }
        Ok(())
    }
}

/// The raw terms behind a cost value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CostBreakdown {
    pub lateness: u64,
    pub missed_deadlines: usize,
    pub makespan: u64,
    pub communication: u64,
    pub chain_overrun: u64,
    pub total: f64,
}

/// Scores plans. Stateless apart from its weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostEvaluator {
    weights: CostWeights,
}

impl CostEvaluator {
    pub fn new(weights: CostWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &CostWeights {
        &self.weights
    }

    /// Cost of `plan`.
    ///
    /// # Errors
    /// [`SchedError::CyclicDependency`] if the plan's graph is not a DAG.
    pub fn evaluate(&self, plan: &Plan<'_>) -> Result<f64, SchedError> {
        Ok(self.score(plan.schedule()?))
    }

    /// Cost of `plan` with its individual terms.
    pub fn breakdown(&self, plan: &Plan<'_>) -> Result<CostBreakdown, SchedError> {
        let schedule = plan.schedule()?;
        Ok(CostBreakdown {
            lateness: schedule.total_lateness(),
            missed_deadlines: schedule.deadline_misses().len(),
            makespan: schedule.makespan(),
            communication: schedule.communication_cost(),
            chain_overrun: schedule.total_chain_overrun(),
            total: self.score(schedule),
        })
    }

    /// Cost of an already derived schedule.
    pub fn score(&self, schedule: &Schedule<'_>) -> f64 {
        let w = &self.weights;
        w.deadline_miss * schedule.total_lateness() as f64
            + w.makespan * schedule.makespan() as f64
            + w.communication * schedule.communication_cost() as f64
            + w.chain_overrun * schedule.total_chain_overrun() as f64
    }
}
