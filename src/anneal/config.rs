//! Annealing configuration.

use crate::cost::CostWeights;
use crate::neighbor::check_swap_probability;
use std::time::Duration;

/// Configuration for [`AnnealingScheduler`](super::AnnealingScheduler).
///
/// Cooling is geometric: after every iteration
/// `temperature *= 1 - cooling_rate`. The run ends once the temperature
/// reaches `termination_temperature`, or earlier when an iteration or
/// wall-clock budget is set and exhausted.
///
/// # Examples
///
/// ```
/// use task_anneal::anneal::AnnealConfig;
///
/// let config = AnnealConfig::default()
///     .with_initial_temperature(500.0)
///     .with_cooling_rate(0.01)
///     .with_swap_probability(0.3)
///     .with_seed(7);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnnealConfig {
    /// Starting temperature. Higher values accept more uphill moves early on.
    pub initial_temperature: f64,

    /// Fraction of the temperature removed per iteration, in (0, 1).
    pub cooling_rate: f64,

    /// The run stops when the temperature drops to this floor.
    pub termination_temperature: f64,

    /// Weight of total lateness over missed deadlines.
    pub deadline_miss_weight: f64,

    /// Weight of the makespan.
    pub makespan_weight: f64,

    /// Weight of communication cost paid across cores.
    pub communication_weight: f64,

    /// Weight of end-to-end chain budget overruns.
    pub chain_overrun_weight: f64,

    /// Probability that a neighbor is produced by a swap rather than a
    /// single reassignment, in [0, 1].
    pub swap_probability: f64,

    /// Maximum total iterations. 0 = no limit.
    pub max_iterations: usize,

    /// Wall-clock budget for the whole run.
    pub time_limit: Option<Duration>,

    /// Random seed for reproducibility. `None` draws one from entropy.
    pub seed: Option<u64>,
}

impl Default for AnnealConfig {
    fn default() -> Self {
        let weights = CostWeights::default();
        Self {
            initial_temperature: 1000.0,
            cooling_rate: 0.003,
            termination_temperature: 1.0,
            deadline_miss_weight: weights.deadline_miss,
            makespan_weight: weights.makespan,
            communication_weight: weights.communication,
            chain_overrun_weight: weights.chain_overrun,
            swap_probability: 0.5,
            max_iterations: 0,
            time_limit: None,
            seed: None,
        }
    }
}

impl AnnealConfig {
    pub fn with_initial_temperature(mut self, t: f64) -> Self {
        self.initial_temperature = t;
        self
    }

    pub fn with_cooling_rate(mut self, rate: f64) -> Self {
        self.cooling_rate = rate;
        self
    }

    pub fn with_termination_temperature(mut self, t: f64) -> Self {
        self.termination_temperature = t;
        self
    }

    pub fn with_weights(mut self, weights: CostWeights) -> Self {
        self.deadline_miss_weight = weights.deadline_miss;
        self.makespan_weight = weights.makespan;
        self.communication_weight = weights.communication;
        self.chain_overrun_weight = weights.chain_overrun;
        self
    }

    pub fn with_swap_probability(mut self, p: f64) -> Self {
        self.swap_probability = p;
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The cost weights as a [`CostWeights`].
    pub fn weights(&self) -> CostWeights {
        CostWeights {
            deadline_miss: self.deadline_miss_weight,
            makespan: self.makespan_weight,
            communication: self.communication_weight,
            chain_overrun: self.chain_overrun_weight,
        }
    }

    /// Upper bound on iterations implied by the temperature schedule alone.
    pub fn temperature_steps(&self) -> usize {
        if self.validate().is_err() {
            return 0;
        }
        let ratio = self.termination_temperature / self.initial_temperature;
        (ratio.ln() / (1.0 - self.cooling_rate).ln()).ceil() as usize
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.initial_temperature.is_finite() && self.initial_temperature > 0.0) {
            return Err("initial_temperature must be positive".into());
        }
        if !(self.termination_temperature.is_finite() && self.termination_temperature > 0.0) {
            return Err("termination_temperature must be positive".into());
        }
        if self.termination_temperature >= self.initial_temperature {
            return Err("termination_temperature must be less than initial_temperature".into());
        }
        if !(self.cooling_rate > 0.0 && self.cooling_rate < 1.0) {
            return Err(format!(
                "cooling_rate must be in (0, 1), got {}",
                self.cooling_rate
            ));
        }
        // Below f64 precision `1 - rate` rounds to 1 and the temperature
        // never falls.
        if (1.0 - self.cooling_rate).ln() == 0.0 {
            return Err(format!(
                "cooling_rate {} is too small to lower the temperature",
                self.cooling_rate
            ));
        }
        check_swap_probability(self.swap_probability)?;
        self.weights().validate()
    }
}
