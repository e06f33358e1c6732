//! Simulated annealing over task-to-core plans.
//!
//! Each iteration perturbs the current plan, scores the candidate, applies
//! the Metropolis criterion and cools the temperature geometrically. The
//! best plan ever seen is tracked independently of the current one.
//!
//! # References
//!
//! - Kirkpatrick, Gelatt & Vecchi (1983), "Optimization by Simulated Annealing"
//! - Metropolis et al. (1953), "Equation of State Calculations by Fast
//!   Computing Machines"

mod config;
#[cfg(feature = "parallel")]
mod parallel;
mod runner;

pub use config::AnnealConfig;
#[cfg(feature = "parallel")]
pub use parallel::optimize_parallel;
pub use runner::{accept, optimize, AnnealResult, AnnealingScheduler, StepOutcome, Termination};
