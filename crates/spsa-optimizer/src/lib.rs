//! # spsa-optimizer
//!
//! Simultaneous Perturbation Stochastic Approximation over a bounded search
//! space.
//!
//! Each iteration perturbs every parameter at once along a random ±1
//! direction, scores the two probes through an [`ObjectiveEvaluator`], and
//! moves the estimate along the resulting scalar gradient estimate with
//! decaying gains. Two evaluations per iteration regardless of dimension.

mod evaluator;
mod gains;
mod optimizer;
mod perturbation;
mod report;

pub use evaluator::{EvaluationError, EvaluationResult, FnEvaluator, ObjectiveEvaluator};
pub use gains::GainSchedule;
pub use optimizer::SpsaOptimizer;
pub use perturbation::{FixedPerturbation, PerturbationSource, Rademacher};
pub use report::{IterationRecord, RunBudget, RunId, RunStatus, TuningReport};
