//! # spsa-tuner
//!
//! Harness around [`spsa_optimizer`]: loads a [`TuningConfig`], builds the
//! configured objective evaluator and drives the optimizer for the
//! configured budget.

pub mod config;
pub mod evaluators;

pub use config::{CommandConfig, EvaluatorConfig, SimulatedMatchConfig, TuningConfig};
pub use evaluators::{build_evaluator, CommandEvaluator, SimulatedMatch};

use spsa_optimizer::{SpsaOptimizer, TuningReport};
use spsa_types::SpsaResult;
use std::future::Future;
use tracing::info;

/// Validate the configuration and construct an optimizer from it.
pub fn build_optimizer(config: &TuningConfig) -> SpsaResult<SpsaOptimizer> {
    config.validate()?;
    let optimizer = SpsaOptimizer::new(config.parameters.clone(), config.hyperparameters)?
        .with_failure_policy(config.failure_policy);
    Ok(match config.seed {
        Some(seed) => optimizer.with_seed(seed),
        None => optimizer,
    })
}

/// Run a full tuning session, stopping early when `shutdown` resolves.
///
/// Configuration problems are errors. A run that dies on an evaluation
/// failure still yields its report, with [`RunStatus::Failed`] as status.
///
/// [`RunStatus::Failed`]: spsa_optimizer::RunStatus::Failed
pub async fn run<S>(config: &TuningConfig, shutdown: S) -> SpsaResult<TuningReport>
where
    S: Future<Output = ()>,
{
    let mut optimizer = build_optimizer(config)?;
    let evaluator = build_evaluator(&config.evaluator)?;

    info!(
        parameters = config.parameters.len(),
        iterations = config.iterations,
        seed = ?config.seed,
        policy = ?config.failure_policy,
        "Starting SPSA tuning"
    );
    Ok(optimizer
        .run_until(evaluator.as_ref(), &config.budget(), shutdown)
        .await)
}
